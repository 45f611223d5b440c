use crate::artifact::GeneratedArtifact;
use crate::error::{EvoError, Result};
use crate::proc::{self, CmdOutput};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// An isolated clone of the main repository where generated code is applied
/// and validated before anything reaches the real working tree.
///
/// The scheduler is the single writer: one improvement is applied, validated
/// and either promoted or rolled back before the next one runs.
pub struct SandboxWorkspace {
    main_repo: PathBuf,
    sandbox_dir: PathBuf,
}

impl SandboxWorkspace {
    /// The sandbox must never share the main repository's working tree.
    pub fn new(main_repo: impl Into<PathBuf>, sandbox_dir: impl Into<PathBuf>) -> Result<Self> {
        let main_repo = main_repo.into();
        let sandbox_dir = sandbox_dir.into();
        if main_repo == sandbox_dir {
            return Err(EvoError::SandboxSetup(format!(
                "sandbox directory {} is the main repository itself",
                sandbox_dir.display()
            )));
        }
        Ok(Self {
            main_repo,
            sandbox_dir,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.sandbox_dir
    }

    /// Clone the main repository on first use; afterwards fetch and hard-reset
    /// to the main tip so every cycle starts from a clean baseline.
    pub async fn setup(&self) -> Result<()> {
        if self.sandbox_dir.join(".git").is_dir() {
            debug!(sandbox = %self.sandbox_dir.display(), "refreshing existing sandbox");
            self.git(&["fetch", "origin"]).await?;
            let tip = self.remote_default_branch().await;
            self.git(&["reset", "--hard", &tip]).await?;
        } else {
            info!(sandbox = %self.sandbox_dir.display(), "cloning sandbox");
            if let Some(parent) = self.sandbox_dir.parent() {
                crate::io::ensure_dir(parent)?;
            }
            let main = self.main_repo.to_string_lossy().into_owned();
            let target = self.sandbox_dir.to_string_lossy().into_owned();
            let cwd = self
                .sandbox_dir
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."));
            let out = proc::run("git", &["clone", &main, &target], &cwd).await?;
            if !out.success() {
                return Err(EvoError::SandboxSetup(out.diagnostics().to_string()));
            }
        }
        Ok(())
    }

    /// Write every artifact file into the sandbox, creating parent
    /// directories as needed. Re-applying the same artifact is a no-op.
    pub fn apply(&self, artifact: &GeneratedArtifact) -> Result<()> {
        for (path, content) in artifact.iter() {
            let full = self.sandbox_dir.join(path);
            if let Some(parent) = full.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&full, content)?;
        }
        Ok(())
    }

    /// Paths changed since the baseline, including newly created files.
    pub async fn modified_files(&self) -> Result<Vec<String>> {
        // Stage everything first so untracked files show up in the diff.
        self.git(&["add", "-A"]).await?;
        let out = self.git(&["diff", "--name-only", "HEAD"]).await?;
        Ok(parse_name_only(&out.stdout))
    }

    /// Discard every change in the sandbox, staged or not.
    pub async fn rollback(&self) -> Result<()> {
        self.git(&["reset", "--hard"]).await?;
        Ok(())
    }

    /// Remote-tracking ref of the clone's default branch, from
    /// `origin/HEAD`. Falls back to `origin/main` when the symbolic ref is
    /// missing (old git, manual clones).
    async fn remote_default_branch(&self) -> String {
        match proc::run(
            "git",
            &["symbolic-ref", "refs/remotes/origin/HEAD"],
            &self.sandbox_dir,
        )
        .await
        {
            Ok(out) if out.success() => {
                parse_origin_head(&out.stdout).unwrap_or_else(|| "origin/main".to_string())
            }
            _ => "origin/main".to_string(),
        }
    }

    async fn git(&self, args: &[&str]) -> Result<CmdOutput> {
        let out = proc::run("git", args, &self.sandbox_dir).await?;
        if !out.success() {
            return Err(EvoError::SandboxSetup(format!(
                "git {} failed: {}",
                args.join(" "),
                out.diagnostics()
            )));
        }
        Ok(out)
    }
}

/// `origin/<branch>` from a `refs/remotes/origin/<branch>` symbolic ref.
fn parse_origin_head(stdout: &str) -> Option<String> {
    stdout
        .trim()
        .strip_prefix("refs/remotes/")
        .filter(|rest| rest.starts_with("origin/") && rest.len() > "origin/".len())
        .map(str::to_string)
}

fn parse_name_only(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn rejects_sandbox_equal_to_main_repo() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            SandboxWorkspace::new(dir.path(), dir.path()),
            Err(EvoError::SandboxSetup(_))
        ));
    }

    #[test]
    fn accepts_distinct_directories() {
        let dir = TempDir::new().unwrap();
        let sandbox = SandboxWorkspace::new(dir.path().join("main"), dir.path().join("box"));
        assert!(sandbox.is_ok());
    }

    #[test]
    fn apply_writes_files_with_parents() {
        let dir = TempDir::new().unwrap();
        let sandbox =
            SandboxWorkspace::new(dir.path().join("main"), dir.path().join("box")).unwrap();
        std::fs::create_dir_all(sandbox.dir()).unwrap();

        let mut artifact = GeneratedArtifact::new();
        artifact.insert("src/deep/new.rs", "pub fn f() {}").unwrap();
        sandbox.apply(&artifact).unwrap();

        let written =
            std::fs::read_to_string(dir.path().join("box/src/deep/new.rs")).unwrap();
        assert_eq!(written, "pub fn f() {}");

        // Idempotent re-apply
        sandbox.apply(&artifact).unwrap();
    }

    #[test]
    fn parse_name_only_skips_blank_lines() {
        let parsed = parse_name_only("src/a.rs\n\n tests/test_a.rs \n");
        assert_eq!(parsed, vec!["src/a.rs", "tests/test_a.rs"]);
        assert!(parse_name_only("").is_empty());
    }

    #[test]
    fn origin_head_parsing() {
        assert_eq!(
            parse_origin_head("refs/remotes/origin/trunk\n"),
            Some("origin/trunk".to_string())
        );
        assert_eq!(
            parse_origin_head("refs/remotes/origin/main"),
            Some("origin/main".to_string())
        );
        assert_eq!(parse_origin_head("refs/heads/main"), None);
        assert_eq!(parse_origin_head("refs/remotes/origin/"), None);
        assert_eq!(parse_origin_head(""), None);
    }

    async fn git(dir: &Path, args: &[&str]) {
        let out = proc::run("git", args, dir).await.unwrap();
        assert!(out.success(), "git {args:?}: {}", out.diagnostics());
    }

    #[tokio::test]
    async fn refresh_follows_the_remote_default_branch() {
        let dir = TempDir::new().unwrap();
        let main = dir.path().join("main");
        std::fs::create_dir_all(&main).unwrap();
        git(&main, &["init", "-b", "trunk"]).await;
        git(&main, &["config", "user.email", "ci@example.com"]).await;
        git(&main, &["config", "user.name", "ci"]).await;
        std::fs::write(main.join("README.md"), "evo\n").unwrap();
        git(&main, &["add", "README.md"]).await;
        git(&main, &["commit", "-m", "initial"]).await;

        let sandbox = SandboxWorkspace::new(&main, dir.path().join("box")).unwrap();
        sandbox.setup().await.unwrap();
        // A second setup refreshes; the reset target must be the clone's
        // actual default branch, not a hard-coded name.
        sandbox.setup().await.unwrap();
        assert!(sandbox.dir().join("README.md").is_file());
    }
}
