use crate::error::Result;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

/// Captured output of a finished subprocess.
#[derive(Debug, Clone)]
pub struct CmdOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CmdOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// stderr if non-empty, otherwise stdout. Used for error messages.
    pub fn diagnostics(&self) -> &str {
        if self.stderr.trim().is_empty() {
            self.stdout.trim()
        } else {
            self.stderr.trim()
        }
    }
}

/// Run a program to completion in `cwd`, capturing stdout and stderr.
///
/// A non-zero exit is not an error at this layer; callers decide what a
/// failure means. Spawn failures (program missing, cwd gone) surface as Io.
pub async fn run(program: &str, args: &[&str], cwd: &Path) -> Result<CmdOutput> {
    let output = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;
    Ok(CmdOutput {
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Run a shell command line (`sh -c ...`) in `cwd`.
pub async fn run_shell(command: &str, cwd: &Path) -> Result<CmdOutput> {
    run("sh", &["-c", command], cwd).await
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn captures_stdout() {
        let dir = TempDir::new().unwrap();
        let out = run("echo", &["hello"], dir.path()).await.unwrap();
        assert!(out.success());
        assert_eq!(out.stdout.trim(), "hello");
    }

    #[tokio::test]
    async fn reports_nonzero_exit() {
        let dir = TempDir::new().unwrap();
        let out = run_shell("exit 3", dir.path()).await.unwrap();
        assert!(!out.success());
        assert_eq!(out.code, Some(3));
    }

    #[tokio::test]
    async fn missing_program_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(run("definitely-not-a-real-binary", &[], dir.path())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn diagnostics_prefers_stderr() {
        let dir = TempDir::new().unwrap();
        let out = run_shell("echo out; echo err >&2", dir.path()).await.unwrap();
        assert_eq!(out.diagnostics(), "err");
    }
}
