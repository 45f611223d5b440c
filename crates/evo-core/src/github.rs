use crate::config::GithubConfig;
use crate::error::{EvoError, Result};
use crate::proc::{self, CmdOutput};
use crate::types::{Improvement, ImprovementKind, Priority};
use crate::version::Version;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// Tracked state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueStatus {
    InProgress,
    Testing,
    Done,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedIssue {
    pub number: u64,
    pub improvement: Improvement,
    pub branch: String,
    pub status: IssueStatus,
}

/// What `sync_improvement` managed to set up. Partial failure is normal:
/// a missing field means that step failed and was logged, not raised.
#[derive(Debug, Clone, Serialize)]
pub struct SyncOutcome {
    pub issue: Option<u64>,
    pub branch: Option<String>,
    pub board_updated: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkflowResult {
    pub issue: u64,
    pub pr_url: String,
    pub merged: bool,
    pub released: Option<Version>,
}

/// One entry of a PR's `statusCheckRollup`. Commit status contexts report
/// their verdict under `state`; older check-run payloads use `conclusion`,
/// so both spellings are accepted.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckRun {
    #[serde(default)]
    pub name: String,
    #[serde(default, alias = "conclusion")]
    pub state: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteIssue {
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub labels: Vec<RemoteLabel>,
    #[serde(default)]
    pub assignees: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteLabel {
    pub name: String,
}

// ---------------------------------------------------------------------------
// GitHubSyncEngine
// ---------------------------------------------------------------------------

/// Mirrors the lifecycle of accepted improvements onto GitHub: issue, branch,
/// board card, PR, merge, release. All remote calls go through the `gh` and
/// `git` CLIs.
///
/// The engine owns its issue table; nothing else mutates it and nothing is
/// shared globally. The table only holds issues opened by this instance, so
/// `complete_workflow` on a foreign number is caller misuse.
pub struct GitHubSyncEngine {
    root: PathBuf,
    config: GithubConfig,
    auto_merge: bool,
    auto_versioning: bool,
    issues: HashMap<u64, TrackedIssue>,
    current_version: Version,
}

impl GitHubSyncEngine {
    pub fn new(root: impl Into<PathBuf>, config: GithubConfig, current_version: Version) -> Self {
        Self {
            root: root.into(),
            config,
            auto_merge: false,
            auto_versioning: true,
            issues: HashMap::new(),
            current_version,
        }
    }

    pub fn with_policies(mut self, auto_merge: bool, auto_versioning: bool) -> Self {
        self.auto_merge = auto_merge;
        self.auto_versioning = auto_versioning;
        self
    }

    pub fn current_version(&self) -> Version {
        self.current_version
    }

    pub fn tracked(&self, issue: u64) -> Option<&TrackedIssue> {
        self.issues.get(&issue)
    }

    // -----------------------------------------------------------------------
    // sync_improvement
    // -----------------------------------------------------------------------

    /// Open an issue, create its work branch and place a board card. Each
    /// step is tolerant: a failure leaves the corresponding outcome field
    /// empty and the remaining steps still run where they can.
    pub async fn sync_improvement(&mut self, improvement: &Improvement) -> SyncOutcome {
        let mut outcome = SyncOutcome {
            issue: None,
            branch: None,
            board_updated: false,
        };

        let number = match self.create_issue(improvement).await {
            Ok(n) => {
                info!(issue = n, kind = %improvement.kind, "opened tracking issue");
                outcome.issue = Some(n);
                n
            }
            Err(e) => {
                warn!(error = %e, "issue creation failed, skipping sync");
                return outcome;
            }
        };

        self.move_board_card(number, "Todo").await;

        let branch = branch_name(improvement.kind, number);
        match self.create_branch(&branch).await {
            Ok(()) => outcome.branch = Some(branch.clone()),
            Err(e) => warn!(branch = %branch, error = %e, "branch creation failed"),
        }

        outcome.board_updated = self.move_board_card(number, "In Progress").await;

        self.issues.insert(
            number,
            TrackedIssue {
                number,
                improvement: improvement.clone(),
                branch,
                status: IssueStatus::InProgress,
            },
        );
        outcome
    }

    async fn create_issue(&self, improvement: &Improvement) -> Result<u64> {
        let title = issue_title(improvement);
        let body = issue_body(improvement);
        let slug = self.config.slug();
        let label = improvement.kind.label();
        let out = self
            .gh(&[
                "issue", "create", "--repo", &slug, "--title", &title, "--body", &body,
                "--label", label,
            ])
            .await;
        let out = match out {
            Ok(o) if o.success() => o,
            // Labels may not exist in the target repo; retry bare.
            _ => {
                let retry = self
                    .gh(&[
                        "issue", "create", "--repo", &slug, "--title", &title, "--body", &body,
                    ])
                    .await?;
                if !retry.success() {
                    return Err(EvoError::GithubApi(retry.diagnostics().to_string()));
                }
                retry
            }
        };
        parse_issue_number(out.stdout.trim())
            .ok_or_else(|| EvoError::GithubApi(format!("unparseable issue URL: {}", out.stdout)))
    }

    /// Create the work branch off the current HEAD, then return to it so
    /// later branches fork from the same base instead of stacking.
    async fn create_branch(&self, branch: &str) -> Result<()> {
        let base = self.current_branch().await;
        let out = self.git(&["checkout", "-b", branch]).await?;
        if !out.success() {
            // Branch may already exist from a previous attempt.
            let existing = self.git(&["checkout", branch]).await?;
            if !existing.success() {
                return Err(EvoError::GithubApi(existing.diagnostics().to_string()));
            }
        }
        let push = self.git(&["push", "-u", "origin", branch]).await?;
        if !push.success() {
            warn!(branch, "push failed; branch exists only locally");
        }
        if let Some(base) = base {
            if let Err(e) = self.git_ok(&["checkout", &base]).await {
                warn!(base = %base, error = %e, "could not return to base branch");
            }
        }
        Ok(())
    }

    async fn current_branch(&self) -> Option<String> {
        match self.git(&["rev-parse", "--abbrev-ref", "HEAD"]).await {
            Ok(o) if o.success() => Some(o.stdout.trim().to_string()),
            _ => None,
        }
    }

    /// Best-effort board move; returns whether it took effect. Edits the
    /// card's Status field to the mapped column.
    async fn move_board_card(&self, issue: u64, status: &str) -> bool {
        let Some(project) = self.config.project_id.clone() else {
            return false;
        };
        let column = board_column(status);
        let args = board_edit_args(&project, column, issue);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        match self.gh(&args).await {
            Ok(o) if o.success() => {
                info!(issue, column, "board card moved");
                true
            }
            Ok(o) => {
                warn!(issue, column, error = %o.diagnostics(), "board update failed");
                false
            }
            Err(e) => {
                warn!(issue, column, error = %e, "board update failed");
                false
            }
        }
    }

    // -----------------------------------------------------------------------
    // complete_workflow
    // -----------------------------------------------------------------------

    /// Commit and push the work, open a PR and, when configured, merge and
    /// release. The one hard error is an untracked issue number; everything
    /// remote degrades to logged warnings and the deterministic fallback PR
    /// URL.
    pub async fn complete_workflow(
        &mut self,
        issue: u64,
        modified_files: &[String],
    ) -> Result<WorkflowResult> {
        let tracked = self
            .issues
            .get(&issue)
            .cloned()
            .ok_or(EvoError::UnknownIssue(issue))?;

        self.commit_and_push(&tracked, modified_files).await;

        self.move_board_card(issue, "Testing").await;
        if let Some(t) = self.issues.get_mut(&issue) {
            t.status = IssueStatus::Testing;
        }

        let pr_url = match self.create_pr(&tracked).await {
            Ok(url) => url,
            Err(e) => {
                warn!(issue, error = %e, "PR creation failed, using fallback URL");
                fallback_pr_url(&self.config.owner, &self.config.repo, issue)
            }
        };

        let mut merged = false;
        let mut released = None;
        if self.auto_merge {
            if self.checks_green(&pr_url).await {
                merged = self.merge_pr(&pr_url).await;
                if merged {
                    self.move_board_card(issue, "Done").await;
                    self.close_issue(issue).await;
                    self.issues.remove(&issue);
                    if self.auto_versioning {
                        released = self.publish_release(tracked.improvement.kind).await;
                    }
                }
            } else {
                info!(issue, pr = %pr_url, "checks not green; leaving PR for manual follow-up");
            }
        }

        Ok(WorkflowResult {
            issue,
            pr_url,
            merged,
            released,
        })
    }

    async fn commit_and_push(&self, tracked: &TrackedIssue, modified_files: &[String]) {
        if modified_files.is_empty() {
            return;
        }
        let base = self.current_branch().await;
        if let Err(e) = self.git_ok(&["checkout", &tracked.branch]).await {
            warn!(branch = %tracked.branch, error = %e, "checkout of work branch failed");
            return;
        }
        let mut add_args = vec!["add", "--"];
        add_args.extend(modified_files.iter().map(String::as_str));
        if let Err(e) = self.git_ok(&add_args).await {
            warn!(error = %e, "git add failed");
        } else {
            let message = commit_message(&tracked.improvement, tracked.number);
            if let Err(e) = self.git_ok(&["commit", "-m", &message]).await {
                warn!(error = %e, "git commit failed");
            } else if let Err(e) = self.git_ok(&["push", "origin", &tracked.branch]).await {
                warn!(branch = %tracked.branch, error = %e, "git push failed");
            }
        }
        if let Some(base) = base {
            if let Err(e) = self.git_ok(&["checkout", &base]).await {
                warn!(base = %base, error = %e, "could not return to base branch");
            }
        }
    }

    async fn create_pr(&self, tracked: &TrackedIssue) -> Result<String> {
        let slug = self.config.slug();
        let title = issue_title(&tracked.improvement);
        let body = format!(
            "Closes #{}.\n\nAutomated change validated in the sandbox quality gate.",
            tracked.number
        );
        let out = self
            .gh(&[
                "pr", "create", "--repo", &slug, "--head", &tracked.branch, "--title", &title,
                "--body", &body,
            ])
            .await?;
        if !out.success() {
            return Err(EvoError::GithubApi(out.diagnostics().to_string()));
        }
        let url = out.stdout.trim().to_string();
        if url.is_empty() {
            return Err(EvoError::GithubApi("pr create returned no URL".to_string()));
        }
        Ok(url)
    }

    async fn checks_green(&self, pr_url: &str) -> bool {
        let out = self
            .gh(&["pr", "view", pr_url, "--json", "statusCheckRollup"])
            .await;
        let Ok(out) = out else { return false };
        if !out.success() {
            return false;
        }
        match parse_check_rollup(&out.stdout) {
            Ok(checks) => all_checks_passing(&checks),
            Err(e) => {
                warn!(error = %e, "unparseable check rollup");
                false
            }
        }
    }

    async fn merge_pr(&self, pr_url: &str) -> bool {
        match self.gh(&["pr", "merge", pr_url, "--auto", "--squash"]).await {
            Ok(o) if o.success() => {
                info!(pr = %pr_url, "merge queued");
                true
            }
            Ok(o) => {
                warn!(pr = %pr_url, error = %o.diagnostics(), "merge failed");
                false
            }
            Err(e) => {
                warn!(pr = %pr_url, error = %e, "merge failed");
                false
            }
        }
    }

    async fn close_issue(&self, issue: u64) {
        let slug = self.config.slug();
        let number = issue.to_string();
        match self
            .gh(&["issue", "close", &number, "--repo", &slug])
            .await
        {
            Ok(o) if o.success() => info!(issue, "issue closed"),
            Ok(o) => warn!(issue, error = %o.diagnostics(), "issue close failed"),
            Err(e) => warn!(issue, error = %e, "issue close failed"),
        }
    }

    // -----------------------------------------------------------------------
    // Releases
    // -----------------------------------------------------------------------

    /// Cut the next release for an improvement kind. The version only
    /// advances when the release actually publishes.
    pub async fn publish_release(&mut self, kind: ImprovementKind) -> Option<Version> {
        let next = self.current_version.bumped(kind);
        let tag = next.tag();
        let title = format!("Release {next}");
        let notes = release_notes(
            self.current_version,
            next,
            kind,
            &self.config.owner,
            &self.config.repo,
        );
        let slug = self.config.slug();
        let out = self
            .gh(&[
                "release", "create", &tag, "--repo", &slug, "--title", &title, "--notes", &notes,
            ])
            .await;
        match out {
            Ok(o) if o.success() => {
                info!(version = %next, "release published");
                self.current_version = next;
                Some(next)
            }
            Ok(o) => {
                warn!(version = %next, error = %o.diagnostics(), "release failed");
                None
            }
            Err(e) => {
                warn!(version = %next, error = %e, "release failed");
                None
            }
        }
    }

    // -----------------------------------------------------------------------
    // Pull mode
    // -----------------------------------------------------------------------

    /// Open issues on the remote, for classifying externally filed work.
    pub async fn fetch_open_issues(&self) -> Result<Vec<RemoteIssue>> {
        let slug = self.config.slug();
        let out = self
            .gh(&[
                "issue", "list", "--repo", &slug, "--state", "open", "--json",
                "number,title,labels,assignees",
            ])
            .await?;
        if !out.success() {
            return Err(EvoError::GithubApi(out.diagnostics().to_string()));
        }
        let issues: Vec<RemoteIssue> = serde_json::from_str(out.stdout.trim())?;
        Ok(issues)
    }

    // -----------------------------------------------------------------------
    // Subprocess plumbing
    // -----------------------------------------------------------------------

    async fn gh(&self, args: &[&str]) -> Result<CmdOutput> {
        proc::run("gh", args, &self.root)
            .await
            .map_err(|e| EvoError::GithubApi(e.to_string()))
    }

    async fn git(&self, args: &[&str]) -> Result<CmdOutput> {
        proc::run("git", args, &self.root)
            .await
            .map_err(|e| EvoError::GithubApi(e.to_string()))
    }

    async fn git_ok(&self, args: &[&str]) -> Result<()> {
        let out = self.git(args).await?;
        if !out.success() {
            return Err(EvoError::GithubApi(out.diagnostics().to_string()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Pure helpers
// ---------------------------------------------------------------------------

/// Work branch for an improvement: `auto/{kind}/issue-{number}`.
pub fn branch_name(kind: ImprovementKind, issue: u64) -> String {
    format!(
        "auto/{}/issue-{issue}",
        sanitize_branch_component(kind.as_str())
    )
}

/// Keep a branch path component to alphanumerics, hyphens and underscores.
fn sanitize_branch_component(text: &str) -> String {
    let mut out: String = text
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();
    while out.contains("--") {
        out = out.replace("--", "-");
    }
    out.trim_matches('-').to_string()
}

pub fn issue_title(improvement: &Improvement) -> String {
    format!(
        "{} {}",
        improvement.kind.title_prefix(),
        improvement.summary()
    )
}

pub fn issue_body(improvement: &Improvement) -> String {
    let mut body = String::from("## Automated improvement\n\n");
    body.push_str(&format!(
        "Priority: {}\n",
        improvement.priority.as_str().to_uppercase()
    ));
    body.push_str(&format!("Cycle #{}\n\n", improvement.cycle));
    body.push_str("Detected items:\n");
    for item in &improvement.payload {
        body.push_str(&format!("- {item}\n"));
    }
    body.push_str("\nOpened automatically by the evolution engine.\n");
    body
}

pub fn commit_message(improvement: &Improvement, issue: u64) -> String {
    format!(
        "Apply {} improvement for #{issue}\n\n{}",
        improvement.kind.as_str().replace('_', " "),
        improvement.summary()
    )
}

/// Deterministic stand-in when `gh pr create` fails; the same issue always
/// maps to the same URL.
pub fn fallback_pr_url(owner: &str, repo: &str, issue: u64) -> String {
    format!("https://github.com/{owner}/{repo}/pull/auto-{issue}")
}

/// An empty rollup means no checks are configured, which passes. Otherwise
/// every check's state must be SUCCESS or NEUTRAL; PENDING blocks.
pub fn all_checks_passing(checks: &[CheckRun]) -> bool {
    checks
        .iter()
        .all(|c| matches!(c.state.as_str(), "SUCCESS" | "NEUTRAL"))
}

fn parse_check_rollup(stdout: &str) -> Result<Vec<CheckRun>> {
    let value: serde_json::Value = serde_json::from_str(stdout.trim())?;
    let rollup = value
        .get("statusCheckRollup")
        .cloned()
        .unwrap_or(serde_json::Value::Array(Vec::new()));
    if rollup.is_null() {
        return Ok(Vec::new());
    }
    let checks: Vec<CheckRun> = serde_json::from_value(rollup)?;
    Ok(checks)
}

/// Fixed board column mapping; unmapped statuses pass through unchanged.
pub fn board_column(status: &str) -> &str {
    match status {
        "Testing" => "In Progress",
        other => other,
    }
}

/// `gh project item-edit` invocation that sets a card's Status field.
pub fn board_edit_args(project_id: &str, column: &str, issue: u64) -> Vec<String> {
    vec![
        "project".to_string(),
        "item-edit".to_string(),
        "--project-id".to_string(),
        project_id.to_string(),
        "--field-id".to_string(),
        "Status".to_string(),
        "--single-select-option-id".to_string(),
        column.to_string(),
        format!("#{issue}"),
    ]
}

pub fn release_notes(
    old: Version,
    new: Version,
    kind: ImprovementKind,
    owner: &str,
    repo: &str,
) -> String {
    format!(
        "## {new}\n\nAutomated {} release.\n\n**Full Changelog**: https://github.com/{owner}/{repo}/compare/{}...{}\n",
        kind.as_str().replace('_', " "),
        old.tag(),
        new.tag(),
    )
}

/// Issue number from the URL `gh issue create` prints.
pub fn parse_issue_number(url: &str) -> Option<u64> {
    url.rsplit('/').next()?.parse().ok()
}

/// Classify an externally filed issue into an improvement, or None when it
/// isn't actionable (already assigned, or one of our own auto issues).
pub fn issue_to_improvement(issue: &RemoteIssue, cycle: u64) -> Option<Improvement> {
    if !issue.assignees.is_empty() {
        return None;
    }
    let auto_prefix = ImprovementKind::all()
        .iter()
        .any(|k| issue.title.starts_with(k.title_prefix()));
    if auto_prefix {
        return None;
    }

    let labels: Vec<&str> = issue.labels.iter().map(|l| l.name.as_str()).collect();
    let kind = if labels.contains(&"bug") {
        ImprovementKind::BugFix
    } else if labels.contains(&"performance") {
        ImprovementKind::Performance
    } else if labels.iter().any(|l| l.contains("test")) {
        ImprovementKind::TestCoverage
    } else {
        ImprovementKind::Feature
    };
    let priority = if labels.contains(&"priority:high") {
        Priority::High
    } else if labels.contains(&"priority:low") {
        Priority::Low
    } else {
        Priority::Medium
    };
    Some(Improvement::new(
        kind,
        priority,
        vec![issue.title.clone()],
        cycle,
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
