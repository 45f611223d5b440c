use crate::config::EvoConfig;
use crate::detect::ImprovementDetector;
use crate::error::Result;
use crate::generate::CodeGenerator;
use crate::github::GitHubSyncEngine;
use crate::quality::QualityGate;
use crate::sandbox::SandboxWorkspace;
use crate::state::EvolutionState;
use crate::types::Improvement;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Fixed back-off after a failed cycle, before the loop tries again.
const RETRY_BACKOFF_SECS: u64 = 60;

#[derive(Debug, Clone, Serialize)]
pub struct CycleSummary {
    pub cycle: u64,
    pub detected: usize,
    pub accepted: usize,
    pub rejected: usize,
}

// ---------------------------------------------------------------------------
// EvolutionScheduler
// ---------------------------------------------------------------------------

/// Drives the evolution loop: detect, generate, validate in the sandbox,
/// then promote accepted work to the main repository and its GitHub
/// lifecycle.
///
/// One improvement failing never aborts the cycle; a cycle failing never
/// stops the loop, it just backs off. Cancellation is cooperative through
/// the shared running flag, checked between cycles and between
/// improvements — in-flight subprocesses are left to finish.
pub struct EvolutionScheduler {
    root: PathBuf,
    config: EvoConfig,
    detector: ImprovementDetector,
    generator: CodeGenerator,
    sandbox: SandboxWorkspace,
    gate: QualityGate,
    github: GitHubSyncEngine,
    state: EvolutionState,
    running: Arc<AtomicBool>,
    restart_pending: bool,
}

impl EvolutionScheduler {
    pub fn new(root: &Path, config: EvoConfig) -> Result<Self> {
        let state = EvolutionState::load_or_default(root)?;
        let sandbox = SandboxWorkspace::new(root, config.sandbox_dir(root))?;
        let detector = ImprovementDetector::new(root, config.detection.clone());
        let gate = QualityGate::new(config.quality.clone());
        let github = GitHubSyncEngine::new(root, config.github.clone(), state.current_version)
            .with_policies(config.auto_merge, config.auto_versioning);
        Ok(Self {
            root: root.to_path_buf(),
            config,
            detector,
            generator: CodeGenerator::new(),
            sandbox,
            gate,
            github,
            state,
            running: Arc::new(AtomicBool::new(true)),
            restart_pending: false,
        })
    }

    /// Shared flag for cooperative shutdown (e.g. from a Ctrl-C handler).
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    pub fn state(&self) -> &EvolutionState {
        &self.state
    }

    // -----------------------------------------------------------------------
    // Loop
    // -----------------------------------------------------------------------

    pub async fn run_loop(&mut self) -> Result<()> {
        info!(
            interval_secs = self.config.evolution_interval_secs,
            "evolution loop started"
        );
        while self.running.load(Ordering::SeqCst) {
            match self.run_cycle().await {
                Ok(summary) => {
                    info!(
                        cycle = summary.cycle,
                        detected = summary.detected,
                        accepted = summary.accepted,
                        rejected = summary.rejected,
                        "cycle complete"
                    );
                    if self.restart_pending {
                        self.restart()?;
                    }
                    self.sleep_interruptible(self.config.evolution_interval_secs)
                        .await;
                }
                Err(e) => {
                    error!(error = %e, backoff_secs = RETRY_BACKOFF_SECS, "cycle failed");
                    self.sleep_interruptible(RETRY_BACKOFF_SECS).await;
                }
            }
        }
        info!("evolution loop stopped");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // One cycle
    // -----------------------------------------------------------------------

    pub async fn run_cycle(&mut self) -> Result<CycleSummary> {
        let cycle = self.state.cycle + 1;
        let improvements = self.detector.detect(cycle);
        info!(cycle, detected = improvements.len(), "detection complete");

        let mut accepted = 0;
        let mut rejected = 0;
        if !improvements.is_empty() {
            // A broken sandbox aborts the whole cycle; there is nowhere safe
            // to validate candidates.
            self.sandbox.setup().await?;

            for improvement in &improvements {
                if !self.running.load(Ordering::SeqCst) {
                    break;
                }
                match self.process(improvement).await {
                    Ok(true) => accepted += 1,
                    Ok(false) => rejected += 1,
                    Err(e) => {
                        warn!(kind = %improvement.kind, error = %e, "improvement failed");
                        if let Err(e) = self.sandbox.rollback().await {
                            warn!(error = %e, "rollback after failure also failed");
                        }
                        rejected += 1;
                    }
                }
            }
        }

        self.state
            .record_cycle(cycle, improvements.len(), accepted, rejected);
        self.state.set_version(self.github.current_version());
        self.state.save(&self.root)?;

        Ok(CycleSummary {
            cycle,
            detected: improvements.len(),
            accepted,
            rejected,
        })
    }

    /// Returns whether the improvement was accepted and promoted.
    async fn process(&mut self, improvement: &Improvement) -> Result<bool> {
        let artifact = self.generator.generate(improvement)?;
        self.sandbox.apply(&artifact)?;

        let report = self.gate.validate(self.sandbox.dir()).await?;
        if !self.gate.acceptable(&report) {
            info!(
                kind = %improvement.kind,
                tests_failed = report.tests_failed,
                coverage = report.coverage_percent,
                "rejected by quality gate"
            );
            self.sandbox.rollback().await?;
            return Ok(false);
        }

        let modified = self.sandbox.modified_files().await?;
        copy_files(self.sandbox.dir(), &self.root, &modified)?;
        info!(kind = %improvement.kind, files = modified.len(), "promoted to main repository");

        let outcome = self.github.sync_improvement(improvement).await;
        if let Some(issue) = outcome.issue {
            match self.github.complete_workflow(issue, &modified).await {
                Ok(result) => {
                    info!(issue, pr = %result.pr_url, merged = result.merged, "lifecycle synced");
                    if result.released.is_some() && self.config.restart_on_publish {
                        self.restart_pending = true;
                    }
                }
                Err(e) => warn!(issue, error = %e, "workflow completion failed"),
            }
        }
        Ok(true)
    }

    // -----------------------------------------------------------------------
    // Restart / sleep
    // -----------------------------------------------------------------------

    /// Replace the running process with a fresh copy of the current binary,
    /// picking up improvements that just landed. State is already persisted
    /// by the time this runs.
    #[cfg(unix)]
    fn restart(&self) -> Result<()> {
        use std::os::unix::process::CommandExt;
        let exe = std::env::current_exe()?;
        info!(exe = %exe.display(), "restarting after publish");
        let err = std::process::Command::new(exe)
            .args(std::env::args_os().skip(1))
            .exec();
        // exec only returns on failure
        Err(err.into())
    }

    #[cfg(not(unix))]
    fn restart(&self) -> Result<()> {
        warn!("in-place restart is not supported on this platform");
        Ok(())
    }

    /// Sleep in one-second slices so shutdown stays responsive.
    async fn sleep_interruptible(&self, secs: u64) {
        for _ in 0..secs {
            if !self.running.load(Ordering::SeqCst) {
                return;
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }
}

// ---------------------------------------------------------------------------
// Promotion
// ---------------------------------------------------------------------------

/// Copy validated files from the sandbox into the main repository, creating
/// parent directories. Files missing in the sandbox (deletions) are skipped.
fn copy_files(from: &Path, to: &Path, files: &[String]) -> Result<()> {
    for file in files {
        let src = from.join(file);
        if !src.is_file() {
            continue;
        }
        let dst = to.join(file);
        if let Some(parent) = dst.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(&src, &dst)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
