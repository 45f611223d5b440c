use anyhow::Context;
use evo_core::config::EvoConfig;
use evo_core::scheduler::EvolutionScheduler;
use std::path::Path;
use std::sync::atomic::Ordering;
use tracing::info;

pub async fn run(root: &Path, once: bool) -> anyhow::Result<()> {
    let config = EvoConfig::load(root).context("failed to load config")?;
    let mut scheduler =
        EvolutionScheduler::new(root, config).context("failed to build scheduler")?;

    if once {
        let summary = scheduler.run_cycle().await?;
        println!(
            "Cycle #{}: {} detected, {} accepted, {} rejected",
            summary.cycle, summary.detected, summary.accepted, summary.rejected
        );
        return Ok(());
    }

    let running = scheduler.running_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested, finishing current work");
            running.store(false, Ordering::SeqCst);
        }
    });

    scheduler.run_loop().await?;
    Ok(())
}
