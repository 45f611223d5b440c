use crate::output::print_json;
use anyhow::Context;
use evo_core::config::EvoConfig;
use evo_core::quality::QualityGate;
use std::path::Path;

pub async fn run(root: &Path, path: Option<&Path>, json: bool) -> anyhow::Result<()> {
    let config = EvoConfig::load(root).context("failed to load config")?;
    let target = path.unwrap_or(root);

    let gate = QualityGate::new(config.quality);
    let report = gate
        .validate(target)
        .await
        .with_context(|| format!("quality gate failed for {}", target.display()))?;
    let accepted = gate.acceptable(&report);

    if json {
        let value = serde_json::json!({
            "report": report,
            "accepted": accepted,
        });
        print_json(&value)?;
    } else {
        println!(
            "Tests:    {} passed, {} failed ({} total)",
            report.tests_passed, report.tests_failed, report.tests_total
        );
        println!("Coverage: {:.1}%", report.coverage_percent);
        if !report.low_coverage_files.is_empty() {
            println!("Low coverage files:");
            for low in &report.low_coverage_files {
                println!(
                    "  {} ({:.1}%, {} lines missed)",
                    low.file,
                    low.percent,
                    low.missing_lines.len()
                );
            }
        }
        println!("Score:    {}/100", report.quality_score);
        println!("Verdict:  {}", if accepted { "accepted" } else { "rejected" });
    }

    if !accepted {
        anyhow::bail!("quality gate rejected {}", target.display());
    }
    Ok(())
}
