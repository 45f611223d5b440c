use crate::output::{print_json, print_table};
use anyhow::Context;
use evo_core::config::EvoConfig;
use evo_core::detect::ImprovementDetector;
use evo_core::state::EvolutionState;
use std::path::Path;

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let config = EvoConfig::load(root).context("failed to load config")?;
    let state = EvolutionState::load_or_default(root)?;

    let detector = ImprovementDetector::new(root, config.detection);
    let improvements = detector.detect(state.cycle + 1);

    if json {
        return print_json(&improvements);
    }

    if improvements.is_empty() {
        println!("No improvement opportunities detected.");
        return Ok(());
    }

    let rows = improvements
        .iter()
        .map(|i| {
            vec![
                i.kind.to_string(),
                i.priority.to_string(),
                i.payload.len().to_string(),
                i.summary(),
            ]
        })
        .collect();
    print_table(&["KIND", "PRIORITY", "ITEMS", "SUMMARY"], rows);
    Ok(())
}
