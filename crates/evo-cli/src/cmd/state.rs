use crate::output::{print_json, print_table};
use evo_core::state::EvolutionState;
use std::path::Path;

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let state = EvolutionState::load_or_default(root)?;

    if json {
        return print_json(&state);
    }

    println!("Version: {}", state.current_version);
    println!("Cycle:   {}", state.cycle);
    if state.history.is_empty() {
        println!("No cycles recorded yet.");
        return Ok(());
    }

    let rows = state
        .history
        .iter()
        .rev()
        .take(10)
        .map(|r| {
            vec![
                r.cycle.to_string(),
                r.detected.to_string(),
                r.accepted.to_string(),
                r.rejected.to_string(),
                r.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            ]
        })
        .collect();
    print_table(&["CYCLE", "DETECTED", "ACCEPTED", "REJECTED", "WHEN"], rows);
    Ok(())
}
