use crate::error::Result;
use crate::paths;
use crate::version::Version;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

// ---------------------------------------------------------------------------
// CycleRecord
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleRecord {
    pub cycle: u64,
    pub detected: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub timestamp: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// EvolutionState
// ---------------------------------------------------------------------------

/// Durable engine state, persisted between cycles and across controlled
/// restarts. Stored as JSON at `.evo/state.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvolutionState {
    #[serde(default = "default_version")]
    pub version: u32,
    /// Last completed cycle number; the next cycle is `cycle + 1`.
    pub cycle: u64,
    pub current_version: Version,
    #[serde(default)]
    pub history: Vec<CycleRecord>,
    pub last_updated: DateTime<Utc>,
}

fn default_version() -> u32 {
    1
}

impl Default for EvolutionState {
    fn default() -> Self {
        Self {
            version: 1,
            cycle: 0,
            current_version: Version::default(),
            history: Vec::new(),
            last_updated: Utc::now(),
        }
    }
}

impl EvolutionState {
    /// Load persisted state, falling back to a fresh state when none exists.
    pub fn load_or_default(root: &Path) -> Result<Self> {
        let path = paths::state_path(root);
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(&path)?;
        let state: EvolutionState = serde_json::from_str(&data)?;
        Ok(state)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::state_path(root);
        let data = serde_json::to_string_pretty(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    pub fn record_cycle(&mut self, cycle: u64, detected: usize, accepted: usize, rejected: usize) {
        self.cycle = cycle;
        self.history.push(CycleRecord {
            cycle,
            detected,
            accepted,
            rejected,
            timestamp: Utc::now(),
        });
        // Trim history to last 200 entries
        if self.history.len() > 200 {
            self.history.drain(..self.history.len() - 200);
        }
        self.last_updated = Utc::now();
    }

    pub fn set_version(&mut self, version: Version) {
        self.current_version = version;
        self.last_updated = Utc::now();
    }

    pub fn last_cycle(&self) -> Option<&CycleRecord> {
        self.history.last()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
