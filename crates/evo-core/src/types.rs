use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// ImprovementKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImprovementKind {
    BugFix,
    TestCoverage,
    Performance,
    Feature,
}

impl ImprovementKind {
    pub fn all() -> &'static [ImprovementKind] {
        &[
            ImprovementKind::BugFix,
            ImprovementKind::TestCoverage,
            ImprovementKind::Performance,
            ImprovementKind::Feature,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ImprovementKind::BugFix => "bug_fix",
            ImprovementKind::TestCoverage => "test_coverage",
            ImprovementKind::Performance => "performance",
            ImprovementKind::Feature => "feature",
        }
    }

    /// Prefix used when opening a tracking issue for this kind.
    pub fn title_prefix(self) -> &'static str {
        match self {
            ImprovementKind::BugFix => "[BUG] Auto-Fix:",
            ImprovementKind::TestCoverage => "[TEST]",
            ImprovementKind::Performance => "[PERF]",
            ImprovementKind::Feature => "[FEAT]",
        }
    }

    /// GitHub label attached to issues of this kind.
    pub fn label(self) -> &'static str {
        match self {
            ImprovementKind::BugFix => "bug",
            _ => "enhancement",
        }
    }
}

impl fmt::Display for ImprovementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ImprovementKind {
    type Err = crate::error::EvoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bug_fix" => Ok(ImprovementKind::BugFix),
            "test_coverage" => Ok(ImprovementKind::TestCoverage),
            "performance" => Ok(ImprovementKind::Performance),
            "feature" => Ok(ImprovementKind::Feature),
            _ => Err(crate::error::EvoError::InvalidKind(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Priority
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Improvement
// ---------------------------------------------------------------------------

/// A detected improvement opportunity. Immutable once handed to the
/// generator: the engine never rewrites payloads after detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Improvement {
    pub kind: ImprovementKind,
    pub priority: Priority,
    /// Raw findings from the detector: error patterns, marker texts,
    /// module names, or slow-function names depending on `kind`.
    pub payload: Vec<String>,
    /// The evolution cycle that produced this improvement.
    pub cycle: u64,
}

impl Improvement {
    pub fn new(kind: ImprovementKind, priority: Priority, payload: Vec<String>, cycle: u64) -> Self {
        Self {
            kind,
            priority,
            payload,
            cycle,
        }
    }

    /// Short human-readable summary used in issue titles and commits.
    pub fn summary(&self) -> String {
        let first = self.payload.first().map(String::as_str).unwrap_or("");
        let mut s: String = first.chars().take(80).collect();
        if first.chars().count() > 80 {
            s.push('…');
        }
        s
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn kind_roundtrip() {
        for kind in ImprovementKind::all() {
            let parsed = ImprovementKind::from_str(kind.as_str()).unwrap();
            assert_eq!(*kind, parsed);
        }
    }

    #[test]
    fn kind_rejects_unknown() {
        assert!(ImprovementKind::from_str("refactor").is_err());
        assert!(ImprovementKind::from_str("").is_err());
    }

    #[test]
    fn kind_labels() {
        assert_eq!(ImprovementKind::BugFix.label(), "bug");
        assert_eq!(ImprovementKind::Feature.label(), "enhancement");
        assert_eq!(ImprovementKind::Performance.label(), "enhancement");
    }

    #[test]
    fn kind_title_prefixes() {
        assert_eq!(ImprovementKind::BugFix.title_prefix(), "[BUG] Auto-Fix:");
        assert_eq!(ImprovementKind::TestCoverage.title_prefix(), "[TEST]");
        assert_eq!(ImprovementKind::Performance.title_prefix(), "[PERF]");
        assert_eq!(ImprovementKind::Feature.title_prefix(), "[FEAT]");
    }

    #[test]
    fn priority_ordering() {
        assert!(Priority::High > Priority::Medium);
        assert!(Priority::Medium > Priority::Low);
    }

    #[test]
    fn summary_truncates_long_payloads() {
        let long = "x".repeat(200);
        let imp = Improvement::new(ImprovementKind::BugFix, Priority::High, vec![long], 1);
        assert!(imp.summary().chars().count() <= 81);
    }

    #[test]
    fn summary_of_empty_payload() {
        let imp = Improvement::new(ImprovementKind::Feature, Priority::Low, vec![], 1);
        assert_eq!(imp.summary(), "");
    }

    #[test]
    fn improvement_json_roundtrip() {
        let imp = Improvement::new(
            ImprovementKind::TestCoverage,
            Priority::Medium,
            vec!["parser".to_string()],
            4,
        );
        let json = serde_json::to_string(&imp).unwrap();
        assert!(json.contains("\"test_coverage\""));
        let parsed: Improvement = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.kind, ImprovementKind::TestCoverage);
        assert_eq!(parsed.cycle, 4);
    }
}
