use crate::config::DetectionConfig;
use crate::error::Result;
use crate::types::{Improvement, ImprovementKind, Priority};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Scans the main repository for improvement opportunities.
///
/// Detection is read-only and best-effort: a source that cannot be scanned
/// (missing directory, unreadable file, malformed JSON) contributes zero
/// improvements instead of failing the cycle.
pub struct ImprovementDetector {
    root: PathBuf,
    config: DetectionConfig,
}

impl ImprovementDetector {
    pub fn new(root: impl Into<PathBuf>, config: DetectionConfig) -> Self {
        Self {
            root: root.into(),
            config,
        }
    }

    /// Run every detection source for the given cycle. Each source yields at
    /// most one improvement carrying all of its findings as payload.
    pub fn detect(&self, cycle: u64) -> Vec<Improvement> {
        let mut out = Vec::new();

        match self.scan_logs() {
            Ok(patterns) if !patterns.is_empty() => out.push(Improvement::new(
                ImprovementKind::BugFix,
                Priority::High,
                patterns,
                cycle,
            )),
            Ok(_) => {}
            Err(e) => debug!(source = "logs", error = %e, "detection source skipped"),
        }

        match self.scan_metrics() {
            Ok(slow) if !slow.is_empty() => out.push(Improvement::new(
                ImprovementKind::Performance,
                Priority::Medium,
                slow,
                cycle,
            )),
            Ok(_) => {}
            Err(e) => debug!(source = "metrics", error = %e, "detection source skipped"),
        }

        match self.scan_coverage_gaps() {
            Ok(gaps) if !gaps.is_empty() => out.push(Improvement::new(
                ImprovementKind::TestCoverage,
                Priority::Medium,
                gaps,
                cycle,
            )),
            Ok(_) => {}
            Err(e) => debug!(source = "coverage", error = %e, "detection source skipped"),
        }

        match self.scan_markers() {
            Ok(markers) if !markers.is_empty() => out.push(Improvement::new(
                ImprovementKind::Feature,
                Priority::Low,
                markers,
                cycle,
            )),
            Ok(_) => {}
            Err(e) => debug!(source = "markers", error = %e, "detection source skipped"),
        }

        out
    }

    // -----------------------------------------------------------------------
    // Sources
    // -----------------------------------------------------------------------

    /// Distinct error lines from `*.log` files, capped at
    /// `max_error_patterns`.
    fn scan_logs(&self) -> Result<Vec<String>> {
        let log_dir = self.root.join(&self.config.log_dir);
        if !log_dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut seen = BTreeSet::new();
        let mut patterns = Vec::new();
        for entry in std::fs::read_dir(&log_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("log") {
                continue;
            }
            let content = std::fs::read_to_string(&path)?;
            for line in content.lines() {
                if patterns.len() >= self.config.max_error_patterns {
                    return Ok(patterns);
                }
                if is_error_line(line) && seen.insert(line.trim().to_string()) {
                    patterns.push(line.trim().to_string());
                }
            }
        }
        Ok(patterns)
    }

    /// Slow function names recorded in the metrics file.
    fn scan_metrics(&self) -> Result<Vec<String>> {
        let path = self.root.join(&self.config.metrics_file);
        if !path.is_file() {
            return Ok(Vec::new());
        }
        let data = std::fs::read_to_string(&path)?;
        let value: serde_json::Value = serde_json::from_str(&data)?;
        Ok(slow_function_names(&value))
    }

    /// `TODO:` / `FIXME:` marker texts from source files, capped at
    /// `max_markers`.
    fn scan_markers(&self) -> Result<Vec<String>> {
        let src = self.root.join("src");
        if !src.is_dir() {
            return Ok(Vec::new());
        }
        let mut markers = Vec::new();
        self.walk_markers(&src, &mut markers)?;
        markers.truncate(self.config.max_markers);
        Ok(markers)
    }

    fn walk_markers(&self, dir: &Path, markers: &mut Vec<String>) -> Result<()> {
        for entry in std::fs::read_dir(dir)? {
            if markers.len() >= self.config.max_markers {
                return Ok(());
            }
            let path = entry?.path();
            if path.is_dir() {
                self.walk_markers(&path, markers)?;
            } else if path.extension().and_then(|e| e.to_str()) == Some("rs") {
                let content = std::fs::read_to_string(&path)?;
                for line in content.lines() {
                    if markers.len() >= self.config.max_markers {
                        break;
                    }
                    if let Some(text) = marker_text(line) {
                        markers.push(text);
                    }
                }
            }
        }
        Ok(())
    }

    /// Source modules with no matching `tests/test_<module>.rs` file.
    fn scan_coverage_gaps(&self) -> Result<Vec<String>> {
        let src = self.root.join("src");
        if !src.is_dir() {
            return Ok(Vec::new());
        }
        let modules = module_stems(&src)?;
        let tests_dir = self.root.join("tests");
        let mut gaps = Vec::new();
        for module in modules {
            if !tests_dir.join(format!("test_{module}.rs")).is_file() {
                gaps.push(module);
            }
        }
        Ok(gaps)
    }
}

// ---------------------------------------------------------------------------
// Pure helpers
// ---------------------------------------------------------------------------

fn is_error_line(line: &str) -> bool {
    line.contains("ERROR") || line.contains("Exception") || line.contains("panicked at")
}

/// Extract the text after a `TODO:` or `FIXME:` marker, if any.
fn marker_text(line: &str) -> Option<String> {
    for marker in ["TODO:", "FIXME:"] {
        if let Some(pos) = line.find(marker) {
            let text = line[pos + marker.len()..].trim();
            if !text.is_empty() {
                return Some(text.to_string());
            }
        }
    }
    None
}

/// Names from a metrics document shaped like
/// `{"slow_functions": ["a", {"name": "b"}]}`.
fn slow_function_names(value: &serde_json::Value) -> Vec<String> {
    let Some(entries) = value.get("slow_functions").and_then(|v| v.as_array()) else {
        return Vec::new();
    };
    entries
        .iter()
        .filter_map(|e| {
            e.as_str()
                .map(str::to_string)
                .or_else(|| e.get("name").and_then(|n| n.as_str()).map(str::to_string))
        })
        .collect()
}

/// Top-level module stems under `src/`, excluding crate roots.
fn module_stems(src: &Path) -> Result<Vec<String>> {
    let mut stems = Vec::new();
    for entry in std::fs::read_dir(src)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("rs") {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        if matches!(stem, "main" | "lib" | "mod") {
            continue;
        }
        stems.push(stem.to_string());
    }
    stems.sort();
    Ok(stems)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
