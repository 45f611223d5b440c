use crate::error::{EvoError, Result};
use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// GithubConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GithubConfig {
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub repo: String,
    /// GitHub Projects (v2) board number. Board sync is skipped when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
}

impl GithubConfig {
    pub fn slug(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }
}

// ---------------------------------------------------------------------------
// QualityConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityConfig {
    #[serde(default = "default_test_command")]
    pub test_command: String,
    /// Coverage report (JSON) produced by the test command, relative to the
    /// directory under validation.
    #[serde(default = "default_coverage_file")]
    pub coverage_file: String,
    #[serde(default = "default_min_coverage")]
    pub min_coverage: f64,
    #[serde(default = "default_test_timeout")]
    pub test_timeout_secs: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_checker: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_scanner: Option<String>,
}

fn default_test_command() -> String {
    "cargo test".to_string()
}

fn default_coverage_file() -> String {
    "coverage.json".to_string()
}

fn default_min_coverage() -> f64 {
    80.0
}

fn default_test_timeout() -> u64 {
    300
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            test_command: default_test_command(),
            coverage_file: default_coverage_file(),
            min_coverage: default_min_coverage(),
            test_timeout_secs: default_test_timeout(),
            type_checker: None,
            linter: None,
            security_scanner: None,
        }
    }
}

// ---------------------------------------------------------------------------
// DetectionConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_metrics_file")]
    pub metrics_file: String,
    #[serde(default = "default_max_error_patterns")]
    pub max_error_patterns: usize,
    #[serde(default = "default_max_markers")]
    pub max_markers: usize,
}

fn default_log_dir() -> String {
    "logs".to_string()
}

fn default_metrics_file() -> String {
    "metrics.json".to_string()
}

fn default_max_error_patterns() -> usize {
    5
}

fn default_max_markers() -> usize {
    10
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            log_dir: default_log_dir(),
            metrics_file: default_metrics_file(),
            max_error_patterns: default_max_error_patterns(),
            max_markers: default_max_markers(),
        }
    }
}

// ---------------------------------------------------------------------------
// EvoConfig (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvoConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub github: GithubConfig,
    /// Merge PRs automatically once all checks pass.
    #[serde(default)]
    pub auto_merge: bool,
    /// Cut a release (tag + notes) after each merged improvement.
    #[serde(default = "default_auto_versioning")]
    pub auto_versioning: bool,
    #[serde(default = "default_interval")]
    pub evolution_interval_secs: u64,
    /// Re-exec the running binary after publishing, picking up its own
    /// accepted improvements.
    #[serde(default)]
    pub restart_on_publish: bool,
    /// Sandbox checkout location. Defaults to a sibling `<repo>-sandbox`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sandbox_dir: Option<PathBuf>,
    #[serde(default)]
    pub quality: QualityConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
}

fn default_version() -> u32 {
    1
}

fn default_auto_versioning() -> bool {
    true
}

fn default_interval() -> u64 {
    300
}

impl Default for EvoConfig {
    fn default() -> Self {
        Self {
            version: 1,
            github: GithubConfig::default(),
            auto_merge: false,
            auto_versioning: default_auto_versioning(),
            evolution_interval_secs: default_interval(),
            restart_on_publish: false,
            sandbox_dir: None,
            quality: QualityConfig::default(),
            detection: DetectionConfig::default(),
        }
    }
}

impl EvoConfig {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            github: GithubConfig {
                owner: owner.into(),
                repo: repo.into(),
                project_id: None,
            },
            ..Self::default()
        }
    }

    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Err(EvoError::NotInitialized);
        }
        let data = std::fs::read_to_string(&path)?;
        let cfg: EvoConfig = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    /// Effective sandbox directory for a project rooted at `root`.
    pub fn sandbox_dir(&self, root: &Path) -> PathBuf {
        self.sandbox_dir
            .clone()
            .unwrap_or_else(|| paths::default_sandbox_dir(root))
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if self.github.owner.is_empty() || self.github.repo.is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "github.owner and github.repo must be set for lifecycle sync".to_string(),
            });
        }

        if !(0.0..=100.0).contains(&self.quality.min_coverage) {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: format!(
                    "quality.min_coverage={} is out of range [0, 100]",
                    self.quality.min_coverage
                ),
            });
        }

        if self.quality.test_command.trim().is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "quality.test_command is empty".to_string(),
            });
        }

        if self.evolution_interval_secs == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "evolution_interval_secs=0 runs cycles back to back".to_string(),
            });
        }

        if self.evolution_interval_secs < 60 && self.evolution_interval_secs > 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "evolution_interval_secs={} is unusually short (<60s)",
                    self.evolution_interval_secs
                ),
            });
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_roundtrip() {
        let cfg = EvoConfig::new("acme", "widgets");
        let yaml = serde_yaml::to_string(&cfg).unwrap();
        let parsed: EvoConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.github.owner, "acme");
        assert_eq!(parsed.github.repo, "widgets");
        assert_eq!(parsed.evolution_interval_secs, 300);
        assert_eq!(parsed.quality.min_coverage, 80.0);
    }

    #[test]
    fn minimal_yaml_gets_defaults() {
        let yaml = "github:\n  owner: acme\n  repo: widgets\n";
        let cfg: EvoConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.version, 1);
        assert!(!cfg.auto_merge);
        assert!(cfg.auto_versioning);
        assert_eq!(cfg.quality.test_timeout_secs, 300);
        assert_eq!(cfg.detection.max_error_patterns, 5);
        assert_eq!(cfg.detection.max_markers, 10);
    }

    #[test]
    fn load_missing_config_is_not_initialized() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            EvoConfig::load(dir.path()),
            Err(EvoError::NotInitialized)
        ));
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let mut cfg = EvoConfig::new("acme", "widgets");
        cfg.auto_merge = true;
        cfg.save(dir.path()).unwrap();
        let loaded = EvoConfig::load(dir.path()).unwrap();
        assert!(loaded.auto_merge);
        assert_eq!(loaded.github.slug(), "acme/widgets");
    }

    #[test]
    fn sandbox_dir_defaults_to_sibling() {
        let cfg = EvoConfig::new("acme", "widgets");
        let dir = cfg.sandbox_dir(Path::new("/work/widgets"));
        assert_eq!(dir, PathBuf::from("/work/widgets-sandbox"));
    }

    #[test]
    fn sandbox_dir_override_wins() {
        let mut cfg = EvoConfig::new("acme", "widgets");
        cfg.sandbox_dir = Some(PathBuf::from("/tmp/box"));
        assert_eq!(cfg.sandbox_dir(Path::new("/work/widgets")), PathBuf::from("/tmp/box"));
    }

    #[test]
    fn validate_missing_github_is_error() {
        let cfg = EvoConfig::default();
        let warnings = cfg.validate();
        assert!(warnings
            .iter()
            .any(|w| w.level == WarnLevel::Error && w.message.contains("github.owner")));
    }

    #[test]
    fn validate_coverage_out_of_range() {
        let mut cfg = EvoConfig::new("acme", "widgets");
        cfg.quality.min_coverage = 140.0;
        let warnings = cfg.validate();
        assert!(warnings.iter().any(|w| w.message.contains("out of range")));
    }

    #[test]
    fn validate_clean_config_has_no_warnings() {
        let cfg = EvoConfig::new("acme", "widgets");
        assert!(cfg.validate().is_empty());
    }
}
