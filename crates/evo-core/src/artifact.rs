use crate::error::{EvoError, Result};
use std::collections::BTreeMap;
use std::path::{Component, Path};

/// Files produced by a generation pass, keyed by repository-relative path.
///
/// The map is ordered so generated output (and the diffs it produces) is
/// deterministic for a given improvement. Inserting the same path twice
/// replaces the content, so re-running a generator is idempotent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeneratedArtifact {
    files: BTreeMap<String, String>,
}

impl GeneratedArtifact {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file. Paths must be relative and free of `..` components so an
    /// artifact can never write outside the workspace it is applied to.
    pub fn insert(&mut self, path: impl Into<String>, content: impl Into<String>) -> Result<()> {
        let path = path.into();
        validate_artifact_path(&path)?;
        self.files.insert(path, content.into());
        Ok(())
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.files.get(path).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.files.iter().map(|(p, c)| (p.as_str(), c.as_str()))
    }
}

fn validate_artifact_path(path: &str) -> Result<()> {
    let invalid = || EvoError::InvalidArtifactPath(path.to_string());
    if path.is_empty() {
        return Err(invalid());
    }
    let p = Path::new(path);
    if p.is_absolute() {
        return Err(invalid());
    }
    for component in p.components() {
        match component {
            Component::Normal(_) => {}
            _ => return Err(invalid()),
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_get() {
        let mut artifact = GeneratedArtifact::new();
        artifact.insert("src/bug_fixes.rs", "pub fn noop() {}").unwrap();
        assert_eq!(artifact.len(), 1);
        assert_eq!(artifact.get("src/bug_fixes.rs"), Some("pub fn noop() {}"));
    }

    #[test]
    fn reinsert_replaces_content() {
        let mut artifact = GeneratedArtifact::new();
        artifact.insert("src/a.rs", "one").unwrap();
        artifact.insert("src/a.rs", "two").unwrap();
        assert_eq!(artifact.len(), 1);
        assert_eq!(artifact.get("src/a.rs"), Some("two"));
    }

    #[test]
    fn rejects_absolute_paths() {
        let mut artifact = GeneratedArtifact::new();
        assert!(matches!(
            artifact.insert("/etc/passwd", "x"),
            Err(EvoError::InvalidArtifactPath(_))
        ));
    }

    #[test]
    fn rejects_parent_traversal() {
        let mut artifact = GeneratedArtifact::new();
        assert!(artifact.insert("../outside.rs", "x").is_err());
        assert!(artifact.insert("src/../../outside.rs", "x").is_err());
    }

    #[test]
    fn rejects_empty_path() {
        let mut artifact = GeneratedArtifact::new();
        assert!(artifact.insert("", "x").is_err());
    }

    #[test]
    fn paths_are_ordered() {
        let mut artifact = GeneratedArtifact::new();
        artifact.insert("tests/test_b.rs", "").unwrap();
        artifact.insert("src/a.rs", "").unwrap();
        let paths: Vec<&str> = artifact.paths().collect();
        assert_eq!(paths, vec!["src/a.rs", "tests/test_b.rs"]);
    }
}
