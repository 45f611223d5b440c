use evo_core::config::EvoConfig;
use evo_core::{io, paths};
use std::path::Path;

pub fn run(root: &Path, owner: Option<&str>, repo: Option<&str>) -> anyhow::Result<()> {
    io::ensure_dir(&paths::evo_dir(root))?;

    let config = EvoConfig::new(owner.unwrap_or(""), repo.unwrap_or(""));
    let data = serde_yaml::to_string(&config)?;
    let written = io::write_if_missing(&paths::config_path(root), data.as_bytes())?;

    // Engine state is machine-local; never commit it.
    io::ensure_gitignore_entry(root, paths::STATE_FILE)?;

    if written {
        println!("Initialized evo in {}", root.display());
        if owner.is_none() || repo.is_none() {
            println!("Set github.owner and github.repo in {} before running.", paths::CONFIG_FILE);
        }
    } else {
        println!("evo is already initialized ({} exists).", paths::CONFIG_FILE);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn init_scaffolds_config_and_gitignore() {
        let dir = TempDir::new().unwrap();
        run(dir.path(), Some("acme"), Some("widgets")).unwrap();

        let config = EvoConfig::load(dir.path()).unwrap();
        assert_eq!(config.github.owner, "acme");

        let gitignore = std::fs::read_to_string(dir.path().join(".gitignore")).unwrap();
        assert!(gitignore.contains(".evo/state.json"));
    }

    #[test]
    fn init_is_idempotent() {
        let dir = TempDir::new().unwrap();
        run(dir.path(), Some("acme"), Some("widgets")).unwrap();
        run(dir.path(), Some("other"), Some("names")).unwrap();

        // The first config wins
        let config = EvoConfig::load(dir.path()).unwrap();
        assert_eq!(config.github.owner, "acme");
    }
}
