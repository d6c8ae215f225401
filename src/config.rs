use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::storage::ErrorMode;

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct IndexiaConfig {
    pub database: Option<String>,
    /// Surface read failures instead of returning empty results
    pub strict_reads: Option<bool>,
}

impl IndexiaConfig {
    pub fn database_path(&self) -> PathBuf {
        self.database
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(default_database_path)
    }

    pub fn read_mode(&self) -> ErrorMode {
        match self.strict_reads {
            Some(true) => ErrorMode::Strict,
            _ => ErrorMode::Lenient,
        }
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("indexia.toml")
}

pub fn default_database_path() -> PathBuf {
    PathBuf::from("data").join("indexia.db")
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Option<IndexiaConfig>> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("reading config {}", path.display()))?;
    let config: IndexiaConfig = toml::from_str(&contents)
        .with_context(|| format!("parsing config {}", path.display()))?;
    Ok(Some(config))
}

pub fn write_config(path: &Path, config: &IndexiaConfig, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("config already exists at {} (use force to overwrite)", path.display());
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    Ok(())
}
