//! Data directory layout and `nocturne.toml` loading.

use std::path::{Path, PathBuf};
use std::{env, fs};

use nocturne_core::CompileConfig;

use crate::error::{Result, StoreError};

pub const DATA_DIR_ENV: &str = "NOCTURNE_DATA_DIR";
pub const CONFIG_FILE: &str = "nocturne.toml";
pub const DB_FILE: &str = "nocturne.db";

/// `$NOCTURNE_DATA_DIR` if set, else `~/.nocturne`.
pub fn default_base_dir() -> PathBuf {
    match env::var(DATA_DIR_ENV) {
        Ok(dir) if !dir.trim().is_empty() => PathBuf::from(dir),
        _ => dirs_home().join(".nocturne"),
    }
}

fn dirs_home() -> PathBuf {
    env::var("HOME")
        .or_else(|_| env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

/// Create the data directory if needed and return the database path in it.
pub fn prepare_base_dir(base: &Path) -> Result<PathBuf> {
    fs::create_dir_all(base).map_err(|e| {
        StoreError::InvalidData(format!("failed to create {}: {e}", base.display()))
    })?;
    Ok(base.join(DB_FILE))
}

/// Load `nocturne.toml` from `base`, falling back to defaults when the file
/// does not exist. The result is validated.
pub fn load_config(base: &Path) -> Result<CompileConfig> {
    let path = base.join(CONFIG_FILE);
    let config = match fs::read_to_string(&path) {
        Ok(text) => {
            tracing::debug!("loading config from {}", path.display());
            parse_config(&text)?
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => CompileConfig::default(),
        Err(e) => return Err(e.into()),
    };
    Ok(config)
}

pub fn parse_config(text: &str) -> Result<CompileConfig> {
    let config: CompileConfig = toml::from_str(text)?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(load_config(dir.path()).unwrap(), CompileConfig::default());
    }

    #[test]
    fn test_partial_file_overrides() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE),
            "token_budget = 150\nutc_offset_hours = 1\nrng_seed = 7\n",
        )
        .unwrap();
        let config = load_config(dir.path()).unwrap();
        assert_eq!(config.token_budget, 150);
        assert_eq!(config.utc_offset_hours, 1);
        assert_eq!(config.rng_seed, Some(7));
        assert_eq!(config.deadline_ms, CompileConfig::default().deadline_ms);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            parse_config("drift_warning_threshold = 0.05"),
            Err(StoreError::Config(_))
        ));
        assert!(matches!(
            parse_config("token_budget = \"lots\""),
            Err(StoreError::Config(_))
        ));
    }

    #[test]
    fn test_prepare_creates_dir() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("nested").join("data");
        let db = prepare_base_dir(&base).unwrap();
        assert!(base.is_dir());
        assert_eq!(db, base.join(DB_FILE));
    }
}
