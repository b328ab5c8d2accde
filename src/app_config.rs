//! Application configuration loading for CLI defaults.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use transfer_core::upload::{MAX_WORKERS, MIN_WORKERS};
use transfer_core::{TransferConfig, WorkerSizing};

/// Longest accepted timeout, in milliseconds.
const MAX_TIMEOUT_MS: u64 = 3_600_000;

/// TOML-backed file configuration for engine defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    /// Default connect timeout in milliseconds.
    pub connect_timeout_ms: Option<u64>,
    /// Default read timeout in milliseconds.
    pub read_timeout_ms: Option<u64>,
    /// Fixed upload worker count; sized from available memory when unset.
    pub workers: Option<usize>,
    /// Memory budget in megabytes used to size the upload pool.
    pub memory_budget_mb: Option<u64>,
    /// Directory for resized image copies.
    pub scratch_dir: Option<PathBuf>,
    /// Directory relative file paths are resolved against.
    pub file_root: Option<PathBuf>,
}

impl FileConfig {
    /// Validates config values against runtime constraints.
    pub fn validate(&self) -> Result<()> {
        validate_timeout_ms("connect_timeout_ms", self.connect_timeout_ms)?;
        validate_timeout_ms("read_timeout_ms", self.read_timeout_ms)?;

        if let Some(workers) = self.workers
            && !(MIN_WORKERS..=MAX_WORKERS).contains(&workers)
        {
            bail!(
                "Invalid config value for `workers`: {workers}. Expected range: {MIN_WORKERS}..={MAX_WORKERS}"
            );
        }
        if self.workers.is_some() && self.memory_budget_mb.is_some() {
            bail!("Config values `workers` and `memory_budget_mb` are mutually exclusive");
        }
        Ok(())
    }

    /// Applies the file values over `base`.
    #[must_use]
    pub fn apply(&self, mut base: TransferConfig) -> TransferConfig {
        if let Some(ms) = self.connect_timeout_ms {
            base.connect_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = self.read_timeout_ms {
            base.read_timeout = Duration::from_millis(ms);
        }
        if let Some(workers) = self.workers {
            base.workers = WorkerSizing::Fixed(workers);
        } else if let Some(megabytes) = self.memory_budget_mb {
            base.workers = WorkerSizing::MemoryBudget(megabytes);
        }
        if let Some(dir) = &self.scratch_dir {
            base.scratch_dir.clone_from(dir);
        }
        if let Some(dir) = &self.file_root {
            base.file_root.clone_from(dir);
        }
        base
    }
}

fn validate_timeout_ms(field: &str, value: Option<u64>) -> Result<()> {
    let Some(value) = value else {
        return Ok(());
    };
    if !(1..=MAX_TIMEOUT_MS).contains(&value) {
        bail!("Invalid config value for `{field}`: {value}. Expected range: 1..={MAX_TIMEOUT_MS}");
    }
    Ok(())
}

/// Loaded config metadata.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// Resolved config path if a base directory is known.
    pub path: Option<PathBuf>,
    /// Parsed file config when a config file exists and was valid.
    pub config: Option<FileConfig>,
}

/// Resolves default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/native-transfer/config.toml`
/// 2. `$HOME/.config/native-transfer/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join("native-transfer")
                .join("config.toml"),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("native-transfer")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads config from `explicit` when given, else from the default path if present.
pub fn load_config(explicit: Option<&Path>) -> Result<LoadedConfig> {
    if let Some(path) = explicit {
        let config = load_file_config(path)?;
        return Ok(LoadedConfig {
            path: Some(path.to_path_buf()),
            config: Some(config),
        });
    }

    let path = resolve_default_config_path();
    let config = match path.as_deref() {
        Some(path_ref) if path_ref.exists() => Some(load_file_config(path_ref)?),
        _ => None,
    };
    Ok(LoadedConfig { path, config })
}

fn load_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let cfg: FileConfig = toml::from_str(raw)?;
    cfg.validate()?;
    Ok(cfg)
}
