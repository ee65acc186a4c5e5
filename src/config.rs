//! Settings file for Hearth.
use regex::Regex;
use serde::Deserialize;
use std::{
    env, fs,
    path::{Path, PathBuf},
};

use crate::error::ConfigError;

/// Represents the structure of the optional YAML settings file.
///
/// Every field is optional; command-line flags take precedence over values here.
#[derive(Debug, Default, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Run mode name (`service`, `interactive`, `combined` or an alias).
    pub mode: Option<String>,
    /// Port the service listens at.
    pub port: Option<u16>,
    /// Directory holding persisted state.
    pub data_dir: Option<PathBuf>,
    /// Log file path.
    pub log_file: Option<PathBuf>,
    /// Log level name or 0-5 numeric.
    pub log_level: Option<String>,
    /// Whether to restore persisted service state at startup.
    pub restore: Option<bool>,
    /// Prefix of crash dump file names.
    pub crash_prefix: Option<String>,
    /// Main loop tick in milliseconds.
    pub tick_ms: Option<u64>,
}

/// Expands `$VAR` and `${VAR}` references. Unset variables are an error.
fn expand_env_vars(input: &str) -> Result<String, ConfigError> {
    let re = Regex::new(r"\$\{?([A-Za-z_][A-Za-z0-9_]*)\}?")?;

    if let Some(missing) = re
        .captures_iter(input)
        .map(|caps| caps[1].to_string())
        .find(|name| env::var(name).is_err())
    {
        return Err(ConfigError::MissingEnvVar(missing));
    }

    let result = re.replace_all(input, |caps: &regex::Captures| {
        env::var(&caps[1]).unwrap_or_default()
    });
    Ok(result.into_owned())
}

/// Loads and parses the settings file, expanding environment variables.
pub fn load_settings(path: &Path) -> Result<Settings, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let expanded = expand_env_vars(&content)?;
    if expanded.trim().is_empty() {
        return Ok(Settings::default());
    }

    let settings: Settings = serde_yaml::from_str(&expanded)?;
    Ok(settings)
}
