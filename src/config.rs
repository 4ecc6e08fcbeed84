use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;

use crate::paths::paths;

/// Defaults for the `repofetch` binary, loaded from `config.toml`.
///
/// Every key is optional; command-line flags override what is set here.
///
/// Example TOML:
/// ```toml
/// timeout_secs = 120
/// bare         = false
/// ssh_agent    = true
/// username     = "git"
/// ```
#[derive(Debug, Default, Deserialize, Clone, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub timeout_secs: Option<u64>,
    pub bare: bool,
    pub ssh_agent: bool,
    pub username: Option<String>,
}

impl Settings {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

/// Load settings from the default location (see [`paths()`]).
///
/// A missing file is not an error and yields [`Settings::default`].
pub fn load_settings() -> Result<Settings> {
    load_settings_from(&paths().config)
}

/// # Errors
/// - Returns an error if the file exists but cannot be read.
/// - Returns an error if parsing the TOML fails.
pub fn load_settings_from(path: &Path) -> Result<Settings> {
    let txt = match fs::read_to_string(path) {
        Ok(txt) => txt,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Settings::default()),
        Err(e) => {
            return Err(e).with_context(|| format!("failed to read {}", path.display()));
        }
    };
    let settings: Settings = toml::from_str(&txt)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(settings)
}
