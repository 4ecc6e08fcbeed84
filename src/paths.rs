use std::{env, path::PathBuf};

#[derive(Clone)]
pub struct Paths {
    pub config: PathBuf,
}

/// `$XDG_CONFIG_HOME/repofetch`, falling back to `~/.config/repofetch`.
pub fn config_home() -> PathBuf {
    let xdg = env::var_os("XDG_CONFIG_HOME").filter(|v| !v.is_empty());
    let base = xdg
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(env::var_os("HOME").unwrap_or_default()).join(".config"));
    base.join("repofetch")
}

pub fn paths() -> Paths {
    Paths {
        config: config_home().join("config.toml"),
    }
}
