use std::{
    path::{Path, PathBuf},
    sync::Mutex,
};

use tracing::{debug, warn};

use crate::{env_subst::substitute_env, schema::StashbotConfig};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "stashbot.toml",
    "stashbot.yaml",
    "stashbot.yml",
    "stashbot.json",
];

/// Override for the config directory, set via `set_config_dir()`.
static CONFIG_DIR_OVERRIDE: Mutex<Option<PathBuf>> = Mutex::new(None);

/// Set a custom config directory. When set, discovery only looks in this
/// directory. Each call replaces the previous override.
pub fn set_config_dir(path: PathBuf) {
    *CONFIG_DIR_OVERRIDE
        .lock()
        .unwrap_or_else(|e| e.into_inner()) = Some(path);
}

/// Clear the config directory override, restoring default discovery.
pub fn clear_config_dir() {
    *CONFIG_DIR_OVERRIDE
        .lock()
        .unwrap_or_else(|e| e.into_inner()) = None;
}

fn config_dir_override() -> Option<PathBuf> {
    CONFIG_DIR_OVERRIDE
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .clone()
}

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> anyhow::Result<StashbotConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./stashbot.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/stashbot/stashbot.{toml,yaml,yml,json}` (user-global)
///
/// Returns `StashbotConfig::default()` if no config file is found or the one
/// found cannot be parsed.
pub fn discover_and_load() -> StashbotConfig {
    let Some(path) = find_config_file() else {
        debug!("no config file found, using defaults");
        return StashbotConfig::default();
    };
    debug!(path = %path.display(), "loading config");
    match load_config(&path) {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            StashbotConfig::default()
        },
    }
}

/// Find the first config file in standard locations.
///
/// When a config dir override is set, only that directory is searched.
pub fn find_config_file() -> Option<PathBuf> {
    if let Some(dir) = config_dir_override() {
        return first_existing(&dir);
    }

    // Project-local
    for name in CONFIG_FILENAMES {
        let p = PathBuf::from(name);
        if p.exists() {
            return Some(p);
        }
    }

    config_dir().and_then(|dir| first_existing(&dir))
}

fn first_existing(dir: &Path) -> Option<PathBuf> {
    CONFIG_FILENAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.exists())
}

/// Returns the config directory: override, or `~/.config/stashbot/`.
pub fn config_dir() -> Option<PathBuf> {
    if let Some(dir) = config_dir_override() {
        return Some(dir);
    }
    home_dir().map(|h| h.join(".config").join("stashbot"))
}

fn home_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf())
}

fn parse_config(raw: &str, path: &Path) -> anyhow::Result<StashbotConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    }
}
