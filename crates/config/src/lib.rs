//! Configuration loading for stashbot.
//!
//! Config files (`stashbot.{toml,yaml,yml,json}`) are discovered in the
//! working directory, then in `~/.config/stashbot/`. `${ENV_VAR}`
//! placeholders are substituted before parsing.

pub mod env_subst;
pub mod loader;
pub mod schema;

pub use {
    loader::{
        clear_config_dir, config_dir, discover_and_load, find_config_file, load_config,
        set_config_dir,
    },
    schema::{
        AssignMode, FileStoreConfig, KeyScope, S3StoreConfig, SessionConfig, StashbotConfig,
        StoreConfig,
    },
};
