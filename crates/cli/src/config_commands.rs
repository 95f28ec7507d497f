use std::path::Path;

use {
    anyhow::Result,
    clap::Subcommand,
    stashbot_config::{StashbotConfig, StoreConfig},
    stashbot_sessions::open_store,
};

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Validate the config and open its store.
    Check,
    /// Print the effective config as TOML. Secrets are redacted.
    Show,
}

pub fn handle_config(
    action: ConfigAction,
    config: &StashbotConfig,
    path: Option<&Path>,
) -> Result<()> {
    match action {
        ConfigAction::Check => check(config, path),
        ConfigAction::Show => {
            print!("{}", render(config)?);
            Ok(())
        },
    }
}

fn check(config: &StashbotConfig, path: Option<&Path>) -> Result<()> {
    match path {
        Some(path) => println!("Config: {}", path.display()),
        None => println!("Config: none found, using defaults"),
    }
    config.validate()?;
    let store = open_store(&config.store)?;
    println!("Backend: {}", describe(&config.store, store.name()));
    println!(
        "Sessions: property={} content_type={} assign={:?} key_scope={:?}",
        config.session.property,
        config.session.content_type,
        config.session.assign,
        config.session.key_scope,
    );
    println!("OK");
    Ok(())
}

fn describe(store: &StoreConfig, name: &str) -> String {
    match store {
        StoreConfig::S3(s3) => {
            let mut out = format!("{name} (bucket {}", s3.bucket);
            if let Some(endpoint) = &s3.endpoint {
                out.push_str(&format!(", endpoint {endpoint}"));
            }
            if let Some(prefix) = &s3.key_prefix {
                out.push_str(&format!(", prefix {prefix}"));
            }
            out.push(')');
            out
        },
        StoreConfig::File(file) => format!("{name} ({})", file.root),
        StoreConfig::Memory => format!("{name} (sessions are lost on exit)"),
    }
}

fn render(config: &StashbotConfig) -> Result<String> {
    Ok(toml::to_string_pretty(config)?)
}
