use std::path::PathBuf;

use {
    anyhow::{Context as _, Result},
    clap::{Args, Subcommand},
    serde_json::Value,
    stashbot_chain::{Chat, Context, User},
    stashbot_config::{StashbotConfig, StoreConfig},
    stashbot_sessions::{SessionKey, SessionMiddleware},
};

/// Which session to operate on: an explicit key, or one derived the same way
/// the bot derives it.
#[derive(Args, Debug)]
pub struct KeyArgs {
    /// Storage key, used verbatim.
    #[arg(long, conflicts_with_all = ["from", "chat", "update"])]
    key: Option<String>,

    /// Sender (user) id.
    #[arg(long, allow_negative_numbers = true)]
    from: Option<i64>,

    /// Chat id. Group chats have negative ids.
    #[arg(long, allow_negative_numbers = true)]
    chat: Option<i64>,

    /// Telegram update (JSON file) to derive the key from.
    #[arg(long, conflicts_with_all = ["from", "chat"])]
    update: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum SessionAction {
    /// Print the stored session.
    Show {
        #[command(flatten)]
        key: KeyArgs,
    },
    /// Replace the stored session. An empty value (`{}`, `null`, ...)
    /// deletes it.
    Set {
        #[command(flatten)]
        key: KeyArgs,
        /// New session as JSON.
        value: String,
    },
    /// Delete the stored session.
    Clear {
        #[command(flatten)]
        key: KeyArgs,
    },
}

pub async fn handle_session(action: SessionAction, config: &StashbotConfig) -> Result<()> {
    if matches!(config.store, StoreConfig::Memory) {
        anyhow::bail!(
            "the memory backend does not outlive this process; configure a `file` or `s3` \
             store (see `stashbot config check`)"
        );
    }
    let sessions = SessionMiddleware::from_config(config)?;
    match action {
        SessionAction::Show { key } => show(&sessions, &resolve_key(&sessions, &key)?).await,
        SessionAction::Set { key, value } => {
            set(&sessions, &resolve_key(&sessions, &key)?, &value).await
        },
        SessionAction::Clear { key } => clear(&sessions, &resolve_key(&sessions, &key)?).await,
    }
}

fn resolve_key(sessions: &SessionMiddleware, args: &KeyArgs) -> Result<SessionKey> {
    if let Some(key) = &args.key {
        anyhow::ensure!(!key.is_empty(), "--key must not be empty");
        return Ok(SessionKey::new(key.as_str()));
    }

    let ctx = if let Some(path) = &args.update {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let update: Value = serde_json::from_str(&raw)
            .with_context(|| format!("{} is not valid JSON", path.display()))?;
        Context::from_update(update)
            .with_context(|| format!("{} is not a Telegram update", path.display()))?
    } else {
        let mut ctx = Context::new(0);
        ctx.from = args.from.map(User::new);
        ctx.chat = args.chat.map(Chat::new);
        ctx
    };

    sessions.key_for(&ctx).ok_or_else(|| {
        anyhow::anyhow!("no session key: pass --key, --from/--chat or --update")
    })
}

async fn show(sessions: &SessionMiddleware, key: &SessionKey) -> Result<()> {
    let session = sessions.store().load(key).await?;
    if session.is_null() {
        println!("no session for {key}");
        return Ok(());
    }
    println!("{}", serde_json::to_string_pretty(&session)?);
    Ok(())
}

async fn set(sessions: &SessionMiddleware, key: &SessionKey, value: &str) -> Result<()> {
    let session: Value =
        serde_json::from_str(value).context("session value must be valid JSON")?;
    sessions.store().save(key, &session).await?;
    if stashbot_sessions::is_empty_session(&session) {
        println!("Session {key} cleared");
    } else {
        println!("Session {key} saved");
    }
    Ok(())
}

async fn clear(sessions: &SessionMiddleware, key: &SessionKey) -> Result<()> {
    sessions.store().delete(key).await?;
    println!("Session {key} cleared");
    Ok(())
}
