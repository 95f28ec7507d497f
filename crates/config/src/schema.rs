/// Config schema: where sessions are stored and how they are exposed.
use {
    secrecy::Secret,
    serde::{Deserialize, Serialize, Serializer},
};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StashbotConfig {
    pub store: StoreConfig,
    pub session: SessionConfig,
}

impl StashbotConfig {
    /// Reject configurations that cannot produce a working store.
    pub fn validate(&self) -> anyhow::Result<()> {
        match &self.store {
            StoreConfig::S3(s3) => {
                if s3.bucket.trim().is_empty() {
                    anyhow::bail!("store.bucket: bucket name not specified");
                }
                if s3.access_key_id.is_some() != s3.secret_access_key.is_some() {
                    anyhow::bail!(
                        "store: access_key_id and secret_access_key must be set together"
                    );
                }
            },
            StoreConfig::File(file) => {
                if file.root.trim().is_empty() {
                    anyhow::bail!("store.root: directory not specified");
                }
            },
            StoreConfig::Memory => {},
        }
        if self.session.property.trim().is_empty() {
            anyhow::bail!("session.property must not be empty");
        }
        if self.session.content_type.trim().is_empty() {
            anyhow::bail!("session.content_type must not be empty");
        }
        Ok(())
    }
}

/// Backing store for session records, selected by `backend`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum StoreConfig {
    S3(S3StoreConfig),
    File(FileStoreConfig),
    /// Process-local; sessions are lost on restart.
    #[default]
    Memory,
}

impl StoreConfig {
    pub fn backend(&self) -> &'static str {
        match self {
            Self::S3(_) => "s3",
            Self::File(_) => "file",
            Self::Memory => "memory",
        }
    }
}

/// S3-compatible bucket. Credentials fall back to the `AWS_*` environment
/// variables when not given here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct S3StoreConfig {
    pub bucket: String,
    pub region: Option<String>,
    /// Custom endpoint for MinIO, R2, LocalStack, ...
    pub endpoint: Option<String>,
    pub key_prefix: Option<String>,
    pub access_key_id: Option<String>,
    #[serde(serialize_with = "serialize_redacted")]
    pub secret_access_key: Option<Secret<String>>,
    #[serde(serialize_with = "serialize_redacted")]
    pub session_token: Option<Secret<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FileStoreConfig {
    /// Directory holding one file per session key.
    pub root: String,
}

/// How the session middleware exposes and persists sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Context property the session is exposed under.
    pub property: String,
    /// Content type stored alongside each record.
    pub content_type: String,
    pub assign: AssignMode,
    pub key_scope: KeyScope,
    /// Pretty-print stored JSON.
    pub pretty: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            property: "session".into(),
            content_type: "application/json".into(),
            assign: AssignMode::default(),
            key_scope: KeyScope::default(),
            pretty: false,
        }
    }
}

/// Assignment semantics for the session property.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignMode {
    #[default]
    Replace,
    Merge,
}

/// Which identities make up a session key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyScope {
    /// One session per sender per chat: `"{sender}:{chat}"`.
    #[default]
    SenderChat,
    /// One session per sender across all chats.
    Sender,
    /// One session per chat, shared by all members.
    Chat,
}

fn serialize_redacted<S: Serializer>(
    value: &Option<Secret<String>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match value {
        Some(_) => serializer.serialize_some("[REDACTED]"),
        None => serializer.serialize_none(),
    }
}
