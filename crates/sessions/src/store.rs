//! Session records on top of an [`ObjectStore`].

use std::sync::Arc;

use {
    serde_json::Value,
    stashbot_store::ObjectStore,
    tracing::{debug, trace},
};

use crate::{
    codec::{JsonCodec, SessionCodec},
    error::{Result, SessionError},
    key::SessionKey,
};

pub const DEFAULT_CONTENT_TYPE: &str = "application/json";

/// Whether `session` counts as "no session": `null`, any boolean or number,
/// and empty strings, arrays or objects. Such sessions are deleted instead of
/// stored.
pub fn is_empty_session(session: &Value) -> bool {
    match session {
        Value::Null | Value::Bool(_) | Value::Number(_) => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
    }
}

/// Loads, saves and deletes encoded sessions by key.
#[derive(Clone)]
pub struct SessionStore {
    store: Arc<dyn ObjectStore>,
    codec: Arc<dyn SessionCodec>,
    content_type: String,
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("backend", &self.store.name())
            .field("content_type", &self.content_type)
            .finish()
    }
}

impl SessionStore {
    /// JSON-encoded sessions stored as `application/json`.
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self::with_codec(store, Arc::new(JsonCodec::new()), DEFAULT_CONTENT_TYPE)
    }

    pub fn with_codec(
        store: Arc<dyn ObjectStore>,
        codec: Arc<dyn SessionCodec>,
        content_type: impl Into<String>,
    ) -> Self {
        Self {
            store,
            codec,
            content_type: content_type.into(),
        }
    }

    pub fn backend(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Session stored under `key`; `Value::Null` when there is none or the
    /// stored object is zero bytes long.
    ///
    /// Store failures and undecodable records are errors, never an empty
    /// session.
    pub async fn load(&self, key: &SessionKey) -> Result<Value> {
        let raw = self.store.get(key.as_str()).await.inspect_err(|_| {
            record("load", "error");
        })?;
        let Some(raw) = raw.filter(|raw| !raw.is_empty()) else {
            trace!(key = %key, "no stored session");
            record("load", "miss");
            return Ok(Value::Null);
        };
        let session = self
            .codec
            .decode(&raw)
            .map_err(|source| SessionError::Deserialize {
                key: key.to_string(),
                source,
            })?;
        debug!(key = %key, bytes = raw.len(), "session loaded");
        record("load", "hit");
        Ok(session)
    }

    /// Persist `session` under `key`, or delete the record when the session
    /// is empty. Overwrites unconditionally.
    pub async fn save(&self, key: &SessionKey, session: &Value) -> Result<()> {
        if is_empty_session(session) {
            return self.delete(key).await;
        }
        // Fully encoded before the store sees anything.
        let bytes = self
            .codec
            .encode(session)
            .map_err(|source| SessionError::Serialize {
                key: key.to_string(),
                source,
            })?;
        let len = bytes.len();
        self.store
            .put(key.as_str(), bytes, Some(self.content_type.as_str()))
            .await
            .inspect_err(|_| record("save", "error"))?;
        debug!(key = %key, bytes = len, backend = self.store.name(), "session saved");
        record("save", "ok");
        Ok(())
    }

    /// Remove the record under `key`. Missing records are fine.
    pub async fn delete(&self, key: &SessionKey) -> Result<()> {
        self.store
            .delete(key.as_str())
            .await
            .inspect_err(|_| record("delete", "error"))?;
        debug!(key = %key, backend = self.store.name(), "session deleted");
        record("delete", "ok");
        Ok(())
    }
}

#[cfg(feature = "metrics")]
fn record(op: &'static str, outcome: &'static str) {
    metrics::counter!("stashbot_session_store_ops_total", "op" => op, "outcome" => outcome)
        .increment(1);
}

#[cfg(not(feature = "metrics"))]
fn record(_op: &'static str, _outcome: &'static str) {}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::test_support::{FailOn, RecordingStore},
        rstest::rstest,
        serde_json::json,
        stashbot_store::MemoryStore,
    };

    fn key() -> SessionKey {
        SessionKey::from("1:2")
    }

    #[rstest]
    #[case::null(Value::Null)]
    #[case::empty_object(json!({}))]
    #[case::empty_array(json!([]))]
    #[case::empty_string(json!(""))]
    #[case::zero(json!(0))]
    #[case::number(json!(42))]
    #[case::falsy_bool(json!(false))]
    #[case::truthy_bool(json!(true))]
    fn empty_sessions(#[case] session: Value) {
        assert!(is_empty_session(&session));
    }

    #[rstest]
    #[case::object(json!({"count": 0}))]
    #[case::array(json!([null]))]
    #[case::string(json!("x"))]
    fn non_empty_sessions(#[case] session: Value) {
        assert!(!is_empty_session(&session));
    }

    #[rstest]
    #[case(Value::Null)]
    #[case(json!({}))]
    #[case(json!([]))]
    #[case(json!(0))]
    #[tokio::test]
    async fn saving_empty_session_deletes_record(#[case] session: Value) {
        let memory = Arc::new(MemoryStore::new());
        memory
            .put("1:2", br#"{"count":1}"#.to_vec(), None)
            .await
            .unwrap();
        let store = SessionStore::new(memory.clone());

        store.save(&key(), &session).await.unwrap();
        assert!(!memory.contains("1:2").await);
    }

    #[tokio::test]
    async fn round_trip() {
        let store = SessionStore::new(Arc::new(MemoryStore::new()));
        let session = json!({
            "count": 3,
            "name": "Ada",
            "flags": {"onboarded": true},
            "history": [1, "two", null, 4.5]
        });
        store.save(&key(), &session).await.unwrap();
        assert_eq!(store.load(&key()).await.unwrap(), session);
    }

    #[tokio::test]
    async fn missing_record_loads_as_null() {
        let store = SessionStore::new(Arc::new(MemoryStore::new()));
        assert_eq!(store.load(&key()).await.unwrap(), Value::Null);
    }

    #[tokio::test]
    async fn save_writes_json_with_content_type() {
        let memory = Arc::new(MemoryStore::new());
        let store = SessionStore::new(memory.clone());
        store.save(&key(), &json!({"count": 1})).await.unwrap();

        let object = memory.object("1:2").await.unwrap();
        assert_eq!(object.body, br#"{"count":1}"#);
        assert_eq!(object.content_type.as_deref(), Some("application/json"));
    }

    #[tokio::test]
    async fn custom_codec_and_content_type() {
        let memory = Arc::new(MemoryStore::new());
        let store = SessionStore::with_codec(
            memory.clone(),
            Arc::new(JsonCodec::pretty()),
            "application/vnd.stashbot+json",
        );
        store.save(&key(), &json!({"a": 1})).await.unwrap();

        let object = memory.object("1:2").await.unwrap();
        assert!(object.body.contains(&b'\n'));
        assert_eq!(
            object.content_type.as_deref(),
            Some("application/vnd.stashbot+json")
        );
        assert_eq!(store.load(&key()).await.unwrap(), json!({"a": 1}));
    }

    #[tokio::test]
    async fn zero_byte_record_loads_as_null() {
        let memory = Arc::new(MemoryStore::new());
        memory.put("1:2", Vec::new(), None).await.unwrap();
        let store = SessionStore::new(memory);
        assert_eq!(store.load(&key()).await.unwrap(), Value::Null);
    }

    #[tokio::test]
    async fn corrupt_record_is_an_error() {
        let memory = Arc::new(MemoryStore::new());
        memory.put("1:2", b"{not json".to_vec(), None).await.unwrap();
        let store = SessionStore::new(memory);

        let err = store.load(&key()).await.unwrap_err();
        assert!(matches!(err, SessionError::Deserialize { ref key, .. } if key == "1:2"));
    }

    #[tokio::test]
    async fn store_failure_on_load_is_an_error() {
        let recording = Arc::new(RecordingStore::failing(FailOn::Get));
        let store = SessionStore::new(recording);
        let err = store.load(&key()).await.unwrap_err();
        assert!(matches!(err, SessionError::Store(_)));
    }

    #[tokio::test]
    async fn store_failure_on_save_is_an_error() {
        let recording = Arc::new(RecordingStore::failing(FailOn::Put));
        let store = SessionStore::new(recording.clone());
        let err = store.save(&key(), &json!({"a": 1})).await.unwrap_err();
        assert!(matches!(err, SessionError::Store(_)));
        assert_eq!(recording.puts(), 1);
    }

    #[tokio::test]
    async fn deleting_missing_record_is_ok() {
        let recording = Arc::new(RecordingStore::new());
        let store = SessionStore::new(recording.clone());
        store.save(&key(), &json!({})).await.unwrap();
        store.delete(&key()).await.unwrap();
        assert_eq!(recording.deletes(), 2);
        assert_eq!(recording.puts(), 0);
    }
}
