use serde_json::Value;

pub type CodecError = Box<dyn std::error::Error + Send + Sync>;

/// Converts sessions to and from the bytes kept in the object store.
pub trait SessionCodec: Send + Sync {
    fn encode(&self, session: &Value) -> Result<Vec<u8>, CodecError>;
    fn decode(&self, raw: &[u8]) -> Result<Value, CodecError>;
}

/// UTF-8 JSON, compact unless built with [`JsonCodec::pretty`].
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec {
    pretty: bool,
}

impl JsonCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pretty() -> Self {
        Self { pretty: true }
    }
}

impl SessionCodec for JsonCodec {
    fn encode(&self, session: &Value) -> Result<Vec<u8>, CodecError> {
        let bytes = if self.pretty {
            serde_json::to_vec_pretty(session)?
        } else {
            serde_json::to_vec(session)?
        };
        Ok(bytes)
    }

    fn decode(&self, raw: &[u8]) -> Result<Value, CodecError> {
        Ok(serde_json::from_slice(raw)?)
    }
}
