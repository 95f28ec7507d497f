use std::collections::HashMap;

use {
    serde::{Deserialize, Serialize},
    serde_json::{Map, Value},
};

/// Property name sessions are exposed under unless configured otherwise.
pub const DEFAULT_SESSION_PROPERTY: &str = "session";

/// Sender of an update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    #[serde(default)]
    pub first_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

impl User {
    pub fn new(id: i64) -> Self {
        Self {
            id,
            is_bot: false,
            first_name: String::new(),
            username: None,
        }
    }
}

/// Conversation an update belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    pub id: i64,
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl Chat {
    pub fn new(id: i64) -> Self {
        Self {
            id,
            kind: "private".into(),
            title: None,
        }
    }
}

/// What assigning a new value to a session property does.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignPolicy {
    /// The assigned value becomes the session.
    #[default]
    Replace,
    /// Top-level keys of an assigned object are merged into the current
    /// object. Anything that is not object-into-object replaces.
    Merge,
}

/// Live, request-scoped session cell installed on a [`Context`].
///
/// Reads and writes only touch memory; whoever installed the slot takes it
/// back with [`Context::take_slot`] once the request is done.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSlot {
    value: Value,
    assign: AssignPolicy,
}

impl SessionSlot {
    pub fn new(value: Value, assign: AssignPolicy) -> Self {
        Self { value, assign }
    }

    pub fn get(&self) -> &Value {
        &self.value
    }

    pub fn get_mut(&mut self) -> &mut Value {
        &mut self.value
    }

    pub fn set(&mut self, value: Value) {
        match (&mut self.value, value) {
            (Value::Object(current), Value::Object(incoming))
                if self.assign == AssignPolicy::Merge =>
            {
                current.extend(incoming);
            },
            (current, value) => *current = value,
        }
    }

    /// Reset to "no session", whatever the assign policy.
    pub fn clear(&mut self) {
        self.value = Value::Null;
    }

    pub fn into_inner(self) -> Value {
        self.value
    }
}

/// One incoming update and everything middleware attaches to it.
#[derive(Debug, Default)]
pub struct Context {
    pub update_id: i64,
    pub from: Option<User>,
    pub chat: Option<Chat>,
    pub text: Option<String>,
    /// Free-form per-request values shared between middleware.
    pub state: Map<String, Value>,
    slots: HashMap<String, SessionSlot>,
}

impl Context {
    pub fn new(update_id: i64) -> Self {
        Self {
            update_id,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_from(mut self, from: User) -> Self {
        self.from = Some(from);
        self
    }

    #[must_use]
    pub fn with_chat(mut self, chat: Chat) -> Self {
        self.chat = Some(chat);
        self
    }

    /// Build a context from a raw Telegram Bot API update object.
    ///
    /// Sender and chat come from the first of `message`, `edited_message`,
    /// `channel_post` or `callback_query` that is present.
    pub fn from_update(update: Value) -> serde_json::Result<Self> {
        let update: RawUpdate = serde_json::from_value(update)?;
        let mut ctx = Self::new(update.update_id);

        if let Some(msg) = update
            .message
            .or(update.edited_message)
            .or(update.channel_post)
        {
            ctx.from = msg.from;
            ctx.chat = Some(msg.chat);
            ctx.text = msg.text;
        } else if let Some(query) = update.callback_query {
            ctx.from = Some(query.from);
            if let Some(msg) = query.message {
                ctx.chat = Some(msg.chat);
            }
            ctx.text = query.data;
        }
        Ok(ctx)
    }

    // ── Session properties ──────────────────────────────────────────────

    /// The session under the default property, if session handling is
    /// active for this update. `Some(&Value::Null)` means "no session yet".
    pub fn session(&self) -> Option<&Value> {
        self.property(DEFAULT_SESSION_PROPERTY)
    }

    /// Mutable access to the default session. Indexing into a `Null` session
    /// turns it into an object, so `ctx.session_mut()?["count"] = 1.into()`
    /// works on a fresh conversation.
    pub fn session_mut(&mut self) -> Option<&mut Value> {
        self.property_mut(DEFAULT_SESSION_PROPERTY)
    }

    /// Assign the default session. Returns `false` when no session slot is
    /// installed (the update carries no session key).
    pub fn set_session(&mut self, value: Value) -> bool {
        self.set_property(DEFAULT_SESSION_PROPERTY, value)
    }

    /// End the default session; it is deleted from storage after the request.
    pub fn clear_session(&mut self) -> bool {
        self.clear_property(DEFAULT_SESSION_PROPERTY)
    }

    pub fn property(&self, name: &str) -> Option<&Value> {
        self.slots.get(name).map(SessionSlot::get)
    }

    pub fn property_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.slots.get_mut(name).map(SessionSlot::get_mut)
    }

    pub fn set_property(&mut self, name: &str, value: Value) -> bool {
        match self.slots.get_mut(name) {
            Some(slot) => {
                slot.set(value);
                true
            },
            None => false,
        }
    }

    pub fn clear_property(&mut self, name: &str) -> bool {
        match self.slots.get_mut(name) {
            Some(slot) => {
                slot.clear();
                true
            },
            None => false,
        }
    }

    pub fn has_slot(&self, name: &str) -> bool {
        self.slots.contains_key(name)
    }

    /// Install a slot, returning the one it displaced.
    pub fn install_slot(&mut self, name: &str, slot: SessionSlot) -> Option<SessionSlot> {
        self.slots.insert(name.to_string(), slot)
    }

    pub fn take_slot(&mut self, name: &str) -> Option<SessionSlot> {
        self.slots.remove(name)
    }
}

#[derive(Deserialize)]
struct RawUpdate {
    update_id: i64,
    message: Option<RawMessage>,
    edited_message: Option<RawMessage>,
    channel_post: Option<RawMessage>,
    callback_query: Option<RawCallbackQuery>,
}

#[derive(Deserialize)]
struct RawMessage {
    from: Option<User>,
    chat: Chat,
    text: Option<String>,
}

#[derive(Deserialize)]
struct RawCallbackQuery {
    from: User,
    message: Option<RawMessage>,
    data: Option<String>,
}
