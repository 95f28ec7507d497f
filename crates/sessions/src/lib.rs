//! Per-conversation session persistence.
//!
//! [`SessionMiddleware`] derives a key for each update (`"{sender}:{chat}"` by
//! default), loads the stored session, exposes it on the context for the rest
//! of the chain, and writes it back afterwards. Empty sessions are deleted
//! rather than stored.

pub mod codec;
pub mod error;
pub mod key;
pub mod middleware;
pub mod setup;
pub mod store;

#[cfg(test)]
mod test_support;

pub use {
    codec::{JsonCodec, SessionCodec},
    error::SessionError,
    key::{KeyFn, SessionKey, default_key, derive_key},
    middleware::{SessionMiddleware, SessionOptions},
    setup::open_store,
    store::{SessionStore, is_empty_session},
};
