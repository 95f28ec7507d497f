//! Handler chain for incoming chat updates.
//!
//! A [`Chain`] runs an ordered list of [`Middleware`] around a terminal
//! [`Handler`]. Each middleware receives the mutable [`Context`] and a
//! [`Next`] it may run once to continue down the chain.

pub mod context;
pub mod middleware;

pub use {
    context::{AssignPolicy, Chat, Context, DEFAULT_SESSION_PROPERTY, SessionSlot, User},
    middleware::{Chain, Handler, Middleware, Next, handler_fn, middleware_fn},
};
