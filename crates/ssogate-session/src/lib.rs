//! Cookie-backed session store for ssogate
//!
//! Session values live entirely in the client: a JSON record sealed with
//! AES-256-GCM into a single `HttpOnly` cookie. Nothing is kept server-side.

pub mod cookie;
pub mod store;

pub use store::{SessionRecord, SessionStore, MAX_COOKIE_SIZE};
