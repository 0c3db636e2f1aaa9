//! Lifecycle event listener
//!
//! The state machine reports progress through an explicit listener
//! interface instead of bare callback fields, so invocation ordering and
//! thread of execution are part of the contract: every method is invoked
//! from the dispatch loop, sequentially, in frame order. Implementations
//! should return quickly; the protocol does not advance while a handler
//! runs.

use crate::session::error::AuthError;
use crate::session::user::UserData;

/// Listener for handshake lifecycle events
///
/// All methods default to no-ops; implement only what the surrounding
/// application needs.
pub trait AuthHandler: Send + Sync {
    /// The scannable code is ready
    ///
    /// `url` is the raw payload, `rendered` the text block produced by
    /// the configured renderer. Invoked exactly once per successful
    /// handshake, before any other event.
    fn on_qr_code(&self, url: &str, rendered: &str) {
        let _ = (url, rendered);
    }

    /// The peer scanned the code; carries the confirming account
    fn on_user_data(&self, user: &UserData) {
        let _ = user;
    }

    /// Login confirmed and the ticket exchanged; carries the token
    fn on_token(&self, token: &str) {
        let _ = token;
    }

    /// The handshake failed with a fatal error
    ///
    /// Not invoked for the benign cancelled / timed-out outcomes.
    fn on_error(&self, error: &AuthError) {
        let _ = error;
    }

    /// Scanned but not yet confirmed; still waiting on the peer
    fn on_waiting(&self) {}
}

/// Listener that ignores every event
pub struct NullHandler;

impl AuthHandler for NullHandler {}
