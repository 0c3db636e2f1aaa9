//! # qrauth
//!
//! Remote, QR-code-based login: the client proves possession of a
//! freshly generated key, displays a scannable fingerprint, and receives
//! a time-boxed, asymmetrically encrypted authorization ticket once a
//! second, already-authenticated device confirms the login. The ticket
//! is then traded for a durable token over HTTPS.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use qrauth::{AuthHandler, RemoteAuthClient};
//!
//! struct ShowQr;
//!
//! impl AuthHandler for ShowQr {
//!     fn on_qr_code(&self, url: &str, rendered: &str) {
//!         println!("{rendered}\nOr open: {url}");
//!     }
//! }
//!
//! # async fn demo() -> Result<(), qrauth::AuthError> {
//! let mut client = RemoteAuthClient::new(Arc::new(ShowQr));
//! match client.connect_and_wait(None).await? {
//!     Some(token) => println!("authenticated ({} chars)", token.len()),
//!     None => println!("cancelled or expired"),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │             APPLICATION LAYER               │
//! │   AuthHandler events  |  QrRenderer seam    │
//! └─────────────────────┬───────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────┐
//! │              PROTOCOL LAYER                 │
//! │ RemoteAuthClient state machine | heartbeats │
//! └──────────┬──────────────────────┬───────────┘
//!            │                      │
//! ┌──────────▼──────────┐ ┌─────────▼───────────┐
//! │    CRYPTO LAYER     │ │   EXCHANGE LAYER    │
//! │ RSA-OAEP | SHA-256  │ │ one-shot HTTPS POST │
//! └──────────┬──────────┘ └─────────────────────┘
//!            │
//! ┌──────────▼──────────────────────────────────┐
//! │             TRANSPORT LAYER                 │
//! │     WebSocket over TLS | in-memory pair     │
//! └─────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod crypto;
pub mod event;
pub mod exchange;
pub mod qr;
pub mod session;
pub mod transport;

// Re-export main types at crate root
pub use crypto::{compute_fingerprint, CryptoError, SessionKeypair};
pub use event::{AuthHandler, NullHandler};
pub use exchange::{ExchangeError, HttpExchanger, ProxySpec, TicketExchanger};
pub use qr::{PlainTextRenderer, QrRenderer};
pub use session::error::{AuthError, CaptchaChallenge};
pub use session::user::UserData;
pub use session::{qr_url, AuthState, CloseHandle, RemoteAuthClient, GATEWAY_URL};

use std::sync::Arc;
use std::time::Duration;

/// One-call convenience wrapper around [`RemoteAuthClient`]
///
/// Maps every failure, including cancellation and expiry, to `None`
/// after logging; use the client directly when the caller needs to
/// distinguish outcomes.
pub async fn authenticate_with_qr(
    handler: Arc<dyn AuthHandler>,
    proxy: Option<ProxySpec>,
    timeout: Option<Duration>,
) -> Option<String> {
    let mut client = RemoteAuthClient::new(handler);
    if let Some(proxy) = proxy {
        client = client.with_proxy(proxy);
    }

    match client.connect_and_wait(timeout).await {
        Ok(token) => token,
        Err(e) => {
            tracing::error!("remote auth failed: {e}");
            None
        }
    }
}
