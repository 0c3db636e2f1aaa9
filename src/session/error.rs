//! Protocol error taxonomy

use thiserror::Error;

use crate::crypto::CryptoError;
use crate::exchange::ExchangeError;
use crate::transport::TransportError;

/// Structured data carried by a captcha challenge
///
/// Fatal for this handshake, but the caller may act on the challenge
/// out-of-band.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptchaChallenge {
    /// Site key for the captcha widget
    pub sitekey: Option<String>,
    /// Captcha provider
    pub service: String,
    /// Provider request data
    pub rqdata: Option<String>,
    /// Provider request token
    pub rqtoken: Option<String>,
}

/// Fatal handshake failures
///
/// Cancellation and expiry are not errors: they surface as the
/// token-less `Ok(None)` outcome of `connect_and_wait`, with the
/// terminal state recording which one occurred. Display strings never
/// include key material or decrypted payload contents.
#[derive(Error, Debug)]
pub enum AuthError {
    /// Cryptographic failure: unavailable backend, key generation, or a
    /// decrypt that implies corruption or tampering
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// Transport failure while connecting or sending
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// An inbound frame was not valid JSON or had the wrong shape
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// The decrypted user payload did not match the expected record
    #[error("invalid user data format: {0}")]
    InvalidUserPayload(String),

    /// The peer-reported fingerprint does not match this session's key
    #[error("fingerprint verification failed")]
    FingerprintMismatch,

    /// The login is gated behind a captcha challenge
    #[error("captcha required for authentication")]
    CaptchaRequired(CaptchaChallenge),

    /// The ticket-for-token exchange failed
    #[error(transparent)]
    Exchange(#[from] ExchangeError),
}
