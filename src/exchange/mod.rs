//! One-shot ticket exchange against the HTTPS API
//!
//! After the peer confirms the login, the decrypted ticket is traded for
//! a long-lived token with a single POST. The connection, and any proxy
//! tunnel in front of it, lives only for the duration of the call and is
//! released on every exit path.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use thiserror::Error;
use tracing::info;

pub mod proxy;

pub use proxy::ProxySpec;

/// API host serving the login endpoint
pub const API_HOST: &str = "discord.com";

/// Path of the ticket login endpoint
pub const LOGIN_PATH: &str = "/api/v9/users/@me/remote-auth/login";

/// Request timeout for the exchange
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// User agent presented to the API
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// Maximum bytes of an unparseable error body carried into the error
const BODY_PREVIEW_LIMIT: usize = 200;

/// Errors from the ticket exchange
#[derive(Error, Debug)]
pub enum ExchangeError {
    /// The request could not be built, sent or read
    #[error("token exchange request failed: {0}")]
    Request(String),

    /// The API answered with a non-200 status
    #[error("token exchange failed (status {status}): {detail}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Parsed JSON error payload, or a raw text preview
        detail: String,
    },

    /// The 200 response carried no token field
    #[error("no token in exchange response")]
    NoTokenInResponse,
}

/// Trades a decrypted ticket for a long-lived token
///
/// Seam over the HTTPS call so the protocol state machine can be driven
/// in tests without a network.
#[async_trait]
pub trait TicketExchanger: Send + Sync {
    /// Exchange a ticket for a token
    async fn exchange(&self, ticket: &str) -> Result<String, ExchangeError>;
}

/// Production exchanger speaking HTTPS to the fixed API host
pub struct HttpExchanger {
    proxy: Option<ProxySpec>,
}

impl HttpExchanger {
    /// Create an exchanger, optionally tunnelling through a CONNECT proxy
    pub fn new(proxy: Option<ProxySpec>) -> Self {
        HttpExchanger { proxy }
    }
}

#[async_trait]
impl TicketExchanger for HttpExchanger {
    async fn exchange(&self, ticket: &str) -> Result<String, ExchangeError> {
        let mut builder = reqwest::Client::builder().timeout(REQUEST_TIMEOUT);
        if let Some(spec) = &self.proxy {
            let mut proxy = reqwest::Proxy::https(spec.url())
                .map_err(|e| ExchangeError::Request(e.to_string()))?;
            if let Some((user, pass)) = &spec.auth {
                proxy = proxy.basic_auth(user, pass);
            }
            builder = builder.proxy(proxy);
        }
        // Scoped acquisition: dropping the client at the end of this call
        // tears down the connection regardless of outcome.
        let client = builder
            .build()
            .map_err(|e| ExchangeError::Request(e.to_string()))?;

        let response = client
            .post(format!("https://{}{}", API_HOST, LOGIN_PATH))
            .header(reqwest::header::ACCEPT, "*/*")
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .json(&json!({ "ticket": ticket }))
            .send()
            .await
            .map_err(|e| ExchangeError::Request(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| ExchangeError::Request(e.to_string()))?;

        let token = parse_response(status, &body)?;
        info!("exchanged ticket for authentication token");
        Ok(token)
    }
}

/// Interpret an exchange response body
fn parse_response(status: u16, body: &[u8]) -> Result<String, ExchangeError> {
    if status != 200 {
        let detail = match serde_json::from_slice::<serde_json::Value>(body) {
            Ok(value) => value.to_string(),
            Err(_) => {
                String::from_utf8_lossy(&body[..body.len().min(BODY_PREVIEW_LIMIT)]).into_owned()
            }
        };
        return Err(ExchangeError::Status { status, detail });
    }

    let value: serde_json::Value =
        serde_json::from_slice(body).map_err(|e| ExchangeError::Request(e.to_string()))?;

    // `encrypted_token` wins over `token`; empty strings count as absent
    let token = value
        .get("encrypted_token")
        .and_then(|v| v.as_str())
        .filter(|t| !t.is_empty())
        .or_else(|| {
            value
                .get("token")
                .and_then(|v| v.as_str())
                .filter(|t| !t.is_empty())
        });

    token.map(str::to_string).ok_or(ExchangeError::NoTokenInResponse)
}
