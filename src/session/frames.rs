//! Wire frames
//!
//! Every gateway message is a JSON object tagged by an `op` field, with
//! opcode-specific payload fields beside it. Frames are transient: they
//! exist only for the duration of one dispatch turn.

use serde::{Deserialize, Serialize};

/// Session timeout applied when `hello` omits the field
pub const DEFAULT_TIMEOUT_MS: u64 = 120_000;

/// Heartbeat cadence applied when `hello` omits the field
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 41_250;

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_heartbeat_interval() -> u64 {
    DEFAULT_HEARTBEAT_INTERVAL_MS
}

fn default_captcha_service() -> String {
    "hcaptcha".to_string()
}

/// Frames received from the gateway
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Inbound {
    /// Session parameters; the first frame after connecting
    Hello {
        /// Overall session timeout in milliseconds
        #[serde(default = "default_timeout_ms")]
        timeout_ms: u64,
        /// Heartbeat cadence in milliseconds
        #[serde(default = "default_heartbeat_interval")]
        heartbeat_interval: u64,
    },

    /// Proof-of-possession challenge
    NonceProof {
        /// Nonce encrypted to the session public key
        encrypted_nonce: String,
    },

    /// The gateway's view of the session fingerprint
    PendingRemoteInit {
        /// Fingerprint the gateway derived from the announced key
        fingerprint: String,
    },

    /// The code was scanned; may carry the scanning account
    PendingTicket {
        /// Account record encrypted to the session public key
        #[serde(default)]
        encrypted_user_payload: Option<String>,
    },

    /// Login confirmed; carries the encrypted ticket
    PendingLogin {
        /// Ticket encrypted to the session public key
        ticket: String,
    },

    /// The peer-side user declined the login
    Cancel,

    /// Heartbeat acknowledgment
    HeartbeatAck,

    /// A captcha challenge gates the login
    Captcha {
        /// Site key for the captcha widget
        #[serde(default)]
        captcha_sitekey: Option<String>,
        /// Captcha provider
        #[serde(default = "default_captcha_service")]
        captcha_service: String,
        /// Provider request data
        #[serde(default)]
        captcha_rqdata: Option<String>,
        /// Provider request token
        #[serde(default)]
        captcha_rqtoken: Option<String>,
    },

    /// Catch-all for opcodes this client predates; logged and ignored
    #[serde(other)]
    Unknown,
}

impl Inbound {
    /// Parse one frame from its wire text
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Frames sent to the gateway
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Outbound {
    /// Announce the session public key
    Init {
        /// DER public key, base64 encoded
        encoded_public_key: String,
    },

    /// Answer to the nonce challenge
    NonceProof {
        /// Derived possession proof
        proof: String,
    },

    /// Keep-alive
    Heartbeat,
}

impl Outbound {
    /// Encode to wire text
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
