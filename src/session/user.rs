//! Decrypted account data

use super::error::AuthError;

/// CDN base for avatar assets
const CDN_BASE: &str = "https://cdn.discordapp.com";

/// Placeholder when the payload omits a display name
const UNKNOWN_USERNAME: &str = "Unknown";

/// Discriminator sentinel meaning "no discriminator"
pub const NO_DISCRIMINATOR: &str = "0";

/// The account that scanned the code
///
/// Decrypted from the `pending_ticket` payload, a colon-separated
/// `id:discriminator:avatar_hash:username` record. Immutable once
/// constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserData {
    /// Numeric account id, kept as a string
    pub id: String,
    /// Discriminator; `"0"` means the account has none
    pub discriminator: String,
    /// Avatar hash; empty means the default avatar
    pub avatar_hash: String,
    /// Account name
    pub username: String,
}

impl UserData {
    /// Parse the decrypted payload record
    pub fn parse(payload: &str) -> Result<Self, AuthError> {
        let parts: Vec<&str> = payload.split(':').collect();
        if parts.len() < 3 {
            return Err(AuthError::InvalidUserPayload(format!(
                "expected at least 3 fields, got {}",
                parts.len()
            )));
        }

        Ok(UserData {
            id: parts[0].to_string(),
            discriminator: parts[1].to_string(),
            avatar_hash: parts[2].to_string(),
            username: parts
                .get(3)
                .map(|s| s.to_string())
                .unwrap_or_else(|| UNKNOWN_USERNAME.to_string()),
        })
    }

    /// `name` for modern accounts, `name#discriminator` for legacy ones
    pub fn display_name(&self) -> String {
        if !self.discriminator.is_empty() && self.discriminator != NO_DISCRIMINATOR {
            format!("{}#{}", self.username, self.discriminator)
        } else {
            self.username.clone()
        }
    }

    /// Index of the default avatar asset for this account
    ///
    /// Modern accounts (sentinel discriminator) derive it from the
    /// snowflake id, legacy accounts from the discriminator value. The
    /// two branches use different moduli; the asymmetry comes from the
    /// upstream account numbering scheme and is intentional.
    pub fn default_avatar_index(&self) -> u64 {
        if self.discriminator == NO_DISCRIMINATOR {
            (self.id.parse::<u64>().unwrap_or(0) >> 22) % 6
        } else {
            self.discriminator.parse::<u64>().unwrap_or(0) % 5
        }
    }

    /// URL of the account's avatar image
    pub fn avatar_url(&self) -> String {
        if !self.avatar_hash.is_empty() {
            format!("{}/avatars/{}/{}.png", CDN_BASE, self.id, self.avatar_hash)
        } else {
            format!("{}/embed/avatars/{}.png", CDN_BASE, self.default_avatar_index())
        }
    }
}
