//! Public key fingerprint derivation

use base64::engine::general_purpose::{STANDARD as BASE64, URL_SAFE_NO_PAD};
use base64::Engine as _;
use sha2::{Digest, Sha256};

use super::error::{CryptoError, CryptoResult};

/// Derive the URL-safe fingerprint of an encoded public key
///
/// The fingerprint is the SHA-256 digest of the DER-encoded key,
/// URL-safe base64 encoded with padding stripped. The peer embeds it in
/// the scannable payload and reports it back; the session recomputes it
/// locally to verify the peer is addressing the right key.
///
/// Pure and deterministic: the same encoded key always yields the same
/// fingerprint.
pub fn compute_fingerprint(public_key_b64: &str) -> CryptoResult<String> {
    let der = BASE64
        .decode(public_key_b64)
        .map_err(|_| CryptoError::InvalidPublicKey)?;
    let digest = Sha256::digest(&der);
    Ok(URL_SAFE_NO_PAD.encode(digest))
}
