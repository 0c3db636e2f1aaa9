//! Cryptographic primitives for remote authentication
//!
//! This module provides the cryptographic building blocks of the
//! handshake:
//! - `keypair`: per-session RSA-2048 key pair, OAEP decryption and
//!   nonce proof computation
//! - `fingerprint`: public key fingerprint derivation
//!
//! All operations are synchronous and side-effect free apart from key
//! generation, which draws from the OS RNG.

pub mod error;
pub mod fingerprint;
pub mod keypair;

// Re-export commonly used types
pub use error::{CryptoError, CryptoResult};
pub use fingerprint::compute_fingerprint;
pub use keypair::SessionKeypair;

/// Verify that the OS cryptographic RNG is usable
///
/// Checked once, before any protocol activity begins: the entire
/// handshake is meaningless without a working random source.
pub fn ensure_available() -> CryptoResult<()> {
    use rand::RngCore;

    let mut probe = [0u8; 32];
    rand::rngs::OsRng
        .try_fill_bytes(&mut probe)
        .map_err(|e| CryptoError::Unavailable(e.to_string()))
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::OnceLock;

    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine as _;
    use rand::rngs::OsRng;
    use rsa::pkcs8::DecodePublicKey;
    use rsa::{Oaep, RsaPublicKey};
    use sha2::Sha256;

    use super::SessionKeypair;

    /// One key pair shared across tests; RSA keygen is too slow to repeat
    /// in every case.
    pub fn shared_keypair() -> &'static SessionKeypair {
        static KEYPAIR: OnceLock<SessionKeypair> = OnceLock::new();
        KEYPAIR.get_or_init(|| SessionKeypair::generate().unwrap())
    }

    /// Encrypt a plaintext to an encoded public key, the way the gateway
    /// encrypts nonces, user payloads and tickets.
    pub fn oaep_encrypt_b64(public_key_b64: &str, plaintext: &str) -> String {
        let der = BASE64.decode(public_key_b64).unwrap();
        let key = RsaPublicKey::from_public_key_der(&der).unwrap();
        let ciphertext = key
            .encrypt(&mut OsRng, Oaep::new::<Sha256>(), plaintext.as_bytes())
            .unwrap();
        BASE64.encode(ciphertext)
    }

    #[test]
    fn test_ensure_available() {
        assert!(super::ensure_available().is_ok());
    }
}
