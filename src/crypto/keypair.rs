//! RSA session key pair
//!
//! Each login attempt owns a fresh RSA-2048 key pair. The public half is
//! exported as SubjectPublicKeyInfo DER and base64 encoded for the wire;
//! the private half never leaves this type. Only the encoded public key
//! and values derived from decryption cross the transport boundary.

use base64::engine::general_purpose::{STANDARD as BASE64, URL_SAFE_NO_PAD};
use base64::Engine as _;
use rand::rngs::OsRng;
use rsa::pkcs8::EncodePublicKey;
use rsa::{Oaep, RsaPrivateKey};
use sha2::{Digest, Sha256};

use super::error::{CryptoError, CryptoResult};

/// RSA modulus size in bits
pub const KEY_BITS: usize = 2048;

/// An asymmetric key pair bound to a single login session
pub struct SessionKeypair {
    private: RsaPrivateKey,
    public_b64: String,
}

impl SessionKeypair {
    /// Generate a fresh RSA-2048 key pair
    pub fn generate() -> CryptoResult<Self> {
        let private = RsaPrivateKey::new(&mut OsRng, KEY_BITS)
            .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;
        let spki = private
            .to_public_key()
            .to_public_key_der()
            .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;
        let public_b64 = BASE64.encode(spki.as_bytes());

        Ok(SessionKeypair {
            private,
            public_b64,
        })
    }

    /// The DER-encoded public key, base64 encoded for the wire
    pub fn public_key_b64(&self) -> &str {
        &self.public_b64
    }

    /// Decrypt a base64 OAEP ciphertext to a UTF-8 string
    ///
    /// OAEP with SHA-256 for both the digest and the mask generation
    /// function, no label. A failed decrypt implies corruption or
    /// tampering and is never retried.
    pub fn decrypt_b64(&self, ciphertext_b64: &str) -> CryptoResult<String> {
        let ciphertext = BASE64
            .decode(ciphertext_b64)
            .map_err(|_| CryptoError::DecryptionFailed)?;
        let plaintext = self
            .private
            .decrypt(Oaep::new::<Sha256>(), &ciphertext)
            .map_err(|_| CryptoError::DecryptionFailed)?;
        String::from_utf8(plaintext).map_err(|_| CryptoError::DecryptionFailed)
    }

    /// Solve a nonce challenge issued by the peer
    ///
    /// Decrypts the nonce, hashes the UTF-8 bytes of the decrypted value
    /// with SHA-256 and encodes the digest with URL-safe base64, padding
    /// stripped. Proves possession of the private key without
    /// transmitting it.
    pub fn nonce_proof(&self, encrypted_nonce_b64: &str) -> CryptoResult<String> {
        let nonce = self.decrypt_b64(encrypted_nonce_b64)?;
        if nonce.is_empty() {
            return Err(CryptoError::EmptyPayload);
        }
        let digest = Sha256::digest(nonce.as_bytes());
        Ok(URL_SAFE_NO_PAD.encode(digest))
    }
}

impl std::fmt::Debug for SessionKeypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material
        write!(f, "SessionKeypair({}...)", &self.public_b64[..16.min(self.public_b64.len())])
    }
}
