//! Payload encryption and integrity digests.
//!
//! Keys are derived with HKDF-SHA256 from the configured secret plus a salt
//! (the database name, so artifacts from different databases never share a
//! key). Payloads are sealed with AES-256-GCM; the random nonce is prepended
//! to the ciphertext. The GCM tag makes tampering and wrong-key decryption
//! detectable instead of returning garbage.

use crate::error::{MoverError, Result};
use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use hkdf::Hkdf;
use sha2::{Digest, Sha256};

/// AES-256-GCM nonce length in bytes.
const NONCE_LEN: usize = 12;

/// Encrypts, decrypts, and digests byte payloads for one database's
/// artifacts.
#[derive(Clone)]
pub struct CryptoHelper {
    key: [u8; 32],
}

impl CryptoHelper {
    /// Derive the sealing key from a secret and a salt. Deterministic: the
    /// same secret and salt always yield the same key.
    pub fn new(secret: &str, salt: &str) -> Self {
        let hk = Hkdf::<Sha256>::new(Some(salt.as_bytes()), secret.as_bytes());
        let mut key = [0u8; 32];
        // 32 bytes is always a valid HKDF-SHA256 output length
        hk.expand(b"datamover payload key", &mut key)
            .expect("hkdf expand with 32-byte output");
        Self { key }
    }

    /// Seal a plaintext payload. Output layout: `nonce || ciphertext+tag`.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|e| MoverError::Decryption(format!("invalid key length: {}", e)))?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext)
            .map_err(|_| MoverError::Decryption("encryption failed".into()))?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    /// Open a sealed payload. Fails with a Decryption error on a wrong key,
    /// truncated input, or any tampering; never returns unauthenticated
    /// bytes.
    pub fn decrypt(&self, sealed: &[u8]) -> Result<Vec<u8>> {
        if sealed.len() < NONCE_LEN {
            return Err(MoverError::Decryption(format!(
                "ciphertext too short: {} bytes",
                sealed.len()
            )));
        }

        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|e| MoverError::Decryption(format!("invalid key length: {}", e)))?;

        let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);

        cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| MoverError::Decryption("authentication tag mismatch".into()))
    }
}

/// Hex-encoded SHA-256 digest of a payload.
pub fn digest(payload: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let crypto = CryptoHelper::new("s3cret", "runner_1");
        for payload in [&b""[..], &b"x"[..], &[0u8; 4096][..]] {
            let sealed = crypto.encrypt(payload).unwrap();
            assert_ne!(sealed, payload);
            assert_eq!(crypto.decrypt(&sealed).unwrap(), payload);
        }
    }

    #[test]
    fn test_wrong_secret_fails() {
        let a = CryptoHelper::new("s3cret", "runner_1");
        let b = CryptoHelper::new("other", "runner_1");
        let sealed = a.encrypt(b"hello").unwrap();
        assert!(matches!(
            b.decrypt(&sealed),
            Err(MoverError::Decryption(_))
        ));
    }

    #[test]
    fn test_wrong_salt_fails() {
        let a = CryptoHelper::new("s3cret", "runner_1");
        let b = CryptoHelper::new("s3cret", "runner_2");
        let sealed = a.encrypt(b"hello").unwrap();
        assert!(b.decrypt(&sealed).is_err());
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let crypto = CryptoHelper::new("s3cret", "runner_1");
        let mut sealed = crypto.encrypt(b"hello").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;
        assert!(crypto.decrypt(&sealed).is_err());
    }

    #[test]
    fn test_truncated_ciphertext_fails() {
        let crypto = CryptoHelper::new("s3cret", "runner_1");
        assert!(crypto.decrypt(&[0u8; 4]).is_err());
    }

    #[test]
    fn test_key_derivation_is_deterministic() {
        let a = CryptoHelper::new("s3cret", "runner_1");
        let b = CryptoHelper::new("s3cret", "runner_1");
        let sealed = a.encrypt(b"hello").unwrap();
        assert_eq!(b.decrypt(&sealed).unwrap(), b"hello");
    }

    #[test]
    fn test_digest_is_stable_hex() {
        let d = digest(b"hello");
        assert_eq!(d.len(), 64);
        assert_eq!(d, digest(b"hello"));
        assert_ne!(d, digest(b"hello!"));
    }
}
