//! Secure Memory Utilities
//!
//! Scoped handling of signing keys:
//! - Private keys held in zeroizing storage and never printed
//! - secp256k1 key objects erased when the signing scope ends
//! - Constant-time comparison

use crate::eip712::{Eip712Error, Eip712Result};
use secrecy::{ExposeSecret, SecretBox};
use std::fmt;
use std::ops::Deref;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

/// A 32-byte secp256k1 private key, zeroized when dropped.
pub struct PrivateKey {
    inner: SecretBox<[u8; 32]>,
}

impl PrivateKey {
    /// Copy key material out of a slice; the caller remains responsible for
    /// the source buffer.
    pub fn from_slice(bytes: &[u8]) -> Eip712Result<Self> {
        if bytes.len() != 32 {
            return Err(Eip712Error::InvalidKey(format!(
                "expected 32 bytes, got {}",
                bytes.len()
            )));
        }
        let mut key = Box::new([0u8; 32]);
        key.copy_from_slice(bytes);
        Ok(Self {
            inner: SecretBox::new(key),
        })
    }

    /// Parse a hex-encoded key (with or without `0x`). Intermediate buffers
    /// are zeroized.
    pub fn from_hex(hex_key: &str) -> Eip712Result<Self> {
        let trimmed = hex_key.trim();
        let digits = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let bytes = Zeroizing::new(
            hex::decode(digits).map_err(|_| Eip712Error::InvalidKey("invalid hex".to_string()))?,
        );
        Self::from_slice(&bytes)
    }

    pub(crate) fn expose(&self) -> &[u8; 32] {
        self.inner.expose_secret()
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKey([REDACTED])")
    }
}

/// A secp256k1 secret key that is erased when it goes out of scope, including
/// on early return and unwinding.
pub(crate) struct SecretKeyGuard {
    key: secp256k1::SecretKey,
}

impl SecretKeyGuard {
    pub(crate) fn new(private_key: &PrivateKey) -> Eip712Result<Self> {
        let key = secp256k1::SecretKey::from_slice(private_key.expose())
            .map_err(|e| Eip712Error::InvalidKey(e.to_string()))?;
        Ok(Self { key })
    }
}

impl Deref for SecretKeyGuard {
    type Target = secp256k1::SecretKey;

    fn deref(&self) -> &Self::Target {
        &self.key
    }
}

impl Drop for SecretKeyGuard {
    fn drop(&mut self) {
        // volatile overwrite with [1u8; 32], then a compiler fence
        self.key.non_secure_erase();
    }
}

/// Secure comparison (constant-time)
/// Returns true if slices are equal
pub fn secure_compare(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && bool::from(a.ct_eq(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_private_key_from_hex() {
        let key = PrivateKey::from_hex(
            "0x0000000000000000000000000000000000000000000000000000000000000001",
        )
        .unwrap();
        assert_eq!(key.expose()[31], 1);
    }

    #[test]
    fn test_private_key_rejects_bad_input() {
        assert!(matches!(
            PrivateKey::from_hex("abcd"),
            Err(Eip712Error::InvalidKey(_))
        ));
        assert!(matches!(
            PrivateKey::from_hex("zz"),
            Err(Eip712Error::InvalidKey(_))
        ));
    }

    #[test]
    fn test_private_key_debug_is_redacted() {
        let key = PrivateKey::from_slice(&[0x42; 32]).unwrap();
        let printed = format!("{key:?}");
        assert_eq!(printed, "PrivateKey([REDACTED])");
        assert!(!printed.contains("42"));
    }

    #[test]
    fn test_secret_key_guard_rejects_zero_key() {
        let zero = PrivateKey::from_slice(&[0u8; 32]).unwrap();
        assert!(matches!(
            SecretKeyGuard::new(&zero),
            Err(Eip712Error::InvalidKey(_))
        ));
    }

    #[test]
    fn test_secure_compare() {
        assert!(secure_compare(b"hello world", b"hello world"));
        assert!(!secure_compare(b"hello world", b"hello worlD"));
        assert!(!secure_compare(b"hello", b"hello world"));
    }
}
