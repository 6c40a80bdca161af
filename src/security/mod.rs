//! Security Module
//!
//! Secure memory utilities:
//! - Zeroizing private key storage
//! - Scoped secp256k1 key erasure
//! - Constant-time comparison

pub mod secure_memory;

pub use secure_memory::{secure_compare, PrivateKey};
