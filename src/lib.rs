//! Hawala EIP-712 Engine
//!
//! Typed structured-data hashing and signing for Ethereum (EIP-712).
//!
//! # Architecture
//!
//! This crate provides:
//! - **eip712**: type registry, encoding, struct hashing, domain separator,
//!   digest composition, secp256k1 signing and recovery
//! - **error**: crate-wide error codes
//! - **security**: zeroizing key storage and constant-time comparison
//! - **utils**: engine settings and log redaction
//!
//! # Security
//!
//! This crate uses `zeroize` and `secrecy` to clear private keys from memory.
//! Keys are only held for the duration of a signing call and never logged.
//!
//! # Example
//!
//! ```rust,ignore
//! use hawala_eip712::eip712::TypedData;
//!
//! let typed_data = TypedData::from_json(json_string)?;
//! let digest = typed_data.hash()?;
//! let signature = typed_data.sign(&private_key)?;
//! ```

pub mod eip712;
pub mod error;
pub mod security;
pub mod utils;

// Re-export key types for convenience
pub use eip712::{
    compose_digest, compute_digest, domain_separator, recover_signer, sign_hash,
    verify_signature, Eip712Domain, Eip712Error, Eip712Result, Eip712Signature, SignatureVerifier,
    StructHasher, TypeRegistry, TypedData,
};
pub use error::{EngineError, EngineResult, ErrorCode};
pub use security::secure_memory::PrivateKey;
pub use utils::engine_config::EngineSettings;
