//! EIP-712 Typed Data Signing
//!
//! Implementation of EIP-712 typed structured data hashing and signing.
//! Used for secure, human-readable signing requests in dApps.
//!
//! # Reference
//! - <https://eips.ethereum.org/EIPS/eip-712>
//!
//! # Example
//! ```rust,ignore
//! use hawala_eip712::eip712::{TypeRegistry, StructHasher, Eip712Domain, compose_digest};
//!
//! let mut builder = TypeRegistry::builder();
//! builder.register_type("Transfer", &[("to", "address"), ("amount", "uint256")])?;
//! let registry = builder.build()?;
//!
//! let struct_hash = StructHasher::new(&registry).hash_struct("Transfer", &message)?;
//! let digest = compose_digest(&domain_separator(&domain)?, &struct_hash);
//! let signature = sign_hash(&digest, &private_key)?;
//! ```

pub mod types;
pub mod registry;
pub mod encoder;
pub mod hasher;
pub mod signer;
pub mod typed_data;

pub use types::*;
pub use registry::*;
pub use encoder::{build_type_string, find_type_dependencies, keccak256};
pub use hasher::*;
pub use signer::*;
pub use typed_data::*;
