//! EIP-712 Signing
//!
//! ECDSA signing and verification over secp256k1 for EIP-712 digests.
//! Produced signatures are always in canonical low-s form.

use super::types::*;
use crate::security::secure_memory::{secure_compare, PrivateKey, SecretKeyGuard};
use crate::utils::engine_config::EngineSettings;
use crate::utils::logging::{redact_address, short_hash};
use ethers_core::types::{Address, U256};
use rayon::prelude::*;
use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{Message, PublicKey, Secp256k1};

/// secp256k1 group order N
pub const SECP256K1_ORDER: [u8; 32] = secp256k1::constants::CURVE_ORDER;

/// N / 2, the largest canonical `s`
pub const SECP256K1_HALF_ORDER: [u8; 32] = [
    0x7f, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
    0x5d, 0x57, 0x6e, 0x73, 0x57, 0xa4, 0x50, 0x1d, 0xdf, 0xe9, 0x2f, 0x46, 0x68, 0x1b, 0x20, 0xa0,
];

impl Eip712Signature {
    /// Whether `s ≤ N/2` (EIP-2)
    pub fn is_low_s(&self) -> bool {
        // big-endian byte order compares like the integers
        self.s <= SECP256K1_HALF_ORDER
    }

    /// The canonical twin: `s` replaced by `N - s` and the parity flipped when
    /// `s` is high, otherwise unchanged.
    pub fn normalize_s(&self) -> Self {
        if self.is_low_s() {
            return *self;
        }
        let v = if self.v == 27 { 28 } else { 27 };
        Self::new(self.r, negate_s(&self.s), v)
    }
}

/// N - s
fn negate_s(s: &[u8; 32]) -> [u8; 32] {
    let order = U256::from_big_endian(&SECP256K1_ORDER);
    let s = U256::from_big_endian(s);
    let mut out = [0u8; 32];
    (order - s).to_big_endian(&mut out);
    out
}

/// Sign a 32-byte digest.
///
/// The secp256k1 key object lives only for this call and is erased on every
/// exit path.
pub fn sign_hash(digest: &[u8; 32], private_key: &PrivateKey) -> Eip712Result<Eip712Signature> {
    let secp = Secp256k1::signing_only();
    let secret_key = SecretKeyGuard::new(private_key)?;
    let message = Message::from_digest(*digest);

    let (recovery_id, compact) = secp
        .sign_ecdsa_recoverable(&message, &secret_key)
        .serialize_compact();

    let mut r = [0u8; 32];
    let mut s = [0u8; 32];
    r.copy_from_slice(&compact[0..32]);
    s.copy_from_slice(&compact[32..64]);

    // v is recovery_id + 27 (Ethereum standard)
    let raw = Eip712Signature::new(r, s, recovery_id.to_i32() as u8 + 27);
    let signature = raw.normalize_s();

    tracing::debug!(digest = %short_hash(digest), "signed EIP-712 digest");
    Ok(signature)
}

/// Load a key, sign with it and drop it before returning.
pub fn sign_with<F>(digest: &[u8; 32], load_key: F) -> Eip712Result<Eip712Signature>
where
    F: FnOnce() -> Eip712Result<PrivateKey>,
{
    let private_key = load_key()?;
    sign_hash(digest, &private_key)
}

/// Derive the Ethereum address controlled by a private key
pub fn address_of(private_key: &PrivateKey) -> Eip712Result<Address> {
    let secp = Secp256k1::signing_only();
    let secret_key = SecretKeyGuard::new(private_key)?;
    let public_key = PublicKey::from_secret_key(&secp, &secret_key);
    Ok(public_key_to_address(&public_key))
}

/// Recover the signer's address from a signature (lenient mode)
pub fn recover_signer(digest: &[u8; 32], signature: &Eip712Signature) -> Eip712Result<Address> {
    SignatureVerifier::lenient().recover(digest, signature)
}

/// Verify a signature against a digest and expected address (lenient mode)
pub fn verify_signature(
    digest: &[u8; 32],
    signature: &Eip712Signature,
    expected_address: &Address,
) -> Eip712Result<bool> {
    SignatureVerifier::lenient().verify(digest, signature, expected_address)
}

/// Recovers and checks signers, optionally rejecting high-s signatures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignatureVerifier {
    strict: bool,
    parallel: bool,
}

impl SignatureVerifier {
    /// Accepts both `s` and `N - s`
    pub fn lenient() -> Self {
        Self {
            strict: false,
            parallel: true,
        }
    }

    /// Rejects `s > N/2` with [`Eip712Error::MalleableSignature`]
    pub fn strict() -> Self {
        Self {
            strict: true,
            parallel: true,
        }
    }

    pub fn from_settings(settings: &EngineSettings) -> Self {
        Self {
            strict: settings.strict_signatures,
            parallel: settings.parallel_batch,
        }
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    pub fn recover(&self, digest: &[u8; 32], signature: &Eip712Signature) -> Eip712Result<Address> {
        let recovery_id = signature.recovery_id()?;

        if self.strict && !signature.is_low_s() {
            tracing::warn!(digest = %short_hash(digest), "rejected high-s signature");
            return Err(Eip712Error::MalleableSignature);
        }

        let recovery_id = RecoveryId::from_i32(i32::from(recovery_id))
            .map_err(|e| Eip712Error::InvalidSignature(e.to_string()))?;

        let mut compact = [0u8; 64];
        compact[0..32].copy_from_slice(&signature.r);
        compact[32..64].copy_from_slice(&signature.s);

        let recoverable = RecoverableSignature::from_compact(&compact, recovery_id)
            .map_err(|e| Eip712Error::Recovery(e.to_string()))?;

        let secp = Secp256k1::verification_only();
        let public_key = secp
            .recover_ecdsa(&Message::from_digest(*digest), &recoverable)
            .map_err(|e| Eip712Error::Recovery(e.to_string()))?;

        Ok(public_key_to_address(&public_key))
    }

    /// `recover(...) == expected`, compared as bytes
    pub fn verify(
        &self,
        digest: &[u8; 32],
        signature: &Eip712Signature,
        expected_address: &Address,
    ) -> Eip712Result<bool> {
        let recovered = self.recover(digest, signature)?;
        let valid = secure_compare(recovered.as_bytes(), expected_address.as_bytes());

        let expected = format!("0x{}", hex::encode(expected_address.as_bytes()));
        if valid {
            tracing::info!(signer = %redact_address(&expected), "signature verified");
        } else {
            tracing::info!(expected_signer = %redact_address(&expected), "signature does not match expected signer");
        }
        Ok(valid)
    }

    /// Verify many `(digest, signature, expected)` items; results keep the
    /// input order.
    pub fn verify_batch(
        &self,
        items: &[(&[u8; 32], &Eip712Signature, &Address)],
    ) -> Vec<Eip712Result<bool>> {
        if self.parallel {
            items
                .par_iter()
                .map(|(digest, signature, expected)| self.verify(digest, signature, expected))
                .collect()
        } else {
            items
                .iter()
                .map(|(digest, signature, expected)| self.verify(digest, signature, expected))
                .collect()
        }
    }
}

impl Default for SignatureVerifier {
    fn default() -> Self {
        Self::lenient()
    }
}

/// Convert a secp256k1 public key to an Ethereum address
fn public_key_to_address(public_key: &PublicKey) -> Address {
    // Uncompressed form is 0x04 ‖ X ‖ Y; the tag byte is not hashed
    let uncompressed = public_key.serialize_uncompressed();
    let hash = super::encoder::keccak256(&uncompressed[1..]);
    Address::from_slice(&hash[12..])
}

/// Parse an address from hex; casing is ignored.
pub fn parse_address(address: &str) -> Eip712Result<Address> {
    super::types::address_from_hex(address.trim()).map_err(|reason| Eip712Error::InvalidValue {
        field: "address".to_string(),
        type_name: "address".to_string(),
        reason,
    })
}

/// Compute the EIP-55 checksum address
pub fn checksum_address(address: &Address) -> String {
    ethers_core::utils::to_checksum(address, None)
}
