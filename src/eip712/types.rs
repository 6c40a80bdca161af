//! EIP-712 Type Definitions
//!
//! Core data structures for EIP-712 typed data: the declared field kinds,
//! struct descriptors, the signing domain and signature components.

use crate::utils::engine_config::DEFAULT_MAX_DEPTH;
use ethers_core::types::{Address, U256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of the reserved domain struct.
pub const EIP712_DOMAIN_TYPE: &str = "EIP712Domain";

/// Most `[]` suffixes a declared type may carry.
pub const MAX_ARRAY_DIMENSIONS: usize = DEFAULT_MAX_DEPTH;

/// A field as it appears in a typed-data document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TypedDataField {
    /// The name of the field
    pub name: String,
    /// The declared type of the field (e.g., "address", "uint256", "Person[]")
    #[serde(rename = "type")]
    pub type_name: String,
}

impl TypedDataField {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
        }
    }
}

/// Fixed-size value kinds, each encoded as exactly one 32-byte word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AtomicKind {
    /// `uint<N>`, N in 8..=256, multiple of 8
    Uint(u16),
    /// `int<N>`, N in 8..=256, multiple of 8
    Int(u16),
    Address,
    Bool,
    /// `bytes<N>`, N in 1..=32
    FixedBytes(u8),
}

/// Variable-length value kinds, encoded as the keccak256 of their content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DynamicKind {
    String,
    Bytes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArrayLength {
    Dynamic,
    Fixed(usize),
}

/// The declared kind of a struct field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldType {
    Atomic(AtomicKind),
    Dynamic(DynamicKind),
    Array {
        element: Box<FieldType>,
        length: ArrayLength,
    },
    /// A struct type registered under this name
    Reference(String),
}

impl FieldType {
    /// Parse a declared type name such as `uint256`, `bytes`, `Person` or `uint8[3][]`.
    pub fn parse(type_name: &str) -> Result<Self, Eip712Error> {
        let malformed = |reason: &str| Eip712Error::MalformedType {
            type_name: type_name.to_string(),
            reason: reason.to_string(),
        };

        if type_name.chars().any(char::is_whitespace) {
            return Err(malformed("whitespace is not allowed"));
        }

        let mut base = type_name;
        let mut lengths = Vec::new();
        while base.ends_with(']') {
            if lengths.len() == MAX_ARRAY_DIMENSIONS {
                return Err(malformed("too many array dimensions"));
            }
            let open = base.rfind('[').ok_or_else(|| malformed("unbalanced brackets"))?;
            let inner = &base[open + 1..base.len() - 1];
            let length = if inner.is_empty() {
                ArrayLength::Dynamic
            } else {
                if !inner.bytes().all(|b| b.is_ascii_digit()) || inner.starts_with('0') {
                    return Err(malformed("array length must be a positive integer"));
                }
                let n = inner
                    .parse::<usize>()
                    .map_err(|_| malformed("array length out of range"))?;
                ArrayLength::Fixed(n)
            };
            lengths.push(length);
            base = &base[..open];
        }

        // outermost suffix was collected first
        let mut parsed = Self::parse_scalar(base).map_err(|reason| malformed(reason))?;
        for length in lengths.into_iter().rev() {
            parsed = Self::Array {
                element: Box::new(parsed),
                length,
            };
        }
        Ok(parsed)
    }

    fn parse_scalar(type_name: &str) -> Result<Self, &'static str> {
        if type_name.contains(&['[', ']'][..]) {
            return Err("unbalanced brackets");
        }

        match type_name {
            "address" => return Ok(Self::Atomic(AtomicKind::Address)),
            "bool" => return Ok(Self::Atomic(AtomicKind::Bool)),
            "string" => return Ok(Self::Dynamic(DynamicKind::String)),
            "bytes" => return Ok(Self::Dynamic(DynamicKind::Bytes)),
            _ => {}
        }

        if let Some(bits) = numeric_suffix(type_name, "uint") {
            let bits = parse_bit_width(bits).ok_or("invalid bit width")?;
            return Ok(Self::Atomic(AtomicKind::Uint(bits)));
        }
        if let Some(bits) = numeric_suffix(type_name, "int") {
            let bits = parse_bit_width(bits).ok_or("invalid bit width")?;
            return Ok(Self::Atomic(AtomicKind::Int(bits)));
        }
        if let Some(size) = numeric_suffix(type_name, "bytes") {
            let size = Some(size)
                .filter(|digits| !digits.starts_with('0'))
                .and_then(|digits| digits.parse::<u8>().ok())
                .filter(|n| (1..=32).contains(n))
                .ok_or("fixed bytes size must be between 1 and 32")?;
            return Ok(Self::Atomic(AtomicKind::FixedBytes(size)));
        }

        if !is_identifier(type_name) {
            return Err("not a valid identifier");
        }
        Ok(Self::Reference(type_name.to_string()))
    }

    /// The struct this type points at, looking through arrays.
    pub fn referenced_type(&self) -> Option<&str> {
        match self {
            Self::Reference(name) => Some(name),
            Self::Array { element, .. } => element.referenced_type(),
            Self::Atomic(_) | Self::Dynamic(_) => None,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Atomic(AtomicKind::Uint(bits)) => write!(f, "uint{bits}"),
            Self::Atomic(AtomicKind::Int(bits)) => write!(f, "int{bits}"),
            Self::Atomic(AtomicKind::Address) => f.write_str("address"),
            Self::Atomic(AtomicKind::Bool) => f.write_str("bool"),
            Self::Atomic(AtomicKind::FixedBytes(size)) => write!(f, "bytes{size}"),
            Self::Dynamic(DynamicKind::String) => f.write_str("string"),
            Self::Dynamic(DynamicKind::Bytes) => f.write_str("bytes"),
            Self::Array {
                element,
                length: ArrayLength::Dynamic,
            } => write!(f, "{element}[]"),
            Self::Array {
                element,
                length: ArrayLength::Fixed(n),
            } => write!(f, "{element}[{n}]"),
            Self::Reference(name) => f.write_str(name),
        }
    }
}

/// `"uint256"` with prefix `"uint"` gives `Some("256")`; only all-digit suffixes match.
fn numeric_suffix<'a>(type_name: &'a str, prefix: &str) -> Option<&'a str> {
    type_name
        .strip_prefix(prefix)
        .filter(|rest| !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()))
}

fn parse_bit_width(bits: &str) -> Option<u16> {
    if bits.starts_with('0') {
        return None;
    }
    bits.parse::<u16>()
        .ok()
        .filter(|n| *n > 0 && *n <= 256 && n % 8 == 0)
}

/// Solidity-style identifier: `[a-zA-Z_$][a-zA-Z0-9_$]*`
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

/// One named, typed member of a struct.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: String,
    pub field_type: FieldType,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
        }
    }

    /// Parse the declared type name of a field.
    pub fn parse(name: impl Into<String>, type_name: &str) -> Result<Self, Eip712Error> {
        Ok(Self::new(name, FieldType::parse(type_name)?))
    }
}

impl TryFrom<&TypedDataField> for FieldDescriptor {
    type Error = Eip712Error;

    fn try_from(field: &TypedDataField) -> Result<Self, Self::Error> {
        Self::parse(field.name.clone(), &field.type_name)
    }
}

/// A named struct type with its fields in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDescriptor {
    pub name: String,
    pub fields: Vec<FieldDescriptor>,
}

impl TypeDescriptor {
    pub fn new(name: impl Into<String>, fields: Vec<FieldDescriptor>) -> Self {
        Self {
            name: name.into(),
            fields,
        }
    }

    /// `Name(type1 field1,type2 field2)`, this type alone without its dependencies.
    pub fn signature(&self) -> String {
        let fields: Vec<String> = self
            .fields
            .iter()
            .map(|f| format!("{} {}", f.field_type, f.name))
            .collect();
        format!("{}({})", self.name, fields.join(","))
    }

    /// Names of the struct types referenced directly by this type.
    pub fn references(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .filter_map(|f| f.field_type.referenced_type())
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// The EIP-712 signing domain. Only the fields that are set take part in the
/// domain type and its encoding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawDomain", into = "RawDomain")]
pub struct Eip712Domain {
    /// The human-readable name of the signing domain
    pub name: Option<String>,
    /// The current major version of the signing domain
    pub version: Option<String>,
    /// The EIP-155 chain ID
    pub chain_id: Option<U256>,
    /// The address of the contract that will verify the signature
    pub verifying_contract: Option<Address>,
    /// An optional disambiguating salt
    pub salt: Option<[u8; 32]>,
}

impl Eip712Domain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_chain_id(mut self, chain_id: impl Into<U256>) -> Self {
        self.chain_id = Some(chain_id.into());
        self
    }

    pub fn with_verifying_contract(mut self, contract: Address) -> Self {
        self.verifying_contract = Some(contract);
        self
    }

    pub fn with_salt(mut self, salt: [u8; 32]) -> Self {
        self.salt = Some(salt);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.version.is_none()
            && self.chain_id.is_none()
            && self.verifying_contract.is_none()
            && self.salt.is_none()
    }

    /// The synthetic `EIP712Domain` type built from the fields that are present,
    /// in canonical order.
    pub fn type_descriptor(&self) -> TypeDescriptor {
        let mut fields = Vec::with_capacity(5);
        if self.name.is_some() {
            fields.push(FieldDescriptor::new(
                "name",
                FieldType::Dynamic(DynamicKind::String),
            ));
        }
        if self.version.is_some() {
            fields.push(FieldDescriptor::new(
                "version",
                FieldType::Dynamic(DynamicKind::String),
            ));
        }
        if self.chain_id.is_some() {
            fields.push(FieldDescriptor::new(
                "chainId",
                FieldType::Atomic(AtomicKind::Uint(256)),
            ));
        }
        if self.verifying_contract.is_some() {
            fields.push(FieldDescriptor::new(
                "verifyingContract",
                FieldType::Atomic(AtomicKind::Address),
            ));
        }
        if self.salt.is_some() {
            fields.push(FieldDescriptor::new(
                "salt",
                FieldType::Atomic(AtomicKind::FixedBytes(32)),
            ));
        }
        TypeDescriptor::new(EIP712_DOMAIN_TYPE, fields)
    }

    /// The domain as a message value matching [`Self::type_descriptor`].
    pub fn to_message(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        if let Some(name) = &self.name {
            map.insert("name".into(), name.clone().into());
        }
        if let Some(version) = &self.version {
            map.insert("version".into(), version.clone().into());
        }
        if let Some(chain_id) = &self.chain_id {
            map.insert("chainId".into(), chain_id.to_string().into());
        }
        if let Some(contract) = &self.verifying_contract {
            map.insert(
                "verifyingContract".into(),
                format!("0x{}", hex::encode(contract.as_bytes())).into(),
            );
        }
        if let Some(salt) = &self.salt {
            map.insert("salt".into(), format!("0x{}", hex::encode(salt)).into());
        }
        serde_json::Value::Object(map)
    }
}

/// Wire form of the domain as found in typed-data documents. `chainId` may be
/// a JSON number, a decimal string or a `0x` hex string.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDomain {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    chain_id: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    verifying_contract: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    salt: Option<String>,
}

impl TryFrom<RawDomain> for Eip712Domain {
    type Error = Eip712Error;

    fn try_from(raw: RawDomain) -> Result<Self, Self::Error> {
        let invalid = |field: &str, type_name: &str, reason: String| Eip712Error::InvalidValue {
            field: format!("{EIP712_DOMAIN_TYPE}.{field}"),
            type_name: type_name.to_string(),
            reason,
        };

        let chain_id = raw
            .chain_id
            .map(|value| match &value {
                serde_json::Value::Number(n) => n
                    .as_u64()
                    .map(U256::from)
                    .ok_or_else(|| invalid("chainId", "uint256", format!("not a chain id: {n}"))),
                serde_json::Value::String(s) => parse_u256(s)
                    .map_err(|reason| invalid("chainId", "uint256", reason)),
                other => Err(invalid("chainId", "uint256", format!("not a chain id: {other}"))),
            })
            .transpose()?;

        let verifying_contract = raw
            .verifying_contract
            .map(|s| address_from_hex(&s).map_err(|reason| invalid("verifyingContract", "address", reason)))
            .transpose()?;

        let salt = raw
            .salt
            .map(|s| {
                let bytes = decode_hex(&s).map_err(|reason| invalid("salt", "bytes32", reason))?;
                <[u8; 32]>::try_from(bytes.as_slice()).map_err(|_| {
                    invalid("salt", "bytes32", format!("expected 32 bytes, got {}", bytes.len()))
                })
            })
            .transpose()?;

        Ok(Self {
            name: raw.name,
            version: raw.version,
            chain_id,
            verifying_contract,
            salt,
        })
    }
}

impl From<Eip712Domain> for RawDomain {
    fn from(domain: Eip712Domain) -> Self {
        Self {
            name: domain.name,
            version: domain.version,
            chain_id: domain.chain_id.map(|id| {
                if id <= U256::from(u64::MAX) {
                    serde_json::Value::from(id.as_u64())
                } else {
                    serde_json::Value::from(id.to_string())
                }
            }),
            verifying_contract: domain
                .verifying_contract
                .map(|a| format!("0x{}", hex::encode(a.as_bytes()))),
            salt: domain.salt.map(|s| format!("0x{}", hex::encode(s))),
        }
    }
}

/// Decode a hex string with or without a `0x` prefix.
pub(crate) fn decode_hex(s: &str) -> Result<Vec<u8>, String> {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    hex::decode(digits).map_err(|e| format!("invalid hex: {e}"))
}

/// Parse a 20-byte address; checksum casing is not enforced.
pub(crate) fn address_from_hex(s: &str) -> Result<Address, String> {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    if digits.len() != 40 {
        return Err(format!(
            "invalid length: expected 40 hex chars, got {}",
            digits.len()
        ));
    }
    let bytes = hex::decode(digits).map_err(|e| format!("invalid hex: {e}"))?;
    Ok(Address::from_slice(&bytes))
}

/// Parse an unsigned 256-bit integer from a decimal or `0x` hex string.
pub(crate) fn parse_u256(s: &str) -> Result<U256, String> {
    let s = s.trim();
    if let Some(digits) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        let significant = digits.trim_start_matches('0');
        if digits.is_empty() || significant.len() > 64 {
            return Err(format!("hex integer out of range: {s}"));
        }
        if significant.is_empty() {
            return Ok(U256::zero());
        }
        return U256::from_str_radix(significant, 16).map_err(|e| format!("invalid hex integer {s}: {e:?}"));
    }
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(format!("not a decimal integer: {s}"));
    }
    U256::from_dec_str(s).map_err(|e| format!("integer out of range {s}: {e:?}"))
}

/// ECDSA signature components in Ethereum's `r ‖ s ‖ v` layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Eip712Signature {
    /// r component (32 bytes)
    pub r: [u8; 32],
    /// s component (32 bytes)
    pub s: [u8; 32],
    /// v component (recovery id + 27, so 27 or 28)
    pub v: u8,
}

impl Eip712Signature {
    /// Length of the serialized form
    pub const LEN: usize = 65;

    /// Create from raw components
    pub fn new(r: [u8; 32], s: [u8; 32], v: u8) -> Self {
        Self { r, s, v }
    }

    /// Create from a 65-byte signature (r || s || v)
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Eip712Error> {
        if bytes.len() != Self::LEN {
            return Err(Eip712Error::InvalidSignature(format!(
                "expected {} bytes, got {}",
                Self::LEN,
                bytes.len()
            )));
        }

        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[0..32]);
        s.copy_from_slice(&bytes[32..64]);
        let sig = Self::new(r, s, bytes[64]);
        sig.recovery_id()?;
        Ok(sig)
    }

    /// Parse a hex-encoded 65-byte signature
    pub fn from_hex(s: &str) -> Result<Self, Eip712Error> {
        let bytes = decode_hex(s).map_err(Eip712Error::InvalidSignature)?;
        Self::from_bytes(&bytes)
    }

    /// Convert to 65-byte representation (r || s || v)
    pub fn to_bytes(&self) -> [u8; 65] {
        let mut bytes = [0u8; 65];
        bytes[0..32].copy_from_slice(&self.r);
        bytes[32..64].copy_from_slice(&self.s);
        bytes[64] = self.v;
        bytes
    }

    /// Convert to hex string
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.to_bytes()))
    }

    /// The raw recovery id (0 or 1); fails unless `v` is 27 or 28.
    pub fn recovery_id(&self) -> Result<u8, Eip712Error> {
        match self.v {
            27 | 28 => Ok(self.v - 27),
            v => Err(Eip712Error::InvalidSignature(format!(
                "v must be 27 or 28, got {v}"
            ))),
        }
    }

    /// Parity of the R point's y coordinate
    pub fn y_parity(&self) -> Result<bool, Eip712Error> {
        Ok(self.recovery_id()? == 1)
    }
}

impl fmt::Display for Eip712Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Broad category of an [`Eip712Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Unknown, duplicate, reserved or cyclic type reference
    Type,
    /// Malformed type string, missing or unexpected field, bad document
    Encoding,
    /// Value does not fit its declared kind or width
    Value,
    /// Signature is not 65 bytes or `v` is not 27/28
    SignatureFormat,
    /// High-s signature rejected in strict mode
    MalleableSignature,
    /// Signature does not map to a valid curve point
    Recovery,
    /// Private key material is unusable
    Key,
}

/// Errors that can occur during EIP-712 operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Eip712Error {
    #[error("unknown type `{0}`")]
    UnknownType(String),

    #[error("type `{type_name}` referenced by `{referenced_by}` is not registered")]
    UnresolvedReference {
        type_name: String,
        referenced_by: String,
    },

    #[error("type `{0}` is already registered")]
    DuplicateType(String),

    #[error("type name `{0}` is reserved")]
    ReservedType(String),

    #[error("cyclic type reference: {0}")]
    CyclicType(String),

    #[error("malformed type `{type_name}`: {reason}")]
    MalformedType { type_name: String, reason: String },

    #[error("missing field `{0}`")]
    MissingField(String),

    #[error("unexpected field `{0}`")]
    UnexpectedField(String),

    #[error("value at `{0}` is nested too deeply")]
    DepthExceeded(String),

    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("invalid value for `{field}` ({type_name}): {reason}")]
    InvalidValue {
        field: String,
        type_name: String,
        reason: String,
    },

    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    #[error("non-canonical signature: s exceeds half the curve order")]
    MalleableSignature,

    #[error("signature recovery failed: {0}")]
    Recovery(String),

    #[error("invalid private key: {0}")]
    InvalidKey(String),
}

impl Eip712Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownType(_)
            | Self::UnresolvedReference { .. }
            | Self::DuplicateType(_)
            | Self::ReservedType(_)
            | Self::CyclicType(_) => ErrorKind::Type,
            Self::MalformedType { .. }
            | Self::MissingField(_)
            | Self::UnexpectedField(_)
            | Self::DepthExceeded(_)
            | Self::InvalidJson(_) => ErrorKind::Encoding,
            Self::InvalidValue { .. } => ErrorKind::Value,
            Self::InvalidSignature(_) => ErrorKind::SignatureFormat,
            Self::MalleableSignature => ErrorKind::MalleableSignature,
            Self::Recovery(_) => ErrorKind::Recovery,
            Self::InvalidKey(_) => ErrorKind::Key,
        }
    }
}

pub type Eip712Result<T> = Result<T, Eip712Error>;
