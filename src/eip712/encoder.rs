//! EIP-712 Type Encoding
//!
//! Implements the encoding rules for EIP-712 typed data: the canonical type
//! string of a struct and the 32-byte word of each field value.

use super::hasher::StructHasher;
use super::types::*;
use ethers_core::types::U256;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tiny_keccak::{Hasher, Keccak};

/// Build the canonical type string for a struct type.
/// Format: `Primary(type1 name1,...)` followed by every transitively
/// referenced type, sorted by name.
pub fn build_type_string(
    primary: &TypeDescriptor,
    types: &BTreeMap<String, TypeDescriptor>,
) -> Result<String, Eip712Error> {
    let dependencies = find_type_dependencies(primary, types)?;

    let mut result = primary.signature();
    for dep in dependencies.iter().filter(|dep| **dep != primary.name) {
        let descriptor = types
            .get(*dep)
            .ok_or_else(|| Eip712Error::UnknownType(dep.to_string()))?;
        result.push_str(&descriptor.signature());
    }

    Ok(result)
}

/// Find all struct types reachable from `primary`, including itself.
pub fn find_type_dependencies<'a>(
    primary: &'a TypeDescriptor,
    types: &'a BTreeMap<String, TypeDescriptor>,
) -> Result<BTreeSet<&'a str>, Eip712Error> {
    let mut dependencies = BTreeSet::new();
    dependencies.insert(primary.name.as_str());
    let mut to_visit: Vec<&str> = primary.references().collect();

    while let Some(current) = to_visit.pop() {
        if !dependencies.insert(current) {
            continue;
        }
        let descriptor = types
            .get(current)
            .ok_or_else(|| Eip712Error::UnknownType(current.to_string()))?;
        to_visit.extend(
            descriptor
                .references()
                .filter(|name| !dependencies.contains(name)),
        );
    }

    Ok(dependencies)
}

/// Location of a value inside a message, used for error reporting and the
/// nesting guard.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FieldPath<'a> {
    parent: Option<&'a FieldPath<'a>>,
    segment: Segment<'a>,
    depth: usize,
}

#[derive(Debug, Clone, Copy)]
enum Segment<'a> {
    Root(&'a str),
    Field(&'a str),
    Index(usize),
}

impl<'a> FieldPath<'a> {
    pub(crate) fn root(type_name: &'a str) -> Self {
        Self {
            parent: None,
            segment: Segment::Root(type_name),
            depth: 0,
        }
    }

    pub(crate) fn field(&'a self, name: &'a str) -> Self {
        Self {
            parent: Some(self),
            segment: Segment::Field(name),
            depth: self.depth,
        }
    }

    pub(crate) fn index(&'a self, index: usize) -> Self {
        Self {
            parent: Some(self),
            segment: Segment::Index(index),
            depth: self.depth + 1,
        }
    }

    /// A struct value nested under this path.
    pub(crate) fn nested(&self) -> Self {
        Self {
            depth: self.depth + 1,
            ..*self
        }
    }

    pub(crate) fn depth(&self) -> usize {
        self.depth
    }
}

impl fmt::Display for FieldPath<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(parent) = self.parent {
            write!(f, "{parent}")?;
        }
        match self.segment {
            Segment::Root(name) => f.write_str(name),
            Segment::Field(name) => write!(f, ".{name}"),
            Segment::Index(i) => write!(f, "[{i}]"),
        }
    }
}

/// Encode one field value into its 32-byte word.
pub(crate) fn encode_field(
    hasher: &StructHasher<'_>,
    field_type: &FieldType,
    value: &Value,
    path: &FieldPath<'_>,
) -> Result<[u8; 32], Eip712Error> {
    match field_type {
        FieldType::Atomic(kind) => encode_atomic(*kind, value, path),
        FieldType::Dynamic(DynamicKind::String) => {
            let s = value
                .as_str()
                .ok_or_else(|| invalid_value(path, field_type, format!("expected a string, got {value}")))?;
            Ok(keccak256(s.as_bytes()))
        }
        FieldType::Dynamic(DynamicKind::Bytes) => {
            let bytes = parse_hex_value(value, field_type, path)?;
            Ok(keccak256(&bytes))
        }
        FieldType::Reference(type_name) => hasher.hash_struct_at(type_name, value, &path.nested()),
        FieldType::Array { element, length } => {
            encode_array(hasher, field_type, element, *length, value, path)
        }
    }
}

/// `keccak256(encode(e_1) ‖ … ‖ encode(e_n))`
fn encode_array(
    hasher: &StructHasher<'_>,
    field_type: &FieldType,
    element: &FieldType,
    length: ArrayLength,
    value: &Value,
    path: &FieldPath<'_>,
) -> Result<[u8; 32], Eip712Error> {
    let items = value
        .as_array()
        .ok_or_else(|| invalid_value(path, field_type, format!("expected an array, got {value}")))?;

    if let ArrayLength::Fixed(expected) = length {
        if items.len() != expected {
            return Err(invalid_value(
                path,
                field_type,
                format!("expected {} items, got {}", expected, items.len()),
            ));
        }
    }

    let mut keccak = Keccak::v256();
    for (i, item) in items.iter().enumerate() {
        let item_path = path.index(i);
        if item_path.depth() > hasher.max_depth() {
            return Err(Eip712Error::DepthExceeded(item_path.to_string()));
        }
        let word = encode_field(hasher, element, item, &item_path)?;
        keccak.update(&word);
    }

    let mut output = [0u8; 32];
    keccak.finalize(&mut output);
    Ok(output)
}

/// Encode an atomic (fixed-size) value as a single ABI word
fn encode_atomic(kind: AtomicKind, value: &Value, path: &FieldPath<'_>) -> Result<[u8; 32], Eip712Error> {
    let field_type = FieldType::Atomic(kind);
    let mut result = [0u8; 32];

    match kind {
        // 20 bytes, left-padded to 32
        AtomicKind::Address => {
            let addr = value
                .as_str()
                .ok_or_else(|| invalid_value(path, &field_type, format!("expected a hex string, got {value}")))?;
            let address = address_from_hex(addr).map_err(|reason| invalid_value(path, &field_type, reason))?;
            result[12..].copy_from_slice(address.as_bytes());
        }
        AtomicKind::Bool => {
            let b = value
                .as_bool()
                .ok_or_else(|| invalid_value(path, &field_type, format!("expected a boolean, got {value}")))?;
            result[31] = u8::from(b);
        }
        AtomicKind::Uint(bits) => {
            let n = parse_unsigned(value).map_err(|reason| invalid_value(path, &field_type, reason))?;
            if n.bits() > usize::from(bits) {
                return Err(invalid_value(path, &field_type, format!("{n} does not fit in {bits} bits")));
            }
            n.to_big_endian(&mut result);
        }
        AtomicKind::Int(bits) => {
            let (negative, magnitude) =
                parse_signed(value).map_err(|reason| invalid_value(path, &field_type, reason))?;
            // |min| = 2^(bits-1), max = 2^(bits-1) - 1
            let limit = U256::one() << (usize::from(bits) - 1);
            let in_range = if negative { magnitude <= limit } else { magnitude < limit };
            if !in_range {
                let sign = if negative { "-" } else { "" };
                return Err(invalid_value(
                    path,
                    &field_type,
                    format!("{sign}{magnitude} does not fit in {bits} bits"),
                ));
            }
            let word = if negative && !magnitude.is_zero() {
                // two's complement, sign-extended to 256 bits
                (!magnitude).overflowing_add(U256::one()).0
            } else {
                magnitude
            };
            word.to_big_endian(&mut result);
        }
        // content left-aligned, zero-padded on the right
        AtomicKind::FixedBytes(size) => {
            let bytes = parse_hex_value(value, &field_type, path)?;
            if bytes.len() > usize::from(size) {
                return Err(invalid_value(
                    path,
                    &field_type,
                    format!("bytes too long: {} > {}", bytes.len(), size),
                ));
            }
            result[..bytes.len()].copy_from_slice(&bytes);
        }
    }

    Ok(result)
}

/// Unsigned integers come as JSON numbers, decimal strings or `0x` hex strings.
fn parse_unsigned(value: &Value) -> Result<U256, String> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .map(U256::from)
            .ok_or_else(|| format!("not an unsigned integer: {n} (use a decimal string for large values)")),
        Value::String(s) => parse_u256(s),
        other => Err(format!("expected an integer, got {other}")),
    }
}

/// Returns `(is_negative, magnitude)`.
fn parse_signed(value: &Value) -> Result<(bool, U256), String> {
    match value {
        Value::Number(n) => {
            if let Some(u) = n.as_u64() {
                Ok((false, U256::from(u)))
            } else if let Some(i) = n.as_i64() {
                Ok((i < 0, U256::from(i.unsigned_abs())))
            } else {
                Err(format!("not an integer: {n} (use a decimal string for large values)"))
            }
        }
        Value::String(s) => {
            let s = s.trim();
            match s.strip_prefix('-') {
                Some(rest) => Ok((true, parse_u256(rest)?)),
                None => Ok((false, parse_u256(s)?)),
            }
        }
        other => Err(format!("expected an integer, got {other}")),
    }
}

fn parse_hex_value(value: &Value, field_type: &FieldType, path: &FieldPath<'_>) -> Result<Vec<u8>, Eip712Error> {
    let hex_str = value
        .as_str()
        .ok_or_else(|| invalid_value(path, field_type, format!("expected a hex string, got {value}")))?;
    decode_hex(hex_str).map_err(|reason| invalid_value(path, field_type, reason))
}

fn invalid_value(path: &FieldPath<'_>, field_type: &FieldType, reason: String) -> Eip712Error {
    Eip712Error::InvalidValue {
        field: path.to_string(),
        type_name: field_type.to_string(),
        reason,
    }
}

/// Compute keccak256 hash
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    let mut output = [0u8; 32];
    hasher.update(data);
    hasher.finalize(&mut output);
    output
}
