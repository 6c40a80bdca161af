//! EIP-712 Hashing
//!
//! Implements struct hashing, the domain separator and the final digest.

use super::encoder::{encode_field, keccak256, FieldPath};
use super::registry::TypeRegistry;
use super::types::*;
use crate::utils::engine_config::{EngineSettings, DEFAULT_MAX_DEPTH};
use crate::utils::logging::short_hash;
use serde_json::Value;
use tiny_keccak::{Hasher, Keccak};

/// Magic prefix for EIP-712 encoding
pub const EIP712_PREFIX: &[u8; 2] = b"\x19\x01";

/// Options that change how messages are hashed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashOptions {
    /// Reject message fields the type does not declare
    pub strict: bool,
    /// Deepest struct/array nesting accepted
    pub max_depth: usize,
}

impl Default for HashOptions {
    fn default() -> Self {
        Self {
            strict: false,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl From<&EngineSettings> for HashOptions {
    fn from(settings: &EngineSettings) -> Self {
        Self {
            strict: settings.strict_fields,
            max_depth: settings.max_depth,
        }
    }
}

/// Computes `hashStruct` for messages of the types in a registry.
#[derive(Debug, Clone, Copy)]
pub struct StructHasher<'a> {
    registry: &'a TypeRegistry,
    options: HashOptions,
}

impl<'a> StructHasher<'a> {
    pub fn new(registry: &'a TypeRegistry) -> Self {
        Self::with_options(registry, HashOptions::default())
    }

    pub fn with_options(registry: &'a TypeRegistry, options: HashOptions) -> Self {
        Self { registry, options }
    }

    pub fn registry(&self) -> &'a TypeRegistry {
        self.registry
    }

    pub(crate) fn max_depth(&self) -> usize {
        self.options.max_depth
    }

    /// hashStruct(s) = keccak256(typeHash ‖ encodeData(s))
    pub fn hash_struct(&self, type_name: &str, message: &Value) -> Eip712Result<[u8; 32]> {
        self.hash_struct_at(type_name, message, &FieldPath::root(type_name))
    }

    /// Encode a single value of the given type into its 32-byte word.
    pub fn encode_field(&self, field_type: &FieldType, value: &Value) -> Eip712Result<[u8; 32]> {
        let root = field_type.to_string();
        encode_field(self, field_type, value, &FieldPath::root(&root))
    }

    pub(crate) fn hash_struct_at(
        &self,
        type_name: &str,
        message: &Value,
        path: &FieldPath<'_>,
    ) -> Eip712Result<[u8; 32]> {
        let descriptor = self.registry.resolve(type_name)?;
        let type_hash = self.registry.type_hash(type_name)?;
        self.hash_descriptor(descriptor, &type_hash, message, path)
    }

    /// Hash a message against an explicit descriptor and type hash; used for
    /// the registered types and for the synthetic domain type.
    pub(crate) fn hash_descriptor(
        &self,
        descriptor: &TypeDescriptor,
        type_hash: &[u8; 32],
        message: &Value,
        path: &FieldPath<'_>,
    ) -> Eip712Result<[u8; 32]> {
        if path.depth() > self.options.max_depth {
            return Err(Eip712Error::DepthExceeded(path.to_string()));
        }

        let obj = message.as_object().ok_or_else(|| Eip712Error::InvalidValue {
            field: path.to_string(),
            type_name: descriptor.name.clone(),
            reason: format!("expected an object, got {message}"),
        })?;

        if self.options.strict {
            if let Some(unknown) = obj.keys().find(|key| descriptor.field(key).is_none()) {
                return Err(Eip712Error::UnexpectedField(path.field(unknown).to_string()));
            }
        }

        let mut keccak = Keccak::v256();
        keccak.update(type_hash);

        for field in &descriptor.fields {
            let field_path = path.field(&field.name);
            let value = obj
                .get(&field.name)
                .ok_or_else(|| Eip712Error::MissingField(field_path.to_string()))?;
            let word = encode_field(self, &field.field_type, value, &field_path)?;
            keccak.update(&word);
        }

        let mut output = [0u8; 32];
        keccak.finalize(&mut output);
        Ok(output)
    }
}

/// Calculate the domain separator hash
///
/// domainSeparator = hashStruct(eip712Domain), where the domain type holds
/// only the fields that are present.
pub fn domain_separator(domain: &Eip712Domain) -> Eip712Result<[u8; 32]> {
    let descriptor = domain.type_descriptor();
    let type_hash = keccak256(descriptor.signature().as_bytes());
    let registry = TypeRegistry::empty();

    let separator = StructHasher::new(&registry).hash_descriptor(
        &descriptor,
        &type_hash,
        &domain.to_message(),
        &FieldPath::root(EIP712_DOMAIN_TYPE),
    )?;
    tracing::debug!(separator = %short_hash(&separator), "computed domain separator");
    Ok(separator)
}

/// keccak256("\x19\x01" ‖ domainSeparator ‖ structHash)
pub fn compose_digest(domain_separator: &[u8; 32], struct_hash: &[u8; 32]) -> [u8; 32] {
    let mut data = [0u8; 66];
    data[..2].copy_from_slice(EIP712_PREFIX);
    data[2..34].copy_from_slice(domain_separator);
    data[34..].copy_from_slice(struct_hash);
    keccak256(&data)
}

/// The pre-image components (for external signing)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Eip712PreImage {
    pub domain_separator: [u8; 32],
    pub struct_hash: [u8; 32],
    pub digest: [u8; 32],
}

/// Calculate the pre-image components for a message
pub fn pre_image(
    domain: &Eip712Domain,
    primary_type: &str,
    hasher: &StructHasher<'_>,
    message: &Value,
) -> Eip712Result<Eip712PreImage> {
    let domain_separator = domain_separator(domain)?;
    let struct_hash = hasher.hash_struct(primary_type, message)?;
    let digest = compose_digest(&domain_separator, &struct_hash);
    tracing::debug!(primary_type, digest = %short_hash(&digest), "computed EIP-712 digest");

    Ok(Eip712PreImage {
        domain_separator,
        struct_hash,
        digest,
    })
}

/// Calculate the final EIP-712 digest to sign
pub fn compute_digest(
    domain: &Eip712Domain,
    primary_type: &str,
    registry: &TypeRegistry,
    message: &Value,
) -> Eip712Result<[u8; 32]> {
    pre_image(domain, primary_type, &StructHasher::new(registry), message).map(|p| p.digest)
}

#[cfg(test)]
mod hasher_tests {
    use super::*;
    use ethers_core::types::{Address, U256};
    use serde_json::json;

    fn mail_registry() -> TypeRegistry {
        let mut builder = TypeRegistry::builder();
        builder
            .register_type("Person", &[("name", "string"), ("wallet", "address")])
            .unwrap()
            .register_type(
                "Mail",
                &[("from", "Person"), ("to", "Person"), ("contents", "string")],
            )
            .unwrap();
        builder.build().unwrap()
    }

    fn mail_domain() -> Eip712Domain {
        Eip712Domain::new()
            .with_name("Ether Mail")
            .with_version("1")
            .with_chain_id(1u64)
            .with_verifying_contract(
                "0xCcCCccccCCCCcCCCCCCcCcCccCcCCCcCcccccccC".parse::<Address>().unwrap(),
            )
    }

    fn mail_message() -> Value {
        json!({
            "from": {"name": "Cow", "wallet": "0xCD2a3d9F938E13CD947Ec05AbC7FE734Df8DD826"},
            "to": {"name": "Bob", "wallet": "0xbBbBBBBbbBBBbbbBbbBbbbbBBbBbbbbBbBbbBBbB"},
            "contents": "Hello, Bob!"
        })
    }

    #[test]
    fn test_mail_struct_hash() {
        let registry = mail_registry();
        let hash = StructHasher::new(&registry)
            .hash_struct("Mail", &mail_message())
            .unwrap();
        assert_eq!(
            hex::encode(hash),
            "c52c0ee5d84264471806290a3f2c4cecfc5490626bf912d01f240d7a274b371e"
        );
    }

    #[test]
    fn test_mail_domain_separator() {
        assert_eq!(
            hex::encode(domain_separator(&mail_domain()).unwrap()),
            "f2cee375fa42b42143804025fc449deafd50cc031ca257e0b194a650a912090f"
        );
    }

    #[test]
    fn test_mail_digest() {
        let digest = compute_digest(&mail_domain(), "Mail", &mail_registry(), &mail_message()).unwrap();
        assert_eq!(
            hex::encode(digest),
            "be609aee343fb3c4b28e1df9e632fca64fcfaede20f02e86244efddf30957bd2"
        );
    }

    #[test]
    fn test_compose_digest_matches_pre_image() {
        let registry = mail_registry();
        let hasher = StructHasher::new(&registry);
        let parts = pre_image(&mail_domain(), "Mail", &hasher, &mail_message()).unwrap();
        assert_eq!(
            compose_digest(&parts.domain_separator, &parts.struct_hash),
            parts.digest
        );
    }

    #[test]
    fn test_missing_field_reports_path() {
        let registry = mail_registry();
        let mut message = mail_message();
        message["to"].as_object_mut().unwrap().remove("wallet");
        let err = StructHasher::new(&registry)
            .hash_struct("Mail", &message)
            .unwrap_err();
        assert_eq!(err, Eip712Error::MissingField("Mail.to.wallet".to_string()));
        assert_eq!(err.kind(), ErrorKind::Encoding);
    }

    #[test]
    fn test_extra_fields_ignored_unless_strict() {
        let registry = mail_registry();
        let mut message = mail_message();
        message["from"]["nickname"] = json!("moo");

        let lenient = StructHasher::new(&registry).hash_struct("Mail", &message).unwrap();
        let plain = StructHasher::new(&registry).hash_struct("Mail", &mail_message()).unwrap();
        assert_eq!(lenient, plain);

        let strict = StructHasher::with_options(
            &registry,
            HashOptions {
                strict: true,
                ..HashOptions::default()
            },
        );
        let err = strict.hash_struct("Mail", &message).unwrap_err();
        assert_eq!(err, Eip712Error::UnexpectedField("Mail.from.nickname".to_string()));
    }

    #[test]
    fn test_value_errors_carry_field_path() {
        let registry = mail_registry();
        let mut message = mail_message();
        message["from"]["wallet"] = json!("0x1234");
        match StructHasher::new(&registry).hash_struct("Mail", &message) {
            Err(Eip712Error::InvalidValue { field, type_name, .. }) => {
                assert_eq!(field, "Mail.from.wallet");
                assert_eq!(type_name, "address");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_depth_guard() {
        let mut builder = TypeRegistry::builder();
        builder
            .register_type("Leaf", &[("values", "uint8[][][]")])
            .unwrap();
        let registry = builder.build().unwrap();
        let hasher = StructHasher::with_options(
            &registry,
            HashOptions {
                strict: false,
                max_depth: 2,
            },
        );
        let err = hasher
            .hash_struct("Leaf", &json!({"values": [[[1]]]}))
            .unwrap_err();
        assert_eq!(err, Eip712Error::DepthExceeded("Leaf.values[0][0][0]".to_string()));
        assert!(hasher.hash_struct("Leaf", &json!({"values": [[]]})).is_ok());
    }

    #[test]
    fn test_domain_fields_change_separator() {
        let base = Eip712Domain::new().with_name("MyToken");
        let with_chain = base.clone().with_chain_id(1u64);
        let with_salt = base.clone().with_salt([7u8; 32]);

        let a = domain_separator(&base).unwrap();
        let b = domain_separator(&with_chain).unwrap();
        let c = domain_separator(&with_salt).unwrap();
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_ne!(b, c);
        assert_eq!(with_chain.chain_id, Some(U256::from(1u64)));
    }
}
