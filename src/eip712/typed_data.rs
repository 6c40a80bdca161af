//! Typed Data Documents
//!
//! The JSON shape used by `eth_signTypedData_v4` requests: a type table, the
//! primary type, the domain and the message.

use super::hasher::{pre_image, Eip712PreImage, HashOptions, StructHasher};
use super::registry::TypeRegistry;
use super::signer::{sign_hash, SignatureVerifier};
use super::types::*;
use crate::security::secure_memory::PrivateKey;
use crate::utils::engine_config::EngineSettings;
use ethers_core::types::Address;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Complete EIP-712 typed data structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypedData {
    /// Type definitions (struct name -> fields)
    pub types: BTreeMap<String, Vec<TypedDataField>>,

    /// The name of the primary type being signed
    pub primary_type: String,

    /// The EIP-712 domain
    pub domain: Eip712Domain,

    /// The actual message data to sign
    pub message: serde_json::Value,
}

impl TypedData {
    /// Parse typed data from a JSON string
    pub fn from_json(json: &str) -> Eip712Result<Self> {
        serde_json::from_str(json).map_err(|e| Eip712Error::InvalidJson(e.to_string()))
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> Eip712Result<String> {
        serde_json::to_string(self).map_err(|e| Eip712Error::InvalidJson(e.to_string()))
    }

    /// Build and validate the registry of message types.
    ///
    /// A declared `EIP712Domain` entry is skipped: the domain type always
    /// follows the fields present in `domain`.
    pub fn registry(&self) -> Eip712Result<TypeRegistry> {
        let mut builder = TypeRegistry::builder();
        for (name, fields) in &self.types {
            if name == EIP712_DOMAIN_TYPE {
                continue;
            }
            let fields = fields
                .iter()
                .map(FieldDescriptor::try_from)
                .collect::<Eip712Result<Vec<_>>>()?;
            builder.register(TypeDescriptor::new(name.clone(), fields))?;
        }
        let registry = builder.build()?;

        if !registry.contains(&self.primary_type) {
            return Err(Eip712Error::UnknownType(self.primary_type.clone()));
        }
        Ok(registry)
    }

    /// Domain separator, struct hash and digest
    pub fn pre_image(&self, settings: &EngineSettings) -> Eip712Result<Eip712PreImage> {
        let registry = self.registry()?;
        let hasher = StructHasher::with_options(&registry, HashOptions::from(settings));
        pre_image(&self.domain, &self.primary_type, &hasher, &self.message)
    }

    /// The digest to sign, with standard settings
    pub fn hash(&self) -> Eip712Result<[u8; 32]> {
        self.pre_image(&EngineSettings::standard()).map(|p| p.digest)
    }

    /// Sign the digest of this document
    pub fn sign(&self, private_key: &PrivateKey) -> Eip712Result<Eip712Signature> {
        sign_hash(&self.hash()?, private_key)
    }

    /// Check that `signature` over this document was made by `expected_address`
    pub fn verify(
        &self,
        signature: &Eip712Signature,
        expected_address: &Address,
        settings: &EngineSettings,
    ) -> Eip712Result<bool> {
        let digest = self.pre_image(settings)?.digest;
        SignatureVerifier::from_settings(settings).verify(&digest, signature, expected_address)
    }
}

#[cfg(test)]
mod typed_data_tests {
    use super::*;

    const MAIL: &str = r#"{
        "types": {
            "EIP712Domain": [
                {"name": "name", "type": "string"},
                {"name": "version", "type": "string"},
                {"name": "chainId", "type": "uint256"},
                {"name": "verifyingContract", "type": "address"}
            ],
            "Person": [
                {"name": "name", "type": "string"},
                {"name": "wallet", "type": "address"}
            ],
            "Mail": [
                {"name": "from", "type": "Person"},
                {"name": "to", "type": "Person"},
                {"name": "contents", "type": "string"}
            ]
        },
        "primaryType": "Mail",
        "domain": {
            "name": "Ether Mail",
            "version": "1",
            "chainId": 1,
            "verifyingContract": "0xCcCCccccCCCCcCCCCCCcCcCccCcCCCcCcccccccC"
        },
        "message": {
            "from": {
                "name": "Cow",
                "wallet": "0xCD2a3d9F938E13CD947Ec05AbC7FE734Df8DD826"
            },
            "to": {
                "name": "Bob",
                "wallet": "0xbBbBBBBbbBBBbbbBbbBbbbbBBbBbbbbBbBbbBBbB"
            },
            "contents": "Hello, Bob!"
        }
    }"#;

    #[test]
    fn test_mail_document_hash() {
        let typed_data = TypedData::from_json(MAIL).unwrap();
        assert_eq!(
            hex::encode(typed_data.hash().unwrap()),
            "be609aee343fb3c4b28e1df9e632fca64fcfaede20f02e86244efddf30957bd2"
        );
    }

    #[test]
    fn test_registry_skips_declared_domain() {
        let typed_data = TypedData::from_json(MAIL).unwrap();
        let registry = typed_data.registry().unwrap();
        assert!(!registry.contains(EIP712_DOMAIN_TYPE));
        assert_eq!(
            registry.type_string("Mail").unwrap(),
            "Mail(Person from,Person to,string contents)Person(string name,address wallet)"
        );
    }

    #[test]
    fn test_unknown_primary_type() {
        let mut typed_data = TypedData::from_json(MAIL).unwrap();
        typed_data.primary_type = "NonExistent".to_string();
        assert_eq!(
            typed_data.registry().unwrap_err(),
            Eip712Error::UnknownType("NonExistent".to_string())
        );
    }

    #[test]
    fn test_json_roundtrip_preserves_digest() {
        let typed_data = TypedData::from_json(MAIL).unwrap();
        let reparsed = TypedData::from_json(&typed_data.to_json().unwrap()).unwrap();
        assert_eq!(typed_data.hash().unwrap(), reparsed.hash().unwrap());
    }

    #[test]
    fn test_malformed_documents() {
        assert!(matches!(
            TypedData::from_json("{not json"),
            Err(Eip712Error::InvalidJson(_))
        ));

        let bad_type = MAIL.replace(r#""type": "Person"}"#, r#""type": "Person[0]"}"#);
        let typed_data = TypedData::from_json(&bad_type).unwrap();
        assert_eq!(typed_data.registry().unwrap_err().kind(), ErrorKind::Encoding);
    }
}
