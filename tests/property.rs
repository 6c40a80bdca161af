use ethers_core::types::Address;
use hawala_eip712::eip712::{
    address_of, compute_digest, recover_signer, sign_hash, Eip712Domain, Eip712Signature,
    ErrorKind, SignatureVerifier, TypeRegistry, SECP256K1_HALF_ORDER,
};
use hawala_eip712::PrivateKey;
use proptest::prelude::*;
use secp256k1::SecretKey;
use serde_json::json;

fn any_key_bytes() -> impl Strategy<Value = [u8; 32]> {
    prop::array::uniform32(any::<u8>())
        .prop_filter("valid secp256k1 scalar", |bytes| SecretKey::from_slice(bytes).is_ok())
}

fn transfer_registry() -> TypeRegistry {
    let mut builder = TypeRegistry::builder();
    builder
        .register_type(
            "Transfer",
            &[("to", "address"), ("amount", "uint256"), ("deadline", "uint256")],
        )
        .unwrap();
    builder.build().unwrap()
}

fn domain(chain_id: u64) -> Eip712Domain {
    Eip712Domain::new()
        .with_name("MyToken")
        .with_version("1")
        .with_chain_id(chain_id)
        .with_verifying_contract(Address::repeat_byte(0x11))
}

fn transfer(to: [u8; 20], amount: u64, deadline: u64) -> serde_json::Value {
    json!({
        "to": format!("0x{}", hex::encode(to)),
        "amount": amount,
        "deadline": deadline,
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn signatures_recover_their_signer(
        key_bytes in any_key_bytes(),
        to in prop::array::uniform20(any::<u8>()),
        amount in any::<u64>(),
        deadline in any::<u64>(),
    ) {
        let key = PrivateKey::from_slice(&key_bytes).unwrap();
        let registry = transfer_registry();
        let digest = compute_digest(&domain(1), "Transfer", &registry, &transfer(to, amount, deadline)).unwrap();

        let signature = sign_hash(&digest, &key).unwrap();
        prop_assert!(signature.v == 27 || signature.v == 28);
        prop_assert!(signature.s <= SECP256K1_HALF_ORDER);
        prop_assert!(signature.is_low_s());

        let signer = address_of(&key).unwrap();
        prop_assert_eq!(recover_signer(&digest, &signature).unwrap(), signer);
        prop_assert!(SignatureVerifier::strict().verify(&digest, &signature, &signer).unwrap());
    }

    #[test]
    fn changing_any_value_changes_the_digest(
        to in prop::array::uniform20(any::<u8>()),
        amount in 0u64..u64::MAX,
        deadline in any::<u64>(),
        chain_id in 1u64..u64::MAX,
    ) {
        let registry = transfer_registry();
        let base = compute_digest(&domain(chain_id), "Transfer", &registry, &transfer(to, amount, deadline)).unwrap();

        let bumped = compute_digest(&domain(chain_id), "Transfer", &registry, &transfer(to, amount + 1, deadline)).unwrap();
        prop_assert_ne!(base, bumped);

        let mut other_to = to;
        other_to[19] ^= 0x01;
        let redirected = compute_digest(&domain(chain_id), "Transfer", &registry, &transfer(other_to, amount, deadline)).unwrap();
        prop_assert_ne!(base, redirected);

        let other_chain = compute_digest(&domain(chain_id - 1), "Transfer", &registry, &transfer(to, amount, deadline)).unwrap();
        prop_assert_ne!(base, other_chain);
    }

    #[test]
    fn tampered_messages_do_not_verify(
        key_bytes in any_key_bytes(),
        to in prop::array::uniform20(any::<u8>()),
        amount in 0u64..u64::MAX,
    ) {
        let key = PrivateKey::from_slice(&key_bytes).unwrap();
        let registry = transfer_registry();
        let signer = address_of(&key).unwrap();
        let digest = compute_digest(&domain(1), "Transfer", &registry, &transfer(to, amount, 0)).unwrap();
        let signature = sign_hash(&digest, &key).unwrap();

        let tampered = compute_digest(&domain(1), "Transfer", &registry, &transfer(to, amount + 1, 0)).unwrap();
        match recover_signer(&tampered, &signature) {
            Ok(recovered) => prop_assert_ne!(recovered, signer),
            Err(err) => prop_assert_eq!(err.kind(), ErrorKind::Recovery),
        }
    }

    #[test]
    fn flipped_signature_bytes_do_not_recover_the_signer(
        key_bytes in any_key_bytes(),
        digest in prop::array::uniform32(any::<u8>()),
        index in 0usize..Eip712Signature::LEN,
        mask in 1u8..=u8::MAX,
    ) {
        let key = PrivateKey::from_slice(&key_bytes).unwrap();
        let signer = address_of(&key).unwrap();
        let mut bytes = sign_hash(&digest, &key).unwrap().to_bytes();
        bytes[index] ^= mask;

        // A flipped v is a format error unless it lands on the other valid
        // parity, in which case recovery yields some other key.
        let outcome = Eip712Signature::from_bytes(&bytes)
            .and_then(|signature| recover_signer(&digest, &signature));
        match outcome {
            Ok(recovered) => prop_assert_ne!(recovered, signer),
            Err(err) => {
                let kind = err.kind();
                if index == 64 {
                    prop_assert!(kind == ErrorKind::SignatureFormat || kind == ErrorKind::Recovery);
                } else {
                    prop_assert_eq!(kind, ErrorKind::Recovery);
                }
            }
        }
    }

    #[test]
    fn uint_width_is_enforced(value in any::<u64>()) {
        let mut builder = TypeRegistry::builder();
        builder.register_type("Small", &[("value", "uint8")]).unwrap();
        let registry = builder.build().unwrap();

        let result = compute_digest(&domain(1), "Small", &registry, &json!({"value": value}));
        if value <= u64::from(u8::MAX) {
            prop_assert!(result.is_ok());
        } else {
            prop_assert_eq!(result.unwrap_err().kind(), ErrorKind::Value);
        }
    }
}
