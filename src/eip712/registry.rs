//! EIP-712 Type Registry
//!
//! Struct definitions are collected with a [`TypeRegistryBuilder`] and checked
//! as a whole when the registry is built: every reference must resolve and
//! the reference graph must be acyclic. The built [`TypeRegistry`] is
//! immutable, carries each type's canonical string and hash, and can be
//! shared across threads.

use super::encoder::{build_type_string, keccak256};
use super::types::*;
use std::collections::{BTreeMap, HashMap, HashSet};

#[derive(Debug, Clone)]
struct RegisteredType {
    descriptor: TypeDescriptor,
    type_string: String,
    type_hash: [u8; 32],
}

/// Collects struct definitions before validation.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistryBuilder {
    types: BTreeMap<String, TypeDescriptor>,
}

impl TypeRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a struct definition. Field types may reference types that are
    /// registered later; references are resolved in [`Self::build`].
    pub fn register(&mut self, descriptor: TypeDescriptor) -> Eip712Result<&mut Self> {
        if descriptor.name == EIP712_DOMAIN_TYPE {
            return Err(Eip712Error::ReservedType(descriptor.name));
        }
        if !is_identifier(&descriptor.name) {
            return Err(Eip712Error::MalformedType {
                type_name: descriptor.name,
                reason: "not a valid identifier".to_string(),
            });
        }
        if self.types.contains_key(&descriptor.name) {
            return Err(Eip712Error::DuplicateType(descriptor.name));
        }

        let mut seen = HashSet::new();
        for field in &descriptor.fields {
            if !is_identifier(&field.name) {
                return Err(Eip712Error::MalformedType {
                    type_name: descriptor.name.clone(),
                    reason: format!("field name `{}` is not a valid identifier", field.name),
                });
            }
            if !seen.insert(field.name.as_str()) {
                return Err(Eip712Error::MalformedType {
                    type_name: descriptor.name.clone(),
                    reason: format!("field `{}` is declared twice", field.name),
                });
            }
        }

        self.types.insert(descriptor.name.clone(), descriptor);
        Ok(self)
    }

    /// Register a type from `(field name, declared type)` pairs.
    pub fn register_type(&mut self, name: &str, fields: &[(&str, &str)]) -> Eip712Result<&mut Self> {
        let fields = fields
            .iter()
            .map(|(field, type_name)| FieldDescriptor::parse(*field, type_name))
            .collect::<Eip712Result<Vec<_>>>()?;
        self.register(TypeDescriptor::new(name, fields))
    }

    /// Validate the full type graph and freeze it.
    pub fn build(self) -> Eip712Result<TypeRegistry> {
        for descriptor in self.types.values() {
            for referenced in descriptor.references() {
                if referenced == EIP712_DOMAIN_TYPE {
                    return Err(Eip712Error::ReservedType(referenced.to_string()));
                }
                if !self.types.contains_key(referenced) {
                    return Err(Eip712Error::UnresolvedReference {
                        type_name: referenced.to_string(),
                        referenced_by: descriptor.name.clone(),
                    });
                }
            }
        }

        detect_cycles(&self.types)?;

        let mut registered = BTreeMap::new();
        for (name, descriptor) in &self.types {
            let type_string = build_type_string(descriptor, &self.types)?;
            let type_hash = keccak256(type_string.as_bytes());
            tracing::debug!(type_name = %name, %type_string, "registered EIP-712 type");
            registered.insert(
                name.clone(),
                RegisteredType {
                    descriptor: descriptor.clone(),
                    type_string,
                    type_hash,
                },
            );
        }

        Ok(TypeRegistry { types: registered })
    }
}

/// Depth-first walk with a visiting set; any edge back into the current
/// path is a cycle.
fn detect_cycles(types: &BTreeMap<String, TypeDescriptor>) -> Eip712Result<()> {
    #[derive(Clone, Copy, PartialEq, Eq)]
    enum Mark {
        Visiting,
        Done,
    }

    fn visit<'a>(
        name: &'a str,
        types: &'a BTreeMap<String, TypeDescriptor>,
        marks: &mut HashMap<&'a str, Mark>,
        path: &mut Vec<&'a str>,
    ) -> Eip712Result<()> {
        match marks.get(name) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => {
                let start = path.iter().position(|n| *n == name).unwrap_or(0);
                let mut cycle: Vec<&str> = path[start..].to_vec();
                cycle.push(name);
                return Err(Eip712Error::CyclicType(cycle.join(" -> ")));
            }
            None => {}
        }

        marks.insert(name, Mark::Visiting);
        path.push(name);
        if let Some(descriptor) = types.get(name) {
            for referenced in descriptor.references() {
                visit(referenced, types, marks, path)?;
            }
        }
        path.pop();
        marks.insert(name, Mark::Done);
        Ok(())
    }

    let mut marks = HashMap::new();
    for name in types.keys() {
        visit(name, types, &mut marks, &mut Vec::new())?;
    }
    Ok(())
}

/// Immutable set of validated struct types.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    types: BTreeMap<String, RegisteredType>,
}

impl TypeRegistry {
    pub fn builder() -> TypeRegistryBuilder {
        TypeRegistryBuilder::new()
    }

    /// A registry with no types, enough for hashing structs without references.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn resolve(&self, name: &str) -> Eip712Result<&TypeDescriptor> {
        self.entry(name).map(|t| &t.descriptor)
    }

    /// Canonical type string, e.g. `Mail(Person from,Person to,string contents)Person(string name,address wallet)`
    pub fn type_string(&self, name: &str) -> Eip712Result<&str> {
        self.entry(name).map(|t| t.type_string.as_str())
    }

    /// `keccak256(type_string(name))`
    pub fn type_hash(&self, name: &str) -> Eip712Result<[u8; 32]> {
        self.entry(name).map(|t| t.type_hash)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    fn entry(&self, name: &str) -> Eip712Result<&RegisteredType> {
        self.types
            .get(name)
            .ok_or_else(|| Eip712Error::UnknownType(name.to_string()))
    }
}

#[cfg(test)]
mod registry_tests {
    use super::*;

    fn mail_registry() -> TypeRegistry {
        let mut builder = TypeRegistry::builder();
        builder
            .register_type(
                "Mail",
                &[("from", "Person"), ("to", "Person"), ("contents", "string")],
            )
            .unwrap()
            .register_type("Person", &[("name", "string"), ("wallet", "address")])
            .unwrap();
        builder.build().unwrap()
    }

    #[test]
    fn test_forward_references_resolve_at_build() {
        let registry = mail_registry();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.resolve("Mail").unwrap().fields.len(), 3);
        assert_eq!(
            hex::encode(registry.type_hash("Mail").unwrap()),
            "a0cedeb2dc280ba39b857546d74f5549c3a1d7bdc2dd96bf881f76108e23dac2"
        );
    }

    #[test]
    fn test_duplicate_type_rejected() {
        let mut builder = TypeRegistry::builder();
        builder.register_type("Person", &[("name", "string")]).unwrap();
        let err = builder
            .register_type("Person", &[("wallet", "address")])
            .unwrap_err();
        assert_eq!(err, Eip712Error::DuplicateType("Person".to_string()));
        assert_eq!(err.kind(), ErrorKind::Type);
    }

    #[test]
    fn test_unresolved_reference_rejected() {
        let mut builder = TypeRegistry::builder();
        builder
            .register_type("Mail", &[("from", "Person")])
            .unwrap();
        let err = builder.build().unwrap_err();
        assert_eq!(
            err,
            Eip712Error::UnresolvedReference {
                type_name: "Person".to_string(),
                referenced_by: "Mail".to_string(),
            }
        );
    }

    #[test]
    fn test_self_reference_rejected() {
        let mut builder = TypeRegistry::builder();
        builder
            .register_type("Node", &[("value", "uint256"), ("next", "Node")])
            .unwrap();
        let err = builder.build().unwrap_err();
        assert_eq!(err, Eip712Error::CyclicType("Node -> Node".to_string()));
    }

    #[test]
    fn test_transitive_cycle_through_array_rejected() {
        let mut builder = TypeRegistry::builder();
        builder
            .register_type("A", &[("b", "B")])
            .unwrap()
            .register_type("B", &[("c", "C[]")])
            .unwrap()
            .register_type("C", &[("a", "A")])
            .unwrap();
        let err = builder.build().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Type);
        assert_eq!(err, Eip712Error::CyclicType("A -> B -> C -> A".to_string()));
    }

    #[test]
    fn test_reserved_and_malformed_names() {
        let mut builder = TypeRegistry::builder();
        let err = builder
            .register_type(EIP712_DOMAIN_TYPE, &[("name", "string")])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Type);

        let err = builder
            .register_type("Bad", &[("x", "uint256"), ("x", "bool")])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Encoding);

        let err = builder.register_type("Bad Name", &[]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Encoding);
    }

    #[test]
    fn test_resolve_unknown() {
        let registry = mail_registry();
        assert_eq!(
            registry.resolve("Order").unwrap_err(),
            Eip712Error::UnknownType("Order".to_string())
        );
    }

    #[test]
    fn test_registry_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TypeRegistry>();
    }
}
