//! Assembly manifest model
//!
//! An assembly describes the types a module exports. It is read from the
//! `.tether.json` manifest at the root of an unpacked package and is
//! immutable once loaded.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

/// Manifest file name inside a package directory.
pub const ASSEMBLY_FILE: &str = ".tether.json";

/// A loaded module's type manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assembly {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub types: BTreeMap<String, TypeDef>,
    /// Naming information for host-language code generators
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub targets: Option<Json>,
    /// Script name -> path relative to the package root
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub bin: BTreeMap<String, String>,
}

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TypeDef {
    Class(ClassType),
    Interface(InterfaceType),
    Enum(EnumType),
}

impl TypeDef {
    pub fn fqn(&self) -> &str {
        match self {
            TypeDef::Class(c) => &c.fqn,
            TypeDef::Interface(i) => &i.fqn,
            TypeDef::Enum(e) => &e.fqn,
        }
    }

    pub fn base(&self) -> Option<&str> {
        match self {
            TypeDef::Class(c) => c.base.as_deref(),
            _ => None,
        }
    }

    pub fn interfaces(&self) -> &[String] {
        match self {
            TypeDef::Class(c) => &c.interfaces,
            TypeDef::Interface(i) => &i.interfaces,
            TypeDef::Enum(_) => &[],
        }
    }

    pub fn methods(&self) -> &[Method] {
        match self {
            TypeDef::Class(c) => &c.methods,
            TypeDef::Interface(i) => &i.methods,
            TypeDef::Enum(_) => &[],
        }
    }

    pub fn properties(&self) -> &[Property] {
        match self {
            TypeDef::Class(c) => &c.properties,
            TypeDef::Interface(i) => &i.properties,
            TypeDef::Enum(_) => &[],
        }
    }

    /// Data-only interface, passed by value.
    pub fn is_struct(&self) -> bool {
        matches!(self, TypeDef::Interface(i) if i.datatype)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassType {
    pub fqn: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base: Option<String>,
    #[serde(default)]
    pub interfaces: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initializer: Option<Initializer>,
    #[serde(default)]
    pub methods: Vec<Method>,
    #[serde(default)]
    pub properties: Vec<Property>,
    #[serde(default, rename = "abstract")]
    pub is_abstract: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InterfaceType {
    pub fqn: String,
    #[serde(default)]
    pub interfaces: Vec<String>,
    #[serde(default)]
    pub methods: Vec<Method>,
    #[serde(default)]
    pub properties: Vec<Property>,
    #[serde(default)]
    pub datatype: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnumType {
    pub fqn: String,
    pub members: Vec<EnumMember>,
}

impl EnumType {
    pub fn has_member(&self, name: &str) -> bool {
        self.members.iter().any(|m| m.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumMember {
    pub name: String,
}

// ============================================================================
// Members
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Initializer {
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    #[serde(default)]
    pub variadic: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Method {
    pub name: String,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    /// Absent means `void`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub returns: Option<OptionalValue>,
    #[serde(default, rename = "static")]
    pub is_static: bool,
    #[serde(default, rename = "async")]
    pub is_async: bool,
    #[serde(default)]
    pub variadic: bool,
}

impl Method {
    /// Signature used for overrides of members the catalog does not know.
    pub fn untyped(name: &str) -> Self {
        Self {
            name: name.to_string(),
            parameters: vec![Parameter {
                name: "args".to_string(),
                type_ref: TypeReference::any(),
                optional: true,
                variadic: true,
            }],
            returns: Some(OptionalValue {
                type_ref: TypeReference::any(),
                optional: true,
            }),
            is_static: false,
            is_async: false,
            variadic: true,
        }
    }

    /// Variadic if flagged on the method or on its last parameter.
    pub fn is_variadic(&self) -> bool {
        self.variadic || self.parameters.last().map_or(false, |p| p.variadic)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    #[serde(rename = "type")]
    pub type_ref: TypeReference,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub variadic: bool,
}

impl Parameter {
    pub fn declared(&self) -> OptionalValue {
        OptionalValue {
            type_ref: self.type_ref.clone(),
            optional: self.optional,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub name: String,
    #[serde(rename = "type")]
    pub type_ref: TypeReference,
    #[serde(default)]
    pub optional: bool,
    #[serde(default, rename = "static")]
    pub is_static: bool,
    #[serde(default)]
    pub immutable: bool,
}

impl Property {
    pub fn untyped(name: &str) -> Self {
        Self {
            name: name.to_string(),
            type_ref: TypeReference::any(),
            optional: true,
            is_static: false,
            immutable: false,
        }
    }

    pub fn declared(&self) -> OptionalValue {
        OptionalValue {
            type_ref: self.type_ref.clone(),
            optional: self.optional,
        }
    }
}

// ============================================================================
// Type references
// ============================================================================

/// A type reference plus its optional flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionalValue {
    #[serde(rename = "type")]
    pub type_ref: TypeReference,
    #[serde(default)]
    pub optional: bool,
}

impl OptionalValue {
    pub fn required(type_ref: TypeReference) -> Self {
        Self {
            type_ref,
            optional: false,
        }
    }

    pub fn optional(type_ref: TypeReference) -> Self {
        Self {
            type_ref,
            optional: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrimitiveType {
    Any,
    Boolean,
    Date,
    Json,
    Number,
    String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionKind {
    Array,
    Map,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionType {
    pub kind: CollectionKind,
    pub elementtype: Box<TypeReference>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnionType {
    pub types: Vec<TypeReference>,
}

/// A declared type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TypeReference {
    Primitive { primitive: PrimitiveType },
    Named { fqn: String },
    Collection { collection: CollectionType },
    Union { union: UnionType },
}

impl TypeReference {
    pub fn primitive(primitive: PrimitiveType) -> Self {
        TypeReference::Primitive { primitive }
    }

    pub fn any() -> Self {
        Self::primitive(PrimitiveType::Any)
    }

    pub fn named(fqn: &str) -> Self {
        TypeReference::Named {
            fqn: fqn.to_string(),
        }
    }

    pub fn array_of(element: TypeReference) -> Self {
        TypeReference::Collection {
            collection: CollectionType {
                kind: CollectionKind::Array,
                elementtype: Box::new(element),
            },
        }
    }

    pub fn map_of(element: TypeReference) -> Self {
        TypeReference::Collection {
            collection: CollectionType {
                kind: CollectionKind::Map,
                elementtype: Box::new(element),
            },
        }
    }

    pub fn union_of(types: Vec<TypeReference>) -> Self {
        TypeReference::Union {
            union: UnionType { types },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_class_with_members() {
        let def: TypeDef = serde_json::from_value(json!({
            "kind": "class",
            "fqn": "lib.Adder",
            "base": "lib.Base",
            "initializer": {"parameters": [
                {"name": "a", "type": {"primitive": "number"}},
                {"name": "b", "type": {"primitive": "number"}, "optional": true}
            ]},
            "methods": [
                {"name": "sum", "returns": {"type": {"primitive": "number"}}},
                {"name": "later", "async": true},
                {"name": "create", "static": true, "returns": {"type": {"fqn": "lib.Adder"}}}
            ],
            "properties": [
                {"name": "tags", "type": {"collection": {"kind": "map", "elementtype": {"primitive": "string"}}}, "immutable": true}
            ]
        }))
        .unwrap();

        assert_eq!(def.fqn(), "lib.Adder");
        assert_eq!(def.base(), Some("lib.Base"));
        assert!(def.methods()[1].is_async);
        assert!(def.methods()[2].is_static);
        assert!(def.methods()[1].returns.is_none());
        assert_eq!(
            def.properties()[0].type_ref,
            TypeReference::map_of(TypeReference::primitive(PrimitiveType::String))
        );
        let TypeDef::Class(class) = def else { panic!("expected class") };
        assert!(class.initializer.unwrap().parameters[1].optional);
    }

    #[test]
    fn test_parse_union_and_enum() {
        let t: TypeReference = serde_json::from_value(json!({
            "union": {"types": [{"primitive": "string"}, {"fqn": "lib.Foo"}]}
        }))
        .unwrap();
        assert_eq!(
            t,
            TypeReference::union_of(vec![
                TypeReference::primitive(PrimitiveType::String),
                TypeReference::named("lib.Foo"),
            ])
        );

        let e: TypeDef = serde_json::from_value(json!({
            "kind": "enum", "fqn": "lib.Color", "members": [{"name": "RED"}, {"name": "GREEN"}]
        }))
        .unwrap();
        match e {
            TypeDef::Enum(e) => assert!(e.has_member("GREEN") && !e.has_member("BLUE")),
            other => panic!("expected enum, got {:?}", other),
        }
    }

    #[test]
    fn test_struct_flag() {
        let def: TypeDef = serde_json::from_value(json!({
            "kind": "interface", "fqn": "lib.Point", "datatype": true
        }))
        .unwrap();
        assert!(def.is_struct());
    }

    #[test]
    fn test_untyped_method_is_variadic() {
        assert!(Method::untyped("x").is_variadic());
    }
}
