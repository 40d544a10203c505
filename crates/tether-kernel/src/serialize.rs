//! Serialization engine
//!
//! Converts between wire values (JSON, possibly carrying a reserved tag key)
//! and engine values, driven by a declared type.
//!
//! A declared type is first expanded into *candidate classes*. Unions
//! contribute one candidate per alternative, and the list is sorted by a
//! fixed priority:
//!
//! ```text
//! Void < Date < Scalar < Json < Enum < Array < Map < Struct < RefType < Any
//! ```
//!
//! Each candidate is tried in order and the first conversion that succeeds
//! wins. If every candidate fails, the attempts are reported together as
//! `NoMatchingUnionMember`.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value as Json};
use tether_engine::{ObjectRef, Property as Slot, Value};

use crate::api::{ObjRef, EMPTY_OBJECT_FQN, TOKEN_DATE, TOKEN_ENUM, TOKEN_MAP, TOKEN_REF, TOKEN_STRUCT};
use crate::assembly::{CollectionKind, EnumType, OptionalValue, PrimitiveType, Property, TypeDef, TypeReference};
use crate::catalog::TypeCatalog;
use crate::error::{KernelError, KernelResult};
use crate::objects::ObjectTable;

/// Largest integer an f64 holds exactly.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

// ============================================================================
// Candidates
// ============================================================================

/// Serialization classes in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SerializationClass {
    Void,
    Date,
    Scalar,
    Json,
    Enum,
    Array,
    Map,
    Struct,
    RefType,
    Any,
}

/// Type details a candidate needs.
#[derive(Debug, Clone, Copy)]
pub enum Shape<'t> {
    Void,
    Primitive(PrimitiveType),
    Named(&'t str),
    Element(&'t TypeReference),
}

/// One way of interpreting a value.
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'t> {
    pub class: SerializationClass,
    pub shape: Shape<'t>,
    pub optional: bool,
}

impl Candidate<'_> {
    fn describe(&self) -> String {
        match (self.class, self.shape) {
            (_, Shape::Void) => "void".to_string(),
            (_, Shape::Primitive(p)) => primitive_name(p).to_string(),
            (_, Shape::Named(fqn)) => fqn.to_string(),
            (SerializationClass::Map, Shape::Element(_)) => "map".to_string(),
            (_, Shape::Element(_)) => "array".to_string(),
        }
    }

    fn fqn(&self) -> &str {
        match self.shape {
            Shape::Named(fqn) => fqn,
            _ => EMPTY_OBJECT_FQN,
        }
    }
}

// ============================================================================
// Serializer
// ============================================================================

/// Converter bound to the object table and type catalog.
pub struct Serializer<'a> {
    objects: &'a mut ObjectTable,
    catalog: &'a TypeCatalog,
}

impl<'a> Serializer<'a> {
    pub fn new(objects: &'a mut ObjectTable, catalog: &'a TypeCatalog) -> Self {
        Self { objects, catalog }
    }

    /// Native to wire. `None` declares `void`.
    pub fn to_wire(&mut self, value: &Value, declared: Option<&OptionalValue>) -> KernelResult<Json> {
        let candidates = self.candidates(declared)?;
        self.first_match(&candidates, |this, c| this.wire_as(value, c))
    }

    /// Wire to native. `None` declares `void`.
    pub fn to_native(&mut self, wire: &Json, declared: Option<&OptionalValue>) -> KernelResult<Value> {
        let candidates = self.candidates(declared)?;
        self.first_match(&candidates, |this, c| this.native_as(wire, c))
    }

    /// Ordered candidate list for a declared type.
    pub fn candidates<'t>(&self, declared: Option<&'t OptionalValue>) -> KernelResult<Vec<Candidate<'t>>> {
        let mut out = Vec::new();
        match declared {
            None => out.push(Candidate {
                class: SerializationClass::Void,
                shape: Shape::Void,
                optional: true,
            }),
            Some(d) => self.expand(&d.type_ref, d.optional, &mut out)?,
        }
        out.sort_by_key(|c| c.class);
        Ok(out)
    }

    fn expand<'t>(&self, type_ref: &'t TypeReference, optional: bool, out: &mut Vec<Candidate<'t>>) -> KernelResult<()> {
        let (class, shape) = match type_ref {
            TypeReference::Primitive { primitive } => {
                let class = match primitive {
                    PrimitiveType::Any => SerializationClass::Any,
                    PrimitiveType::Date => SerializationClass::Date,
                    PrimitiveType::Json => SerializationClass::Json,
                    PrimitiveType::Boolean | PrimitiveType::Number | PrimitiveType::String => {
                        SerializationClass::Scalar
                    }
                };
                (class, Shape::Primitive(*primitive))
            }
            TypeReference::Collection { collection } => {
                let class = match collection.kind {
                    CollectionKind::Array => SerializationClass::Array,
                    CollectionKind::Map => SerializationClass::Map,
                };
                (class, Shape::Element(&collection.elementtype))
            }
            TypeReference::Union { union } => {
                for alternative in &union.types {
                    self.expand(alternative, optional, out)?;
                }
                return Ok(());
            }
            TypeReference::Named { fqn } => {
                let class = if fqn == EMPTY_OBJECT_FQN {
                    SerializationClass::RefType
                } else {
                    match self.catalog.type_of(fqn)? {
                        TypeDef::Enum(_) => SerializationClass::Enum,
                        def if def.is_struct() => SerializationClass::Struct,
                        _ => SerializationClass::RefType,
                    }
                };
                (class, Shape::Named(fqn))
            }
        };
        out.push(Candidate { class, shape, optional });
        Ok(())
    }

    fn first_match<'t, T>(
        &mut self,
        candidates: &[Candidate<'t>],
        mut attempt: impl FnMut(&mut Self, &Candidate<'t>) -> KernelResult<T>,
    ) -> KernelResult<T> {
        if let [only] = candidates {
            return attempt(self, only);
        }
        let mut failures = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            match attempt(self, candidate) {
                Ok(converted) => return Ok(converted),
                Err(e) => failures.push(format!("{}: {}", candidate.describe(), e)),
            }
        }
        Err(KernelError::NoMatchingUnionMember(failures))
    }

    fn wire_typed(&mut self, value: &Value, type_ref: &TypeReference, optional: bool) -> KernelResult<Json> {
        let mut candidates = Vec::new();
        self.expand(type_ref, optional, &mut candidates)?;
        candidates.sort_by_key(|c| c.class);
        self.first_match(&candidates, |this, c| this.wire_as(value, c))
    }

    fn native_typed(&mut self, wire: &Json, type_ref: &TypeReference, optional: bool) -> KernelResult<Value> {
        let mut candidates = Vec::new();
        self.expand(type_ref, optional, &mut candidates)?;
        candidates.sort_by_key(|c| c.class);
        self.first_match(&candidates, |this, c| this.native_as(wire, c))
    }

    // ------------------------------------------------------------------------
    // Native -> wire
    // ------------------------------------------------------------------------

    fn wire_as(&mut self, value: &Value, c: &Candidate<'_>) -> KernelResult<Json> {
        if c.class == SerializationClass::Void {
            return Ok(Json::Null);
        }
        if accepts_null(value.is_nullish(), c)? {
            return Ok(Json::Null);
        }
        match c.class {
            SerializationClass::Void => Ok(Json::Null),
            SerializationClass::Date => match value {
                Value::Date(d) => Ok(date_to_wire(d)),
                other => Err(mismatch("a date", other.type_name())),
            },
            SerializationClass::Scalar => match c.shape {
                Shape::Primitive(p) => scalar_to_wire(value, p),
                _ => Err(mismatch("a scalar", value.type_name())),
            },
            SerializationClass::Json => native_to_json(value),
            SerializationClass::Enum => self.enum_to_wire(value, c.fqn()),
            SerializationClass::Array => {
                let Shape::Element(element) = c.shape else {
                    return Err(mismatch("an array", value.type_name()));
                };
                let items = value
                    .as_object()
                    .and_then(ObjectRef::array_items)
                    .ok_or_else(|| mismatch("an array", value.type_name()))?;
                items
                    .iter()
                    .map(|item| self.wire_typed(item, element, false))
                    .collect::<KernelResult<Vec<_>>>()
                    .map(Json::Array)
            }
            SerializationClass::Map => {
                let Shape::Element(element) = c.shape else {
                    return Err(mismatch("a map", value.type_name()));
                };
                let obj = plain_object(value).ok_or_else(|| mismatch("a map", value.type_name()))?;
                let mut entries = Map::new();
                for (key, slot) in obj.enumerable_properties() {
                    if let Some(v) = slot.value() {
                        entries.insert(key, self.wire_typed(v, element, false)?);
                    }
                }
                Ok(tagged(TOKEN_MAP, Json::Object(entries)))
            }
            SerializationClass::Struct => self.struct_to_wire(value, c.fqn()),
            SerializationClass::RefType => self.ref_to_wire(value, c.fqn()),
            SerializationClass::Any => self.any_to_wire(value),
        }
    }

    fn enum_to_wire(&self, value: &Value, fqn: &str) -> KernelResult<Json> {
        let def = self.enum_type(fqn)?;
        let member = value
            .as_str()
            .ok_or_else(|| mismatch(&format!("a member of enum '{}'", fqn), value.type_name()))?;
        if !def.has_member(member) {
            return Err(KernelError::TypeMismatch(format!(
                "enum '{}' has no member '{}'",
                fqn, member
            )));
        }
        Ok(tagged(TOKEN_ENUM, Json::String(format!("{}/{}", fqn, member))))
    }

    fn struct_to_wire(&mut self, value: &Value, fqn: &str) -> KernelResult<Json> {
        let obj = plain_object(value)
            .ok_or_else(|| mismatch(&format!("a '{}' struct", fqn), value.type_name()))?;
        if let Some(existing) = self.objects.find(&obj) {
            return Ok(existing.to_wire());
        }

        let catalog = self.catalog;
        let mut data = Map::new();
        for prop in catalog.all_properties(fqn)? {
            let field = obj.get_data(&prop.name).unwrap_or_default();
            if field.is_nullish() {
                if !prop.optional {
                    return Err(KernelError::MissingRequiredProperty {
                        fqn: fqn.to_string(),
                        property: prop.name.clone(),
                    });
                }
                continue;
            }
            data.insert(prop.name.clone(), self.wire_typed(&field, &prop.type_ref, prop.optional)?);
        }

        let mut body = Map::new();
        body.insert("fqn".to_string(), Json::String(fqn.to_string()));
        body.insert("data".to_string(), Json::Object(data));
        Ok(tagged(TOKEN_STRUCT, Json::Object(body)))
    }

    fn ref_to_wire(&mut self, value: &Value, declared: &str) -> KernelResult<Json> {
        let obj = plain_object(value).ok_or_else(|| {
            mismatch(&format!("an object reference to '{}'", declared), value.type_name())
        })?;

        let mut interfaces = Vec::new();
        let mut fallback = EMPTY_OBJECT_FQN;
        match self.catalog.try_type_of(declared) {
            Some(TypeDef::Interface(_)) => interfaces.push(declared.to_string()),
            Some(TypeDef::Class(_)) => fallback = declared,
            _ => {}
        }
        let fqn = self.native_fqn(&obj).unwrap_or_else(|| fallback.to_string());
        Ok(self.objects.register(&obj, &fqn, &interfaces, self.catalog).to_wire())
    }

    fn any_to_wire(&mut self, value: &Value) -> KernelResult<Json> {
        let obj = match value {
            Value::Undefined | Value::Null => return Ok(Json::Null),
            Value::Bool(b) => return Ok(Json::Bool(*b)),
            Value::Number(n) => return number_to_wire(*n),
            Value::String(s) => return Ok(Json::String(s.clone())),
            Value::Date(d) => return Ok(date_to_wire(d)),
            Value::Object(obj) => obj,
        };

        if let Some(items) = obj.array_items() {
            return items
                .iter()
                .map(|item| self.any_to_wire(item))
                .collect::<KernelResult<Vec<_>>>()
                .map(Json::Array);
        }
        if obj.is_callable() {
            return Err(KernelError::TypeMismatch(format!(
                "a {} cannot be passed across the boundary",
                obj.kind_name()
            )));
        }
        if obj.as_promise().is_some() {
            return Err(KernelError::TypeMismatch(
                "promises cannot be passed across the boundary; use begin/end".to_string(),
            ));
        }
        if let Some(existing) = self.objects.find(obj) {
            return Ok(existing.to_wire());
        }
        if let Some(fqn) = self.native_fqn(obj) {
            return Ok(self.objects.register(obj, &fqn, &[], self.catalog).to_wire());
        }
        if is_behavioral(obj) {
            return Ok(self
                .objects
                .register(obj, EMPTY_OBJECT_FQN, &[], self.catalog)
                .to_wire());
        }

        let mut entries = Map::new();
        for (key, slot) in obj.enumerable_properties() {
            if let Some(v) = slot.value() {
                entries.insert(key, self.any_to_wire(v)?);
            }
        }
        Ok(tagged(TOKEN_MAP, Json::Object(entries)))
    }

    /// Most specific catalogued class on the prototype chain.
    fn native_fqn(&self, obj: &ObjectRef) -> Option<String> {
        obj.chain()
            .iter()
            .skip(1)
            .filter_map(ObjectRef::class_tag)
            .find(|tag| matches!(self.catalog.try_type_of(tag), Some(TypeDef::Class(_))))
            .map(|tag| tag.to_string())
    }

    // ------------------------------------------------------------------------
    // Wire -> native
    // ------------------------------------------------------------------------

    fn native_as(&mut self, wire: &Json, c: &Candidate<'_>) -> KernelResult<Value> {
        if c.class == SerializationClass::Void {
            return Ok(Value::Undefined);
        }
        if accepts_null(wire.is_null(), c)? {
            return Ok(Value::Undefined);
        }
        match c.class {
            SerializationClass::Void => Ok(Value::Undefined),
            SerializationClass::Date => date_from_wire(wire),
            SerializationClass::Scalar => match c.shape {
                Shape::Primitive(p) => scalar_from_wire(wire, p),
                _ => Err(mismatch("a scalar", json_type_name(wire))),
            },
            SerializationClass::Json => Ok(json_to_native(wire)),
            SerializationClass::Enum => self.enum_from_wire(wire, Some(c.fqn())),
            SerializationClass::Array => {
                let Shape::Element(element) = c.shape else {
                    return Err(mismatch("an array", json_type_name(wire)));
                };
                let items = wire
                    .as_array()
                    .ok_or_else(|| mismatch("an array", json_type_name(wire)))?;
                let converted = items
                    .iter()
                    .map(|item| self.native_typed(item, element, false))
                    .collect::<KernelResult<Vec<_>>>()?;
                Ok(Value::Object(ObjectRef::new_array(converted)))
            }
            SerializationClass::Map => {
                let Shape::Element(element) = c.shape else {
                    return Err(mismatch("a map", json_type_name(wire)));
                };
                let entries = wire
                    .get(TOKEN_MAP)
                    .and_then(Json::as_object)
                    .ok_or_else(|| mismatch("a map (\"$kernel.map\")", json_type_name(wire)))?;
                let obj = ObjectRef::new_ordinary(None);
                for (key, item) in entries {
                    obj.set_data(key.clone(), self.native_typed(item, element, false)?);
                }
                Ok(Value::Object(obj))
            }
            SerializationClass::Struct => self.struct_from_wire(wire, c.fqn()),
            SerializationClass::RefType => self.ref_from_wire(wire, c.fqn()),
            SerializationClass::Any => self.any_from_wire(wire),
        }
    }

    fn enum_from_wire(&self, wire: &Json, expected: Option<&str>) -> KernelResult<Value> {
        let token = wire
            .get(TOKEN_ENUM)
            .and_then(Json::as_str)
            .ok_or_else(|| mismatch("an enum value (\"$kernel.enum\")", json_type_name(wire)))?;
        let (fqn, member) = token
            .rsplit_once('/')
            .ok_or_else(|| KernelError::MalformedWireValue(format!("malformed enum token '{}'", token)))?;
        if let Some(expected) = expected {
            if fqn != expected {
                return Err(KernelError::TypeMismatch(format!(
                    "expected a member of enum '{}', got '{}'",
                    expected, token
                )));
            }
        }
        if !self.enum_type(fqn)?.has_member(member) {
            return Err(KernelError::TypeMismatch(format!(
                "enum '{}' has no member '{}'",
                fqn, member
            )));
        }
        Ok(Value::String(member.to_string()))
    }

    fn struct_from_wire(&mut self, wire: &Json, fqn: &str) -> KernelResult<Value> {
        if let Some(objref) = ObjRef::from_wire(wire) {
            let entry = self.objects.resolve(&objref)?;
            return Ok(Value::Object(entry.instance.clone()));
        }
        let fields = wire
            .as_object()
            .ok_or_else(|| mismatch(&format!("a '{}' struct", fqn), json_type_name(wire)))?;

        let data = if let Some(body) = fields.get(TOKEN_STRUCT) {
            let wire_fqn = body.get("fqn").and_then(Json::as_str).ok_or_else(|| {
                KernelError::MalformedWireValue("struct value is missing its \"fqn\"".to_string())
            })?;
            if !self.catalog.is_assignable(wire_fqn, fqn) {
                return Err(KernelError::TypeMismatch(format!(
                    "struct of type '{}' is not assignable to '{}'",
                    wire_fqn, fqn
                )));
            }
            body.get("data").and_then(Json::as_object).ok_or_else(|| {
                KernelError::MalformedWireValue("struct value is missing its \"data\"".to_string())
            })?
        } else if let Some(body) = fields.get(TOKEN_MAP) {
            body.as_object()
                .ok_or_else(|| KernelError::MalformedWireValue("map value is not an object".to_string()))?
        } else if fields.contains_key(TOKEN_DATE) || fields.contains_key(TOKEN_ENUM) {
            return Err(mismatch(&format!("a '{}' struct", fqn), "tagged value"));
        } else {
            fields
        };

        let catalog = self.catalog;
        let props: Vec<&Property> = catalog.all_properties(fqn)?;
        for prop in props.iter().filter(|p| !p.optional) {
            if data.get(&prop.name).map_or(true, Json::is_null) {
                return Err(KernelError::MissingRequiredProperty {
                    fqn: fqn.to_string(),
                    property: prop.name.clone(),
                });
            }
        }

        let obj = ObjectRef::new_ordinary(None);
        for (key, item) in data {
            let converted = match props.iter().find(|p| p.name == *key) {
                Some(prop) => self.native_typed(item, &prop.type_ref, prop.optional)?,
                // forward-compatible: unknown keys pass through as plain JSON
                None => json_to_native(item),
            };
            if !matches!(converted, Value::Undefined) {
                obj.set_data(key.clone(), converted);
            }
        }
        Ok(Value::Object(obj))
    }

    fn ref_from_wire(&mut self, wire: &Json, fqn: &str) -> KernelResult<Value> {
        let objref = ObjRef::from_wire(wire).ok_or_else(|| {
            mismatch(&format!("an object reference to '{}'", fqn), json_type_name(wire))
        })?;
        let entry = self.objects.resolve(&objref)?;
        if fqn != EMPTY_OBJECT_FQN && !entry.is_instance_of(fqn, self.catalog) {
            return Err(KernelError::TypeMismatch(format!(
                "object {} of type '{}' is not assignable to '{}'",
                objref.ref_id, entry.fqn, fqn
            )));
        }
        Ok(Value::Object(entry.instance.clone()))
    }

    fn any_from_wire(&mut self, wire: &Json) -> KernelResult<Value> {
        let fields = match wire {
            Json::Null => return Ok(Value::Undefined),
            Json::Bool(b) => return Ok(Value::Bool(*b)),
            Json::Number(n) => return Ok(Value::Number(n.as_f64().unwrap_or(f64::NAN))),
            Json::String(s) => return Ok(Value::String(s.clone())),
            Json::Array(items) => {
                let converted = items
                    .iter()
                    .map(|item| self.any_from_wire(item))
                    .collect::<KernelResult<Vec<_>>>()?;
                return Ok(Value::Object(ObjectRef::new_array(converted)));
            }
            Json::Object(fields) => fields,
        };

        if fields.contains_key(TOKEN_DATE) {
            return date_from_wire(wire);
        }
        if fields.contains_key(TOKEN_ENUM) {
            return self.enum_from_wire(wire, None);
        }
        if fields.contains_key(TOKEN_REF) {
            return self.ref_from_wire(wire, EMPTY_OBJECT_FQN);
        }
        if let Some(fqn) = fields
            .get(TOKEN_STRUCT)
            .and_then(|body| body.get("fqn"))
            .and_then(Json::as_str)
        {
            return self.struct_from_wire(wire, fqn);
        }
        let fields = match fields.get(TOKEN_MAP).and_then(Json::as_object) {
            Some(inner) => inner,
            None => fields,
        };
        let obj = ObjectRef::new_ordinary(None);
        for (key, item) in fields {
            obj.set_data(key.clone(), self.any_from_wire(item)?);
        }
        Ok(Value::Object(obj))
    }

    fn enum_type(&self, fqn: &str) -> KernelResult<&'a EnumType> {
        let catalog = self.catalog;
        match catalog.type_of(fqn)? {
            TypeDef::Enum(e) => Ok(e),
            _ => Err(KernelError::TypeMismatch(format!("type '{}' is not an enum", fqn))),
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn accepts_null(is_null: bool, c: &Candidate<'_>) -> KernelResult<bool> {
    if !is_null {
        return Ok(false);
    }
    if c.optional {
        return Ok(true);
    }
    Err(KernelError::TypeMismatch(format!(
        "a value is required (type {} is not optional)",
        c.describe()
    )))
}

fn mismatch(expected: &str, actual: &str) -> KernelError {
    KernelError::TypeMismatch(format!("expected {}, got {}", expected, actual))
}

fn tagged(key: &str, value: Json) -> Json {
    let mut map = Map::new();
    map.insert(key.to_string(), value);
    Json::Object(map)
}

fn primitive_name(p: PrimitiveType) -> &'static str {
    match p {
        PrimitiveType::Any => "any",
        PrimitiveType::Boolean => "boolean",
        PrimitiveType::Date => "date",
        PrimitiveType::Json => "json",
        PrimitiveType::Number => "number",
        PrimitiveType::String => "string",
    }
}

fn json_type_name(wire: &Json) -> &'static str {
    match wire {
        Json::Null => "null",
        Json::Bool(_) => "boolean",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}

/// Ordinary object handle, excluding arrays, functions, classes and promises.
fn plain_object(value: &Value) -> Option<ObjectRef> {
    value.as_object().filter(|obj| obj.is_ordinary()).cloned()
}

/// Objects with behavior (accessors or function-valued members anywhere on
/// the chain) can only be passed by reference.
fn is_behavioral(obj: &ObjectRef) -> bool {
    obj.chain().iter().any(|link| {
        link.own_keys().iter().any(|key| match link.own_property(key) {
            Some(Slot::Accessor { .. }) => true,
            Some(Slot::Data { value, .. }) => value.as_object().map_or(false, ObjectRef::is_callable),
            None => false,
        })
    })
}

fn number_to_wire(n: f64) -> KernelResult<Json> {
    if !n.is_finite() {
        return Err(KernelError::MalformedWireValue(format!(
            "number {} cannot be represented on the wire",
            n
        )));
    }
    if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
        return Ok(Json::from(n as i64));
    }
    serde_json::Number::from_f64(n)
        .map(Json::Number)
        .ok_or_else(|| KernelError::MalformedWireValue(format!("number {} cannot be represented on the wire", n)))
}

fn scalar_to_wire(value: &Value, primitive: PrimitiveType) -> KernelResult<Json> {
    match (primitive, value) {
        (PrimitiveType::Boolean, Value::Bool(b)) => Ok(Json::Bool(*b)),
        (PrimitiveType::Number, Value::Number(n)) => number_to_wire(*n),
        (PrimitiveType::String, Value::String(s)) => Ok(Json::String(s.clone())),
        (p, other) => Err(mismatch(&format!("a {}", primitive_name(p)), other.type_name())),
    }
}

fn scalar_from_wire(wire: &Json, primitive: PrimitiveType) -> KernelResult<Value> {
    match (primitive, wire) {
        (PrimitiveType::Boolean, Json::Bool(b)) => Ok(Value::Bool(*b)),
        (PrimitiveType::Number, Json::Number(n)) => n
            .as_f64()
            .map(Value::Number)
            .ok_or_else(|| KernelError::MalformedWireValue(format!("number {} is out of range", n))),
        (PrimitiveType::String, Json::String(s)) => Ok(Value::String(s.clone())),
        (p, other) => Err(mismatch(&format!("a {}", primitive_name(p)), json_type_name(other))),
    }
}

fn date_to_wire(date: &DateTime<Utc>) -> Json {
    tagged(
        TOKEN_DATE,
        Json::String(date.to_rfc3339_opts(SecondsFormat::Millis, true)),
    )
}

fn date_from_wire(wire: &Json) -> KernelResult<Value> {
    let text = wire
        .get(TOKEN_DATE)
        .and_then(Json::as_str)
        .ok_or_else(|| mismatch("a date (\"$kernel.date\")", json_type_name(wire)))?;
    DateTime::parse_from_rfc3339(text)
        .map(|d| Value::Date(d.with_timezone(&Utc)))
        .map_err(|e| KernelError::MalformedWireValue(format!("invalid date '{}': {}", text, e)))
}

/// Plain JSON view of a native value.
fn native_to_json(value: &Value) -> KernelResult<Json> {
    match value {
        Value::Undefined | Value::Null => Ok(Json::Null),
        Value::Bool(b) => Ok(Json::Bool(*b)),
        Value::Number(n) => number_to_wire(*n),
        Value::String(s) => Ok(Json::String(s.clone())),
        Value::Date(d) => Ok(Json::String(d.to_rfc3339_opts(SecondsFormat::Millis, true))),
        Value::Object(obj) => {
            if let Some(items) = obj.array_items() {
                return items
                    .iter()
                    .map(native_to_json)
                    .collect::<KernelResult<Vec<_>>>()
                    .map(Json::Array);
            }
            if !obj.is_ordinary() {
                return Err(mismatch("a JSON value", obj.kind_name()));
            }
            let mut map = Map::new();
            for (key, slot) in obj.enumerable_properties() {
                if let Some(v) = slot.value() {
                    map.insert(key, native_to_json(v)?);
                }
            }
            Ok(Json::Object(map))
        }
    }
}

/// Native view of plain JSON, unwrapping tagged maps.
fn json_to_native(wire: &Json) -> Value {
    match wire {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Bool(*b),
        Json::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
        Json::String(s) => Value::String(s.clone()),
        Json::Array(items) => Value::Object(ObjectRef::new_array(items.iter().map(json_to_native).collect())),
        Json::Object(fields) => {
            let fields = match fields.get(TOKEN_MAP).and_then(Json::as_object) {
                Some(inner) if fields.len() == 1 => inner,
                _ => fields,
            };
            let obj = ObjectRef::new_ordinary(None);
            for (key, item) in fields {
                obj.set_data(key.clone(), json_to_native(item));
            }
            Value::Object(obj)
        }
    }
}
