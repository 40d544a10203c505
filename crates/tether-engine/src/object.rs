//! Heap objects
//!
//! Objects are reference-counted and shared through [`ObjectRef`]. Each one
//! has a kind, an optional prototype, and an insertion-ordered list of own
//! properties. Property lookup walks the prototype chain; accessor
//! properties are *described* here and invoked by the interpreter.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::function::Function;
use crate::promise::Promise;
use crate::value::Value;

// ============================================================================
// Properties
// ============================================================================

/// A property descriptor.
#[derive(Clone, Debug)]
pub enum Property {
    /// Plain value slot
    Data {
        value: Value,
        writable: bool,
        enumerable: bool,
    },
    /// Getter/setter pair
    Accessor {
        get: Option<Function>,
        set: Option<Function>,
        enumerable: bool,
    },
}

impl Property {
    /// Writable, enumerable data property.
    pub fn data(value: Value) -> Self {
        Property::Data {
            value,
            writable: true,
            enumerable: true,
        }
    }

    /// Writable, non-enumerable data property (methods, hidden slots).
    pub fn hidden(value: Value) -> Self {
        Property::Data {
            value,
            writable: true,
            enumerable: false,
        }
    }

    /// Whether the property shows up in enumeration.
    pub fn is_enumerable(&self) -> bool {
        match self {
            Property::Data { enumerable, .. } | Property::Accessor { enumerable, .. } => *enumerable,
        }
    }

    /// Whether this is a getter/setter pair.
    pub fn is_accessor(&self) -> bool {
        matches!(self, Property::Accessor { .. })
    }

    /// Data value, if this is a data property.
    pub fn value(&self) -> Option<&Value> {
        match self {
            Property::Data { value, .. } => Some(value),
            Property::Accessor { .. } => None,
        }
    }

    /// Same descriptor with a different enumerability.
    pub fn with_enumerable(self, flag: bool) -> Self {
        match self {
            Property::Data { value, writable, .. } => Property::Data {
                value,
                writable,
                enumerable: flag,
            },
            Property::Accessor { get, set, .. } => Property::Accessor {
                get,
                set,
                enumerable: flag,
            },
        }
    }
}

// ============================================================================
// Object kinds
// ============================================================================

/// Constructor-side data of a class object.
#[derive(Clone, Debug)]
pub struct ClassData {
    /// Fully-qualified name the class was registered under
    pub fqn: Rc<str>,
    /// Constructor body, if the class declares one
    pub ctor: Option<Function>,
    /// Shared prototype of instances
    pub prototype: ObjectRef,
    /// Superclass object
    pub base: Option<ObjectRef>,
}

/// What an object is, beyond its properties.
#[derive(Clone, Debug)]
pub enum ObjectKind {
    /// Plain keyed object
    Ordinary,
    /// Dense array
    Array(Vec<Value>),
    /// Native callable
    Function(Function),
    /// Class (constructor) object
    Class(ClassData),
    /// Deferred result
    Promise(Promise),
}

struct ObjectData {
    kind: ObjectKind,
    proto: Option<ObjectRef>,
    props: Vec<(String, Property)>,
    class_tag: Option<Rc<str>>,
}

// ============================================================================
// ObjectRef
// ============================================================================

/// Shared handle to a heap object. Clones alias the same object.
#[derive(Clone)]
pub struct ObjectRef(Rc<RefCell<ObjectData>>);

impl ObjectRef {
    fn with_kind(kind: ObjectKind, proto: Option<ObjectRef>) -> Self {
        ObjectRef(Rc::new(RefCell::new(ObjectData {
            kind,
            proto,
            props: Vec::new(),
            class_tag: None,
        })))
    }

    /// New plain object with the given prototype.
    pub fn new_ordinary(proto: Option<ObjectRef>) -> Self {
        Self::with_kind(ObjectKind::Ordinary, proto)
    }

    /// New array holding `items`.
    pub fn new_array(items: Vec<Value>) -> Self {
        Self::with_kind(ObjectKind::Array(items), None)
    }

    /// New function object.
    pub fn new_function(function: Function) -> Self {
        Self::with_kind(ObjectKind::Function(function), None)
    }

    /// New promise object.
    pub fn new_promise(promise: Promise) -> Self {
        Self::with_kind(ObjectKind::Promise(promise), None)
    }

    pub(crate) fn new_class(data: ClassData) -> Self {
        let proto = data.base.clone();
        Self::with_kind(ObjectKind::Class(data), proto)
    }

    /// Identity comparison.
    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Stable identity key for the lifetime of the object.
    pub fn identity(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }

    /// Kind name for diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self.0.borrow().kind {
            ObjectKind::Ordinary => "object",
            ObjectKind::Array(_) => "array",
            ObjectKind::Function(_) => "function",
            ObjectKind::Class(_) => "class",
            ObjectKind::Promise(_) => "promise",
        }
    }

    /// Plain keyed object?
    pub fn is_ordinary(&self) -> bool {
        matches!(self.0.borrow().kind, ObjectKind::Ordinary)
    }

    /// Array?
    pub fn is_array(&self) -> bool {
        matches!(self.0.borrow().kind, ObjectKind::Array(_))
    }

    /// Function or class?
    pub fn is_callable(&self) -> bool {
        matches!(
            self.0.borrow().kind,
            ObjectKind::Function(_) | ObjectKind::Class(_)
        )
    }

    /// Function payload.
    pub fn as_function(&self) -> Option<Function> {
        match &self.0.borrow().kind {
            ObjectKind::Function(f) => Some(f.clone()),
            _ => None,
        }
    }

    /// Class payload.
    pub fn as_class(&self) -> Option<ClassData> {
        match &self.0.borrow().kind {
            ObjectKind::Class(c) => Some(c.clone()),
            _ => None,
        }
    }

    /// Promise payload.
    pub fn as_promise(&self) -> Option<Promise> {
        match &self.0.borrow().kind {
            ObjectKind::Promise(p) => Some(p.clone()),
            _ => None,
        }
    }

    /// Snapshot of the array elements.
    pub fn array_items(&self) -> Option<Vec<Value>> {
        match &self.0.borrow().kind {
            ObjectKind::Array(items) => Some(items.clone()),
            _ => None,
        }
    }

    /// Replace an array element, growing with `undefined` as needed.
    pub fn set_array_item(&self, index: usize, value: Value) -> bool {
        match &mut self.0.borrow_mut().kind {
            ObjectKind::Array(items) => {
                if index >= items.len() {
                    items.resize(index + 1, Value::Undefined);
                }
                items[index] = value;
                true
            }
            _ => false,
        }
    }

    /// Append an array element.
    pub fn push_item(&self, value: Value) -> bool {
        match &mut self.0.borrow_mut().kind {
            ObjectKind::Array(items) => {
                items.push(value);
                true
            }
            _ => false,
        }
    }

    /// Prototype.
    pub fn proto(&self) -> Option<ObjectRef> {
        self.0.borrow().proto.clone()
    }

    /// Replace the prototype.
    pub fn set_proto(&self, proto: Option<ObjectRef>) {
        self.0.borrow_mut().proto = proto;
    }

    /// Class name recorded on a prototype or class object.
    pub fn class_tag(&self) -> Option<Rc<str>> {
        self.0.borrow().class_tag.clone()
    }

    pub(crate) fn set_class_tag(&self, tag: Rc<str>) {
        self.0.borrow_mut().class_tag = Some(tag);
    }

    /// Own property descriptor.
    pub fn own_property(&self, key: &str) -> Option<Property> {
        self.0
            .borrow()
            .props
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, p)| p.clone())
    }

    /// Has an own property named `key`?
    pub fn has_own(&self, key: &str) -> bool {
        self.0.borrow().props.iter().any(|(k, _)| k == key)
    }

    /// Define or replace an own property, keeping its original position.
    pub fn define(&self, key: impl Into<String>, property: Property) {
        let key = key.into();
        let mut data = self.0.borrow_mut();
        match data.props.iter().position(|(k, _)| *k == key) {
            Some(index) => data.props[index].1 = property,
            None => data.props.push((key, property)),
        }
    }

    /// Remove an own property.
    pub fn remove(&self, key: &str) -> Option<Property> {
        let mut data = self.0.borrow_mut();
        let index = data.props.iter().position(|(k, _)| k == key)?;
        Some(data.props.remove(index).1)
    }

    /// Own keys in insertion order.
    pub fn own_keys(&self) -> Vec<String> {
        self.0.borrow().props.iter().map(|(k, _)| k.clone()).collect()
    }

    /// Own enumerable properties in insertion order.
    pub fn enumerable_properties(&self) -> Vec<(String, Property)> {
        self.0
            .borrow()
            .props
            .iter()
            .filter(|(_, p)| p.is_enumerable())
            .cloned()
            .collect()
    }

    /// Find a property along the prototype chain, returning the holder.
    pub fn find_property(&self, key: &str) -> Option<(ObjectRef, Property)> {
        let mut current = Some(self.clone());
        while let Some(obj) = current {
            if let Some(prop) = obj.own_property(key) {
                return Some((obj, prop));
            }
            current = obj.proto();
        }
        None
    }

    /// Data value along the prototype chain. Accessors are not invoked.
    pub fn get_data(&self, key: &str) -> Option<Value> {
        self.find_property(key)
            .and_then(|(_, prop)| prop.value().cloned())
    }

    /// Write an own data property, creating it as enumerable if missing.
    pub fn set_data(&self, key: impl Into<String>, value: Value) {
        let key = key.into();
        let mut data = self.0.borrow_mut();
        match data.props.iter().position(|(k, _)| *k == key) {
            Some(index) => match &mut data.props[index].1 {
                Property::Data { value: slot, .. } => *slot = value,
                other => *other = Property::data(value),
            },
            None => data.props.push((key, Property::data(value))),
        }
    }

    /// Walk this object and its prototypes.
    pub fn chain(&self) -> Vec<ObjectRef> {
        let mut out = Vec::new();
        let mut current = Some(self.clone());
        while let Some(obj) = current {
            current = obj.proto();
            out.push(obj);
        }
        out
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Prototypes and classes form cycles.
        write!(f, "ObjectRef({} @ {:#x})", self.kind_name(), self.identity())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_define_keeps_insertion_order() {
        let obj = ObjectRef::new_ordinary(None);
        obj.set_data("b", Value::from(1));
        obj.set_data("a", Value::from(2));
        obj.set_data("b", Value::from(3));
        assert_eq!(obj.own_keys(), vec!["b".to_string(), "a".to_string()]);
        assert_eq!(obj.get_data("b"), Some(Value::from(3)));
    }

    #[test]
    fn test_find_property_walks_prototypes() {
        let proto = ObjectRef::new_ordinary(None);
        proto.define("greeting", Property::hidden(Value::from("hi")));
        let obj = ObjectRef::new_ordinary(Some(proto.clone()));

        let (holder, prop) = obj.find_property("greeting").expect("inherited");
        assert!(holder.ptr_eq(&proto));
        assert!(!prop.is_enumerable());
        assert!(obj.enumerable_properties().is_empty());
        assert_eq!(obj.chain().len(), 2);
    }

    #[test]
    fn test_array_items() {
        let arr = ObjectRef::new_array(vec![Value::from(1)]);
        assert!(arr.set_array_item(2, Value::from(3)));
        let items = arr.array_items().unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[1], Value::Undefined);
        assert!(!ObjectRef::new_ordinary(None).push_item(Value::Null));
    }

    #[test]
    fn test_remove() {
        let obj = ObjectRef::new_ordinary(None);
        obj.set_data("x", Value::Null);
        assert!(obj.remove("x").is_some());
        assert!(!obj.has_own("x"));
        assert!(obj.remove("x").is_none());
    }
}
