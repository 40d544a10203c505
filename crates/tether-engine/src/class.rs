//! Class construction
//!
//! Classes follow the prototype model: a class object carries its
//! constructor and static members, and instances inherit from the class's
//! shared prototype. A derived class's prototype inherits from the base
//! prototype, and the derived class object inherits from the base class
//! object so static members are inherited too.

use std::rc::Rc;

use crate::error::EngineResult;
use crate::function::Function;
use crate::interp::Interp;
use crate::object::{ClassData, ObjectRef, Property};
use crate::value::Value;

/// Handle to a class object.
#[derive(Clone, Debug)]
pub struct Class(ObjectRef);

impl Class {
    /// View an object as a class, if it is one.
    pub fn from_object(obj: ObjectRef) -> Option<Class> {
        obj.as_class().map(|_| Class(obj))
    }

    /// Underlying class object.
    pub fn object(&self) -> &ObjectRef {
        &self.0
    }

    /// Registered fully-qualified name.
    pub fn fqn(&self) -> String {
        self.0
            .class_tag()
            .map(|tag| tag.to_string())
            .unwrap_or_default()
    }

    /// Last segment of the fqn.
    pub fn name(&self) -> String {
        let fqn = self.fqn();
        fqn.rsplit('.').next().unwrap_or_default().to_string()
    }

    /// Prototype shared by instances.
    pub fn prototype(&self) -> ObjectRef {
        match self.0.as_class() {
            Some(data) => data.prototype,
            None => ObjectRef::new_ordinary(None),
        }
    }

    /// Superclass.
    pub fn base(&self) -> Option<Class> {
        self.0
            .as_class()
            .and_then(|data| data.base)
            .and_then(Class::from_object)
    }

    /// Whether `obj` has this class's prototype on its chain.
    pub fn is_instance(&self, obj: &ObjectRef) -> bool {
        let prototype = self.prototype();
        obj.chain().iter().skip(1).any(|p| p.ptr_eq(&prototype))
    }
}

impl From<Class> for Value {
    fn from(class: Class) -> Self {
        Value::Object(class.0)
    }
}

/// Fluent builder for [`Class`].
pub struct ClassBuilder {
    fqn: Rc<str>,
    base: Option<Class>,
    ctor: Option<Function>,
    instance: Vec<(String, Property)>,
    statics: Vec<(String, Property)>,
}

impl ClassBuilder {
    pub fn new(fqn: &str) -> Self {
        Self {
            fqn: Rc::from(fqn),
            base: None,
            ctor: None,
            instance: Vec::new(),
            statics: Vec::new(),
        }
    }

    /// Inherit from `base`.
    pub fn extends(mut self, base: &Class) -> Self {
        self.base = Some(base.clone());
        self
    }

    /// Constructor body. Call [`Interp::super_construct`] to run the base
    /// constructor; without a body the base constructor runs implicitly.
    pub fn constructor<F>(mut self, body: F) -> Self
    where
        F: Fn(&mut Interp<'_>, &Value, &[Value]) -> EngineResult<()> + 'static,
    {
        let name = self.fqn.to_string();
        self.ctor = Some(Function::new(&name, move |interp, this, args| {
            body(interp, this, args)?;
            Ok(Value::Undefined)
        }));
        self
    }

    /// Instance method.
    pub fn method<F>(mut self, name: &str, body: F) -> Self
    where
        F: Fn(&mut Interp<'_>, &Value, &[Value]) -> EngineResult<Value> + 'static,
    {
        self.instance.push((name.to_string(), method_property(name, body)));
        self
    }

    /// Read-only instance accessor.
    pub fn getter<G>(mut self, name: &str, get: G) -> Self
    where
        G: Fn(&mut Interp<'_>, &Value) -> EngineResult<Value> + 'static,
    {
        self.instance.push((name.to_string(), accessor_property(name, get, None)));
        self
    }

    /// Read-write instance accessor.
    pub fn accessor<G, S>(mut self, name: &str, get: G, set: S) -> Self
    where
        G: Fn(&mut Interp<'_>, &Value) -> EngineResult<Value> + 'static,
        S: Fn(&mut Interp<'_>, &Value, Value) -> EngineResult<()> + 'static,
    {
        let set = setter_function(name, set);
        self.instance.push((name.to_string(), accessor_property(name, get, Some(set))));
        self
    }

    /// Static method.
    pub fn static_method<F>(mut self, name: &str, body: F) -> Self
    where
        F: Fn(&mut Interp<'_>, &Value, &[Value]) -> EngineResult<Value> + 'static,
    {
        self.statics.push((name.to_string(), method_property(name, body)));
        self
    }

    /// Static data property.
    pub fn static_value(mut self, name: &str, value: Value, writable: bool) -> Self {
        self.statics.push((
            name.to_string(),
            Property::Data {
                value,
                writable,
                enumerable: true,
            },
        ));
        self
    }

    /// Static accessor.
    pub fn static_accessor<G, S>(mut self, name: &str, get: G, set: S) -> Self
    where
        G: Fn(&mut Interp<'_>, &Value) -> EngineResult<Value> + 'static,
        S: Fn(&mut Interp<'_>, &Value, Value) -> EngineResult<()> + 'static,
    {
        let set = setter_function(name, set);
        self.statics.push((name.to_string(), accessor_property(name, get, Some(set))));
        self
    }

    pub fn build(self) -> Class {
        let prototype = ObjectRef::new_ordinary(self.base.as_ref().map(Class::prototype));
        prototype.set_class_tag(self.fqn.clone());
        for (name, prop) in self.instance {
            prototype.define(name, prop);
        }

        let object = ObjectRef::new_class(ClassData {
            fqn: self.fqn.clone(),
            ctor: self.ctor,
            prototype: prototype.clone(),
            base: self.base.map(|b| b.0),
        });
        object.set_class_tag(self.fqn);
        for (name, prop) in self.statics {
            object.define(name, prop);
        }
        prototype.define("constructor", Property::hidden(Value::Object(object.clone())));
        Class(object)
    }
}

fn method_property<F>(name: &str, body: F) -> Property
where
    F: Fn(&mut Interp<'_>, &Value, &[Value]) -> EngineResult<Value> + 'static,
{
    Property::hidden(Value::Object(ObjectRef::new_function(Function::new(name, body))))
}

fn accessor_property<G>(name: &str, get: G, set: Option<Function>) -> Property
where
    G: Fn(&mut Interp<'_>, &Value) -> EngineResult<Value> + 'static,
{
    Property::Accessor {
        get: Some(Function::new(name, move |interp, this, _| get(interp, this))),
        set,
        enumerable: false,
    }
}

fn setter_function<S>(name: &str, set: S) -> Function
where
    S: Fn(&mut Interp<'_>, &Value, Value) -> EngineResult<()> + 'static,
{
    Function::new(name, move |interp, this, args| {
        set(interp, this, args.first().cloned().unwrap_or_default())?;
        Ok(Value::Undefined)
    })
}
