//! Native modules
//!
//! A [`NativeModule`] is a named, versioned bundle of classes and values.
//! Instantiating it runs its initializer against a fresh [`Namespace`] and
//! yields the module's *closure*: an object whose members are the exported
//! classes, nested by the dotted path of their fully-qualified names.
//!
//! ```ignore
//! let module = NativeModule::new("calc", "1.0.0", |ns| {
//!     ns.class(&ClassBuilder::new("calc.Adder").build());
//!     Ok(())
//! });
//! let mut registry = ModuleRegistry::new();
//! registry.register(module);
//! ```

use std::fmt;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::class::Class;
use crate::error::EngineResult;
use crate::object::{ObjectRef, Property};
use crate::value::Value;

// ============================================================================
// Namespace
// ============================================================================

/// Export surface handed to a module initializer.
pub struct Namespace {
    prefix: String,
    root: ObjectRef,
}

impl Namespace {
    /// Empty namespace for module `name`.
    pub fn new(name: &str) -> Self {
        Self {
            prefix: format!("{}.", name),
            root: ObjectRef::new_ordinary(None),
        }
    }

    /// Export a class at the path given by its fqn, relative to the module.
    pub fn class(&mut self, class: &Class) -> &mut Self {
        let fqn = class.fqn();
        let relative = fqn.strip_prefix(&self.prefix).unwrap_or(&fqn).to_string();
        self.export(&relative, Value::from(class.clone()));
        self
    }

    /// Export a value at a dotted path relative to the module.
    pub fn value(&mut self, path: &str, value: Value) -> &mut Self {
        self.export(path, value);
        self
    }

    fn export(&mut self, path: &str, value: Value) {
        let mut segments: Vec<&str> = path.split('.').collect();
        let leaf = segments.pop().unwrap_or(path);
        let mut scope = self.root.clone();
        for segment in segments {
            scope = match scope.get_data(segment) {
                Some(Value::Object(inner)) => inner,
                _ => {
                    let inner = ObjectRef::new_ordinary(None);
                    scope.define(segment, Property::data(Value::Object(inner.clone())));
                    inner
                }
            };
        }
        scope.define(leaf, Property::data(value));
    }

    /// The module closure.
    pub fn into_object(self) -> ObjectRef {
        self.root
    }
}

/// Resolve a dotted path against a module closure.
pub fn lookup_path(closure: &ObjectRef, path: &str) -> Option<Value> {
    let mut current = Value::Object(closure.clone());
    for segment in path.split('.') {
        current = current.as_object()?.get_data(segment)?;
    }
    Some(current)
}

// ============================================================================
// NativeModule
// ============================================================================

type ModuleInit = dyn Fn(&mut Namespace) -> EngineResult<()>;

/// A loadable module.
#[derive(Clone)]
pub struct NativeModule {
    name: String,
    version: String,
    init: Rc<ModuleInit>,
}

impl NativeModule {
    /// Create a module.
    ///
    /// # Arguments
    /// * `name` - Module name, also the fqn prefix of its types
    /// * `version` - Semantic version (e.g., "1.0.0")
    /// * `init` - Runs once per instantiation and fills the namespace
    pub fn new<F>(name: impl Into<String>, version: impl Into<String>, init: F) -> Self
    where
        F: Fn(&mut Namespace) -> EngineResult<()> + 'static,
    {
        Self {
            name: name.into(),
            version: version.into(),
            init: Rc::new(init),
        }
    }

    /// Get module name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get module version
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Run the initializer and return the closure object.
    pub fn instantiate(&self) -> EngineResult<ObjectRef> {
        let mut namespace = Namespace::new(&self.name);
        (self.init)(&mut namespace)?;
        Ok(namespace.into_object())
    }
}

impl fmt::Debug for NativeModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeModule")
            .field("name", &self.name)
            .field("version", &self.version)
            .finish()
    }
}

// ============================================================================
// ModuleRegistry
// ============================================================================

/// Modules available for loading, keyed by name.
#[derive(Debug, Default)]
pub struct ModuleRegistry {
    modules: FxHashMap<String, NativeModule>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a module, replacing any previous one with the same name.
    pub fn register(&mut self, module: NativeModule) {
        self.modules.insert(module.name.clone(), module);
    }

    /// Look up a module by name.
    pub fn get(&self, name: &str) -> Option<&NativeModule> {
        self.modules.get(name)
    }

    /// Registered module names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.modules.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}
