//! Interpreter context
//!
//! [`Interp`] is the handle native code uses to operate on values: property
//! reads that run getters, writes that run setters, calls with a depth
//! guard, construction through class chains, and the job queue.
//!
//! The embedding application implements [`Host`]. Besides owning the job
//! queue, the host answers *traps*: requests raised by objects whose
//! members have been redirected out of the engine (see [`Trap`]).
//!
//! ## Trap kinds
//!
//! - `Get` - a redirected property was read
//! - `Set(value)` - a redirected property was written
//! - `Invoke(args)` - a redirected method was called

use std::any::Any;
use std::rc::Rc;

use crate::class::Class;
use crate::error::{EngineResult, Exception};
use crate::function::Function;
use crate::object::{ObjectRef, Property};
use crate::promise::{Job, JobQueue, Promise};
use crate::value::Value;

/// Maximum nesting of native calls before a `RangeError`.
pub const MAX_CALL_DEPTH: usize = 256;

// ============================================================================
// Traps
// ============================================================================

/// Operation being redirected to the host.
#[derive(Debug, Clone)]
pub enum TrapKind {
    Get,
    Set(Value),
    Invoke(Vec<Value>),
}

/// A redirected member access.
#[derive(Clone)]
pub struct Trap {
    /// `this` at the time of the access
    pub target: Value,
    /// Member name
    pub member: String,
    /// What happened
    pub kind: TrapKind,
    /// Opaque data attached by whoever installed the redirection
    pub binding: Rc<dyn Any>,
}

/// The embedding side of the interpreter.
pub trait Host {
    /// Queue of promise reactions and other deferred work.
    fn jobs(&mut self) -> &mut JobQueue;

    /// Answer a trap synchronously.
    fn trap(&mut self, trap: Trap) -> EngineResult<Value>;

    /// Answer a trap later; the returned promise settles when it is answered.
    fn trap_deferred(&mut self, trap: Trap) -> EngineResult<Promise>;
}

/// A host with a job queue and no trap support.
#[derive(Debug, Default)]
pub struct DetachedHost {
    jobs: JobQueue,
}

impl Host for DetachedHost {
    fn jobs(&mut self) -> &mut JobQueue {
        &mut self.jobs
    }

    fn trap(&mut self, trap: Trap) -> EngineResult<Value> {
        Err(Exception::type_error(format!(
            "'{}' is redirected but no host is attached",
            trap.member
        )))
    }

    fn trap_deferred(&mut self, trap: Trap) -> EngineResult<Promise> {
        Err(Exception::type_error(format!(
            "'{}' is redirected but no host is attached",
            trap.member
        )))
    }
}

// ============================================================================
// Interp
// ============================================================================

/// Execution context borrowed from a [`Host`].
pub struct Interp<'h> {
    host: &'h mut dyn Host,
    depth: usize,
}

impl<'h> Interp<'h> {
    pub fn new(host: &'h mut dyn Host) -> Self {
        Self { host, depth: 0 }
    }

    /// The host this interpreter runs on.
    pub fn host(&mut self) -> &mut dyn Host {
        &mut *self.host
    }

    /// Queue a job.
    pub fn enqueue(&mut self, job: Job) {
        self.host.jobs().push(job);
    }

    /// Run queued jobs until the queue is empty, including jobs queued by jobs.
    pub fn run_jobs(&mut self) {
        while let Some(job) = self.host.jobs().pop() {
            job(self);
        }
    }

    // ------------------------------------------------------------------------
    // Properties
    // ------------------------------------------------------------------------

    /// Read `target[key]`, running getters.
    pub fn get(&mut self, target: &Value, key: &str) -> EngineResult<Value> {
        let obj = match target {
            Value::Object(obj) => obj,
            Value::Undefined | Value::Null => {
                return Err(Exception::type_error(format!(
                    "cannot read properties of {} (reading '{}')",
                    target.type_name(),
                    key
                )))
            }
            Value::String(s) if key == "length" => return Ok(Value::Number(s.chars().count() as f64)),
            _ => return Ok(Value::Undefined),
        };

        if let Some(items) = obj.array_items() {
            if key == "length" {
                return Ok(Value::Number(items.len() as f64));
            }
            if let Ok(index) = key.parse::<usize>() {
                return Ok(items.get(index).cloned().unwrap_or_default());
            }
        }

        match obj.find_property(key) {
            Some((_, Property::Data { value, .. })) => Ok(value),
            Some((_, Property::Accessor { get: Some(getter), .. })) => {
                self.call_function(&getter, target, &[])
            }
            Some((_, Property::Accessor { get: None, .. })) | None => Ok(Value::Undefined),
        }
    }

    /// Write `target[key] = value`, running setters.
    pub fn set(&mut self, target: &Value, key: &str, value: Value) -> EngineResult<()> {
        let obj = match target {
            Value::Object(obj) => obj,
            _ => {
                return Err(Exception::type_error(format!(
                    "cannot set property '{}' on {}",
                    key,
                    target.type_name()
                )))
            }
        };

        if obj.is_array() {
            if let Ok(index) = key.parse::<usize>() {
                obj.set_array_item(index, value);
                return Ok(());
            }
        }

        match obj.find_property(key) {
            Some((_, Property::Accessor { set: Some(setter), .. })) => {
                self.call_function(&setter, target, &[value])?;
                Ok(())
            }
            Some((_, Property::Accessor { set: None, .. })) => Err(Exception::type_error(format!(
                "cannot set property '{}' which has only a getter",
                key
            ))),
            Some((_, Property::Data { writable: false, .. })) => Err(Exception::type_error(format!(
                "cannot assign to read only property '{}'",
                key
            ))),
            _ => {
                obj.set_data(key, value);
                Ok(())
            }
        }
    }

    // ------------------------------------------------------------------------
    // Calls
    // ------------------------------------------------------------------------

    /// Call a function value.
    pub fn call(&mut self, callee: &Value, this: &Value, args: &[Value]) -> EngineResult<Value> {
        let Some(obj) = callee.as_object() else {
            return Err(Exception::type_error(format!("{} is not a function", callee.type_name())));
        };
        if let Some(function) = obj.as_function() {
            return self.call_function(&function, this, args);
        }
        if let Some(class) = obj.as_class() {
            return Err(Exception::type_error(format!(
                "class constructor {} cannot be invoked without 'new'",
                class.fqn
            )));
        }
        Err(Exception::type_error(format!("{} is not a function", obj.kind_name())))
    }

    /// Call a native function with depth tracking.
    pub fn call_function(&mut self, function: &Function, this: &Value, args: &[Value]) -> EngineResult<Value> {
        if self.depth >= MAX_CALL_DEPTH {
            return Err(Exception::range_error("maximum call stack size exceeded"));
        }
        self.depth += 1;
        let result = function.invoke(self, this, args);
        self.depth -= 1;
        result
    }

    /// Look up `name` on `target` and call it with `target` as `this`.
    pub fn call_method(&mut self, target: &Value, name: &str, args: &[Value]) -> EngineResult<Value> {
        let callee = self.get(target, name)?;
        if callee.is_nullish() {
            return Err(Exception::type_error(format!(
                "{} has no method '{}'",
                target.type_name(),
                name
            )));
        }
        self.call(&callee, target, args)
    }

    // ------------------------------------------------------------------------
    // Construction
    // ------------------------------------------------------------------------

    /// `new Class(...args)`.
    pub fn construct(&mut self, class: &Class, args: &[Value]) -> EngineResult<ObjectRef> {
        let instance = ObjectRef::new_ordinary(Some(class.prototype()));
        let this = Value::Object(instance.clone());
        self.run_constructor(class.object(), &this, args)?;
        Ok(instance)
    }

    /// `new callee(...args)` where `callee` must be a class object.
    pub fn construct_value(&mut self, callee: &Value, args: &[Value]) -> EngineResult<ObjectRef> {
        let class = callee
            .as_object()
            .and_then(|obj| Class::from_object(obj.clone()))
            .ok_or_else(|| Exception::type_error(format!("{} is not a constructor", callee.type_name())))?;
        self.construct(&class, args)
    }

    /// `super(...args)`: run `base`'s constructor chain on `this`.
    pub fn super_construct(&mut self, base: &Class, this: &Value, args: &[Value]) -> EngineResult<()> {
        self.run_constructor(base.object(), this, args)
    }

    fn run_constructor(&mut self, class_obj: &ObjectRef, this: &Value, args: &[Value]) -> EngineResult<()> {
        let data = class_obj
            .as_class()
            .ok_or_else(|| Exception::type_error("not a constructor"))?;
        match (data.ctor, data.base) {
            (Some(ctor), _) => {
                self.call_function(&ctor, this, args)?;
                Ok(())
            }
            // Implicit constructor forwards to the base class.
            (None, Some(base)) => self.run_constructor(&base, this, args),
            (None, None) => Ok(()),
        }
    }
}
