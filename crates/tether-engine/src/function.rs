//! Native functions

use std::fmt;
use std::rc::Rc;

use crate::error::EngineResult;
use crate::interp::Interp;
use crate::value::Value;

/// Signature of a native function body: interpreter, `this`, arguments.
pub type NativeFn = dyn Fn(&mut Interp<'_>, &Value, &[Value]) -> EngineResult<Value>;

/// A named, shareable native function.
#[derive(Clone)]
pub struct Function {
    name: Rc<str>,
    body: Rc<NativeFn>,
}

impl Function {
    /// Wrap a closure as a function named `name`.
    pub fn new<F>(name: &str, body: F) -> Self
    where
        F: Fn(&mut Interp<'_>, &Value, &[Value]) -> EngineResult<Value> + 'static,
    {
        Self {
            name: Rc::from(name),
            body: Rc::new(body),
        }
    }

    /// Function name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Call the body directly. Prefer [`Interp::call`], which tracks depth.
    pub fn invoke(&self, interp: &mut Interp<'_>, this: &Value, args: &[Value]) -> EngineResult<Value> {
        (self.body)(interp, this, args)
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Function({})", self.name)
    }
}

/// Positional argument or `undefined`.
pub fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or_default()
}
