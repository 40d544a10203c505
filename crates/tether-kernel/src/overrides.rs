//! Override engine
//!
//! Installs host-implemented replacements for members of a native object.
//! An overridden method becomes a stub that raises a trap; an overridden
//! property becomes an accessor whose getter and setter raise traps. The
//! member's previous descriptor is parked under a hidden super slot so the
//! host can still reach the native implementation while its own callback
//! for that member is running.

use std::any::Any;
use std::rc::Rc;

use rustc_hash::FxHashSet;
use tether_engine::{EngineResult, Exception, Function, ObjectRef, Promise, Property as Slot, Trap, TrapKind, Value};

use crate::api::{Callback, CallbackRequest, GetCallback, InvokeCallback, ObjRef, Override, SetCallback};
use crate::assembly::{Method, OptionalValue, Property};
use crate::catalog::Member;
use crate::error::{KernelError, KernelResult};
use crate::kernel::{super_key, CallbackChannel, Kernel, PendingCallback};

/// Member an override stands in for.
#[derive(Debug, Clone)]
enum OverriddenMember {
    Method(Method),
    Property(Property),
}

/// Data attached to every trap raised by an override.
#[derive(Debug)]
struct OverrideBinding {
    objref: ObjRef,
    cookie: Option<String>,
    member: OverriddenMember,
}

impl Kernel {
    /// Install `overrides` on a freshly registered object.
    pub(crate) fn apply_overrides(
        &mut self,
        objref: &ObjRef,
        instance: &ObjectRef,
        overrides: &[Override],
    ) -> KernelResult<()> {
        let entry = self.objects.resolve(objref)?;
        let (fqn, interfaces) = (entry.fqn.clone(), entry.interfaces.clone());

        let mut methods = FxHashSet::default();
        let mut properties = FxHashSet::default();
        let mut planned = Vec::with_capacity(overrides.len());

        for ov in overrides {
            let member = match (&ov.method, &ov.property) {
                (Some(name), None) => {
                    if properties.contains(name) {
                        return Err(conflict(name, "property", "method"));
                    }
                    if !methods.insert(name.clone()) {
                        return Err(KernelError::DuplicateOverride(name.clone()));
                    }
                    match self.catalog.lookup_member(name, &fqn, &interfaces)? {
                        Member::Method(method) => OverriddenMember::Method(method.clone()),
                        Member::Property(_) => return Err(conflict(name, "property", "method")),
                        Member::NotFound if instance.find_property(name).is_some() => {
                            OverriddenMember::Method(Method::untyped(name))
                        }
                        Member::NotFound => {
                            tracing::debug!(fqn = %fqn, method = %name, "skipping override of unknown member");
                            continue;
                        }
                    }
                }
                (None, Some(name)) => {
                    if methods.contains(name) {
                        return Err(conflict(name, "method", "property"));
                    }
                    if !properties.insert(name.clone()) {
                        return Err(KernelError::DuplicateOverride(name.clone()));
                    }
                    match self.catalog.lookup_member(name, &fqn, &interfaces)? {
                        Member::Property(property) => OverriddenMember::Property(property.clone()),
                        Member::Method(_) => return Err(conflict(name, "method", "property")),
                        Member::NotFound if instance.find_property(name).is_some() => {
                            OverriddenMember::Property(Property::untyped(name))
                        }
                        Member::NotFound => {
                            tracing::debug!(fqn = %fqn, property = %name, "skipping override of unknown member");
                            continue;
                        }
                    }
                }
                _ => {
                    return Err(KernelError::OverrideKindConflict(
                        "an override must name exactly one of 'method' or 'property'".to_string(),
                    ))
                }
            };
            planned.push(OverrideBinding {
                objref: objref.clone(),
                cookie: ov.cookie.clone(),
                member,
            });
        }

        for binding in planned {
            install(instance, binding);
        }
        Ok(())
    }

    /// Answer a synchronous trap by a callback round trip.
    pub(crate) fn sync_trap(&mut self, channel: &mut dyn CallbackChannel, trap: Trap) -> EngineResult<Value> {
        let binding = binding_of(&trap)?;
        let (request, returns) = self.callback_request(&binding, &trap).map_err(KernelError::into_exception)?;
        let callback = Callback {
            cbid: self.next_token("callback"),
            cookie: binding.cookie.clone(),
            request,
        };
        tracing::debug!(cbid = %callback.cbid, member = %trap.member, "sync callback");

        self.in_flight.push((binding.objref.ref_id.clone(), trap.member.clone()));
        let outcome = channel.round_trip(self, callback);
        self.in_flight.pop();

        let wire = outcome.map_err(KernelError::into_exception)?;
        self.serializer()
            .to_native(&wire, returns.as_ref())
            .map_err(KernelError::into_exception)
    }

    /// Queue an asynchronous trap for the host to poll.
    pub(crate) fn queue_trap(&mut self, trap: Trap) -> EngineResult<Promise> {
        let binding = binding_of(&trap)?;
        let (request, returns) = self.callback_request(&binding, &trap).map_err(KernelError::into_exception)?;
        let callback = Callback {
            cbid: self.next_token("callback"),
            cookie: binding.cookie.clone(),
            request,
        };
        tracing::debug!(cbid = %callback.cbid, member = %trap.member, "queued async callback");

        let promise = Promise::new();
        self.queued.push_back(PendingCallback {
            callback,
            returns,
            promise: promise.clone(),
        });
        Ok(promise)
    }

    fn callback_request(
        &mut self,
        binding: &OverrideBinding,
        trap: &Trap,
    ) -> KernelResult<(CallbackRequest, Option<OptionalValue>)> {
        let objref = binding.objref.clone();
        match (&binding.member, &trap.kind) {
            (OverriddenMember::Method(method), TrapKind::Invoke(args)) => {
                let args = self.args_to_wire(method, args)?;
                let request = CallbackRequest::Invoke(InvokeCallback {
                    objref,
                    method: method.name.clone(),
                    args,
                });
                Ok((request, method.returns.clone()))
            }
            (OverriddenMember::Property(property), TrapKind::Get) => {
                let request = CallbackRequest::Get(GetCallback {
                    objref,
                    property: property.name.clone(),
                });
                Ok((request, Some(property.declared())))
            }
            (OverriddenMember::Property(property), TrapKind::Set(value)) => {
                let value = self.serializer().to_wire(value, Some(&property.declared()))?;
                let request = CallbackRequest::Set(SetCallback {
                    objref,
                    property: property.name.clone(),
                    value,
                });
                Ok((request, None))
            }
            _ => Err(KernelError::TypeMismatch(format!(
                "access to '{}' does not match its override",
                trap.member
            ))),
        }
    }
}

fn conflict(name: &str, actual: &str, requested: &str) -> KernelError {
    KernelError::OverrideKindConflict(format!(
        "'{}' is overridden as a {} but is a {}",
        name, requested, actual
    ))
}

fn binding_of(trap: &Trap) -> EngineResult<Rc<OverrideBinding>> {
    trap.binding
        .clone()
        .downcast::<OverrideBinding>()
        .map_err(|_| Exception::type_error(format!("'{}' is redirected by an unknown party", trap.member)))
}

/// Replace the member on `instance`, keeping the old descriptor in the
/// super slot.
fn install(instance: &ObjectRef, binding: OverrideBinding) {
    let name = match &binding.member {
        OverriddenMember::Method(m) => m.name.clone(),
        OverriddenMember::Property(p) => p.name.clone(),
    };
    match instance.find_property(&name) {
        Some((_, previous)) => instance.define(super_key(&name), previous.with_enumerable(false)),
        None => instance.define(super_key(&name), Slot::hidden(Value::Undefined)),
    }

    let replacement = match &binding.member {
        OverriddenMember::Method(method) => {
            Slot::hidden(Value::Object(ObjectRef::new_function(method_stub(&name, method.is_async, binding))))
        }
        OverriddenMember::Property(_) => {
            let binding: Rc<dyn Any> = Rc::new(binding);
            Slot::Accessor {
                get: Some(property_getter(&name, binding.clone())),
                set: Some(property_setter(&name, binding)),
                enumerable: true,
            }
        }
    };
    instance.define(name, replacement);
}

fn method_stub(name: &str, is_async: bool, binding: OverrideBinding) -> Function {
    let binding: Rc<dyn Any> = Rc::new(binding);
    let member = name.to_string();
    Function::new(name, move |interp, this, args| {
        let trap = Trap {
            target: this.clone(),
            member: member.clone(),
            kind: TrapKind::Invoke(args.to_vec()),
            binding: binding.clone(),
        };
        if is_async {
            let promise = interp.host().trap_deferred(trap)?;
            Ok(Value::from(promise))
        } else {
            interp.host().trap(trap)
        }
    })
}

fn property_getter(name: &str, binding: Rc<dyn Any>) -> Function {
    let member = name.to_string();
    Function::new(name, move |interp, this, _args| {
        interp.host().trap(Trap {
            target: this.clone(),
            member: member.clone(),
            kind: TrapKind::Get,
            binding: binding.clone(),
        })
    })
}

fn property_setter(name: &str, binding: Rc<dyn Any>) -> Function {
    let member = name.to_string();
    Function::new(name, move |interp, this, args| {
        interp.host().trap(Trap {
            target: this.clone(),
            member: member.clone(),
            kind: TrapKind::Set(args.first().cloned().unwrap_or_default()),
            binding: binding.clone(),
        })?;
        Ok(Value::Undefined)
    })
}
