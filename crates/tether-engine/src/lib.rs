//! Tether engine - the dynamically-typed object model behind the kernel
//!
//! This crate provides the values, objects, classes, promises and native
//! modules that the tether kernel exposes to a host process.
//!
//! # Overview
//!
//! - [`Value`] - primitives, dates and object handles
//! - [`ObjectRef`] - shared objects with data/accessor properties and prototypes
//! - [`ClassBuilder`] / [`Class`] - prototype-based classes with statics
//! - [`Promise`] / [`JobQueue`] - deferred results settled through jobs
//! - [`Interp`] / [`Host`] - execution context and the embedding hooks
//! - [`NativeModule`] / [`ModuleRegistry`] - loadable module bundles
//!
//! The engine is single-threaded: handles are `Rc`-based and not `Send`.

pub mod class;
pub mod error;
pub mod function;
pub mod interp;
pub mod module;
pub mod object;
pub mod promise;
pub mod value;

pub use class::{Class, ClassBuilder};
pub use error::{EngineResult, Exception};
pub use function::{arg, Function, NativeFn};
pub use interp::{DetachedHost, Host, Interp, Trap, TrapKind};
pub use module::{lookup_path, ModuleRegistry, Namespace, NativeModule};
pub use object::{ObjectKind, ObjectRef, Property};
pub use promise::{Job, JobQueue, Promise, PromiseState};
pub use value::Value;
