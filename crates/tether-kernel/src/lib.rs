//! Tether kernel - the object bridge between a host process and native modules
//!
//! The kernel loads packages (a tarball plus a `.tether.json` type
//! manifest), instantiates their native modules, and lets a host runtime
//! create objects, read and write properties, and call methods through a
//! line-delimited JSON protocol.
//!
//! # Architecture
//!
//! ```text
//!   host stdin/stdout
//!         |
//!   HostLoop / Channel      (host.rs)      framing, nesting rules
//!         |
//!   Kernel::dispatch        (kernel.rs)    one handler per request
//!     |        |        |
//!   catalog  objects  serialize            types, handles, wire values
//!         |
//!   overrides               (overrides.rs) host-implemented members
//!         |
//!   tether-engine                          the native object model
//! ```

pub mod api;
pub mod assembly;
pub mod catalog;
pub mod config;
pub mod error;
pub mod host;
pub mod kernel;
pub mod loader;
pub mod objects;
pub mod overrides;
pub mod serialize;

pub use api::{Callback, ObjRef, Override, Request};
pub use assembly::{Assembly, TypeDef, TypeReference};
pub use catalog::TypeCatalog;
pub use config::KernelOptions;
pub use error::{KernelError, KernelResult};
pub use host::{Channel, HostLoop, GREETING};
pub use kernel::{CallbackChannel, DetachedChannel, Kernel};
pub use loader::{ArchiveExtractor, ModuleLoader, TarballExtractor};
pub use objects::ObjectTable;
pub use serialize::Serializer;
