//! Object table
//!
//! Identity-preserving registry of objects the host can refer to. Each
//! native object gets exactly one token for as long as it is registered;
//! entries leave only through [`ObjectTable::release`].

use rustc_hash::FxHashMap;
use tether_engine::ObjectRef;

use crate::api::ObjRef;
use crate::catalog::TypeCatalog;
use crate::error::{KernelError, KernelResult};

/// First value of the token counter.
const FIRST_OBJECT_ID: u64 = 10000;

/// A registered object.
#[derive(Debug, Clone)]
pub struct ObjectEntry {
    pub instance: ObjectRef,
    pub fqn: String,
    pub interfaces: Vec<String>,
}

impl ObjectEntry {
    pub fn is_instance_of(&self, expected: &str, catalog: &TypeCatalog) -> bool {
        catalog.is_assignable(&self.fqn, expected)
            || self.interfaces.iter().any(|i| catalog.is_assignable(i, expected))
    }
}

#[derive(Debug)]
pub struct ObjectTable {
    entries: FxHashMap<String, ObjectEntry>,
    /// object identity -> token
    by_identity: FxHashMap<usize, String>,
    next_id: u64,
}

impl Default for ObjectTable {
    fn default() -> Self {
        Self {
            entries: FxHashMap::default(),
            by_identity: FxHashMap::default(),
            next_id: FIRST_OBJECT_ID,
        }
    }
}

impl ObjectTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `instance`, or return its existing reference with
    /// `interfaces` merged in.
    pub fn register(
        &mut self,
        instance: &ObjectRef,
        fqn: &str,
        interfaces: &[String],
        catalog: &TypeCatalog,
    ) -> ObjRef {
        if let Some(token) = self.by_identity.get(&instance.identity()) {
            if let Some(entry) = self.entries.get_mut(token) {
                for iface in interfaces {
                    if !entry.interfaces.contains(iface) {
                        entry.interfaces.push(iface.clone());
                    }
                }
                entry.interfaces = catalog.minimize_interfaces(&entry.fqn, &entry.interfaces);
                return ObjRef::new(token.clone(), entry.interfaces.clone());
            }
        }

        let token = format!("{}@{}", fqn, self.next_id);
        self.next_id += 1;
        let interfaces = catalog.minimize_interfaces(fqn, interfaces);
        tracing::trace!(objref = %token, "registered object");
        self.by_identity.insert(instance.identity(), token.clone());
        self.entries.insert(
            token.clone(),
            ObjectEntry {
                instance: instance.clone(),
                fqn: fqn.to_string(),
                interfaces: interfaces.clone(),
            },
        );
        ObjRef::new(token, interfaces)
    }

    /// Existing reference for `instance`, without registering.
    pub fn find(&self, instance: &ObjectRef) -> Option<ObjRef> {
        let token = self.by_identity.get(&instance.identity())?;
        let entry = self.entries.get(token)?;
        Some(ObjRef::new(token.clone(), entry.interfaces.clone()))
    }

    pub fn resolve(&self, objref: &ObjRef) -> KernelResult<&ObjectEntry> {
        self.resolve_id(&objref.ref_id)
    }

    pub fn resolve_id(&self, ref_id: &str) -> KernelResult<&ObjectEntry> {
        self.entries
            .get(ref_id)
            .ok_or_else(|| KernelError::ReferenceNotFound(ref_id.to_string()))
    }

    /// Remove an entry. Releasing twice is an error.
    pub fn release(&mut self, objref: &ObjRef) -> KernelResult<()> {
        let entry = self
            .entries
            .remove(&objref.ref_id)
            .ok_or_else(|| KernelError::ReferenceNotFound(objref.ref_id.clone()))?;
        self.by_identity.remove(&entry.instance.identity());
        tracing::trace!(objref = %objref.ref_id, "released object");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
