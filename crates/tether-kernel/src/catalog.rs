//! Type catalog resolver
//!
//! Indexes every loaded assembly by fqn and answers structural questions:
//! which member a name resolves to, whether one type derives from another,
//! and which properties a struct carries.
//!
//! ## Member lookup order
//!
//! For `lookup(name, fqn, extra)` the search visits `fqn` and then each of
//! `extra` in order. Within a type it checks the type's own members, then
//! recurses into `base`, then into each declared interface. The first match
//! wins.

use std::collections::BTreeMap;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::api::EMPTY_OBJECT_FQN;
use crate::assembly::{Assembly, Method, Property, TypeDef};
use crate::error::{KernelError, KernelResult};

/// Result of a member lookup.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Member<'a> {
    Method(&'a Method),
    Property(&'a Property),
    NotFound,
}

/// All loaded assemblies, indexed by fqn.
#[derive(Debug, Default)]
pub struct TypeCatalog {
    assemblies: BTreeMap<String, Assembly>,
    /// fqn -> owning assembly name
    index: FxHashMap<String, String>,
}

impl TypeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an assembly and index its types.
    pub fn add(&mut self, assembly: Assembly) {
        for fqn in assembly.types.keys() {
            self.index.insert(fqn.clone(), assembly.name.clone());
        }
        self.assemblies.insert(assembly.name.clone(), assembly);
    }

    pub fn assembly(&self, name: &str) -> Option<&Assembly> {
        self.assemblies.get(name)
    }

    /// Number of indexed types.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Declared shape of `fqn`.
    pub fn type_of(&self, fqn: &str) -> KernelResult<&TypeDef> {
        self.try_type_of(fqn)
            .ok_or_else(|| KernelError::TypeNotFound(fqn.to_string()))
    }

    pub fn try_type_of(&self, fqn: &str) -> Option<&TypeDef> {
        let assembly = self.index.get(fqn)?;
        self.assemblies.get(assembly)?.types.get(fqn)
    }

    // ------------------------------------------------------------------------
    // Member lookup
    // ------------------------------------------------------------------------

    /// Find a method or property named `name`.
    pub fn lookup_member(&self, name: &str, fqn: &str, extra: &[String]) -> KernelResult<Member<'_>> {
        self.search(fqn, extra, |def| {
            if let Some(m) = def.methods().iter().find(|m| m.name == name) {
                return Some(Member::Method(m));
            }
            def.properties()
                .iter()
                .find(|p| p.name == name)
                .map(Member::Property)
        })
        .map(|found| found.unwrap_or(Member::NotFound))
    }

    pub fn method_of(&self, name: &str, fqn: &str, extra: &[String]) -> KernelResult<Option<&Method>> {
        self.search(fqn, extra, |def| def.methods().iter().find(|m| m.name == name))
    }

    pub fn property_of(&self, name: &str, fqn: &str, extra: &[String]) -> KernelResult<Option<&Property>> {
        self.search(fqn, extra, |def| def.properties().iter().find(|p| p.name == name))
    }

    /// Like [`method_of`](Self::method_of), failing with `MemberNotFound`.
    pub fn require_method(&self, name: &str, fqn: &str, extra: &[String]) -> KernelResult<&Method> {
        self.method_of(name, fqn, extra)?
            .ok_or_else(|| member_not_found(fqn, name))
    }

    /// Like [`property_of`](Self::property_of), failing with `MemberNotFound`.
    pub fn require_property(&self, name: &str, fqn: &str, extra: &[String]) -> KernelResult<&Property> {
        self.property_of(name, fqn, extra)?
            .ok_or_else(|| member_not_found(fqn, name))
    }

    fn search<'a, T>(
        &'a self,
        fqn: &str,
        extra: &[String],
        find: impl Fn(&'a TypeDef) -> Option<T> + Copy,
    ) -> KernelResult<Option<T>> {
        let mut visited = FxHashSet::default();
        let roots = std::iter::once(fqn).chain(extra.iter().map(String::as_str));
        for root in roots {
            if root == EMPTY_OBJECT_FQN {
                continue;
            }
            if let Some(found) = self.search_type(root, find, &mut visited)? {
                return Ok(Some(found));
            }
        }
        Ok(None)
    }

    fn search_type<'a, T>(
        &'a self,
        fqn: &str,
        find: impl Fn(&'a TypeDef) -> Option<T> + Copy,
        visited: &mut FxHashSet<String>,
    ) -> KernelResult<Option<T>> {
        if !visited.insert(fqn.to_string()) {
            return Ok(None);
        }
        let def = self.type_of(fqn)?;
        if let Some(found) = find(def) {
            return Ok(Some(found));
        }
        if let Some(base) = def.base() {
            if let Some(found) = self.search_type(base, find, visited)? {
                return Ok(Some(found));
            }
        }
        for iface in def.interfaces() {
            if let Some(found) = self.search_type(iface, find, visited)? {
                return Ok(Some(found));
            }
        }
        Ok(None)
    }

    // ------------------------------------------------------------------------
    // Hierarchy
    // ------------------------------------------------------------------------

    /// Whether `actual` equals `expected` or derives from/implements it.
    pub fn is_assignable(&self, actual: &str, expected: &str) -> bool {
        if actual == expected {
            return true;
        }
        let Some(def) = self.try_type_of(actual) else {
            return false;
        };
        def.base()
            .into_iter()
            .chain(def.interfaces().iter().map(String::as_str))
            .any(|parent| self.is_assignable(parent, expected))
    }

    /// Every type reachable from `fqn` through base and interface links,
    /// excluding `fqn` itself.
    pub fn ancestors(&self, fqn: &str) -> FxHashSet<String> {
        let mut out = FxHashSet::default();
        let mut stack = vec![fqn.to_string()];
        while let Some(current) = stack.pop() {
            let Some(def) = self.try_type_of(&current) else {
                continue;
            };
            for parent in def.base().into_iter().chain(def.interfaces().iter().map(String::as_str)) {
                if out.insert(parent.to_string()) {
                    stack.push(parent.to_string());
                }
            }
        }
        out
    }

    /// Drop interfaces already implied by `fqn`'s own hierarchy, plus
    /// duplicates. Order of first appearance is kept.
    pub fn minimize_interfaces(&self, fqn: &str, interfaces: &[String]) -> Vec<String> {
        let implied = self.ancestors(fqn);
        let mut out: Vec<String> = Vec::new();
        for iface in interfaces {
            if iface != fqn && !implied.contains(iface) && !out.contains(iface) {
                out.push(iface.clone());
            }
        }
        out
    }

    /// Properties of a struct type including interface ancestors. The
    /// first declaration of a name wins.
    pub fn all_properties(&self, fqn: &str) -> KernelResult<Vec<&Property>> {
        let mut out: Vec<&Property> = Vec::new();
        let mut visited = FxHashSet::default();
        self.collect_properties(fqn, &mut out, &mut visited)?;
        Ok(out)
    }

    fn collect_properties<'a>(
        &'a self,
        fqn: &str,
        out: &mut Vec<&'a Property>,
        visited: &mut FxHashSet<String>,
    ) -> KernelResult<()> {
        if !visited.insert(fqn.to_string()) {
            return Ok(());
        }
        let def = self.type_of(fqn)?;
        for prop in def.properties() {
            if !out.iter().any(|p| p.name == prop.name) {
                out.push(prop);
            }
        }
        if let Some(base) = def.base() {
            self.collect_properties(base, out, visited)?;
        }
        for iface in def.interfaces() {
            self.collect_properties(iface, out, visited)?;
        }
        Ok(())
    }
}

fn member_not_found(fqn: &str, member: &str) -> KernelError {
    KernelError::MemberNotFound {
        fqn: fqn.to_string(),
        member: member.to_string(),
    }
}
