//! Method access table
//!
//! Maps full gRPC paths (`/package.Service/Method`) to how the auth layer
//! treats them. Paths that are not listed resolve to `None` and are denied
//! once the caller has authenticated.

use std::collections::HashMap;

use rbac::{Action, Permission, Resource};

/// How a method is guarded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodAccess {
    /// Passed through untouched
    Public,
    /// Token validated and installed when present, not required
    Optional,
    /// Token required, then checked against the permission
    Protected(Permission),
}

#[derive(Debug, Clone, Default)]
pub struct MethodPolicy {
    exact: HashMap<String, MethodAccess>,
    public_prefixes: Vec<String>,
}

impl MethodPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn public(mut self, path: impl Into<String>) -> Self {
        self.exact.insert(path.into(), MethodAccess::Public);
        self
    }

    /// Every path starting with `prefix` is public (reflection services)
    pub fn public_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.public_prefixes.push(prefix.into());
        self
    }

    pub fn optional(mut self, path: impl Into<String>) -> Self {
        self.exact.insert(path.into(), MethodAccess::Optional);
        self
    }

    pub fn protected(mut self, path: impl Into<String>, resource: Resource, action: Action) -> Self {
        self.exact.insert(
            path.into(),
            MethodAccess::Protected(Permission::new(resource, action)),
        );
        self
    }

    pub fn resolve(&self, path: &str) -> Option<MethodAccess> {
        if let Some(access) = self.exact.get(path) {
            return Some(*access);
        }
        self.public_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
            .then_some(MethodAccess::Public)
    }
}
