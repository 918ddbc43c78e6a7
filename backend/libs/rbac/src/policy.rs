//! Role → grant tables

use std::collections::{BTreeSet, HashMap};

use crate::permission::{Action, Grant, Permission, Resource};

/// Immutable role table shared by both back-ends
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Policy {
    roles: HashMap<String, BTreeSet<Grant>>,
}

impl Policy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed table used by the built-in back-end
    ///
    /// - `admin`: every permission
    /// - `user`: read on library, media, streaming and analytics
    /// - `guest`: read on media
    pub fn builtin() -> Self {
        let mut policy = Self::new();
        policy.grant("admin", Grant::Wildcard);
        for resource in [
            Resource::Library,
            Resource::Media,
            Resource::Streaming,
            Resource::Analytics,
        ] {
            policy.grant("user", Permission::new(resource, Action::Read));
        }
        policy.grant("guest", Permission::new(Resource::Media, Action::Read));
        policy
    }

    pub fn grant(&mut self, role: impl Into<String>, grant: impl Into<Grant>) {
        self.roles.entry(role.into()).or_default().insert(grant.into());
    }

    pub fn role_names(&self) -> impl Iterator<Item = &str> {
        self.roles.keys().map(String::as_str)
    }

    pub fn grants(&self, role: &str) -> Option<&BTreeSet<Grant>> {
        self.roles.get(role)
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    /// True when at least one known role covers `(resource, action)`
    ///
    /// Unknown roles contribute nothing; an empty role list is denied.
    pub fn allows(&self, roles: &[String], resource: Resource, action: Action) -> bool {
        let wanted = Permission::new(resource, action);
        roles
            .iter()
            .filter_map(|role| self.roles.get(role))
            .flatten()
            .any(|grant| grant.covers(wanted))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roles(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_builtin_admin_has_everything() {
        let policy = Policy::builtin();
        for resource in Resource::ALL {
            for action in Action::ALL {
                assert!(policy.allows(&roles(&["admin"]), resource, action));
            }
        }
    }

    #[test]
    fn test_builtin_user_reads_only() {
        let policy = Policy::builtin();
        let user = roles(&["user"]);
        assert!(policy.allows(&user, Resource::Library, Action::Read));
        assert!(policy.allows(&user, Resource::Media, Action::Read));
        assert!(policy.allows(&user, Resource::Streaming, Action::Read));
        assert!(policy.allows(&user, Resource::Analytics, Action::Read));
        assert!(!policy.allows(&user, Resource::Library, Action::Write));
        assert!(!policy.allows(&user, Resource::Media, Action::Delete));
        assert!(!policy.allows(&user, Resource::System, Action::Read));
    }

    #[test]
    fn test_builtin_guest_media_read_only() {
        let policy = Policy::builtin();
        let guest = roles(&["guest"]);
        assert!(policy.allows(&guest, Resource::Media, Action::Read));
        assert!(!policy.allows(&guest, Resource::Library, Action::Read));
    }

    #[test]
    fn test_union_of_roles() {
        let policy = Policy::builtin();
        assert!(policy.allows(&roles(&["guest", "admin"]), Resource::System, Action::Admin));
        assert!(policy.allows(&roles(&["ghost", "user"]), Resource::Library, Action::Read));
    }

    #[test]
    fn test_empty_or_unknown_roles_denied() {
        let policy = Policy::builtin();
        assert!(!policy.allows(&[], Resource::Media, Action::Read));
        assert!(!policy.allows(&roles(&["ghost"]), Resource::Media, Action::Read));
        assert!(!policy.allows(&roles(&["Admin"]), Resource::Media, Action::Read));
    }
}
