//! Resources, actions and the permissions built from them

use std::fmt;
use std::str::FromStr;

use crate::RbacError;

/// Token that stands for "every resource" / "every action" in policy sources
pub const WILDCARD: &str = "*";

/// Protected resource families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Resource {
    System,
    User,
    Library,
    Media,
    Streaming,
    Transcoding,
    Acquisition,
    Analytics,
}

impl Resource {
    pub const ALL: [Resource; 8] = [
        Resource::System,
        Resource::User,
        Resource::Library,
        Resource::Media,
        Resource::Streaming,
        Resource::Transcoding,
        Resource::Acquisition,
        Resource::Analytics,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Resource::System => "system",
            Resource::User => "user",
            Resource::Library => "library",
            Resource::Media => "media",
            Resource::Streaming => "streaming",
            Resource::Transcoding => "transcoding",
            Resource::Acquisition => "acquisition",
            Resource::Analytics => "analytics",
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Resource {
    type Err = RbacError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Resource::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| RbacError::UnknownResource(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Action {
    Read,
    Write,
    Delete,
    Admin,
}

impl Action {
    pub const ALL: [Action; 4] = [Action::Read, Action::Write, Action::Delete, Action::Admin];

    pub fn as_str(self) -> &'static str {
        match self {
            Action::Read => "read",
            Action::Write => "write",
            Action::Delete => "delete",
            Action::Admin => "admin",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = RbacError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| RbacError::UnknownAction(s.to_string()))
    }
}

/// A `(resource, action)` pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Permission {
    pub resource: Resource,
    pub action: Action,
}

impl Permission {
    pub const fn new(resource: Resource, action: Action) -> Self {
        Self { resource, action }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.resource, self.action)
    }
}

/// What a role holds: one exact permission, or `(*, *)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Grant {
    Exact(Permission),
    Wildcard,
}

impl Grant {
    pub fn covers(&self, permission: Permission) -> bool {
        match self {
            Grant::Wildcard => true,
            Grant::Exact(p) => *p == permission,
        }
    }

    /// Parse a `(resource, action)` token pair
    ///
    /// Only the full `(*, *)` wildcard is accepted; half wildcards fail.
    pub fn parse(resource: &str, action: &str) -> Result<Self, RbacError> {
        match (resource, action) {
            (WILDCARD, WILDCARD) => Ok(Grant::Wildcard),
            (WILDCARD, _) | (_, WILDCARD) => Err(RbacError::PartialWildcard(format!(
                "{resource}, {action}"
            ))),
            _ => Ok(Grant::Exact(Permission::new(resource.parse()?, action.parse()?))),
        }
    }
}

impl From<Permission> for Grant {
    fn from(permission: Permission) -> Self {
        Grant::Exact(permission)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_round_trip() {
        for resource in Resource::ALL {
            assert_eq!(resource.as_str().parse::<Resource>().unwrap(), resource);
        }
    }

    #[test]
    fn test_identifiers_are_case_sensitive() {
        assert!("Library".parse::<Resource>().is_err());
        assert!("READ".parse::<Action>().is_err());
    }

    #[test]
    fn test_grant_parse() {
        assert_eq!(Grant::parse("*", "*").unwrap(), Grant::Wildcard);
        assert_eq!(
            Grant::parse("media", "read").unwrap(),
            Grant::Exact(Permission::new(Resource::Media, Action::Read))
        );
        assert!(matches!(
            Grant::parse("media", "*"),
            Err(RbacError::PartialWildcard(_))
        ));
        assert!(Grant::parse("movies", "read").is_err());
    }

    #[test]
    fn test_wildcard_covers_everything() {
        for resource in Resource::ALL {
            for action in Action::ALL {
                assert!(Grant::Wildcard.covers(Permission::new(resource, action)));
            }
        }
    }
}
