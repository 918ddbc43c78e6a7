//! Role-based access control
//!
//! Decides `authorize(roles, resource, action) → allow | deny` from one of two
//! back-ends with identical semantics:
//!
//! - [`BuiltinAuthorizer`]: the seed table from [`Policy::builtin`]
//! - [`FileAuthorizer`]: model + policy files read once at start-up
//!
//! [`RbacEngine::from_settings`] picks the back-end. A file back-end that fails
//! to load is an error; there is no fallback to the built-in table.

use std::path::Path;
use std::str::FromStr;

use thiserror::Error;
use tracing::{debug, warn};

pub mod file;
pub mod permission;
pub mod policy;

pub use permission::{Action, Grant, Permission, Resource, WILDCARD};
pub use policy::Policy;

#[derive(Debug, Error)]
pub enum RbacError {
    #[error("unknown resource: {0}")]
    UnknownResource(String),

    #[error("unknown action: {0}")]
    UnknownAction(String),

    #[error("wildcard must cover both resource and action: {0}")]
    PartialWildcard(String),

    #[error("unknown rbac type: {0}")]
    UnknownKind(String),

    #[error("invalid rbac model: {0}")]
    Model(String),

    #[error("invalid rbac policy at line {line}: {message}")]
    Policy { line: usize, message: String },

    #[error("rbac type 'file' requires {0}")]
    MissingPath(&'static str),

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Outcome of an authorization check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
}

impl Decision {
    pub fn is_allowed(self) -> bool {
        self == Decision::Allow
    }
}

impl From<bool> for Decision {
    fn from(allowed: bool) -> Self {
        if allowed {
            Decision::Allow
        } else {
            Decision::Deny
        }
    }
}

/// Authorization seam used by the request pipeline
pub trait Authorizer: Send + Sync {
    fn authorize(&self, roles: &[String], resource: Resource, action: Action) -> Decision;
}

/// Back-end selector, `auth.rbac_type` in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RbacKind {
    #[default]
    Builtin,
    File,
}

impl FromStr for RbacKind {
    type Err = RbacError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "builtin" | "" => Ok(RbacKind::Builtin),
            "file" => Ok(RbacKind::File),
            other => Err(RbacError::UnknownKind(other.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BuiltinAuthorizer {
    policy: Policy,
}

impl BuiltinAuthorizer {
    pub fn new() -> Self {
        Self {
            policy: Policy::builtin(),
        }
    }
}

impl Default for BuiltinAuthorizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Authorizer for BuiltinAuthorizer {
    fn authorize(&self, roles: &[String], resource: Resource, action: Action) -> Decision {
        self.policy.allows(roles, resource, action).into()
    }
}

#[derive(Debug, Clone)]
pub struct FileAuthorizer {
    policy: Policy,
}

impl FileAuthorizer {
    pub fn load(model_path: &Path, policy_path: &Path) -> Result<Self, RbacError> {
        let policy = file::load_policy(model_path, policy_path)?;
        Ok(Self { policy })
    }
}

impl Authorizer for FileAuthorizer {
    fn authorize(&self, roles: &[String], resource: Resource, action: Action) -> Decision {
        self.policy.allows(roles, resource, action).into()
    }
}

/// The configured back-end
#[derive(Debug, Clone)]
pub enum RbacEngine {
    Builtin(BuiltinAuthorizer),
    File(FileAuthorizer),
}

impl RbacEngine {
    pub fn builtin() -> Self {
        RbacEngine::Builtin(BuiltinAuthorizer::new())
    }

    /// Build the engine for `kind`; file paths are required for [`RbacKind::File`]
    pub fn from_settings(
        kind: RbacKind,
        model_path: Option<&Path>,
        policy_path: Option<&Path>,
    ) -> Result<Self, RbacError> {
        match kind {
            RbacKind::Builtin => Ok(Self::builtin()),
            RbacKind::File => {
                let model = model_path.ok_or(RbacError::MissingPath("auth.rbac_model_path"))?;
                let policy = policy_path.ok_or(RbacError::MissingPath("auth.rbac_policy_path"))?;
                Ok(RbacEngine::File(FileAuthorizer::load(model, policy)?))
            }
        }
    }

    pub fn kind(&self) -> RbacKind {
        match self {
            RbacEngine::Builtin(_) => RbacKind::Builtin,
            RbacEngine::File(_) => RbacKind::File,
        }
    }
}

impl Authorizer for RbacEngine {
    fn authorize(&self, roles: &[String], resource: Resource, action: Action) -> Decision {
        let decision = match self {
            RbacEngine::Builtin(inner) => inner.authorize(roles, resource, action),
            RbacEngine::File(inner) => inner.authorize(roles, resource, action),
        };

        match decision {
            Decision::Allow => debug!(?roles, %resource, %action, "RBAC allow"),
            Decision::Deny => warn!(?roles, %resource, %action, "RBAC deny"),
        }
        decision
    }
}
