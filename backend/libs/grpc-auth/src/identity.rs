//! Caller identity carried through request extensions

use crypto_core::Identity;

/// Authenticated caller, installed by [`crate::AuthLayer`] before the handler runs
///
/// Handlers read it through [`crate::CallerExt`]; it is never stored under an
/// untyped key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    /// Token subject
    pub user_id: String,
    pub username: String,
    pub email: String,
    pub roles: Vec<String>,
    pub scopes: Vec<String>,
}

impl CallerIdentity {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

impl From<Identity> for CallerIdentity {
    fn from(identity: Identity) -> Self {
        Self {
            user_id: identity.subject,
            username: identity.username,
            email: identity.email,
            roles: identity.roles,
            scopes: identity.scopes,
        }
    }
}
