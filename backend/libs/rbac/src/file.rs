//! File-backed policy loading
//!
//! Two files make up a file policy:
//!
//! - the **model** (TOML) names the resources and actions policy lines may
//!   use, and whether the `(*, *)` wildcard is permitted
//! - the **policy** lists one grant per line: `p, <role>, <resource>, <action>`
//!
//! ```text
//! # library.policy
//! p, admin, *, *
//! p, user, library, read
//! p, user, media, read
//! ```
//!
//! Any error rejects the whole policy; nothing is partially loaded.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::info;

use crate::permission::{Action, Grant, Resource};
use crate::policy::Policy;
use crate::RbacError;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ModelFile {
    model: ModelSection,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ModelSection {
    resources: Vec<String>,
    actions: Vec<String>,
    #[serde(default = "default_allow_wildcard")]
    allow_wildcard: bool,
}

fn default_allow_wildcard() -> bool {
    true
}

/// Vocabulary a policy file is checked against
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Model {
    resources: BTreeSet<Resource>,
    actions: BTreeSet<Action>,
    allow_wildcard: bool,
}

impl Model {
    pub fn load(path: &Path) -> Result<Self, RbacError> {
        let raw = read(path)?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self, RbacError> {
        let file: ModelFile =
            toml::from_str(raw).map_err(|e| RbacError::Model(e.to_string()))?;
        let section = file.model;

        if section.resources.is_empty() || section.actions.is_empty() {
            return Err(RbacError::Model(
                "model must declare at least one resource and one action".to_string(),
            ));
        }

        let resources = section
            .resources
            .iter()
            .map(|r| r.parse::<Resource>())
            .collect::<Result<BTreeSet<_>, _>>()?;
        let actions = section
            .actions
            .iter()
            .map(|a| a.parse::<Action>())
            .collect::<Result<BTreeSet<_>, _>>()?;

        Ok(Self {
            resources,
            actions,
            allow_wildcard: section.allow_wildcard,
        })
    }

    fn check(&self, grant: Grant) -> Result<(), String> {
        match grant {
            Grant::Wildcard if !self.allow_wildcard => {
                Err("wildcard grants are disabled by the model".to_string())
            }
            Grant::Wildcard => Ok(()),
            Grant::Exact(p) if !self.resources.contains(&p.resource) => {
                Err(format!("resource '{}' is not declared in the model", p.resource))
            }
            Grant::Exact(p) if !self.actions.contains(&p.action) => {
                Err(format!("action '{}' is not declared in the model", p.action))
            }
            Grant::Exact(_) => Ok(()),
        }
    }
}

/// Parse policy text against `model`
pub fn parse_policy(model: &Model, raw: &str) -> Result<Policy, RbacError> {
    let mut policy = Policy::new();

    for (index, line) in raw.lines().enumerate() {
        let line_no = index + 1;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        let (role, resource, action) = match fields.as_slice() {
            ["p", role, resource, action] => (*role, *resource, *action),
            _ => {
                return Err(RbacError::Policy {
                    line: line_no,
                    message: "expected 'p, <role>, <resource>, <action>'".to_string(),
                })
            }
        };

        if role.is_empty() {
            return Err(RbacError::Policy {
                line: line_no,
                message: "role must not be empty".to_string(),
            });
        }

        let grant = Grant::parse(resource, action).map_err(|e| RbacError::Policy {
            line: line_no,
            message: e.to_string(),
        })?;
        model.check(grant).map_err(|message| RbacError::Policy {
            line: line_no,
            message,
        })?;

        policy.grant(role, grant);
    }

    if policy.is_empty() {
        return Err(RbacError::Policy {
            line: 0,
            message: "policy contains no grants".to_string(),
        });
    }

    Ok(policy)
}

/// Load model and policy files into a [`Policy`]
pub fn load_policy(model_path: &Path, policy_path: &Path) -> Result<Policy, RbacError> {
    let model = Model::load(model_path)?;
    let raw = read(policy_path)?;
    let policy = parse_policy(&model, &raw)?;

    info!(
        model = %model_path.display(),
        policy = %policy_path.display(),
        roles = policy.role_names().count(),
        "Loaded RBAC policy from files"
    );

    Ok(policy)
}

fn read(path: &Path) -> Result<String, RbacError> {
    fs::read_to_string(path).map_err(|source| RbacError::Io {
        path: path.display().to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permission::Permission;

    const MODEL: &str = r#"
[model]
resources = ["library", "media"]
actions = ["read", "write", "delete"]
"#;

    #[test]
    fn test_parse_policy() {
        let model = Model::parse(MODEL).unwrap();
        let policy = parse_policy(
            &model,
            "# grants\n\np, admin, *, *\np, user, library, read\n  p ,user,media,read  \n",
        )
        .unwrap();

        let user = vec!["user".to_string()];
        assert!(policy.allows(&user, Resource::Media, Action::Read));
        assert!(!policy.allows(&user, Resource::Media, Action::Write));
        assert_eq!(
            policy.grants("admin").unwrap().iter().next(),
            Some(&Grant::Wildcard)
        );
        assert!(policy
            .grants("user")
            .unwrap()
            .contains(&Grant::Exact(Permission::new(Resource::Library, Action::Read))));
    }

    #[test]
    fn test_undeclared_resource_rejected() {
        let model = Model::parse(MODEL).unwrap();
        let err = parse_policy(&model, "p, user, streaming, read").unwrap_err();
        assert!(matches!(err, RbacError::Policy { line: 1, .. }));
    }

    #[test]
    fn test_malformed_line_rejected() {
        let model = Model::parse(MODEL).unwrap();
        let err = parse_policy(&model, "p, admin, *, *\ng, alice, admin").unwrap_err();
        assert!(matches!(err, RbacError::Policy { line: 2, .. }));
    }

    #[test]
    fn test_wildcard_can_be_disabled() {
        let model = Model::parse(
            "[model]\nresources = [\"media\"]\nactions = [\"read\"]\nallow_wildcard = false\n",
        )
        .unwrap();
        assert!(parse_policy(&model, "p, admin, *, *").is_err());
    }

    #[test]
    fn test_empty_policy_rejected() {
        let model = Model::parse(MODEL).unwrap();
        assert!(parse_policy(&model, "# nothing here\n").is_err());
    }

    #[test]
    fn test_model_with_unknown_resource_rejected() {
        let err = Model::parse("[model]\nresources = [\"movies\"]\nactions = [\"read\"]\n")
            .unwrap_err();
        assert!(matches!(err, RbacError::UnknownResource(_)));
    }

    #[test]
    fn test_model_unknown_field_rejected() {
        let err = Model::parse(
            "[model]\nresources = [\"media\"]\nactions = [\"read\"]\nmatcher = \"x\"\n",
        )
        .unwrap_err();
        assert!(matches!(err, RbacError::Model(_)));
    }
}
