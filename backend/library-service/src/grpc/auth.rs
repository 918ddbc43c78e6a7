//! `medialib.auth.v1.AuthService` handlers
//!
//! Login and RefreshToken are public. CreateUser bootstraps the first account
//! as `admin` while the store is empty; after that it needs `user:admin`.

use std::sync::Arc;

use crypto_core::{Identity, TokenManager};
use grpc_auth::CallerExt;
use rbac::{Action, Authorizer, Resource};
use tonic::{Request, Response, Status};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::pb::auth as pb;
use crate::converter::timestamp;
use crate::models::{NewUser, User};
use crate::password::{hash_password, verify_dummy, verify_password};
use crate::service::UserStore;
use pb::auth_service_server::AuthService;

const TOKEN_TYPE: &str = "Bearer";
const BOOTSTRAP_ROLE: &str = "admin";
const DEFAULT_ROLE: &str = "user";

const LOGIN_FAILED: &str = "invalid username or password";

pub struct AuthHandler {
    users: Arc<dyn UserStore>,
    tokens: Arc<TokenManager>,
    authorizer: Arc<dyn Authorizer>,
}

impl AuthHandler {
    pub fn new(
        users: Arc<dyn UserStore>,
        tokens: Arc<TokenManager>,
        authorizer: Arc<dyn Authorizer>,
    ) -> Self {
        Self {
            users,
            tokens,
            authorizer,
        }
    }

    fn token_pair(&self, user: &User) -> Result<pb::TokenPair, Status> {
        let identity = Identity::new(
            user.id.to_string(),
            user.username.clone(),
            user.email.clone(),
            user.roles.clone(),
        );

        Ok(pb::TokenPair {
            access_token: self.tokens.issue_access(&identity)?,
            refresh_token: self.tokens.issue_refresh(&identity.subject)?,
            token_type: TOKEN_TYPE.to_string(),
            expires_in: self.tokens.access_ttl_secs(),
        })
    }
}

fn user_to_wire(user: &User) -> pb::User {
    pb::User {
        id: user.id.to_string(),
        username: user.username.clone(),
        email: user.email.clone(),
        roles: user.roles.clone(),
        created_at: Some(timestamp(user.created_at)),
    }
}

fn validate_username(username: &str) -> Result<(), Status> {
    let valid = (3..=64).contains(&username.chars().count())
        && username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if !valid {
        return Err(Status::invalid_argument(
            "username must be 3-64 characters of letters, digits, '_', '-' or '.'",
        ));
    }
    Ok(())
}

fn validate_email(email: &str) -> Result<(), Status> {
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.')
        }
        None => false,
    };
    if !valid || email.len() > 254 {
        return Err(Status::invalid_argument("invalid email address"));
    }
    Ok(())
}

#[tonic::async_trait]
impl AuthService for AuthHandler {
    #[tracing::instrument(skip(self, request))]
    async fn login(
        &self,
        request: Request<pb::LoginRequest>,
    ) -> Result<Response<pb::TokenPair>, Status> {
        let req = request.into_inner();
        let username = req.username.trim();
        if username.is_empty() || req.password.is_empty() {
            return Err(Status::invalid_argument("username and password are required"));
        }

        let Some(user) = self.users.find_by_username(username).await? else {
            verify_dummy(&req.password);
            warn!("Login failed");
            return Err(Status::unauthenticated(LOGIN_FAILED));
        };
        if !verify_password(&req.password, &user.password_hash)? {
            warn!(user_id = %user.id, "Login failed");
            return Err(Status::unauthenticated(LOGIN_FAILED));
        }

        let tokens = self.token_pair(&user)?;
        info!(user_id = %user.id, "User logged in");
        Ok(Response::new(tokens))
    }

    #[tracing::instrument(skip(self, request))]
    async fn refresh_token(
        &self,
        request: Request<pb::RefreshTokenRequest>,
    ) -> Result<Response<pb::TokenPair>, Status> {
        let req = request.into_inner();

        let subject = self.tokens.verify_refresh(&req.refresh_token).map_err(|e| {
            warn!(error = %e, "Refresh token rejected");
            Status::unauthenticated("invalid token")
        })?;
        let user_id =
            Uuid::parse_str(&subject).map_err(|_| Status::unauthenticated("invalid token"))?;

        // Roles come from the store so revoked grants do not survive a refresh
        let Some(user) = self.users.find_by_id(user_id).await? else {
            warn!(user_id = %user_id, "Refresh for unknown account");
            return Err(Status::unauthenticated("invalid token"));
        };

        let tokens = self.token_pair(&user)?;
        debug!(user_id = %user.id, "Tokens refreshed");
        Ok(Response::new(tokens))
    }

    #[tracing::instrument(skip(self, request))]
    async fn create_user(
        &self,
        request: Request<pb::CreateUserRequest>,
    ) -> Result<Response<pb::User>, Status> {
        let caller = request.caller().cloned();
        let req = request.into_inner();

        let username = req.username.trim().to_string();
        let email = req.email.trim().to_lowercase();
        validate_username(&username)?;
        validate_email(&email)?;
        let password_hash = hash_password(&req.password)?;

        if self.users.count_users().await? == 0 {
            let first = NewUser {
                username: username.clone(),
                email: email.clone(),
                password_hash: password_hash.clone(),
                roles: vec![BOOTSTRAP_ROLE.to_string()],
            };
            match self.users.create_first_user(first).await {
                Ok(user) => {
                    info!(user_id = %user.id, "Initial admin account created");
                    return Ok(Response::new(user_to_wire(&user)));
                }
                Err(e) if e.is_conflict() => debug!("Another request created the first account"),
                Err(e) => return Err(e.into()),
            }
        }

        let Some(caller) = caller else {
            return Err(Status::unauthenticated("authentication required"));
        };
        if !self
            .authorizer
            .authorize(&caller.roles, Resource::User, Action::Admin)
            .is_allowed()
        {
            return Err(Status::permission_denied("permission denied"));
        }

        let roles: Vec<String> = req
            .roles
            .iter()
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .collect();
        let roles = if roles.is_empty() {
            vec![DEFAULT_ROLE.to_string()]
        } else {
            roles
        };

        let user = self
            .users
            .create_user(NewUser {
                username,
                email,
                password_hash,
                roles,
            })
            .await?;
        info!(user_id = %user.id, created_by = %caller.user_id, "User created");

        Ok(Response::new(user_to_wire(&user)))
    }
}
