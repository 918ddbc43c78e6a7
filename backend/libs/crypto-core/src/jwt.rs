/// Shared JWT issuance and validation for Medialib services
///
/// Tokens are HS256 (HMAC-SHA256) over the standard JWS compact form: a
/// base64url (unpadded) JSON header and payload, signed with the configured
/// secret. Signature comparison is constant-time inside `jsonwebtoken`.
///
/// ## Security Design
///
/// - **Two kinds**: access and refresh tokens carry a `token_type` claim and
///   each verifier accepts only its own kind
/// - **Issuer pinned**: `iss` must equal the configured issuer
/// - **Clock skew**: `exp` is checked with a 60 second leeway, so a token is
///   still accepted up to one minute after its nominal expiry
/// - **Opaque failures**: every verification failure surfaces as
///   [`JwtError::InvalidToken`], whose message never names the failed check
///
/// ## Usage
///
/// ```rust
/// use crypto_core::jwt::{Identity, TokenConfig, TokenManager};
/// use std::time::Duration;
///
/// let manager = TokenManager::new(TokenConfig {
///     access_secret: b"0123456789abcdef0123456789abcdef".to_vec(),
///     refresh_secret: b"0123456789abcdef0123456789abcdef".to_vec(),
///     issuer: "medialib".to_string(),
///     access_ttl: Duration::from_secs(900),
///     refresh_ttl: Duration::from_secs(7 * 24 * 3600),
/// })
/// .expect("valid config");
///
/// let identity = Identity::new("user-1", "alice", "alice@example.com", vec!["user".into()]);
/// let token = manager.issue_access(&identity).unwrap();
/// assert_eq!(manager.verify_access(&token).unwrap(), identity);
/// ```
use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

// ============================================================================
// Constants
// ============================================================================

/// JWT algorithm used for every token
const JWT_ALGORITHM: Algorithm = Algorithm::HS256;

/// Tolerance applied to `exp` when verifying
pub const CLOCK_SKEW_LEEWAY_SECS: u64 = 60;

/// Shortest accepted access token lifetime
pub const MIN_ACCESS_TTL: Duration = Duration::from_secs(60);

/// Size of secrets produced by [`generate_secret`]
pub const GENERATED_SECRET_LEN: usize = 32;

// ============================================================================
// Data Structures
// ============================================================================

/// Which verifier a token is meant for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Access => f.write_str("access"),
            TokenKind::Refresh => f.write_str("refresh"),
        }
    }
}

/// Caller identity carried by an access token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub subject: String,
    pub username: String,
    pub email: String,
    pub roles: Vec<String>,
    /// Reserved; carried through unchanged
    pub scopes: Vec<String>,
}

impl Identity {
    pub fn new(
        subject: impl Into<String>,
        username: impl Into<String>,
        email: impl Into<String>,
        roles: Vec<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            username: username.into(),
            email: email.into(),
            roles,
            scopes: Vec::new(),
        }
    }
}

/// JWT Claims structure - registered claims plus Medialib-specific fields
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (stable user identifier)
    pub sub: String,
    /// Issuer
    pub iss: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Unique token identifier
    pub jti: String,
    pub token_type: TokenKind,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub username: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub email: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scopes: Vec<String>,
}

#[derive(Debug, Error)]
pub enum JwtError {
    #[error("invalid token configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid claims: {0}")]
    InvalidClaims(&'static str),

    #[error("failed to sign token: {0}")]
    Signing(String),

    /// Deliberately carries no detail
    #[error("invalid token")]
    InvalidToken,
}

impl From<JwtError> for tonic::Status {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::InvalidToken => tonic::Status::unauthenticated("invalid token"),
            JwtError::InvalidClaims(msg) => tonic::Status::invalid_argument(msg),
            JwtError::InvalidConfig(_) | JwtError::Signing(_) => {
                tonic::Status::internal("internal server error")
            }
        }
    }
}

/// Token manager configuration
#[derive(Clone)]
pub struct TokenConfig {
    pub access_secret: Vec<u8>,
    /// May be identical to `access_secret`
    pub refresh_secret: Vec<u8>,
    pub issuer: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

impl fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenConfig")
            .field("access_secret", &"[REDACTED]")
            .field("refresh_secret", &"[REDACTED]")
            .field("issuer", &self.issuer)
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish()
    }
}

impl TokenConfig {
    pub fn validate(&self) -> Result<(), JwtError> {
        if self.access_secret.is_empty() || self.refresh_secret.is_empty() {
            return Err(JwtError::InvalidConfig("secret must not be empty".into()));
        }
        if self.issuer.trim().is_empty() {
            return Err(JwtError::InvalidConfig("issuer must not be empty".into()));
        }
        if self.access_ttl < MIN_ACCESS_TTL {
            return Err(JwtError::InvalidConfig(format!(
                "access token lifetime must be at least {}s",
                MIN_ACCESS_TTL.as_secs()
            )));
        }
        if self.refresh_ttl < self.access_ttl {
            return Err(JwtError::InvalidConfig(
                "refresh token lifetime must not be shorter than access token lifetime".into(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Token Manager
// ============================================================================

/// Mints and verifies access and refresh tokens
///
/// Immutable after construction; share it behind an `Arc`.
pub struct TokenManager {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    issuer: String,
    access_ttl: ChronoDuration,
    refresh_ttl: ChronoDuration,
    validation: Validation,
}

impl fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenManager")
            .field("issuer", &self.issuer)
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish_non_exhaustive()
    }
}

impl TokenManager {
    pub fn new(config: TokenConfig) -> Result<Self, JwtError> {
        config.validate()?;

        let access_ttl = ChronoDuration::from_std(config.access_ttl)
            .map_err(|e| JwtError::InvalidConfig(format!("access lifetime out of range: {e}")))?;
        let refresh_ttl = ChronoDuration::from_std(config.refresh_ttl)
            .map_err(|e| JwtError::InvalidConfig(format!("refresh lifetime out of range: {e}")))?;

        let mut validation = Validation::new(JWT_ALGORITHM);
        validation.validate_exp = true;
        validation.leeway = CLOCK_SKEW_LEEWAY_SECS;
        validation.set_issuer(&[config.issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);

        Ok(Self {
            access_encoding: EncodingKey::from_secret(&config.access_secret),
            access_decoding: DecodingKey::from_secret(&config.access_secret),
            refresh_encoding: EncodingKey::from_secret(&config.refresh_secret),
            refresh_decoding: DecodingKey::from_secret(&config.refresh_secret),
            issuer: config.issuer,
            access_ttl,
            refresh_ttl,
            validation,
        })
    }

    /// Access token lifetime in seconds
    pub fn access_ttl_secs(&self) -> i64 {
        self.access_ttl.num_seconds()
    }

    /// Sign an access token carrying the full identity
    pub fn issue_access(&self, identity: &Identity) -> Result<String, JwtError> {
        if identity.subject.trim().is_empty() {
            return Err(JwtError::InvalidClaims("subject must not be empty"));
        }

        let now = Utc::now();
        let claims = Claims {
            sub: identity.subject.clone(),
            iss: self.issuer.clone(),
            iat: now.timestamp(),
            exp: (now + self.access_ttl).timestamp(),
            jti: Uuid::new_v4().to_string(),
            token_type: TokenKind::Access,
            username: identity.username.clone(),
            email: identity.email.clone(),
            roles: identity.roles.clone(),
            scopes: identity.scopes.clone(),
        };

        self.sign(&claims)
    }

    /// Sign a refresh token carrying only the subject
    pub fn issue_refresh(&self, subject: &str) -> Result<String, JwtError> {
        if subject.trim().is_empty() {
            return Err(JwtError::InvalidClaims("subject must not be empty"));
        }

        let now = Utc::now();
        let claims = Claims {
            sub: subject.to_string(),
            iss: self.issuer.clone(),
            iat: now.timestamp(),
            exp: (now + self.refresh_ttl).timestamp(),
            jti: Uuid::new_v4().to_string(),
            token_type: TokenKind::Refresh,
            username: String::new(),
            email: String::new(),
            roles: Vec::new(),
            scopes: Vec::new(),
        };

        self.sign(&claims)
    }

    pub fn verify_access(&self, token: &str) -> Result<Identity, JwtError> {
        let claims = self.verify(token, TokenKind::Access)?;
        Ok(Identity {
            subject: claims.sub,
            username: claims.username,
            email: claims.email,
            roles: claims.roles,
            scopes: claims.scopes,
        })
    }

    /// Returns the subject of a valid refresh token
    pub fn verify_refresh(&self, token: &str) -> Result<String, JwtError> {
        self.verify(token, TokenKind::Refresh).map(|claims| claims.sub)
    }

    fn sign(&self, claims: &Claims) -> Result<String, JwtError> {
        let key = match claims.token_type {
            TokenKind::Access => &self.access_encoding,
            TokenKind::Refresh => &self.refresh_encoding,
        };
        encode(&Header::new(JWT_ALGORITHM), claims, key)
            .map_err(|e| JwtError::Signing(e.to_string()))
    }

    fn verify(&self, token: &str, expected: TokenKind) -> Result<Claims, JwtError> {
        let key = match expected {
            TokenKind::Access => &self.access_decoding,
            TokenKind::Refresh => &self.refresh_decoding,
        };

        let data = decode::<Claims>(token, key, &self.validation).map_err(|e| {
            debug!(error = %e, kind = %expected, "Token rejected");
            JwtError::InvalidToken
        })?;
        let claims = data.claims;

        if claims.token_type != expected {
            debug!(got = %claims.token_type, kind = %expected, "Token kind mismatch");
            return Err(JwtError::InvalidToken);
        }
        if claims.sub.trim().is_empty() || claims.exp <= claims.iat {
            debug!(kind = %expected, "Malformed token claims");
            return Err(JwtError::InvalidToken);
        }

        Ok(claims)
    }
}

/// Generate a random 256-bit secret
///
/// For development bootstrap only; production deployments must configure a
/// secret explicitly.
pub fn generate_secret() -> Vec<u8> {
    let mut secret = vec![0u8; GENERATED_SECRET_LEN];
    OsRng.fill_bytes(&mut secret);
    warn!("Generated an ephemeral JWT secret; tokens will not survive a restart");
    secret
}

// ============================================================================
// Tests
// ============================================================================
