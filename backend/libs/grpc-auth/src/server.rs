//! Server-side authentication and authorization
//!
//! [`AuthInterceptor`] holds the per-call decision; [`AuthLayer`] runs it at
//! the HTTP level where the gRPC path is visible, so unary and streaming calls
//! take the same route.
//!
//! Per call:
//! 1. Public methods pass through untouched.
//! 2. Exactly one `authorization` entry starting with `Bearer ` is required.
//! 3. The token must verify as an access token; failures all read `invalid token`.
//! 4. The caller identity is installed into the request extensions.
//! 5. Protected methods are checked against RBAC; unlisted methods are denied.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use crypto_core::TokenManager;
use http::header::{HeaderValue, CONTENT_TYPE};
use rbac::Authorizer;
use tonic::metadata::MetadataMap;
use tonic::Status;
use tower::{Layer, Service};
use tracing::{debug, warn};

use crate::methods::{MethodAccess, MethodPolicy};
use crate::CallerIdentity;

const AUTHORIZATION: &str = "authorization";
const BEARER_PREFIX: &str = "Bearer ";

#[derive(Clone)]
pub struct AuthInterceptor {
    tokens: Arc<TokenManager>,
    authorizer: Arc<dyn Authorizer>,
    methods: Arc<MethodPolicy>,
}

impl AuthInterceptor {
    pub fn new(
        tokens: Arc<TokenManager>,
        authorizer: Arc<dyn Authorizer>,
        methods: MethodPolicy,
    ) -> Self {
        Self {
            tokens,
            authorizer,
            methods: Arc::new(methods),
        }
    }

    /// Decide one inbound call
    ///
    /// `Ok(None)` lets the call through without an identity (public, or
    /// optional without credentials). `Ok(Some(_))` carries the caller to
    /// install before the handler runs.
    pub fn authorize(
        &self,
        path: &str,
        metadata: &MetadataMap,
    ) -> Result<Option<CallerIdentity>, Status> {
        match self.methods.resolve(path) {
            Some(MethodAccess::Public) => Ok(None),
            Some(MethodAccess::Optional) => {
                if metadata.get(AUTHORIZATION).is_none() {
                    return Ok(None);
                }
                self.authenticate(metadata).map(Some)
            }
            Some(MethodAccess::Protected(permission)) => {
                let caller = self.authenticate(metadata)?;
                let decision =
                    self.authorizer
                        .authorize(&caller.roles, permission.resource, permission.action);
                if !decision.is_allowed() {
                    warn!(
                        method = %path,
                        user_id = %caller.user_id,
                        permission = %permission,
                        "Permission denied"
                    );
                    return Err(Status::permission_denied("permission denied"));
                }
                Ok(Some(caller))
            }
            None => {
                let caller = self.authenticate(metadata)?;
                warn!(method = %path, user_id = %caller.user_id, "Denied call to unlisted method");
                Err(Status::permission_denied("permission denied"))
            }
        }
    }

    fn authenticate(&self, metadata: &MetadataMap) -> Result<CallerIdentity, Status> {
        let mut entries = metadata.get_all(AUTHORIZATION).iter();
        let header = match (entries.next(), entries.next()) {
            (Some(header), None) => header,
            (None, _) => {
                warn!("Missing authorization header");
                return Err(Status::unauthenticated("missing authorization header"));
            }
            (Some(_), Some(_)) => {
                warn!("Multiple authorization headers");
                return Err(Status::unauthenticated("invalid authorization header"));
            }
        };

        let token = header
            .to_str()
            .ok()
            .and_then(|value| value.strip_prefix(BEARER_PREFIX))
            .filter(|token| !token.is_empty())
            .ok_or_else(|| {
                warn!("Invalid authorization format (expected 'Bearer <token>')");
                Status::unauthenticated("invalid authorization header")
            })?;

        let identity = self.tokens.verify_access(token).map_err(|e| {
            warn!(error = %e, "Access token rejected");
            Status::unauthenticated("invalid token")
        })?;

        let caller = CallerIdentity::from(identity);
        debug!(user_id = %caller.user_id, "Access token validated");
        Ok(caller)
    }
}

/// Tower layer that applies an [`AuthInterceptor`] to every inbound call
#[derive(Clone)]
pub struct AuthLayer {
    interceptor: AuthInterceptor,
}

impl AuthLayer {
    pub fn new(interceptor: AuthInterceptor) -> Self {
        Self { interceptor }
    }
}

impl<S> Layer<S> for AuthLayer {
    type Service = AuthService<S>;

    fn layer(&self, service: S) -> Self::Service {
        AuthService {
            inner: service,
            interceptor: self.interceptor.clone(),
        }
    }
}

#[derive(Clone)]
pub struct AuthService<S> {
    inner: S,
    interceptor: AuthInterceptor,
}

impl<S, ReqBody, ResBody> Service<http::Request<ReqBody>> for AuthService<S>
where
    S: Service<http::Request<ReqBody>, Response = http::Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    ReqBody: Send + 'static,
    ResBody: Default + Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: http::Request<ReqBody>) -> Self::Future {
        // Take the service that was driven to readiness, leave a fresh clone behind
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let interceptor = self.interceptor.clone();

        Box::pin(async move {
            let metadata = MetadataMap::from_headers(req.headers().clone());
            match interceptor.authorize(req.uri().path(), &metadata) {
                Ok(Some(caller)) => {
                    req.extensions_mut().insert(caller);
                }
                Ok(None) => {}
                Err(status) => return Ok(status_response(&status)),
            }
            inner.call(req).await
        })
    }
}

/// Trailers-only gRPC response carrying `status`
fn status_response<B: Default>(status: &Status) -> http::Response<B> {
    let mut response = http::Response::new(B::default());
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/grpc"));
    headers.insert("grpc-status", HeaderValue::from(status.code() as i32));
    if let Ok(message) = HeaderValue::from_str(&encode_grpc_message(status.message())) {
        headers.insert("grpc-message", message);
    }
    response
}

/// Percent-encode per the gRPC HTTP/2 mapping
fn encode_grpc_message(message: &str) -> String {
    let mut encoded = String::with_capacity(message.len());
    for byte in message.bytes() {
        if (0x20..=0x7e).contains(&byte) && byte != b'%' {
            encoded.push(byte as char);
        } else {
            encoded.push_str(&format!("%{byte:02X}"));
        }
    }
    encoded
}

#[cfg(test)]
mod tests {
    use super::*;
    use crypto_core::{Identity, TokenConfig};
    use rbac::{Action, RbacEngine, Resource};
    use std::time::Duration;
    use tonic::metadata::MetadataValue;

    const LIST: &str = "/medialib.library.v1.LibraryService/ListLibraries";
    const CREATE: &str = "/medialib.library.v1.LibraryService/CreateLibrary";
    const LOGIN: &str = "/medialib.auth.v1.AuthService/Login";
    const CREATE_USER: &str = "/medialib.auth.v1.AuthService/CreateUser";

    fn tokens() -> Arc<TokenManager> {
        Arc::new(
            TokenManager::new(TokenConfig {
                access_secret: b"interceptor-test-secret-0123456789abcdef".to_vec(),
                refresh_secret: b"interceptor-test-secret-0123456789abcdef".to_vec(),
                issuer: "medialib-test".to_string(),
                access_ttl: Duration::from_secs(900),
                refresh_ttl: Duration::from_secs(3600),
            })
            .unwrap(),
        )
    }

    fn interceptor(tokens: Arc<TokenManager>) -> AuthInterceptor {
        let methods = MethodPolicy::new()
            .public(LOGIN)
            .optional(CREATE_USER)
            .protected(LIST, Resource::Library, Action::Read)
            .protected(CREATE, Resource::Library, Action::Write);
        AuthInterceptor::new(tokens, Arc::new(RbacEngine::builtin()), methods)
    }

    fn bearer(tokens: &TokenManager, role: &str) -> MetadataMap {
        let identity = Identity::new("u-1", "alice", "alice@example.com", vec![role.to_string()]);
        let token = tokens.issue_access(&identity).unwrap();
        let mut metadata = MetadataMap::new();
        metadata.insert(AUTHORIZATION, format!("Bearer {token}").parse().unwrap());
        metadata
    }

    #[test]
    fn test_public_method_passes_without_token() {
        let interceptor = interceptor(tokens());
        assert_eq!(interceptor.authorize(LOGIN, &MetadataMap::new()).unwrap(), None);
    }

    #[test]
    fn test_missing_header() {
        let interceptor = interceptor(tokens());
        let status = interceptor.authorize(LIST, &MetadataMap::new()).unwrap_err();

        assert_eq!(status.code(), tonic::Code::Unauthenticated);
        assert_eq!(status.message(), "missing authorization header");
    }

    #[test]
    fn test_wrong_scheme_and_case_sensitive_prefix() {
        let interceptor = interceptor(tokens());
        for value in ["Basic abc", "bearer abc", "Bearer ", "Bearerabc"] {
            let mut metadata = MetadataMap::new();
            metadata.insert(AUTHORIZATION, MetadataValue::try_from(value).unwrap());

            let status = interceptor.authorize(LIST, &metadata).unwrap_err();
            assert_eq!(status.code(), tonic::Code::Unauthenticated, "{value}");
            assert_eq!(status.message(), "invalid authorization header");
        }
    }

    #[test]
    fn test_duplicate_header_rejected() {
        let tokens = tokens();
        let interceptor = interceptor(tokens.clone());
        let mut metadata = bearer(&tokens, "admin");
        metadata.append(AUTHORIZATION, MetadataValue::from_static("Bearer other"));

        let status = interceptor.authorize(LIST, &metadata).unwrap_err();
        assert_eq!(status.code(), tonic::Code::Unauthenticated);
    }

    #[test]
    fn test_bad_token_does_not_leak_cause() {
        let tokens = tokens();
        let interceptor = interceptor(tokens.clone());

        let refresh = tokens.issue_refresh("u-1").unwrap();
        let mut metadata = MetadataMap::new();
        metadata.insert(AUTHORIZATION, format!("Bearer {refresh}").parse().unwrap());

        let status = interceptor.authorize(LIST, &metadata).unwrap_err();
        assert_eq!(status.code(), tonic::Code::Unauthenticated);
        assert_eq!(status.message(), "invalid token");
    }

    #[test]
    fn test_protected_allowed() {
        let tokens = tokens();
        let interceptor = interceptor(tokens.clone());

        let caller = interceptor
            .authorize(LIST, &bearer(&tokens, "user"))
            .unwrap()
            .unwrap();
        assert_eq!(caller.user_id, "u-1");
        assert_eq!(caller.roles, vec!["user".to_string()]);
    }

    #[test]
    fn test_protected_denied() {
        let tokens = tokens();
        let interceptor = interceptor(tokens.clone());

        let status = interceptor
            .authorize(CREATE, &bearer(&tokens, "guest"))
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::PermissionDenied);
    }

    #[test]
    fn test_unlisted_method_denied_after_authentication() {
        let tokens = tokens();
        let interceptor = interceptor(tokens.clone());
        let path = "/medialib.library.v1.LibraryService/Unknown";

        let status = interceptor.authorize(path, &MetadataMap::new()).unwrap_err();
        assert_eq!(status.code(), tonic::Code::Unauthenticated);

        let status = interceptor
            .authorize(path, &bearer(&tokens, "admin"))
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::PermissionDenied);
    }

    #[test]
    fn test_optional_method() {
        let tokens = tokens();
        let interceptor = interceptor(tokens.clone());

        assert_eq!(
            interceptor.authorize(CREATE_USER, &MetadataMap::new()).unwrap(),
            None
        );
        assert!(interceptor
            .authorize(CREATE_USER, &bearer(&tokens, "guest"))
            .unwrap()
            .is_some());

        let mut metadata = MetadataMap::new();
        metadata.insert(AUTHORIZATION, MetadataValue::from_static("Bearer garbage"));
        assert!(interceptor.authorize(CREATE_USER, &metadata).is_err());
    }

    #[test]
    fn test_status_response_headers() {
        let response: http::Response<String> =
            status_response(&Status::unauthenticated("invalid token"));

        assert_eq!(response.status(), http::StatusCode::OK);
        assert_eq!(response.headers()["grpc-status"], "16");
        assert_eq!(response.headers()["grpc-message"], "invalid token");
    }

    #[test]
    fn test_encode_grpc_message() {
        assert_eq!(encode_grpc_message("plain text"), "plain text");
        assert_eq!(encode_grpc_message("100%"), "100%25");
        assert_eq!(encode_grpc_message("a\nb"), "a%0Ab");
    }
}
