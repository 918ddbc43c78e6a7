//! Typed accessors for the caller identity
//!
//! The auth layer stores a [`CallerIdentity`] in the request extensions; tonic
//! carries HTTP extensions into `tonic::Request`, so handlers read it back here.

use tonic::{Request, Status};

use crate::CallerIdentity;

/// Extension trait for reading the authenticated caller from a gRPC request
///
/// ## Usage
///
/// ```rust,no_run
/// use grpc_auth::CallerExt;
/// use tonic::{Request, Response, Status};
///
/// async fn get_library(request: Request<()>) -> Result<Response<()>, Status> {
///     let caller = request.require_caller()?;
///     tracing::info!(user_id = %caller.user_id, "get library");
///     Ok(Response::new(()))
/// }
/// ```
pub trait CallerExt {
    fn caller(&self) -> Option<&CallerIdentity>;

    /// Caller identity, or `Unauthenticated` when none was installed
    fn require_caller(&self) -> Result<&CallerIdentity, Status>;

    fn user_id(&self) -> Option<&str> {
        self.caller().map(|c| c.user_id.as_str())
    }

    fn username(&self) -> Option<&str> {
        self.caller().map(|c| c.username.as_str())
    }

    fn roles(&self) -> &[String] {
        self.caller().map(|c| c.roles.as_slice()).unwrap_or(&[])
    }
}

impl<T> CallerExt for Request<T> {
    fn caller(&self) -> Option<&CallerIdentity> {
        self.extensions().get::<CallerIdentity>()
    }

    fn require_caller(&self) -> Result<&CallerIdentity, Status> {
        match self.caller() {
            Some(caller) if !caller.user_id.is_empty() => Ok(caller),
            _ => Err(Status::unauthenticated("authentication required")),
        }
    }
}
