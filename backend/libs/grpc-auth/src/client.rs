//! Client-side bearer token injection

use tonic::metadata::AsciiMetadataValue;
use tonic::service::Interceptor;
use tonic::{Request, Status};

/// Adds `authorization: Bearer <token>` to every outgoing request
///
/// ```rust,no_run
/// use grpc_auth::BearerInterceptor;
///
/// # fn example() -> Result<(), tonic::Status> {
/// let interceptor = BearerInterceptor::new("eyJhbGciOiJIUzI1NiJ9...")?;
/// // let client = LibraryServiceClient::with_interceptor(channel, interceptor);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct BearerInterceptor {
    auth_header: AsciiMetadataValue,
}

impl BearerInterceptor {
    /// Fails when the token is not valid header text
    pub fn new(token: impl AsRef<str>) -> Result<Self, Status> {
        let auth_header = AsciiMetadataValue::try_from(format!("Bearer {}", token.as_ref()))
            .map_err(|_| Status::invalid_argument("token is not valid header text"))?;
        Ok(Self { auth_header })
    }
}

impl Interceptor for BearerInterceptor {
    fn call(&mut self, mut request: Request<()>) -> Result<Request<()>, Status> {
        request
            .metadata_mut()
            .insert("authorization", self.auth_header.clone());
        Ok(request)
    }
}
