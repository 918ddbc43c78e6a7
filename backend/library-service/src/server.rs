//! gRPC server assembly
//!
//! One tonic server carries the library and auth services plus health and
//! reflection. Every request passes [`AuthLayer`] before routing.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crypto_core::{CursorCodec, TokenManager};
use grpc_auth::{AuthInterceptor, AuthLayer};
use rbac::Authorizer;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;
use tracing::info;

use crate::config::PageLimits;
use crate::grpc::pb::auth::auth_service_server::AuthServiceServer;
use crate::grpc::pb::library::library_service_server::LibraryServiceServer;
use crate::grpc::{method_policy, AuthHandler, LibraryHandler, FILE_DESCRIPTOR_SET};
use crate::service::{CatalogService, UserStore};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to build reflection service: {0}")]
    Reflection(#[from] tonic_reflection::server::Error),

    #[error("gRPC transport error: {0}")]
    Transport(#[from] tonic::transport::Error),
}

/// Everything the handlers share; immutable once built
#[derive(Clone)]
pub struct Application {
    pub catalog: Arc<dyn CatalogService>,
    pub users: Arc<dyn UserStore>,
    pub tokens: Arc<TokenManager>,
    pub authorizer: Arc<dyn Authorizer>,
    pub cursor: Arc<CursorCodec>,
    pub limits: PageLimits,
    pub request_timeout: Duration,
}

/// Serve on `listener` until `shutdown` resolves
///
/// In-flight calls are allowed to finish after `shutdown`; bounding that wait
/// is up to the caller.
pub async fn run<F>(app: Application, listener: TcpListener, shutdown: F) -> Result<(), ServerError>
where
    F: Future<Output = ()>,
{
    let interceptor = AuthInterceptor::new(
        Arc::clone(&app.tokens),
        Arc::clone(&app.authorizer),
        method_policy(),
    );

    let library = LibraryServiceServer::new(LibraryHandler::new(
        Arc::clone(&app.catalog),
        Arc::clone(&app.cursor),
        app.limits,
    ));
    let auth = AuthServiceServer::new(AuthHandler::new(
        Arc::clone(&app.users),
        Arc::clone(&app.tokens),
        Arc::clone(&app.authorizer),
    ));

    let (mut health, health_service) = tonic_health::server::health_reporter();
    health
        .set_serving::<LibraryServiceServer<LibraryHandler>>()
        .await;
    health.set_serving::<AuthServiceServer<AuthHandler>>().await;

    let reflection = tonic_reflection::server::Builder::configure()
        .register_encoded_file_descriptor_set(FILE_DESCRIPTOR_SET)
        .register_encoded_file_descriptor_set(tonic_health::pb::FILE_DESCRIPTOR_SET)
        .build_v1()?;

    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "gRPC server listening");
    }

    Server::builder()
        .timeout(app.request_timeout)
        .layer(AuthLayer::new(interceptor))
        .add_service(health_service)
        .add_service(reflection)
        .add_service(library)
        .add_service(auth)
        .serve_with_incoming_shutdown(TcpListenerStream::new(listener), shutdown)
        .await?;

    info!("gRPC server stopped");
    Ok(())
}
