//! Authenticated request pipeline for gRPC services
//!
//! ## Core Components
//!
//! - **AuthLayer / AuthInterceptor**: verifies the bearer token, installs the
//!   caller identity, and checks RBAC for the method being called
//! - **MethodPolicy**: which methods are public, optional, or protected
//! - **CallerExt**: typed accessors for the caller inside handlers
//! - **BearerInterceptor**: attaches a token to outgoing client requests
//!
//! ## Server wiring
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use grpc_auth::{AuthInterceptor, AuthLayer, MethodPolicy};
//! use rbac::{Action, RbacEngine, Resource};
//!
//! # fn example(tokens: Arc<crypto_core::TokenManager>) {
//! let methods = MethodPolicy::new()
//!     .public("/medialib.auth.v1.AuthService/Login")
//!     .protected(
//!         "/medialib.library.v1.LibraryService/GetLibrary",
//!         Resource::Library,
//!         Action::Read,
//!     );
//! let layer = AuthLayer::new(AuthInterceptor::new(
//!     tokens,
//!     Arc::new(RbacEngine::builtin()),
//!     methods,
//! ));
//! // tonic::transport::Server::builder().layer(layer).add_service(...)
//! # }
//! ```
//!
//! ## Guarantees
//!
//! - No token = `Status::unauthenticated`
//! - Invalid token = `Status::unauthenticated("invalid token")`, whatever the cause
//! - Missing permission = `Status::permission_denied`
//! - Methods absent from the policy are denied

mod client;
mod extensions;
mod identity;
pub mod methods;
mod server;

pub use client::BearerInterceptor;
pub use extensions::CallerExt;
pub use identity::CallerIdentity;
pub use methods::{MethodAccess, MethodPolicy};
pub use server::{AuthInterceptor, AuthLayer, AuthService};

pub use tonic::Status;
