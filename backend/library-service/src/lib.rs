/// Library Service
///
/// Media library catalogue over gRPC with bearer-token authentication and
/// role-based access control.
///
/// ## Modules
///
/// - `config`: Layered configuration
/// - `converter`: Wire ↔ domain mapping
/// - `files`: Media file removal
/// - `grpc`: Library and auth handlers, method policy
/// - `models`: Domain records
/// - `password`: Argon2id hashing
/// - `server`: gRPC server assembly
/// - `service`: Catalogue and user store contracts with their adapters
pub mod config;
pub mod converter;
pub mod files;
pub mod grpc;
pub mod models;
pub mod password;
pub mod server;
pub mod service;

// Re-export commonly used types
pub use config::Settings;
pub use server::{run, Application, ServerError};
