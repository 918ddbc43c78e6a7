//! gRPC surface of the library service
//!
//! - [`LibraryHandler`]: `medialib.library.v1.LibraryService`
//! - [`AuthHandler`]: `medialib.auth.v1.AuthService`
//! - [`method_policy`]: how the auth layer guards each method path

use grpc_auth::MethodPolicy;
use rbac::{Action, Resource};

pub mod auth;
pub mod library;

pub use auth::AuthHandler;
pub use library::LibraryHandler;

// Import generated protobuf types
pub mod pb {
    pub mod library {
        tonic::include_proto!("medialib.library.v1");
    }

    pub mod auth {
        tonic::include_proto!("medialib.auth.v1");
    }
}

/// Descriptor set served by gRPC reflection
pub const FILE_DESCRIPTOR_SET: &[u8] = tonic::include_file_descriptor_set!("medialib_descriptor");

pub const LIBRARY_SERVICE: &str = "medialib.library.v1.LibraryService";
pub const AUTH_SERVICE: &str = "medialib.auth.v1.AuthService";

fn library_method(name: &str) -> String {
    format!("/{LIBRARY_SERVICE}/{name}")
}

fn auth_method(name: &str) -> String {
    format!("/{AUTH_SERVICE}/{name}")
}

/// Method table for [`grpc_auth::AuthLayer`]
///
/// Anything not listed here is denied after authentication.
pub fn method_policy() -> MethodPolicy {
    use Action::{Delete, Read, Write};
    use Resource::{Library, Media};

    MethodPolicy::new()
        // Auth endpoints
        .public(auth_method("Login"))
        .public(auth_method("RefreshToken"))
        .optional(auth_method("CreateUser"))
        // Infrastructure
        .public("/grpc.health.v1.Health/Check")
        .public("/grpc.health.v1.Health/Watch")
        .public_prefix("/grpc.reflection.")
        // Libraries
        .protected(library_method("CreateLibrary"), Library, Write)
        .protected(library_method("GetLibrary"), Library, Read)
        .protected(library_method("ListLibraries"), Library, Read)
        .protected(library_method("UpdateLibrary"), Library, Write)
        .protected(library_method("DeleteLibrary"), Library, Delete)
        .protected(library_method("ScanLibrary"), Library, Write)
        // Media
        .protected(library_method("GetMedia"), Media, Read)
        .protected(library_method("ListMedia"), Media, Read)
        .protected(library_method("SearchMedia"), Media, Read)
        .protected(library_method("UpdateMedia"), Media, Write)
        .protected(library_method("DeleteMedia"), Media, Delete)
        .protected(library_method("StreamLibraryMedia"), Media, Read)
        // Metadata
        .protected(library_method("GetMetadata"), Media, Read)
        .protected(library_method("UpdateMetadata"), Media, Write)
        .protected(library_method("RefreshMetadata"), Media, Write)
}
