//! Service contracts behind the gRPC handlers
//!
//! Handlers only talk to these traits. Two adapters implement them:
//! [`memory`] for development and tests, [`postgres`] for deployments.
//! Both report a scan already in flight through the shared [`ScanTracker`].

use async_trait::async_trait;
use error_types::ServiceResult;
use uuid::Uuid;

use crate::models::{
    Library, LibraryUpdate, ListPage, Media, MediaQuery, MediaUpdate, NewLibrary, NewUser,
    ScanOutcome, User,
};

pub mod memory;
pub mod postgres;
mod scan;

pub use memory::{MemoryCatalog, MemoryUserStore};
pub use postgres::{PgCatalog, PgUserStore};
pub use scan::{ScanGuard, ScanTracker};

/// Library and media catalogue
///
/// Deleted libraries and media are invisible to every read.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CatalogService: Send + Sync {
    /// Conflict when the name or path is already used
    async fn create_library(&self, library: NewLibrary) -> ServiceResult<Library>;

    async fn get_library(&self, id: Uuid) -> ServiceResult<Library>;

    /// Every library, ordered by creation time
    async fn list_libraries(&self) -> ServiceResult<Vec<Library>>;

    async fn update_library(&self, id: Uuid, update: LibraryUpdate) -> ServiceResult<Library>;

    /// Soft delete
    async fn delete_library(&self, id: Uuid) -> ServiceResult<()>;

    /// Start a scan unless one is already running for this library
    async fn scan_library(&self, id: Uuid, full_scan: bool) -> ServiceResult<ScanOutcome>;

    async fn get_media(&self, id: Uuid) -> ServiceResult<Media>;

    /// Filtered, paginated media; ordered by title then id
    async fn list_media(&self, query: MediaQuery) -> ServiceResult<ListPage<Media>>;

    async fn update_media(&self, id: Uuid, update: MediaUpdate) -> ServiceResult<Media>;

    /// Logical delete of the record only; files on disk are untouched
    async fn delete_media(&self, id: Uuid) -> ServiceResult<()>;
}

/// Account storage for the auth endpoints
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn count_users(&self) -> ServiceResult<u64>;

    /// Conflict when the username or email is taken
    async fn create_user(&self, user: NewUser) -> ServiceResult<User>;

    /// Create the first account; Conflict if any account already exists
    async fn create_first_user(&self, user: NewUser) -> ServiceResult<User>;

    async fn find_by_username(&self, username: &str) -> ServiceResult<Option<User>>;

    async fn find_by_id(&self, id: Uuid) -> ServiceResult<Option<User>>;
}
