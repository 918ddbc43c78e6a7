//! In-process adapters
//!
//! Used when no database URL is configured, and by tests. State lives behind
//! `tokio::sync::RwLock`; no lock is held across an await on another service.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use error_types::{ServiceError, ServiceResult};
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use super::{CatalogService, ScanTracker, UserStore};
use crate::models::{
    same_media_type, Library, LibraryUpdate, ListPage, Media, MediaQuery, MediaUpdate, NewLibrary,
    NewUser, ScanOutcome, User,
};

struct Row<T> {
    seq: u64,
    deleted_at: Option<DateTime<Utc>>,
    value: T,
}

impl<T> Row<T> {
    fn live(&self) -> Option<&T> {
        self.deleted_at.is_none().then_some(&self.value)
    }
}

#[derive(Default)]
struct CatalogState {
    next_seq: u64,
    libraries: HashMap<Uuid, Row<Library>>,
    media: HashMap<Uuid, Row<Media>>,
}

impl CatalogState {
    fn seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    fn live_library(&self, id: Uuid) -> ServiceResult<&Library> {
        self.libraries
            .get(&id)
            .and_then(Row::live)
            .ok_or_else(|| ServiceError::not_found("library", id.to_string()))
    }

    fn live_media(&self, id: Uuid) -> ServiceResult<&Media> {
        self.media
            .get(&id)
            .and_then(Row::live)
            .filter(|m| self.live_library(m.library_id).is_ok())
            .ok_or_else(|| ServiceError::not_found("media", id.to_string()))
    }

    /// Conflict when another live library already uses `name` or `path`
    fn check_unique(&self, exclude: Option<Uuid>, name: &str, path: &str) -> ServiceResult<()> {
        for row in self.libraries.values() {
            let Some(other) = row.live() else { continue };
            if Some(other.id) == exclude {
                continue;
            }
            if other.name == name {
                return Err(ServiceError::conflict("a library with this name already exists"));
            }
            if other.path == path {
                return Err(ServiceError::conflict("a library with this path already exists"));
            }
        }
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct MemoryCatalog {
    state: Arc<RwLock<CatalogState>>,
    scans: ScanTracker,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tracker(scans: ScanTracker) -> Self {
        Self {
            state: Arc::default(),
            scans,
        }
    }

    #[cfg(test)]
    pub fn scans(&self) -> &ScanTracker {
        &self.scans
    }

    /// Add a media record directly (import jobs, fixtures)
    pub async fn insert_media(&self, media: Media) -> ServiceResult<Media> {
        let mut state = self.state.write().await;
        state.live_library(media.library_id)?;
        let seq = state.seq();
        state.media.insert(
            media.id,
            Row {
                seq,
                deleted_at: None,
                value: media.clone(),
            },
        );
        Ok(media)
    }

    async fn finish_scan(state: Arc<RwLock<CatalogState>>, id: Uuid) {
        let now = Utc::now();
        let mut state = state.write().await;
        if let Some(row) = state.libraries.get_mut(&id) {
            row.value.last_scan_at = Some(now);
            row.value.updated_at = now;
        }
        info!(library_id = %id, "Library scan completed");
    }
}

#[async_trait]
impl CatalogService for MemoryCatalog {
    async fn create_library(&self, new: NewLibrary) -> ServiceResult<Library> {
        let mut state = self.state.write().await;
        state.check_unique(None, &new.name, &new.path)?;

        let now = Utc::now();
        let library = Library {
            id: Uuid::new_v4(),
            name: new.name,
            path: new.path,
            media_type: new.media_type,
            enabled: new.enabled,
            scan_interval_seconds: new.scan_interval_seconds,
            last_scan_at: None,
            created_at: now,
            updated_at: now,
        };
        let seq = state.seq();
        state.libraries.insert(
            library.id,
            Row {
                seq,
                deleted_at: None,
                value: library.clone(),
            },
        );
        Ok(library)
    }

    async fn get_library(&self, id: Uuid) -> ServiceResult<Library> {
        let state = self.state.read().await;
        state.live_library(id).cloned()
    }

    async fn list_libraries(&self) -> ServiceResult<Vec<Library>> {
        let state = self.state.read().await;
        let mut rows: Vec<&Row<Library>> = state
            .libraries
            .values()
            .filter(|row| row.deleted_at.is_none())
            .collect();
        rows.sort_by_key(|row| row.seq);
        Ok(rows.into_iter().map(|row| row.value.clone()).collect())
    }

    async fn update_library(&self, id: Uuid, update: LibraryUpdate) -> ServiceResult<Library> {
        let mut state = self.state.write().await;
        let mut library = state.live_library(id)?.clone();
        update.apply(&mut library);
        state.check_unique(Some(id), &library.name, &library.path)?;

        library.updated_at = Utc::now();
        if let Some(row) = state.libraries.get_mut(&id) {
            row.value = library.clone();
        }
        Ok(library)
    }

    async fn delete_library(&self, id: Uuid) -> ServiceResult<()> {
        let mut state = self.state.write().await;
        state.live_library(id)?;
        if let Some(row) = state.libraries.get_mut(&id) {
            row.deleted_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn scan_library(&self, id: Uuid, full_scan: bool) -> ServiceResult<ScanOutcome> {
        self.state.read().await.live_library(id)?;

        let Some(guard) = self.scans.try_begin(id) else {
            debug!(library_id = %id, "Scan already running");
            return Ok(ScanOutcome::AlreadyRunning);
        };

        info!(library_id = %id, full_scan, "Library scan started");
        let state = self.state.clone();
        tokio::spawn(async move {
            let _guard = guard;
            Self::finish_scan(state, id).await;
        });
        Ok(ScanOutcome::Started)
    }

    async fn get_media(&self, id: Uuid) -> ServiceResult<Media> {
        let state = self.state.read().await;
        state.live_media(id).cloned()
    }

    async fn list_media(&self, query: MediaQuery) -> ServiceResult<ListPage<Media>> {
        let state = self.state.read().await;
        if let Some(library_id) = query.library_id {
            state.live_library(library_id)?;
        }

        let needle = query.search.as_deref().map(str::to_lowercase);
        let mut matches: Vec<&Media> = state
            .media
            .values()
            .filter_map(Row::live)
            .filter(|m| state.live_library(m.library_id).is_ok())
            .filter(|m| query.library_id.map_or(true, |id| m.library_id == id))
            .filter(|m| {
                query
                    .media_type
                    .as_deref()
                    .map_or(true, |t| same_media_type(&m.media_type, t))
            })
            .filter(|m| {
                needle
                    .as_deref()
                    .map_or(true, |n| m.title.to_lowercase().contains(n))
            })
            .collect();
        matches.sort_by(|a, b| a.title.cmp(&b.title).then(a.id.cmp(&b.id)));

        let total = matches.len() as u64;
        let items = matches
            .into_iter()
            .skip(usize::try_from(query.offset).unwrap_or(usize::MAX))
            .take(usize::try_from(query.limit).unwrap_or(usize::MAX))
            .cloned()
            .collect();
        Ok(ListPage { items, total })
    }

    async fn update_media(&self, id: Uuid, update: MediaUpdate) -> ServiceResult<Media> {
        let mut state = self.state.write().await;
        let mut media = state.live_media(id)?.clone();
        update.apply(&mut media);
        media.updated_at = Utc::now();
        if let Some(row) = state.media.get_mut(&id) {
            row.value = media.clone();
        }
        Ok(media)
    }

    async fn delete_media(&self, id: Uuid) -> ServiceResult<()> {
        let mut state = self.state.write().await;
        state.live_media(id)?;
        if let Some(row) = state.media.get_mut(&id) {
            row.deleted_at = Some(Utc::now());
        }
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct MemoryUserStore {
    users: Arc<RwLock<Vec<User>>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(users: &mut Vec<User>, new: NewUser) -> ServiceResult<User> {
        if users.iter().any(|u| u.username == new.username) {
            return Err(ServiceError::conflict("username already exists"));
        }
        if users.iter().any(|u| u.email == new.email) {
            return Err(ServiceError::conflict("email already exists"));
        }

        let user = User {
            id: Uuid::new_v4(),
            username: new.username,
            email: new.email,
            password_hash: new.password_hash,
            roles: new.roles,
            created_at: Utc::now(),
        };
        users.push(user.clone());
        Ok(user)
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn count_users(&self) -> ServiceResult<u64> {
        Ok(self.users.read().await.len() as u64)
    }

    async fn create_user(&self, user: NewUser) -> ServiceResult<User> {
        let mut users = self.users.write().await;
        Self::insert(&mut users, user)
    }

    async fn create_first_user(&self, user: NewUser) -> ServiceResult<User> {
        let mut users = self.users.write().await;
        if !users.is_empty() {
            return Err(ServiceError::conflict("initial user already exists"));
        }
        Self::insert(&mut users, user)
    }

    async fn find_by_username(&self, username: &str) -> ServiceResult<Option<User>> {
        let users = self.users.read().await;
        Ok(users.iter().find(|u| u.username == username).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> ServiceResult<Option<User>> {
        let users = self.users.read().await;
        Ok(users.iter().find(|u| u.id == id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::media_type;

    fn new_library(name: &str, path: &str) -> NewLibrary {
        NewLibrary {
            name: name.to_string(),
            path: path.to_string(),
            media_type: media_type::MOVIE.to_string(),
            enabled: true,
            scan_interval_seconds: 1800,
        }
    }

    fn media(library_id: Uuid, title: &str, kind: &str) -> Media {
        let now = Utc::now();
        Media {
            id: Uuid::new_v4(),
            library_id,
            title: title.to_string(),
            media_type: kind.to_string(),
            file_path: format!("/media/{title}.mkv"),
            file_size_bytes: 0,
            runtime_minutes: 90,
            resolution: String::new(),
            video_codec: String::new(),
            bitrate: 0,
            release_date: None,
            created_at: now,
            updated_at: now,
            episodes: vec![],
        }
    }

    #[tokio::test]
    async fn test_library_lifecycle() {
        let catalog = MemoryCatalog::new();
        let created = catalog.create_library(new_library("Movies", "/m")).await.unwrap();

        let fetched = catalog.get_library(created.id).await.unwrap();
        assert_eq!(fetched, created);

        let updated = catalog
            .update_library(
                created.id,
                LibraryUpdate {
                    name: Some("Films".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.name, "Films");
        assert_eq!(updated.path, "/m");

        catalog.delete_library(created.id).await.unwrap();
        let err = catalog.get_library(created.id).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(catalog.list_libraries().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_name_or_path_conflicts() {
        let catalog = MemoryCatalog::new();
        catalog.create_library(new_library("Movies", "/m")).await.unwrap();

        let err = catalog
            .create_library(new_library("Movies", "/other"))
            .await
            .unwrap_err();
        assert!(err.is_conflict());

        let err = catalog
            .create_library(new_library("Other", "/m"))
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_list_preserves_insertion_order() {
        let catalog = MemoryCatalog::new();
        for i in 0..5 {
            catalog
                .create_library(new_library(&format!("lib-{i}"), &format!("/lib/{i}")))
                .await
                .unwrap();
        }
        let names: Vec<_> = catalog
            .list_libraries()
            .await
            .unwrap()
            .into_iter()
            .map(|l| l.name)
            .collect();
        assert_eq!(names, ["lib-0", "lib-1", "lib-2", "lib-3", "lib-4"]);
    }

    #[tokio::test]
    async fn test_scan_conflict_while_running() {
        let scans = ScanTracker::new();
        let catalog = MemoryCatalog::with_tracker(scans.clone());
        let library = catalog.create_library(new_library("Movies", "/m")).await.unwrap();

        let _held = scans.try_begin(library.id).unwrap();
        assert_eq!(
            catalog.scan_library(library.id, false).await.unwrap(),
            ScanOutcome::AlreadyRunning
        );
    }

    #[tokio::test]
    async fn test_scan_marks_last_scan() {
        let catalog = MemoryCatalog::new();
        let library = catalog.create_library(new_library("Movies", "/m")).await.unwrap();

        assert_eq!(
            catalog.scan_library(library.id, true).await.unwrap(),
            ScanOutcome::Started
        );

        for _ in 0..100 {
            // Claimable again once the scan task has finished
            if catalog.scans().try_begin(library.id).is_some() {
                break;
            }
            tokio::task::yield_now().await;
        }
        let scanned = catalog.get_library(library.id).await.unwrap();
        assert!(scanned.last_scan_at.is_some());
    }

    #[tokio::test]
    async fn test_list_media_filters_and_pages() {
        let catalog = MemoryCatalog::new();
        let library = catalog.create_library(new_library("Mixed", "/x")).await.unwrap();
        for (title, kind) in [
            ("Alien", "movie"),
            ("Blade Runner", "movie"),
            ("Cosmos", "tv_show"),
            ("Dune", "movie"),
        ] {
            catalog.insert_media(media(library.id, title, kind)).await.unwrap();
        }

        let page = catalog
            .list_media(MediaQuery {
                library_id: Some(library.id),
                media_type: Some("movie".into()),
                offset: 1,
                limit: 1,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.items[0].title, "Blade Runner");

        let series = catalog
            .list_media(MediaQuery {
                media_type: Some("series".into()),
                limit: 10,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(series.total, 1);

        let search = catalog
            .list_media(MediaQuery {
                search: Some("RUNNER".into()),
                limit: 10,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(search.items.len(), 1);
    }

    #[tokio::test]
    async fn test_media_hidden_after_library_delete() {
        let catalog = MemoryCatalog::new();
        let library = catalog.create_library(new_library("Movies", "/m")).await.unwrap();
        let item = catalog
            .insert_media(media(library.id, "Alien", "movie"))
            .await
            .unwrap();

        catalog.delete_library(library.id).await.unwrap();
        assert!(catalog.get_media(item.id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_first_user_only_once() {
        let store = MemoryUserStore::new();
        let new = |name: &str| NewUser {
            username: name.to_string(),
            email: format!("{name}@example.com"),
            password_hash: "hash".into(),
            roles: vec!["admin".into()],
        };

        store.create_first_user(new("root")).await.unwrap();
        assert!(store.create_first_user(new("other")).await.unwrap_err().is_conflict());
        assert!(store.create_user(new("root")).await.unwrap_err().is_conflict());
        assert_eq!(store.count_users().await.unwrap(), 1);
        assert!(store.find_by_username("root").await.unwrap().is_some());
    }
}
