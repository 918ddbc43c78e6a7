//! PostgreSQL adapters
//!
//! Schema is managed outside this service; `sql/schema.sql` holds the
//! reference DDL. Queries are checked at runtime, not compile time.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use error_types::{ErrorContext, ServiceError, ServiceResult};
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::{debug, error, info};
use uuid::Uuid;

use super::{CatalogService, ScanTracker, UserStore};
use crate::models::{
    media_type, Episode, Library, LibraryUpdate, ListPage, Media, MediaQuery, MediaUpdate,
    NewLibrary, NewUser, ScanOutcome, User,
};

const UNIQUE_VIOLATION: &str = "23505";

const LIBRARY_COLUMNS: &str = "id, name, path, media_type, enabled, scan_interval_seconds, \
     last_scan_at, created_at, updated_at";

const MEDIA_COLUMNS: &str = "m.id, m.library_id, m.title, m.media_type, m.file_path, \
     m.file_size_bytes, m.runtime_minutes, m.resolution, m.video_codec, m.bitrate, \
     m.release_date, m.created_at, m.updated_at";

#[derive(Debug, sqlx::FromRow)]
struct LibraryRow {
    id: Uuid,
    name: String,
    path: String,
    media_type: String,
    enabled: bool,
    scan_interval_seconds: i64,
    last_scan_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<LibraryRow> for Library {
    fn from(row: LibraryRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            path: row.path,
            media_type: row.media_type,
            enabled: row.enabled,
            scan_interval_seconds: row.scan_interval_seconds,
            last_scan_at: row.last_scan_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct MediaRow {
    id: Uuid,
    library_id: Uuid,
    title: String,
    media_type: String,
    file_path: String,
    file_size_bytes: i64,
    runtime_minutes: i32,
    resolution: String,
    video_codec: String,
    bitrate: i64,
    release_date: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl MediaRow {
    fn into_media(self, episodes: Vec<Episode>) -> Media {
        Media {
            id: self.id,
            library_id: self.library_id,
            title: self.title,
            media_type: self.media_type,
            file_path: self.file_path,
            file_size_bytes: self.file_size_bytes,
            runtime_minutes: self.runtime_minutes,
            resolution: self.resolution,
            video_codec: self.video_codec,
            bitrate: self.bitrate,
            release_date: self.release_date,
            created_at: self.created_at,
            updated_at: self.updated_at,
            episodes,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct EpisodeRow {
    id: Uuid,
    media_id: Uuid,
    season_number: i32,
    episode_number: i32,
    title: String,
    file_path: String,
    runtime_minutes: i32,
    air_date: Option<String>,
}

impl From<EpisodeRow> for Episode {
    fn from(row: EpisodeRow) -> Self {
        Self {
            id: row.id,
            season_number: row.season_number,
            episode_number: row.episode_number,
            title: row.title,
            file_path: row.file_path,
            runtime_minutes: row.runtime_minutes,
            air_date: row.air_date,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    username: String,
    email: String,
    password_hash: String,
    roles: Vec<String>,
    created_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            username: row.username,
            email: row.email,
            password_hash: row.password_hash,
            roles: row.roles,
            created_at: row.created_at,
        }
    }
}

/// Map a driver error, turning unique violations into `Conflict`
fn db_error(err: sqlx::Error, conflict: &'static str) -> ServiceError {
    if let sqlx::Error::Database(db) = &err {
        if db.code().as_deref() == Some(UNIQUE_VIOLATION) {
            return ServiceError::conflict(conflict);
        }
    }
    ServiceError::internal(err)
}

fn internal(err: sqlx::Error) -> ServiceError {
    ServiceError::internal(err)
}

/// Stored spellings that match a domain media type
fn type_spellings(kind: &str) -> Vec<String> {
    match kind {
        media_type::SERIES | media_type::TV_SHOW => {
            vec![media_type::SERIES.to_string(), media_type::TV_SHOW.to_string()]
        }
        other => vec![other.to_string()],
    }
}

#[derive(Clone)]
pub struct PgCatalog {
    pool: PgPool,
    scans: ScanTracker,
}

impl PgCatalog {
    pub fn new(pool: PgPool, scans: ScanTracker) -> Self {
        Self { pool, scans }
    }

    async fn episodes_for(&self, media_ids: &[Uuid]) -> ServiceResult<HashMap<Uuid, Vec<Episode>>> {
        if media_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows = sqlx::query_as::<_, EpisodeRow>(
            r#"
            SELECT id, media_id, season_number, episode_number, title, file_path,
                   runtime_minutes, air_date
            FROM episodes
            WHERE media_id = ANY($1)
            ORDER BY season_number, episode_number
            "#,
        )
        .bind(media_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(internal)?;

        let mut grouped: HashMap<Uuid, Vec<Episode>> = HashMap::new();
        for row in rows {
            grouped.entry(row.media_id).or_default().push(row.into());
        }
        Ok(grouped)
    }

    async fn fetch_media_row(&self, id: Uuid) -> ServiceResult<MediaRow> {
        sqlx::query_as::<_, MediaRow>(&format!(
            "SELECT {MEDIA_COLUMNS} FROM media m \
             JOIN libraries l ON l.id = m.library_id \
             WHERE m.id = $1 AND m.deleted_at IS NULL AND l.deleted_at IS NULL"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(internal)?
        .ok_or_else(|| ServiceError::not_found("media", id.to_string()))
    }

    async fn with_episodes(&self, row: MediaRow) -> ServiceResult<Media> {
        let mut episodes = self.episodes_for(&[row.id]).await?;
        let own = episodes.remove(&row.id).unwrap_or_default();
        Ok(row.into_media(own))
    }

    fn push_media_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &MediaQuery) {
        builder.push(
            " FROM media m JOIN libraries l ON l.id = m.library_id \
              WHERE m.deleted_at IS NULL AND l.deleted_at IS NULL",
        );
        if let Some(library_id) = query.library_id {
            builder.push(" AND m.library_id = ").push_bind(library_id);
        }
        if let Some(kind) = &query.media_type {
            builder
                .push(" AND m.media_type = ANY(")
                .push_bind(type_spellings(kind))
                .push(")");
        }
        if let Some(search) = &query.search {
            builder
                .push(" AND m.title ILIKE ")
                .push_bind(format!("%{}%", escape_like(search)));
        }
    }
}

fn escape_like(raw: &str) -> String {
    raw.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

#[async_trait]
impl CatalogService for PgCatalog {
    async fn create_library(&self, new: NewLibrary) -> ServiceResult<Library> {
        let row = sqlx::query_as::<_, LibraryRow>(&format!(
            "INSERT INTO libraries (id, name, path, media_type, enabled, scan_interval_seconds) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {LIBRARY_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&new.name)
        .bind(&new.path)
        .bind(&new.media_type)
        .bind(new.enabled)
        .bind(new.scan_interval_seconds)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error(e, "a library with this name or path already exists"))?;

        Ok(row.into())
    }

    async fn get_library(&self, id: Uuid) -> ServiceResult<Library> {
        sqlx::query_as::<_, LibraryRow>(&format!(
            "SELECT {LIBRARY_COLUMNS} FROM libraries WHERE id = $1 AND deleted_at IS NULL"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(internal)?
        .map(Library::from)
        .ok_or_else(|| ServiceError::not_found("library", id.to_string()))
    }

    async fn list_libraries(&self) -> ServiceResult<Vec<Library>> {
        let rows = sqlx::query_as::<_, LibraryRow>(&format!(
            "SELECT {LIBRARY_COLUMNS} FROM libraries WHERE deleted_at IS NULL \
             ORDER BY created_at, id"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(internal)?;

        Ok(rows.into_iter().map(Library::from).collect())
    }

    async fn update_library(&self, id: Uuid, update: LibraryUpdate) -> ServiceResult<Library> {
        // `None` keeps the stored column
        sqlx::query_as::<_, LibraryRow>(&format!(
            "UPDATE libraries SET name = COALESCE($2, name), path = COALESCE($3, path), \
             enabled = COALESCE($4, enabled), \
             scan_interval_seconds = COALESCE($5, scan_interval_seconds), updated_at = now() \
             WHERE id = $1 AND deleted_at IS NULL RETURNING {LIBRARY_COLUMNS}"
        ))
        .bind(id)
        .bind(update.name)
        .bind(update.path)
        .bind(update.enabled)
        .bind(update.scan_interval_seconds)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error(e, "a library with this name or path already exists"))?
        .map(Library::from)
        .ok_or_else(|| ServiceError::not_found("library", id.to_string()))
    }

    async fn delete_library(&self, id: Uuid) -> ServiceResult<()> {
        let result = sqlx::query(
            "UPDATE libraries SET deleted_at = now(), updated_at = now() \
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(internal)?;

        if result.rows_affected() == 0 {
            return Err(ServiceError::not_found("library", id.to_string()));
        }
        Ok(())
    }

    async fn scan_library(&self, id: Uuid, full_scan: bool) -> ServiceResult<ScanOutcome> {
        self.get_library(id).await?;

        let Some(guard) = self.scans.try_begin(id) else {
            debug!(library_id = %id, "Scan already running");
            return Ok(ScanOutcome::AlreadyRunning);
        };

        info!(library_id = %id, full_scan, "Library scan started");
        let pool = self.pool.clone();
        tokio::spawn(async move {
            let _guard = guard;
            let result = sqlx::query(
                "UPDATE libraries SET last_scan_at = now(), updated_at = now() WHERE id = $1",
            )
            .bind(id)
            .execute(&pool)
            .await;

            match result {
                Ok(_) => info!(library_id = %id, "Library scan completed"),
                Err(e) => error!(library_id = %id, error = %e, "Failed to record scan completion"),
            }
        });
        Ok(ScanOutcome::Started)
    }

    async fn get_media(&self, id: Uuid) -> ServiceResult<Media> {
        let row = self.fetch_media_row(id).await?;
        self.with_episodes(row).await
    }

    async fn list_media(&self, query: MediaQuery) -> ServiceResult<ListPage<Media>> {
        if let Some(library_id) = query.library_id {
            self.get_library(library_id).await?;
        }

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*)");
        Self::push_media_filters(&mut count, &query);
        let total: i64 = count
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(internal)?;

        let mut select = QueryBuilder::<Postgres>::new(format!("SELECT {MEDIA_COLUMNS}"));
        Self::push_media_filters(&mut select, &query);
        select
            .push(" ORDER BY m.title, m.id LIMIT ")
            .push_bind(i64::try_from(query.limit).unwrap_or(i64::MAX))
            .push(" OFFSET ")
            .push_bind(i64::try_from(query.offset).unwrap_or(i64::MAX));
        let rows: Vec<MediaRow> = select
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(internal)?;

        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let mut episodes = self.episodes_for(&ids).await?;
        let items = rows
            .into_iter()
            .map(|row| {
                let own = episodes.remove(&row.id).unwrap_or_default();
                row.into_media(own)
            })
            .collect();

        Ok(ListPage {
            items,
            total: u64::try_from(total).unwrap_or(0),
        })
    }

    async fn update_media(&self, id: Uuid, update: MediaUpdate) -> ServiceResult<Media> {
        let row = sqlx::query_as::<_, MediaRow>(&format!(
            "UPDATE media m SET title = COALESCE($2, m.title), \
             resolution = COALESCE($3, m.resolution), \
             video_codec = COALESCE($4, m.video_codec), bitrate = COALESCE($5, m.bitrate), \
             release_date = COALESCE($6, m.release_date), updated_at = now() \
             FROM libraries l \
             WHERE m.id = $1 AND l.id = m.library_id \
               AND m.deleted_at IS NULL AND l.deleted_at IS NULL \
             RETURNING {MEDIA_COLUMNS}"
        ))
        .bind(id)
        .bind(update.title)
        .bind(update.resolution)
        .bind(update.video_codec)
        .bind(update.bitrate)
        .bind(update.release_date)
        .fetch_optional(&self.pool)
        .await
        .map_err(internal)?
        .ok_or_else(|| ServiceError::not_found("media", id.to_string()))?;

        self.with_episodes(row).await
    }

    async fn delete_media(&self, id: Uuid) -> ServiceResult<()> {
        let result = sqlx::query(
            "UPDATE media SET deleted_at = now(), updated_at = now() \
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(internal)?;

        if result.rows_affected() == 0 {
            return Err(ServiceError::not_found("media", id.to_string()));
        }
        Ok(())
    }
}

const USER_COLUMNS: &str = "id, username, email, password_hash, roles, created_at";

/// Advisory lock key held while the first account is created
const BOOTSTRAP_LOCK_KEY: i64 = 0x6d65_6469_616c_6962;

#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn count_users(&self) -> ServiceResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await
            .map_err(internal)?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn create_user(&self, user: NewUser) -> ServiceResult<User> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "INSERT INTO users (id, username, email, password_hash, roles) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {USER_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.roles)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error(e, "username or email already exists"))?;

        Ok(row.into())
    }

    async fn create_first_user(&self, user: NewUser) -> ServiceResult<User> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to open bootstrap transaction")?;

        // Serializes bootstraps; released on commit or rollback
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(BOOTSTRAP_LOCK_KEY)
            .execute(&mut *tx)
            .await
            .context("failed to take bootstrap lock")?;

        let existing: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&mut *tx)
            .await
            .map_err(internal)?;
        if existing > 0 {
            return Err(ServiceError::conflict("initial user already exists"));
        }

        let row = sqlx::query_as::<_, UserRow>(&format!(
            "INSERT INTO users (id, username, email, password_hash, roles) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {USER_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.roles)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| db_error(e, "username or email already exists"))?;

        tx.commit()
            .await
            .context("failed to commit initial user")?;
        Ok(row.into())
    }

    async fn find_by_username(&self, username: &str) -> ServiceResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .map_err(internal)?;
        Ok(row.map(User::from))
    }

    async fn find_by_id(&self, id: Uuid) -> ServiceResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(internal)?;
        Ok(row.map(User::from))
    }
}
