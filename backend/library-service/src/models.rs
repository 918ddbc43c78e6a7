//! Domain records handled by the catalogue and user stores

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Domain spellings of the media type
pub mod media_type {
    pub const MOVIE: &str = "movie";
    pub const SERIES: &str = "series";
    /// Legacy spelling of [`SERIES`]
    pub const TV_SHOW: &str = "tv_show";
    pub const MUSIC: &str = "music";
}

/// Scan interval applied when a library is created without one (1 hour)
pub const DEFAULT_SCAN_INTERVAL_SECS: i64 = 3600;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Library {
    pub id: Uuid,
    pub name: String,
    pub path: String,
    pub media_type: String,
    pub enabled: bool,
    pub scan_interval_seconds: i64,
    pub last_scan_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLibrary {
    pub name: String,
    pub path: String,
    pub media_type: String,
    pub enabled: bool,
    pub scan_interval_seconds: i64,
}

/// Fields to overwrite; `None` leaves the stored value alone
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LibraryUpdate {
    pub name: Option<String>,
    pub path: Option<String>,
    pub enabled: Option<bool>,
    pub scan_interval_seconds: Option<i64>,
}

impl LibraryUpdate {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    pub fn apply(&self, library: &mut Library) {
        if let Some(name) = &self.name {
            library.name = name.clone();
        }
        if let Some(path) = &self.path {
            library.path = path.clone();
        }
        if let Some(enabled) = self.enabled {
            library.enabled = enabled;
        }
        if let Some(seconds) = self.scan_interval_seconds {
            library.scan_interval_seconds = seconds;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Episode {
    pub id: Uuid,
    pub season_number: i32,
    pub episode_number: i32,
    pub title: String,
    pub file_path: String,
    pub runtime_minutes: i32,
    /// Stored as received; parsed on the way out
    pub air_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Media {
    pub id: Uuid,
    pub library_id: Uuid,
    pub title: String,
    pub media_type: String,
    pub file_path: String,
    pub file_size_bytes: i64,
    pub runtime_minutes: i32,
    pub resolution: String,
    pub video_codec: String,
    pub bitrate: i64,
    /// Stored as received; parsed on the way out
    pub release_date: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub episodes: Vec<Episode>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaUpdate {
    pub title: Option<String>,
    pub resolution: Option<String>,
    pub video_codec: Option<String>,
    pub bitrate: Option<i64>,
    pub release_date: Option<String>,
}

impl MediaUpdate {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    pub fn apply(&self, media: &mut Media) {
        if let Some(title) = &self.title {
            media.title = title.clone();
        }
        if let Some(resolution) = &self.resolution {
            media.resolution = resolution.clone();
        }
        if let Some(codec) = &self.video_codec {
            media.video_codec = codec.clone();
        }
        if let Some(bitrate) = self.bitrate {
            media.bitrate = bitrate;
        }
        if let Some(date) = &self.release_date {
            media.release_date = Some(date.clone());
        }
    }
}

/// Media listing and search parameters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaQuery {
    pub library_id: Option<Uuid>,
    /// Domain media type; `None` matches every type
    pub media_type: Option<String>,
    /// Case-insensitive title substring
    pub search: Option<String>,
    pub offset: u64,
    pub limit: u64,
}

/// One page of results plus the (best-effort) total
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListPage<T> {
    pub items: Vec<T>,
    pub total: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    Started,
    /// A scan for this library is still running
    AlreadyRunning,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub roles: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub roles: Vec<String>,
}

/// Series-aware media-type comparison (`tv_show` equals `series`)
pub fn same_media_type(a: &str, b: &str) -> bool {
    fn canonical(value: &str) -> &str {
        match value {
            media_type::TV_SHOW => media_type::SERIES,
            other => other,
        }
    }
    canonical(a) == canonical(b)
}
