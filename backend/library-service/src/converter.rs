//! Wire ↔ domain conversion
//!
//! Pure functions only. Notable rules:
//! - `MEDIA_TYPE_UNSPECIFIED` becomes `movie` on the way in; unknown domain
//!   types become `MEDIA_TYPE_UNSPECIFIED` on the way out.
//! - Dates are tried as `YYYY-MM-DD`, RFC 3339 with `Z`, then RFC 3339 with an
//!   offset. Anything else is sent as an absent timestamp.
//! - Wire `runtime_seconds` = domain minutes × 60; wire `scan_interval_minutes`
//!   = domain seconds ÷ 60.
//! - Updates: with a mask, only the listed paths apply. Without one, every
//!   non-empty / non-zero field applies and booleans always apply.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use prost_types::{FieldMask, Timestamp};
use thiserror::Error;

use crate::grpc::pb::library as pb;
use crate::models::{
    media_type, Episode, Library, LibraryUpdate, Media, MediaUpdate, NewLibrary,
    DEFAULT_SCAN_INTERVAL_SECS,
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConvertError {
    #[error("unknown update_mask path: {0}")]
    UnknownMaskPath(String),

    #[error("{0} must not be negative")]
    Negative(&'static str),
}

impl From<ConvertError> for tonic::Status {
    fn from(err: ConvertError) -> Self {
        tonic::Status::invalid_argument(err.to_string())
    }
}

// ============================================================================
// Media type
// ============================================================================

/// Wire enum value to domain spelling; unspecified or unknown values map to `movie`
pub fn media_type_from_wire(value: i32) -> &'static str {
    match pb::MediaType::try_from(value).unwrap_or(pb::MediaType::Unspecified) {
        pb::MediaType::Movie | pb::MediaType::Unspecified => media_type::MOVIE,
        pb::MediaType::Series => media_type::SERIES,
        pb::MediaType::Music => media_type::MUSIC,
    }
}

pub fn media_type_to_wire(value: &str) -> pb::MediaType {
    match value {
        media_type::MOVIE => pb::MediaType::Movie,
        media_type::SERIES | media_type::TV_SHOW => pb::MediaType::Series,
        media_type::MUSIC => pb::MediaType::Music,
        _ => pb::MediaType::Unspecified,
    }
}

/// Filter form: `UNSPECIFIED` means "any type"
pub fn media_type_filter(value: i32) -> Option<&'static str> {
    match pb::MediaType::try_from(value) {
        Ok(pb::MediaType::Unspecified) | Err(_) => None,
        Ok(_) => Some(media_type_from_wire(value)),
    }
}

// ============================================================================
// Time
// ============================================================================

pub fn timestamp(at: DateTime<Utc>) -> Timestamp {
    Timestamp {
        seconds: at.timestamp(),
        nanos: at.timestamp_subsec_nanos() as i32,
    }
}

/// Parse a date string; `None` when no accepted format matches
pub fn parse_date(raw: &str) -> Option<Timestamp> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|dt| timestamp(dt.and_utc()));
    }

    if let Some(naive) = raw.strip_suffix('Z') {
        for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S"] {
            if let Ok(dt) = NaiveDateTime::parse_from_str(naive, format) {
                return Some(timestamp(dt.and_utc()));
            }
        }
    }

    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| timestamp(dt.with_timezone(&Utc)))
}

fn saturating_i32(value: i64) -> i32 {
    value.clamp(i32::MIN as i64, i32::MAX as i64) as i32
}

// ============================================================================
// Library
// ============================================================================

pub fn library_to_wire(library: &Library) -> pb::Library {
    pb::Library {
        id: library.id.to_string(),
        name: library.name.clone(),
        path: library.path.clone(),
        r#type: media_type_to_wire(&library.media_type) as i32,
        auto_scan: library.enabled,
        scan_interval_minutes: saturating_i32(library.scan_interval_seconds / 60),
        last_scan_at: library.last_scan_at.map(timestamp),
        created_at: Some(timestamp(library.created_at)),
        updated_at: Some(timestamp(library.updated_at)),
    }
}

pub fn new_library_from_wire(req: &pb::CreateLibraryRequest) -> Result<NewLibrary, ConvertError> {
    if req.scan_interval_minutes < 0 {
        return Err(ConvertError::Negative("scan_interval_minutes"));
    }
    let scan_interval_seconds = match req.scan_interval_minutes {
        0 => DEFAULT_SCAN_INTERVAL_SECS,
        minutes => i64::from(minutes) * 60,
    };

    Ok(NewLibrary {
        name: req.name.trim().to_string(),
        path: req.path.trim().to_string(),
        media_type: media_type_from_wire(req.r#type).to_string(),
        enabled: req.auto_scan,
        scan_interval_seconds,
    })
}

/// Which fields of an update request are authoritative
struct Mask<'a> {
    paths: Option<&'a [String]>,
}

impl<'a> Mask<'a> {
    fn new(mask: Option<&'a FieldMask>, known: &[&str]) -> Result<Self, ConvertError> {
        // An empty mask is treated as no mask
        let paths = mask.map(|m| m.paths.as_slice()).filter(|p| !p.is_empty());
        if let Some(paths) = paths {
            if let Some(unknown) = paths.iter().find(|p| !known.contains(&p.as_str())) {
                return Err(ConvertError::UnknownMaskPath(unknown.clone()));
            }
        }
        Ok(Self { paths })
    }

    /// `present` is the "non-empty / non-zero" test used without a mask
    fn applies(&self, path: &str, present: bool) -> bool {
        match self.paths {
            Some(paths) => paths.iter().any(|p| p == path),
            None => present,
        }
    }
}

const LIBRARY_MASK_PATHS: &[&str] = &["name", "path", "auto_scan", "scan_interval_minutes"];

pub fn library_update_from_wire(
    req: &pb::UpdateLibraryRequest,
) -> Result<LibraryUpdate, ConvertError> {
    let mask = Mask::new(req.update_mask.as_ref(), LIBRARY_MASK_PATHS)?;

    if mask.applies("scan_interval_minutes", req.scan_interval_minutes != 0)
        && req.scan_interval_minutes < 0
    {
        return Err(ConvertError::Negative("scan_interval_minutes"));
    }

    Ok(LibraryUpdate {
        name: mask
            .applies("name", !req.name.is_empty())
            .then(|| req.name.trim().to_string()),
        path: mask
            .applies("path", !req.path.is_empty())
            .then(|| req.path.trim().to_string()),
        enabled: mask.applies("auto_scan", true).then_some(req.auto_scan),
        scan_interval_seconds: mask
            .applies("scan_interval_minutes", req.scan_interval_minutes != 0)
            .then(|| i64::from(req.scan_interval_minutes) * 60),
    })
}

// ============================================================================
// Media
// ============================================================================

fn episode_to_wire(episode: &Episode) -> pb::Episode {
    pb::Episode {
        id: episode.id.to_string(),
        season_number: episode.season_number,
        episode_number: episode.episode_number,
        title: episode.title.clone(),
        file_path: episode.file_path.clone(),
        runtime_seconds: episode.runtime_minutes.saturating_mul(60),
        air_date: episode.air_date.as_deref().and_then(parse_date),
    }
}

pub fn media_to_wire(media: &Media) -> pb::Media {
    let mut episodes: Vec<&Episode> = media.episodes.iter().collect();
    episodes.sort_by_key(|e| (e.season_number, e.episode_number));

    pb::Media {
        id: media.id.to_string(),
        library_id: media.library_id.to_string(),
        title: media.title.clone(),
        r#type: media_type_to_wire(&media.media_type) as i32,
        file_path: media.file_path.clone(),
        file_size_bytes: media.file_size_bytes,
        runtime_seconds: media.runtime_minutes.saturating_mul(60),
        resolution: media.resolution.clone(),
        video_codec: media.video_codec.clone(),
        bitrate: media.bitrate,
        release_date: media.release_date.as_deref().and_then(parse_date),
        created_at: Some(timestamp(media.created_at)),
        updated_at: Some(timestamp(media.updated_at)),
        episodes: episodes.into_iter().map(episode_to_wire).collect(),
    }
}

const MEDIA_MASK_PATHS: &[&str] = &["title", "resolution", "video_codec", "bitrate", "release_date"];

pub fn media_update_from_wire(req: &pb::UpdateMediaRequest) -> Result<MediaUpdate, ConvertError> {
    let mask = Mask::new(req.update_mask.as_ref(), MEDIA_MASK_PATHS)?;

    if mask.applies("bitrate", req.bitrate != 0) && req.bitrate < 0 {
        return Err(ConvertError::Negative("bitrate"));
    }

    Ok(MediaUpdate {
        title: mask
            .applies("title", !req.title.is_empty())
            .then(|| req.title.trim().to_string()),
        resolution: mask
            .applies("resolution", !req.resolution.is_empty())
            .then(|| req.resolution.clone()),
        video_codec: mask
            .applies("video_codec", !req.video_codec.is_empty())
            .then(|| req.video_codec.clone()),
        bitrate: mask.applies("bitrate", req.bitrate != 0).then_some(req.bitrate),
        release_date: mask
            .applies("release_date", !req.release_date.is_empty())
            .then(|| req.release_date.trim().to_string()),
    })
}
