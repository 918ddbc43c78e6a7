//! `medialib.library.v1.LibraryService` handlers
//!
//! Every endpoint follows the same steps: require the caller installed by the
//! auth layer, validate identifiers, convert the request, call the catalogue,
//! then convert the result. List endpoints page with [`CursorCodec`] tokens.

use std::sync::Arc;

use crypto_core::CursorCodec;
use error_types::ServiceError;
use grpc_auth::CallerExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::pb::library as pb;
use crate::config::PageLimits;
use crate::converter;
use crate::files::{self, FileRemoval};
use crate::models::{same_media_type, MediaQuery, ScanOutcome};
use crate::service::CatalogService;
use pb::library_service_server::LibraryService;
use pb::scan_library_response::Status as ScanStatus;

/// Buffered media messages per stream before the producer waits
const STREAM_BUFFER: usize = 32;

pub struct LibraryHandler {
    catalog: Arc<dyn CatalogService>,
    cursor: Arc<CursorCodec>,
    limits: PageLimits,
}

impl LibraryHandler {
    pub fn new(catalog: Arc<dyn CatalogService>, cursor: Arc<CursorCodec>, limits: PageLimits) -> Self {
        Self {
            catalog,
            cursor,
            limits,
        }
    }

    /// Resolved `(offset, page_size)` for a list request
    fn page(&self, page_size: i32, page_token: &str) -> (u64, u32) {
        let size = self.limits.resolve(page_size);
        let offset = self.cursor.calculate_offset(page_token, 0);
        (offset, size)
    }

    fn next_token(&self, offset: u64, size: u32, total: u64) -> Result<String, Status> {
        Ok(self.cursor.next_page_token(offset, size, total)?)
    }
}

fn parse_id(raw: &str, field: &str) -> Result<Uuid, Status> {
    Uuid::parse_str(raw.trim()).map_err(|_| Status::invalid_argument(format!("invalid {field}")))
}

fn total_items(total: u64) -> i32 {
    i32::try_from(total).unwrap_or(i32::MAX)
}

fn require_absolute(path: &str) -> Result<(), Status> {
    if path.is_empty() {
        return Err(Status::invalid_argument("path is required"));
    }
    if !std::path::Path::new(path).is_absolute() {
        return Err(Status::invalid_argument("path must be absolute"));
    }
    Ok(())
}

#[tonic::async_trait]
impl LibraryService for LibraryHandler {
    #[tracing::instrument(skip(self, request))]
    async fn create_library(
        &self,
        request: Request<pb::CreateLibraryRequest>,
    ) -> Result<Response<pb::Library>, Status> {
        let user_id = request.require_caller()?.user_id.clone();
        let req = request.into_inner();

        let new = converter::new_library_from_wire(&req)?;
        if new.name.is_empty() {
            return Err(Status::invalid_argument("name is required"));
        }
        require_absolute(&new.path)?;

        let library = self.catalog.create_library(new).await?;
        info!(library_id = %library.id, user_id = %user_id, "Library created");

        Ok(Response::new(converter::library_to_wire(&library)))
    }

    #[tracing::instrument(skip(self, request))]
    async fn get_library(
        &self,
        request: Request<pb::GetLibraryRequest>,
    ) -> Result<Response<pb::Library>, Status> {
        request.require_caller()?;
        let id = parse_id(&request.get_ref().id, "library id")?;

        let library = self.catalog.get_library(id).await?;
        Ok(Response::new(converter::library_to_wire(&library)))
    }

    #[tracing::instrument(skip(self, request))]
    async fn list_libraries(
        &self,
        request: Request<pb::ListLibrariesRequest>,
    ) -> Result<Response<pb::ListLibrariesResponse>, Status> {
        request.require_caller()?;
        let req = request.into_inner();
        let (offset, size) = self.page(req.page_size, &req.page_token);

        // The catalogue returns every library; the type filter applies here
        let mut libraries = self.catalog.list_libraries().await?;
        if let Some(kind) = converter::media_type_filter(req.r#type) {
            libraries.retain(|library| same_media_type(&library.media_type, kind));
        }

        let total = libraries.len() as u64;
        let page: Vec<pb::Library> = libraries
            .iter()
            .skip(usize::try_from(offset).unwrap_or(usize::MAX))
            .take(size as usize)
            .map(converter::library_to_wire)
            .collect();

        Ok(Response::new(pb::ListLibrariesResponse {
            libraries: page,
            next_page_token: self.next_token(offset, size, total)?,
            total_items: total_items(total),
        }))
    }

    #[tracing::instrument(skip(self, request))]
    async fn update_library(
        &self,
        request: Request<pb::UpdateLibraryRequest>,
    ) -> Result<Response<pb::Library>, Status> {
        let user_id = request.require_caller()?.user_id.clone();
        let req = request.into_inner();
        let id = parse_id(&req.id, "library id")?;

        let update = converter::library_update_from_wire(&req)?;
        if let Some(name) = &update.name {
            if name.is_empty() {
                return Err(Status::invalid_argument("name must not be empty"));
            }
        }
        if let Some(path) = &update.path {
            require_absolute(path)?;
        }
        if update.scan_interval_seconds == Some(0) {
            return Err(Status::invalid_argument("scan_interval_minutes must be positive"));
        }

        let library = self.catalog.update_library(id, update).await?;
        info!(library_id = %id, user_id = %user_id, "Library updated");

        Ok(Response::new(converter::library_to_wire(&library)))
    }

    #[tracing::instrument(skip(self, request))]
    async fn delete_library(
        &self,
        request: Request<pb::DeleteLibraryRequest>,
    ) -> Result<Response<()>, Status> {
        let user_id = request.require_caller()?.user_id.clone();
        let id = parse_id(&request.get_ref().id, "library id")?;

        self.catalog.delete_library(id).await?;
        info!(library_id = %id, user_id = %user_id, "Library deleted");

        Ok(Response::new(()))
    }

    #[tracing::instrument(skip(self, request))]
    async fn scan_library(
        &self,
        request: Request<pb::ScanLibraryRequest>,
    ) -> Result<Response<pb::ScanLibraryResponse>, Status> {
        request.require_caller()?;
        let req = request.into_inner();
        let id = parse_id(&req.id, "library id")?;

        let (status, message) = match self.catalog.scan_library(id, req.full_scan).await? {
            ScanOutcome::Started => (ScanStatus::Started, "scan started"),
            ScanOutcome::AlreadyRunning => (ScanStatus::InProgress, "scan already in progress"),
        };

        Ok(Response::new(pb::ScanLibraryResponse {
            scan_id: id.to_string(),
            status: status as i32,
            message: message.to_string(),
        }))
    }

    #[tracing::instrument(skip(self, request))]
    async fn get_media(
        &self,
        request: Request<pb::GetMediaRequest>,
    ) -> Result<Response<pb::Media>, Status> {
        request.require_caller()?;
        let id = parse_id(&request.get_ref().id, "media id")?;

        let media = self.catalog.get_media(id).await?;
        Ok(Response::new(converter::media_to_wire(&media)))
    }

    #[tracing::instrument(skip(self, request))]
    async fn list_media(
        &self,
        request: Request<pb::ListMediaRequest>,
    ) -> Result<Response<pb::ListMediaResponse>, Status> {
        request.require_caller()?;
        let req = request.into_inner();
        let library_id = parse_id(&req.library_id, "library id")?;
        let (offset, size) = self.page(req.page_size, &req.page_token);

        let page = self
            .catalog
            .list_media(MediaQuery {
                library_id: Some(library_id),
                media_type: converter::media_type_filter(req.r#type).map(str::to_string),
                search: None,
                offset,
                limit: u64::from(size),
            })
            .await?;

        Ok(Response::new(pb::ListMediaResponse {
            media: page.items.iter().map(converter::media_to_wire).collect(),
            next_page_token: self.next_token(offset, size, page.total)?,
            total_items: total_items(page.total),
        }))
    }

    #[tracing::instrument(skip(self, request))]
    async fn search_media(
        &self,
        request: Request<pb::SearchMediaRequest>,
    ) -> Result<Response<pb::ListMediaResponse>, Status> {
        request.require_caller()?;
        let req = request.into_inner();

        let query = req.query.trim();
        if query.is_empty() {
            return Err(Status::invalid_argument("query is required"));
        }
        let library_id = match req.library_id.trim() {
            "" => None,
            raw => Some(parse_id(raw, "library id")?),
        };
        let (offset, size) = self.page(req.page_size, &req.page_token);

        let page = self
            .catalog
            .list_media(MediaQuery {
                library_id,
                media_type: converter::media_type_filter(req.r#type).map(str::to_string),
                search: Some(query.to_string()),
                offset,
                limit: u64::from(size),
            })
            .await?;

        Ok(Response::new(pb::ListMediaResponse {
            media: page.items.iter().map(converter::media_to_wire).collect(),
            next_page_token: self.next_token(offset, size, page.total)?,
            total_items: total_items(page.total),
        }))
    }

    #[tracing::instrument(skip(self, request))]
    async fn update_media(
        &self,
        request: Request<pb::UpdateMediaRequest>,
    ) -> Result<Response<pb::Media>, Status> {
        let user_id = request.require_caller()?.user_id.clone();
        let req = request.into_inner();
        let id = parse_id(&req.id, "media id")?;

        let update = converter::media_update_from_wire(&req)?;
        if update.title.as_deref() == Some("") {
            return Err(Status::invalid_argument("title must not be empty"));
        }

        let media = self.catalog.update_media(id, update).await?;
        info!(media_id = %id, user_id = %user_id, "Media updated");

        Ok(Response::new(converter::media_to_wire(&media)))
    }

    #[tracing::instrument(skip(self, request))]
    async fn delete_media(
        &self,
        request: Request<pb::DeleteMediaRequest>,
    ) -> Result<Response<()>, Status> {
        let user_id = request.require_caller()?.user_id.clone();
        let req = request.into_inner();
        let id = parse_id(&req.id, "media id")?;

        // Path must be read before the record disappears
        let file_path = if req.delete_file {
            Some(self.catalog.get_media(id).await?.file_path)
        } else {
            None
        };

        self.catalog.delete_media(id).await?;
        info!(media_id = %id, user_id = %user_id, "Media deleted");

        if let Some(path) = file_path {
            match files::remove_media_file(&path).await {
                Ok(FileRemoval::Removed) => info!(media_id = %id, path = %path, "Media file removed"),
                Ok(FileRemoval::Missing) => {
                    debug!(media_id = %id, path = %path, "Media file already gone")
                }
                Err(e) => warn!(
                    media_id = %id,
                    path = %path,
                    error = %e,
                    "Failed to remove media file"
                ),
            }
        }

        Ok(Response::new(()))
    }

    type StreamLibraryMediaStream = ReceiverStream<Result<pb::Media, Status>>;

    #[tracing::instrument(skip(self, request))]
    async fn stream_library_media(
        &self,
        request: Request<pb::StreamLibraryMediaRequest>,
    ) -> Result<Response<Self::StreamLibraryMediaStream>, Status> {
        request.require_caller()?;
        let library_id = parse_id(&request.get_ref().library_id, "library id")?;

        // Surface NotFound as the call status rather than a stream item
        self.catalog.get_library(library_id).await?;

        let catalog = Arc::clone(&self.catalog);
        let batch = u64::from(self.limits.max_size);
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);

        tokio::spawn(async move {
            let mut offset = 0u64;
            loop {
                let query = MediaQuery {
                    library_id: Some(library_id),
                    offset,
                    limit: batch,
                    ..Default::default()
                };
                let page = match catalog.list_media(query).await {
                    Ok(page) => page,
                    Err(e) => {
                        let _ = tx.send(Err(Status::from(e))).await;
                        return;
                    }
                };

                let fetched = page.items.len() as u64;
                for media in &page.items {
                    if tx.send(Ok(converter::media_to_wire(media))).await.is_err() {
                        debug!(library_id = %library_id, "Stream receiver dropped");
                        return;
                    }
                }

                offset += fetched;
                if fetched < batch || offset >= page.total {
                    break;
                }
            }
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }

    async fn get_metadata(
        &self,
        request: Request<pb::GetMetadataRequest>,
    ) -> Result<Response<pb::MediaMetadata>, Status> {
        request.require_caller()?;
        Err(ServiceError::Unimplemented {
            operation: "GetMetadata",
        }
        .into())
    }

    async fn update_metadata(
        &self,
        request: Request<pb::UpdateMetadataRequest>,
    ) -> Result<Response<pb::MediaMetadata>, Status> {
        request.require_caller()?;
        Err(ServiceError::Unimplemented {
            operation: "UpdateMetadata",
        }
        .into())
    }

    async fn refresh_metadata(
        &self,
        request: Request<pb::RefreshMetadataRequest>,
    ) -> Result<Response<pb::MediaMetadata>, Status> {
        request.require_caller()?;
        Err(ServiceError::Unimplemented {
            operation: "RefreshMetadata",
        }
        .into())
    }
}
