//! End-to-end tests against a real server on an ephemeral port
//!
//! Each test starts its own server with the in-memory adapters, wrapped so the
//! test can see which catalogue operations the handlers reached.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use crypto_core::cursor::DEFAULT_CURSOR_TTL;
use crypto_core::{CursorCodec, Identity, TokenConfig, TokenManager};
use error_types::ServiceResult;
use grpc_auth::BearerInterceptor;
use library_service::config::PageLimits;
use library_service::grpc::pb::auth::auth_service_client::AuthServiceClient;
use library_service::grpc::pb::auth::{CreateUserRequest, LoginRequest};
use library_service::grpc::pb::library::library_service_client::LibraryServiceClient;
use library_service::grpc::pb::library::scan_library_response::Status as ScanStatus;
use library_service::grpc::pb::library::{
    CreateLibraryRequest, GetLibraryRequest, ListLibrariesRequest, MediaType,
    ScanLibraryRequest, StreamLibraryMediaRequest,
};
use library_service::models::{
    Library, LibraryUpdate, ListPage, Media, MediaQuery, MediaUpdate, NewLibrary, ScanOutcome,
};
use library_service::service::{CatalogService, MemoryCatalog, MemoryUserStore, ScanTracker};
use library_service::{run, Application};
use rbac::RbacEngine;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_stream::StreamExt;
use tonic::service::interceptor::InterceptedService;
use tonic::transport::Channel;
use tonic::Code;
use uuid::Uuid;

const SECRET: &[u8] = b"k3Yq9vTz7LmP2xWc8RbN4sHd6FgJ1aQe";
const CURSOR_KEY: &[u8; 32] = b"an-example-cursor-key-of-32bytes";

/// Memory catalogue that records which operations were called
#[derive(Clone, Default)]
struct RecordingCatalog {
    inner: MemoryCatalog,
    calls: Arc<Mutex<Vec<&'static str>>>,
}

impl RecordingCatalog {
    fn with_tracker(scans: ScanTracker) -> Self {
        Self {
            inner: MemoryCatalog::with_tracker(scans),
            calls: Arc::default(),
        }
    }

    fn record(&self, op: &'static str) {
        self.calls.lock().unwrap().push(op);
    }

    fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    fn count(&self, op: &str) -> usize {
        self.calls().iter().filter(|c| **c == op).count()
    }
}

#[async_trait]
impl CatalogService for RecordingCatalog {
    async fn create_library(&self, library: NewLibrary) -> ServiceResult<Library> {
        self.record("create_library");
        self.inner.create_library(library).await
    }

    async fn get_library(&self, id: Uuid) -> ServiceResult<Library> {
        self.record("get_library");
        self.inner.get_library(id).await
    }

    async fn list_libraries(&self) -> ServiceResult<Vec<Library>> {
        self.record("list_libraries");
        self.inner.list_libraries().await
    }

    async fn update_library(&self, id: Uuid, update: LibraryUpdate) -> ServiceResult<Library> {
        self.record("update_library");
        self.inner.update_library(id, update).await
    }

    async fn delete_library(&self, id: Uuid) -> ServiceResult<()> {
        self.record("delete_library");
        self.inner.delete_library(id).await
    }

    async fn scan_library(&self, id: Uuid, full_scan: bool) -> ServiceResult<ScanOutcome> {
        self.record("scan_library");
        self.inner.scan_library(id, full_scan).await
    }

    async fn get_media(&self, id: Uuid) -> ServiceResult<Media> {
        self.record("get_media");
        self.inner.get_media(id).await
    }

    async fn list_media(&self, query: MediaQuery) -> ServiceResult<ListPage<Media>> {
        self.record("list_media");
        self.inner.list_media(query).await
    }

    async fn update_media(&self, id: Uuid, update: MediaUpdate) -> ServiceResult<Media> {
        self.record("update_media");
        self.inner.update_media(id, update).await
    }

    async fn delete_media(&self, id: Uuid) -> ServiceResult<()> {
        self.record("delete_media");
        self.inner.delete_media(id).await
    }
}

struct TestServer {
    url: String,
    tokens: Arc<TokenManager>,
    catalog: RecordingCatalog,
    _stop: oneshot::Sender<()>,
}

impl TestServer {
    async fn start(catalog: RecordingCatalog) -> Self {
        let tokens = Arc::new(
            TokenManager::new(TokenConfig {
                access_secret: SECRET.to_vec(),
                refresh_secret: SECRET.to_vec(),
                issuer: "library-e2e".into(),
                access_ttl: Duration::from_secs(900),
                refresh_ttl: Duration::from_secs(3600),
            })
            .unwrap(),
        );

        let app = Application {
            catalog: Arc::new(catalog.clone()),
            users: Arc::new(MemoryUserStore::new()),
            tokens: Arc::clone(&tokens),
            authorizer: Arc::new(RbacEngine::builtin()),
            cursor: Arc::new(CursorCodec::new(CURSOR_KEY, DEFAULT_CURSOR_TTL)),
            limits: PageLimits::default(),
            request_timeout: Duration::from_secs(10),
        };

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let (stop, stopped) = oneshot::channel::<()>();
        tokio::spawn(run(app, listener, async {
            let _ = stopped.await;
        }));

        Self {
            url,
            tokens,
            catalog,
            _stop: stop,
        }
    }

    async fn channel(&self) -> Channel {
        Channel::from_shared(self.url.clone())
            .unwrap()
            .connect()
            .await
            .unwrap()
    }

    fn token(&self, roles: &[&str]) -> String {
        let identity = Identity::new(
            Uuid::new_v4().to_string(),
            "tester",
            "tester@example.com",
            roles.iter().map(|r| r.to_string()).collect(),
        );
        self.tokens.issue_access(&identity).unwrap()
    }

    async fn client(
        &self,
        roles: &[&str],
    ) -> LibraryServiceClient<InterceptedService<Channel, BearerInterceptor>> {
        let interceptor = BearerInterceptor::new(self.token(roles)).unwrap();
        LibraryServiceClient::with_interceptor(self.channel().await, interceptor)
    }

    async fn seed_libraries(&self, count: usize) {
        for i in 0..count {
            self.catalog
                .inner
                .create_library(NewLibrary {
                    name: format!("Library {i:03}"),
                    path: format!("/srv/library-{i:03}"),
                    media_type: "movie".into(),
                    enabled: true,
                    scan_interval_seconds: 3600,
                })
                .await
                .unwrap();
        }
    }
}

fn list_request(page_size: i32, page_token: String) -> ListLibrariesRequest {
    ListLibrariesRequest {
        page_size,
        page_token,
        r#type: MediaType::Unspecified as i32,
    }
}

#[tokio::test]
async fn test_unauthenticated_get_library() {
    let server = TestServer::start(RecordingCatalog::default()).await;
    let mut client = LibraryServiceClient::new(server.channel().await);

    let err = client
        .get_library(GetLibraryRequest {
            id: Uuid::new_v4().to_string(),
        })
        .await
        .unwrap_err();

    assert_eq!(err.code(), Code::Unauthenticated);
    assert!(server.catalog.calls().is_empty());
}

#[tokio::test]
async fn test_invalid_token_rejected_before_handler() {
    let server = TestServer::start(RecordingCatalog::default()).await;
    let interceptor = BearerInterceptor::new("not.a.token").unwrap();
    let mut client = LibraryServiceClient::with_interceptor(server.channel().await, interceptor);

    let err = client
        .get_library(GetLibraryRequest {
            id: Uuid::new_v4().to_string(),
        })
        .await
        .unwrap_err();

    assert_eq!(err.code(), Code::Unauthenticated);
    assert_eq!(err.message(), "invalid token");
    assert!(server.catalog.calls().is_empty());
}

#[tokio::test]
async fn test_guest_forbidden_from_create_library() {
    let server = TestServer::start(RecordingCatalog::default()).await;
    let mut client = server.client(&["guest"]).await;

    let err = client
        .create_library(CreateLibraryRequest {
            name: "Movies".into(),
            path: "/m".into(),
            r#type: MediaType::Movie as i32,
            auto_scan: true,
            scan_interval_minutes: 30,
        })
        .await
        .unwrap_err();

    assert_eq!(err.code(), Code::PermissionDenied);
    assert!(server.catalog.calls().is_empty());
}

#[tokio::test]
async fn test_admin_round_trip() {
    let server = TestServer::start(RecordingCatalog::default()).await;
    let mut client = server.client(&["admin"]).await;

    let created = client
        .create_library(CreateLibraryRequest {
            name: "Movies".into(),
            path: "/m".into(),
            r#type: MediaType::Movie as i32,
            auto_scan: true,
            scan_interval_minutes: 30,
        })
        .await
        .unwrap()
        .into_inner();

    assert!(!created.id.is_empty());
    assert!(created.auto_scan);
    assert_eq!(created.scan_interval_minutes, 30);

    let fetched = client
        .get_library(GetLibraryRequest {
            id: created.id.clone(),
        })
        .await
        .unwrap()
        .into_inner();
    assert_eq!(fetched, created);
}

#[tokio::test]
async fn test_pagination_walks_all_libraries() {
    let server = TestServer::start(RecordingCatalog::default()).await;
    server.seed_libraries(125).await;
    let mut client = server.client(&["user"]).await;

    let first = client
        .list_libraries(list_request(50, String::new()))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(first.libraries.len(), 50);
    assert_eq!(first.total_items, 125);
    assert_eq!(first.libraries[0].name, "Library 000");
    assert!(!first.next_page_token.is_empty());

    let second = client
        .list_libraries(list_request(50, first.next_page_token))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(second.libraries.len(), 50);
    assert_eq!(second.total_items, 125);
    assert_eq!(second.libraries[0].name, "Library 050");
    assert_eq!(second.libraries[49].name, "Library 099");

    let third = client
        .list_libraries(list_request(50, second.next_page_token))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(third.libraries.len(), 25);
    assert_eq!(third.total_items, 125);
    assert_eq!(third.libraries[0].name, "Library 100");
    assert!(third.next_page_token.is_empty());
}

#[tokio::test]
async fn test_tampered_cursor_restarts_from_first_page() {
    let server = TestServer::start(RecordingCatalog::default()).await;
    server.seed_libraries(60).await;
    let mut client = server.client(&["user"]).await;

    let first = client
        .list_libraries(list_request(50, String::new()))
        .await
        .unwrap()
        .into_inner();

    let mut tampered: Vec<char> = first.next_page_token.chars().collect();
    let middle = tampered.len() / 2;
    tampered[middle] = if tampered[middle] == 'A' { 'B' } else { 'A' };
    let tampered: String = tampered.into_iter().collect();

    let restarted = client
        .list_libraries(list_request(50, tampered))
        .await
        .unwrap()
        .into_inner();

    assert_eq!(restarted.libraries.len(), 50);
    assert_eq!(restarted.libraries[0].name, "Library 000");
    assert_eq!(restarted.total_items, 60);
}

#[tokio::test]
async fn test_conflicting_scan_reports_in_progress() {
    let scans = ScanTracker::new();
    let server = TestServer::start(RecordingCatalog::with_tracker(scans.clone())).await;
    server.seed_libraries(1).await;
    let library = server.catalog.inner.list_libraries().await.unwrap().remove(0);

    // A scan is already running for this library
    let _running = scans.try_begin(library.id).unwrap();

    let mut client = server.client(&["admin"]).await;
    let response = client
        .scan_library(ScanLibraryRequest {
            id: library.id.to_string(),
            full_scan: false,
        })
        .await
        .unwrap()
        .into_inner();

    assert_eq!(response.scan_id, library.id.to_string());
    assert_eq!(response.status, ScanStatus::InProgress as i32);
    assert!(response.message.contains("already in progress"));
    assert_eq!(server.catalog.count("scan_library"), 1);
}

#[tokio::test]
async fn test_stream_library_media_is_authenticated() {
    let server = TestServer::start(RecordingCatalog::default()).await;
    server.seed_libraries(1).await;
    let library = server.catalog.inner.list_libraries().await.unwrap().remove(0);

    let now = Utc::now();
    for i in 0..3 {
        server
            .catalog
            .inner
            .insert_media(Media {
                id: Uuid::new_v4(),
                library_id: library.id,
                title: format!("Title {i}"),
                media_type: "movie".into(),
                file_path: format!("/srv/library-000/{i}.mkv"),
                file_size_bytes: 1,
                runtime_minutes: 100,
                resolution: "4k".into(),
                video_codec: "hevc".into(),
                bitrate: 1,
                release_date: None,
                created_at: now,
                updated_at: now,
                episodes: vec![],
            })
            .await
            .unwrap();
    }

    let mut anonymous = LibraryServiceClient::new(server.channel().await);
    let err = anonymous
        .stream_library_media(StreamLibraryMediaRequest {
            library_id: library.id.to_string(),
        })
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::Unauthenticated);

    let mut client = server.client(&["guest"]).await;
    let stream = client
        .stream_library_media(StreamLibraryMediaRequest {
            library_id: library.id.to_string(),
        })
        .await
        .unwrap()
        .into_inner();
    let items: Vec<_> = stream.collect().await;

    assert_eq!(items.len(), 3);
    assert_eq!(items[0].as_ref().unwrap().runtime_seconds, 6000);
}

#[tokio::test]
async fn test_bootstrap_login_then_call() {
    let server = TestServer::start(RecordingCatalog::default()).await;
    let mut auth = AuthServiceClient::new(server.channel().await);

    let admin = auth
        .create_user(CreateUserRequest {
            username: "root".into(),
            email: "root@example.com".into(),
            password: "a long enough password".into(),
            roles: vec![],
        })
        .await
        .unwrap()
        .into_inner();
    assert_eq!(admin.roles, vec!["admin"]);

    // The store is no longer empty, so anonymous creation is refused
    let err = auth
        .create_user(CreateUserRequest {
            username: "mallory".into(),
            email: "mallory@example.com".into(),
            password: "a long enough password".into(),
            roles: vec!["admin".into()],
        })
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::Unauthenticated);

    let pair = auth
        .login(LoginRequest {
            username: "root".into(),
            password: "a long enough password".into(),
        })
        .await
        .unwrap()
        .into_inner();

    let interceptor = BearerInterceptor::new(&pair.access_token).unwrap();
    let mut client = LibraryServiceClient::with_interceptor(server.channel().await, interceptor);
    let created = client
        .create_library(CreateLibraryRequest {
            name: "Music".into(),
            path: "/music".into(),
            r#type: MediaType::Music as i32,
            auto_scan: false,
            scan_interval_minutes: 0,
        })
        .await
        .unwrap()
        .into_inner();
    assert_eq!(created.r#type, MediaType::Music as i32);
    assert_eq!(created.scan_interval_minutes, 60);
}

#[tokio::test]
async fn test_health_check_is_public() {
    use tonic_health::pb::health_client::HealthClient;
    use tonic_health::pb::HealthCheckRequest;

    let server = TestServer::start(RecordingCatalog::default()).await;
    let mut health = HealthClient::new(server.channel().await);

    let response = health
        .check(HealthCheckRequest {
            service: "medialib.library.v1.LibraryService".into(),
        })
        .await
        .unwrap()
        .into_inner();
    assert_eq!(
        response.status,
        tonic_health::pb::health_check_response::ServingStatus::Serving as i32
    );
}
