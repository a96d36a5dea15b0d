//! Blossom client against in-process axum servers.

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, put},
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use comic_blossom::{BlobDescriptor, BlossomClient, BlossomError};
use comic_core::testutil::FakeSigner;
use comic_core::{Drive, DriveEntry, Event, Server, Sha256Hash, Signer};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const SVG: &[u8] = b"<svg xmlns=\"http://www.w3.org/2000/svg\"/>";
const SVG_MIME: &str = "image/svg+xml";

#[derive(Default)]
struct Inner {
    base: String,
    blobs: HashMap<String, (Vec<u8>, String)>,
    corrupt: bool,
    delay: Duration,
    served: usize,
    auth_events: Vec<Event>,
}

#[derive(Clone, Default)]
struct FakeBlossom(Arc<Mutex<Inner>>);

impl FakeBlossom {
    fn with_blob(self, bytes: &[u8], mime: &str) -> Self {
        let sha = Sha256Hash::new(bytes).to_hex();
        self.0
            .lock()
            .unwrap()
            .blobs
            .insert(sha, (bytes.to_vec(), mime.to_string()));
        self
    }

    fn corrupt(self) -> Self {
        self.0.lock().unwrap().corrupt = true;
        self
    }

    fn slow(self, delay: Duration) -> Self {
        self.0.lock().unwrap().delay = delay;
        self
    }

    fn served(&self) -> usize {
        self.0.lock().unwrap().served
    }

    fn auth_events(&self) -> Vec<Event> {
        self.0.lock().unwrap().auth_events.clone()
    }

    fn has_blob(&self, sha: &str) -> bool {
        self.0.lock().unwrap().blobs.contains_key(sha)
    }

    /// Records the auth event; `false` when the header is missing or bad.
    fn check_auth(&self, headers: &HeaderMap) -> bool {
        let Some(value) = headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()) else {
            return false;
        };
        let Some(b64) = value.strip_prefix("Nostr ") else {
            return false;
        };
        let Ok(json) = STANDARD.decode(b64) else {
            return false;
        };
        let Ok(event) = serde_json::from_slice::<Event>(&json) else {
            return false;
        };
        self.0.lock().unwrap().auth_events.push(event);
        true
    }

    fn descriptor(&self, sha: &str, size: usize, mime: &str) -> BlobDescriptor {
        BlobDescriptor {
            url: format!("{}/{sha}.svg", self.0.lock().unwrap().base),
            sha256: sha.to_string(),
            size: size as u64,
            mime: Some(mime.to_string()),
            uploaded: 1_700_000_000,
        }
    }

    async fn spawn(self) -> Server {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        self.0.lock().unwrap().base = format!("http://{addr}");

        let app = Router::new()
            .route("/upload", put(upload))
            .route("/mirror", put(mirror))
            .route("/list/{pubkey}", get(list))
            .route("/{name}", get(get_blob).delete(delete_blob))
            .with_state(self);
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        // Trailing slash on purpose; the client must not produce `//`.
        Server::new(format!("http://{addr}/"))
    }
}

async fn get_blob(State(fake): State<FakeBlossom>, Path(name): Path<String>) -> Response {
    let sha = name.split('.').next().unwrap_or_default().to_string();
    let (found, delay) = {
        let mut state = fake.0.lock().unwrap();
        let delay = state.delay;
        let corrupt = state.corrupt;
        let found = state.blobs.get(&sha).cloned().map(|(bytes, mime)| {
            if corrupt { (b"garbage".to_vec(), mime) } else { (bytes, mime) }
        });
        if found.is_some() {
            state.served += 1;
        }
        (found, delay)
    };
    tokio::time::sleep(delay).await;
    match found {
        Some((bytes, mime)) => ([(header::CONTENT_TYPE, mime)], bytes).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn delete_blob(
    State(fake): State<FakeBlossom>,
    Path(sha): Path<String>,
    headers: HeaderMap,
) -> StatusCode {
    if !fake.check_auth(&headers) {
        return StatusCode::UNAUTHORIZED;
    }
    match fake.0.lock().unwrap().blobs.remove(&sha) {
        Some(_) => StatusCode::OK,
        None => StatusCode::NOT_FOUND,
    }
}

async fn upload(State(fake): State<FakeBlossom>, headers: HeaderMap, body: Bytes) -> Response {
    if !fake.check_auth(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let mime = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string();
    let sha = Sha256Hash::new(&body).to_hex();
    fake.0
        .lock()
        .unwrap()
        .blobs
        .insert(sha.clone(), (body.to_vec(), mime.clone()));
    Json(fake.descriptor(&sha, body.len(), &mime)).into_response()
}

#[derive(serde::Deserialize)]
struct MirrorBody {
    url: String,
}

async fn mirror(
    State(fake): State<FakeBlossom>,
    headers: HeaderMap,
    Json(body): Json<MirrorBody>,
) -> Response {
    if !fake.check_auth(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let file = body.url.rsplit('/').next().unwrap_or_default();
    let sha = file.split('.').next().unwrap_or_default();
    Json(fake.descriptor(sha, 0, SVG_MIME)).into_response()
}

async fn list(
    State(fake): State<FakeBlossom>,
    Path(_pubkey): Path<String>,
    headers: HeaderMap,
) -> Response {
    if !fake.check_auth(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let blobs: Vec<(String, usize, String)> = fake
        .0
        .lock()
        .unwrap()
        .blobs
        .iter()
        .map(|(sha, (bytes, mime))| (sha.clone(), bytes.len(), mime.clone()))
        .collect();
    let descriptors: Vec<BlobDescriptor> = blobs
        .iter()
        .map(|(sha, size, mime)| fake.descriptor(sha, *size, mime))
        .collect();
    Json(descriptors).into_response()
}

fn svg_sha() -> String {
    Sha256Hash::new(SVG).to_hex()
}

fn client_with(signer: &Arc<FakeSigner>) -> BlossomClient {
    BlossomClient::new(Some(signer.clone() as Arc<dyn Signer>))
}

/// A port nothing listens on.
fn dead_server() -> Server {
    Server::new("http://127.0.0.1:9")
}

#[tokio::test]
async fn first_verified_server_wins() {
    let bad = FakeBlossom::default().with_blob(SVG, SVG_MIME).corrupt();
    let good = FakeBlossom::default()
        .with_blob(SVG, SVG_MIME)
        .slow(Duration::from_millis(100));
    let servers = vec![bad.clone().spawn().await, good.clone().spawn().await];

    let client = BlossomClient::new(None);
    let blob = client
        .fetch_file(&svg_sha(), &servers, Some(SVG_MIME))
        .await
        .unwrap();
    assert_eq!(blob.bytes.as_ref(), SVG);
    assert_eq!(blob.size, SVG.len() as u64);
    assert!(blob.url.starts_with(servers[1].base()));
    assert!(blob.url.ends_with(".svg"));

    // Served from memory the second time.
    client
        .fetch_file(&svg_sha(), &servers, Some(SVG_MIME))
        .await
        .unwrap();
    assert_eq!(good.served(), 1);
}

#[tokio::test]
async fn failures_are_reported_per_server() {
    let corrupt = FakeBlossom::default().with_blob(SVG, SVG_MIME).corrupt();
    let wrong_type = FakeBlossom::default().with_blob(SVG, "text/plain");
    let empty = FakeBlossom::default();
    let servers = vec![
        corrupt.spawn().await,
        wrong_type.spawn().await,
        empty.spawn().await,
    ];

    let err = BlossomClient::new(None)
        .fetch_file(&svg_sha(), &servers, Some(SVG_MIME))
        .await
        .unwrap_err();
    let BlossomError::AllFailed(failures) = err else {
        panic!("expected AllFailed, got {err:?}");
    };
    assert_eq!(failures.len(), 3);
    let reason_of = |server: &Server| {
        failures
            .iter()
            .find(|f| f.server == *server)
            .map(|f| f.reason.clone())
            .unwrap()
    };
    assert!(reason_of(&servers[0]).contains("hashes to"));
    assert!(reason_of(&servers[1]).contains("content type"));
    assert!(reason_of(&servers[2]).contains("404"));
}

#[tokio::test]
async fn no_mime_means_no_extension_and_no_type_check() {
    let fake = FakeBlossom::default().with_blob(SVG, "application/octet-stream");
    let servers = vec![fake.spawn().await];
    let blob = BlossomClient::new(None)
        .fetch_file(&svg_sha(), &servers, None)
        .await
        .unwrap();
    assert!(blob.url.ends_with(&svg_sha()));
}

#[tokio::test]
async fn drive_entries_settle_independently() {
    let fake = FakeBlossom::default().with_blob(SVG, SVG_MIME);
    let server = fake.spawn().await;
    let drive = Drive {
        servers: vec![server],
        x: vec![
            DriveEntry {
                sha256: svg_sha(),
                path: "/a.svg".into(),
                size: SVG.len() as u64,
                mime: SVG_MIME.into(),
            },
            DriveEntry {
                sha256: "0".repeat(64),
                path: "/missing.svg".into(),
                size: 1,
                mime: SVG_MIME.into(),
            },
        ],
        ..Default::default()
    };

    let results = BlossomClient::new(None).fetch_drive(&drive).await;
    assert_eq!(results.len(), 2);
    assert!(results[0].result.is_ok());
    assert_eq!(results[0].entry.path, "/a.svg");
    assert!(results[1].result.is_err());
}

#[tokio::test]
async fn upload_reaches_every_live_server() {
    let a = FakeBlossom::default();
    let b = FakeBlossom::default();
    let servers = vec![a.clone().spawn().await, b.clone().spawn().await, dead_server()];
    let signer = Arc::new(FakeSigner::new("pk"));

    let outcomes = client_with(&signer)
        .upload(Bytes::from_static(SVG), &servers, Some(SVG_MIME))
        .await
        .unwrap();
    assert_eq!(outcomes.len(), 3);
    assert!(outcomes[0].is_ok());
    assert!(outcomes[1].is_ok());
    assert!(!outcomes[2].is_ok());
    assert_eq!(outcomes[0].result.as_ref().unwrap().sha256, svg_sha());
    assert!(a.has_blob(&svg_sha()) && b.has_blob(&svg_sha()));

    let token = &a.auth_events()[0];
    assert!(token.verify_id());
    assert_eq!(token.kind, 24242);
    assert_eq!(token.content, "Upload Blobs");
    assert_eq!(token.tag_value("t"), Some("upload"));
    assert_eq!(token.tag_value("x"), Some(svg_sha().as_str()));
    let expiration: u64 = token.tag_value("expiration").unwrap().parse().unwrap();
    assert_eq!(expiration, token.created_at + 86_400);

    // One token for all servers.
    assert_eq!(signer.signed().len(), 1);
}

#[tokio::test]
async fn upload_without_signer_fails_before_any_request() {
    let fake = FakeBlossom::default();
    let servers = vec![fake.clone().spawn().await];
    let err = BlossomClient::new(None)
        .upload(Bytes::from_static(SVG), &servers, None)
        .await
        .unwrap_err();
    assert!(matches!(err, BlossomError::Auth(_)));
    assert!(fake.auth_events().is_empty());
}

#[tokio::test]
async fn delete_then_has() {
    let fake = FakeBlossom::default().with_blob(SVG, SVG_MIME);
    let server = fake.clone().spawn().await;
    let signer = Arc::new(FakeSigner::new("pk"));
    let client = client_with(&signer);

    assert!(client.has(&server, &svg_sha()).await.unwrap());
    let outcomes = client.delete(&svg_sha(), &[server.clone()]).await.unwrap();
    assert!(outcomes[0].is_ok());
    assert!(!client.has(&server, &svg_sha()).await.unwrap());
    assert_eq!(fake.auth_events()[0].tag_value("t"), Some("delete"));

    let again = client.delete(&svg_sha(), &[server]).await.unwrap();
    assert!(matches!(
        again[0].result,
        Err(BlossomError::Status { status: 404, .. })
    ));
}

#[tokio::test]
async fn mirror_signs_the_url_hash() {
    let fake = FakeBlossom::default();
    let server = fake.clone().spawn().await;
    let signer = Arc::new(FakeSigner::new("pk"));
    let url = format!("https://cdn.example.com/{}.svg", svg_sha());

    let outcomes = client_with(&signer).mirror(&url, &[server]).await.unwrap();
    assert_eq!(outcomes[0].result.as_ref().unwrap().sha256, svg_sha());
    let token = &fake.auth_events()[0];
    assert_eq!(token.content, "Mirror Url");
    assert_eq!(token.tag_value("x"), Some(svg_sha().as_str()));

    let err = client_with(&signer)
        .mirror("https://cdn.example.com/", &[])
        .await
        .unwrap_err();
    assert!(matches!(err, BlossomError::InvalidUrl(_)));
}

#[tokio::test]
async fn list_reuses_its_token() {
    let fake = FakeBlossom::default().with_blob(SVG, SVG_MIME);
    let server = fake.clone().spawn().await;
    let signer = Arc::new(FakeSigner::new("pk"));
    let client = client_with(&signer);

    let blobs = client.list(&server, "pk").await.unwrap();
    assert_eq!(blobs.len(), 1);
    assert_eq!(blobs[0].sha256, svg_sha());
    assert_eq!(blobs[0].mime.as_deref(), Some(SVG_MIME));
    client.list(&server, "pk").await.unwrap();

    assert_eq!(signer.signed().len(), 1);
    assert_eq!(fake.auth_events().len(), 2);
}

#[tokio::test]
async fn download_returns_raw_bytes() {
    let server = FakeBlossom::default().with_blob(SVG, SVG_MIME).spawn().await;
    let client = BlossomClient::new(None);

    let bytes = client.download(&server.join(&format!("{}.svg", svg_sha()))).await.unwrap();
    assert_eq!(bytes.as_ref(), SVG);

    let missing = client.download(&server.join("missing.svg")).await.unwrap_err();
    assert!(matches!(missing, BlossomError::Status { status: 404, .. }), "{missing:?}");
}
