//! In-process fake of the remote contents API, served over real HTTP.
//!
//! Mirrors the upstream status codes and messages for stale or missing
//! `sha` preconditions so the conflict translation is exercised end to end.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::codec::decode_bytes;

const VALID_TOKEN: &str = "secret-token";
const BRANCH: &str = "main";

#[derive(Clone)]
struct Blob {
    sha: String,
    bytes: Vec<u8>,
}

#[derive(Clone)]
struct Commit {
    sha: String,
    message: String,
    path: String,
    parent: Option<String>,
    date: DateTime<Utc>,
    tree: BTreeMap<String, Blob>,
}

#[derive(Default)]
struct FakeRepo {
    files: BTreeMap<String, Blob>,
    commits: Vec<Commit>,
    puts: usize,
    reject_puts: usize,
    last_accept: Option<String>,
}

impl FakeRepo {
    fn commit(&mut self, path: &str, message: &str) -> String {
        let parent = self.commits.last().map(|c| c.sha.clone());
        let date = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
            + Duration::seconds(self.commits.len() as i64);
        let sha = hash(format!("commit {:?} {} {} {}", parent, path, message, date).as_bytes());
        self.commits.push(Commit {
            sha: sha.clone(),
            message: message.to_string(),
            path: path.to_string(),
            parent,
            date,
            tree: self.files.clone(),
        });
        sha
    }

    fn write(&mut self, path: &str, bytes: Vec<u8>, message: &str) -> (String, String) {
        let blob = Blob {
            sha: blob_sha(&bytes),
            bytes,
        };
        let sha = blob.sha.clone();
        self.files.insert(path.to_string(), blob);
        let commit = self.commit(path, message);
        (sha, commit)
    }
}

type Shared = Arc<Mutex<FakeRepo>>;

/// Handle to a running fake API.
#[derive(Clone)]
pub struct FakeContentsApi {
    state: Shared,
    addr: SocketAddr,
}

impl FakeContentsApi {
    pub async fn start() -> Self {
        let state: Shared = Arc::new(Mutex::new(FakeRepo::default()));
        let app = Router::new()
            .route("/repos/{owner}/{repo}", get(repo_info))
            .route("/repos/{owner}/{repo}/commits", get(list_commits))
            .route("/repos/{owner}/{repo}/contents", get(get_root))
            .route(
                "/repos/{owner}/{repo}/contents/{*path}",
                get(get_contents).put(put_contents).delete(delete_contents),
            )
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { state, addr }
    }

    fn repo(&self) -> MutexGuard<'_, FakeRepo> {
        self.state.lock().unwrap()
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Stored bytes of a file, as decoded from the wire.
    pub fn raw_bytes(&self, path: &str) -> Option<Vec<u8>> {
        self.repo().files.get(path).map(|b| b.bytes.clone())
    }

    /// Simulates a write made by another device.
    pub fn edit_out_of_band(&self, path: &str, content: &str) {
        self.repo()
            .write(path, content.as_bytes().to_vec(), "Edit from another device");
    }

    /// Number of PUT requests received so far.
    pub fn put_count(&self) -> usize {
        self.repo().puts
    }

    /// Makes the next `n` PUT requests fail with a sha mismatch.
    pub fn reject_next_puts(&self, n: usize) {
        self.repo().reject_puts = n;
    }

    pub fn last_accept(&self) -> Option<String> {
        self.repo().last_accept.clone()
    }
}

#[derive(Deserialize)]
struct RefQuery {
    #[serde(rename = "ref")]
    reference: Option<String>,
}

#[derive(Deserialize)]
struct CommitsQuery {
    path: Option<String>,
    per_page: Option<usize>,
}

#[derive(Deserialize)]
struct PutRequest {
    message: String,
    content: String,
    branch: String,
    sha: Option<String>,
}

#[derive(Deserialize)]
struct DeleteRequest {
    message: String,
    sha: String,
}

fn hash(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    digest.iter().map(|b| format!("{:02x}", b)).collect::<String>()[..40].to_string()
}

fn blob_sha(bytes: &[u8]) -> String {
    let mut data = format!("blob {}\0", bytes.len()).into_bytes();
    data.extend_from_slice(bytes);
    hash(&data)
}

fn message(status: StatusCode, text: &str) -> Response {
    (status, Json(json!({ "message": text }))).into_response()
}

/// Records the request and checks the bearer token.
fn authorize(state: &Shared, headers: &HeaderMap) -> Result<(), Response> {
    let accept = headers
        .get("accept")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    state.lock().unwrap().last_accept = accept;

    let expected = format!("Bearer {}", VALID_TOKEN);
    match headers.get("authorization").and_then(|v| v.to_str().ok()) {
        Some(value) if value == expected => Ok(()),
        _ => Err(message(StatusCode::UNAUTHORIZED, "Bad credentials")),
    }
}

fn wrap_base64(bytes: &[u8]) -> String {
    use base64::{engine::general_purpose::STANDARD, Engine};
    let encoded = STANDARD.encode(bytes);
    encoded
        .as_bytes()
        .chunks(60)
        .map(|c| format!("{}\n", String::from_utf8_lossy(c)))
        .collect()
}

fn file_json(path: &str, blob: &Blob) -> Value {
    json!({
        "type": "file",
        "name": path.rsplit('/').next().unwrap_or(path),
        "path": path,
        "sha": blob.sha,
        "size": blob.bytes.len(),
        "encoding": "base64",
        "content": wrap_base64(&blob.bytes),
    })
}

fn listing(tree: &BTreeMap<String, Blob>, dir: &str) -> Vec<Value> {
    let prefix = if dir.is_empty() {
        String::new()
    } else {
        format!("{}/", dir)
    };
    let mut entries: BTreeMap<String, Value> = BTreeMap::new();
    for (path, blob) in tree {
        let Some(rest) = path.strip_prefix(&prefix) else {
            continue;
        };
        match rest.split_once('/') {
            Some((child, _)) => {
                let child_path = format!("{}{}", prefix, child);
                entries.entry(child_path.clone()).or_insert_with(|| {
                    json!({
                        "type": "dir",
                        "name": child,
                        "path": child_path,
                        "sha": hash(child_path.as_bytes()),
                    })
                });
            }
            None => {
                entries.insert(
                    path.clone(),
                    json!({
                        "type": "file",
                        "name": rest,
                        "path": path,
                        "sha": blob.sha,
                        "size": blob.bytes.len(),
                    }),
                );
            }
        }
    }
    entries.into_values().collect()
}

async fn repo_info(State(state): State<Shared>, headers: HeaderMap) -> Response {
    if let Err(r) = authorize(&state, &headers) {
        return r;
    }
    Json(json!({ "full_name": "octo/journal", "default_branch": BRANCH })).into_response()
}

async fn get_root(
    State(state): State<Shared>,
    headers: HeaderMap,
    Query(query): Query<RefQuery>,
) -> Response {
    contents_response(&state, &headers, "", query.reference)
}

async fn get_contents(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path((_owner, _repo, path)): Path<(String, String, String)>,
    Query(query): Query<RefQuery>,
) -> Response {
    contents_response(&state, &headers, &path, query.reference)
}

fn contents_response(
    state: &Shared,
    headers: &HeaderMap,
    path: &str,
    reference: Option<String>,
) -> Response {
    if let Err(r) = authorize(state, headers) {
        return r;
    }
    let repo = state.lock().unwrap();

    let tree = match reference.as_deref() {
        None | Some(BRANCH) => repo.files.clone(),
        Some(sha) => match repo.commits.iter().find(|c| c.sha == sha) {
            Some(commit) => commit.tree.clone(),
            None => return message(StatusCode::NOT_FOUND, "No commit found for the ref"),
        },
    };

    if let Some(blob) = tree.get(path) {
        return Json(file_json(path, blob)).into_response();
    }

    let entries = listing(&tree, path);
    if entries.is_empty() && !path.is_empty() {
        return message(StatusCode::NOT_FOUND, "Not Found");
    }
    Json(Value::Array(entries)).into_response()
}

async fn put_contents(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path((_owner, _repo, path)): Path<(String, String, String)>,
    Json(body): Json<PutRequest>,
) -> Response {
    if let Err(r) = authorize(&state, &headers) {
        return r;
    }
    let mut repo = state.lock().unwrap();
    repo.puts += 1;
    assert_eq!(body.branch, BRANCH);

    if repo.reject_puts > 0 {
        repo.reject_puts -= 1;
        return message(
            StatusCode::CONFLICT,
            &format!("{} does not match {}", path, body.sha.unwrap_or_default()),
        );
    }

    let current = repo.files.get(&path).map(|b| b.sha.clone());
    match (current.as_deref(), body.sha.as_deref()) {
        (Some(_), None) => {
            return message(
                StatusCode::UNPROCESSABLE_ENTITY,
                "Invalid request.\n\n\"sha\" wasn't supplied.",
            )
        }
        (Some(current), Some(given)) if current != given => {
            return message(
                StatusCode::CONFLICT,
                &format!("{} does not match {}", path, given),
            )
        }
        (None, Some(given)) => {
            return message(
                StatusCode::CONFLICT,
                &format!("{} does not match {}", path, given),
            )
        }
        _ => {}
    }

    let bytes = match decode_bytes(&body.content) {
        Ok(bytes) => bytes,
        Err(_) => return message(StatusCode::UNPROCESSABLE_ENTITY, "content is not valid Base64"),
    };
    let status = if current.is_some() {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    let (sha, commit) = repo.write(&path, bytes, &body.message);

    (
        status,
        Json(json!({
            "content": { "path": path, "sha": sha },
            "commit": { "sha": commit, "message": body.message },
        })),
    )
        .into_response()
}

async fn delete_contents(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path((_owner, _repo, path)): Path<(String, String, String)>,
    Json(body): Json<DeleteRequest>,
) -> Response {
    if let Err(r) = authorize(&state, &headers) {
        return r;
    }
    let mut repo = state.lock().unwrap();

    let Some(current) = repo.files.get(&path).map(|b| b.sha.clone()) else {
        return message(StatusCode::NOT_FOUND, "Not Found");
    };
    if current != body.sha {
        return message(
            StatusCode::CONFLICT,
            &format!("{} does not match {}", path, body.sha),
        );
    }

    repo.files.remove(&path);
    let commit = repo.commit(&path, &body.message);
    Json(json!({ "content": null, "commit": { "sha": commit } })).into_response()
}

async fn list_commits(
    State(state): State<Shared>,
    headers: HeaderMap,
    Query(query): Query<CommitsQuery>,
) -> Response {
    if let Err(r) = authorize(&state, &headers) {
        return r;
    }
    let repo = state.lock().unwrap();
    let per_page = query.per_page.unwrap_or(30);

    let commits: Vec<Value> = repo
        .commits
        .iter()
        .rev()
        .filter(|c| query.path.as_deref().map_or(true, |p| c.path == p))
        .take(per_page)
        .map(|c| {
            json!({
                "sha": c.sha,
                "commit": {
                    "message": c.message,
                    "author": {
                        "name": "Octo Cat",
                        "email": "octo@example.com",
                        "date": c.date.to_rfc3339(),
                    },
                },
                "parents": c.parent.iter().map(|p| json!({ "sha": p })).collect::<Vec<_>>(),
            })
        })
        .collect();
    Json(Value::Array(commits)).into_response()
}
