//! Pusher-side HTTP API: directory listing plus a range-capable file-fetch
//! handler.

use std::path::{Path, PathBuf};

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use time::OffsetDateTime;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;
use tower_http::trace::TraceLayer;

use crate::transport::{DirEntry, ListDirectoryResponse};

#[derive(Clone)]
struct ServerState {
    root: PathBuf,
}

#[derive(Debug, Deserialize)]
struct PathQuery {
    #[serde(default)]
    path: String,
}

enum ApiError {
    NotFound,
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::NotFound => (StatusCode::NOT_FOUND, "not found").into_response(),
            ApiError::Internal(message) => (StatusCode::INTERNAL_SERVER_ERROR, message).into_response(),
        }
    }
}

fn reject_traversal(path: &str) -> Result<(), ApiError> {
    let candidate = Path::new(path);
    if candidate.is_absolute() {
        return Err(ApiError::Internal("invalid path".to_string()));
    }
    if candidate
        .components()
        .any(|c| matches!(c, std::path::Component::ParentDir))
    {
        return Err(ApiError::Internal("invalid path".to_string()));
    }
    Ok(())
}

async fn list_handler(
    State(state): State<ServerState>,
    Query(query): Query<PathQuery>,
) -> Result<Json<ListDirectoryResponse>, ApiError> {
    reject_traversal(&query.path)?;
    let dir = state.root.join(&query.path);

    let entries = tokio::task::spawn_blocking(move || read_entries(&dir))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))??;

    Ok(Json(ListDirectoryResponse { entries }))
}

fn read_entries(dir: &Path) -> Result<Vec<DirEntry>, ApiError> {
    let read_dir = std::fs::read_dir(dir).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ApiError::NotFound
        } else {
            ApiError::Internal(format!("failed to list directory: {e}"))
        }
    })?;

    let mut result = Vec::new();
    for entry in read_dir {
        let entry = entry.map_err(|e| ApiError::Internal(format!("failed to read entry: {e}")))?;
        let metadata = entry
            .metadata()
            .map_err(|e| ApiError::Internal(format!("failed to stat file: {e}")))?;

        let mode = {
            use std::os::unix::fs::PermissionsExt;
            metadata.permissions().mode()
        };
        let mod_time = metadata
            .modified()
            .map(OffsetDateTime::from)
            .unwrap_or(OffsetDateTime::UNIX_EPOCH);

        result.push(DirEntry {
            is_dir: metadata.is_dir(),
            name: entry.file_name().to_string_lossy().into_owned(),
            mode,
            size: metadata.len(),
            mod_time,
        });
    }

    Ok(result)
}

/// Parses a single, standard, inclusive `Range: bytes=START-END` header.
/// Multi-range requests are not supported.
fn parse_range(headers: &HeaderMap, file_size: u64) -> Result<Option<(u64, u64)>, ApiError> {
    let Some(value) = headers.get(axum::http::header::RANGE) else {
        return Ok(None);
    };
    let value = value
        .to_str()
        .map_err(|_| ApiError::Internal("invalid Range header".to_string()))?;
    let spec = value
        .strip_prefix("bytes=")
        .ok_or_else(|| ApiError::Internal("unsupported Range unit".to_string()))?;
    let (start_s, end_s) = spec
        .split_once('-')
        .ok_or_else(|| ApiError::Internal("malformed Range header".to_string()))?;

    let start: u64 = start_s
        .parse()
        .map_err(|_| ApiError::Internal("malformed Range start".to_string()))?;
    let end: u64 = if end_s.is_empty() {
        file_size.saturating_sub(1)
    } else {
        end_s
            .parse()
            .map_err(|_| ApiError::Internal("malformed Range end".to_string()))?
    };

    if start > end || end >= file_size {
        return Err(ApiError::Internal("Range not satisfiable".to_string()));
    }

    Ok(Some((start, end)))
}

async fn fetch_handler(
    State(state): State<ServerState>,
    Query(query): Query<PathQuery>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    reject_traversal(&query.path)?;
    let path = state.root.join(&query.path);

    let mut file = tokio::fs::File::open(&path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ApiError::NotFound
        } else {
            ApiError::Internal(format!("failed to open file: {e}"))
        }
    })?;
    let file_size = file
        .metadata()
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .len();

    match parse_range(&headers, file_size)? {
        Some((start, end)) => {
            file.seek(std::io::SeekFrom::Start(start))
                .await
                .map_err(|e| ApiError::Internal(e.to_string()))?;
            let len = end - start + 1;
            let stream = ReaderStream::new(file.take(len));
            let body = Body::from_stream(stream);

            Ok((
                StatusCode::PARTIAL_CONTENT,
                [
                    ("Content-Range", format!("bytes {start}-{end}/{file_size}")),
                    ("Content-Length", len.to_string()),
                    ("Accept-Ranges", "bytes".to_string()),
                ],
                body,
            )
                .into_response())
        }
        None => {
            let stream = ReaderStream::new(file);
            let body = Body::from_stream(stream);
            Ok((
                StatusCode::OK,
                [
                    ("Content-Length", file_size.to_string()),
                    ("Accept-Ranges", "bytes".to_string()),
                ],
                body,
            )
                .into_response())
        }
    }
}

/// Build the pusher's axum router: `/ls` for listings, `/fetch` for a
/// range-capable file service rooted at `root`.
pub fn router(root: PathBuf) -> Router {
    let state = ServerState { root };

    Router::new()
        .route("/ls", get(list_handler))
        .route("/fetch", get(fetch_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn list_handler_lists_directory_entries() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"hello").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();

        let entries = read_entries(dir.path()).unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert!(names.contains(&"a.txt"));
        assert!(names.contains(&"sub"));

        let file_entry = entries.iter().find(|e| e.name == "a.txt").unwrap();
        assert!(!file_entry.is_dir);
        assert_eq!(file_entry.size, 5);

        let dir_entry = entries.iter().find(|e| e.name == "sub").unwrap();
        assert!(dir_entry.is_dir);
    }

    #[test]
    fn read_entries_on_missing_dir_is_not_found() {
        let err = read_entries(Path::new("/does/not/exist/at/all"));
        assert!(matches!(err, Err(ApiError::NotFound)));
    }

    #[test]
    fn traversal_paths_are_rejected() {
        assert!(reject_traversal("../../etc/passwd").is_err());
        assert!(reject_traversal("a/b/c").is_ok());
    }

    #[test]
    fn absolute_paths_are_rejected() {
        // PathBuf::join replaces the base entirely when the argument is
        // absolute, so an absolute path must never reach `root.join(..)`.
        assert!(reject_traversal("/etc/passwd").is_err());
        assert!(reject_traversal("/").is_err());
    }

    #[test]
    fn range_header_parses_inclusive_bounds() {
        let mut headers = HeaderMap::new();
        headers.insert(axum::http::header::RANGE, "bytes=0-99".parse().unwrap());
        let parsed = parse_range(&headers, 1000).unwrap();
        assert_eq!(parsed, Some((0, 99)));
    }

    #[test]
    fn range_header_rejects_out_of_bounds() {
        let mut headers = HeaderMap::new();
        headers.insert(axum::http::header::RANGE, "bytes=0-2000".parse().unwrap());
        assert!(parse_range(&headers, 1000).is_err());
    }

    #[test]
    fn missing_range_header_means_whole_file() {
        let headers = HeaderMap::new();
        assert_eq!(parse_range(&headers, 1000).unwrap(), None);
    }
}
