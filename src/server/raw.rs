//! Raw blob delivery, GitHub's `raw.githubusercontent.com` shape.

use std::panic::AssertUnwindSafe;
use std::path::PathBuf;

use axum::body::Body;
use axum::extract::{Path, Request, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use gitbox::repo::Repo;
use gitbox::worktree;

use super::{AppState, blocking};

//================================================================================================
// Types
//================================================================================================

/// What a raw-request observer gets to see.
#[derive(Debug, Clone)]
pub struct RawHit {
    /// The request URI as received.
    pub uri: String,
    /// The resolved repository directory.
    pub repo_path: PathBuf,
    /// The blob path inside the repository.
    pub file_path: String,
    /// The ref the blob was resolved against.
    pub refname: String,
}

//================================================================================================
// Functions
//================================================================================================

/// `GET /raw/:owner/:repo/:ref/*path`
pub(crate) async fn prefixed(
    State(state): State<AppState>,
    Path((owner, repo, rest)): Path<(String, String, String)>,
    req: Request,
) -> Response {
    serve(state, owner, repo, rest, req.uri().to_string()).await
}

/// Shared implementation for both raw route shapes.
pub(crate) async fn serve(
    state: AppState,
    owner: String,
    repo: String,
    rest: String,
    uri: String,
) -> Response {
    let repo_path = state.repos.resolve(&owner, &repo);
    let observed_path = repo_path.clone();

    let result = blocking(move || {
        let git = Repo::open(&repo_path)?;
        let split = git.split_ref_path(&rest)?;
        if split.path.is_empty() {
            return Err(gitbox::Error::NotFound);
        }
        let include_uncommitted = git.is_checked_out(&split.refname);
        let (oid, bytes) =
            worktree::raw_content(&git, &split.refname, &split.path, include_uncommitted)?;
        Ok((oid, bytes, split))
    })
    .await;

    match result {
        Ok((oid, bytes, split)) => {
            if let Some(observer) = &state.observer {
                let hit = RawHit {
                    uri,
                    repo_path: observed_path,
                    file_path: split.path.clone(),
                    refname: split.refname.clone(),
                };
                // Observer misbehavior must never break delivery.
                if std::panic::catch_unwind(AssertUnwindSafe(|| observer(&hit))).is_err() {
                    tracing::warn!(uri = %hit.uri, "raw request observer panicked");
                }
            }

            Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, content_type(&split.path))
                .header(header::ETAG, oid.to_string())
                .header(
                    header::CACHE_CONTROL,
                    "max-age=0, private, must-revalidate",
                )
                .body(Body::from(bytes))
                .unwrap_or_default()
        }
        Err(e) if e.is_not_found() => not_found(),
        Err(e) => {
            tracing::error!(error = %e, "raw delivery failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// The plain-text 404 used by the raw surface.
pub(crate) fn not_found() -> Response {
    Response::builder()
        .status(StatusCode::NOT_FOUND)
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(Body::from("not found."))
        .unwrap_or_default()
}

/// Content type by file extension, `text/plain` when unknown.
pub(crate) fn content_type(path: &str) -> &'static str {
    let ext = path
        .rsplit('/')
        .next()
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "js" | "mjs" => "application/javascript",
        "json" => "application/json",
        "xml" => "application/xml",
        "md" | "markdown" => "text/markdown",
        "txt" | "log" => "text/plain",
        "csv" => "text/csv",
        "pdf" => "application/pdf",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "ico" => "image/x-icon",
        "webp" => "image/webp",
        "wasm" => "application/wasm",
        "zip" => "application/zip",
        "gz" | "tgz" => "application/x-gzip",
        "tar" => "application/x-tar",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "mp4" => "video/mp4",
        _ => "text/plain",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_type_by_extension() {
        assert_eq!(content_type("docs/index.html"), "text/html");
        assert_eq!(content_type("a/b/picture.PNG"), "image/png");
        assert_eq!(content_type("README"), "text/plain");
        assert_eq!(content_type("archive.tar"), "application/x-tar");
    }
}
