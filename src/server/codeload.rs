//! Archive downloads, GitHub's `codeload.github.com` shape.

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use gitbox::archive::{self, ArchiveFormat, ArchiveSource};
use gitbox::repo::Repo;
use tokio_util::io::ReaderStream;

use super::{AppState, blocking, raw};

//================================================================================================
// Functions
//================================================================================================

/// `GET /codeload/:owner/:repo/(legacy.)?{zip,tar.gz}/:ref`
pub(crate) async fn download(
    State(state): State<AppState>,
    Path((owner, repo, format, refname)): Path<(String, String, String, String)>,
) -> Response {
    let Some(format) = ArchiveFormat::from_codeload(&format) else {
        return raw::not_found();
    };
    stream(state, owner, repo, refname, format).await
}

/// Builds (or fetches from cache) the archive and streams it out.
pub(crate) async fn stream(
    state: AppState,
    owner: String,
    repo: String,
    refname: String,
    format: ArchiveFormat,
) -> Response {
    let repo_path = state.repos.resolve(&owner, &repo);
    let cache_dir = state.cache_dir.path().to_path_buf();
    let refname = refname.trim_matches('/').to_string();

    let result = blocking(move || {
        let git = Repo::open(&repo_path)?;
        archive::produce(&git, &cache_dir, &owner, &repo, &refname, format)
    })
    .await;

    let archive = match result {
        Ok(archive) => archive,
        Err(e) if e.is_not_found() => return raw::not_found(),
        Err(e) => {
            tracing::error!(error = %e, "archive production failed");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let file = match archive.source {
        ArchiveSource::Cached(path) => match tokio::fs::File::open(path).await {
            Ok(file) => file,
            Err(e) => {
                tracing::error!(error = %e, "cached archive vanished");
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
        },
        ArchiveSource::Fresh(file) => tokio::fs::File::from_std(file),
    };

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, archive.mime)
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename={}", archive.filename),
        )
        .body(Body::from_stream(ReaderStream::new(file)))
        .unwrap_or_default()
}
