//! Manual dispatch for routes the path router cannot express.
//!
//! `/:owner/:repo.git/*` embeds the repository name in a suffixed segment,
//! and the `raw`/`archive`/`blob`/`tree` shapes carry refs that may contain
//! slashes, so this fallback walks the path segments itself and hands off
//! to the matching handler.

use axum::extract::{Request, State};
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use gitbox::ArchiveFormat;

use super::{AppState, api, base_url, html, raw, smart};

//================================================================================================
// Functions
//================================================================================================

/// The router fallback; everything not matched by the static route table.
pub(crate) async fn fallback(State(state): State<AppState>, req: Request) -> Response {
    let path = req.uri().path().trim_start_matches('/').to_string();
    let segments: Vec<String> = path.split('/').map(str::to_string).collect();

    // Smart HTTP first: the transport accepts any method.
    if segments.len() >= 2 {
        if let Some(repo) = segments[1].strip_suffix(".git").filter(|r| !r.is_empty()) {
            let owner = segments[0].clone();
            let repo = repo.to_string();
            let tail = segments[2..].join("/");
            return smart::handle(state, owner, repo, tail, req).await;
        }
    }

    if req.method() != Method::GET {
        return StatusCode::NOT_FOUND.into_response();
    }

    match segments.as_slice() {
        [] => html::index(state).await,
        [root] if root.is_empty() => html::index(state).await,
        [owner, repo, action, rest @ ..] if !rest.is_empty() => {
            let owner = owner.clone();
            let repo = repo.clone();
            let rest = rest.join("/");
            match action.as_str() {
                "raw" => raw::serve(state, owner, repo, rest, req.uri().to_string()).await,
                "archive" => archive_redirect(state, owner, repo, rest, req).await,
                "blob" => html::blob_page(state, owner, repo, rest).await,
                "tree" => html::tree_page(state, owner, repo, rest).await,
                _ => html::repo_page(state, owner, repo).await,
            }
        }
        [owner, repo, ..] => html::repo_page(state, owner.clone(), repo.clone()).await,
        _ => raw::not_found(),
    }
}

/// `GET /:owner/:repo/archive/:ref.{zip,tar.gz}` responds 302 to codeload.
async fn archive_redirect(
    state: AppState,
    owner: String,
    repo: String,
    rest: String,
    req: Request,
) -> Response {
    let (refname, format) = if let Some(r) = rest.strip_suffix(".zip") {
        (r.to_string(), ArchiveFormat::Zip)
    } else if let Some(r) = rest.strip_suffix(".tar.gz") {
        (r.to_string(), ArchiveFormat::TarGz)
    } else {
        return raw::not_found();
    };
    if refname.is_empty() {
        return raw::not_found();
    }

    let format = match format {
        ArchiveFormat::Zip => "zip",
        ArchiveFormat::TarGz => "tar.gz",
    };
    let base = base_url(req.extensions(), req.headers(), &state);
    api::archive_redirect(&state, &base, &owner, &repo, format, Some(refname))
        .await
        .into_response()
}
