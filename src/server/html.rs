//! The stubbed HTML browse surface.
//!
//! These pages exist so that GitHub-shaped `blob`/`tree`/repository URLs
//! resolve; they return placeholders, not a real web UI. Paths that do not
//! resolve in the repository still 404 like the real thing.

use axum::body::Body;
use axum::http::{StatusCode, header};
use axum::response::Response;
use gitbox::objects::{self, ObjectKind};
use gitbox::repo::Repo;
use gitbox::worktree;

use super::{AppState, blocking, raw};

//================================================================================================
// Functions
//================================================================================================

/// `GET /:owner/:repo*` catch-all.
pub(crate) async fn repo_page(state: AppState, owner: String, repo: String) -> Response {
    let title = state.config.app_title.clone();
    let repo_path = state.repos.resolve(&owner, &repo);
    let result = blocking(move || Repo::open(&repo_path).map(|_| ())).await;
    match result {
        Ok(()) => page(&title, &format!("{owner}/{repo}")),
        Err(e) if e.is_not_found() => raw::not_found(),
        Err(e) => {
            tracing::error!(error = %e, "repository page failed");
            fail()
        }
    }
}

/// `GET /:owner/:repo/tree/:ref/*path`
pub(crate) async fn tree_page(
    state: AppState,
    owner: String,
    repo: String,
    rest: String,
) -> Response {
    let title = state.config.app_title.clone();
    let repo_path = state.repos.resolve(&owner, &repo);
    let result = blocking(move || {
        let git = Repo::open(&repo_path)?;
        let split = git.split_ref_path(&rest)?;
        let commit = git.resolve_commit(&split.refname)?;
        let resolved = objects::resolve_object(&git, commit, &split.path)?;
        if resolved.kind != ObjectKind::Tree {
            return Err(gitbox::Error::NotFound);
        }
        Ok(split)
    })
    .await;

    match result {
        Ok(split) => page(
            &title,
            &format!("{owner}/{repo} at {}: {}", split.refname, split.path),
        ),
        Err(e) if e.is_not_found() => raw::not_found(),
        Err(e) => {
            tracing::error!(error = %e, "tree page failed");
            fail()
        }
    }
}

/// `GET /:owner/:repo/blob/:ref/*path`
pub(crate) async fn blob_page(
    state: AppState,
    owner: String,
    repo: String,
    rest: String,
) -> Response {
    let title = state.config.app_title.clone();
    let repo_path = state.repos.resolve(&owner, &repo);
    let result = blocking(move || {
        let git = Repo::open(&repo_path)?;
        let split = git.split_ref_path(&rest)?;
        if split.path.is_empty() {
            return Err(gitbox::Error::NotFound);
        }
        let include = git.is_checked_out(&split.refname);
        worktree::resolve_blob(&git, &split.refname, &split.path, include)?;
        Ok(split)
    })
    .await;

    match result {
        Ok(split) => page(
            &title,
            &format!("{owner}/{repo}: {} at {}", split.path, split.refname),
        ),
        Err(e) if e.is_not_found() => raw::not_found(),
        Err(e) => {
            tracing::error!(error = %e, "blob page failed");
            fail()
        }
    }
}

/// `GET /`
pub(crate) async fn index(state: AppState) -> Response {
    page(&state.config.app_title, "serving local repositories")
}

fn page(title: &str, heading: &str) -> Response {
    let title = escape(title);
    let heading = escape(heading);
    let body = format!(
        "<!DOCTYPE html>\n<html>\n<head><title>{title}</title></head>\n\
         <body>\n<h1>{heading}</h1>\n<p>{title} browse UI is not implemented.</p>\n</body>\n</html>\n"
    );
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/html; charset=utf-8")
        .body(Body::from(body))
        .unwrap_or_default()
}

/// Owner, ref, and path segments are attacker-chosen bytes; git allows
/// `<`, `>`, `&`, and `"` in ref names and file paths.
fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

fn fail() -> Response {
    Response::builder()
        .status(StatusCode::INTERNAL_SERVER_ERROR)
        .body(Body::empty())
        .unwrap_or_default()
}
