//! Handlers for the GitHub-compatible JSON API.

use axum::Json;
use axum::body::Body;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::Response;
use base64::prelude::{BASE64_STANDARD, Engine as _};
use gitbox::objects::{self, ObjectKind};
use gitbox::repo::{Repo, is_full_sha, normalize_path};
use gitbox::{CommitDetail, history};
use md5::{Digest, Md5};
use serde::Deserialize;

use super::error::ApiError;
use super::{AppState, UrlBase, models};

//================================================================================================
// Types
//================================================================================================

#[derive(Deserialize)]
pub(crate) struct TreeQuery {
    recursive: Option<String>,
}

#[derive(Deserialize)]
pub(crate) struct ContentsQuery {
    #[serde(rename = "ref")]
    refname: Option<String>,
}

#[derive(Deserialize)]
pub(crate) struct CommitsQuery {
    sha: Option<String>,
    path: Option<String>,
}

//================================================================================================
// Functions
//================================================================================================

/// Runs a blocking handler body off the async worker threads.
async fn blocking_api<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
}

/// `GET /api/repos/:owner/:repo/git/blobs/:sha`
pub(crate) async fn blob(
    State(state): State<AppState>,
    Path((owner, repo, sha)): Path<(String, String, String)>,
    UrlBase(base): UrlBase,
) -> Result<Json<models::Blob>, ApiError> {
    if !is_full_sha(&sha) {
        return Err(ApiError::InvalidSha);
    }

    let path = state.repos.resolve(&owner, &repo);
    let wanted = sha.clone();
    let data = blocking_api(move || {
        let repo = Repo::open(&path)?;
        let oid = repo.resolve_oid(&wanted)?;
        let (kind, data) = objects::object_data(&repo, oid)?;
        if kind != ObjectKind::Blob {
            return Err(ApiError::not_found());
        }
        Ok(data)
    })
    .await?;

    let url = format!("{base}/api/repos/{owner}/{repo}/git/blobs/{sha}");
    Ok(Json(models::Blob {
        size: data.len() as u64,
        content: format!("{}\n", BASE64_STANDARD.encode(&data)),
        encoding: "base64",
        sha,
        url,
    }))
}

/// `GET /api/repos/:owner/:repo/git/trees/:refOrSha?recursive=…`
pub(crate) async fn tree(
    State(state): State<AppState>,
    Path((owner, repo, refsha)): Path<(String, String, String)>,
    Query(query): Query<TreeQuery>,
    UrlBase(base): UrlBase,
) -> Result<Json<models::Tree>, ApiError> {
    let recursive = query.recursive.is_some_and(|v| !v.is_empty());
    let path = state.repos.resolve(&owner, &repo);

    let (tree_id, entries) = blocking_api(move || {
        let repo = Repo::open(&path)?;
        let tree_id = objects::resolve_tree(&repo, refsha.trim_matches('/'))?;
        let entries = objects::tree_entries(&repo, tree_id, recursive)?;
        Ok((tree_id, entries))
    })
    .await?;

    let sha = tree_id.to_string();
    let items = entries
        .into_iter()
        .map(|entry| {
            let sha = entry.oid.to_string();
            let url = match entry.kind {
                ObjectKind::Blob => {
                    Some(format!("{base}/api/repos/{owner}/{repo}/git/blobs/{sha}"))
                }
                ObjectKind::Tree => {
                    Some(format!("{base}/api/repos/{owner}/{repo}/git/trees/{sha}"))
                }
                // Submodules point outside this repository.
                _ => None,
            };
            models::TreeItem {
                path: entry.path,
                mode: entry.mode,
                kind: entry.kind.as_str(),
                sha,
                size: entry.size,
                url,
            }
        })
        .collect();

    Ok(Json(models::Tree {
        url: format!("{base}/api/repos/{owner}/{repo}/git/trees/{sha}"),
        sha,
        tree: items,
        truncated: false,
    }))
}

/// `GET /api/repos/:owner/:repo/contents` (repository root)
pub(crate) async fn contents_root(
    state: State<AppState>,
    Path((owner, repo)): Path<(String, String)>,
    query: Query<ContentsQuery>,
    base: UrlBase,
) -> Result<Response, ApiError> {
    contents_at(state, owner, repo, String::new(), query, base).await
}

/// `GET /api/repos/:owner/:repo/contents/*path?ref=…`
pub(crate) async fn contents(
    state: State<AppState>,
    Path((owner, repo, path)): Path<(String, String, String)>,
    query: Query<ContentsQuery>,
    base: UrlBase,
) -> Result<Response, ApiError> {
    contents_at(state, owner, repo, path, query, base).await
}

async fn contents_at(
    State(state): State<AppState>,
    owner: String,
    repo: String,
    path: String,
    Query(query): Query<ContentsQuery>,
    UrlBase(base): UrlBase,
) -> Result<Response, ApiError> {
    let repo_path = state.repos.resolve(&owner, &repo);
    let rel = normalize_path(&path);
    let requested = query.refname.filter(|r| !r.is_empty());

    let body = blocking_api(move || {
        let git = Repo::open(&repo_path).map_err(|e| ref_not_found(e, requested.as_deref()))?;
        let refname = match requested.clone() {
            Some(r) => r,
            None => git.default_branch()?,
        };
        let missing = |e| ref_not_found(e, Some(&refname));

        let commit = git.resolve_commit(&refname).map_err(missing)?;
        let resolved = objects::resolve_object(&git, commit, &rel).map_err(missing)?;

        let json = match resolved.kind {
            ObjectKind::Blob => {
                let item = content_item(
                    &base,
                    &owner,
                    &repo,
                    &refname,
                    &rel,
                    resolved.oid.to_string(),
                    resolved.data.len() as u64,
                    true,
                    Some(format!("{}\n", BASE64_STANDARD.encode(&resolved.data))),
                );
                serde_json::to_value(item)
            }
            ObjectKind::Tree => {
                let entries = objects::tree_entries(&git, resolved.oid, false).map_err(missing)?;
                let items: Vec<models::Contents> = entries
                    .into_iter()
                    .map(|entry| {
                        let full = if rel.is_empty() {
                            entry.path.clone()
                        } else {
                            format!("{rel}/{}", entry.path)
                        };
                        content_item(
                            &base,
                            &owner,
                            &repo,
                            &refname,
                            &full,
                            entry.oid.to_string(),
                            entry.size.unwrap_or(0),
                            entry.kind == ObjectKind::Blob,
                            None,
                        )
                    })
                    .collect();
                serde_json::to_value(items)
            }
            _ => return Err(ApiError::not_found()),
        };
        json.map_err(|e| ApiError::Internal(e.to_string()))
    })
    .await?;

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap_or_default())
}

/// `GET /api/repos/:owner/:repo/commits?sha=…&path=…`
pub(crate) async fn commits(
    State(state): State<AppState>,
    Path((owner, repo)): Path<(String, String)>,
    query: Result<Query<CommitsQuery>, QueryRejection>,
    UrlBase(base): UrlBase,
) -> Result<Json<Vec<models::Commit>>, ApiError> {
    let Query(query) = query.map_err(|_| ApiError::BadRequest)?;
    let sha = query.sha.filter(|s| !s.is_empty());
    let path = query
        .path
        .map(|p| p.trim_start_matches('/').to_string())
        .filter(|p| !p.is_empty());

    let repo_path = state.repos.resolve(&owner, &repo);
    let log = blocking_api(move || {
        let git = Repo::open(&repo_path)?;
        let refname = match sha {
            Some(s) => s,
            None => git.default_branch()?,
        };
        Ok(history::commit_log(&git, &refname, path.as_deref())?)
    })
    .await?;

    let commits = log
        .into_iter()
        .map(|detail| encode_commit(&base, &owner, &repo, detail))
        .collect();
    Ok(Json(commits))
}

/// `GET /api/repos/:owner/:repo/zipball[/:ref]`
pub(crate) async fn zipball(
    State(state): State<AppState>,
    Path((owner, repo, refname)): Path<(String, String, String)>,
    UrlBase(base): UrlBase,
) -> Result<Response, ApiError> {
    archive_redirect(&state, &base, &owner, &repo, "zip", Some(refname)).await
}

/// `GET /api/repos/:owner/:repo/zipball` with no ref.
pub(crate) async fn zipball_default(
    State(state): State<AppState>,
    Path((owner, repo)): Path<(String, String)>,
    UrlBase(base): UrlBase,
) -> Result<Response, ApiError> {
    archive_redirect(&state, &base, &owner, &repo, "zip", None).await
}

/// `GET /api/repos/:owner/:repo/tarball[/:ref]`
pub(crate) async fn tarball(
    State(state): State<AppState>,
    Path((owner, repo, refname)): Path<(String, String, String)>,
    UrlBase(base): UrlBase,
) -> Result<Response, ApiError> {
    archive_redirect(&state, &base, &owner, &repo, "tar.gz", Some(refname)).await
}

/// `GET /api/repos/:owner/:repo/tarball` with no ref.
pub(crate) async fn tarball_default(
    State(state): State<AppState>,
    Path((owner, repo)): Path<(String, String)>,
    UrlBase(base): UrlBase,
) -> Result<Response, ApiError> {
    archive_redirect(&state, &base, &owner, &repo, "tar.gz", None).await
}

/// Responds 302 to the matching codeload URL, filling in the default
/// branch when the request names no ref.
pub(crate) async fn archive_redirect(
    state: &AppState,
    base: &str,
    owner: &str,
    repo: &str,
    format: &str,
    refname: Option<String>,
) -> Result<Response, ApiError> {
    let refname = match refname.map(|r| r.trim_matches('/').to_string()) {
        Some(r) if !r.is_empty() => r,
        _ => {
            let path = state.repos.resolve(owner, repo);
            blocking_api(move || Ok(Repo::open(&path)?.default_branch()?)).await?
        }
    };

    let location = format!("{base}/codeload/{owner}/{repo}/{format}/{refname}");
    Response::builder()
        .status(StatusCode::FOUND)
        .header(header::LOCATION, location)
        .body(Body::empty())
        .map_err(|e| ApiError::Internal(e.to_string()))
}

/// Turns NotFound into the contents-specific 404 message.
fn ref_not_found(err: gitbox::Error, refname: Option<&str>) -> ApiError {
    match (&err, refname) {
        (gitbox::Error::NotFound, Some(refname)) => {
            ApiError::NotFound(format!("No commit found for the ref {refname}"))
        }
        _ => err.into(),
    }
}

#[allow(clippy::too_many_arguments)]
fn content_item(
    base: &str,
    owner: &str,
    repo: &str,
    refname: &str,
    path: &str,
    sha: String,
    size: u64,
    is_file: bool,
    content: Option<String>,
) -> models::Contents {
    let name = path.rsplit('/').next().unwrap_or(path).to_string();
    let url = format!("{base}/api/repos/{owner}/{repo}/contents/{path}?ref={refname}");
    let (kind, git_kind, html_kind) = if is_file {
        ("file", "blobs", "blob")
    } else {
        ("dir", "trees", "tree")
    };
    let git_url = format!("{base}/api/repos/{owner}/{repo}/git/{git_kind}/{sha}");
    let html_url = format!("{base}/{owner}/{repo}/{html_kind}/{refname}/{path}");
    let download_url = is_file.then(|| format!("{base}/raw/{owner}/{repo}/{refname}/{path}"));
    let encoding = (is_file && content.is_some()).then_some("base64");

    models::Contents {
        kind,
        name,
        path: path.to_string(),
        sha,
        size: if is_file { size } else { 0 },
        _links: models::Links {
            this: url.clone(),
            git: git_url.clone(),
            html: html_url.clone(),
        },
        url,
        html_url,
        git_url,
        download_url,
        content,
        encoding,
    }
}

fn encode_commit(base: &str, owner: &str, repo: &str, detail: CommitDetail) -> models::Commit {
    let sha = detail.id.to_string();
    let tree = detail.tree.to_string();
    let url = format!("{base}/api/repos/{owner}/{repo}/commits/{sha}");

    let person = |p: &history::CommitPerson| models::Person {
        name: p.name.clone(),
        email: p.email.clone(),
        date: iso8601_millis(p.seconds),
    };
    let avatar = |p: &history::CommitPerson| models::Avatar {
        avatar_url: gravatar_url(&p.email),
        gravatar_id: "",
    };

    models::Commit {
        node_id: "not implemented",
        commit: models::CommitBody {
            author: person(&detail.author),
            committer: person(&detail.committer),
            message: detail.message.clone(),
            tree: models::ShaUrl {
                url: format!("{base}/api/repos/{owner}/{repo}/git/trees/{tree}"),
                sha: tree,
            },
            url: url.clone(),
            comment_count: 0,
            verification: models::Verification::unimplemented(),
        },
        html_url: format!("{base}/{owner}/{repo}/commit/{sha}"),
        comments_url: format!("{base}/api/repos/{owner}/{repo}/commits/{sha}/comments"),
        author: avatar(&detail.author),
        committer: avatar(&detail.committer),
        parents: detail
            .parents
            .iter()
            .map(|parent| {
                let parent = parent.to_string();
                models::Parent {
                    url: format!("{base}/api/repos/{owner}/{repo}/commits/{parent}"),
                    html_url: format!("{base}/{owner}/{repo}/commit/{parent}"),
                    sha: parent,
                }
            })
            .collect(),
        url,
        sha,
    }
}

/// ISO-8601 with milliseconds, e.g. `2024-01-02T03:04:05.000Z`.
fn iso8601_millis(seconds: i64) -> String {
    chrono::DateTime::from_timestamp(seconds, 0)
        .map(|dt| dt.to_rfc3339_opts(chrono::SecondsFormat::Millis, true))
        .unwrap_or_default()
}

fn gravatar_url(email: &str) -> String {
    let digest = Md5::digest(email.trim().to_lowercase().as_bytes());
    format!("https://www.gravatar.com/avatar/{}", hex::encode(digest))
}
