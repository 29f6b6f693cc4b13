//! Serde shapes mirroring the GitHub REST schema, to the extent the
//! compatible surface documents them.

use serde::Serialize;

//================================================================================================
// Types
//================================================================================================

/// The JSON error body used by API routes.
#[derive(Debug, Serialize)]
pub(crate) struct ErrorBody {
    pub message: String,
    pub documentation_url: String,
}

/// `GET …/git/blobs/:sha`.
#[derive(Debug, Serialize)]
pub(crate) struct Blob {
    pub sha: String,
    pub size: u64,
    pub url: String,
    pub content: String,
    pub encoding: &'static str,
}

/// `GET …/git/trees/:ref`.
#[derive(Debug, Serialize)]
pub(crate) struct Tree {
    pub sha: String,
    pub url: String,
    pub tree: Vec<TreeItem>,
    pub truncated: bool,
}

/// One entry of a tree listing.
#[derive(Debug, Serialize)]
pub(crate) struct TreeItem {
    pub path: String,
    pub mode: &'static str,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub sha: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// `GET …/contents/:path` for files, and each element of a directory
/// listing. Directory listings omit `content`/`encoding`.
#[derive(Debug, Serialize)]
pub(crate) struct Contents {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub name: String,
    pub path: String,
    pub sha: String,
    pub size: u64,
    pub url: String,
    pub html_url: String,
    pub git_url: String,
    pub download_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoding: Option<&'static str>,
    pub _links: Links,
}

/// The `_links` object on content responses.
#[derive(Debug, Serialize)]
pub(crate) struct Links {
    #[serde(rename = "self")]
    pub this: String,
    pub git: String,
    pub html: String,
}

/// One element of `GET …/commits`.
#[derive(Debug, Serialize)]
pub(crate) struct Commit {
    pub sha: String,
    pub node_id: &'static str,
    pub commit: CommitBody,
    pub url: String,
    pub html_url: String,
    pub comments_url: String,
    pub author: Avatar,
    pub committer: Avatar,
    pub parents: Vec<Parent>,
}

/// The nested `commit` object.
#[derive(Debug, Serialize)]
pub(crate) struct CommitBody {
    pub author: Person,
    pub committer: Person,
    pub message: String,
    pub tree: ShaUrl,
    pub url: String,
    pub comment_count: u32,
    pub verification: Verification,
}

/// Author or committer identity with an ISO-8601 date.
#[derive(Debug, Serialize)]
pub(crate) struct Person {
    pub name: String,
    pub email: String,
    pub date: String,
}

/// A `{sha, url}` pair.
#[derive(Debug, Serialize)]
pub(crate) struct ShaUrl {
    pub sha: String,
    pub url: String,
}

/// Signature verification is not implemented; the field shape is kept.
#[derive(Debug, Serialize)]
pub(crate) struct Verification {
    pub verified: bool,
    pub reason: &'static str,
    pub signature: &'static str,
    pub payload: &'static str,
}

/// The top-level author/committer objects carry gravatar pointers.
#[derive(Debug, Serialize)]
pub(crate) struct Avatar {
    pub avatar_url: String,
    pub gravatar_id: &'static str,
}

/// A parent-commit reference.
#[derive(Debug, Serialize)]
pub(crate) struct Parent {
    pub sha: String,
    pub url: String,
    pub html_url: String,
}

//================================================================================================
// Impls
//================================================================================================

impl Verification {
    pub(crate) fn unimplemented() -> Self {
        Self {
            verified: false,
            reason: "not implemented",
            signature: "not implemented",
            payload: "not implemented",
        }
    }
}
