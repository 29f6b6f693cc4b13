//! Maps `owner/repo` URL segments onto repository directories.
//!
//! Virtual mounts are trusted verbatim; everything else is sanitized and
//! joined under the configured root so that no request can escape it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

//================================================================================================
// Types
//================================================================================================

/// Resolves `(owner, repo)` pairs to filesystem paths.
#[derive(Debug, Clone, Default)]
pub struct RepoMap {
    root: PathBuf,
    mounts: HashMap<String, HashMap<String, PathBuf>>,
}

//================================================================================================
// Impls
//================================================================================================

impl RepoMap {
    /// Creates a resolver rooted at `root` with the given virtual mounts.
    pub fn new(root: impl Into<PathBuf>, mounts: HashMap<String, HashMap<String, PathBuf>>) -> Self {
        Self {
            root: root.into(),
            mounts,
        }
    }

    /// The configured repository root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves an `(owner, repo)` pair to a repository directory.
    ///
    /// A configured virtual mount wins and its path is returned verbatim.
    /// Otherwise both segments are sanitized and joined under the root;
    /// existence is not checked here, unresolvable repositories surface as
    /// NotFound when the directory is opened.
    pub fn resolve(&self, owner: &str, repo: &str) -> PathBuf {
        if let Some(path) = self.mounts.get(owner).and_then(|m| m.get(repo)) {
            return path.clone();
        }
        self.root
            .join(sanitize_segment(owner))
            .join(sanitize_segment(repo))
    }
}

//================================================================================================
// Functions
//================================================================================================

/// Coerces a URL segment into a safe directory name.
///
/// Every character outside `[A-Za-z0-9_.-]` becomes `-`, and the exact
/// strings `.` and `..` become a same-length run of `-` so the join can
/// never traverse upwards.
pub fn sanitize_segment(segment: &str) -> String {
    if segment == "." || segment == ".." {
        return "-".repeat(segment.len());
    }
    segment
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                c
            } else {
                '-'
            }
        })
        .collect()
}
