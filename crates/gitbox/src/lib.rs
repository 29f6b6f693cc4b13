//! # Gitbox
//!
//! The `gitbox` crate provides read access to a hierarchy of on-disk Git
//! repositories the way a hosting frontend needs it: URL segments resolve to
//! repository paths, refs resolve across branches, tags, and (possibly
//! shortened) object ids, and blob delivery understands the difference
//! between committed history and a still-dirty working tree.
//!
//! ## Architecture
//!
//! The crate is organized into several key modules:
//! - [`resolve`] - `owner/repo` to filesystem path mapping with traversal-safe sanitization
//! - [`repo`] - the per-request repository handle, ref enumeration and resolution
//! - [`objects`] - blob/tree/commit reads and tree traversal
//! - [`worktree`] - per-path working-tree status and uncommitted delivery
//! - [`history`] - commit log walks with optional path filtering
//! - [`archive`] - zip/tar.gz snapshots of a tree or the working directory
//!
//! The working-tree rule is the subtle part: uncommitted content is only
//! ever served when the repository is non-bare *and* the requested ref
//! resolves to the same commit as `HEAD`. Everything else reads straight
//! from the object database.

#![warn(missing_docs)]

use thiserror::Error as ThisError;

pub mod archive;
pub mod history;
pub mod objects;
pub mod repo;
pub mod resolve;
pub mod worktree;


pub use archive::{Archive, ArchiveFormat, ArchiveSource};
pub use history::CommitDetail;
pub use objects::{ObjectKind, ResolvedObject, TreeEntry};
pub use repo::Repo;
pub use resolve::RepoMap;
pub use worktree::WorktreeStatus;

//================================================================================================
// Types
//================================================================================================

/// An error encountered while reading from a repository.
#[derive(ThisError, Debug)]
pub enum Error {
    /// The ref, object, or path resolves to nothing.
    #[error("not found")]
    NotFound,
    /// The resolved object has a type the operation cannot work with.
    #[error("expected a {expected} object, found {found}")]
    TypeMismatch {
        /// The object type the operation needed.
        expected: &'static str,
        /// The object type that was actually found.
        found: &'static str,
    },
    /// A transparent wrapper for a [`std::io::Error`]
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// A transparent wrapper for a [`zip::result::ZipError`]
    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),
    /// Any other failure inside the underlying git plumbing.
    #[error("git: {0}")]
    Git(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),
}

/// The crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

//================================================================================================
// Impls
//================================================================================================

impl Error {
    /// Wraps an arbitrary git plumbing error.
    pub fn git<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::Git(Box::new(err))
    }

    /// True when this error should surface as a 404 rather than a 500.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound)
    }
}
