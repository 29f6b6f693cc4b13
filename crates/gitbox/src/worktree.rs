//! Working-tree delivery: per-path status and the committed-vs-dirty rule.
//!
//! Uncommitted content is only consulted when the caller has already
//! established that the requested ref is the currently checked-out commit;
//! this module then decides, per path, whether the committed blob, the
//! on-disk bytes, or nothing at all gets served.

use std::fs;
use std::path::Path;

use gix::ObjectId;

use crate::objects;
use crate::repo::Repo;
use crate::{Error, Result};

//================================================================================================
// Types
//================================================================================================

/// Per-path working-tree status, mirroring git's status classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorktreeStatus {
    /// On disk and identical to the committed blob.
    Unmodified,
    /// On disk with different contents than the committed blob.
    Modified,
    /// On disk but absent from the commit.
    Added,
    /// Committed but missing from disk.
    Deleted,
    /// Neither committed nor on disk.
    Absent,
    /// Matched by the ignore rules.
    Ignored,
}

//================================================================================================
// Functions
//================================================================================================

/// Classifies `path` against the given commit and the working tree.
pub fn status(repo: &Repo, commit: ObjectId, path: &str) -> Result<WorktreeStatus> {
    let workdir = repo.workdir().ok_or(Error::NotFound)?;
    let committed = match objects::blob_at(repo, commit, path) {
        Ok(oid) => Some(oid),
        Err(Error::NotFound) => None,
        Err(e) => return Err(e),
    };
    let on_disk = exists_case_sensitive(workdir, path)?;

    Ok(match (committed, on_disk) {
        (Some(oid), true) => {
            let disk = fs::read(workdir.join(path))?;
            let blob = objects::object_data(repo, oid)?.1;
            if disk == blob {
                WorktreeStatus::Unmodified
            } else {
                WorktreeStatus::Modified
            }
        }
        (Some(_), false) => WorktreeStatus::Deleted,
        (None, on_disk) => {
            if is_ignored(workdir, path)? {
                WorktreeStatus::Ignored
            } else if on_disk {
                WorktreeStatus::Added
            } else {
                WorktreeStatus::Absent
            }
        }
    })
}

/// Resolves the blob to serve for `(ref, path)`.
///
/// With `include_uncommitted` unset this is a plain committed-tree lookup.
/// Otherwise the working-tree status decides: unmodified paths serve the
/// committed blob, deleted or absent paths serve nothing, and any path with
/// bytes on disk serves those bytes. Dirty bytes are written into the
/// object store so the returned id stays resolvable through the blob API.
pub fn resolve_blob(
    repo: &Repo,
    ref_or_sha: &str,
    path: &str,
    include_uncommitted: bool,
) -> Result<ObjectId> {
    let commit = repo.resolve_commit(ref_or_sha)?;

    if !include_uncommitted {
        return objects::blob_at(repo, commit, path);
    }

    match status(repo, commit, path)? {
        WorktreeStatus::Unmodified => objects::blob_at(repo, commit, path),
        WorktreeStatus::Deleted | WorktreeStatus::Absent => Err(Error::NotFound),
        WorktreeStatus::Modified | WorktreeStatus::Added | WorktreeStatus::Ignored => {
            let workdir = repo.workdir().ok_or(Error::NotFound)?;
            // The file can disappear between the status probe and the read.
            let bytes = fs::read(workdir.join(path)).map_err(|_| Error::NotFound)?;
            let id = repo.git().write_blob(&bytes).map_err(Error::git)?;
            Ok(id.detach())
        }
    }
}

/// Reads the bytes of the blob served for `(ref, path)`.
pub fn raw_content(
    repo: &Repo,
    ref_or_sha: &str,
    path: &str,
    include_uncommitted: bool,
) -> Result<(ObjectId, Vec<u8>)> {
    let oid = resolve_blob(repo, ref_or_sha, path, include_uncommitted)?;
    let (_, data) = objects::object_data(repo, oid)?;
    Ok((oid, data))
}

/// Component-wise existence check that stays case-sensitive even on
/// case-insensitive filesystems.
pub fn exists_case_sensitive(root: &Path, rel: &str) -> Result<bool> {
    let mut dir = root.to_path_buf();
    let mut components = rel.split('/').filter(|c| !c.is_empty()).peekable();

    while let Some(component) = components.next() {
        let mut found = false;
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(_) => return Ok(false),
        };
        for entry in entries.filter_map(std::result::Result::ok) {
            if entry.file_name().to_string_lossy() == component {
                found = true;
                break;
            }
        }
        if !found {
            return Ok(false);
        }
        dir.push(component);
        if components.peek().is_some() && !dir.is_dir() {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Whether the ignore rules at the working-tree root match `path`.
fn is_ignored(workdir: &Path, path: &str) -> Result<bool> {
    let gitignore = workdir.join(".gitignore");
    if !gitignore.is_file() {
        return Ok(false);
    }
    let mut builder = ignore::gitignore::GitignoreBuilder::new(workdir);
    builder.add(gitignore);
    let matcher = builder.build().map_err(Error::git)?;
    let is_dir = workdir.join(path).is_dir();
    Ok(matcher.matched(path, is_dir).is_ignore())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::Fixture;

    #[test]
    fn classifies_each_status() -> anyhow::Result<()> {
        let fx = Fixture::basic()?;
        fx.write(".gitignore", "*.log\n")?;
        fx.commit_all("ignore logs")?;
        fx.write("README.md", "# changed\n")?;
        fx.write("new_file.txt", "fresh\n")?;
        fx.write("debug.log", "noise\n")?;
        fx.remove("sub/sub/some_file.txt")?;

        let repo = Repo::open(fx.repo_path())?;
        let head = repo.head_commit_id()?;

        assert_eq!(status(&repo, head, ".gitignore")?, WorktreeStatus::Unmodified);
        assert_eq!(status(&repo, head, "README.md")?, WorktreeStatus::Modified);
        assert_eq!(status(&repo, head, "new_file.txt")?, WorktreeStatus::Added);
        assert_eq!(
            status(&repo, head, "sub/sub/some_file.txt")?,
            WorktreeStatus::Deleted
        );
        assert_eq!(status(&repo, head, "nowhere.txt")?, WorktreeStatus::Absent);
        assert_eq!(status(&repo, head, "debug.log")?, WorktreeStatus::Ignored);
        Ok(())
    }

    #[test]
    fn serves_dirty_bytes_only_for_checked_out_ref() -> anyhow::Result<()> {
        let fx = Fixture::basic()?;
        fx.write("scratch.txt", "work in progress\n")?;

        let repo = Repo::open(fx.repo_path())?;
        let include = repo.is_checked_out("main");
        assert!(include);

        let (_, bytes) = raw_content(&repo, "main", "scratch.txt", include)?;
        assert_eq!(bytes, b"work in progress\n");

        // The same path at a non-HEAD ref must stay invisible.
        let include = repo.is_checked_out("branch/with_slash");
        assert!(!include);
        assert!(matches!(
            raw_content(&repo, "branch/with_slash", "scratch.txt", include),
            Err(Error::NotFound)
        ));
        Ok(())
    }

    #[test]
    fn unmodified_paths_serve_the_committed_blob() -> anyhow::Result<()> {
        let fx = Fixture::basic()?;
        let repo = Repo::open(fx.repo_path())?;

        let committed = resolve_blob(&repo, "main", "README.md", false)?;
        let dirty_aware = resolve_blob(&repo, "main", "README.md", true)?;
        assert_eq!(committed, dirty_aware);
        Ok(())
    }

    #[test]
    fn deleted_paths_vanish_from_the_checked_out_ref() -> anyhow::Result<()> {
        let fx = Fixture::basic()?;
        fx.remove("README.md")?;
        let repo = Repo::open(fx.repo_path())?;
        assert!(matches!(
            resolve_blob(&repo, "main", "README.md", true),
            Err(Error::NotFound)
        ));
        // The committed view is unaffected.
        assert!(resolve_blob(&repo, "main", "README.md", false).is_ok());
        Ok(())
    }

    #[test]
    fn existence_checks_are_case_sensitive() -> anyhow::Result<()> {
        let fx = Fixture::basic()?;
        let root = fx.repo_path();
        assert!(exists_case_sensitive(root, "README.md")?);
        assert!(!exists_case_sensitive(root, "rEaDmE.md")?);
        assert!(exists_case_sensitive(root, "sub/sub/some_file.txt")?);
        assert!(!exists_case_sensitive(root, "sub/SUB/some_file.txt")?);
        Ok(())
    }
}
