//! Object-database reads: blobs, trees, and traversal from a commit.

use gix::ObjectId;

use crate::repo::{Repo, is_full_sha};
use crate::{Error, Result};

//================================================================================================
// Types
//================================================================================================

/// The object types surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    /// A file's contents.
    Blob,
    /// A directory listing.
    Tree,
    /// A commit.
    Commit,
    /// An annotated tag.
    Tag,
}

/// A single entry produced by tree enumeration.
#[derive(Debug, Clone)]
pub struct TreeEntry {
    /// Slash-separated path relative to the enumeration root.
    pub path: String,
    /// Six-digit octal mode, zero padded.
    pub mode: &'static str,
    /// Entry type; `Commit` marks a submodule.
    pub kind: ObjectKind,
    /// The entry's object id.
    pub oid: ObjectId,
    /// Byte size, blobs only.
    pub size: Option<u64>,
}

/// An object located beneath a commit by path.
#[derive(Debug, Clone)]
pub struct ResolvedObject {
    /// Blob or tree.
    pub kind: ObjectKind,
    /// The object id.
    pub oid: ObjectId,
    /// The raw object bytes.
    pub data: Vec<u8>,
}

//================================================================================================
// Impls
//================================================================================================

impl ObjectKind {
    /// The lowercase wire name GitHub uses for this type.
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Blob => "blob",
            ObjectKind::Tree => "tree",
            ObjectKind::Commit => "commit",
            ObjectKind::Tag => "tag",
        }
    }
}

impl From<gix::object::Kind> for ObjectKind {
    fn from(kind: gix::object::Kind) -> Self {
        match kind {
            gix::object::Kind::Blob => ObjectKind::Blob,
            gix::object::Kind::Tree => ObjectKind::Tree,
            gix::object::Kind::Commit => ObjectKind::Commit,
            gix::object::Kind::Tag => ObjectKind::Tag,
        }
    }
}

//================================================================================================
// Functions
//================================================================================================

/// Reads an object's kind and raw bytes straight from the database.
pub fn object_data(repo: &Repo, oid: ObjectId) -> Result<(ObjectKind, Vec<u8>)> {
    let object = repo.git().find_object(oid).map_err(|_| Error::NotFound)?;
    Ok((object.kind.into(), object.data.clone()))
}

/// The blob id at `path` within the given commit's tree.
pub fn blob_at(repo: &Repo, commit: ObjectId, path: &str) -> Result<ObjectId> {
    let resolved = resolve_object(repo, commit, path)?;
    match resolved.kind {
        ObjectKind::Blob => Ok(resolved.oid),
        _ => Err(Error::NotFound),
    }
}

/// Walks the commit's tree to the blob or tree at `path`.
///
/// An empty path resolves to the root tree itself.
pub fn resolve_object(repo: &Repo, commit: ObjectId, path: &str) -> Result<ResolvedObject> {
    let commit_id = repo.peel_to_commit(commit)?;
    let commit = repo
        .git()
        .find_commit(commit_id)
        .map_err(|_| Error::NotFound)?;
    let tree = commit.tree().map_err(Error::git)?;

    if path.is_empty() {
        let oid = tree.id;
        let data = tree.data.clone();
        return Ok(ResolvedObject {
            kind: ObjectKind::Tree,
            oid,
            data,
        });
    }

    let entry = tree
        .lookup_entry_by_path(path)
        .map_err(Error::git)?
        .ok_or(Error::NotFound)?;
    let mode = entry.mode();
    let object = entry.object().map_err(|_| Error::NotFound)?;
    let kind = if mode.is_tree() {
        ObjectKind::Tree
    } else if mode.is_blob() || mode.is_link() {
        ObjectKind::Blob
    } else {
        // Submodule entries point at commits in another repository; there
        // is nothing to serve for them.
        return Err(Error::NotFound);
    };
    Ok(ResolvedObject {
        kind,
        oid: object.id,
        data: object.data.clone(),
    })
}

/// Resolves a ref, full sha, or shortened sha to a tree id.
///
/// A full sha is read directly: trees pass through, commits yield their
/// tree, annotated tags are chased to whatever they ultimately point at.
/// Anything else resolves as a ref or shortened prefix to a commit first.
pub fn resolve_tree(repo: &Repo, ref_or_sha: &str) -> Result<ObjectId> {
    if is_full_sha(ref_or_sha) {
        let oid = ObjectId::from_hex(ref_or_sha.as_bytes()).map_err(|_| Error::NotFound)?;
        let object = repo.git().find_object(oid).map_err(|_| Error::NotFound)?;
        return match object.kind {
            gix::object::Kind::Tree => Ok(oid),
            gix::object::Kind::Commit | gix::object::Kind::Tag => {
                let tree = object
                    .peel_to_kind(gix::object::Kind::Tree)
                    .map_err(|_| Error::NotFound)?;
                Ok(tree.id)
            }
            gix::object::Kind::Blob => Err(Error::TypeMismatch {
                expected: "tree",
                found: "blob",
            }),
        };
    }

    let commit = repo.resolve_commit(ref_or_sha)?;
    let commit = repo
        .git()
        .find_commit(commit)
        .map_err(|_| Error::NotFound)?;
    Ok(commit.tree_id().map_err(Error::git)?.detach())
}

/// Enumerates a tree, optionally recursing into subtrees.
///
/// Entries come out in depth-first order; a subtree's own record precedes
/// its children and nested paths are slash separated.
pub fn tree_entries(repo: &Repo, tree: ObjectId, recursive: bool) -> Result<Vec<TreeEntry>> {
    let mut acc = Vec::new();
    collect_tree_entries(repo, tree, "", recursive, &mut acc)?;
    Ok(acc)
}

/// Depth-first enumeration into `acc`; subtrees are re-fetched by oid when
/// recursing.
pub fn collect_tree_entries(
    repo: &Repo,
    tree: ObjectId,
    prefix: &str,
    deep: bool,
    acc: &mut Vec<TreeEntry>,
) -> Result<()> {
    let tree = repo.git().find_tree(tree).map_err(|_| Error::NotFound)?;

    for entry in tree.iter() {
        let entry = entry.map_err(Error::git)?;
        let name = entry.filename().to_string();
        let path = if prefix.is_empty() {
            name
        } else {
            format!("{prefix}/{name}")
        };
        let oid = entry.oid().to_owned();
        let mode = entry.mode();
        let (mode_str, kind) = describe_mode(mode);

        let size = match kind {
            ObjectKind::Blob => Some(object_data(repo, oid)?.1.len() as u64),
            _ => None,
        };

        acc.push(TreeEntry {
            path: path.clone(),
            mode: mode_str,
            kind,
            oid,
            size,
        });

        if deep && mode.is_tree() {
            collect_tree_entries(repo, oid, &path, deep, acc)?;
        }
    }
    Ok(())
}

fn describe_mode(mode: gix::object::tree::EntryMode) -> (&'static str, ObjectKind) {
    use gix::object::tree::EntryKind;
    match mode.kind() {
        EntryKind::Tree => ("040000", ObjectKind::Tree),
        EntryKind::Blob => ("100644", ObjectKind::Blob),
        EntryKind::BlobExecutable => ("100755", ObjectKind::Blob),
        EntryKind::Link => ("120000", ObjectKind::Blob),
        EntryKind::Commit => ("160000", ObjectKind::Commit),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::Fixture;

    #[test]
    fn resolves_committed_blob() -> anyhow::Result<()> {
        let fx = Fixture::basic()?;
        let repo = Repo::open(fx.repo_path())?;
        let commit = repo.resolve_commit("main")?;

        let oid = blob_at(&repo, commit, "README.md")?;
        let (kind, data) = object_data(&repo, oid)?;
        assert_eq!(kind, ObjectKind::Blob);
        assert_eq!(data, b"# readme\n");
        Ok(())
    }

    #[test]
    fn path_lookup_is_exact_case() -> anyhow::Result<()> {
        let fx = Fixture::basic()?;
        let repo = Repo::open(fx.repo_path())?;
        let commit = repo.resolve_commit("main")?;
        assert!(matches!(
            blob_at(&repo, commit, "rEaDmE.md"),
            Err(Error::NotFound)
        ));
        Ok(())
    }

    #[test]
    fn resolves_directory_to_tree() -> anyhow::Result<()> {
        let fx = Fixture::basic()?;
        let repo = Repo::open(fx.repo_path())?;
        let commit = repo.resolve_commit("main")?;
        let resolved = resolve_object(&repo, commit, "sub")?;
        assert_eq!(resolved.kind, ObjectKind::Tree);
        Ok(())
    }

    #[test]
    fn recursive_enumeration_counts() -> anyhow::Result<()> {
        // Three blobs and two subtrees: README.md, sub/, sub/sub/,
        // sub/sub/some_file.txt plus one extra blob.
        let fx = Fixture::basic()?;
        fx.write("sub/other.txt", "more\n")?;
        fx.commit_all("add another blob")?;

        let repo = Repo::open(fx.repo_path())?;
        let tree = resolve_tree(&repo, "main")?;
        let entries = tree_entries(&repo, tree, true)?;

        let blobs = entries
            .iter()
            .filter(|e| e.kind == ObjectKind::Blob)
            .count();
        let trees = entries
            .iter()
            .filter(|e| e.kind == ObjectKind::Tree)
            .count();
        assert_eq!(blobs, 3);
        assert_eq!(trees, 2);
        assert!(entries.iter().any(|e| e.path == "sub/sub/some_file.txt"));
        Ok(())
    }

    #[test]
    fn flat_enumeration_stays_shallow() -> anyhow::Result<()> {
        let fx = Fixture::basic()?;
        let repo = Repo::open(fx.repo_path())?;
        let tree = resolve_tree(&repo, "main")?;
        let entries = tree_entries(&repo, tree, false)?;
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| !e.path.contains('/')));
        Ok(())
    }

    #[test]
    fn tree_resolves_from_tag_and_sha() -> anyhow::Result<()> {
        let fx = Fixture::basic()?;
        let repo = Repo::open(fx.repo_path())?;
        let via_tag = resolve_tree(&repo, "v1.0")?;
        let commit = repo.resolve_commit("v1.0")?.to_string();
        let via_sha = resolve_tree(&repo, &commit)?;
        assert_eq!(via_tag, via_sha);

        let direct = resolve_tree(&repo, &via_tag.to_string())?;
        assert_eq!(direct, via_tag);
        Ok(())
    }

    #[test]
    fn blob_sha_is_a_type_error_for_trees() -> anyhow::Result<()> {
        let fx = Fixture::basic()?;
        let repo = Repo::open(fx.repo_path())?;
        let commit = repo.resolve_commit("main")?;
        let blob = blob_at(&repo, commit, "README.md")?;
        assert!(matches!(
            resolve_tree(&repo, &blob.to_string()),
            Err(Error::TypeMismatch { .. })
        ));
        Ok(())
    }
}
