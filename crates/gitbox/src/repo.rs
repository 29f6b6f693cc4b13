//! The per-request repository handle.
//!
//! A [`Repo`] wraps an opened [`gix::Repository`] together with the path it
//! was opened from. Handles are cheap to create and live for a single
//! request; nothing is cached across requests.

use std::path::{Path, PathBuf};

use gix::ObjectId;

use crate::{Error, Result};

//================================================================================================
// Types
//================================================================================================

/// An opened on-disk repository, bare or with a working tree.
pub struct Repo {
    inner: gix::Repository,
    path: PathBuf,
}

/// The outcome of splitting a `<ref>/<path…>` URL remainder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefAndPath {
    /// The ref portion; a branch, tag, or plausible (possibly short) sha.
    pub refname: String,
    /// The remaining path, possibly empty, without a leading slash.
    pub path: String,
}

//================================================================================================
// Impls
//================================================================================================

impl Repo {
    /// Opens the repository at `path`.
    ///
    /// A missing or unrecognizable directory is reported as [`Error::NotFound`]
    /// so that callers can surface the protocol-appropriate 404.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_dir() {
            return Err(Error::NotFound);
        }
        let inner = gix::open(path).map_err(|e| {
            tracing::debug!(path = %path.display(), error = %e, "not a usable repository");
            Error::NotFound
        })?;
        Ok(Self {
            inner,
            path: path.to_path_buf(),
        })
    }

    /// The underlying gix repository.
    pub fn git(&self) -> &gix::Repository {
        &self.inner
    }

    /// The path the repository was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The working directory, absent for bare repositories.
    pub fn workdir(&self) -> Option<&Path> {
        self.inner.workdir()
    }

    /// True when the repository has no working tree.
    pub fn is_bare(&self) -> bool {
        self.workdir().is_none()
    }

    /// The short name of `HEAD` when it is symbolic, `None` when detached.
    pub fn current_branch(&self) -> Result<Option<String>> {
        let name = self.inner.head_name().map_err(Error::git)?;
        Ok(name.map(|n| n.shorten().to_string()))
    }

    /// The branch served when a request names no ref.
    ///
    /// Prefers `main`, then `master`, then whatever `HEAD` points at
    /// (`"HEAD"` itself when detached, which stays resolvable).
    pub fn default_branch(&self) -> Result<String> {
        for name in ["main", "master"] {
            let full = format!("refs/heads/{name}");
            if self
                .inner
                .try_find_reference(full.as_str())
                .map_err(Error::git)?
                .is_some()
            {
                return Ok(name.to_string());
            }
        }
        Ok(self.current_branch()?.unwrap_or_else(|| "HEAD".to_string()))
    }

    /// The commit id `HEAD` currently resolves to.
    pub fn head_commit_id(&self) -> Result<ObjectId> {
        let id = self.inner.head_id().map_err(|_| Error::NotFound)?;
        Ok(id.detach())
    }

    /// True iff the repository is non-bare and `ref_or_sha` resolves to the
    /// same commit as `HEAD`.
    ///
    /// This is the gate for serving uncommitted working-tree content.
    pub fn is_checked_out(&self, ref_or_sha: &str) -> bool {
        if self.is_bare() {
            return false;
        }
        match (self.head_commit_id(), self.resolve_commit(ref_or_sha)) {
            (Ok(head), Ok(requested)) => head == requested,
            _ => false,
        }
    }

    /// Resolves a ref name, full sha, or shortened sha prefix to a commit id.
    ///
    /// Annotated tags are peeled to the commit they point at. Ambiguous
    /// shortened prefixes are reported as [`Error::NotFound`] rather than
    /// guessed at.
    pub fn resolve_commit(&self, ref_or_sha: &str) -> Result<ObjectId> {
        let id = self.resolve_oid(ref_or_sha)?;
        self.peel_to_commit(id)
    }

    /// Resolves a ref name, full sha, or shortened sha prefix to an object id
    /// without peeling.
    pub fn resolve_oid(&self, ref_or_sha: &str) -> Result<ObjectId> {
        if is_full_sha(ref_or_sha) {
            let id = ObjectId::from_hex(ref_or_sha.as_bytes()).map_err(|_| Error::NotFound)?;
            // A well-formed sha may still name nothing in this repository.
            return if self.inner.try_find_object(id).map_err(Error::git)?.is_some() {
                Ok(id)
            } else {
                Err(Error::NotFound)
            };
        }

        if let Ok(reference) = self.inner.find_reference(ref_or_sha) {
            return reference
                .into_fully_peeled_id()
                .map(|id| id.detach())
                .map_err(|_| Error::NotFound);
        }

        self.inner
            .rev_parse_single(ref_or_sha.as_bytes())
            .map(|id| id.detach())
            .map_err(|_| Error::NotFound)
    }

    /// Peels `id` down to a commit, chasing annotated tags.
    pub fn peel_to_commit(&self, id: ObjectId) -> Result<ObjectId> {
        let object = self.inner.find_object(id).map_err(|_| Error::NotFound)?;
        let commit = object
            .peel_to_kind(gix::object::Kind::Commit)
            .map_err(|_| Error::NotFound)?;
        Ok(commit.id)
    }

    /// All local branch and tag short names.
    pub fn local_ref_names(&self) -> Result<Vec<String>> {
        let platform = self.inner.references().map_err(Error::git)?;
        let mut names = Vec::new();
        for reference in platform
            .local_branches()
            .map_err(Error::git)?
            .filter_map(std::result::Result::ok)
        {
            names.push(reference.name().shorten().to_string());
        }
        for reference in platform
            .tags()
            .map_err(Error::git)?
            .filter_map(std::result::Result::ok)
        {
            names.push(reference.name().shorten().to_string());
        }
        Ok(names)
    }

    /// Splits `<ref>/<path…>` where the ref itself may contain slashes.
    ///
    /// The longest known branch or tag name that prefixes `rest` up to a
    /// slash boundary wins. When nothing matches, the first slash-delimited
    /// token is taken as the ref, which covers (possibly shortened) shas.
    pub fn split_ref_path(&self, rest: &str) -> Result<RefAndPath> {
        let rest = rest.trim_start_matches('/');
        let names = self.local_ref_names()?;

        let mut best: Option<&str> = None;
        for name in &names {
            let matches = rest == name
                || (rest.len() > name.len()
                    && rest.starts_with(name.as_str())
                    && rest.as_bytes()[name.len()] == b'/');
            if matches && best.is_none_or(|b| name.len() > b.len()) {
                best = Some(name);
            }
        }

        let (refname, path) = match best {
            Some(name) => (name.to_string(), rest[name.len()..].trim_start_matches('/')),
            None => match rest.split_once('/') {
                Some((first, tail)) => (first.to_string(), tail),
                None => (rest.to_string(), ""),
            },
        };
        Ok(RefAndPath {
            refname,
            path: normalize_path(path),
        })
    }
}

//================================================================================================
// Functions
//================================================================================================

/// True for exactly forty lowercase hex digits.
pub fn is_full_sha(s: &str) -> bool {
    s.len() == 40 && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// Collapses redundant slashes and strips leading/trailing ones.
pub fn normalize_path(path: &str) -> String {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::Fixture;

    #[test]
    fn full_sha_gate_is_exact() {
        assert!(is_full_sha(&"a".repeat(40)));
        assert!(!is_full_sha(&"a".repeat(39)));
        assert!(!is_full_sha(&"A".repeat(40)));
        assert!(!is_full_sha(&"g".repeat(40)));
    }

    #[test]
    fn normalizes_redundant_slashes() {
        assert_eq!(normalize_path("sub/sub//some_file.txt"), "sub/sub/some_file.txt");
        assert_eq!(normalize_path("/leading/and/trailing/"), "leading/and/trailing");
        assert_eq!(normalize_path(""), "");
    }

    #[test]
    fn splits_plain_branch() -> anyhow::Result<()> {
        let fx = Fixture::basic()?;
        let repo = Repo::open(fx.repo_path())?;
        let split = repo.split_ref_path("main/README.md")?;
        assert_eq!(split.refname, "main");
        assert_eq!(split.path, "README.md");
        Ok(())
    }

    #[test]
    fn splits_branch_containing_slash() -> anyhow::Result<()> {
        let fx = Fixture::basic()?;
        let repo = Repo::open(fx.repo_path())?;
        let split = repo.split_ref_path("branch/with_slash/README.md")?;
        assert_eq!(split.refname, "branch/with_slash");
        assert_eq!(split.path, "README.md");
        Ok(())
    }

    #[test]
    fn falls_back_to_first_token_for_shas() -> anyhow::Result<()> {
        let fx = Fixture::basic()?;
        let repo = Repo::open(fx.repo_path())?;
        let head = repo.head_commit_id()?.to_string();
        let split = repo.split_ref_path(&format!("{head}/README.md"))?;
        assert_eq!(split.refname, head);
        assert_eq!(split.path, "README.md");
        Ok(())
    }

    #[test]
    fn resolves_shortened_prefixes() -> anyhow::Result<()> {
        let fx = Fixture::basic()?;
        let repo = Repo::open(fx.repo_path())?;
        let head = repo.head_commit_id()?;
        let full = head.to_string();
        for len in [7, 12, 40] {
            assert_eq!(repo.resolve_commit(&full[..len])?, head);
        }
        Ok(())
    }

    #[test]
    fn unknown_refs_are_not_found() -> anyhow::Result<()> {
        let fx = Fixture::basic()?;
        let repo = Repo::open(fx.repo_path())?;
        assert!(matches!(
            repo.resolve_commit("no-such-branch"),
            Err(Error::NotFound)
        ));
        Ok(())
    }

    #[test]
    fn default_branch_prefers_main() -> anyhow::Result<()> {
        let fx = Fixture::basic()?;
        let repo = Repo::open(fx.repo_path())?;
        assert_eq!(repo.default_branch()?, "main");
        Ok(())
    }

    #[test]
    fn checked_out_tracks_head() -> anyhow::Result<()> {
        let fx = Fixture::basic()?;
        let repo = Repo::open(fx.repo_path())?;
        assert!(repo.is_checked_out("main"));
        assert!(!repo.is_checked_out("branch/with_slash"));
        Ok(())
    }
}
