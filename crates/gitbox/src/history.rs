//! Commit log walks in reverse chronological order.

use gix::ObjectId;

use crate::objects;
use crate::repo::Repo;
use crate::{Error, Result};

//================================================================================================
// Types
//================================================================================================

/// One side of a commit's authorship.
#[derive(Debug, Clone)]
pub struct CommitPerson {
    /// Display name.
    pub name: String,
    /// Email address.
    pub email: String,
    /// Seconds since the unix epoch.
    pub seconds: i64,
}

/// A decoded commit, ready for encoding into API shapes.
#[derive(Debug, Clone)]
pub struct CommitDetail {
    /// The commit id.
    pub id: ObjectId,
    /// The root tree id.
    pub tree: ObjectId,
    /// Parent commit ids, oldest-branch first as stored.
    pub parents: Vec<ObjectId>,
    /// Author identity and time.
    pub author: CommitPerson,
    /// Committer identity and time.
    pub committer: CommitPerson,
    /// The full commit message.
    pub message: String,
}

//================================================================================================
// Functions
//================================================================================================

/// Decodes a single commit.
pub fn commit_detail(repo: &Repo, id: ObjectId) -> Result<CommitDetail> {
    let commit = repo.git().find_commit(id).map_err(|_| Error::NotFound)?;
    let decoded = commit.decode().map_err(Error::git)?;

    let person = |sig: gix::actor::SignatureRef<'_>| CommitPerson {
        name: sig.name.to_string(),
        email: sig.email.to_string(),
        seconds: sig.seconds(),
    };

    Ok(CommitDetail {
        id,
        tree: decoded.tree(),
        parents: decoded.parents().collect(),
        author: person(decoded.author),
        committer: person(decoded.committer),
        message: decoded.message.to_string(),
    })
}

/// Commits reachable from `ref_or_sha`, newest first.
///
/// With a `path` filter only commits where the blob at `path` differs from
/// the chronologically previous commit are kept: edits, and the commit that
/// introduced the path. The walk stops once the path disappears going back
/// through history.
pub fn commit_log(repo: &Repo, ref_or_sha: &str, path: Option<&str>) -> Result<Vec<CommitDetail>> {
    let tip = repo.resolve_commit(ref_or_sha)?;
    let ids = walk_ids(repo, tip)?;

    let Some(path) = path.filter(|p| !p.is_empty()) else {
        return ids.into_iter().map(|id| commit_detail(repo, id)).collect();
    };

    // Blob id per commit, newest first, up to and including the first
    // commit where the path is missing.
    let mut blobs: Vec<Option<ObjectId>> = Vec::new();
    for id in &ids {
        let blob = match objects::blob_at(repo, *id, path) {
            Ok(oid) => Some(oid),
            Err(Error::NotFound) => None,
            Err(e) => return Err(e),
        };
        let stop = blob.is_none();
        blobs.push(blob);
        if stop {
            break;
        }
    }

    let mut out = Vec::new();
    for (i, blob) in blobs.iter().enumerate() {
        let Some(blob) = blob else { break };
        let previous = blobs.get(i + 1).copied().flatten();
        if previous != Some(*blob) {
            out.push(commit_detail(repo, ids[i])?);
        }
    }
    Ok(out)
}

fn walk_ids(repo: &Repo, tip: ObjectId) -> Result<Vec<ObjectId>> {
    use gix::revision::walk::Sorting;
    use gix::traverse::commit::simple::CommitTimeOrder;

    let commit = repo.git().find_commit(tip).map_err(|_| Error::NotFound)?;
    let walk = commit
        .ancestors()
        .use_commit_graph(true)
        .sorting(Sorting::ByCommitTime(CommitTimeOrder::NewestFirst))
        .all()
        .map_err(Error::git)?;

    let mut ids = Vec::new();
    for info in walk {
        let info = info.map_err(Error::git)?;
        ids.push(info.id);
    }
    Ok(ids)
}
