//! Zip and tar.gz snapshots of a tree or of the working directory.
//!
//! Committed archives are keyed by commit id and cached on disk; writers
//! build into a unique temp file and atomically rename on success so
//! readers can never observe a half-written cache entry. Snapshots of a
//! dirty working tree are never cached.

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::write::GzEncoder;
use gix::ObjectId;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use crate::objects::{self, ObjectKind};
use crate::repo::Repo;
use crate::{Error, Result};

//================================================================================================
// Types
//================================================================================================

/// The two archive flavors served by the codeload surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    /// A zip file, deflate level 9.
    Zip,
    /// A gzipped tarball, gzip level 9.
    TarGz,
}

/// Where the finished archive bytes live.
pub enum ArchiveSource {
    /// A fully renamed cache entry.
    Cached(PathBuf),
    /// A freshly built, already unlinked temp file; read it and drop it.
    Fresh(File),
}

/// A produced archive ready for streaming.
pub struct Archive {
    /// The attachment filename.
    pub filename: String,
    /// The response content type.
    pub mime: &'static str,
    /// The archive bytes.
    pub source: ArchiveSource,
}

//================================================================================================
// Impls
//================================================================================================

impl ArchiveFormat {
    /// Parses the codeload URL segment, tolerating the `legacy.` prefix.
    pub fn from_codeload(segment: &str) -> Option<Self> {
        match segment.strip_prefix("legacy.").unwrap_or(segment) {
            "zip" => Some(ArchiveFormat::Zip),
            "tar.gz" => Some(ArchiveFormat::TarGz),
            _ => None,
        }
    }

    /// The archive filename extension.
    pub fn ext(&self) -> &'static str {
        match self {
            ArchiveFormat::Zip => "zip",
            ArchiveFormat::TarGz => "tgz",
        }
    }

    /// The response content type.
    pub fn mime(&self) -> &'static str {
        match self {
            ArchiveFormat::Zip => "application/zip",
            ArchiveFormat::TarGz => "application/x-gzip",
        }
    }
}

//================================================================================================
// Functions
//================================================================================================

/// Builds (or serves from cache) the archive for `(owner, name, ref)`.
///
/// A checked-out ref on a non-bare repository snapshots the working
/// directory instead of the committed tree; such snapshots carry a
/// `SNAPSHOT` token in their filename and bypass the cache entirely.
pub fn produce(
    repo: &Repo,
    cache_dir: &Path,
    owner: &str,
    name: &str,
    ref_or_sha: &str,
    format: ArchiveFormat,
) -> Result<Archive> {
    let uncommitted = repo.is_checked_out(ref_or_sha);
    let commit = repo.resolve_commit(ref_or_sha)?;
    let token = if uncommitted {
        "SNAPSHOT".to_string()
    } else {
        commit.to_string()
    };
    let filename = format!("{owner}-{name}-{token}.{}", format.ext());
    let cache_path = cache_dir.join(&filename);

    if !uncommitted && cache_path.is_file() {
        tracing::debug!(archive = %filename, "serving cached archive");
        return Ok(Archive {
            filename,
            mime: format.mime(),
            source: ArchiveSource::Cached(cache_path),
        });
    }

    std::fs::create_dir_all(cache_dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(cache_dir)?;

    if uncommitted {
        let workdir = repo.workdir().ok_or(Error::NotFound)?;
        match format {
            ArchiveFormat::Zip => zip_worktree(workdir, tmp.as_file_mut())?,
            ArchiveFormat::TarGz => tar_worktree(workdir, tmp.as_file_mut())?,
        }
        let file = tmp.reopen()?;
        // Dropping the handle unlinks the temp path; the reopened fd keeps
        // the bytes alive until the response finishes streaming.
        drop(tmp);
        return Ok(Archive {
            filename,
            mime: format.mime(),
            source: ArchiveSource::Fresh(file),
        });
    }

    let mtime = commit_seconds(repo, commit)?;
    let entries = {
        let commit = repo.git().find_commit(commit).map_err(|_| Error::NotFound)?;
        let tree = commit.tree_id().map_err(Error::git)?.detach();
        objects::tree_entries(repo, tree, true)?
    };
    match format {
        ArchiveFormat::Zip => zip_tree(repo, &entries, tmp.as_file_mut())?,
        ArchiveFormat::TarGz => tar_tree(repo, &entries, mtime, tmp.as_file_mut())?,
    }

    let path = tmp
        .persist(&cache_path)
        .map(|_| cache_path)
        .map_err(|e| Error::Io(e.error))?;
    Ok(Archive {
        filename,
        mime: format.mime(),
        source: ArchiveSource::Cached(path),
    })
}

fn commit_seconds(repo: &Repo, commit: ObjectId) -> Result<i64> {
    let commit = repo.git().find_commit(commit).map_err(|_| Error::NotFound)?;
    Ok(commit.time().map_err(Error::git)?.seconds)
}

fn zip_options(mode: &str) -> SimpleFileOptions {
    let perms = if mode == "100755" { 0o755 } else { 0o644 };
    SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .compression_level(Some(9))
        .unix_permissions(perms)
}

fn zip_tree(repo: &Repo, entries: &[objects::TreeEntry], out: &mut File) -> Result<()> {
    let mut zip = ZipWriter::new(out);
    for entry in entries {
        match entry.kind {
            ObjectKind::Tree | ObjectKind::Commit => {
                zip.add_directory(format!("{}/", entry.path), zip_options("040000"))?;
            }
            _ => {
                let (_, data) = objects::object_data(repo, entry.oid)?;
                zip.start_file(entry.path.clone(), zip_options(entry.mode))?;
                zip.write_all(&data)?;
            }
        }
    }
    zip.finish()?;
    Ok(())
}

fn zip_worktree(workdir: &Path, out: &mut File) -> Result<()> {
    let mut zip = ZipWriter::new(out);
    for (rel, path) in walk_worktree(workdir) {
        if path.is_dir() {
            zip.add_directory(format!("{rel}/"), zip_options("040000"))?;
            continue;
        }
        let Ok(data) = std::fs::read(&path) else {
            continue;
        };
        let mode = if is_executable(&path) { "100755" } else { "100644" };
        zip.start_file(rel, zip_options(mode))?;
        zip.write_all(&data)?;
    }
    zip.finish()?;
    Ok(())
}

fn tar_tree(
    repo: &Repo,
    entries: &[objects::TreeEntry],
    mtime: i64,
    out: &mut File,
) -> Result<()> {
    let enc = GzEncoder::new(out, Compression::new(9));
    let mut tar = tar::Builder::new(enc);
    for entry in entries {
        let mut header = tar::Header::new_gnu();
        header.set_mtime(mtime.max(0) as u64);
        match entry.kind {
            ObjectKind::Tree | ObjectKind::Commit => {
                header.set_entry_type(tar::EntryType::Directory);
                header.set_size(0);
                header.set_mode(0o755);
                tar.append_data(&mut header, format!("{}/", entry.path), io::empty())?;
            }
            _ => {
                let (_, data) = objects::object_data(repo, entry.oid)?;
                if entry.mode == "120000" {
                    header.set_entry_type(tar::EntryType::Symlink);
                    header.set_size(0);
                    header.set_mode(0o777);
                    header
                        .set_link_name(String::from_utf8_lossy(&data).as_ref())
                        .map_err(Error::Io)?;
                    tar.append_data(&mut header, &entry.path, io::empty())?;
                } else {
                    let mode = if entry.mode == "100755" { 0o755 } else { 0o644 };
                    header.set_size(data.len() as u64);
                    header.set_mode(mode);
                    tar.append_data(&mut header, &entry.path, data.as_slice())?;
                }
            }
        }
    }
    let enc = tar.into_inner()?;
    enc.finish()?;
    Ok(())
}

fn tar_worktree(workdir: &Path, out: &mut File) -> Result<()> {
    let enc = GzEncoder::new(out, Compression::new(9));
    let mut tar = tar::Builder::new(enc);
    for (rel, path) in walk_worktree(workdir) {
        if path.is_dir() {
            tar.append_dir(format!("{rel}/"), &path)?;
        } else {
            tar.append_path_with_name(&path, rel)?;
        }
    }
    let enc = tar.into_inner()?;
    enc.finish()?;
    Ok(())
}

/// Walks the working directory honoring ignore rules, `.git/` excluded,
/// in stable name order. Yields `(relative_path, absolute_path)`.
fn walk_worktree(workdir: &Path) -> impl Iterator<Item = (String, PathBuf)> {
    let root = workdir.to_path_buf();
    ignore::WalkBuilder::new(workdir)
        .hidden(false)
        .filter_entry(|entry| entry.file_name() != ".git")
        .sort_by_file_name(std::ffi::OsStr::cmp)
        .build()
        .filter_map(std::result::Result::ok)
        .filter_map(move |entry| {
            let rel = entry
                .path()
                .strip_prefix(&root)
                .ok()?
                .to_string_lossy()
                .replace('\\', "/");
            if rel.is_empty() {
                return None;
            }
            Some((rel, entry.path().to_path_buf()))
        })
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(_path: &Path) -> bool {
    false
}
