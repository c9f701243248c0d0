//! Idempotent mirroring of one remote file
//!
//! A file is only fetched when the local `(size, mtime)` pair differs from the
//! remote one. New content is streamed into a temporary file beside the
//! destination, stamped with the remote mtime and then renamed into place, so
//! a failed or cancelled fetch never leaves a destination that looks synced.

use anyhow::{bail, Context, Result};
use filetime::{set_file_mtime, FileTime};
use std::fs;
use std::io::{BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use crate::cancel::CancelToken;
use crate::http::{RemoteFileState, RemoteSource};
use crate::logger::Logger;
use crate::manifest::ManifestEntry;
use crate::paths::{join_under_root, make_world_readable};

const COPY_BUFFER: usize = 256 * 1024;

/// Name prefix of in-flight downloads.
pub const PARTIAL_PREFIX: &str = ".lics-partial-";

/// What a transfer did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOutcome {
    /// Local state already matched the remote state.
    Skipped,
    /// New content was written; carries the byte count.
    Fetched(u64),
}

/// Size and modification time of a local file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalFileState {
    pub size: u64,
    /// Unix seconds.
    pub modified_time: i64,
}

impl LocalFileState {
    /// `Ok(None)` when nothing exists at `path`.
    pub fn read(path: &Path) -> Result<Option<Self>> {
        let meta = match fs::metadata(path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("stat {}", path.display())),
        };
        if !meta.is_file() {
            bail!("{} exists and is not a regular file", path.display());
        }
        Ok(Some(Self {
            size: meta.len(),
            modified_time: FileTime::from_last_modification_time(&meta).unix_seconds(),
        }))
    }

    /// Exact match on size and whole-second mtime. No content hash.
    pub fn matches(&self, remote: &RemoteFileState) -> bool {
        self.size == remote.size && self.modified_time == remote.modified_time
    }
}

/// Everything a transfer needs besides the job itself.
pub struct TransferContext<'a> {
    pub remote: &'a dyn RemoteSource,
    pub out_root: &'a Path,
    pub logger: &'a dyn Logger,
}

impl TransferContext<'_> {
    /// Destination of `entry`: `{out_root}/{path}/{name}`.
    pub fn destination(&self, entry: &ManifestEntry) -> Result<PathBuf> {
        join_under_root(self.out_root, &Path::new(&entry.path).join(&entry.name))
    }

    /// Mirror one manifest entry.
    pub fn transfer(&self, entry: &ManifestEntry, cancel: &CancelToken) -> Result<TransferOutcome> {
        let dst = self.destination(entry)?;
        self.logger.start(&entry.url, &dst);
        let result = self.sync_file(&entry.url, &dst, cancel);
        match &result {
            Ok(TransferOutcome::Skipped) => self.logger.skipped(&entry.url, &dst),
            Ok(TransferOutcome::Fetched(bytes)) => self.logger.fetched(&entry.url, &dst, *bytes),
            Err(e) => self.logger.error("transfer", &entry.url, &format!("{e:#}")),
        }
        result
    }

    fn sync_file(&self, url: &str, dst: &Path, cancel: &CancelToken) -> Result<TransferOutcome> {
        cancel.check()?;
        let remote = self.remote.probe(url)?;

        if let Some(local) = LocalFileState::read(dst)? {
            if local.matches(&remote) {
                return Ok(TransferOutcome::Skipped);
            }
        }

        cancel.check()?;
        let body = self.remote.open(url)?;
        let bytes = write_atomically(body, dst, &remote, cancel)
            .with_context(|| format!("fetching {url}"))?;
        Ok(TransferOutcome::Fetched(bytes))
    }
}

/// Delete partial downloads left in `dir` by a run that was killed before it
/// could clean up. Returns how many were removed.
pub fn remove_stale_partials(dir: &Path) -> Result<usize> {
    let mut removed = 0;
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e).with_context(|| format!("listing {}", dir.display())),
    };
    for entry in entries {
        let entry = entry.with_context(|| format!("listing {}", dir.display()))?;
        if !entry.file_name().to_string_lossy().starts_with(PARTIAL_PREFIX) {
            continue;
        }
        if !entry.file_type()?.is_file() {
            continue;
        }
        match fs::remove_file(entry.path()) {
            Ok(()) => removed += 1,
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                return Err(e).with_context(|| format!("removing {}", entry.path().display()))
            }
        }
    }
    Ok(removed)
}

/// Stream `body` into a temporary file beside `dst`, stamp it with the remote
/// mtime and rename it over `dst`. On any error the temporary file is removed
/// and `dst` is untouched.
fn write_atomically(
    mut body: Box<dyn Read + Send>,
    dst: &Path,
    remote: &RemoteFileState,
    cancel: &CancelToken,
) -> Result<u64> {
    let parent = dst
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;

    let tmp = tempfile::Builder::new()
        .prefix(PARTIAL_PREFIX)
        .tempfile_in(parent)
        .with_context(|| format!("creating temporary file in {}", parent.display()))?;

    let mut total = 0u64;
    {
        let mut writer = BufWriter::with_capacity(COPY_BUFFER, tmp.as_file());
        let mut buffer = vec![0u8; COPY_BUFFER];
        loop {
            cancel.check()?;
            let read = match body.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e).context("reading response body"),
            };
            writer.write_all(&buffer[..read])?;
            total += read as u64;
        }
        writer.flush()?;
    }

    if total != remote.size {
        bail!(
            "short transfer: received {} of {} bytes",
            total,
            remote.size
        );
    }

    tmp.as_file().sync_all()?;
    make_world_readable(tmp.as_file())?;
    set_file_mtime(tmp.path(), FileTime::from_unix_time(remote.modified_time, 0))
        .context("setting modification time")?;
    tmp.persist(dst)
        .with_context(|| format!("moving into place at {}", dst.display()))?;
    Ok(total)
}
