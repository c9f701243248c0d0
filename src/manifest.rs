//! Mirror manifests
//!
//! A manifest is a JSON array of `{name, path, url, size}` records. It is
//! either read from disk or selected out of a harvested [`FrameRecord`].

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use crate::harvest::{FileSet, FrameRecord};
use crate::job::Job;
use crate::paths::{ensure_dir_exists, join_under_root};
use crate::transfer::remove_stale_partials;

/// One file to mirror to `{root}/{path}/{name}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub name: String,
    pub path: String,
    pub url: String,
    /// Expected byte size; drives the progress line only.
    #[serde(default)]
    pub size: u64,
}

impl Job for ManifestEntry {
    fn cost(&self) -> u64 {
        self.size
    }

    fn describe(&self) -> String {
        if self.url.is_empty() {
            format!("{}/{}", self.path, self.name)
        } else {
            self.url.clone()
        }
    }
}

pub fn load_manifest(path: &Path) -> Result<Vec<ManifestEntry>> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("reading manifest {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("parsing manifest {}", path.display()))
}

/// Which parts of a frame record to turn into manifest entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub include_metadata: bool,
    /// Epoch suffixes to fetch, e.g. `geo.mli.png`.
    pub epoch_files: Vec<String>,
    /// Interferogram suffixes to fetch, e.g. `geo.unw.tif`.
    pub ifg_files: Vec<String>,
    /// Inclusive `yyyymmdd` window. `None` leaves that side open.
    pub start: Option<u32>,
    pub end: Option<u32>,
}

impl Selection {
    fn in_window(&self, first: u32, last: u32) -> bool {
        self.start.map_or(true, |s| first >= s) && self.end.map_or(true, |e| last <= e)
    }
}

/// Build a manifest for one frame.
///
/// Entries are ordered metadata first, then epochs, then interferograms, each
/// in key order. Files the record does not list are never produced, so a
/// suffix asked for but absent from an epoch is silently left out.
pub fn select_from_frame(
    record: &FrameRecord,
    base_url: &str,
    selection: &Selection,
) -> Vec<ManifestEntry> {
    let base = base_url.trim_end_matches('/');
    let mut entries = Vec::new();

    if selection.include_metadata {
        for (file, size) in record.metadata.iter() {
            entries.push(ManifestEntry {
                name: file.to_string(),
                path: format!("{}/metadata", record.id),
                url: format!("{}/{}/metadata/{}", base, record.path, file),
                size,
            });
        }
    }

    if !selection.epoch_files.is_empty() {
        for (epoch, rec) in &record.epochs {
            if !selection.in_window(rec.date, rec.date) {
                continue;
            }
            push_dated(
                &mut entries,
                &rec.files,
                &selection.epoch_files,
                epoch,
                &format!("{}/epochs/{}", record.id, epoch),
                &format!("{}/{}/epochs/{}", base, record.path, epoch),
            );
        }
    }

    if !selection.ifg_files.is_empty() {
        for (pair, rec) in &record.ifgs {
            if !selection.in_window(rec.start, rec.end) {
                continue;
            }
            push_dated(
                &mut entries,
                &rec.files,
                &selection.ifg_files,
                pair,
                &format!("{}/interferograms/{}", record.id, pair),
                &format!("{}/{}/interferograms/{}", base, record.path, pair),
            );
        }
    }

    entries
}

fn push_dated(
    entries: &mut Vec<ManifestEntry>,
    files: &FileSet,
    wanted: &[String],
    stamp: &str,
    path: &str,
    dir_url: &str,
) {
    for (suffix, size) in files.iter() {
        if !wanted.iter().any(|w| w == suffix) {
            continue;
        }
        let name = format!("{stamp}.{suffix}");
        entries.push(ManifestEntry {
            url: format!("{dir_url}/{name}"),
            name,
            path: path.to_string(),
            size,
        });
    }
}

/// Create every distinct `{root}/{path}` directory the manifest writes into
/// and clear partial downloads an interrupted earlier run left there.
/// Runs before dispatch so a bad path or an unwritable root fails the run
/// before any transfer starts. Returns the number of directories created or
/// reused below `root`.
pub fn prepare_destinations(root: &Path, entries: &[ManifestEntry]) -> Result<usize> {
    ensure_dir_exists(root)?;
    let mut dirs = BTreeSet::new();
    let mut uses_root = false;
    for entry in entries {
        // Validate the full destination, not just the directory part.
        join_under_root(root, &Path::new(&entry.path).join(&entry.name))
            .with_context(|| format!("manifest entry {}", entry.describe()))?;
        if entry.path.is_empty() {
            uses_root = true;
            continue;
        }
        dirs.insert(join_under_root(root, Path::new(&entry.path))?);
    }
    if uses_root {
        remove_stale_partials(root)?;
    }
    for dir in &dirs {
        ensure_dir_exists(dir)?;
        remove_stale_partials(dir)?;
    }
    Ok(dirs.len())
}
