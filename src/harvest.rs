//! Product archive walker and the per-frame metadata records
//!
//! Archive layout:
//!
//! ```text
//! {root}/{track}/{frame}/metadata/<anything ending in a metadata suffix>
//! {root}/{track}/{frame}/epochs/{yyyymmdd}/{yyyymmdd}.{suffix}
//! {root}/{track}/{frame}/interferograms/{yyyymmdd}_{yyyymmdd}/{pair}.{suffix}
//! ```
//!
//! Walking is synchronous; the pool provides the parallelism across frames.

use anyhow::{Context, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::cancel::CancelToken;
use crate::job::Job;
use crate::paths::{ensure_dir_exists, make_world_readable};

lazy_static! {
    static ref TRACK_RE: Regex = Regex::new(r"^[0-9]+$").unwrap();
    static ref FRAME_RE: Regex = Regex::new(r"^[0-9]{3}[AD]_[0-9]{5}_[0-9]{6}$").unwrap();
    static ref EPOCH_RE: Regex = Regex::new(r"^[0-9]{8}$").unwrap();
    static ref IFG_RE: Regex = Regex::new(r"^[0-9]{8}_[0-9]{8}$").unwrap();
}

/// Suffix lists used to classify files in each directory kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilePatterns {
    pub metadata: Vec<String>,
    pub epoch: Vec<String>,
    pub ifg: Vec<String>,
}

impl Default for FilePatterns {
    fn default() -> Self {
        fn owned(xs: &[&str]) -> Vec<String> {
            xs.iter().map(|s| s.to_string()).collect()
        }
        Self {
            metadata: owned(&[
                "geo.E.tif",
                "geo.N.tif",
                "geo.U.tif",
                "geo.hgt.tif",
                "baselines",
                "metadata.txt",
                "network.png",
            ]),
            epoch: owned(&[
                "geo.mli.png",
                "geo.mli.tif",
                "sltd.geo.tif",
                "ztd.geo.tif",
                "ztd.jpg",
            ]),
            ifg: owned(&[
                "geo.cc.png",
                "geo.cc.tif",
                "geo.diff.png",
                "geo.diff_pha.tif",
                "geo_diff_unfiltered.png",
                "geo_diff_unfiltered_pha.tif",
                "geo.unw.png",
                "geo.unw.tif",
            ]),
        }
    }
}

/// A frame directory found under a track directory. One harvest job each.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameRef {
    pub id: String,
    pub track_id: String,
}

impl Job for FrameRef {
    fn describe(&self) -> String {
        format!("frame {}/{}", self.track_id, self.id)
    }
}

/// Matched labels with their sizes, index-aligned.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSet {
    pub files: Vec<String>,
    pub sizes: Vec<u64>,
}

impl FileSet {
    fn push(&mut self, label: String, size: u64) {
        self.files.push(label);
        self.sizes.push(size);
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// `(label, size)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.files
            .iter()
            .map(String::as_str)
            .zip(self.sizes.iter().copied())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochRecord {
    pub date: u32,
    #[serde(flatten)]
    pub files: FileSet,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IfgRecord {
    pub start: u32,
    pub end: u32,
    #[serde(flatten)]
    pub files: FileSet,
}

/// Everything harvested for one frame; saved as `{output_group}/{frameId}.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameRecord {
    pub id: String,
    /// `{track}/{frameId}`, relative to the archive root.
    pub path: String,
    pub epochs: BTreeMap<String, EpochRecord>,
    pub metadata: FileSet,
    pub ifgs: BTreeMap<String, IfgRecord>,
}

impl FrameRecord {
    pub fn file_count(&self) -> usize {
        self.metadata.len()
            + self.epochs.values().map(|e| e.files.len()).sum::<usize>()
            + self.ifgs.values().map(|i| i.files.len()).sum::<usize>()
    }

    /// Directory the record is published under: the frame id up to its
    /// first `_` (`001A` for `001A_05090_131313`). Readers look records up
    /// by frame id alone, so this cannot be the archive's track directory.
    pub fn output_group(&self) -> &str {
        self.id.split('_').next().unwrap_or(&self.id)
    }
}

/// Immediate children of `dir`, sorted by name. Links are not followed
/// here, so a dangling link is listed like any other name.
fn children(dir: &Path) -> Result<Vec<walkdir::DirEntry>> {
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .map(|entry| entry.with_context(|| format!("scanning {}", dir.display())))
        .collect()
}

/// Directory test that follows links; a broken link is simply not a directory.
fn is_dir(entry: &walkdir::DirEntry) -> bool {
    entry.file_type().is_dir() || (entry.path_is_symlink() && entry.path().is_dir())
}

/// Size of a matched file. `None` when it vanished or is a dangling link.
fn matched_size(entry: &walkdir::DirEntry) -> Result<Option<u64>> {
    match fs::metadata(entry.path()) {
        Ok(meta) if meta.is_file() => Ok(Some(meta.len())),
        Ok(_) => Ok(None),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("stat {}", entry.path().display())),
    }
}

/// Names of the immediate subdirectories of `dir` that fully match `re`,
/// sorted by name.
fn matching_subdirs(dir: &Path, re: &Regex) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in children(dir)? {
        let name = entry.file_name().to_string_lossy();
        if re.is_match(&name) && is_dir(&entry) {
            names.push(name.into_owned());
        }
    }
    Ok(names)
}

/// Files in `dir` for which `label` yields a label, as `(label, size)` in
/// name order. Only matching names are stat'ed.
fn classify_with<F>(dir: &Path, suffixes: &[String], label: F) -> Result<FileSet>
where
    F: Fn(&str, &str) -> Option<String>,
{
    let mut set = FileSet::default();
    for entry in children(dir)? {
        if entry.file_type().is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        let labels: Vec<String> = suffixes
            .iter()
            .filter_map(|suffix| label(&*name, suffix.as_str()))
            .collect();
        if labels.is_empty() {
            continue;
        }
        let Some(size) = matched_size(&entry)? else {
            continue;
        };
        for l in labels {
            set.push(l, size);
        }
    }
    Ok(set)
}

/// Every frame directory under every track directory of `root`.
/// Tracks are visited in numeric order, frames in name order.
pub fn list_frames(root: &Path) -> Result<Vec<FrameRef>> {
    let mut tracks = matching_subdirs(root, &TRACK_RE)?;
    tracks.sort_by_key(|t| t.parse::<u64>().unwrap_or(u64::MAX));
    let mut frames = Vec::new();
    for track in tracks {
        for id in matching_subdirs(&root.join(&track), &FRAME_RE)? {
            frames.push(FrameRef {
                id,
                track_id: track.clone(),
            });
        }
    }
    Ok(frames)
}

/// Files in a metadata directory whose name ends with one of `suffixes`.
/// Labels are full file names.
pub fn classify_by_suffix(dir: &Path, suffixes: &[String]) -> Result<FileSet> {
    classify_with(dir, suffixes, |name, suffix| {
        name.ends_with(suffix).then(|| name.to_string())
    })
}

/// Files in a dated directory named exactly `{stamp}.{suffix}`.
/// Labels are the suffixes.
pub fn classify_by_stamp(dir: &Path, stamp: &str, suffixes: &[String]) -> Result<FileSet> {
    classify_with(dir, suffixes, |name, suffix| {
        (name.strip_prefix(stamp).and_then(|rest| rest.strip_prefix('.')) == Some(suffix))
            .then(|| suffix.to_string())
    })
}

fn collect_epochs(
    dir: &Path,
    suffixes: &[String],
    cancel: &CancelToken,
) -> Result<BTreeMap<String, EpochRecord>> {
    let mut epochs = BTreeMap::new();
    for stamp in matching_subdirs(dir, &EPOCH_RE)? {
        cancel.check()?;
        let files = classify_by_stamp(&dir.join(&stamp), &stamp, suffixes)?;
        let date = stamp.parse::<u32>().with_context(|| format!("epoch {stamp}"))?;
        epochs.insert(stamp, EpochRecord { date, files });
    }
    Ok(epochs)
}

fn collect_ifgs(
    dir: &Path,
    suffixes: &[String],
    cancel: &CancelToken,
) -> Result<BTreeMap<String, IfgRecord>> {
    let mut ifgs = BTreeMap::new();
    for pair in matching_subdirs(dir, &IFG_RE)? {
        cancel.check()?;
        let files = classify_by_stamp(&dir.join(&pair), &pair, suffixes)?;
        let (start, end) = pair.split_at(8);
        let start = start.parse::<u32>().with_context(|| format!("interferogram {pair}"))?;
        let end = end[1..].parse::<u32>().with_context(|| format!("interferogram {pair}"))?;
        ifgs.insert(pair, IfgRecord { start, end, files });
    }
    Ok(ifgs)
}

/// Harvest one frame. Missing `metadata`, `epochs` or `interferograms`
/// directories yield empty sections.
pub fn collect_frame(
    root: &Path,
    frame: &FrameRef,
    patterns: &FilePatterns,
    cancel: &CancelToken,
) -> Result<FrameRecord> {
    cancel.check()?;
    let frame_dir = root.join(&frame.track_id).join(&frame.id);

    let metadata_dir = frame_dir.join("metadata");
    let metadata = if metadata_dir.is_dir() {
        classify_by_suffix(&metadata_dir, &patterns.metadata)?
    } else {
        FileSet::default()
    };

    let epochs_dir = frame_dir.join("epochs");
    let epochs = if epochs_dir.is_dir() {
        collect_epochs(&epochs_dir, &patterns.epoch, cancel)?
    } else {
        BTreeMap::new()
    };

    let ifgs_dir = frame_dir.join("interferograms");
    let ifgs = if ifgs_dir.is_dir() {
        collect_ifgs(&ifgs_dir, &patterns.ifg, cancel)?
    } else {
        BTreeMap::new()
    };

    Ok(FrameRecord {
        id: frame.id.clone(),
        path: format!("{}/{}", frame.track_id, frame.id),
        epochs,
        metadata,
        ifgs,
    })
}

/// Write `value` as compact JSON to `path` via a temporary file + rename.
fn write_json_atomically<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("creating temporary file in {}", dir.display()))?;
    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        serde_json::to_writer(&mut writer, value)?;
        writer.flush()?;
    }
    make_world_readable(tmp.as_file())?;
    tmp.persist(path)
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

/// Write `frames.json` (array of frame ids) and one
/// `{output_group}/{frameId}.json` per record under `out_dir`. Returns the paths written, index file first.
pub fn save_metadata(out_dir: &Path, records: &[FrameRecord]) -> Result<Vec<PathBuf>> {
    ensure_dir_exists(out_dir)?;
    let mut written = Vec::with_capacity(records.len() + 1);

    let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
    let index = out_dir.join("frames.json");
    write_json_atomically(&index, &ids)?;
    written.push(index);

    for record in records {
        let group_dir = out_dir.join(record.output_group());
        ensure_dir_exists(&group_dir)?;
        let path = group_dir.join(format!("{}.json", record.id));
        write_json_atomically(&path, record)?;
        written.push(path);
    }
    Ok(written)
}

/// Read a record previously written by [`save_metadata`].
pub fn load_frame_record(path: &Path) -> Result<FrameRecord> {
    let data = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("parsing {}", path.display()))
}
