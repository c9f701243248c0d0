//! Shared CLI helpers and small reusable Clap fragments

use clap::{Args, Parser};
use std::path::PathBuf;

use crate::config::Settings;
use crate::manifest::Selection;

/// Options every binary accepts.
#[derive(Clone, Debug, Args)]
pub struct CommonOpts {
    /// TOML settings file; flags given here override it
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Number of concurrent lanes
    #[arg(short = 't', long)]
    pub lanes: Option<usize>,

    /// Do not draw the live progress line
    #[arg(long)]
    pub no_progress: bool,

    /// Append an audit line per event to this file
    #[arg(long = "log-file")]
    pub log_file: Option<PathBuf>,
}

/// Network timeout overrides, in seconds.
#[derive(Clone, Debug, Args)]
pub struct NetworkOpts {
    #[arg(long, value_name = "SECS")]
    pub connect_timeout: Option<u64>,

    #[arg(long, value_name = "SECS")]
    pub read_timeout: Option<u64>,

    #[arg(long, value_name = "SECS")]
    pub write_timeout: Option<u64>,
}

impl NetworkOpts {
    pub fn apply(&self, settings: &mut Settings) {
        let net = &mut settings.network;
        if let Some(s) = self.connect_timeout {
            net.connect_timeout_secs = s;
        }
        if let Some(s) = self.read_timeout {
            net.read_timeout_secs = s;
        }
        if let Some(s) = self.write_timeout {
            net.write_timeout_secs = s;
        }
    }
}

/// lics-fetch: mirror a manifest of archive files
#[derive(Clone, Debug, Parser)]
#[command(author, version, about = "Mirror LiCSAR product files, skipping unchanged ones")]
pub struct FetchArgs {
    /// JSON manifest of {name, path, url, size} records
    #[arg(required_unless_present = "frame", conflicts_with = "frame")]
    pub manifest: Option<PathBuf>,

    /// Build the manifest from a harvested frame record instead
    #[arg(long, value_name = "FRAME_JSON")]
    pub frame: Option<PathBuf>,

    /// Remote product root used with --frame
    #[arg(long)]
    pub base_url: Option<String>,

    /// Include the frame's metadata files (--frame)
    #[arg(long)]
    pub metadata: bool,

    /// Epoch file suffixes to fetch (--frame), e.g. geo.mli.png
    #[arg(long = "epoch-file", value_name = "SUFFIX", action = clap::ArgAction::Append)]
    pub epoch_files: Vec<String>,

    /// Interferogram file suffixes to fetch (--frame), e.g. geo.unw.tif
    #[arg(long = "ifg-file", value_name = "SUFFIX", action = clap::ArgAction::Append)]
    pub ifg_files: Vec<String>,

    /// First date to include, yyyymmdd (--frame)
    #[arg(long)]
    pub start: Option<u32>,

    /// Last date to include, yyyymmdd (--frame)
    #[arg(long)]
    pub end: Option<u32>,

    /// Output root
    #[arg(short = 'o', long)]
    pub out_dir: Option<PathBuf>,

    #[command(flatten)]
    pub common: CommonOpts,

    #[command(flatten)]
    pub network: NetworkOpts,
}

impl FetchArgs {
    pub fn selection(&self) -> Selection {
        Selection {
            include_metadata: self.metadata,
            epoch_files: self.epoch_files.clone(),
            ifg_files: self.ifg_files.clone(),
            start: self.start,
            end: self.end,
        }
    }

    /// Fold flag overrides into `settings`.
    pub fn apply(&self, settings: &mut Settings) {
        if let Some(dir) = &self.out_dir {
            settings.mirror.out_dir = dir.clone();
        }
        if let Some(lanes) = self.common.lanes {
            settings.mirror.lanes = lanes;
        }
        if let Some(url) = &self.base_url {
            settings.mirror.base_url = url.clone();
        }
        self.network.apply(settings);
    }
}

/// lics-meta: harvest per-frame metadata from the product archive
#[derive(Clone, Debug, Parser)]
#[command(author, version, about = "Harvest LiCSAR frame metadata into JSON")]
pub struct MetaArgs {
    /// Archive root holding {track}/{frame} directories
    #[arg(long)]
    pub root: Option<PathBuf>,

    /// Output directory for frames.json and the per-frame records
    #[arg(short = 'o', long)]
    pub out: Option<PathBuf>,

    #[command(flatten)]
    pub common: CommonOpts,
}

impl MetaArgs {
    pub fn apply(&self, settings: &mut Settings) {
        if let Some(root) = &self.root {
            settings.harvest.lics_path = root.clone();
        }
        if let Some(out) = &self.out {
            settings.harvest.out_path = out.clone();
        }
        if let Some(lanes) = self.common.lanes {
            settings.harvest.lanes = lanes;
        }
    }
}
