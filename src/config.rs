//! Settings file
//!
//! Every field has a built-in default, so an absent file, an empty file and a
//! file that sets a single key are all valid. Command-line flags are applied
//! on top by the binaries.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::harvest::FilePatterns;
use crate::http::Timeouts;

pub const DEFAULT_BASE_URL: &str =
    "https://gws-access.jasmin.ac.uk/public/nceo_geohazards/LiCSAR_products";
pub const DEFAULT_ARCHIVE_ROOT: &str = "/gws/nopw/j04/nceo_geohazards_vol1/public/LiCSAR_products";

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub mirror: MirrorSettings,
    pub harvest: HarvestSettings,
    pub network: NetworkSettings,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorSettings {
    pub out_dir: PathBuf,
    pub lanes: usize,
    pub base_url: String,
}

impl Default for MirrorSettings {
    fn default() -> Self {
        Self {
            out_dir: PathBuf::from("."),
            lanes: 2,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestSettings {
    /// Archive root holding `{track}/{frame}` directories.
    pub lics_path: PathBuf,
    pub out_path: PathBuf,
    pub lanes: usize,
    pub patterns: FilePatterns,
}

impl Default for HarvestSettings {
    fn default() -> Self {
        Self {
            lics_path: PathBuf::from(DEFAULT_ARCHIVE_ROOT),
            out_path: PathBuf::from("../metadata"),
            lanes: 4,
            patterns: FilePatterns::default(),
        }
    }
}

/// Per-request timeouts in seconds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSettings {
    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
    pub write_timeout_secs: u64,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        let t = Timeouts::default();
        Self {
            connect_timeout_secs: t.connect.as_secs(),
            read_timeout_secs: t.read.as_secs(),
            write_timeout_secs: t.write.as_secs(),
        }
    }
}

impl NetworkSettings {
    pub fn timeouts(&self) -> Timeouts {
        Timeouts {
            connect: Duration::from_secs(self.connect_timeout_secs),
            read: Duration::from_secs(self.read_timeout_secs),
            write: Duration::from_secs(self.write_timeout_secs),
        }
    }
}

impl Settings {
    /// Defaults when `path` is `None`; otherwise the file must exist and parse.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => {
                let data = std::fs::read_to_string(p)
                    .with_context(|| format!("reading config {}", p.display()))?;
                Self::parse(&data).with_context(|| format!("parsing config {}", p.display()))
            }
            None => Ok(Self::default()),
        }
    }

    pub fn parse(data: &str) -> Result<Self> {
        Ok(toml::from_str(data)?)
    }
}
