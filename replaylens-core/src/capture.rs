//! Layout of one crawl output directory.
//!
//! ```text
//! <origin>/
//!   page_graph_<origin>_<unix>.graphml
//!   <domain>.har
//!   <domain>.warc
//!   logs/pagegraph.log
//!   mitmd_replay/{*.graphml, logs/pagegraph.log}
//!   warc_replay/{*.graphml, logs/pagegraph.log}
//! ```

use crate::error::{AnalysisError, Result};
use crate::site::CaptureIdentity;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

const LOG_DIR: &str = "logs";
const LOG_FILE: &str = "pagegraph.log";

/// Which archive a replay was served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReplayKind {
    Har,
    Warc,
}

impl ReplayKind {
    pub const ALL: [ReplayKind; 2] = [ReplayKind::Har, ReplayKind::Warc];

    pub fn dir_name(&self) -> &'static str {
        match self {
            ReplayKind::Har => "mitmd_replay",
            ReplayKind::Warc => "warc_replay",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CaptureDir {
    pub root: PathBuf,
    pub graph_path: PathBuf,
    pub har_path: PathBuf,
    pub warc_path: PathBuf,
}

impl CaptureDir {
    /// Checks the directory holds exactly one graph, HTTP archive and packet
    /// archive, and when `require_replays` is set, that both replays produced
    /// a graph.
    pub fn open(root: &Path, require_replays: bool) -> Result<Self> {
        let invalid = |reason: String| AnalysisError::InvalidCapture {
            dir: root.to_path_buf(),
            reason,
        };

        let mut graphs = Vec::new();
        let mut hars = Vec::new();
        let mut warcs = Vec::new();
        for path in files_in(root)? {
            match path.extension().and_then(|e| e.to_str()) {
                Some("graphml") => graphs.push(path),
                Some("har") => hars.push(path),
                Some("warc") => warcs.push(path),
                _ => {}
            }
        }

        let missing: Vec<&str> = [(".graphml", &graphs), (".warc", &warcs), (".har", &hars)]
            .iter()
            .filter(|(_, found)| found.len() != 1)
            .map(|(ext, _)| *ext)
            .collect();
        if !missing.is_empty() {
            return Err(invalid(format!("Missing {}", missing.join(", "))));
        }

        if require_replays {
            for kind in ReplayKind::ALL {
                let replay = root.join(kind.dir_name());
                if !replay.is_dir() {
                    return Err(invalid(format!("No {} directory", kind.dir_name())));
                }
                if find_graph(&replay)?.is_none() {
                    return Err(invalid(format!("No {} graphml", kind.dir_name())));
                }
            }
        }

        Ok(Self {
            root: root.to_path_buf(),
            graph_path: graphs.remove(0),
            har_path: hars.remove(0),
            warc_path: warcs.remove(0),
        })
    }

    pub fn name(&self) -> String {
        directory_name(&self.root)
    }

    pub fn identity(&self) -> Result<CaptureIdentity> {
        CaptureIdentity::from_graph_path(&self.graph_path)
    }

    pub fn log_path(&self) -> PathBuf {
        self.root.join(LOG_DIR).join(LOG_FILE)
    }

    pub fn replay_log_path(&self, kind: ReplayKind) -> PathBuf {
        self.root.join(kind.dir_name()).join(LOG_DIR).join(LOG_FILE)
    }

    pub fn replay_graph_path(&self, kind: ReplayKind) -> Result<Option<PathBuf>> {
        let dir = self.root.join(kind.dir_name());
        if !dir.is_dir() {
            return Ok(None);
        }
        find_graph(&dir)
    }
}

pub fn directory_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Immediate subdirectories of a crawl output root, sorted by name.
pub fn discover(crawl_root: &Path) -> Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in fs::read_dir(crawl_root)? {
        let path = entry?.path();
        if path.is_dir() {
            dirs.push(path);
        }
    }
    dirs.sort();
    debug!("Discovered {} capture directories under {}", dirs.len(), crawl_root.display());
    Ok(dirs)
}

fn files_in(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn find_graph(dir: &Path) -> Result<Option<PathBuf>> {
    Ok(files_in(dir)?
        .into_iter()
        .find(|p| p.extension().and_then(|e| e.to_str()) == Some("graphml")))
}
