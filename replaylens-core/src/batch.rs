// Batch runner: one blocking analysis task per capture directory

use crate::capture::directory_name;
use crate::error::{AnalysisError, Result};
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Options for a batch over capture directories
#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub workers: usize,
    /// Treat directories without both replays as invalid.
    pub require_replays: bool,
    pub show_progress: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            require_replays: true,
            show_progress: true,
        }
    }
}

/// Result of analysing one directory
#[derive(Debug)]
pub struct DirectoryOutcome<T> {
    pub directory: String,
    pub result: Result<T>,
}

/// A directory whose analysis failed, as reported alongside the data rows
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirectoryErrorRow {
    pub directory: String,
    pub class: String,
    pub error: String,
}

impl DirectoryErrorRow {
    pub fn new(directory: &str, error: &AnalysisError) -> Self {
        Self {
            directory: directory.to_string(),
            class: error.class().as_str().to_string(),
            error: error.to_string(),
        }
    }
}

/// Splits outcomes into all data rows and one error row per failed directory.
pub fn partition_outcomes<T>(outcomes: Vec<DirectoryOutcome<Vec<T>>>) -> (Vec<T>, Vec<DirectoryErrorRow>) {
    let mut rows = Vec::new();
    let mut errors = Vec::new();
    for outcome in outcomes {
        match outcome.result {
            Ok(mut r) => rows.append(&mut r),
            Err(e) => errors.push(DirectoryErrorRow::new(&outcome.directory, &e)),
        }
    }
    (rows, errors)
}

/// Runs `analyze` over every directory on a bounded pool of blocking tasks.
/// A failing directory yields an error outcome; the others are unaffected.
/// Outcomes are sorted by directory name.
pub async fn run_batch<T, F>(
    dirs: Vec<PathBuf>,
    options: &BatchOptions,
    analyze: F,
) -> Vec<DirectoryOutcome<T>>
where
    T: Send + 'static,
    F: Fn(&Path) -> Result<T> + Send + Sync + 'static,
{
    let total = dirs.len();
    let workers = options.workers.max(1);
    info!("Analysing {} directories with {} workers", total, workers);

    let pb = if options.show_progress {
        let bar = ProgressBar::new(total as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("[{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            bar.set_style(style.progress_chars("=>-"));
        }
        bar
    } else {
        ProgressBar::hidden()
    };

    let analyze = Arc::new(analyze);
    let mut outcomes: Vec<DirectoryOutcome<T>> = stream::iter(dirs)
        .map(|dir| {
            let analyze = analyze.clone();
            let pb = pb.clone();
            async move {
                let directory = directory_name(&dir);
                let result = match tokio::task::spawn_blocking(move || analyze(&dir)).await {
                    Ok(result) => result,
                    Err(e) => Err(AnalysisError::from(e)),
                };
                if let Err(e) = &result {
                    warn!("{}: {} error: {}", directory, e.class().as_str(), e);
                    pb.set_message(format!("{} failed", directory));
                }
                pb.inc(1);
                DirectoryOutcome { directory, result }
            }
        })
        .buffer_unordered(workers)
        .collect()
        .await;

    pb.finish_and_clear();
    outcomes.sort_by(|a, b| a.directory.cmp(&b.directory));

    let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
    info!("Batch finished: {} ok, {} failed", total - failed, failed);
    outcomes
}
