use anyhow::{Context, Result, bail};
use clap::ArgMatches;
use colored::Colorize;
use replaylens_core::attribution::attribute_capture;
use replaylens_core::batch::{BatchOptions, DirectoryErrorRow, partition_outcomes, run_batch};
use replaylens_core::capture::{CaptureDir, discover};
use replaylens_core::compare::{ApiFilter, compare_js_api, summarize_listeners};
use replaylens_core::reconcile::reconcile_capture;
use replaylens_core::report::{ReportFormat, TabularRow, generate_csv_report, render_report, save_report};
use replaylens_core::site::CaptureIdentity;
use replaylens_core::{CausalTracer, ContentHashIndex, ReconcileOptions, ScriptResourceResolver};
use replaylens_graph::{NodeId, load_graphml};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use url::Url;

/// Installs the stderr log subscriber. `RUST_LOG` wins over `--verbose`.
pub fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with_writer(std::io::stderr)
        .without_time()
        .try_init();
}

pub fn print_banner() {
    eprintln!("{}", "═".repeat(60).bright_blue().bold());
    eprintln!(
        "{}  {}",
        "  REPLAYLENS".bright_white().bold(),
        env!("CARGO_PKG_VERSION").bright_black()
    );
    eprintln!("{}", "═".repeat(60).bright_blue().bold());
}

/// Expands `~` and environment variables in a user-supplied path.
pub fn expand_path(raw: &str) -> PathBuf {
    match shellexpand::full(raw) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(_) => PathBuf::from(shellexpand::tilde(raw).as_ref()),
    }
}

/// `report.csv` becomes `report.errors.csv`.
pub fn errors_path_for(output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "report".to_string());
    let name = match output.extension() {
        Some(ext) => format!("{}.errors.{}", stem, ext.to_string_lossy()),
        None => format!("{}.errors", stem),
    };
    output.with_file_name(name)
}

pub fn reconcile_options(grace_secs: i64, infra_hosts: Option<Vec<String>>) -> ReconcileOptions {
    let mut options = ReconcileOptions {
        grace: chrono::Duration::seconds(grace_secs),
        ..ReconcileOptions::default()
    };
    if let Some(hosts) = infra_hosts {
        options.infrastructure_hosts = hosts;
    }
    options
}

pub fn batch_options(threads: Option<usize>, require_replays: bool, quiet: bool) -> BatchOptions {
    let defaults = BatchOptions::default();
    BatchOptions {
        workers: threads.unwrap_or(defaults.workers),
        require_replays,
        show_progress: !quiet,
    }
}

/// Runs `analyze` on every capture directory under `crawl_root` and splits
/// the outcomes into data rows and per-directory error rows.
pub async fn collect_rows<T, F>(
    crawl_root: &Path,
    options: &BatchOptions,
    analyze: F,
) -> Result<(Vec<T>, Vec<DirectoryErrorRow>)>
where
    T: Send + 'static,
    F: Fn(&CaptureDir) -> replaylens_core::error::Result<Vec<T>> + Send + Sync + 'static,
{
    if !crawl_root.is_dir() {
        bail!("Crawl root {} is not a directory", crawl_root.display());
    }
    let dirs = discover(crawl_root)
        .with_context(|| format!("Failed to list {}", crawl_root.display()))?;
    let require_replays = options.require_replays;
    let outcomes = run_batch(dirs, options, move |dir| {
        let capture = CaptureDir::open(dir, require_replays)?;
        analyze(&capture)
    })
    .await;
    Ok(partition_outcomes(outcomes))
}

/// Writes a report to `output` or stdout. CSV carries data rows only, so
/// its error rows go to a sibling `.errors` file or to stderr.
pub fn emit_report<R: TabularRow>(
    format: ReportFormat,
    title: &str,
    rows: &[R],
    errors: &[DirectoryErrorRow],
    output: Option<&Path>,
) -> Result<()> {
    let report = render_report(format, title, rows, errors).context("Failed to render report")?;
    match output {
        Some(path) => save_report(&report, path)
            .with_context(|| format!("Failed to write report to {}", path.display()))?,
        None => print!("{}", report),
    }

    if format == ReportFormat::Csv && !errors.is_empty() {
        let error_csv = generate_csv_report(errors);
        match output {
            Some(path) => {
                let errors_path = errors_path_for(path);
                save_report(&error_csv, &errors_path)
                    .with_context(|| format!("Failed to write errors to {}", errors_path.display()))?;
            }
            None => eprint!("{}", error_csv),
        }
    }
    Ok(())
}

/// Shared settings of the crawl-root subcommands.
struct BatchCommand {
    crawl_root: PathBuf,
    options: BatchOptions,
    format: ReportFormat,
    output: Option<PathBuf>,
    quiet: bool,
}

impl BatchCommand {
    fn from_args(args: &ArgMatches, quiet: bool) -> Result<Self> {
        let crawl_root = args
            .get_one::<String>("CRAWL_ROOT")
            .map(|s| expand_path(s))
            .context("CRAWL_ROOT is required")?;
        let format_name = args
            .get_one::<String>("format")
            .map(String::as_str)
            .unwrap_or("text");
        let Some(format) = ReportFormat::from_str(format_name) else {
            bail!("Unknown report format '{}'", format_name);
        };
        let output = args
            .get_one::<PathBuf>("output")
            .map(|p| expand_path(&p.to_string_lossy()));
        let options = batch_options(
            args.get_one::<usize>("threads").copied(),
            !args.get_flag("no-replays"),
            quiet,
        );
        Ok(Self {
            crawl_root,
            options,
            format,
            output,
            quiet,
        })
    }

    fn announce(&self, what: &str) {
        if self.quiet {
            return;
        }
        eprintln!(
            "{} {} under {}",
            "→".blue(),
            what,
            self.crawl_root.display().to_string().bright_white()
        );
        eprintln!("{} Workers: {}", "→".blue(), self.options.workers);
        if !self.options.require_replays {
            eprintln!("{} Replays: optional", "→".blue());
        }
    }

    fn finish<R: TabularRow>(&self, title: &str, rows: &[R], errors: &[DirectoryErrorRow]) -> Result<()> {
        if !self.quiet {
            eprintln!(
                "{} {} rows, {} failed directories",
                "✓".green().bold(),
                rows.len(),
                errors.len()
            );
        }
        emit_report(self.format, title, rows, errors, self.output.as_deref())?;
        if let Some(path) = &self.output {
            if !self.quiet {
                eprintln!(
                    "{} Report saved: {}",
                    "✓".green().bold(),
                    path.display().to_string().bright_white()
                );
            }
        }
        Ok(())
    }
}

pub async fn handle_requests(args: &ArgMatches, quiet: bool) -> Result<()> {
    let command = BatchCommand::from_args(args, quiet)?;
    let grace = args.get_one::<i64>("grace").copied().unwrap_or(10);
    let hosts = args
        .get_many::<String>("infra-host")
        .map(|values| values.cloned().collect());
    let options = reconcile_options(grace, hosts);

    command.announce("Reconciling requests");
    let (rows, errors) = collect_rows(&command.crawl_root, &command.options, move |capture| {
        reconcile_capture(capture, &options)
    })
    .await?;
    command.finish("Request reconciliation", &rows, &errors)
}

pub async fn handle_js_compare(args: &ArgMatches, quiet: bool) -> Result<()> {
    let command = BatchCommand::from_args(args, quiet)?;
    let filter = ApiFilter::default();
    let include_replays = command.options.require_replays;

    command.announce("Comparing JS API calls");
    let (rows, errors) = collect_rows(&command.crawl_root, &command.options, move |capture| {
        compare_js_api(capture, &filter, include_replays)
    })
    .await?;
    command.finish("JS API comparison", &rows, &errors)
}

pub async fn handle_listeners(args: &ArgMatches, quiet: bool) -> Result<()> {
    let command = BatchCommand::from_args(args, quiet)?;
    let include_replays = command.options.require_replays;

    command.announce("Counting inline event handlers");
    let (rows, errors) = collect_rows(&command.crawl_root, &command.options, move |capture| {
        summarize_listeners(capture, include_replays).map(|summary| vec![summary])
    })
    .await?;
    command.finish("Event handler comparison", &rows, &errors)
}

pub async fn handle_attribute(args: &ArgMatches, quiet: bool) -> Result<()> {
    let command = BatchCommand::from_args(args, quiet)?;
    let needle = args
        .get_one::<String>("needle")
        .cloned()
        .context("--needle is required")?;

    command.announce(&format!("Attributing requests matching '{}'", needle));
    let (rows, errors) = collect_rows(&command.crawl_root, &command.options, move |capture| {
        attribute_capture(capture, &needle)
    })
    .await?;
    command.finish("Request attribution", &rows, &errors)
}

pub fn handle_trace(args: &ArgMatches, quiet: bool) -> Result<()> {
    let path = args
        .get_one::<String>("GRAPHML")
        .map(|s| expand_path(s))
        .context("GRAPHML is required")?;
    let node = NodeId(*args.get_one::<u64>("node").context("--node is required")?);
    let origin = match args.get_one::<Url>("origin") {
        Some(url) => url.as_str().trim_end_matches('/').to_string(),
        None => CaptureIdentity::from_graph_path(&path)
            .context("Pass --origin; the page origin is not encoded in the file name")?
            .page_origin,
    };

    let graph = load_graphml(&path).with_context(|| format!("Failed to load {}", path.display()))?;
    let resolver = ScriptResourceResolver::new(&graph, ContentHashIndex::build(&graph));
    let chain = CausalTracer::new(&resolver, origin.as_str())
        .trace(node)
        .with_context(|| format!("Could not trace node {}", node))?;

    if !quiet {
        eprintln!("{} Causal chain of node {}", "✓".green().bold(), node);
    }
    for (depth, entry) in chain.entries().iter().enumerate() {
        println!("{:>3}  {}", depth, entry);
    }
    Ok(())
}
