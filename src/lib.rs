pub mod config;
pub mod discover;
pub mod document;
pub mod locator;
pub mod merge;
pub mod repository;
pub mod scanner;
pub mod splice;
pub mod sync;
mod walk;

pub use locator::{TokenSection, locate};
pub use splice::{replace_lines, slice_lines};

use clap::{ArgAction, Args, Parser, Subcommand};
use merge::{CommandMerger, MergeError, Merger, ReplaceMerger};
use repository::DirRepository;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::channel;
use std::time::{Duration, Instant};
use sync::{SyncReport, SyncSettings, SyncStatus, Syncer};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, PartialEq, Eq, Parser)]
#[command(
    name = "themesync",
    version,
    about = "Merge incoming design-token CSS into a tracked stylesheet"
)]
pub struct Cli {
    /// Config file; ./themesync.toml is used when present
    #[arg(short, long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
    /// More log output (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Print the design-token section of a stylesheet
    Locate {
        file: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// List every @theme, :root and .dark-theme block of a stylesheet
    Blocks {
        file: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Report which stylesheets carry a design-token section
    Scan {
        #[arg(required = true, value_name = "GLOB")]
        inputs: Vec<String>,
        #[arg(short = 'I', long, value_name = "GLOB")]
        ignore: Vec<String>,
        #[arg(long)]
        json: bool,
    },
    /// Replace an inclusive 1-based line range of a file
    Splice {
        file: PathBuf,
        #[arg(long)]
        start: usize,
        #[arg(long)]
        end: usize,
        #[arg(long = "with", value_name = "FILE")]
        replacement: PathBuf,
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
    /// Merge an incoming stylesheet into the tracked one and open a review
    Sync(SyncArgs),
    /// Run sync again whenever the incoming stylesheet changes
    Watch {
        #[command(flatten)]
        sync: SyncArgs,
        #[arg(long)]
        poll: bool,
        #[arg(long, value_name = "MS", default_value_t = 500)]
        poll_interval: u64,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct SyncArgs {
    /// Stylesheet carrying the incoming design tokens
    #[arg(long, value_name = "FILE")]
    pub incoming: PathBuf,
    /// Repository directory (overrides repository.root)
    #[arg(long, value_name = "DIR")]
    pub repo: Option<PathBuf>,
    #[arg(long)]
    pub branch: Option<String>,
    #[arg(long)]
    pub base: Option<String>,
    /// Tracked stylesheet path inside the repository
    #[arg(long)]
    pub path: Option<String>,
    /// Take the incoming section as is instead of running the merge command
    #[arg(long)]
    pub replace: bool,
    /// Skip checking that the merge output is a complete token section
    #[arg(long)]
    pub no_verify: bool,
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct CliError {
    pub message: String,
}

fn cli_error(err: impl std::fmt::Display) -> CliError {
    CliError {
        message: err.to_string(),
    }
}

pub fn run(cli: Cli) -> Result<(), CliError> {
    let config_path = cli.config;
    match cli.command {
        Command::Locate { file, json } => run_locate(&file, json),
        Command::Blocks { file, json } => run_blocks(&file, json),
        Command::Scan {
            inputs,
            ignore,
            json,
        } => run_scan(inputs, ignore, json),
        Command::Splice {
            file,
            start,
            end,
            replacement,
            output,
        } => run_splice(&file, start, end, &replacement, output.as_deref()),
        Command::Sync(args) => run_sync(config_path.as_deref(), &args),
        Command::Watch {
            sync,
            poll,
            poll_interval,
        } => run_watch(
            config_path.as_deref(),
            &sync,
            WatchOptions {
                poll,
                poll_interval_ms: poll_interval,
            },
        ),
    }
}

pub fn run_from_env() -> Result<(), CliError> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    run(cli)
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("themesync={}", level)));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn read_file(path: &Path) -> Result<String, CliError> {
    fs::read_to_string(path).map_err(|err| CliError {
        message: format!("failed to read {}: {}", path.display(), err),
    })
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), CliError> {
    let text = serde_json::to_string_pretty(value).map_err(cli_error)?;
    println!("{}", text);
    Ok(())
}

fn run_locate(file: &Path, json: bool) -> Result<(), CliError> {
    let css = read_file(file)?;
    let section = locate(&css)
        .map_err(|err| CliError {
            message: format!("{}: {}", file.display(), err),
        })?
        .ok_or_else(|| CliError {
            message: format!("no design token section in {}", file.display()),
        })?;

    if json {
        return print_json(&section);
    }
    let anchors = section.anchors;
    println!(
        "section: lines {}-{}",
        section.span.start_line, section.span.end_line
    );
    println!("  @theme       line {}", anchors.theme);
    match anchors.root {
        Some(line) => println!("  :root        line {}", line),
        None => println!("  :root        missing"),
    }
    if let Some(line) = anchors.dark_theme {
        println!(
            "  .dark-theme  lines {}-{}",
            line, anchors.dark_theme_end
        );
    }
    Ok(())
}

fn run_blocks(file: &Path, json: bool) -> Result<(), CliError> {
    let css = read_file(file)?;
    let anchors = scanner::token_anchors();
    let outcome = scanner::scan_blocks(&document::Document::parse(&css), &anchors).map_err(
        |err| CliError {
            message: format!("{}: {}", file.display(), err),
        },
    )?;

    if let Some(unclosed) = outcome.unclosed.as_ref() {
        tracing::warn!(
            "{} block opened on line {} never closes",
            unclosed.label,
            unclosed.start_line
        );
    }
    if json {
        return print_json(&outcome);
    }
    for block in &outcome.blocks {
        println!(
            "{:<13} lines {}-{}",
            block.label, block.span.start_line, block.span.end_line
        );
    }
    Ok(())
}

fn run_scan(inputs: Vec<String>, ignore: Vec<String>, json: bool) -> Result<(), CliError> {
    let reports = discover::discover(&inputs, &ignore, &discover::DiscoverOptions::default())
        .map_err(cli_error)?;

    let with_section = reports
        .iter()
        .filter(|report| matches!(report.status, discover::StylesheetStatus::Section { .. }))
        .count();
    if json {
        print_json(&reports)?;
    } else {
        for report in &reports {
            let status = match &report.status {
                discover::StylesheetStatus::Section { section } => format!(
                    "lines {}-{}",
                    section.span.start_line, section.span.end_line
                ),
                discover::StylesheetStatus::NoSection => "no token section".to_string(),
                discover::StylesheetStatus::Malformed { reason } => {
                    format!("malformed: {}", reason)
                }
                discover::StylesheetStatus::Unreadable { reason } => {
                    format!("unreadable: {}", reason)
                }
            };
            println!("{}\t{}", report.path.display(), status);
        }
    }

    tracing::info!(
        "inspected {} stylesheets, {} with a token section",
        reports.len(),
        with_section
    );
    Ok(())
}

fn run_splice(
    file: &Path,
    start: usize,
    end: usize,
    replacement: &Path,
    output: Option<&Path>,
) -> Result<(), CliError> {
    let css = read_file(file)?;
    let replacement = read_file(replacement)?;
    let replacement = replacement
        .strip_suffix("\r\n")
        .or_else(|| replacement.strip_suffix('\n'))
        .unwrap_or(&replacement);
    let spliced = replace_lines(&css, start, end, replacement).map_err(|err| CliError {
        message: format!("{}: {}", file.display(), err),
    })?;

    match output {
        Some(path) => fs::write(path, spliced).map_err(|err| CliError {
            message: format!("failed to write output {}: {}", path.display(), err),
        }),
        None => {
            print!("{}", spliced);
            Ok(())
        }
    }
}

/// Merger picked on the command line.
enum CliMerger {
    Command(CommandMerger),
    Replace(ReplaceMerger),
}

impl Merger for CliMerger {
    fn merge(&self, current: &str, incoming: &str) -> Result<String, MergeError> {
        match self {
            CliMerger::Command(merger) => merger.merge(current, incoming),
            CliMerger::Replace(merger) => merger.merge(current, incoming),
        }
    }
}

fn build_syncer(
    config_path: Option<&Path>,
    args: &SyncArgs,
) -> Result<Syncer<DirRepository, CliMerger>, CliError> {
    let mut config = config::resolve(config_path).map_err(cli_error)?;
    if let Some(repo) = args.repo.clone() {
        config.repository.root = repo;
    }
    if let Some(branch) = args.branch.clone() {
        config.repository.branch = branch;
    }
    if let Some(base) = args.base.clone() {
        config.repository.base_branch = base;
    }
    if let Some(path) = args.path.clone() {
        config.repository.path = path;
    }
    if args.no_verify {
        config.merge.verify = false;
    }

    let merger = if args.replace {
        CliMerger::Replace(ReplaceMerger)
    } else {
        CliMerger::Command(
            CommandMerger::from_command(&config.merge.command, &config.merge.instructions)
                .map_err(|err| CliError {
                    message: format!("{} (set merge.command or pass --replace)", err),
                })?,
        )
    };
    let repository = DirRepository::new(config.repository.root.clone());
    Ok(Syncer::new(
        repository,
        merger,
        SyncSettings::from_config(&config),
    ))
}

fn sync_once(
    syncer: &Syncer<DirRepository, CliMerger>,
    incoming: &Path,
    json: bool,
) -> Result<SyncReport, CliError> {
    let css = read_file(incoming)?;
    let report = syncer.run(&css).map_err(cli_error)?;
    if json {
        print_json(&report)?;
    } else {
        print_report(&report);
    }
    Ok(report)
}

fn print_report(report: &SyncReport) {
    match report.status {
        SyncStatus::UpToDate => println!(
            "{} on {} is already up to date",
            report.path, report.branch
        ),
        SyncStatus::Unchanged => println!(
            "merge left {} on {} unchanged",
            report.path, report.branch
        ),
        SyncStatus::Updated => {
            let revision = report
                .revision
                .as_ref()
                .map(|revision| revision.short().to_string())
                .unwrap_or_default();
            println!(
                "updated {} on {} (lines {}-{}, revision {})",
                report.path, report.branch, report.start_line, report.end_line, revision
            );
            if let Some(review) = report.review.as_ref() {
                let verb = if report.review_created {
                    "opened"
                } else {
                    "updated"
                };
                println!("{} review #{}: {}", verb, review.number, review.title);
            }
        }
    }
}

fn run_sync(config_path: Option<&Path>, args: &SyncArgs) -> Result<(), CliError> {
    let syncer = build_syncer(config_path, args)?;
    sync_once(&syncer, &args.incoming, args.json).map(|_| ())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct WatchOptions {
    poll: bool,
    poll_interval_ms: u64,
}

fn run_watch(
    config_path: Option<&Path>,
    args: &SyncArgs,
    options: WatchOptions,
) -> Result<(), CliError> {
    let syncer = build_syncer(config_path, args)?;
    sync_once(&syncer, &args.incoming, args.json)?;

    let (tx, rx) = channel();
    let mut watcher: Box<dyn notify::Watcher> = if options.poll {
        Box::new(
            notify::PollWatcher::new(
                tx,
                notify::Config::default()
                    .with_poll_interval(Duration::from_millis(options.poll_interval_ms)),
            )
            .map_err(|err| CliError {
                message: format!("failed to start poll watcher: {}", err),
            })?,
        )
    } else {
        Box::new(notify::recommended_watcher(tx).map_err(|err| CliError {
            message: format!("failed to start watcher: {}", err),
        })?)
    };

    let root = watch_root(&args.incoming);
    watcher
        .watch(&root, notify::RecursiveMode::NonRecursive)
        .map_err(|err| CliError {
            message: format!("failed to watch {}: {}", root.display(), err),
        })?;

    if options.poll {
        tracing::info!("watching {} (polling, press Ctrl+C to stop)", args.incoming.display());
    } else {
        tracing::info!("watching {} (press Ctrl+C to stop)", args.incoming.display());
    }

    let mut last_event = Instant::now();
    loop {
        match rx.recv_timeout(Duration::from_millis(200)) {
            Ok(event_result) => {
                let event = match event_result {
                    Ok(event) => event,
                    Err(err) => {
                        tracing::warn!("watch error: {}", err);
                        continue;
                    }
                };
                if !touches_file(&event, &args.incoming) {
                    continue;
                }
                if last_event.elapsed() < Duration::from_millis(200) {
                    continue;
                }
                last_event = Instant::now();
                tracing::info!("change detected, syncing...");
                if let Err(err) = sync_once(&syncer, &args.incoming, args.json) {
                    tracing::warn!("sync failed: {}", err.message);
                }
            }
            Err(std::sync::mpsc::RecvTimeoutError::Timeout) => continue,
            Err(_) => break,
        }
    }

    Ok(())
}

fn watch_root(file: &Path) -> PathBuf {
    match file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn touches_file(event: &notify::Event, file: &Path) -> bool {
    let Some(name) = file.file_name() else {
        return false;
    };
    event
        .paths
        .iter()
        .any(|path| path.file_name() == Some(name))
}
