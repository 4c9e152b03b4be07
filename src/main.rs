use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use rgain::action::{ActionHistory, VolumeAdjustmentAction};
use rgain::config::{self, GainConfig};
use rgain::dispatcher::{BatchContext, JobDispatcher};
use rgain::format;
use rgain::models::{BatchOutcome, GainMode};
use rgain::progress;
use rgain::{Session, SymphoniaBackend};

#[derive(Parser)]
#[command(name = "rgain", about = "Replay gain volume normalization for media sessions")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a session with one entry per audio file in a directory
    Scan {
        /// Directory containing audio files
        dir: PathBuf,

        /// Session file to write
        #[arg(short, long, default_value = "session.json")]
        output: PathBuf,
    },
    /// Analyze the session's files and adjust entry volumes
    Gain(GainArgs),
    /// Reset entry volumes to unity gain
    Reset {
        /// Session file
        session: PathBuf,

        /// Only reset these entry ids (repeatable)
        #[arg(long = "only", value_name = "ID")]
        only: Vec<String>,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ModeArg {
    /// Apply each file's track gain, limited by its peak
    Track,
    /// Normalize each file's peak to the target level
    Target,
}

#[derive(Args)]
struct GainArgs {
    /// Session file
    session: PathBuf,

    /// Number of parallel analysis jobs (default: number of CPU cores)
    #[arg(short = 'j', long)]
    jobs: Option<usize>,

    /// Volume computation mode
    #[arg(long, value_enum, default_value = "track")]
    mode: ModeArg,

    /// Reference loudness for the analysis, in dB SPL
    #[arg(long, default_value_t = config::DEFAULT_REFERENCE_LEVEL, allow_hyphen_values = true)]
    reference_level: f64,

    /// Target peak level for --mode target, in dB
    #[arg(long, default_value_t = config::DEFAULT_TARGET_LEVEL, allow_hyphen_values = true)]
    target_level: f64,

    /// Give up on a file after this many seconds (0 = never)
    #[arg(long, default_value_t = config::DEFAULT_JOB_TIMEOUT.as_secs())]
    timeout: u64,

    /// Only process these entry ids (repeatable)
    #[arg(long = "only", value_name = "ID")]
    only: Vec<String>,

    /// Output the report as JSON instead of a table
    #[arg(long, conflicts_with = "tui")]
    json: bool,

    /// Show live progress in an interactive TUI
    #[arg(long)]
    tui: bool,

    /// Analyze and report without saving the session
    #[arg(long)]
    dry_run: bool,
}

impl GainArgs {
    fn config(&self) -> GainConfig {
        let mode = match self.mode {
            ModeArg::Track => GainMode::TrackGain,
            ModeArg::Target => GainMode::TargetNormalize {
                target_level: self.target_level,
            },
        };
        GainConfig {
            concurrency: self.jobs.unwrap_or_else(config::default_jobs),
            mode,
            reference_level: self.reference_level,
            job_timeout: (self.timeout > 0).then(|| Duration::from_secs(self.timeout)),
        }
    }
}

/// Log to stderr; `RUST_LOG` overrides the default level.
fn init_logging(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn load_session(path: &Path) -> Result<Arc<Session>> {
    let session = Session::load(path)
        .with_context(|| format!("Failed to load session: {}", path.display()))?;
    Ok(Arc::new(session))
}

fn run_scan(dir: &Path, output: &Path) -> Result<()> {
    if !dir.is_dir() {
        anyhow::bail!("Path '{}' is not a directory", dir.display());
    }
    let session = Session::from_directory(dir)?;
    session
        .save(output)
        .with_context(|| format!("Failed to write session: {}", output.display()))?;
    eprintln!("Wrote {} entries to {}", session.len(), output.display());
    Ok(())
}

fn run_gain(args: &GainArgs) -> Result<()> {
    let config = args.config();
    config.validate()?;

    let session = load_session(&args.session)?;
    let requests = session.requests(config.reference_level, &args.only);
    if requests.is_empty() {
        anyhow::bail!("No entries with a source file to analyze");
    }

    let history = Arc::new(Mutex::new(ActionHistory::new()));
    let (progress_tx, progress_rx) = progress::channel();
    let context = BatchContext {
        backend: Arc::new(SymphoniaBackend::new()),
        store: session.clone(),
        history: Arc::clone(&history),
        progress: progress_tx,
    };

    let files = requests.len();
    let start = Instant::now();
    let dispatcher = JobDispatcher::start(requests, &config, context)?;

    let outcome = if args.tui {
        rgain::tui::run(&args.session, config.mode, config.concurrency, dispatcher, progress_rx)?
    } else {
        eprintln!("Analyzing {} files with {} jobs", files, config.concurrency);
        drop(progress_rx);
        dispatcher.join()?
    };
    let elapsed = start.elapsed();

    if args.json {
        println!("{}", format::format_json(outcome.report()));
    } else {
        println!("{}", format::format_table(outcome.report()));
    }
    eprintln!("{} in {:.2}s", format::format_summary(&outcome), elapsed.as_secs_f64());

    if let BatchOutcome::Completed(_) = outcome {
        if args.dry_run {
            eprintln!("(dry run, session not saved)");
        } else {
            session
                .save(&args.session)
                .with_context(|| format!("Failed to save session: {}", args.session.display()))?;
        }
    }

    Ok(())
}

fn run_reset(path: &Path, only: &[String]) -> Result<()> {
    let session = load_session(path)?;
    let entries = session.entry_ids(only);
    if entries.is_empty() {
        anyhow::bail!("No matching entries in {}", path.display());
    }

    let action = VolumeAdjustmentAction::reset(session.clone(), &entries);
    let count = action.len();
    let mut history = ActionHistory::new();
    history.commit(Box::new(action));

    session
        .save(path)
        .with_context(|| format!("Failed to save session: {}", path.display()))?;
    eprintln!("Reset {} entries to unity gain", count);
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // The TUI owns the terminal; keep log lines from tearing through it
    let tui = matches!(&cli.command, Command::Gain(args) if args.tui);
    init_logging(if tui { "off" } else { "info" });

    match &cli.command {
        Command::Scan { dir, output } => run_scan(dir, output),
        Command::Gain(args) => run_gain(args),
        Command::Reset { session, only } => run_reset(session, only),
    }
}
