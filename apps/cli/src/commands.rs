//! CLI command definitions, routing, and tracing setup.

use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use docent_core::{
    ChatClient, FileMemoryStore, FileRecorder, LogFile, MemoryStore, Orchestrator,
    ProgressReporter, llm_stages,
};
use docent_shared::{
    AppConfig, DocumentHandle, PipelineOptions, StageKind, init_config, load_config,
    validate_api_key,
};
use docent_source::AutoSource;
use docent_storage::Storage;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{info, warn};

/// Request timeout for fetching web documents.
const WEB_TIMEOUT_SECS: u64 = 30;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Docent: read a document once, then answer questions about it.
#[derive(Parser)]
#[command(
    name = "docent",
    version,
    about = "Analyze a PDF, web page or text file with LLM stage agents and ask questions about it.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Directory for the memory file, conversation log and database.
    #[arg(long, env = "DOCENT_DATA_DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Ask questions about a document (interactive unless -q is given).
    Ask {
        /// PDF path, web URL or text file.
        document: String,

        /// Ask a single question and exit.
        #[arg(short, long)]
        question: Option<String>,
    },

    /// Run preprocessing and print the summary, critique and ideas.
    Analyze {
        /// PDF path, web URL or text file.
        document: String,
    },

    /// Drop the stored analysis of a document.
    Reset {
        /// PDF path, web URL or text file.
        document: String,
    },

    /// List stored analyses, newest first.
    List,

    /// Conversation memory management.
    Memory {
        #[command(subcommand)]
        action: MemoryAction,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Memory subcommands.
#[derive(Subcommand)]
pub(crate) enum MemoryAction {
    /// Print the accumulated memory.
    Show,
    /// Forget the accumulated memory.
    Clear,
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags. Logs go to stderr so answers on
/// stdout stay clean.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "docent=warn",
        1 => "docent=info",
        2 => "docent=debug",
        _ => "docent=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let mut config = load_config()?;
    if let Some(dir) = &cli.data_dir {
        config.defaults.data_dir = dir.to_string_lossy().into_owned();
    }

    match cli.command {
        Command::Ask { document, question } => cmd_ask(&config, &document, question.as_deref()).await,
        Command::Analyze { document } => cmd_analyze(&config, &document).await,
        Command::Reset { document } => cmd_reset(&config, &document).await,
        Command::List => cmd_list(&config).await,
        Command::Memory { action } => match action {
            MemoryAction::Show => cmd_memory_show(&config).await,
            MemoryAction::Clear => cmd_memory_clear(&config).await,
        },
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(&config).await,
        },
    }
}

// ---------------------------------------------------------------------------
// Session wiring
// ---------------------------------------------------------------------------

/// Orchestrator wired to the configured model endpoint and data files.
async fn build_orchestrator(config: &AppConfig, progress: Arc<CliProgress>) -> Result<Orchestrator> {
    let api_key = validate_api_key(config)?;
    let client = Arc::new(ChatClient::new(&config.llm, api_key)?);
    let stages = llm_stages(&config.llm, client);

    let progress_log = Arc::new(LogFile::new(config.defaults.memory_path()));
    let conversation_log = Arc::new(LogFile::new(config.defaults.conversation_log_path()));
    let memory = Arc::new(FileMemoryStore::new(Arc::clone(&progress_log)));
    let recorder = Arc::new(FileRecorder::new(progress_log, conversation_log));
    let source = Arc::new(AutoSource::new(WEB_TIMEOUT_SECS)?);

    let mut orchestrator = Orchestrator::new(
        stages,
        source,
        memory,
        recorder,
        PipelineOptions::from(config),
    )
    .with_progress(progress);

    if config.pipeline.persist_analysis {
        let storage = open_storage(config).await?;
        orchestrator = orchestrator.with_storage(Arc::new(storage));
    }

    Ok(orchestrator)
}

async fn open_storage(config: &AppConfig) -> Result<Storage> {
    let path = config.defaults.database_path();
    Ok(Storage::open(&path).await?)
}

fn memory_store(config: &AppConfig) -> FileMemoryStore {
    FileMemoryStore::new(Arc::new(LogFile::new(config.defaults.memory_path())))
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_ask(config: &AppConfig, document: &str, question: Option<&str>) -> Result<()> {
    let handle = DocumentHandle::new(document)?;
    let progress = Arc::new(CliProgress::new());
    let mut orchestrator = build_orchestrator(config, Arc::clone(&progress)).await?;

    if let Some(question) = question {
        let answer = orchestrator.answer(&handle, question).await;
        progress.clear();
        println!("{}", answer?);
        return Ok(());
    }

    info!(%handle, "starting interactive session");
    let prepared = orchestrator.preprocess(&handle).await;
    progress.clear();
    prepared?;

    let sentinel = config.defaults.exit_sentinel.as_str();
    println!("Document ready. Ask a question, or type '{sentinel}' to quit.");

    let stdin = BufReader::new(tokio::io::stdin());
    let end = run_session(
        &mut orchestrator,
        &handle,
        sentinel,
        stdin,
        &mut std::io::stdout(),
        &progress,
    )
    .await?;
    info!(?end, "interactive session finished");
    Ok(())
}

/// How an interactive session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    /// The exit sentinel was typed; memory has been cleared.
    Exit,
    /// Input ran out; memory is kept.
    Eof,
}

/// Answer questions read line by line from `input` until the sentinel
/// (case-insensitive) or end of input. A failed question is reported and the
/// loop continues.
async fn run_session<R, W>(
    orchestrator: &mut Orchestrator,
    handle: &DocumentHandle,
    sentinel: &str,
    input: R,
    out: &mut W,
    progress: &CliProgress,
) -> Result<SessionEnd>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut lines = input.lines();
    loop {
        write!(out, "\n> ")?;
        out.flush()?;

        let Some(line) = lines.next_line().await? else {
            writeln!(out)?;
            return Ok(SessionEnd::Eof);
        };
        let input = line.trim();

        if input.eq_ignore_ascii_case(sentinel) {
            orchestrator.clear_memory().await?;
            writeln!(out, "Memory cleared. Goodbye.")?;
            return Ok(SessionEnd::Exit);
        }
        if input.is_empty() {
            continue;
        }

        let answer = orchestrator.answer(handle, input).await;
        progress.clear();
        match answer {
            Ok(answer) => writeln!(out, "\n{answer}")?,
            Err(e) => {
                warn!(error = %e, "question failed");
                eprintln!("Error: {e}");
            }
        }
    }
}

async fn cmd_analyze(config: &AppConfig, document: &str) -> Result<()> {
    let handle = DocumentHandle::new(document)?;
    let progress = Arc::new(CliProgress::new());
    let mut orchestrator = build_orchestrator(config, Arc::clone(&progress)).await?;

    let prepared = orchestrator.preprocess(&handle).await;
    progress.clear();
    prepared?;

    let record = orchestrator
        .analysis(&handle)
        .ok_or_else(|| eyre!("no analysis available for '{handle}'"))?;

    for (title, body) in [
        ("Summary", &record.summary),
        ("Critique", &record.critique),
        ("Innovation", &record.innovation),
    ] {
        println!();
        println!("  {title}");
        println!("  {}", "-".repeat(title.len()));
        println!("{body}");
    }
    println!();

    Ok(())
}

async fn cmd_reset(config: &AppConfig, document: &str) -> Result<()> {
    let handle = DocumentHandle::new(document)?;
    let storage = open_storage(config).await?;
    let removed = storage.delete_analysis(handle.as_str()).await?;

    info!(%handle, removed, "analysis reset");
    if removed > 0 {
        println!("Stored analysis for '{handle}' removed.");
    } else {
        println!("No stored analysis for '{handle}'.");
    }
    Ok(())
}

async fn cmd_list(config: &AppConfig) -> Result<()> {
    let storage = open_storage(config).await?;
    let analyses = storage.list_analyses().await?;

    if analyses.is_empty() {
        println!("No stored analyses.");
        return Ok(());
    }
    for analysis in analyses {
        let fingerprint: String = analysis.fingerprint.chars().take(12).collect();
        println!(
            "{}  {}  {}",
            analysis.created_at.format("%Y-%m-%d %H:%M:%S"),
            fingerprint,
            analysis.handle
        );
    }
    Ok(())
}

async fn cmd_memory_show(config: &AppConfig) -> Result<()> {
    let text = memory_store(config).load().await?;
    if text.trim().is_empty() {
        println!("(memory is empty)");
    } else {
        println!("{text}");
    }
    Ok(())
}

async fn cmd_memory_clear(config: &AppConfig) -> Result<()> {
    memory_store(config).clear().await?;
    println!("Memory cleared: {}", config.defaults.memory_path().display());
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(config: &AppConfig) -> Result<()> {
    let toml_str = toml::to_string_pretty(config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// One indicatif spinner per running stage.
struct CliProgress {
    spinner: Mutex<Option<ProgressBar>>,
}

impl CliProgress {
    fn new() -> Self {
        Self {
            spinner: Mutex::new(None),
        }
    }

    /// Remove a spinner left behind by a failed stage.
    fn clear(&self) {
        if let Ok(mut slot) = self.spinner.lock() {
            if let Some(spinner) = slot.take() {
                spinner.finish_and_clear();
            }
        }
    }
}

impl ProgressReporter for CliProgress {
    fn stage_started(&self, stage: StageKind, handle: &DocumentHandle) {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.set_message(format!("{stage} working on {handle}"));
        spinner.enable_steady_tick(Duration::from_millis(80));

        if let Ok(mut slot) = self.spinner.lock() {
            if let Some(previous) = slot.replace(spinner) {
                previous.finish_and_clear();
            }
        }
    }

    fn stage_finished(&self, stage: StageKind, elapsed: Duration) {
        self.clear();
        eprintln!("  ✓ {stage} ({:.1}s)", elapsed.as_secs_f64());
    }
}
