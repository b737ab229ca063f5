// Headless timeline for telegraph documents

use anyhow::{bail, Context as _};
use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::path::PathBuf;
use telegraph_core::{
    Delivery, DeliveryOutcome, ErrorFallback, Journal, Message, Runtime, RuntimeConfig, Session,
    SessionObserver, Value,
};
use telegraph_journal::{ExportFormat, Exporter, Replayer};
use telegraph_script::Loader;
use tracing::info;

#[derive(Parser)]
#[command(name = "telegraph-timeline")]
#[command(about = "Run engine documents headlessly and inspect the message timeline", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Runtime configuration file (RON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the rule failure policy
    #[arg(long, global = true)]
    fallback: Option<Fallback>,
}

#[derive(Subcommand)]
enum Commands {
    /// Deliver messages in timeline order and print what happens
    Run {
        /// Inline JSON document or path to a .json/.ron file
        source: String,

        /// Maximum number of deliveries
        #[arg(short = 'n', long, default_value = "1000")]
        steps: usize,

        /// Write the delivery journal to this file
        #[arg(short, long)]
        journal: Option<PathBuf>,

        /// Journal format
        #[arg(short, long, value_enum, default_value = "json")]
        format: Format,
    },

    /// Record a run, then replay it on a fresh session and compare
    Check {
        /// Inline JSON document or path to a .json/.ron file
        source: String,

        /// Maximum number of deliveries
        #[arg(short = 'n', long, default_value = "1000")]
        steps: usize,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Fallback {
    FirstBinding,
    CallerDefault,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Json,
    Ron,
    Text,
}

impl From<Format> for ExportFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Json => ExportFormat::Json,
            Format::Ron => ExportFormat::Ron,
            Format::Text => ExportFormat::Text,
        }
    }
}

/// Prints presentation events as they happen
struct Printer;

impl SessionObserver for Printer {
    fn on_engine_state_changed(&mut self, engine: &str, state: &Value) {
        println!("    {} is now {}", engine, state);
    }

    fn on_message_generated(&mut self, message: &Message) {
        println!(
            "    {} queued: {} -> {} [{}] {}",
            message.id, message.from, message.to, message.kind, message.payload
        );
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let log_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(&cli)?;

    match cli.command {
        Commands::Run {
            source,
            steps,
            journal,
            format,
        } => run(&source, &config, steps, journal, format.into()),
        Commands::Check { source, steps } => check(&source, &config, steps),
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<RuntimeConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let content = fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            ron::from_str(&content).with_context(|| format!("parsing config {}", path.display()))?
        }
        None => RuntimeConfig::default(),
    };
    if let Some(fallback) = cli.fallback {
        config = config.with_error_fallback(match fallback {
            Fallback::FirstBinding => ErrorFallback::FirstBinding,
            Fallback::CallerDefault => ErrorFallback::CallerDefault,
        });
    }
    Ok(config)
}

fn load_session(source: &str, config: &RuntimeConfig) -> anyhow::Result<Session> {
    let mut loader = Loader::new();
    loader.load_source(source).context("loading document")?;
    let document = loader.finish();
    if document.engines.is_empty() {
        bail!("document defines no engines");
    }
    Ok(document.into_session(config))
}

fn run(
    source: &str,
    config: &RuntimeConfig,
    steps: usize,
    journal_path: Option<PathBuf>,
    format: ExportFormat,
) -> anyhow::Result<()> {
    let mut session = load_session(source, config)?;
    let mut runtime = Runtime::with_config(config.clone());
    runtime.observe(Printer);
    let mut journal = Journal::new();
    journal.start_recording();

    println!("start");
    runtime.start(&mut session);

    let mut delivered = 0;
    while delivered < steps {
        if session.in_flight().next().is_none() {
            session.present_pending();
        }
        let Some(next) = session.in_flight().next().cloned() else {
            break;
        };
        print_message(&next);
        let delivery = runtime.deliver_with_journal(&mut session, &next, &mut journal);
        print_outcome(&delivery);
        delivered += 1;
    }

    println!();
    println!("final states");
    for engine in session.engines().iter() {
        println!("  {}: {}", engine.name(), engine.state);
    }
    if !session.is_idle() {
        println!("stopped after {} deliveries with messages outstanding", steps);
    }

    if let Some(path) = journal_path {
        let exported = Exporter::new(&journal).export(format)?;
        fs::write(&path, exported).with_context(|| format!("writing journal {}", path.display()))?;
        info!(path = %path.display(), entries = journal.entries().len(), "journal written");
    }
    Ok(())
}

fn print_message(message: &Message) {
    println!(
        "  {} {} -> {} [{}] {}",
        message.id, message.from, message.to, message.kind, message.payload
    );
}

fn print_outcome(delivery: &Delivery) {
    match delivery.outcome {
        DeliveryOutcome::Applied if !delivery.state_changed && delivery.generated.is_empty() => {
            println!("    (no effect)")
        }
        DeliveryOutcome::Applied => {}
        DeliveryOutcome::UnknownEngine => println!("    (unknown engine)"),
        DeliveryOutcome::AlreadyDelivered => println!("    (already delivered)"),
    }
}

fn check(source: &str, config: &RuntimeConfig, steps: usize) -> anyhow::Result<()> {
    let mut session = load_session(source, config)?;
    let mut runtime = Runtime::with_config(config.clone());
    let mut journal = Journal::new();
    journal.start_recording();
    runtime.start(&mut session);
    for _ in 0..steps {
        if runtime.step_with_journal(&mut session, &mut journal).is_none() {
            break;
        }
    }

    let mut fresh = load_session(source, config)?;
    let mut fresh_runtime = Runtime::with_config(config.clone());
    fresh_runtime.start(&mut fresh);
    let replayed = Replayer::new(&journal)
        .replay_all(&mut fresh, &mut fresh_runtime)
        .context("replay diverged from the recorded run")?;

    println!("deterministic: {} deliveries replayed identically", replayed);
    Ok(())
}
