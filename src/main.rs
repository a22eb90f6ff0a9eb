use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use outreach_dispatch::config::{ContentConfig, OutreachConfig};
use outreach_dispatch::delivery::{Mailer, create_mailer};
use outreach_dispatch::error::Result;
use outreach_dispatch::llm::create_provider;
use outreach_dispatch::outreach::{
    AiGenerator, AiSettings, ContentGenerator, DispatchDeps, DispatchSettings, Dispatcher, Ledger,
    QueueEntry, QuotaTracker, RecipientQueue, TemplateGenerator,
};
use outreach_dispatch::store::{JsonQueueStore, JsonlLedgerStore, RunLock};

/// Quota-bounded outreach email sender.
#[derive(Parser)]
#[command(name = "outreach-dispatch", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

/// Subcommands. `send` runs when none is given.
#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Command {
    /// Dispatch up to OUTREACH_DISPATCHES_PER_RUN emails.
    Send,

    /// Show today's quota usage and queue size.
    Status,

    /// Put addresses back on the queue for another attempt.
    Requeue {
        /// Addresses to re-add. Ones already in the ledger are skipped.
        #[arg(required = true)]
        addresses: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Install rustls crypto provider before any TLS usage
    let _ = rustls::crypto::ring::default_provider().install_default();

    let cli = Cli::parse();

    let config = match OutreachConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            return Ok(ExitCode::from(2));
        }
    };

    let _log_guard = init_tracing(config.log_dir.as_deref())?;

    match cli.command.unwrap_or(Command::Send) {
        Command::Send => send(&config).await,
        Command::Status => status(&config).await,
        Command::Requeue { addresses } => requeue(&config, &addresses).await,
    }
}

/// stderr logging, plus a daily-rolling file when a log directory is set.
fn init_tracing(log_dir: Option<&Path>) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    let Some(dir) = log_dir else {
        tracing_subscriber::registry().with(filter).with(stderr).init();
        return Ok(None);
    };

    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
    let (writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, "outreach-dispatch.log"));
    let file = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_ansi(false)
        .with_writer(writer);

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr)
        .with(file)
        .init();
    Ok(Some(guard))
}

async fn open_ledger(config: &OutreachConfig) -> Result<Ledger> {
    let store = Arc::new(JsonlLedgerStore::new(&config.ledger_path));
    Ok(Ledger::load(store).await?)
}

async fn open_queue(config: &OutreachConfig) -> Result<RecipientQueue> {
    let store = Arc::new(JsonQueueStore::new(&config.queue_path));
    Ok(RecipientQueue::load(store).await?)
}

fn build_mailer(config: &OutreachConfig) -> Result<Arc<dyn Mailer>> {
    Ok(create_mailer(&config.delivery, config.retry.timeout)?)
}

fn build_generator(config: &OutreachConfig) -> Result<Arc<dyn ContentGenerator>> {
    let sender_name = config.sender.display_name().to_string();
    match &config.content {
        ContentConfig::Template { subject, body } => Ok(Arc::new(TemplateGenerator::new(
            subject.clone(),
            body.load()?,
            sender_name,
        )?)),
        ContentConfig::Ai {
            llm,
            pitch,
            fallback_subject,
        } => {
            let provider = create_provider(llm)?;
            let mut settings = AiSettings {
                sender_name,
                fallback_subject: fallback_subject.clone(),
                ..AiSettings::default()
            };
            if let Some(pitch) = pitch {
                settings.pitch = pitch.clone();
            }
            Ok(Arc::new(AiGenerator::new(provider, settings, config.retry.clone())))
        }
    }
}

async fn send(config: &OutreachConfig) -> anyhow::Result<ExitCode> {
    let _lock = RunLock::acquire(&config.lock_path).await?;

    let generator = build_generator(config)?;
    let mailer = build_mailer(config)?;
    info!(
        generator = %generator.name(),
        transport = %mailer.name(),
        limit = config.max_per_day,
        "Starting outreach run"
    );

    let deps = DispatchDeps {
        ledger: open_ledger(config).await?,
        queue: open_queue(config).await?,
        quota: QuotaTracker::new(config.max_per_day),
        generator,
        mailer,
    };
    let settings = DispatchSettings {
        sender: config.sender.clone(),
        requeue_on_failure: config.requeue_on_failure,
        delivery_retry: config.retry.clone(),
    };

    let mut dispatcher = Dispatcher::new(settings, deps);
    let outcomes = match dispatcher.run(config.dispatches_per_run).await {
        Ok(outcomes) => outcomes,
        Err(e) => {
            error!(error = %e, "Outreach run aborted");
            return Err(e.into());
        }
    };

    let mut failed = false;
    for outcome in &outcomes {
        if outcome.is_failure() {
            failed = true;
            error!(outcome = %outcome, "Dispatch failed");
        } else {
            info!(outcome = %outcome, "Dispatch finished");
        }
    }

    Ok(if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

async fn status(config: &OutreachConfig) -> anyhow::Result<ExitCode> {
    let ledger = open_ledger(config).await?;
    let queue = open_queue(config).await?;
    let quota = QuotaTracker::new(config.max_per_day).state(&ledger);

    println!("Date:        {}", quota.date);
    println!("Sent today:  {}/{}", quota.sent, quota.limit);
    println!("Remaining:   {}", quota.remaining());
    println!("Queued:      {}", queue.len());
    println!("Ledger size: {}", ledger.len());
    Ok(ExitCode::SUCCESS)
}

async fn requeue(config: &OutreachConfig, addresses: &[String]) -> anyhow::Result<ExitCode> {
    let _lock = RunLock::acquire(&config.lock_path).await?;

    let ledger = open_ledger(config).await?;
    let mut queue = open_queue(config).await?;

    for address in addresses {
        if ledger.was_sent(address) {
            warn!(address = %address, "Already sent, not requeuing");
            continue;
        }
        if queue.requeue(QueueEntry::Address(address.clone())).await? {
            println!("Requeued {address}");
        }
    }
    Ok(ExitCode::SUCCESS)
}
