use std::io;

use anyhow::{Context, bail};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use services::{Clock, SrsEngine};
use srs_core::model::{HskLevel, UserId, Word, WordId};
use storage::sqlite::SqliteRepository;
use tracing_subscriber::EnvFilter;

/// Spaced-repetition review queue for Chinese vocabulary.
#[derive(Parser)]
#[command(name = "srs")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "SM-2 review scheduling for vocabulary learners")]
struct Cli {
    /// SQLite database URL or file path
    #[arg(long, global = true, env = "SRS_DB_URL", default_value = "sqlite://srs.sqlite3")]
    db: String,

    /// Learner whose progress is read or updated
    #[arg(long, global = true, env = "SRS_USER_ID", default_value_t = 1)]
    user: u64,

    /// Pin the clock to an RFC 3339 timestamp instead of the system time
    #[arg(long, global = true, value_parser = parse_now)]
    now: Option<DateTime<Utc>>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(flatten)]
    Engine(EngineCommand),

    /// Record the learner's current daily streak
    SetStreak { days: u32 },
}

/// Commands served by the review engine.
#[derive(Subcommand)]
enum EngineCommand {
    /// Add or replace a vocabulary item
    AddWord {
        #[arg(long)]
        id: u64,
        #[arg(long)]
        hanzi: String,
        #[arg(long, default_value = "")]
        pinyin: String,
        #[arg(long, default_value_t = 1)]
        hsk: HskLevel,
    },

    /// Start tracking a word for the learner (no-op if already tracked)
    Init { word: u64 },

    /// Grade a review with an SM-2 quality from 0 to 5
    Review {
        word: u64,
        #[arg(allow_negative_numbers = true)]
        quality: i64,
        /// Seconds the learner spent on the card
        #[arg(long, default_value_t = 0)]
        seconds: u32,
    },

    /// Grade a right or wrong answer
    Answer {
        word: u64,
        #[arg(value_enum)]
        outcome: Outcome,
        #[arg(long, default_value_t = 0)]
        seconds: u32,
    },

    /// Words due for review, most overdue first
    Batch {
        #[arg(long)]
        size: Option<u32>,
        #[arg(long)]
        hsk: Option<HskLevel>,
    },

    /// Words with low level or poor accuracy
    Mistakes {
        #[arg(long)]
        size: Option<u32>,
        #[arg(long)]
        hsk: Option<HskLevel>,
    },

    /// Review counts due now, today and this week
    Due,

    /// Level distribution, retention and upcoming reviews
    Stats,

    /// Review events recorded for a word, oldest first
    History { word: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Outcome {
    Correct,
    Incorrect,
}

fn parse_now(raw: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("expected an RFC 3339 timestamp: {e}"))
}

fn normalize_sqlite_url(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed == "sqlite::memory:" || trimmed.starts_with("sqlite://") {
        return trimmed.to_string();
    }

    let path_str = trimmed.strip_prefix("sqlite:").unwrap_or(trimmed);
    let path = std::path::Path::new(path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| std::path::PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn prepare_sqlite_file(db_url: &str) -> anyhow::Result<()> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let Some(path) = db_url.strip_prefix("sqlite://") else {
        bail!("invalid --db value: {db_url}");
    };
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        bail!("invalid --db value: {db_url}");
    }

    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }

    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)
            .with_context(|| format!("creating {}", path.display()))?;
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn set_streak(db_url: &str, user: UserId, days: u32) -> anyhow::Result<()> {
    let repo = SqliteRepository::connect(db_url).await?;
    repo.migrate().await?;
    repo.set_streak_days(user, days).await?;
    tracing::info!(%user, days, "streak recorded");
    print_json(&serde_json::json!({ "user_id": user, "streak_days": days }))
}

async fn run_engine(
    engine: &SrsEngine,
    user: UserId,
    command: EngineCommand,
) -> anyhow::Result<()> {
    match command {
        EngineCommand::AddWord {
            id,
            hanzi,
            pinyin,
            hsk,
        } => {
            let word = Word::new(WordId::new(id), hanzi, pinyin, hsk)?;
            engine.reviews().register_word(&word).await?;
            print_json(&word)
        }
        EngineCommand::Init { word } => {
            let progress = engine
                .reviews()
                .initialize_word_progress(user, WordId::new(word))
                .await?;
            print_json(&progress)
        }
        EngineCommand::Review {
            word,
            quality,
            seconds,
        } => {
            let reviewed = engine
                .reviews()
                .update_srs_by_word(user, WordId::new(word), quality, seconds)
                .await?;
            print_json(&reviewed)
        }
        EngineCommand::Answer {
            word,
            outcome,
            seconds,
        } => {
            let reviewed = engine
                .reviews()
                .record_answer(user, WordId::new(word), outcome == Outcome::Correct, seconds)
                .await?;
            print_json(&reviewed)
        }
        EngineCommand::Batch { size, hsk } => {
            let batch = engine.queue().get_srs_batch(user, size, hsk).await?;
            print_json(&batch)
        }
        EngineCommand::Mistakes { size, hsk } => {
            let batch = engine.queue().get_mistakes_batch(user, size, hsk).await?;
            print_json(&batch)
        }
        EngineCommand::Due => print_json(&engine.stats().get_due_count(user).await?),
        EngineCommand::Stats => print_json(&engine.stats().get_srs_stats(user).await?),
        EngineCommand::History { word } => {
            let events = engine
                .reviews()
                .review_history(user, WordId::new(word))
                .await?;
            print_json(&events)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let db_url = normalize_sqlite_url(&cli.db);
    prepare_sqlite_file(&db_url)?;

    let user = UserId::new(cli.user);
    let clock = cli.now.map_or(Clock::System, Clock::fixed);

    match cli.command {
        Commands::SetStreak { days } => set_streak(&db_url, user, days).await,
        Commands::Engine(command) => {
            let engine = SrsEngine::sqlite(&db_url, clock)
                .await
                .with_context(|| format!("opening {db_url}"))?;
            run_engine(&engine, user, command).await
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // stdout carries JSON; logs go to stderr.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    run(cli).await
}
