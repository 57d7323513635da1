use anyhow::Context;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use stockmemo_core::config::Settings;
use stockmemo_core::digest;
use stockmemo_core::domain::contract::{RawSessionInput, SessionInput};
use stockmemo_core::domain::recommendation::Session;
use stockmemo_core::ledger::Ledger;
use stockmemo_core::llm::anthropic::AnthropicClient;
use stockmemo_core::llm::error::LlmDiagnosticsError;
use stockmemo_core::llm::{DigestRequest, LlmClient};
use stockmemo_core::storage::LedgerStore;
use stockmemo_core::time::clock;
use tracing::Instrument;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod delivery;
mod options;

#[derive(Debug, Parser)]
#[command(name = "stockmemo_worker")]
struct Args {
    /// morning | afternoon | emergency. Defaults from the local clock.
    #[arg(long)]
    session: Option<String>,

    /// Ledger date (YYYY-MM-DD). Defaults to today's local date.
    #[arg(long)]
    as_of_date: Option<String>,

    /// Session input JSON: holdings, cash, quotes, recommendations, market context.
    #[arg(long)]
    input: PathBuf,

    /// Read the ledger and print the prompt; no writes and no model call.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();
    let run_id = uuid::Uuid::new_v4();

    let now = chrono::Utc::now();
    let offset = settings.ledger_utc_offset_hours;
    let as_of_date = clock::resolve_today(args.as_of_date.as_deref(), now, offset)?;
    let session = clock::resolve_session(args.session.as_deref(), now, offset)?;
    let local_now = clock::local_now(now, offset)?;

    let span = tracing::info_span!("session_run", %run_id, %as_of_date, %session);
    execute(args, settings, session, as_of_date, local_now)
        .instrument(span)
        .await
}

async fn execute(
    args: Args,
    settings: Settings,
    session: Session,
    as_of_date: chrono::NaiveDate,
    local_now: chrono::NaiveDateTime,
) -> anyhow::Result<()> {
    let input = load_input(&args.input).await?;
    let opts = options::DigestOptions::from_env(settings.digest_output_dir.clone());

    // Memory is optional: without a store the digest still goes out.
    let store = match stockmemo_core::storage::open_store(&settings).await {
        Ok(store) => Some(store),
        Err(err) => {
            sentry_anyhow::capture_anyhow(&err);
            tracing::error!(error = %err, "ledger store unavailable; running without memory");
            None
        }
    };

    if args.dry_run {
        let memory_text = memory_context(store.clone(), &input, &opts, as_of_date).await;
        let prompt = digest::build_digest_prompt(session, as_of_date, &input, &memory_text);
        tracing::info!(dry_run = true, prompt_len = prompt.len(), "dry-run: prompt assembled");
        println!("{prompt}");
        return Ok(());
    }

    let lock = match &store {
        Some(store) => acquire_session_lock(store.as_ref(), as_of_date, session).await,
        None => SessionLock::Unavailable,
    };
    let store = match lock {
        SessionLock::Held => store,
        SessionLock::Busy => {
            tracing::warn!("session lock not acquired; another run in progress");
            return Ok(());
        }
        SessionLock::Unavailable => None,
    };

    let result = run_session(store.clone(), &settings, &input, &opts, session, as_of_date, local_now).await;

    if let Some(store) = &store {
        if let Err(err) = store.release_session_lock(as_of_date, session).await {
            tracing::warn!(error = %err, "failed to release session lock");
        }
    }

    if let Err(err) = &result {
        sentry_anyhow::capture_anyhow(err);
        tracing::error!(error = %err, "session run failed");
    }
    result
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionLock {
    Held,
    Busy,
    Unavailable,
}

/// Lock errors degrade to running without the ledger; only a lock held by
/// another run stops the session.
async fn acquire_session_lock(
    store: &dyn LedgerStore,
    as_of_date: chrono::NaiveDate,
    session: Session,
) -> SessionLock {
    match store.try_acquire_session_lock(as_of_date, session).await {
        Ok(true) => SessionLock::Held,
        Ok(false) => SessionLock::Busy,
        Err(err) => {
            sentry_anyhow::capture_anyhow(&err);
            tracing::error!(error = %err, "session lock check failed; running without memory");
            SessionLock::Unavailable
        }
    }
}

async fn run_session(
    store: Option<Arc<dyn LedgerStore>>,
    settings: &Settings,
    input: &SessionInput,
    opts: &options::DigestOptions,
    session: Session,
    as_of_date: chrono::NaiveDate,
    local_now: chrono::NaiveDateTime,
) -> anyhow::Result<()> {
    let ledger = store.clone().map(Ledger::new);

    if let Some(ledger) = &ledger {
        if let Err(err) = ledger
            .record_portfolio_snapshot(input.holdings(), input.cash, input.total_value(), as_of_date)
            .await
        {
            tracing::warn!(error = %err, "failed to record portfolio snapshot");
        }

        if let Some(market) = input.market.clone() {
            if let Err(err) = ledger.record_market_context(market, as_of_date).await {
                tracing::warn!(error = %err, "failed to record market context");
            }
        }
    }

    let memory_text = memory_context(store, input, opts, as_of_date).await;
    let prompt = digest::build_digest_prompt(session, as_of_date, input, &memory_text);

    let digest_text = match generate(settings, session, as_of_date, prompt).await {
        Ok(text) => text,
        Err(err) => {
            sentry_anyhow::capture_anyhow(&err);
            if let Some(diag) = err.downcast_ref::<LlmDiagnosticsError>() {
                tracing::error!(
                    stage = diag.stage,
                    status = ?diag.status,
                    raw_output = diag.raw_output.as_deref().unwrap_or(""),
                    "digest generation failed"
                );
            } else {
                tracing::error!(error = %err, "digest generation failed");
            }
            digest::error_digest(session, as_of_date, &err)
        }
    };

    if let Some(ledger) = &ledger {
        let report = ledger
            .record_recommendations(input.recommendations.clone(), session, as_of_date)
            .await;
        if report.is_complete() {
            tracing::info!(recorded = report.recorded.len(), "recommendations recorded");
        } else {
            tracing::warn!(
                recorded = report.recorded.len(),
                failed = report.failed.len(),
                "some recommendations were not recorded"
            );
        }
    }

    println!("{}", delivery::render_console(&digest_text, session, local_now));
    let path = delivery::save_digest(&opts.output_dir, local_now, session, &digest_text).await?;
    tracing::info!(path = %path.display(), "digest saved");
    Ok(())
}

async fn generate(
    settings: &Settings,
    session: Session,
    as_of_date: chrono::NaiveDate,
    prompt: String,
) -> anyhow::Result<String> {
    let llm = AnthropicClient::from_settings(settings)?;
    tracing::info!(provider = %llm.provider(), prompt_len = prompt.len(), "requesting digest");
    llm.generate_digest(DigestRequest {
        as_of_date,
        session,
        prompt,
    })
    .await
}

async fn memory_context(
    store: Option<Arc<dyn LedgerStore>>,
    input: &SessionInput,
    opts: &options::DigestOptions,
    as_of_date: chrono::NaiveDate,
) -> String {
    let Some(store) = store else {
        return digest::format_memory_context(None, &[]);
    };

    let ledger = Ledger::new(store);
    let summary = ledger
        .summarize(&input.held_tickers(), &input.current_prices, as_of_date)
        .await;
    let changes = ledger.portfolio_changes(opts.memory_window_days).await;
    tracing::info!(
        recent = summary.recent_recommendations_count,
        outcomes = summary.outcomes.len(),
        changes = changes.len(),
        "memory summary built"
    );
    digest::format_memory_context(Some(&summary), &changes)
}

async fn load_input(path: &Path) -> anyhow::Result<SessionInput> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read session input {}", path.display()))?;
    RawSessionInput::from_json_str(&text)
        .with_context(|| format!("invalid session input {}", path.display()))
}

fn init_sentry(settings: &Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
