use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use chrono::Utc;
use pagewatch_core::{resource_rows, NewResource, NotificationSettings, ResourcePatch, ResourceRow};
use pagewatch_engine::{
    ensure_data_dir, Collaborators, CycleReport, CycleRun, EntryResult, ExecutionMode,
    FetchSettings, HeuristicJudge, LocatorExtractor, Monitor, MonitorConfig, MonitorError,
    ReqwestFetcher, ResourceStore, TelegramTransport,
};
use serde::Serialize;
use serde_json::json;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use watch_logging::{watch_debug, watch_error, watch_info, watch_warn};

use super::cli::{AddArgs, Cli, Command, EditArgs};
use super::persistence::{FileLockGuard, RonFileStore};
use super::settings::OverrideSettings;

pub const LOG_FILENAME: &str = "pagewatch.log";

type CycleHandle = JoinHandle<Result<CycleReport, MonitorError>>;

/// Runs one CLI invocation. Failures are printed as `{"ok":false,"error":…}`.
pub async fn run(cli: Cli) -> ExitCode {
    if let Err(err) = ensure_data_dir(&cli.data_dir) {
        print_failure(&anyhow!(err).context("failed to prepare data directory"));
        return ExitCode::FAILURE;
    }
    watch_logging::initialize(
        cli.log_target.into(),
        cli.level(),
        &cli.data_dir.join(LOG_FILENAME),
    );

    match execute(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            watch_error!("{:#}", err);
            print_failure(&err);
            ExitCode::FAILURE
        }
    }
}

async fn execute(cli: Cli) -> anyhow::Result<()> {
    let store = Arc::new(RonFileStore::new(&cli.data_dir));
    watch_debug!("Using state file {:?}", store.path());

    match cli.command {
        Command::Run { timeout_secs } => {
            let monitor = build_monitor(store.clone(), cli.bot_token, cli.chat_id)?;
            let _lock = store.lock_monitoring().await?;
            run_once(&monitor, Duration::from_secs(timeout_secs)).await
        }
        Command::Daemon { tick_secs } => {
            let monitor = build_monitor(store.clone(), cli.bot_token, cli.chat_id)?;
            run_daemon(&monitor, &store, Duration::from_secs(tick_secs.max(1))).await
        }
        Command::Check { id } => {
            let monitor = build_monitor(store.clone(), cli.bot_token, cli.chat_id)?;
            let _lock = store.lock_monitoring().await?;
            let report = monitor.check_now(id).await?;
            emit(&CheckOutput {
                ok: true,
                changed: report.changed,
                summary: report.summary.as_deref(),
            })
        }
        Command::Add(args) => add_resource(store.as_ref(), args).await,
        Command::Edit(args) => edit_resource(store.as_ref(), args).await,
        Command::Remove { id } => {
            store
                .delete(id)
                .await
                .with_context(|| format!("failed to remove resource {id}"))?;
            watch_info!("Removed resource {}", id);
            emit(&json!({ "ok": true, "id": id }))
        }
        Command::List { json } => {
            let rows = resource_rows(&store.list().await?, Utc::now());
            if json {
                emit(&rows)
            } else {
                print_table(&rows);
                Ok(())
            }
        }
        Command::Settings { bot_token, chat_id } => {
            let settings = NotificationSettings { bot_token, chat_id };
            if !settings.is_complete() {
                bail!("bot token and chat id must both be non-empty");
            }
            store.set_notification_settings(settings)?;
            watch_info!("Stored notification settings");
            emit(&json!({ "ok": true }))
        }
    }
}

fn build_monitor(
    store: Arc<RonFileStore>,
    bot_token: Option<String>,
    chat_id: Option<String>,
) -> anyhow::Result<Monitor> {
    let settings = Arc::new(OverrideSettings::new(store.clone(), bot_token, chat_id));
    Ok(Monitor::new(
        Collaborators {
            resources: store,
            settings,
            fetcher: Arc::new(ReqwestFetcher::new(FetchSettings::default())),
            extractor: Arc::new(LocatorExtractor),
            judge: Arc::new(HeuristicJudge::new()),
            transport: Arc::new(
                TelegramTransport::new().context("failed to set up the Telegram client")?,
            ),
        },
        MonitorConfig::default(),
    ))
}

async fn run_once(monitor: &Monitor, timeout: Duration) -> anyhow::Result<()> {
    let run = tokio::time::timeout(timeout, monitor.run_cycle(ExecutionMode::Awaited))
        .await
        .map_err(|_| anyhow!("monitoring cycle timed out after {}s", timeout.as_secs()))??;

    match run {
        CycleRun::Completed(report) => {
            log_report(&report);
            emit(&json!({ "ok": true, "report": report }))
        }
        CycleRun::Detached(_) => bail!("awaited cycle returned without a report"),
    }
}

async fn run_daemon(
    monitor: &Monitor,
    store: &RonFileStore,
    tick: Duration,
) -> anyhow::Result<()> {
    let mut ticker = tokio::time::interval(tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The monitoring lock stays with the detached cycle until it is reaped.
    let mut running: Option<(CycleHandle, FileLockGuard)> = None;
    watch_info!("Daemon started, ticking every {}s", tick.as_secs());

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if running.as_ref().is_some_and(|(handle, _)| !handle.is_finished()) {
                    watch_warn!("Previous cycle still running; skipping this tick");
                    continue;
                }
                if let Some((handle, _lock)) = running.take() {
                    finish_cycle(handle).await;
                }
                let lock = match store.lock_monitoring().await {
                    Ok(lock) => lock,
                    Err(err) => {
                        watch_warn!("Cycle not started: {}", err);
                        continue;
                    }
                };
                match monitor.run_cycle(ExecutionMode::Detached).await {
                    Ok(CycleRun::Detached(handle)) => running = Some((handle, lock)),
                    Ok(CycleRun::Completed(report)) => log_report(&report),
                    Err(err) => watch_warn!("Cycle not started: {}", err),
                }
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("failed to listen for interrupt")?;
                watch_info!("Interrupted; waiting for the current cycle");
                break;
            }
        }
    }

    if let Some((handle, _lock)) = running {
        finish_cycle(handle).await;
    }
    Ok(())
}

async fn finish_cycle(handle: CycleHandle) {
    match handle.await {
        Ok(Ok(report)) => log_report(&report),
        Ok(Err(err)) => watch_error!("Cycle failed: {}", err),
        Err(err) => watch_error!("Cycle task panicked or was cancelled: {}", err),
    }
}

fn log_report(report: &CycleReport) {
    let changed = report.checked().filter(|check| check.changed).count();
    watch_info!(
        "Cycle finished: {} checked ({} changed), {} failed, {} skipped",
        report.checked().count(),
        changed,
        report.failed_count(),
        report.skipped_count()
    );
    for entry in &report.entries {
        if let EntryResult::Failed { error } = &entry.result {
            watch_warn!("Resource {} ({}) failed: {}", entry.id, entry.label, error);
        }
    }
}

async fn add_resource(store: &RonFileStore, args: AddArgs) -> anyhow::Result<()> {
    let fields = NewResource::validated(&args.url, &args.label, args.interval, &args.locator)?;
    let id = store.create(fields).await?;
    watch_info!("Added resource {} for {}", id, args.url);
    emit(&json!({ "ok": true, "id": id }))
}

async fn edit_resource(store: &RonFileStore, args: EditArgs) -> anyhow::Result<()> {
    let patch = ResourcePatch::edit(
        args.url.as_deref(),
        args.label.as_deref(),
        args.interval,
        args.locator.as_deref(),
    )?;
    if patch.is_empty() {
        bail!("nothing to change for resource {}", args.id);
    }
    store
        .update(args.id, patch)
        .await
        .with_context(|| format!("failed to edit resource {}", args.id))?;
    watch_info!("Edited resource {}", args.id);
    emit(&json!({ "ok": true, "id": args.id }))
}

#[derive(Serialize)]
struct CheckOutput<'a> {
    ok: bool,
    changed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<&'a str>,
}

fn emit(value: &impl Serialize) -> anyhow::Result<()> {
    let text = serde_json::to_string_pretty(value).context("failed to encode output")?;
    println!("{text}");
    Ok(())
}

fn print_failure(err: &anyhow::Error) {
    println!("{}", json!({ "ok": false, "error": format!("{err:#}") }));
}

fn print_table(rows: &[ResourceRow]) {
    if rows.is_empty() {
        println!("No monitored resources.");
        return;
    }
    println!("{:>4}  {:<8}  {:<3}  {:<5}  {:<20}  URL", "ID", "STATUS", "DUE", "EVERY", "LABEL");
    for row in rows {
        println!(
            "{:>4}  {:<8}  {:<3}  {:<5}  {:<20}  {}",
            row.id,
            row.status.as_str(),
            if row.due { "yes" } else { "no" },
            format!("{}m", row.check_interval_minutes),
            row.label,
            row.url
        );
    }
}
