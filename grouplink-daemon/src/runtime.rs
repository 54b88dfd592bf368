use std::collections::HashMap;
use std::fs;
use std::future::Future;
use std::io::ErrorKind;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, oneshot, watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use grouplink_core::paths::{root_at, settings_path_at};
use grouplink_core::{settings, Settings};
use grouplink_sync::pipeline::{self, RunOutput, RunScope};
use grouplink_sync::{job_cancel, BatchStore, JobId, SyncContext, SyncResult, Tally};

use crate::error::{io_err, panicked, DaemonError};
use crate::paths::{logs_dir, run_dir, socket_path, DEBOUNCE_WINDOW};
use crate::protocol::{
    DaemonRequest, DaemonResponse, CMD_CANCEL, CMD_FULL, CMD_STATUS, CMD_STEP, CMD_STOP,
};

type LastRun = Arc<RwLock<Option<RunSummary>>>;

/// Engine work the processor executes, one item at a time.
#[derive(Debug, Clone)]
enum Work {
    /// A scheduler tick under the settings current at tick time.
    Scheduled(Settings),
    Run(RunScope),
    Cancel(JobId),
}

impl Work {
    fn label(&self) -> String {
        match self {
            Work::Scheduled(settings) => scope_label(&pipeline::scheduled_scope(settings)),
            Work::Run(scope) => scope_label(scope),
            Work::Cancel(job) => format!("cancel {job}"),
        }
    }
}

fn scope_label(scope: &RunScope) -> String {
    match scope {
        RunScope::Step { job, .. } => job.to_string(),
        RunScope::Full(direction) => format!("full_{}", direction.slug()),
    }
}

struct EngineJob {
    work: Work,
    source: &'static str,
    respond_to: oneshot::Sender<Result<Value, String>>,
}

enum Done {
    Ran(RunOutput),
    Cancelled { job: JobId, removed: bool },
}

/// The last engine run, as shown by `status`.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run: String,
    pub source: String,
    /// The job completed (always true for full syncs).
    pub finished: bool,
    pub tally: Tally,
    pub duration_ms: u128,
    pub at_unix: u64,
}

/// Start the daemon runtime and block the current thread until it exits.
pub fn start_blocking(home: &Path) -> Result<(), DaemonError> {
    ensure_runtime_dirs(home)?;
    init_tracing(home);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(home.to_path_buf()))
}

/// Run the daemon until `stop`, ctrl-c or a task failure.
pub async fn run(home: PathBuf) -> Result<(), DaemonError> {
    ensure_runtime_dirs(&home)?;

    let initial = settings::load_at(&home)?;
    tracing::info!(
        interval = %initial.interval,
        direction = %initial.direction,
        batch_count = initial.batch_count,
        "daemon starting",
    );
    let (settings_tx, settings_rx) = watch::channel(initial);
    let ctx = pipeline::open_at(&home);
    let batches = ctx.batches.clone();
    let last_run: LastRun = Arc::new(RwLock::new(None));
    let started_at_unix = unix_seconds_now();

    let (engine_tx, engine_rx) = mpsc::channel::<EngineJob>(64);
    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    let server = SocketServer {
        home: home.clone(),
        batches,
        settings: settings_rx.clone(),
        last_run: last_run.clone(),
        engine_tx: engine_tx.clone(),
        shutdown_tx: shutdown_tx.clone(),
        started_at_unix,
    };
    let tasks = [
        supervise(
            "settings_watcher",
            &shutdown_tx,
            settings_watcher_task(home.clone(), settings_tx, shutdown_tx.subscribe()),
        ),
        supervise(
            "scheduler",
            &shutdown_tx,
            scheduler_task(settings_rx, engine_tx, shutdown_tx.subscribe()),
        ),
        supervise(
            "engine_processor",
            &shutdown_tx,
            engine_processor_task(ctx, last_run, engine_rx, shutdown_tx.subscribe()),
        ),
        supervise(
            "socket_server",
            &shutdown_tx,
            socket_server_task(server, shutdown_tx.subscribe()),
        ),
        supervise(
            "log_rotation",
            &shutdown_tx,
            log_rotation_task(home, shutdown_tx.subscribe()),
        ),
        supervise("signal_handler", &shutdown_tx, signal_task(shutdown_tx.subscribe())),
    ];

    // Every task ends once shutdown is broadcast; collect all before reporting.
    let mut results = Vec::with_capacity(tasks.len());
    for (name, handle) in tasks {
        results.push((name, handle.await));
    }
    for (name, result) in results {
        handle_join(name, result)?;
    }
    tracing::info!("daemon stopped");
    Ok(())
}

/// Spawn one daemon task. Whichever task returns first, cleanly or not,
/// broadcasts shutdown so the rest wind down with it.
fn supervise<F>(
    name: &'static str,
    shutdown: &broadcast::Sender<()>,
    task: F,
) -> (&'static str, JoinHandle<Result<(), DaemonError>>)
where
    F: Future<Output = Result<(), DaemonError>> + Send + 'static,
{
    let shutdown = shutdown.clone();
    let handle = tokio::spawn(async move {
        let result = task.await;
        if let Err(err) = &result {
            tracing::error!(task = name, error = %err, "daemon task failed");
        }
        let _ = shutdown.send(());
        result
    });
    (name, handle)
}

async fn signal_task(mut shutdown_rx: broadcast::Receiver<()>) -> Result<(), DaemonError> {
    tokio::select! {
        _ = shutdown_rx.recv() => Ok(()),
        signal = tokio::signal::ctrl_c() => {
            signal.map_err(|err| io_err("ctrl-c handler", err))?;
            tracing::info!("ctrl-c received, stopping daemon");
            Ok(())
        }
    }
}

/// Reload `settings.yaml` into the watch channel whenever it changes.
async fn settings_watcher_task(
    home: PathBuf,
    settings_tx: watch::Sender<Settings>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let root = root_at(&home);
    if !root.exists() {
        fs::create_dir_all(&root).map_err(|e| io_err(&root, e))?;
    }
    // Event paths arrive canonicalized on some platforms (/private/var on macOS).
    let root = fs::canonicalize(&root).unwrap_or(root);
    let settings_file = root.join(
        settings_path_at(&home)
            .file_name()
            .unwrap_or_default(),
    );

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
    let mut watcher: RecommendedWatcher = recommended_watcher(move |event| {
        let _ = event_tx.send(event);
    })?;
    watcher.watch(&root, RecursiveMode::NonRecursive)?;
    tracing::debug!(path = %root.display(), "watching settings directory");

    let mut debounce = HashMap::<PathBuf, Instant>::new();

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            event = event_rx.recv() => {
                let Some(event) = event else { break };
                let event = match event {
                    Ok(event) => event,
                    Err(err) => {
                        tracing::warn!(error = %err, "watcher event error");
                        continue;
                    }
                };
                if !is_relevant_event_kind(&event.kind)
                    || !event.paths.iter().any(|path| path == &settings_file)
                {
                    continue;
                }
                if !should_process_event(&mut debounce, &settings_file, Instant::now()) {
                    continue;
                }
                reload_settings(&home, &settings_tx).await;
            }
        }
    }

    Ok(())
}

async fn reload_settings(home: &Path, settings_tx: &watch::Sender<Settings>) {
    let home = home.to_path_buf();
    let loaded = tokio::task::spawn_blocking(move || settings::load_at(&home)).await;
    match loaded {
        Ok(Ok(fresh)) => {
            let changed = settings_tx.send_if_modified(|current| {
                if *current == fresh {
                    false
                } else {
                    *current = fresh.clone();
                    true
                }
            });
            if changed {
                tracing::info!(
                    interval = %fresh.interval,
                    direction = %fresh.direction,
                    batch_count = fresh.batch_count,
                    "settings reloaded",
                );
            }
        }
        Ok(Err(err)) => tracing::warn!(error = %err, "settings reload failed, keeping previous"),
        Err(err) => tracing::warn!(error = %err, "settings reload task failed"),
    }
}

/// Queue a scheduled run every `settings.interval`, restarting the wait
/// whenever the settings change.
async fn scheduler_task(
    mut settings_rx: watch::Receiver<Settings>,
    engine_tx: mpsc::Sender<EngineJob>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    loop {
        let current = settings_rx.borrow_and_update().clone();
        match current.interval.period() {
            None => {
                tracing::info!("scheduled runs are off");
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    changed = settings_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
            Some(period) => {
                tracing::info!(
                    interval = %current.interval,
                    "next scheduled run in {}s",
                    period.as_secs()
                );
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    changed = settings_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    _ = tokio::time::sleep(period) => {
                        match enqueue(&engine_tx, Work::Scheduled(current), "scheduler").await {
                            Ok(_) => tracing::info!("scheduled run completed"),
                            Err(err) => tracing::error!(error = %err, "scheduled run failed"),
                        }
                    }
                }
            }
        }
    }
    Ok(())
}

async fn engine_processor_task(
    ctx: SyncContext,
    last_run: LastRun,
    mut engine_rx: mpsc::Receiver<EngineJob>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            maybe_job = engine_rx.recv() => {
                let Some(job) = maybe_job else { break };
                let started = Instant::now();
                let label = job.work.label();
                let work = job.work;
                let ctx = ctx.clone();
                let result = tokio::task::spawn_blocking(move || execute(&ctx, work))
                    .await
                    .map_err(|err| panicked("engine run", err))?;

                let outcome = match result {
                    Ok(Done::Ran(output)) => {
                        let summary = summarise(label, job.source, &output, started.elapsed());
                        tracing::info!(
                            run = %summary.run,
                            source = %summary.source,
                            finished = summary.finished,
                            tally = %summary.tally,
                            duration_ms = summary.duration_ms,
                            "engine run completed",
                        );
                        *last_run.write().await = Some(summary);
                        Ok(output_json(&output))
                    }
                    Ok(Done::Cancelled { job, removed }) => {
                        Ok(json!({ "identifier": job.to_string(), "cancelled": removed }))
                    }
                    Err(err) => {
                        tracing::warn!(run = %label, error = %err, "engine run failed");
                        Err(err.to_string())
                    }
                };

                let _ = job.respond_to.send(outcome);
            }
        }
    }

    Ok(())
}

fn execute(ctx: &SyncContext, work: Work) -> SyncResult<Done> {
    match work {
        Work::Scheduled(settings) => pipeline::scheduled_tick(ctx, &settings).map(Done::Ran),
        Work::Run(scope) => pipeline::run(ctx, scope).map(Done::Ran),
        Work::Cancel(job) => {
            job_cancel(ctx, &job).map(|removed| Done::Cancelled { job, removed })
        }
    }
}

fn summarise(run: String, source: &str, output: &RunOutput, elapsed: Duration) -> RunSummary {
    let (finished, tally) = match output {
        RunOutput::Step(progress) => (progress.finished, Tally::of(&progress.outcomes)),
        RunOutput::Full(report) => (true, report.tally()),
    };
    RunSummary {
        run,
        source: source.to_string(),
        finished,
        tally,
        duration_ms: elapsed.as_millis(),
        at_unix: unix_seconds_now(),
    }
}

fn output_json(output: &RunOutput) -> Value {
    match output {
        RunOutput::Step(progress) => json!(progress),
        RunOutput::Full(report) => json!({
            "direction": report.direction,
            "tally": report.tally(),
            "pairs": report.pairs,
        }),
    }
}

/// Everything a socket client may touch.
#[derive(Clone)]
struct SocketServer {
    home: PathBuf,
    batches: BatchStore,
    settings: watch::Receiver<Settings>,
    last_run: LastRun,
    engine_tx: mpsc::Sender<EngineJob>,
    shutdown_tx: broadcast::Sender<()>,
    started_at_unix: u64,
}

async fn socket_server_task(
    server: SocketServer,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let run = run_dir(&server.home);
    if !run.exists() {
        fs::create_dir_all(&run).map_err(|e| io_err(&run, e))?;
    }

    let socket = socket_path(&server.home);
    prepare_socket_for_bind(&socket)?;

    let listener = UnixListener::bind(&socket).map_err(|e| io_err(&socket, e))?;
    set_socket_permissions(&socket)?;
    tracing::info!(socket = %socket.display(), "listening");

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(|e| io_err(&socket, e))?;
                let server = server.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_socket_client(stream, server).await {
                        tracing::error!(error = %err, "socket client error");
                    }
                });
            }
        }
    }

    if socket.exists() {
        let _ = fs::remove_file(&socket);
    }
    Ok(())
}

async fn handle_socket_client(stream: UnixStream, server: SocketServer) -> Result<(), DaemonError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| io_err("daemon socket read", e))?
    {
        if line.trim().is_empty() {
            continue;
        }

        let request: DaemonRequest = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(err) => {
                write_response(
                    &mut writer,
                    &DaemonResponse::error(format!("invalid request JSON: {err}")),
                )
                .await?;
                continue;
            }
        };

        let response = respond(&server, &request).await;
        write_response(&mut writer, &response).await?;
        if request.cmd == CMD_STOP {
            break;
        }
    }

    Ok(())
}

async fn respond(server: &SocketServer, request: &DaemonRequest) -> DaemonResponse {
    let current = server.settings.borrow().clone();
    let direction = request.direction.unwrap_or(current.direction);

    let work = match request.cmd.as_str() {
        CMD_STATUS => {
            return match build_status_payload(server, &current).await {
                Ok(payload) => DaemonResponse::ok(payload),
                Err(err) => DaemonResponse::error(err.to_string()),
            };
        }
        CMD_STOP => {
            let _ = server.shutdown_tx.send(());
            return DaemonResponse::ok(json!({ "stopping": true }));
        }
        CMD_STEP => Work::Run(RunScope::Step {
            job: JobId::manual(direction),
            step_size: request.step_size.unwrap_or(current.batch_count),
        }),
        CMD_FULL => Work::Run(RunScope::Full(direction)),
        CMD_CANCEL => Work::Cancel(JobId::manual(direction)),
        other => {
            return DaemonResponse::error(DaemonError::UnknownCommand(other.to_string()).to_string())
        }
    };

    match enqueue(&server.engine_tx, work, "socket").await {
        Ok(data) => DaemonResponse::ok(data),
        Err(err) => DaemonResponse::error(err.to_string()),
    }
}

async fn build_status_payload(
    server: &SocketServer,
    settings: &Settings,
) -> Result<Value, DaemonError> {
    let batches = server.batches.clone();
    let jobs = tokio::task::spawn_blocking(move || batches.list())
        .await
        .map_err(|err| panicked("job listing", err))??;
    let last_run = server.last_run.read().await.clone();

    Ok(json!({
        "running": true,
        "started_at_unix": server.started_at_unix,
        "settings": settings,
        "last_run": last_run,
        "jobs": jobs,
        "socket": socket_path(&server.home).display().to_string(),
    }))
}

async fn enqueue(
    engine_tx: &mpsc::Sender<EngineJob>,
    work: Work,
    source: &'static str,
) -> Result<Value, DaemonError> {
    let (tx, rx) = oneshot::channel();
    engine_tx
        .send(EngineJob {
            work,
            source,
            respond_to: tx,
        })
        .await
        .map_err(|_| DaemonError::ChannelClosed("engine queue"))?;

    let outcome = rx
        .await
        .map_err(|_| DaemonError::ChannelClosed("engine response"))?;
    outcome.map_err(DaemonError::Engine)
}

async fn log_rotation_task(
    home: PathBuf,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let mut interval = tokio::time::interval(Duration::from_secs(5));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // No rotation at startup.
    interval.tick().await;

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = interval.tick() => {
                let home = home.clone();
                tokio::task::spawn_blocking(move || crate::log_rotation::rotate_logs(&home))
                    .await
                    .ok();
            }
        }
    }
    Ok(())
}

fn is_relevant_event_kind(kind: &EventKind) -> bool {
    matches!(kind, EventKind::Create(_) | EventKind::Modify(_))
}

fn prepare_socket_for_bind(socket: &Path) -> Result<(), DaemonError> {
    if !socket.exists() {
        return Ok(());
    }

    match StdUnixStream::connect(socket) {
        Ok(_) => {
            return Err(DaemonError::Protocol(format!(
                "daemon socket already in use: {}",
                socket.display()
            )));
        }
        Err(err) => {
            tracing::warn!(
                socket = %socket.display(),
                error = %err,
                "removing stale daemon socket before bind",
            );
        }
    }

    match fs::remove_file(socket) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(socket, err)),
    }
}

fn should_process_event(
    debounce: &mut HashMap<PathBuf, Instant>,
    path: &Path,
    now: Instant,
) -> bool {
    should_process_event_with_threshold(debounce, path, now, DEBOUNCE_WINDOW)
}

fn should_process_event_with_threshold(
    debounce: &mut HashMap<PathBuf, Instant>,
    path: &Path,
    now: Instant,
    threshold: Duration,
) -> bool {
    debounce.retain(|_, seen_at| now.duration_since(*seen_at) <= Duration::from_secs(30));
    match debounce.get(path) {
        Some(last_seen) if now.duration_since(*last_seen) < threshold => false,
        _ => {
            debounce.insert(path.to_path_buf(), now);
            true
        }
    }
}

fn ensure_runtime_dirs(home: &Path) -> Result<(), DaemonError> {
    for dir in [root_at(home), run_dir(home), logs_dir(home)] {
        if !dir.exists() {
            fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
        }
    }
    Ok(())
}

async fn write_response(
    writer: &mut OwnedWriteHalf,
    response: &DaemonResponse,
) -> Result<(), DaemonError> {
    let payload = serde_json::to_string(response)?;
    writer
        .write_all(payload.as_bytes())
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .write_all(b"\n")
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .flush()
        .await
        .map_err(|e| io_err("daemon socket flush", e))?;
    Ok(())
}

fn handle_join(
    task: &'static str,
    joined: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    joined.map_err(|err| panicked(task, err))?
}

fn unix_seconds_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// `RUST_LOG` filters (default `info`); `GROUPLINK_LOG_FORMAT=json` switches
/// to one JSON object per line.
///
/// Every event goes to stdout and `logs/daemon.log`; warnings and errors are
/// copied to `logs/daemon-err.log`.
fn init_tracing(home: &Path) {
    use tracing_subscriber::fmt::writer::MakeWriterExt;
    use tracing_subscriber::{fmt, EnvFilter};

    use crate::log_rotation::AppendLog;
    use crate::paths::{stderr_log_path, stdout_log_path};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("GROUPLINK_LOG_FORMAT").is_ok_and(|format| format == "json");
    let writer = std::io::stdout
        .and(AppendLog::new(stdout_log_path(home)))
        .and(AppendLog::new(stderr_log_path(home)).with_max_level(tracing::Level::WARN));
    let _ = if json {
        fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(writer)
            .try_init()
    } else {
        fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_ansi(false)
            .with_writer(writer)
            .try_init()
    };
}

#[cfg(unix)]
fn set_socket_permissions(path: &Path) -> Result<(), DaemonError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_socket_permissions(_path: &Path) -> Result<(), DaemonError> {
    Ok(())
}
