//! Vigil
//!
//! Validates rules files and runs a rule engine that reloads its rules
//! without pausing evaluation.
//!
//! `vigil run` keeps two roles apart: a data task that fetches the current
//! engine on every tick, and a control loop that rebuilds it on SIGHUP or
//! when a rules file changes.

use anyhow::{Context, Result};
use clap::Parser;
use metrics_exporter_prometheus::PrometheusHandle;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use vigil_core::{CaptureHandle, OfflineInspector};
use vigil_engine::{EngineSnapshot, SwappableEngine};
use vigil_rules::{LoadReport, RuleFile};

mod cli;
mod watch;

use cli::{Cli, Commands, EngineArgs};

/// Global shutdown flag
static SHUTDOWN: AtomicBool = AtomicBool::new(false);

/// Check if shutdown has been requested
pub fn is_shutting_down() -> bool {
    SHUTDOWN.load(Ordering::SeqCst)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { engine } => {
            init_tracing(engine.verbose);
            validate(&engine)
        }
        Commands::Run {
            engine,
            watch,
            tick_ms,
            metrics,
        } => {
            init_tracing(engine.verbose);
            let handle = init_metrics()?;
            run(engine, watch, Duration::from_millis(tick_ms.max(1))).await?;
            if metrics {
                println!("{}", handle.render());
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn validate(args: &EngineArgs) -> Result<ExitCode> {
    let config = args.load_config().context("failed to load configuration")?;
    let files = RuleFile::open_all(&args.rules).context("failed to read rules files")?;

    let engine = SwappableEngine::new(config)?;
    engine.attach_capture(capture_handle());

    match engine.validate(&files) {
        Ok(report) => {
            print!("{}", report);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            eprint!("{}", e.detail());
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn run(args: EngineArgs, watch_files: bool, tick: Duration) -> Result<()> {
    info!("Starting Vigil");

    let config = args.load_config().context("failed to load configuration")?;
    info!(
        sources = ?config.event_sources,
        plugins = config.plugin_infos.len(),
        "Configuration loaded successfully"
    );

    let engine = Arc::new(SwappableEngine::init(config, capture_handle())?);
    let report = reload(&engine, &args.rules)
        .await
        .context("initial rules load failed")?;
    log_report(&report);

    let data = tokio::spawn(evaluate(Arc::clone(&engine), tick));

    let (_watcher, mut changes) = if watch_files {
        let (watcher, rx) = watch::watch_rules(&args.rules)?;
        (Some(watcher), rx)
    } else {
        // Never polled while `watching` is false
        let (_, rx) = mpsc::channel(1);
        (None, rx)
    };
    let mut watching = watch_files;

    let mut hangup = hangup_signal();
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = hangup.recv() => {
                info!("SIGHUP received, reloading rules");
                reload_and_log(&engine, &args.rules).await;
            }
            change = changes.recv(), if watching => {
                match change {
                    Some(()) => {
                        info!("Rules files changed, reloading");
                        reload_and_log(&engine, &args.rules).await;
                    }
                    None => {
                        warn!("Rules watcher stopped");
                        watching = false;
                    }
                }
            }
        }
    }

    SHUTDOWN.store(true, Ordering::SeqCst);
    warn!("Shutdown signal received, stopping...");
    data.await.context("evaluation task panicked")?;

    let stats = engine.metrics().snapshot();
    info!(
        builds = stats.total_builds(),
        failed = stats.builds_failed,
        published = stats.snapshots_published,
        fetches = stats.fetches,
        avg_build_us = stats.avg_build_us(),
        "Shutdown complete"
    );
    Ok(())
}

/// Data role: adopt the latest engine once per tick
async fn evaluate(engine: Arc<SwappableEngine>, tick: Duration) {
    let mut interval = tokio::time::interval(tick);
    let mut current: Option<EngineSnapshot> = None;

    while !is_shutting_down() {
        interval.tick().await;

        let snapshot = match engine.fetch() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!(error = %e, "No engine available");
                continue;
            }
        };

        let changed = current
            .as_ref()
            .map_or(true, |prev| !Arc::ptr_eq(prev, &snapshot));
        if changed {
            info!(
                generation = engine.generation(),
                rules = snapshot.num_rules(),
                enabled = snapshot.enabled_rules().count(),
                sources = ?snapshot.sources().names(),
                "Evaluating with new engine"
            );
            current = Some(snapshot);
        }
    }
    debug!("Evaluation task stopped");
}

/// Control role: read the rules files and rebuild off the async workers
async fn reload(engine: &Arc<SwappableEngine>, paths: &[PathBuf]) -> Result<LoadReport> {
    let engine = Arc::clone(engine);
    let paths = paths.to_vec();
    let report = tokio::task::spawn_blocking(move || -> Result<LoadReport> {
        let files = RuleFile::open_all(&paths)?;
        Ok(engine.replace(&files)?)
    })
    .await??;
    Ok(report)
}

async fn reload_and_log(engine: &Arc<SwappableEngine>, paths: &[PathBuf]) {
    match reload(engine, paths).await {
        Ok(report) => log_report(&report),
        Err(e) => {
            let detail = match e.downcast_ref::<vigil_core::Error>() {
                Some(err) => err.detail(),
                None => e.to_string(),
            };
            error!("Reload failed, keeping current engine:\n{}", detail.trim_end());
        }
    }
}

fn log_report(report: &LoadReport) {
    info!(
        files = report.results().len(),
        warnings = report.warning_count(),
        "Rules loaded"
    );
    for line in report.text().lines() {
        debug!("{}", line);
    }
}

fn capture_handle() -> CaptureHandle {
    CaptureHandle::new(OfflineInspector::new("vigil"))
}

/// Resolves on each SIGHUP; never resolves off unix
struct Hangup {
    #[cfg(unix)]
    inner: Option<signal::unix::Signal>,
}

impl Hangup {
    async fn recv(&mut self) {
        #[cfg(unix)]
        if let Some(sig) = self.inner.as_mut() {
            sig.recv().await;
            return;
        }
        std::future::pending::<()>().await
    }
}

fn hangup_signal() -> Hangup {
    #[cfg(unix)]
    {
        let inner = match signal::unix::signal(signal::unix::SignalKind::hangup()) {
            Ok(sig) => Some(sig),
            Err(e) => {
                warn!(error = %e, "Failed to install SIGHUP handler, reload on signal disabled");
                None
            }
        };
        Hangup { inner }
    }

    #[cfg(not(unix))]
    Hangup {}
}

/// Listen for shutdown signals (SIGTERM, SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Initialize tracing/logging
fn init_tracing(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("vigil=debug,vigil_engine=debug,vigil_rules=debug")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("vigil=info,vigil_engine=info,vigil_rules=info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Initialize metrics recorder and return handle for rendering
fn init_metrics() -> Result<PrometheusHandle> {
    use metrics_exporter_prometheus::PrometheusBuilder;

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install metrics: {}", e))?;

    metrics::describe_counter!(
        "vigil_engine_builds_total",
        "Engine builds by kind and outcome"
    );
    metrics::describe_counter!(
        "vigil_engine_swaps_total",
        "Engine snapshots published to the evaluation path"
    );
    metrics::describe_histogram!(
        "vigil_engine_build_latency_us",
        metrics::Unit::Microseconds,
        "Engine build latency in microseconds"
    );

    info!("Metrics recorder initialized");
    Ok(handle)
}
