mod args;

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use storyshorts::automation::AutomationController;
use storyshorts::channel::channels_from_config;
use storyshorts::config::{load_config, AppConfig, LoggingConfig};
use storyshorts::dispatch::{DispatchMode, Dispatcher};
use storyshorts::pipeline::{Collaborators, RunOutcome, RunSettings, StageRunner};
use storyshorts::status::{channel_status, check_environment};
use storyshorts::store::FileCounterStore;
use storyshorts::tracker::{SystemClock, UploadTracker};
use storyshorts::upload::{consent_url, MetadataBuilder, YouTubeUploader};

use crate::args::{Args, Command};

/// The returned guard flushes the log file when dropped.
fn init_logging(config: &LoggingConfig) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard) = match &config.file {
        Some(path) => {
            let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
            let dir = dir.unwrap_or_else(|| std::path::Path::new("."));
            std::fs::create_dir_all(dir)
                .with_context(|| format!("cannot create log directory {}", dir.display()))?;
            let file_name = path
                .file_name()
                .with_context(|| format!("log file {} has no file name", path.display()))?;
            let appender = tracing_appender::rolling::never(dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .try_init()
        .context("failed to install tracing subscriber")?;
    Ok(guard)
}

fn build_tracker(config: &AppConfig) -> anyhow::Result<Arc<UploadTracker>> {
    let storage_tz: chrono_tz::Tz = config
        .tracker
        .timezone
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid tracker timezone {}", config.tracker.timezone))?;
    Ok(Arc::new(UploadTracker::new(
        Arc::new(FileCounterStore::new(&config.paths.counters)),
        Arc::new(SystemClock),
        storage_tz,
    )))
}

fn build_dispatcher(config: &AppConfig, tracker: Arc<UploadTracker>) -> anyhow::Result<Dispatcher> {
    let channels = channels_from_config(&config.channels)?;
    let runner = StageRunner::new(
        Collaborators::from_config(config)?,
        tracker,
        channels,
        MetadataBuilder::new(config.upload.clone()),
        RunSettings::from_config(config),
    );
    Ok(Dispatcher::new(runner, config.automation.channel_delay()))
}

fn describe(outcome: &RunOutcome) -> String {
    match outcome {
        RunOutcome::Uploaded {
            channel, remote_id, ..
        } => format!("uploaded to {channel} as {remote_id}"),
        RunOutcome::Saved { video } => format!("saved {}", video.display()),
        RunOutcome::NotScheduled { video } => {
            format!("no channel ready, kept {}", video.display())
        }
        RunOutcome::Failed(failure) => failure.to_string(),
    }
}

async fn generate(dispatcher: &Dispatcher, mode: DispatchMode, count: u32, delay: u64) -> anyhow::Result<()> {
    let started = Instant::now();
    println!("Generating {count} video(s) in {mode} mode");

    let report = dispatcher
        .run_batch(&mode, count, Duration::from_secs(delay), |n, report| {
            for outcome in &report.outcomes {
                let mark = if outcome.is_success() { "ok" } else { "failed" };
                println!("[{n}/{count}] {mark}: {}", describe(outcome));
            }
        })
        .await?;

    let stats = report.stats;
    println!();
    println!("Batch complete in {:.1}s", started.elapsed().as_secs_f64());
    println!("  attempted:  {}", stats.attempted);
    println!("  successful: {}", stats.successful);
    println!("  failed:     {}", stats.failed);
    println!("  success rate: {:.1}%", stats.success_rate());

    if !report.overall() {
        anyhow::bail!("no video was produced successfully");
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Cannot listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Cannot listen for SIGTERM: {}", e);
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

async fn automate(config: &AppConfig, dispatcher: Dispatcher) {
    let controller = AutomationController::new(dispatcher, config.automation.clone());
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown requested, finishing current work");
        trigger.cancel();
    });

    controller.supervise(cancel).await;
}

fn print_status(config: &AppConfig, tracker: &UploadTracker) -> anyhow::Result<()> {
    let channels = channels_from_config(&config.channels)?;
    println!("Tracker date: {} ({})", tracker.storage_date(), config.tracker.timezone);
    for status in channel_status(tracker, &channels) {
        println!();
        println!("{} ({})", status.name, status.key);
        println!(
            "  credentials: {}",
            if status.configured { "configured" } else { "not configured" }
        );
        let quota = status
            .daily_quota
            .map_or_else(|| "no schedule".to_string(), |q| q.to_string());
        let today = status
            .uploads_today
            .map_or_else(|| "unreadable".to_string(), |n| n.to_string());
        println!("  uploads today: {today} / {quota}");
        println!("  ready to post: {}", if status.ready { "yes" } else { "no" });
        let history: Vec<String> = status
            .history
            .iter()
            .map(|(date, count)| format!("{}={count}", date.format("%m-%d")))
            .collect();
        println!("  last 7 days: {}", history.join(" "));
    }
    Ok(())
}

async fn check(config: &AppConfig) -> anyhow::Result<()> {
    let channels = channels_from_config(&config.channels)?;
    let items = check_environment(config, &channels).await;
    for item in &items {
        let mark = if item.passed { "ok" } else { "FAIL" };
        println!("[{mark:>4}] {}: {}", item.name, item.detail);
    }
    let failed = items.iter().filter(|i| !i.passed).count();
    if failed > 0 {
        anyhow::bail!("{failed} check(s) failed");
    }
    println!("All checks passed");
    Ok(())
}

async fn authorize(config: &AppConfig, key: &str) -> anyhow::Result<()> {
    let channels = channels_from_config(&config.channels)?;
    let channel = channels
        .iter()
        .find(|c| c.key == key)
        .with_context(|| format!("no channel {key} in configuration"))?;
    let creds = &channel.credentials;
    if creds.client_id.is_empty() || creds.client_secret.is_empty() {
        anyhow::bail!("set client_id and client_secret for channel {key} first");
    }

    println!("Open this URL, sign in as the owner of {}:", channel.name);
    println!();
    println!("{}", consent_url(&creds.client_id)?);
    println!();
    println!("Paste the authorization code:");

    let mut code = String::new();
    BufReader::new(tokio::io::stdin()).read_line(&mut code).await?;
    if code.trim().is_empty() {
        anyhow::bail!("no authorization code entered");
    }

    let refresh_token = YouTubeUploader::new()?.exchange_code(creds, &code).await?;
    info!("Refresh token obtained for channel {}", key);
    println!();
    println!("Set this as refresh_token for channel {key}:");
    println!("{refresh_token}");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let mut config = load_config(&args.config)
        .with_context(|| format!("failed to load {}", args.config.display()))?;
    let _guard = init_logging(&config.logging)?;
    info!("Loaded configuration from {}", args.config.display());

    let tracker = build_tracker(&config)?;
    match args.command {
        Command::Generate {
            count,
            channel,
            broadcast,
            skip_upload,
            upload,
            delay,
        } => {
            if skip_upload {
                config.automation.skip_upload = true;
            } else if upload {
                config.automation.skip_upload = false;
            }
            let mode = match (channel, broadcast) {
                (Some(key), _) => DispatchMode::Targeted(key),
                (None, true) => DispatchMode::Broadcast,
                (None, false) => DispatchMode::Auto,
            };
            let dispatcher = build_dispatcher(&config, tracker)?;
            generate(&dispatcher, mode, count, delay).await
        }
        Command::Automate => {
            let dispatcher = build_dispatcher(&config, tracker)?;
            automate(&config, dispatcher).await;
            Ok(())
        }
        Command::Status => print_status(&config, &tracker),
        Command::Check => check(&config).await,
        Command::Auth { channel } => authorize(&config, &channel).await,
    }
}
