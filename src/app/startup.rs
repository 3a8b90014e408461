//! Process bootstrap
//!
//! Resolves settings, starts logging and the pipeline, then waits for an
//! operator signal before draining.

use crate::app::args::Args;
use crate::app::config::{ConfigError, Settings, StoreKind};
use crate::app::sender::DemoSender;
use crate::app::status::{print_status, summary_detail, summary_json, StatusKind};
use crate::broker::{BrokerError, InMemoryBroker};
use crate::core::error_handling::log_error_with_context;
use crate::core::logging::{init_logging, LogFormat};
use crate::core::shutdown::ShutdownCoordinator;
use crate::core::time::{Clock, SystemClock};
use crate::core::version;
use crate::pipeline::{
    AgeParityPolicy, Pipeline, PipelineResult, PipelineSettings, StatsSnapshot,
};
use crate::store::{JsonlConnector, MemoryStore, StoreConnector};
use std::io::IsTerminal;
use std::sync::Arc;

/// Run the application and return the process exit code
pub async fn startup() -> i32 {
    let args = Args::parse_from_env();

    let settings = match resolve_settings(&args).await {
        Ok(settings) => settings,
        Err(e) => {
            // Log through whatever the command line alone asks for.
            let mut fallback = Settings::default();
            let _ = fallback.apply_args(&args);
            if start_logging(&fallback).is_ok() {
                log_error_with_context(&e, "Loading configuration");
            } else {
                eprintln!("Error: {}", e);
            }
            return 1;
        }
    };

    let color = match start_logging(&settings) {
        Ok(color) => color,
        Err(e) => {
            eprintln!("Error: failed to initialise logging: {}", e);
            return 1;
        }
    };

    print_status(StatusKind::Info, "start", &version::banner(), color);
    log::info!(
        "{} starting: topic '{}', {} store",
        version::banner(),
        settings.pipeline.topic,
        settings.store.kind
    );

    match run(&settings).await {
        Ok(snapshot) => {
            let detail = match settings.log_format() {
                Ok(LogFormat::Json) => summary_json(&snapshot),
                _ => summary_detail(&snapshot),
            };
            print_status(StatusKind::Success, "stopped", &detail, color);
            0
        }
        Err(e) => {
            log_error_with_context(&e, "Running pipeline");
            print_status(StatusKind::Failure, "failed", &e.to_string(), color);
            1
        }
    }
}

/// Defaults, then the configuration file, then command line flags
pub async fn resolve_settings(args: &Args) -> Result<Settings, ConfigError> {
    let mut settings = Settings::load(args.config_file.as_deref()).await?;
    settings.apply_args(args)?;
    settings.validate()?;
    Ok(settings)
}

/// Start logging from resolved settings; returns whether color is enabled
fn start_logging(settings: &Settings) -> Result<bool, Box<dyn std::error::Error>> {
    let color = settings
        .logging
        .color
        .unwrap_or_else(|| std::io::stdout().is_terminal());
    colored::control::set_override(color);

    let format = settings.log_format().unwrap_or(LogFormat::Text);
    init_logging(
        Some(settings.logging.level.as_str()),
        format,
        settings.log_file(),
        color,
    )?;
    Ok(color)
}

fn store_connector(settings: &Settings) -> Box<dyn StoreConnector> {
    match settings.store.kind {
        StoreKind::Jsonl => Box::new(JsonlConnector::new(settings.store.path.clone())),
        StoreKind::Memory => Box::new(MemoryStore::new()),
    }
}

/// Run the pipeline until shutdown is requested
async fn run(settings: &Settings) -> PipelineResult<StatsSnapshot> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let broker = InMemoryBroker::new();

    let (coordinator, _shutdown_rx) = ShutdownCoordinator::new();
    coordinator.install_signal_handlers();

    let pipeline = Pipeline::start(
        &broker,
        store_connector(settings),
        PipelineSettings {
            topic: settings.pipeline.topic.clone(),
        },
        Arc::new(AgeParityPolicy::new(settings.max_age())),
        clock.clone(),
    )
    .await?;
    let stats = pipeline.stats();

    let mut sender = settings.send_interval().map(|interval| {
        log::info!(
            "Demo sender publishing every {}ms",
            settings.sender.interval_ms
        );
        DemoSender::spawn(
            pipeline.outbound(),
            pipeline.topic().to_string(),
            clock.clone(),
            interval,
            settings.sender.count,
        )
    });

    let outcome = pipeline
        .run_until(async {
            coordinator.requested().await;
            log::info!("Shutdown requested");
            if let Some(sender) = sender.take() {
                report_sender(sender.stop().await);
            }
        })
        .await;

    // Only reached with a live sender when a worker stopped early.
    if let Some(sender) = sender.take() {
        report_sender(sender.stop().await);
    }

    let snapshot = stats.snapshot();
    match outcome {
        Ok(()) => Ok(snapshot),
        Err(e) => {
            log::info!("Pipeline totals before failure: {}", snapshot);
            Err(e)
        }
    }
}

fn report_sender(outcome: Result<u64, BrokerError>) {
    match outcome {
        Ok(sent) => log::info!("Demo sender stopped after {} message(s)", sent),
        Err(BrokerError::Closed) => log::debug!("Demo sender stopped by broker close"),
        Err(e) => log::warn!("Demo sender failed: {}", e),
    }
}
