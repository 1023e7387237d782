use std::sync::Arc;

use aiops_sentinel::config::ServiceConfig;
use aiops_sentinel::core::{run_control_loop, Core};
use aiops_sentinel::cursor::Cursor;
use aiops_sentinel::http;
use aiops_sentinel::poller::Poller;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    if let Err(error) = run().await {
        error!(error = %error, "aiops-sentinel startup failed");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), String> {
    let config = ServiceConfig::from_env().map_err(|error| error.to_string())?;

    let core = Arc::new(Core::new(
        config.max_traces,
        config.trace_ttl_secs,
        config.alpha,
        config.markov_window_capacity,
        config.score_history_capacity,
        config.readiness_threshold,
    ));

    let cursor = match Cursor::load(&config.cursor_path) {
        Ok(cursor) => Some(cursor),
        Err(error) => {
            warn!(error = %error, "failed to load cursor, starting from head");
            None
        }
    };

    let poller = Poller::new(config.audit_service_url.clone(), config.poll_batch_size, config.max_seen_events, cursor)
        .map_err(|error| error.to_string())?;

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    info!(bind_addr = %config.bind_addr, "aiops-sentinel starting");

    let poller_core = core.clone();
    let poller_shutdown = shutdown_rx.clone();
    let poll_interval = config.poll_interval;
    let poller_task = tokio::spawn(async move { poller.run(poller_core, poller_shutdown, poll_interval).await });

    let control_core = core.clone();
    let control_shutdown = shutdown_rx.clone();
    let control_task =
        tokio::spawn(async move { run_control_loop(control_core, control_shutdown, std::time::Duration::from_secs(5)).await });

    let http_core = core.clone();
    let bind_addr = config.bind_addr.clone();
    let http_shutdown = shutdown_rx.clone();
    let http_task = tokio::spawn(async move { http::serve(http_core, &bind_addr, http_shutdown).await });

    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown signal received");
    }
    let _ = shutdown_tx.send(true);

    let _ = tokio::join!(poller_task, control_task, http_task);

    info!("aiops-sentinel shut down");
    Ok(())
}
