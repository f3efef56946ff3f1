use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use gatekeeper_engine::{ConsentEventIngester, RawEventIngester, RelayBuilder, RelayWorker};
use gatekeeper_server::config::GatekeeperConfig;
use gatekeeper_server::{api, sink_factory, source_factory, telemetry};

/// Consent-gated relay for subject records.
#[derive(Parser, Debug)]
#[command(
    name = "gatekeeper-server",
    about = "Forwards minimized records to relying parties only while consent is granted"
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "gatekeeper.toml")]
    config: String,

    /// Override the bind host.
    #[arg(long)]
    host: Option<String>,

    /// Override the bind port.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = GatekeeperConfig::load(&cli.config)?;
    telemetry::init(&config.logging);

    if !Path::new(&cli.config).exists() {
        info!(path = %cli.config, "config file not found, using defaults");
    }

    let sink = sink_factory::create_sink(&config)?;
    if let Err(e) = sink.health_check().await {
        warn!(sink = %sink.name(), error = %e, "sink health check failed, publishes will retry");
    }

    let mut builder = RelayBuilder::new()
        .sink(sink)
        .redaction(config.redaction.to_policy())
        .required_scope(config.relay.required_scope.clone())
        .buffer_capacity(config.relay.buffer_capacity)
        .activity_capacity(config.relay.activity_capacity)
        .channel_prefix(config.channels.prefix.clone())
        .channel_retention(config.channels.retention())
        .executor_config(config.executor.to_executor_config());
    for (subject_id, case) in config.seed.case_refs(&config.relay.relying_party) {
        builder = builder.seed_case(subject_id, case);
    }
    let engine = builder.build()?;

    let view = engine.view();
    let policy = engine.policy().clone();
    let metrics = Arc::clone(engine.metrics());
    let sources = source_factory::create_sources(&config.transport)?;

    // One worker owns the engine; both ingesters feed its inbox.
    let cancel = CancellationToken::new();
    let (worker, handle) = RelayWorker::new(engine, config.relay.inbox_capacity, cancel.clone());
    let worker_task = tokio::spawn(worker.run());
    let raw_task = tokio::spawn(
        RawEventIngester::new(
            sources.raw,
            policy,
            handle.clone(),
            view.raw_status(),
            Arc::clone(&metrics),
        )
        .run(cancel.clone()),
    );
    let consent_task = tokio::spawn(
        ConsentEventIngester::new(sources.consent, handle, view.consent_status(), metrics)
            .run(cancel.clone()),
    );

    info!(
        required_scope = %config.relay.required_scope,
        channel_prefix = %view.channel_prefix(),
        buffer_capacity = view.buffer_capacity(),
        transport = %config.transport.backend,
        sink = %config.sink.backend,
        "relay started"
    );

    if config.server.enabled {
        let host = cli.host.unwrap_or_else(|| config.server.host.clone());
        let port = cli.port.unwrap_or(config.server.port);
        let addr = format!("{host}:{port}");

        let listener = tokio::net::TcpListener::bind(&addr).await?;
        info!(address = %addr, "gatekeeper-server listening");

        axum::serve(listener, api::router(view.clone()))
            .with_graceful_shutdown(shutdown_signal())
            .await?;
    } else {
        shutdown_signal().await;
    }

    // Stop intake first, then let the worker finish its current message.
    cancel.cancel();
    for (stream, task) in [("raw", raw_task), ("consent", consent_task)] {
        if let Err(e) = task.await {
            warn!(stream, error = %e, "ingester task failed");
        }
    }

    let shutdown_timeout = Duration::from_secs(config.server.shutdown_timeout_seconds);
    match tokio::time::timeout(shutdown_timeout, worker_task).await {
        Ok(Ok(engine)) => {
            let counters = engine.view().metrics();
            info!(
                raw_received = counters.raw_received,
                decisions_received = counters.decisions_received,
                forwarded = counters.forwarded,
                replayed = counters.replayed,
                withheld = counters.withheld,
                publish_failures = counters.publish_failures,
                "relay stopped"
            );
        }
        Ok(Err(e)) => warn!(error = %e, "relay worker task failed"),
        Err(_) => warn!(
            timeout_secs = config.server.shutdown_timeout_seconds,
            "shutdown timeout exceeded, relay worker abandoned"
        ),
    }

    info!("gatekeeper-server shut down");
    Ok(())
}

/// Wait for SIGINT (Ctrl+C) or SIGTERM, then return to trigger shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!("received SIGINT"); }
        () = terminate => { info!("received SIGTERM"); }
    }
}
