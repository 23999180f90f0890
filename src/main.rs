//! Solana Momentum Alert Monitor
//!
//! One process, one pipeline: per-source ingest tasks feed per-source
//! parser tasks, a single correlator task owns state and the durable log,
//! and side tasks run the mirror, fan-out, read API and periodic sweeps.

use clap::{Parser, Subcommand};
use solalert::api::{ApiState, LogCache};
use solalert::config::Config;
use solalert::correlator::{Correlator, CorrelatorMsg};
use solalert::enrich::{DexScreenerClient, QuoteService};
use solalert::error::MonitorError;
use solalert::ingest::chat::ChatFeedSource;
use solalert::metrics::Metrics;
use solalert::notify::registry::SubscriberRegistry;
use solalert::notify::{ChatDeliveryTransport, FanoutAdapter};
use solalert::storage::mirror::{self, HttpMirror, MirrorTask, RemoteMirror};
use solalert::storage::AlertLog;
use solalert::types::AlertRecord;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "solalert")]
#[command(about = "Multi-source Solana token momentum monitor with tiered alerts")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full monitoring pipeline
    Run,
    /// Merge the emergency sidecar and reconcile against the mirror
    Recover,
    /// Print alert log statistics
    Stats,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(path = %cli.config, error = %e, "configuration error");
            std::process::exit(2);
        }
    };

    let code = match cli.command {
        Commands::Run => run_monitor(config).await,
        Commands::Recover => recover(config).await,
        Commands::Stats => stats(config),
    };
    std::process::exit(code);
}

async fn run_monitor(config: Config) -> i32 {
    if config.sources.is_empty() {
        tracing::error!("no sources configured");
        return 2;
    }

    let metrics = Metrics::new();
    let log = match AlertLog::open(config.storage.clone(), metrics.clone()) {
        Ok(log) => Arc::new(log),
        Err(e) => {
            tracing::error!(error = %e, "cannot open alert log");
            return 2;
        }
    };

    // Remote mirror: reconcile at startup, then commit from its own task.
    let mut mirror_tx: Option<mpsc::Sender<AlertRecord>> = None;
    let mut mirror_handle: Option<JoinHandle<()>> = None;
    if config.mirror.enabled {
        match HttpMirror::new(&config.mirror) {
            Ok(remote) => {
                let remote: Arc<dyn RemoteMirror> = Arc::new(remote);
                if let Err(e) = mirror::reconcile(&log, remote.as_ref()).await {
                    tracing::warn!(error = %e, "mirror reconcile failed, continuing");
                }
                let (tx, rx) = mpsc::channel(256);
                let task = MirrorTask::new(remote, config.mirror.clone(), metrics.clone());
                mirror_handle = Some(tokio::spawn(task.run(rx)));
                mirror_tx = Some(tx);
            }
            Err(e) => {
                tracing::error!(error = %e, "mirror configuration invalid");
                return 2;
            }
        }
    }

    // Fan-out adapter over the external subscriber registry.
    let registry = Arc::new(SubscriberRegistry::load(
        config.fanout.registry_path.clone(),
        config.fanout.groups_path.clone(),
    ));
    let transport = Arc::new(ChatDeliveryTransport::new(
        &config.ingest.api_base,
        config.ingest.token.as_deref().unwrap_or_default(),
    ));
    let (fanout_tx, fanout_rx) = mpsc::channel(config.fanout.buffer);
    let fanout = FanoutAdapter::new(
        registry.clone(),
        transport,
        config.fanout.clone(),
        metrics.clone(),
    );
    let fanout_handle = tokio::spawn(fanout.run(fanout_rx));

    // Correlator: the linearizer.
    let quotes: Arc<dyn QuoteService> = match DexScreenerClient::new(&config.enrich) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            tracing::error!(error = %e, "quote client configuration invalid");
            return 2;
        }
    };
    let (corr_tx, corr_rx) = mpsc::channel(config.ingest.parser_buffer);
    let correlator = Correlator::new(
        &config,
        log.clone(),
        quotes,
        fanout_tx,
        mirror_tx.clone(),
        metrics.clone(),
    );
    let mut corr_handle = tokio::spawn(correlator.run(corr_rx));

    // Periodic jobs: state eviction and dynamic-threshold recomputation
    // ride the correlator channel so state stays single-writer.
    let sweep_tx = corr_tx.clone();
    let sweep_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        interval.tick().await;
        loop {
            interval.tick().await;
            if sweep_tx.send(CorrelatorMsg::Sweep).await.is_err() {
                break;
            }
        }
    });

    // One ingest task and one parser task per source.
    let (auth_fail_tx, mut auth_fail_rx) = mpsc::channel::<String>(1);
    let mut source_handles = Vec::new();
    let mut parser_handles = Vec::new();
    for settings in &config.sources {
        let source = match ChatFeedSource::new(settings.clone(), &config.ingest) {
            Ok(source) => Arc::new(source),
            Err(e) => {
                tracing::error!(source = %settings.source_id, error = %e, "source configuration invalid");
                return 2;
            }
        };

        let (raw_tx, mut raw_rx) = mpsc::channel(config.ingest.buffer_per_source);
        let ingest_cfg = config.ingest.clone();
        let source_metrics = metrics.clone();
        let auth_tx = auth_fail_tx.clone();
        let source_id = settings.source_id.clone();
        source_handles.push(tokio::spawn(async move {
            match solalert::ingest::run_source(source, ingest_cfg, raw_tx, source_metrics).await {
                Err(MonitorError::Auth { source_id, message }) => {
                    tracing::error!(source = %source_id, reason = %message, "source authentication failed");
                    let _ = auth_tx.send(source_id).await;
                }
                Err(e) => tracing::error!(source = %source_id, error = %e, "source task failed"),
                Ok(()) => {}
            }
        }));

        let settings = settings.clone();
        let parser_cfg = config.parser.clone();
        let parser_metrics = metrics.clone();
        let events_tx = corr_tx.clone();
        parser_handles.push(tokio::spawn(async move {
            while let Some(msg) = raw_rx.recv().await {
                match solalert::parser::parse(&msg, &settings, &parser_cfg) {
                    Ok(events) => {
                        for event in events {
                            if events_tx.send(CorrelatorMsg::Event(event)).await.is_err() {
                                return;
                            }
                        }
                    }
                    Err(miss) => {
                        parser_metrics.record_parse_miss(&settings.source_id, miss.as_str());
                    }
                }
            }
        }));
    }
    drop(auth_fail_tx);

    // Read API.
    let api_state = ApiState {
        cache: Arc::new(LogCache::new(
            log.path().to_path_buf(),
            config.http.cache_ttl_secs,
        )),
        registry,
        metrics: metrics.clone(),
        log_path: log.path().to_path_buf(),
        emergency_path: log.emergency_path().to_path_buf(),
        backups_dir: log.backups_dir().to_path_buf(),
    };
    let api_handle = tokio::spawn(solalert::api::serve(api_state, config.http.listen_port));

    tracing::info!(
        sources = config.sources.len(),
        port = config.http.listen_port,
        "monitor running"
    );

    // Run until a shutdown signal, a fatal auth failure, or a fatal
    // durable-write failure from the correlator.
    let mut corr_done = false;
    let exit_code = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
            0
        }
        Some(source_id) = auth_fail_rx.recv() => {
            tracing::error!(source = %source_id, "unrecoverable ingest auth failure");
            3
        }
        result = &mut corr_handle => {
            corr_done = true;
            match result {
                Ok(Ok(())) => 0,
                Ok(Err(e)) => {
                    tracing::error!(error = %e, "correlator fatal");
                    1
                }
                Err(e) => {
                    tracing::error!(error = %e, "correlator task panicked");
                    1
                }
            }
        }
    };

    // Drain: stop ingest, let the correlator finish in-flight work, give
    // the mirror its cycle, all inside one overall budget.
    for handle in &source_handles {
        handle.abort();
    }
    for handle in &parser_handles {
        handle.abort();
    }
    sweep_handle.abort();
    drop(corr_tx);

    let budget = Duration::from_secs(5);
    if !corr_done && tokio::time::timeout(budget, &mut corr_handle).await.is_err() {
        tracing::warn!("drain budget exceeded, forcing correlator shutdown");
        corr_handle.abort();
    }
    if let Some(tx) = mirror_tx.take() {
        drop(tx);
    }
    if let Some(handle) = mirror_handle {
        if tokio::time::timeout(budget, handle).await.is_err() {
            tracing::warn!("mirror did not finish its cycle in time");
        }
    }
    api_handle.abort();
    let _ = tokio::time::timeout(budget, fanout_handle).await;

    tracing::info!(code = exit_code, "monitor stopped");
    exit_code
}

/// Startup recovery pass, standalone: sidecar merge happens in
/// `AlertLog::open`, then the mirror is reconciled.
async fn recover(config: Config) -> i32 {
    let metrics = Metrics::new();
    let log = match AlertLog::open(config.storage.clone(), metrics) {
        Ok(log) => log,
        Err(e) => {
            tracing::error!(error = %e, "cannot open alert log");
            return 2;
        }
    };

    if config.mirror.enabled {
        match HttpMirror::new(&config.mirror) {
            Ok(remote) => match mirror::reconcile(&log, &remote).await {
                Ok(pulled) => tracing::info!(pulled, "mirror reconcile complete"),
                Err(e) => tracing::warn!(error = %e, "mirror reconcile failed"),
            },
            Err(e) => {
                tracing::error!(error = %e, "mirror configuration invalid");
                return 2;
            }
        }
    }

    let doc = log.document().await;
    tracing::info!(records = doc.alerts.len(), "recovery pass complete");
    0
}

/// Read-only: no lock, no mutation.
fn stats(config: Config) -> i32 {
    let path = &config.storage.log_path;
    let doc: solalert::types::AlertLogDocument = match std::fs::read_to_string(path) {
        Ok(text) => match serde_json::from_str(&text) {
            Ok(doc) => doc,
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "log corrupt");
                return 1;
            }
        },
        Err(_) => {
            println!("no alert log at {}", path.display());
            return 0;
        }
    };

    let mut tiers = [0usize; 3];
    for record in &doc.alerts {
        tiers[(record.tier.number() - 1) as usize] += 1;
    }
    println!("alerts: {}", doc.alerts.len());
    println!("  tier 1: {}", tiers[0]);
    println!("  tier 2: {}", tiers[1]);
    println!("  tier 3: {}", tiers[2]);
    if let Some(last) = doc.alerts.iter().max_by_key(|r| r.timestamp) {
        println!("latest: {} {} ({})", last.id, last.token, last.timestamp);
    }
    0
}
