//! Flowcast Runtime - synthetic streams through the full pipeline
//!
//! Spawns a few random-walk producers (with occasional spikes), runs the
//! pipeline, and logs what comes out of the event channel.
//!
//! Usage:
//!   cargo run --release --bin flowcast_runtime
//!
//! Environment variables:
//!   FLOWCAST_*            - pipeline configuration, see `PipelineConfig::from_env`
//!   FLOWCAST_STORE_PATH   - SQLite file for the persistent tier (default: in-memory)
//!   FLOWCAST_STREAMS      - number of synthetic streams (default: 3)
//!   FLOWCAST_PRODUCER_INTERVAL_MS - delay between points per stream (default: 20)

use dotenv::dotenv;
use flowcast::clock::current_timestamp_ms;
use flowcast::memory::SqliteStore;
use flowcast::pipeline::{
    DataPoint, PipelineConfig, PipelineEvent, PipelineRuntime, RuntimeOptions,
};
use log::{debug, error, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::env;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep, Duration};

fn env_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Random walk around `base`; roughly one point in fifty is a spike.
async fn produce(
    runtime: Arc<PipelineRuntime>,
    stream_id: String,
    base: f64,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut rng = StdRng::from_entropy();
    let mut value = base;
    let mut rejected = 0u64;

    loop {
        tokio::select! {
            _ = sleep(every) => {}
            _ = shutdown.changed() => break,
        }

        value = (value + rng.gen_range(-1.0..1.0) * base * 0.01).max(base * 0.1);
        let observed = if rng.gen_bool(0.02) {
            value * rng.gen_range(3.0..6.0)
        } else {
            value
        };

        let point = DataPoint::new(current_timestamp_ms(), observed)
            .with_metadata("source", "synthetic");
        if !runtime.submit(&stream_id, point) {
            rejected += 1;
        }
    }

    info!("   └─ Producer {} stopped ({} rejected)", stream_id, rejected);
}

async fn consume(mut rx: mpsc::Receiver<PipelineEvent>) {
    while let Some(event) = rx.recv().await {
        match event {
            PipelineEvent::AnalysisCompleted(analysis) => {
                let next = analysis.forecast.first().map(|p| p.value);
                info!(
                    "📈 {} | window {} | {} patterns | {} anomalies | trend {:?} | next {:?}",
                    analysis.stream_id,
                    analysis.window_len,
                    analysis.patterns.len(),
                    analysis.anomalies.len(),
                    analysis.trend.map(|t| t.direction),
                    next
                );
                for anomaly in &analysis.anomalies {
                    warn!(
                        "🚨 {} anomaly at {}: value {:.2}, score {:.1} ({:?})",
                        analysis.stream_id,
                        anomaly.index,
                        anomaly.value,
                        anomaly.score,
                        anomaly.severity
                    );
                }
            }
            PipelineEvent::BatchDeadlineExceeded {
                batch_id,
                duration_ms,
                deadline_ms,
            } => {
                warn!("🐢 Batch {} over deadline: {}ms > {}ms", batch_id, duration_ms, deadline_ms);
            }
            PipelineEvent::MetricsUpdated(snapshot) => {
                debug!(
                    "📊 accepted={} processed={} invalid={} batches={} persisted={}",
                    snapshot.points_accepted,
                    snapshot.points_processed,
                    snapshot.points_invalid,
                    snapshot.batches_processed,
                    snapshot.entries_persisted
                );
            }
            PipelineEvent::DataProcessed { .. } => {}
            other => debug!("event: {}", other.name()),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("🚀 Flowcast Runtime");

    let config = PipelineConfig::from_env()?;
    let streams = env_usize("FLOWCAST_STREAMS", 3);
    let producer_interval =
        Duration::from_millis(env_usize("FLOWCAST_PRODUCER_INTERVAL_MS", 20) as u64);

    info!("   ├─ Batch size: {}", config.batch_size);
    info!("   ├─ Interval: {}ms", config.processing_interval_ms);
    info!("   ├─ Window capacity: {}", config.window_capacity);
    info!("   ├─ History window: {}", config.history_window);
    info!(
        "   ├─ Memory ceiling: {} MB (process resident)",
        config.memory_ceiling_bytes / 1024 / 1024
    );
    info!("   └─ Streams: {}", streams);

    let mut options = RuntimeOptions::default();
    if let Ok(path) = env::var("FLOWCAST_STORE_PATH") {
        let store = SqliteStore::open(&path, config.storage_max_size)?;
        info!("💾 Persistent tier: {}", path);
        options.storage = Some(Box::new(store));
    }

    let (mut runtime, rx) = PipelineRuntime::new(config, options)?;
    runtime.start();
    let runtime = Arc::new(runtime);

    let consumer = tokio::spawn(consume(rx));

    let (stop_tx, stop_rx) = watch::channel(false);
    let mut producers = Vec::with_capacity(streams);
    for i in 0..streams {
        let stream_id = format!("stream-{}", i + 1);
        let base = 100.0 * (i + 1) as f64;
        info!("   ├─ Starting producer {}", stream_id);
        producers.push(tokio::spawn(produce(
            runtime.clone(),
            stream_id,
            base,
            producer_interval,
            stop_rx.clone(),
        )));
    }

    info!("🔄 Press CTRL+C to shutdown gracefully");
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("⚠️  Received CTRL+C, shutting down..."),
        Err(err) => error!("❌ Failed to listen for CTRL+C: {}", err),
    }

    let _ = stop_tx.send(true);
    for producer in producers {
        if let Err(e) = producer.await {
            error!("❌ Producer task failed: {}", e);
        }
    }

    if streams >= 2 {
        match runtime.correlate("stream-1", "stream-2") {
            Ok(c) => info!(
                "🔗 stream-1 ~ stream-2: r={:.3} lag={} significance={:.3}",
                c.coefficient, c.lag, c.significance
            ),
            Err(e) => info!("🔗 No correlation: {}", e),
        }
    }

    let metrics = runtime.metrics().clone();
    match Arc::try_unwrap(runtime) {
        Ok(runtime) => runtime.shutdown().await,
        Err(_) => error!("❌ Runtime still shared, skipping graceful shutdown"),
    }
    consumer.abort();
    let final_metrics = metrics.snapshot();

    info!(
        "✅ Flowcast runtime stopped ({} points processed, {} batches)",
        final_metrics.points_processed, final_metrics.batches_processed
    );
    Ok(())
}
