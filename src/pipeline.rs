//! Runtime wiring: packet sources -> aggregator -> scoring, storage and alerts.
//!
//! Sources run on blocking workers and call `ingest` directly; every vector the
//! aggregator hands back is forwarded over one channel to a single sink worker.
//! On shutdown the table is drained once and the channel closed.

use crate::collectors::PacketSource;
use crate::error::{AegisError, Result};
use crate::features::FlowFeatureVector;
use crate::flow::{AggregatorStats, FlowAggregator};
use crate::logging::{AlertLine, StructuredLogger};
use crate::model::FlowScorer;
use crate::risk::{RiskEngine, RiskResult};
use crate::storage::FlowStore;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Scores, persists and alerts on finished flows, one at a time. A failing
/// store never suppresses an alert.
pub struct FlowSink {
    scorer: Arc<dyn FlowScorer>,
    risk: RiskEngine,
    store: Option<Arc<FlowStore>>,
    alerts: Box<dyn Write + Send>,
    flows: u64,
    anomalies: u64,
    store_errors: u64,
}

impl FlowSink {
    pub fn new(
        scorer: Arc<dyn FlowScorer>,
        risk: RiskEngine,
        store: Option<Arc<FlowStore>>,
        alerts: Box<dyn Write + Send>,
    ) -> Self {
        Self {
            scorer,
            risk,
            store,
            alerts,
            flows: 0,
            anomalies: 0,
            store_errors: 0,
        }
    }

    pub fn handle(&mut self, flow: FlowFeatureVector) -> RiskResult {
        let score = self.scorer.score(&flow);
        let result = self.risk.score(&flow, score);
        self.flows += 1;
        if let Some(store) = &self.store {
            if let Err(e) = store.insert_flow(&flow, Some(&result)) {
                self.store_errors += 1;
                warn!(flow = %flow.key, error = %e, "failed to persist flow");
            }
        }

        if !result.is_anomaly {
            debug!(flow = %flow.key, score, packets = flow.total_packets, "flow finished");
            return result;
        }

        self.anomalies += 1;
        let alert_id = match self.store.as_ref().map(|store| store.insert_anomaly(&result)) {
            Some(Ok(id)) => Some(id),
            Some(Err(e)) => {
                self.store_errors += 1;
                warn!(flow = %flow.key, error = %e, "failed to persist alert");
                None
            }
            None => None,
        };
        StructuredLogger::emit_json(&AlertLine::new(&flow, &result, alert_id.as_deref()), &mut self.alerts);
        warn!(
            flow = %flow.key,
            score = result.score,
            level = ?result.level,
            "anomalous flow"
        );
        result
    }

    pub fn flows(&self) -> u64 {
        self.flows
    }

    pub fn anomalies(&self) -> u64 {
        self.anomalies
    }

    /// Store writes that failed so far.
    pub fn store_errors(&self) -> u64 {
        self.store_errors
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PipelineReport {
    pub packets: u64,
    pub flows: u64,
    pub anomalies: u64,
    pub store_errors: u64,
    pub aggregator: AggregatorStats,
}

pub struct Pipeline {
    aggregator: Arc<FlowAggregator>,
    stop: Arc<AtomicBool>,
}

fn wall_clock_secs() -> f64 {
    Utc::now().timestamp_millis() as f64 / 1e3
}

fn join_error(e: tokio::task::JoinError) -> AegisError {
    AegisError::Runtime(e.to_string())
}

impl Pipeline {
    pub fn new(aggregator: Arc<FlowAggregator>) -> Self {
        Self {
            aggregator,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn aggregator(&self) -> &Arc<FlowAggregator> {
        &self.aggregator
    }

    /// Setting the flag makes every source worker stop at its next packet.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Run all sources to completion (or until stopped), then drain.
    pub fn run(&self, sources: Vec<Box<dyn PacketSource>>, sink: FlowSink) -> Result<PipelineReport> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_time()
            .thread_name("aegis-worker")
            .build()?;
        runtime.block_on(self.run_async(sources, sink))
    }

    async fn run_async(&self, sources: Vec<Box<dyn PacketSource>>, sink: FlowSink) -> Result<PipelineReport> {
        let (tx, mut rx) = mpsc::unbounded_channel::<FlowFeatureVector>();
        // Wall-clock sweeps only agree with packet time when every source is live.
        let live = !sources.is_empty() && sources.iter().all(|s| s.is_live());
        if !live && sources.iter().any(|s| s.is_live()) {
            warn!("mixed live and replayed sources; wall-clock sweeping disabled");
        }

        let mut workers = Vec::with_capacity(sources.len());
        for source in sources {
            let aggregator = Arc::clone(&self.aggregator);
            let stop = Arc::clone(&self.stop);
            let tx = tx.clone();
            workers.push(tokio::task::spawn_blocking(move || {
                let name = source.name().to_string();
                info!(source = %name, live = source.is_live(), "source started");
                let mut packets = 0u64;
                for obs in source {
                    if stop.load(Ordering::Relaxed) {
                        break;
                    }
                    packets += 1;
                    for flow in aggregator.ingest(&obs) {
                        if tx.send(flow).is_err() {
                            warn!(source = %name, "sink closed, stopping source");
                            return packets;
                        }
                    }
                }
                info!(source = %name, packets, "source finished");
                packets
            }));
        }

        // Live traffic can go quiet, so sweep idle flows on the wall clock too.
        let sweeper = live.then(|| {
            let aggregator = Arc::clone(&self.aggregator);
            let tx = tx.clone();
            // interval() panics on a zero period
            let period = Duration::from_secs_f64(aggregator.config().sweep_interval_secs.clamp(0.001, 86_400.0));
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(period);
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    for flow in aggregator.sweep(wall_clock_secs()) {
                        if tx.send(flow).is_err() {
                            return;
                        }
                    }
                }
            })
        });

        let sink_worker = tokio::task::spawn_blocking(move || {
            let mut sink = sink;
            while let Some(flow) = rx.blocking_recv() {
                sink.handle(flow);
            }
            sink
        });

        let mut packets = 0u64;
        let mut failed = None;
        for worker in workers {
            match worker.await {
                Ok(n) => packets += n,
                Err(e) => {
                    warn!(error = %e, "source worker failed");
                    failed.get_or_insert(e);
                }
            }
        }
        if let Some(sweeper) = sweeper {
            sweeper.abort();
        }

        // Open flows are finalized even when a source worker died.
        for flow in self.aggregator.drain() {
            if tx.send(flow).is_err() {
                break;
            }
        }
        drop(tx);

        let sink = sink_worker.await.map_err(join_error)?;
        if let Some(e) = failed {
            return Err(join_error(e));
        }
        let report = PipelineReport {
            packets,
            flows: sink.flows(),
            anomalies: sink.anomalies(),
            store_errors: sink.store_errors(),
            aggregator: self.aggregator.stats(),
        };
        info!(
            packets = report.packets,
            flows = report.flows,
            anomalies = report.anomalies,
            "pipeline finished"
        );
        Ok(report)
    }
}
