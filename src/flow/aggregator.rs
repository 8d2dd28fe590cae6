//! Flow aggregator: ingestion, timeout policy and finalization behind one lock.
//!
//! Every operation holds the table lock from lookup to removal, so a flow can
//! never be finalized while another packet of the same conversation is being
//! folded into it. Timestamps are packet-clock seconds throughout.

use super::{FlowAccumulator, FlowTable, Recorded};
use crate::collectors::PacketObservation;
use crate::config::FlowConfig;
use crate::features::FlowFeatureVector;
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatorStats {
    pub active_flows: usize,
    pub flows_created: u64,
    pub flows_completed: u64,
    pub flows_evicted: u64,
    pub packets_ingested: u64,
}

#[derive(Debug, Default)]
struct State {
    table: FlowTable,
    last_sweep: Option<f64>,
    watermark: f64,
    completed: u64,
    evicted: u64,
    packets: u64,
}

impl State {
    fn finalize(&mut self, acc: FlowAccumulator) -> FlowFeatureVector {
        self.completed += 1;
        FlowFeatureVector::from(acc)
    }

    fn sweep(&mut self, now: f64, timeout: f64) -> Vec<FlowFeatureVector> {
        let stale = self.table.all_keys_matching(|acc| acc.idle_for(now) >= timeout);
        let mut out = Vec::with_capacity(stale.len());
        for key in stale {
            if let Some(acc) = self.table.remove(&key) {
                out.push(self.finalize(acc));
            }
        }
        self.last_sweep = Some(now);
        if !out.is_empty() {
            debug!(count = out.len(), now, active = self.table.len(), "swept stale flows");
        }
        out
    }
}

pub struct FlowAggregator {
    config: FlowConfig,
    state: Mutex<State>,
}

impl FlowAggregator {
    pub fn new(config: FlowConfig) -> Self {
        Self {
            config,
            state: Mutex::new(State::default()),
        }
    }

    pub fn config(&self) -> &FlowConfig {
        &self.config
    }

    // A panic elsewhere cannot leave the table half-updated in a way that
    // breaks lookups, so a poisoned lock is taken over rather than propagated.
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fold one packet into its conversation. Returns every flow finalized as
    /// a consequence: the packet's own flow on timeout, flows evicted by the
    /// active-flow cap, and anything an opportunistic sweep found stale.
    pub fn ingest(&self, obs: &PacketObservation) -> Vec<FlowFeatureVector> {
        let timeout = self.config.flow_timeout_secs;
        let mut guard = self.lock();
        let state = &mut *guard;
        state.packets += 1;
        if obs.timestamp > state.watermark {
            state.watermark = obs.timestamp;
        }

        // Inactivity is measured against the previous packet, before this one
        // moves last_seen forward.
        let Recorded { key, idle, .. } = state.table.record(obs);

        if idle >= timeout {
            let mut out = Vec::with_capacity(1);
            if let Some(acc) = state.table.remove(&key) {
                debug!(flow = %key, idle, packets = acc.total_packets(), "flow timed out");
                out.push(state.finalize(acc));
            }
            return out;
        }

        let mut out = Vec::new();
        if let Some(cap) = self.config.max_active_flows {
            while state.table.len() > cap {
                let Some(oldest) = state.table.oldest_key() else {
                    break;
                };
                if let Some(acc) = state.table.remove(&oldest) {
                    debug!(flow = %oldest, cap, "evicting oldest flow");
                    state.evicted += 1;
                    out.push(state.finalize(acc));
                }
            }
        }

        let last_sweep = *state.last_sweep.get_or_insert(obs.timestamp);
        if obs.timestamp - last_sweep >= self.config.sweep_interval_secs {
            out.extend(state.sweep(obs.timestamp, timeout));
        }
        out
    }

    /// Finalize every flow idle for at least the timeout at `now`.
    pub fn sweep(&self, now: f64) -> Vec<FlowFeatureVector> {
        self.lock().sweep(now, self.config.flow_timeout_secs)
    }

    /// Finalize all flows regardless of age, oldest first. Leaves the table empty.
    pub fn drain(&self) -> Vec<FlowFeatureVector> {
        let mut state = self.lock();
        let mut flows = state.table.drain();
        flows.sort_by(|a, b| a.first_seen.total_cmp(&b.first_seen));
        let out: Vec<FlowFeatureVector> = flows.into_iter().map(|acc| state.finalize(acc)).collect();
        info!(count = out.len(), "drained active flows");
        out
    }

    pub fn active_flows(&self) -> usize {
        self.lock().table.len()
    }

    /// Largest packet timestamp ingested so far.
    pub fn watermark(&self) -> f64 {
        self.lock().watermark
    }

    pub fn stats(&self) -> AggregatorStats {
        let state = self.lock();
        AggregatorStats {
            active_flows: state.table.len(),
            flows_created: state.table.created(),
            flows_completed: state.completed,
            flows_evicted: state.evicted,
            packets_ingested: state.packets,
        }
    }
}
