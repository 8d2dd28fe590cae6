//! In-progress bidirectional flow state.

use super::{Direction, FlowKey};
use crate::collectors::PacketObservation;

/// Per-direction packet counters and sequences.
#[derive(Debug, Clone, Default)]
pub struct DirectionStats {
    pub packets: u64,
    pub lengths: Vec<f64>,
    /// One sample per packet after the first in this direction, never negative
    pub iat: Vec<f64>,
    iat_sum: f64,
}

impl DirectionStats {
    fn record(&mut self, timestamp: f64, length: f64, first_seen: f64) {
        self.packets += 1;
        self.lengths.push(length);
        if self.packets > 1 {
            // Previous arrival is reconstructed from the flow start plus the
            // samples already taken in this direction.
            let iat = (timestamp - (first_seen + self.iat_sum)).max(0.0);
            self.iat.push(iat);
            self.iat_sum += iat;
        }
    }
}

#[derive(Debug, Clone)]
pub struct FlowAccumulator {
    pub key: FlowKey,
    pub first_seen: f64,
    pub last_seen: f64,
    pub fwd: DirectionStats,
    pub bwd: DirectionStats,
    pub tcp_flags: Vec<String>,
}

impl FlowAccumulator {
    pub fn new(key: FlowKey, first_seen: f64) -> Self {
        Self {
            key,
            first_seen,
            last_seen: first_seen,
            fwd: DirectionStats::default(),
            bwd: DirectionStats::default(),
            tcp_flags: Vec::new(),
        }
    }

    /// Fold one packet into the flow.
    pub fn record(&mut self, obs: &PacketObservation, direction: Direction) {
        let stats = match direction {
            Direction::Forward => &mut self.fwd,
            Direction::Backward => &mut self.bwd,
        };
        stats.record(obs.timestamp, f64::from(obs.length), self.first_seen);
        if let Some(flags) = obs.flags.as_ref().filter(|f| !f.is_empty()) {
            self.tcp_flags.push(flags.clone());
        }
        self.last_seen = obs.timestamp;
    }

    pub fn duration(&self) -> f64 {
        (self.last_seen - self.first_seen).max(0.0)
    }

    pub fn total_packets(&self) -> u64 {
        self.fwd.packets + self.bwd.packets
    }

    /// Seconds of inactivity at `now`.
    pub fn idle_for(&self, now: f64) -> f64 {
        now - self.last_seen
    }
}
