//! Rule-based scorer used when no trained model is wired in.

use super::FlowScorer;
use crate::features::FlowFeatureVector;

pub struct HeuristicScorer {
    /// Packets above this count as high volume
    pub volume_packets: u64,
    /// Shorter than this (seconds) is suspicious
    pub short_duration: f64,
    /// Longer than this (seconds) is suspicious
    pub long_duration: f64,
    pub small_packet: f64,
    pub large_packet: f64,
    /// Packet-length stddev above this counts as erratic
    pub erratic_std: f64,
}

impl Default for HeuristicScorer {
    fn default() -> Self {
        Self {
            volume_packets: 100,
            short_duration: 1.0,
            long_duration: 300.0,
            small_packet: 50.0,
            large_packet: 1400.0,
            erratic_std: 500.0,
        }
    }
}

impl FlowScorer for HeuristicScorer {
    fn score(&self, f: &FlowFeatureVector) -> f32 {
        let mut score = 0.0f32;
        if f.total_packets > self.volume_packets {
            score += 0.3;
        }
        if f.flow_duration < self.short_duration || f.flow_duration > self.long_duration {
            score += 0.2;
        }
        if f.packet_length_mean > self.large_packet || f.packet_length_mean < self.small_packet {
            score += 0.2;
        }
        if f.packet_length_std > self.erratic_std {
            score += 0.15;
        }
        score.min(1.0)
    }
}
