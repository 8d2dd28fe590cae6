//! Finished accumulator -> feature vector.

use super::stats::{combined, mean, stddev};
use super::FlowFeatureVector;
use crate::flow::FlowAccumulator;

impl FlowFeatureVector {
    /// Derive every field from scratch; the accumulator is not modified.
    pub fn from_accumulator(acc: &FlowAccumulator) -> Self {
        let (packet_length_mean, packet_length_std) = combined(&acc.fwd.lengths, &acc.bwd.lengths);
        let (iat_mean, iat_std) = combined(&acc.fwd.iat, &acc.bwd.iat);

        Self {
            key: acc.key,
            timestamp: acc.first_seen,
            protocol: acc.key.protocol,
            flow_duration: acc.duration(),
            total_fwd_packets: acc.fwd.packets,
            total_bwd_packets: acc.bwd.packets,
            total_packets: acc.total_packets(),
            fwd_packet_length_mean: mean(&acc.fwd.lengths),
            fwd_packet_length_std: stddev(&acc.fwd.lengths),
            bwd_packet_length_mean: mean(&acc.bwd.lengths),
            bwd_packet_length_std: stddev(&acc.bwd.lengths),
            packet_length_mean,
            packet_length_std,
            fwd_iat_mean: mean(&acc.fwd.iat),
            fwd_iat_std: stddev(&acc.fwd.iat),
            bwd_iat_mean: mean(&acc.bwd.iat),
            bwd_iat_std: stddev(&acc.bwd.iat),
            iat_mean,
            iat_std,
            tcp_flags: acc.tcp_flags.clone(),
        }
    }
}

impl From<FlowAccumulator> for FlowFeatureVector {
    fn from(mut acc: FlowAccumulator) -> Self {
        let flags = std::mem::take(&mut acc.tcp_flags);
        let mut v = Self::from_accumulator(&acc);
        v.tcp_flags = flags;
        v
    }
}
