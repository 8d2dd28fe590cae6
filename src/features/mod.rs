//! Flow feature vectors: the fixed 16-value summary of a finished flow.

mod extract;
pub mod stats;

use crate::flow::{FlowKey, Protocol};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const FEATURE_DIM: usize = 16;

/// Names of [`FlowFeatureVector::to_vector`] entries, in order.
pub const FEATURE_NAMES: [&str; FEATURE_DIM] = [
    "flow_duration",
    "total_fwd_packets",
    "total_bwd_packets",
    "total_packets",
    "fwd_packet_length_mean",
    "fwd_packet_length_std",
    "bwd_packet_length_mean",
    "bwd_packet_length_std",
    "packet_length_mean",
    "packet_length_std",
    "fwd_iat_mean",
    "fwd_iat_std",
    "bwd_iat_mean",
    "bwd_iat_std",
    "iat_mean",
    "iat_std",
];

/// Immutable summary emitted exactly once when a flow is finalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowFeatureVector {
    pub key: FlowKey,
    /// Flow start (first-seen) time
    pub timestamp: f64,
    pub protocol: Protocol,

    pub flow_duration: f64,

    pub total_fwd_packets: u64,
    pub total_bwd_packets: u64,
    pub total_packets: u64,

    pub fwd_packet_length_mean: f64,
    pub fwd_packet_length_std: f64,
    pub bwd_packet_length_mean: f64,
    pub bwd_packet_length_std: f64,
    pub packet_length_mean: f64,
    pub packet_length_std: f64,

    pub fwd_iat_mean: f64,
    pub fwd_iat_std: f64,
    pub bwd_iat_mean: f64,
    pub bwd_iat_std: f64,
    pub iat_mean: f64,
    pub iat_std: f64,

    /// Observed TCP flag strings, context only
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tcp_flags: Vec<String>,
}

impl FlowFeatureVector {
    /// Numeric model input, ordered as [`FEATURE_NAMES`].
    pub fn to_vector(&self) -> [f64; FEATURE_DIM] {
        [
            self.flow_duration,
            self.total_fwd_packets as f64,
            self.total_bwd_packets as f64,
            self.total_packets as f64,
            self.fwd_packet_length_mean,
            self.fwd_packet_length_std,
            self.bwd_packet_length_mean,
            self.bwd_packet_length_std,
            self.packet_length_mean,
            self.packet_length_std,
            self.fwd_iat_mean,
            self.fwd_iat_std,
            self.bwd_iat_mean,
            self.bwd_iat_std,
            self.iat_mean,
            self.iat_std,
        ]
    }

    /// Look up a feature by name.
    pub fn get(&self, name: &str) -> Option<f64> {
        FEATURE_NAMES
            .iter()
            .position(|n| *n == name)
            .map(|idx| self.to_vector()[idx])
    }

    /// Stable identifier: hex SHA-256 of the flow key and start time.
    pub fn flow_id(&self) -> String {
        let mut h = Sha256::new();
        h.update(self.key.to_string().as_bytes());
        h.update(self.timestamp.to_bits().to_be_bytes());
        let digest = h.finalize();
        format!("{:x}", digest)[..32].to_string()
    }
}
