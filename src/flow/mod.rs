//! Bidirectional flow aggregation: packets in, finished-flow feature vectors out.

mod accumulator;
mod aggregator;
mod key;
mod table;

pub use accumulator::{DirectionStats, FlowAccumulator};
pub use aggregator::{AggregatorStats, FlowAggregator};
pub use key::{FlowKey, Protocol};
pub use table::{FlowTable, Recorded};

use serde::{Deserialize, Serialize};

/// Packet direction relative to the first packet of its conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Forward,
    Backward,
}
