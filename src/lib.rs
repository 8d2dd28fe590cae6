//! Aegis agent: bidirectional flow aggregation and anomaly scoring.
//!
//! Modular structure:
//! - [`collectors`]: Packet observations and packet sources (replay, synthetic)
//! - [`flow`]: Flow keys, accumulators, the flow table and the aggregator
//! - [`features`]: Per-flow statistical feature vectors
//! - [`model`]: Anomaly scoring of finished flows
//! - [`risk`]: Risk levels and descriptions
//! - [`storage`]: Encrypted local flow/anomaly store
//! - [`logging`]: Structured JSON logging and alert lines
//! - [`pipeline`]: Sources, sweeper and sink wired together

pub mod config;
pub mod error;
pub mod collectors;
pub mod flow;
pub mod features;
pub mod model;
pub mod risk;
pub mod storage;
pub mod logging;
pub mod pipeline;

pub use config::AgentConfig;
pub use error::{AegisError, Result};
pub use collectors::{PacketObservation, PacketSource, ReplaySource, SyntheticSource};
pub use flow::{Direction, FlowAggregator, FlowKey, FlowTable, Protocol};
pub use features::FlowFeatureVector;
pub use model::{FlowScorer, HeuristicScorer};
pub use risk::RiskEngine;
pub use storage::FlowStore;
pub use logging::StructuredLogger;
pub use pipeline::{FlowSink, Pipeline};
