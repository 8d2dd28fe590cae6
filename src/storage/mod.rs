//! Encrypted local storage for finished flows and anomaly alerts.

mod encrypted;

pub use encrypted::{AnomalyRecord, FlowStore, StoreStats};
