//! Anomaly scoring of finished flows.

mod heuristic;

pub use heuristic::HeuristicScorer;

use crate::features::FlowFeatureVector;

/// Scoring collaborator: one feature vector in, anomaly score in [0, 1] out.
pub trait FlowScorer: Send + Sync {
    fn score(&self, features: &FlowFeatureVector) -> f32;
}

impl<F> FlowScorer for F
where
    F: Fn(&FlowFeatureVector) -> f32 + Send + Sync,
{
    fn score(&self, features: &FlowFeatureVector) -> f32 {
        self(features).clamp(0.0, 1.0)
    }
}
