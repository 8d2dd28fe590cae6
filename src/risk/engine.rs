//! Combines the flow's anomaly score with configurable thresholds; produces risk level.

use crate::config::RiskConfig;
use crate::features::FlowFeatureVector;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn from_score(score: f32, config: &RiskConfig) -> Self {
        if score >= config.high_threshold {
            RiskLevel::High
        } else if score >= config.medium_threshold {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
        }
    }
}

/// Risk verdict for a single finished flow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskResult {
    pub flow_id: String,
    pub score: f32,
    pub level: RiskLevel,
    pub is_anomaly: bool,
    /// Flow start time, seconds
    pub ts: f64,
    pub description: String,
}

pub struct RiskEngine {
    config: RiskConfig,
}

impl RiskEngine {
    pub fn new(config: RiskConfig) -> Self {
        Self { config }
    }

    pub fn score(&self, features: &FlowFeatureVector, raw_score: f32) -> RiskResult {
        let level = RiskLevel::from_score(raw_score, &self.config);
        RiskResult {
            flow_id: features.flow_id(),
            score: raw_score,
            level,
            is_anomaly: raw_score >= self.config.anomaly_threshold,
            ts: features.timestamp,
            description: describe(features, raw_score, level),
        }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }
}

/// Human-readable summary of what looks off about a flow.
pub fn describe(f: &FlowFeatureVector, score: f32, level: RiskLevel) -> String {
    let mut traits = Vec::new();
    if f.total_packets > 100 {
        traits.push("high packet volume");
    }
    if f.flow_duration > 300.0 {
        traits.push("long duration");
    } else if f.flow_duration < 1.0 {
        traits.push("very short duration");
    }
    if f.packet_length_mean > 1400.0 {
        traits.push("large packet sizes");
    } else if f.packet_length_mean < 50.0 {
        traits.push("small packet sizes");
    }
    if f.packet_length_std > 500.0 {
        traits.push("erratic packet sizes");
    }

    if traits.is_empty() {
        format!(
            "{} threat: Anomalous {} traffic detected (score: {:.3})",
            level.as_str(),
            f.protocol,
            score
        )
    } else {
        format!(
            "{} threat: Anomalous {} traffic with {} (score: {:.3})",
            level.as_str(),
            f.protocol,
            traits.join(", "),
            score
        )
    }
}
