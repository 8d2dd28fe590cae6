//! Agent configuration, loaded from JSON. Every section falls back to defaults.

use crate::error::{AegisError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Data directory (flow store, alert log)
    pub data_dir: PathBuf,
    /// Flow aggregation timing
    pub flow: FlowConfig,
    /// Where packets come from
    pub source: SourceConfig,
    /// Risk scoring thresholds
    pub risk: RiskConfig,
    /// Local flow/anomaly store
    pub storage: StorageConfig,
    /// Logging
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowConfig {
    /// Seconds of inactivity after which a flow is finished
    pub flow_timeout_secs: f64,
    /// Seconds between opportunistic stale-flow sweeps
    pub sweep_interval_secs: f64,
    /// Finalize the longest-idle flow once this many are active (unbounded if unset)
    pub max_active_flows: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Replay,
    Synthetic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub kind: SourceKind,
    /// Newline-delimited JSON packet observations (replay)
    pub replay_path: Option<PathBuf>,
    pub synthetic: SyntheticConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticConfig {
    pub conversations: usize,
    /// Average packets per conversation
    pub packets_per_conversation: usize,
    /// Fraction of conversations shaped like attacks (0.0–1.0)
    pub anomaly_rate: f64,
    pub seed: u64,
    /// Pace emission on the wall clock and stamp packets with wall time
    pub realtime: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Score at or above this is high risk (0.0–1.0)
    pub high_threshold: f32,
    /// Score at or above this is medium risk
    pub medium_threshold: f32,
    /// Score at or above this marks the flow anomalous
    pub anomaly_threshold: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub enabled: bool,
    /// Environment variable holding the store secret
    pub secret_env: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub json: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            flow: FlowConfig::default(),
            source: SourceConfig::default(),
            risk: RiskConfig::default(),
            storage: StorageConfig::default(),
            log: LogConfig::default(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("aegis"))
        .unwrap_or_else(|| PathBuf::from(".aegis"))
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            flow_timeout_secs: 120.0,
            sweep_interval_secs: 60.0,
            max_active_flows: None,
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::Synthetic,
            replay_path: None,
            synthetic: SyntheticConfig::default(),
        }
    }
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            conversations: 50,
            packets_per_conversation: 20,
            anomaly_rate: 0.15,
            seed: 42,
            realtime: false,
        }
    }
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            high_threshold: 0.8,
            medium_threshold: 0.6,
            anomaly_threshold: 0.6,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            secret_env: "AEGIS_STORE_SECRET".to_string(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: true,
        }
    }
}

impl FlowConfig {
    /// Timeout with the sweep interval at half of it.
    pub fn with_timeout(flow_timeout_secs: f64) -> Self {
        Self {
            flow_timeout_secs,
            sweep_interval_secs: flow_timeout_secs / 2.0,
            max_active_flows: None,
        }
    }
}

impl AgentConfig {
    /// Load from JSON file if present; otherwise return default
    pub fn load(path: &Path) -> Self {
        Self::try_load(path).unwrap_or_default()
    }

    /// Load and validate. A missing file yields defaults; a present but
    /// unreadable or invalid file is an error.
    pub fn try_load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path)?;
        let config: AgentConfig = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let flow = &self.flow;
        if !(flow.flow_timeout_secs > 0.0) {
            return Err(AegisError::Config(format!(
                "flow_timeout_secs must be positive, got {}",
                flow.flow_timeout_secs
            )));
        }
        if !(flow.sweep_interval_secs > 0.0) {
            return Err(AegisError::Config(format!(
                "sweep_interval_secs must be positive, got {}",
                flow.sweep_interval_secs
            )));
        }
        if flow.max_active_flows == Some(0) {
            return Err(AegisError::Config("max_active_flows must be at least 1".into()));
        }
        let risk = &self.risk;
        for (name, v) in [
            ("high_threshold", risk.high_threshold),
            ("medium_threshold", risk.medium_threshold),
            ("anomaly_threshold", risk.anomaly_threshold),
        ] {
            if !(0.0..=1.0).contains(&v) {
                return Err(AegisError::Config(format!("{} must be within [0, 1], got {}", name, v)));
            }
        }
        if risk.medium_threshold > risk.high_threshold {
            return Err(AegisError::Config(
                "medium_threshold must not exceed high_threshold".into(),
            ));
        }
        if self.source.kind == SourceKind::Replay && self.source.replay_path.is_none() {
            return Err(AegisError::Config("replay source needs replay_path".into()));
        }
        Ok(())
    }

    /// Store secret from the configured environment variable, if set.
    pub fn store_secret(&self) -> Option<Vec<u8>> {
        std::env::var(&self.storage.secret_env)
            .ok()
            .filter(|s| !s.is_empty())
            .map(String::into_bytes)
    }
}
