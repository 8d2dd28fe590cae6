//! JSON log lines: one JSON object per line (ndjson) for ingestion and audit.

use crate::features::FlowFeatureVector;
use crate::risk::RiskResult;
use chrono::{TimeZone, Utc};
use serde::Serialize;
use std::io::Write;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// One alert line for an anomalous flow.
#[derive(Debug, Serialize)]
pub struct AlertLine<'a> {
    pub ts: String,
    pub flow_id: &'a str,
    pub src: String,
    pub dst: String,
    pub protocol: &'a str,
    pub risk_score: f32,
    pub risk_level: &'a str,
    pub total_packets: u64,
    pub flow_duration: f64,
    pub description: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alert_id: Option<&'a str>,
}

impl<'a> AlertLine<'a> {
    pub fn new(flow: &'a FlowFeatureVector, risk: &'a RiskResult, alert_id: Option<&'a str>) -> Self {
        Self {
            ts: ts_iso(flow.timestamp),
            flow_id: &risk.flow_id,
            src: format!("{}:{}", flow.key.src_addr, flow.key.src_port),
            dst: format!("{}:{}", flow.key.dst_addr, flow.key.dst_port),
            protocol: flow.protocol.as_str(),
            risk_score: risk.score,
            risk_level: risk.level.as_str(),
            total_packets: flow.total_packets,
            flow_duration: flow.flow_duration,
            description: &risk.description,
            alert_id,
        }
    }
}

/// Seconds since the epoch as RFC 3339; out-of-range values fall back to now.
pub fn ts_iso(secs: f64) -> String {
    let ms = (secs * 1000.0).round() as i64;
    Utc.timestamp_millis_opt(ms)
        .single()
        .unwrap_or_else(Utc::now)
        .to_rfc3339()
}

/// Initialize tracing with JSON format (one JSON object per line)
pub struct StructuredLogger;

impl StructuredLogger {
    /// Install global subscriber: stderr, level from RUST_LOG or default.
    /// Safe to call more than once; later calls are ignored.
    pub fn init(json: bool, default_level: &str) {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
        let installed = if json {
            let fmt = tracing_subscriber::fmt::layer()
                .json()
                .with_span_events(FmtSpan::NONE)
                .with_writer(std::io::stderr);
            tracing_subscriber::registry().with(filter).with(fmt).try_init()
        } else {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .try_init()
        };
        if installed.is_err() {
            tracing::debug!("tracing subscriber already installed");
        }
    }

    /// Emit a single structured line (e.g. an alert) without going through tracing
    pub fn emit_json(event: &impl Serialize, w: &mut impl Write) {
        if let Ok(line) = serde_json::to_string(event) {
            let _ = writeln!(w, "{}", line);
        }
    }
}
