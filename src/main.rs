//! Aegis agent entrypoint: replays or synthesizes packets, aggregates them into
//! flows, scores finished flows and stores/alerts on anomalies. Ctrl+C stops the
//! sources and drains every open flow before exit.

use aegis_agent::{
    collectors::{PacketSource, ReplaySource, SyntheticSource},
    config::{AgentConfig, SourceKind},
    flow::FlowAggregator,
    logging::StructuredLogger,
    model::HeuristicScorer,
    pipeline::{FlowSink, Pipeline},
    risk::RiskEngine,
    storage::FlowStore,
};
use clap::Parser;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "aegis-agent")]
#[command(version)]
#[command(about = "Bidirectional flow aggregation and anomaly scoring agent")]
struct Args {
    /// JSON configuration file (missing file means defaults)
    #[arg(long, env = "AEGIS_CONFIG_PATH", default_value = "config.json")]
    config: PathBuf,

    /// Replay newline-delimited JSON packet observations from FILE
    #[arg(long, value_name = "FILE", conflicts_with = "synthetic")]
    replay: Option<PathBuf>,

    /// Generate synthetic traffic
    #[arg(long, action = clap::ArgAction::SetTrue)]
    synthetic: bool,

    /// Seconds of inactivity before a flow is finished
    #[arg(long)]
    flow_timeout: Option<f64>,

    /// Seconds between stale-flow sweeps
    #[arg(long)]
    sweep_interval: Option<f64>,

    /// Do not persist flows
    #[arg(long, action = clap::ArgAction::SetTrue)]
    no_store: bool,

    /// Append alert lines to FILE instead of stdout
    #[arg(long, value_name = "FILE")]
    alerts: Option<PathBuf>,
}

impl Args {
    fn apply(&self, config: &mut AgentConfig) {
        if let Some(path) = &self.replay {
            config.source.kind = SourceKind::Replay;
            config.source.replay_path = Some(path.clone());
        }
        if self.synthetic {
            config.source.kind = SourceKind::Synthetic;
        }
        if let Some(t) = self.flow_timeout {
            config.flow.flow_timeout_secs = t;
            if self.sweep_interval.is_none() {
                config.flow.sweep_interval_secs = t / 2.0;
            }
        }
        if let Some(s) = self.sweep_interval {
            config.flow.sweep_interval_secs = s;
        }
        if self.no_store {
            config.storage.enabled = false;
        }
    }
}

fn open_source(config: &AgentConfig) -> Result<Box<dyn PacketSource>, aegis_agent::AegisError> {
    match config.source.kind {
        SourceKind::Replay => {
            let path = config.source.replay_path.as_deref().ok_or_else(|| {
                aegis_agent::AegisError::Config("replay source needs replay_path".into())
            })?;
            Ok(Box::new(ReplaySource::open(path)?))
        }
        SourceKind::Synthetic => {
            let source = SyntheticSource::new(&config.source.synthetic);
            info!(
                packets = source.remaining(),
                anomalous = source.anomalous_conversations(),
                "synthetic traffic generated"
            );
            Ok(Box::new(source))
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();
    let mut config = AgentConfig::try_load(&args.config)?;
    args.apply(&mut config);
    config.validate()?;

    StructuredLogger::init(config.log.json, &config.log.level);

    info!(
        data_dir = ?config.data_dir,
        flow_timeout_secs = config.flow.flow_timeout_secs,
        sweep_interval_secs = config.flow.sweep_interval_secs,
        "aegis agent starting"
    );

    let store = if config.storage.enabled {
        std::fs::create_dir_all(&config.data_dir)?;
        let secret = config.store_secret().unwrap_or_else(|| {
            warn!(env = %config.storage.secret_env, "store secret not set; using local placeholder");
            b"aegis-local-placeholder".to_vec()
        });
        Some(Arc::new(FlowStore::open(&config.data_dir.join("flows.db"), &secret)?))
    } else {
        None
    };

    let alerts: Box<dyn Write + Send> = match &args.alerts {
        Some(path) => Box::new(OpenOptions::new().create(true).append(true).open(path)?),
        None => Box::new(std::io::stdout()),
    };

    let source = open_source(&config)?;
    let sink = FlowSink::new(
        Arc::new(HeuristicScorer::default()),
        RiskEngine::new(config.risk.clone()),
        store.clone(),
        alerts,
    );
    let pipeline = Pipeline::new(Arc::new(FlowAggregator::new(config.flow.clone())));

    let stop = pipeline.stop_handle();
    if let Err(e) = ctrlc::set_handler(move || stop.store(true, Ordering::Relaxed)) {
        warn!(error = %e, "could not install Ctrl+C handler");
    }

    let report = pipeline.run(vec![source], sink)?;
    info!(
        packets = report.packets,
        flows = report.flows,
        anomalies = report.anomalies,
        store_errors = report.store_errors,
        flows_created = report.aggregator.flows_created,
        "aegis agent stopping"
    );

    if let Some(store) = store {
        let stats = store.statistics()?;
        info!(
            stored_flows = stats.total_flows,
            stored_packets = stats.total_packets,
            stored_anomalies = stats.total_anomalies,
            "store totals"
        );
    }

    Ok(())
}
