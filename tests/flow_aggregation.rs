//! Flow aggregation: direction handling, timeout policy, sweeps, drain and
//! concurrent ingestion.

use aegis_agent::config::FlowConfig;
use aegis_agent::flow::{Direction, FlowAggregator, FlowTable, Protocol};
use aegis_agent::PacketObservation;

fn packet(ts: f64, src: &str, dst: &str, sp: u16, dp: u16, len: u32) -> PacketObservation {
    PacketObservation {
        timestamp: ts,
        src_addr: src.parse().unwrap(),
        dst_addr: dst.parse().unwrap(),
        src_port: sp,
        dst_port: dp,
        protocol: Protocol::Tcp,
        length: len,
        flags: None,
        payload_len: 0,
    }
}

fn fwd(ts: f64, len: u32) -> PacketObservation {
    packet(ts, "10.0.0.1", "10.0.0.2", 10, 20, len)
}

fn bwd(ts: f64, len: u32) -> PacketObservation {
    packet(ts, "10.0.0.2", "10.0.0.1", 20, 10, len)
}

fn aggregator(timeout: f64, sweep: f64) -> FlowAggregator {
    FlowAggregator::new(FlowConfig {
        flow_timeout_secs: timeout,
        sweep_interval_secs: sweep,
        max_active_flows: None,
    })
}

#[test]
fn reply_packets_join_the_same_flow() {
    let agg = aggregator(60.0, 30.0);
    assert!(agg.ingest(&fwd(0.0, 100)).is_empty());
    assert!(agg.ingest(&bwd(0.5, 200)).is_empty());
    assert_eq!(agg.active_flows(), 1);
    assert_eq!(agg.stats().flows_created, 1);
}

#[test]
fn end_to_end_drain() {
    let agg = FlowAggregator::new(FlowConfig::with_timeout(60.0));
    assert!(agg.ingest(&fwd(0.0, 100)).is_empty());
    assert!(agg.ingest(&bwd(0.5, 200)).is_empty());
    assert!(agg.ingest(&fwd(1.0, 150)).is_empty());

    let flows = agg.drain();
    assert_eq!(flows.len(), 1);
    let f = &flows[0];
    assert_eq!(f.total_fwd_packets, 2);
    assert_eq!(f.total_bwd_packets, 1);
    assert_eq!(f.total_packets, 3);
    assert_eq!(f.packet_length_mean, 150.0);
    assert!((f.packet_length_std - 50.0).abs() < 1e-9);
    assert_eq!(f.fwd_packet_length_mean, 125.0);
    assert_eq!(f.bwd_packet_length_mean, 200.0);
    assert_eq!(f.bwd_packet_length_std, 0.0);
    assert_eq!(f.flow_duration, 1.0);
    assert_eq!(f.fwd_iat_mean, 1.0);
    // a single backward packet has no inter-arrival sample
    assert_eq!(f.bwd_iat_mean, 0.0);
    assert_eq!(f.timestamp, 0.0);
    assert_eq!(f.key.src_port, 10);
    assert_eq!(agg.active_flows(), 0);
}

#[test]
fn late_packet_finalizes_flow_including_itself() {
    let agg = FlowAggregator::new(FlowConfig::with_timeout(60.0));
    agg.ingest(&fwd(0.0, 100));
    agg.ingest(&bwd(0.5, 200));
    agg.ingest(&fwd(1.0, 150));

    let out = agg.ingest(&fwd(65.0, 50));
    assert_eq!(out.len(), 1);
    let f = &out[0];
    assert_eq!(f.total_fwd_packets, 3);
    assert_eq!(f.total_bwd_packets, 1);
    assert_eq!(f.total_packets, 4);
    assert_eq!(f.flow_duration, 65.0);
    assert_eq!(f.fwd_iat_mean, 32.5);
    assert_eq!(f.packet_length_mean, 125.0);

    // the late packet does not reopen the conversation
    assert_eq!(agg.active_flows(), 0);
    assert!(agg.drain().is_empty());
    let stats = agg.stats();
    assert_eq!(stats.flows_created, 1);
    assert_eq!(stats.flows_completed, 1);
    assert_eq!(stats.packets_ingested, 4);
}

#[test]
fn timeout_boundary_is_inclusive() {
    let agg = aggregator(10.0, 1000.0);
    agg.ingest(&fwd(0.0, 60));
    assert!(agg.ingest(&fwd(9.5, 60)).is_empty());
    assert_eq!(agg.ingest(&bwd(19.5, 60)).len(), 1);
}

#[test]
fn out_of_order_timestamps_never_yield_negative_iat() {
    let agg = aggregator(60.0, 1000.0);
    agg.ingest(&fwd(10.0, 100));
    agg.ingest(&fwd(5.0, 100));
    agg.ingest(&fwd(7.0, 100));
    agg.ingest(&bwd(3.0, 100));
    agg.ingest(&bwd(2.0, 100));

    let f = &agg.drain()[0];
    assert_eq!(f.total_packets, 5);
    for v in f.to_vector() {
        assert!(v >= 0.0, "negative feature {}", v);
    }
    assert_eq!(f.fwd_iat_mean, 0.0);
    assert_eq!(f.bwd_iat_mean, 0.0);
}

#[test]
fn iat_follows_running_sum_reconstruction() {
    let agg = aggregator(60.0, 1000.0);
    for ts in [0.0, 1.0, 3.0, 6.0] {
        agg.ingest(&fwd(ts, 100));
    }
    let f = &agg.drain()[0];
    // gaps 1, 2, 3
    assert_eq!(f.fwd_iat_mean, 2.0);
    assert!((f.fwd_iat_std - 1.0).abs() < 1e-12);
    assert_eq!(f.iat_mean, 2.0);
}

#[test]
fn single_packet_flow_has_zero_spread() {
    let agg = aggregator(60.0, 1000.0);
    agg.ingest(&fwd(4.0, 300));
    let f = &agg.drain()[0];
    assert_eq!(f.total_packets, 1);
    assert_eq!(f.flow_duration, 0.0);
    assert_eq!(f.packet_length_mean, 300.0);
    assert_eq!(f.packet_length_std, 0.0);
    assert_eq!(f.iat_mean, 0.0);
    assert_eq!(f.iat_std, 0.0);
    assert_eq!(f.bwd_packet_length_mean, 0.0);
}

#[test]
fn sweep_returns_every_stale_flow() {
    let agg = aggregator(10.0, 1000.0);
    agg.ingest(&packet(0.0, "10.0.0.1", "10.0.0.2", 1, 80, 60));
    agg.ingest(&packet(5.0, "10.0.0.3", "10.0.0.2", 2, 80, 60));
    agg.ingest(&packet(20.0, "10.0.0.4", "10.0.0.2", 3, 80, 60));

    let swept = agg.sweep(20.0);
    assert_eq!(swept.len(), 2);
    let mut ports: Vec<u16> = swept.iter().map(|f| f.key.src_port).collect();
    ports.sort();
    assert_eq!(ports, vec![1, 2]);
    assert_eq!(agg.active_flows(), 1);
    assert!(agg.sweep(20.0).is_empty());
}

#[test]
fn opportunistic_sweep_runs_on_packet_clock() {
    let agg = aggregator(10.0, 5.0);
    assert!(agg.ingest(&packet(0.0, "10.0.0.1", "10.0.0.2", 1, 80, 60)).is_empty());
    let out = agg.ingest(&packet(12.0, "10.0.0.3", "10.0.0.2", 2, 80, 60));
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].key.src_port, 1);
    assert_eq!(agg.active_flows(), 1);
}

#[test]
fn opportunistic_sweep_returns_all_stale_flows() {
    let agg = aggregator(10.0, 5.0);
    for (i, ts) in [0.0, 1.0, 2.0, 3.0].into_iter().enumerate() {
        let src = format!("10.0.0.{}", i + 1);
        assert!(agg.ingest(&packet(ts, &src, "10.0.0.9", 100 + i as u16, 80, 60)).is_empty());
    }
    // three flows idle for at least 10s at t=12.5, the one from t=3 is not
    let out = agg.ingest(&packet(12.5, "10.0.0.50", "10.0.0.9", 500, 80, 60));
    let mut ports: Vec<u16> = out.iter().map(|f| f.key.src_port).collect();
    ports.sort();
    assert_eq!(ports, vec![100, 101, 102]);
    assert_eq!(agg.active_flows(), 2);
    assert_eq!(agg.stats().flows_completed, 3);
}

#[test]
fn cap_evicts_longest_idle_flow() {
    let agg = FlowAggregator::new(FlowConfig {
        flow_timeout_secs: 100.0,
        sweep_interval_secs: 1000.0,
        max_active_flows: Some(2),
    });
    agg.ingest(&packet(0.0, "10.0.0.1", "10.0.0.9", 1, 80, 60));
    agg.ingest(&packet(1.0, "10.0.0.2", "10.0.0.9", 2, 80, 60));
    let out = agg.ingest(&packet(2.0, "10.0.0.3", "10.0.0.9", 3, 80, 60));
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].key.src_port, 1);

    let stats = agg.stats();
    assert_eq!(stats.active_flows, 2);
    assert_eq!(stats.flows_evicted, 1);
    assert_eq!(stats.flows_completed, 1);
}

#[test]
fn cap_eviction_respects_recent_activity() {
    let agg = FlowAggregator::new(FlowConfig {
        flow_timeout_secs: 100.0,
        sweep_interval_secs: 1000.0,
        max_active_flows: Some(3),
    });
    agg.ingest(&packet(0.0, "10.0.0.1", "10.0.0.9", 1, 80, 60));
    agg.ingest(&packet(1.0, "10.0.0.2", "10.0.0.9", 2, 80, 60));
    agg.ingest(&packet(2.0, "10.0.0.3", "10.0.0.9", 3, 80, 60));
    // reply on the first flow makes the second one the longest idle
    agg.ingest(&packet(3.0, "10.0.0.9", "10.0.0.1", 80, 1, 60));

    let out = agg.ingest(&packet(4.0, "10.0.0.4", "10.0.0.9", 4, 80, 60));
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].key.src_port, 2);
    let out = agg.ingest(&packet(5.0, "10.0.0.5", "10.0.0.9", 5, 80, 60));
    assert_eq!(out[0].key.src_port, 3);
    let out = agg.ingest(&packet(6.0, "10.0.0.6", "10.0.0.9", 6, 80, 60));
    assert_eq!(out[0].key.src_port, 1);
    assert_eq!(out[0].total_packets, 2);
    assert_eq!(agg.active_flows(), 3);
}

fn churn_under_cap(cap: usize) -> std::time::Duration {
    let agg = FlowAggregator::new(FlowConfig {
        flow_timeout_secs: 1e9,
        sweep_interval_secs: 1e9,
        max_active_flows: Some(cap),
    });
    let flow = |i: usize| {
        let a = (i >> 16) as u8;
        let b = (i >> 8) as u8;
        let c = i as u8;
        packet(i as f64, &format!("10.{}.{}.{}", a, b, c), "192.168.0.1", 1000, 80, 60)
    };
    for i in 0..cap {
        agg.ingest(&flow(i));
    }
    let start = std::time::Instant::now();
    let mut evicted = 0;
    for i in cap..cap * 2 {
        evicted += agg.ingest(&flow(i)).len();
    }
    let elapsed = start.elapsed();
    assert_eq!(evicted, cap);
    elapsed
}

#[test]
fn eviction_cost_grows_linearly_with_cap() {
    let small = (0..3).map(|_| churn_under_cap(2_000)).min().unwrap();
    let large = (0..3).map(|_| churn_under_cap(8_000)).min().unwrap();
    // 4x the churn; a per-eviction table scan would cost about 16x
    let ratio = large.as_secs_f64() / small.as_secs_f64().max(1e-6);
    assert!(ratio < 10.0, "eviction cost ratio {:.1}", ratio);
}

#[test]
fn drain_is_complete_and_ordered() {
    let agg = aggregator(60.0, 1000.0);
    agg.ingest(&packet(3.0, "10.0.0.3", "10.0.0.9", 3, 80, 60));
    agg.ingest(&packet(1.0, "10.0.0.1", "10.0.0.9", 1, 80, 60));
    agg.ingest(&packet(2.0, "10.0.0.2", "10.0.0.9", 2, 80, 60));

    let flows = agg.drain();
    let starts: Vec<f64> = flows.iter().map(|f| f.timestamp).collect();
    assert_eq!(starts, vec![1.0, 2.0, 3.0]);
    assert_eq!(agg.active_flows(), 0);
    assert!(agg.drain().is_empty());
    assert_eq!(agg.watermark(), 3.0);
}

#[test]
fn table_reports_direction_of_each_packet() {
    let mut table = FlowTable::new();
    assert_eq!(table.record(&fwd(0.0, 60)).direction, Direction::Forward);
    let reply = table.record(&bwd(0.1, 60));
    assert_eq!(reply.direction, Direction::Backward);
    let acc = table.get(&reply.key).unwrap();
    assert_eq!(acc.fwd.packets, 1);
    assert_eq!(acc.bwd.packets, 1);
}

#[test]
fn concurrent_ingest_conserves_packets() {
    const THREADS: u16 = 4;
    const PER_THREAD: usize = 200;
    let agg = aggregator(1e6, 1e6);

    std::thread::scope(|s| {
        for t in 0..THREADS {
            let agg = &agg;
            s.spawn(move || {
                for i in 0..PER_THREAD {
                    let ts = i as f64;
                    let obs = match i % 3 {
                        0 => fwd(ts, 100),
                        1 => bwd(ts, 100),
                        _ => packet(ts, "10.0.1.1", "10.0.0.2", 2000 + t, 80, 100),
                    };
                    agg.ingest(&obs);
                }
            });
        }
    });

    let flows = agg.drain();
    assert_eq!(flows.len(), 1 + THREADS as usize);
    let total: u64 = flows.iter().map(|f| f.total_packets).sum();
    assert_eq!(total, THREADS as u64 * PER_THREAD as u64);
    let stats = agg.stats();
    assert_eq!(stats.packets_ingested, total);
    assert_eq!(stats.flows_created, stats.flows_completed);
}
