//! Flow store benchmark: insert and read encrypted flow records.

use aegis_agent::config::FlowConfig;
use aegis_agent::features::FlowFeatureVector;
use aegis_agent::flow::{FlowAggregator, Protocol};
use aegis_agent::storage::FlowStore;
use aegis_agent::PacketObservation;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tempfile::tempdir;

fn sample_flow() -> FlowFeatureVector {
    let agg = FlowAggregator::new(FlowConfig::default());
    for i in 0..32u16 {
        let forward = i % 3 != 0;
        let (src, dst, sp, dp) = if forward {
            ("10.0.0.1", "10.0.0.2", 40000, 443)
        } else {
            ("10.0.0.2", "10.0.0.1", 443, 40000)
        };
        agg.ingest(&PacketObservation {
            timestamp: f64::from(i) * 0.05,
            src_addr: src.parse().unwrap(),
            dst_addr: dst.parse().unwrap(),
            src_port: sp,
            dst_port: dp,
            protocol: Protocol::Tcp,
            length: 60 + u32::from(i) * 40,
            flags: Some("ACK".into()),
            payload_len: 0,
        });
    }
    agg.drain().remove(0)
}

fn bench_insert_flow(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let store = FlowStore::open(&dir.path().join("flows.db"), b"bench-secret").unwrap();
    let flow = sample_flow();

    c.bench_function("storage_insert_flow", |b| {
        b.iter(|| black_box(store.insert_flow(black_box(&flow), None)).unwrap())
    });
}

fn bench_get_flow(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let store = FlowStore::open(&dir.path().join("flows.db"), b"bench-secret").unwrap();
    let id = store.insert_flow(&sample_flow(), None).unwrap();

    c.bench_function("storage_get_flow", |b| {
        b.iter(|| black_box(store.get_flow(&id)).unwrap())
    });
}

criterion_group!(benches, bench_insert_flow, bench_get_flow);
criterion_main!(benches);
