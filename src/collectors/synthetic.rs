//! Seeded synthetic traffic: interleaved bidirectional conversations, a share of
//! them shaped like scans or floods.

use super::{tcp_flag_string, PacketObservation, PacketSource, Protocol};
use crate::config::SyntheticConfig;
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use std::net::{IpAddr, Ipv4Addr};
use std::time::{Duration, Instant};

const EXTERNAL_HOSTS: [[u8; 4]; 7] = [
    [93, 184, 216, 34],
    [8, 8, 8, 8],
    [1, 1, 1, 1],
    [142, 250, 185, 46],
    [104, 244, 42, 65],
    [157, 240, 22, 35],
    [13, 107, 42, 14],
];

const SERVICE_PORTS: [u16; 17] = [
    80, 443, 8080, 8443, 25, 587, 993, 22, 3389, 5900, 1433, 3306, 5432, 53, 123, 161, 514,
];

/// Window over which conversation start times are spread (seconds).
const START_WINDOW_SECS: f64 = 300.0;

const FIN: u8 = 0x01;
const SYN: u8 = 0x02;
const PSH: u8 = 0x08;
const ACK: u8 = 0x10;

pub struct SyntheticSource {
    /// Offsets from the start of the run, ascending
    queue: VecDeque<PacketObservation>,
    realtime: bool,
    started: Option<(Instant, f64)>,
    anomalous: usize,
}

impl SyntheticSource {
    pub fn new(config: &SyntheticConfig) -> Self {
        let mut rng = StdRng::seed_from_u64(config.seed);
        let mut packets = Vec::new();
        let mut anomalous = 0;
        for _ in 0..config.conversations {
            let attack = rng.gen_bool(config.anomaly_rate.clamp(0.0, 1.0));
            if attack {
                anomalous += 1;
            }
            conversation(&mut rng, config.packets_per_conversation.max(2), attack, &mut packets);
        }
        packets.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));

        Self {
            queue: packets.into(),
            realtime: config.realtime,
            started: None,
            anomalous,
        }
    }

    /// Packets not yet emitted.
    pub fn remaining(&self) -> usize {
        self.queue.len()
    }

    /// Conversations generated with attack-like shape.
    pub fn anomalous_conversations(&self) -> usize {
        self.anomalous
    }
}

fn pick<T: Copy>(rng: &mut StdRng, items: &[T]) -> T {
    items[rng.gen_range(0..items.len())]
}

fn conversation(rng: &mut StdRng, avg_packets: usize, attack: bool, out: &mut Vec<PacketObservation>) {
    let protocol = match rng.gen_range(0..10) {
        0..=5 => Protocol::Tcp,
        6..=8 => Protocol::Udp,
        _ => Protocol::Icmp,
    };
    let src_addr = IpAddr::V4(Ipv4Addr::new(192, 168, 1, rng.gen_range(1..50)));
    let dst_addr = if rng.gen_bool(0.8) {
        IpAddr::V4(Ipv4Addr::from(pick(rng, &EXTERNAL_HOSTS)))
    } else {
        IpAddr::V4(Ipv4Addr::new(192, 168, 1, rng.gen_range(50..100)))
    };
    let (src_port, dst_port) = match protocol {
        // echo request type/code
        Protocol::Icmp => (8, 0),
        _ => (rng.gen_range(1024..=65535), pick(rng, &SERVICE_PORTS)),
    };

    let count = if attack {
        rng.gen_range(avg_packets * 5..=avg_packets * 10)
    } else {
        rng.gen_range(avg_packets / 2..=avg_packets + avg_packets / 2).max(2)
    };
    let tiny = rng.gen_bool(0.5);
    let backward_share = if attack { 0.2 } else { 0.5 };

    let mut ts = rng.gen_range(0.0..START_WINDOW_SECS);
    let mut seen_backward = false;
    for i in 0..count {
        let forward = i == 0 || !rng.gen_bool(backward_share);
        let length: u32 = match (attack, tiny) {
            (true, true) => rng.gen_range(40..=60),
            (true, false) => rng.gen_range(1400..=1500),
            _ => rng.gen_range(60..=1200),
        };
        let flags = (protocol == Protocol::Tcp).then(|| {
            let bits = if i == 0 {
                SYN
            } else if !forward && !seen_backward {
                SYN | ACK
            } else if i + 1 == count {
                FIN | ACK
            } else if rng.gen_bool(0.3) {
                PSH | ACK
            } else {
                ACK
            };
            tcp_flag_string(bits)
        });
        if !forward {
            seen_backward = true;
        }

        let (s, d, sp, dp) = if forward {
            (src_addr, dst_addr, src_port, dst_port)
        } else {
            (dst_addr, src_addr, dst_port, src_port)
        };
        out.push(PacketObservation {
            timestamp: ts,
            src_addr: s,
            dst_addr: d,
            src_port: sp,
            dst_port: dp,
            protocol,
            length,
            flags,
            payload_len: length.saturating_sub(54),
        });

        ts += if attack {
            rng.gen_range(0.0005..0.01)
        } else {
            rng.gen_range(0.01..2.0)
        };
    }
}

impl Iterator for SyntheticSource {
    type Item = PacketObservation;

    fn next(&mut self) -> Option<PacketObservation> {
        let mut obs = self.queue.pop_front()?;
        if self.realtime {
            let (start, wall_start) = *self.started.get_or_insert_with(|| {
                (Instant::now(), Utc::now().timestamp_millis() as f64 / 1e3)
            });
            let due = start + Duration::from_secs_f64(obs.timestamp.max(0.0));
            let now = Instant::now();
            if due > now {
                std::thread::sleep(due - now);
            }
            obs.timestamp += wall_start;
        }
        Some(obs)
    }
}

impl PacketSource for SyntheticSource {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn is_live(&self) -> bool {
        self.realtime
    }
}
