//! Packet sources: replayed captures and synthetic traffic.
//! Shared observation type handed to the flow aggregator one packet at a time.

mod replay;
mod synthetic;

use serde::{Deserialize, Serialize};
use std::net::IpAddr;

pub use crate::flow::Protocol;
pub use replay::ReplaySource;
pub use synthetic::SyntheticSource;

/// One already-parsed packet as seen on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PacketObservation {
    /// Capture timestamp, seconds
    pub timestamp: f64,
    pub src_addr: IpAddr,
    pub dst_addr: IpAddr,
    /// ICMP packets carry type/code in the port slots
    pub src_port: u16,
    pub dst_port: u16,
    pub protocol: Protocol,
    /// Wire length in bytes
    pub length: u32,
    /// TCP control flags, e.g. "SYN|ACK"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flags: Option<String>,
    #[serde(default)]
    pub payload_len: u32,
}

/// Anything that yields packet observations in per-source timestamp order.
pub trait PacketSource: Iterator<Item = PacketObservation> + Send {
    fn name(&self) -> &str;

    /// Live sources stamp packets with wall-clock time, so a wall-clock sweep
    /// of idle flows is meaningful while they run.
    fn is_live(&self) -> bool {
        false
    }
}

/// Render TCP control bits the way captures report them ("FIN|SYN|ACK", "NONE").
pub fn tcp_flag_string(bits: u8) -> String {
    const NAMES: [(u8, &str); 8] = [
        (0x01, "FIN"),
        (0x02, "SYN"),
        (0x04, "RST"),
        (0x08, "PSH"),
        (0x10, "ACK"),
        (0x20, "URG"),
        (0x40, "ECE"),
        (0x80, "CWR"),
    ];
    let names: Vec<&str> = NAMES
        .iter()
        .filter(|(bit, _)| bits & bit != 0)
        .map(|(_, name)| *name)
        .collect();
    if names.is_empty() {
        "NONE".to_string()
    } else {
        names.join("|")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_string_orders_bits() {
        assert_eq!(tcp_flag_string(0x12), "SYN|ACK");
        assert_eq!(tcp_flag_string(0x11), "FIN|ACK");
        assert_eq!(tcp_flag_string(0), "NONE");
    }

    #[test]
    fn observation_parses_without_optional_fields() {
        let line = r#"{"timestamp":1.5,"src_addr":"10.0.0.1","dst_addr":"10.0.0.2","src_port":1234,"dst_port":53,"protocol":"UDP","length":80}"#;
        let obs: PacketObservation = serde_json::from_str(line).unwrap();
        assert_eq!(obs.protocol, Protocol::Udp);
        assert_eq!(obs.flags, None);
        assert_eq!(obs.payload_len, 0);
    }
}
