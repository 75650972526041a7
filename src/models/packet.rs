use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A decoded, enriched network packet.
///
/// Ports use 0 for "absent"; textual fields use the empty string. The record
/// is immutable once it has been committed to the live store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Packet {
    /// Monotonic identifier, assigned by the live store at ingest time
    pub id: i64,

    /// Wall-clock capture timestamp
    pub timestamp: DateTime<Utc>,

    /// Source IP address (textual; empty for non-IP frames)
    pub src_ip: String,

    /// Destination IP address
    pub dst_ip: String,

    /// Source port (TCP/UDP; 0 when absent)
    pub src_port: u16,

    /// Destination port (TCP/UDP; 0 when absent)
    pub dst_port: u16,

    /// Protocol name, e.g. "TCP", "UDP", "ICMP", "ARP"
    pub protocol: String,

    /// Frame length on the wire in bytes
    pub length: usize,

    /// Human-readable summary line
    pub info: String,

    /// Source MAC address (empty if absent)
    pub src_mac: String,

    /// Destination MAC address (empty if absent)
    pub dst_mac: String,

    /// Best-guess application/service name from well-known ports or DNS
    pub application: String,

    /// Reverse-DNS hostname of the source (empty until resolved)
    pub src_hostname: String,

    /// Reverse-DNS hostname of the destination
    pub dst_hostname: String,

    /// Country code of the source ("Local" for private ranges)
    pub src_country: String,

    /// Country code of the destination
    pub dst_country: String,

    /// Local process owning one of the ports (empty if unknown)
    pub process_name: String,
}

impl Packet {
    /// An undecoded packet skeleton carrying only frame metadata.
    pub fn new(timestamp: DateTime<Utc>, length: usize) -> Self {
        Self {
            id: 0,
            timestamp,
            src_ip: String::new(),
            dst_ip: String::new(),
            src_port: 0,
            dst_port: 0,
            protocol: "Unknown".to_string(),
            length,
            info: String::new(),
            src_mac: String::new(),
            dst_mac: String::new(),
            application: String::new(),
            src_hostname: String::new(),
            dst_hostname: String::new(),
            src_country: String::new(),
            dst_country: String::new(),
            process_name: String::new(),
        }
    }
}
