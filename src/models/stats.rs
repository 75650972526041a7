use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Running aggregate statistics for the capture session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    /// Total number of packets observed
    pub total_packets: i64,

    /// Total bytes observed
    pub total_bytes: i64,

    /// Packets per second over the sliding window
    pub packets_per_sec: f64,

    /// Bytes per second over the sliding window
    pub bytes_per_sec: f64,

    /// Packet count per protocol
    pub protocol_stats: HashMap<String, i64>,

    /// Byte count per country code (src and dst each credited per frame)
    pub country_stats: HashMap<String, i64>,

    /// Top source IPs by bytes
    pub top_talkers: Vec<Talker>,

    /// Packet count per detected application
    pub application_stats: HashMap<String, i64>,

    /// When the capture session started
    pub start_time: DateTime<Utc>,
}

impl Stats {
    pub fn new(start_time: DateTime<Utc>) -> Self {
        Self {
            total_packets: 0,
            total_bytes: 0,
            packets_per_sec: 0.0,
            bytes_per_sec: 0.0,
            protocol_stats: HashMap::new(),
            country_stats: HashMap::new(),
            top_talkers: Vec::new(),
            application_stats: HashMap::new(),
            start_time,
        }
    }
}

/// A source IP aggregated with its lifetime traffic totals
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Talker {
    pub ip: String,
    pub packets: i64,
    pub bytes: i64,
    pub hostname: String,
    pub country: String,
}

/// A tracked 5-tuple with aggregated counters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub src_ip: String,
    pub dst_ip: String,
    pub src_port: u16,
    pub dst_port: u16,
    pub protocol: String,
    pub packets: i64,
    pub bytes: i64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub state: String,
}
