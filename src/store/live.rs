use chrono::Utc;
use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::enrich::Enricher;
use crate::models::packet::Packet;
use crate::models::stats::{Connection, Stats, Talker};

const RATE_WINDOW: Duration = Duration::from_secs(5);
const MAX_CONNECTIONS: usize = 10_000;
const TOP_TALKERS: usize = 10;
const TOP_CONNECTIONS: usize = 100;

/// (src ip, src port, dst ip, dst port, protocol)
type ConnKey = (String, u16, String, u16, String);

#[derive(Debug, Clone, Copy, Default)]
struct IpTraffic {
    packets: i64,
    bytes: i64,
}

/// Bounded ring of recent packets plus all running aggregates.
///
/// One RW lock guards everything; `add` is the only writer on the capture
/// path and holds the lock just long enough to update counters.
pub struct PacketStore {
    inner: RwLock<StoreInner>,
    enricher: Arc<dyn Enricher>,
}

struct StoreInner {
    packets: VecDeque<Packet>,
    max_packets: usize,
    packet_id: i64,
    stats: Stats,
    ip_stats: HashMap<String, IpTraffic>,
    connections: HashMap<ConnKey, Connection>,
    rate_window: VecDeque<(Instant, usize)>,
    window_bytes: usize,
}

impl PacketStore {
    pub fn new(max_packets: usize, enricher: Arc<dyn Enricher>) -> Self {
        Self {
            inner: RwLock::new(StoreInner {
                packets: VecDeque::with_capacity(max_packets),
                max_packets,
                packet_id: 0,
                stats: Stats::new(Utc::now()),
                ip_stats: HashMap::new(),
                connections: HashMap::new(),
                rate_window: VecDeque::new(),
                window_bytes: 0,
            }),
            enricher,
        }
    }

    /// Ingest one packet: assign its id, append to the ring and update every
    /// aggregate. Returns the assigned id.
    pub fn add(&self, mut packet: Packet) -> i64 {
        let now = Instant::now();
        let mut inner = self.inner.write();

        inner.packet_id += 1;
        packet.id = inner.packet_id;

        if packet.protocol.is_empty() {
            packet.protocol = "Unknown".to_string();
        }

        inner.stats.total_packets += 1;
        inner.stats.total_bytes += packet.length as i64;
        *inner
            .stats
            .protocol_stats
            .entry(packet.protocol.clone())
            .or_insert(0) += 1;

        if !packet.application.is_empty() {
            *inner
                .stats
                .application_stats
                .entry(packet.application.clone())
                .or_insert(0) += 1;
        }

        // Bytes are credited once per endpoint country
        if !packet.src_country.is_empty() {
            *inner
                .stats
                .country_stats
                .entry(packet.src_country.clone())
                .or_insert(0) += packet.length as i64;
        }
        if !packet.dst_country.is_empty() {
            *inner
                .stats
                .country_stats
                .entry(packet.dst_country.clone())
                .or_insert(0) += packet.length as i64;
        }

        if !packet.src_ip.is_empty() {
            let traffic = inner
                .ip_stats
                .entry(packet.src_ip.clone())
                .or_default();
            traffic.packets += 1;
            traffic.bytes += packet.length as i64;
        }

        if packet.src_port > 0 || packet.dst_port > 0 {
            Self::track_connection(&mut inner, &packet);
        }

        // Sliding rate window
        let len = packet.length;
        inner.rate_window.push_back((now, len));
        inner.window_bytes += len;
        while let Some(&(front, front_len)) = inner.rate_window.front() {
            if now.duration_since(front) > RATE_WINDOW {
                inner.rate_window.pop_front();
                inner.window_bytes -= front_len;
            } else {
                break;
            }
        }
        if let Some(&(front, _)) = inner.rate_window.front() {
            let duration = now.duration_since(front).as_secs_f64();
            if duration > 0.0 {
                inner.stats.packets_per_sec = inner.rate_window.len() as f64 / duration;
                inner.stats.bytes_per_sec = inner.window_bytes as f64 / duration;
            }
        }

        let id = packet.id;
        if inner.packets.len() >= inner.max_packets {
            inner.packets.pop_front();
        }
        inner.packets.push_back(packet);
        id
    }

    fn track_connection(inner: &mut StoreInner, packet: &Packet) {
        let key: ConnKey = (
            packet.src_ip.clone(),
            packet.src_port,
            packet.dst_ip.clone(),
            packet.dst_port,
            packet.protocol.clone(),
        );
        if let Some(conn) = inner.connections.get_mut(&key) {
            conn.packets += 1;
            conn.bytes += packet.length as i64;
            conn.last_seen = packet.timestamp;
            return;
        }
        if inner.connections.len() >= MAX_CONNECTIONS {
            // Evict the connection idle the longest
            if let Some(oldest) = inner
                .connections
                .iter()
                .min_by_key(|(_, c)| c.last_seen)
                .map(|(k, _)| k.clone())
            {
                inner.connections.remove(&oldest);
            }
        }
        inner.connections.insert(
            key,
            Connection {
                src_ip: packet.src_ip.clone(),
                dst_ip: packet.dst_ip.clone(),
                src_port: packet.src_port,
                dst_port: packet.dst_port,
                protocol: packet.protocol.clone(),
                packets: 1,
                bytes: packet.length as i64,
                first_seen: packet.timestamp,
                last_seen: packet.timestamp,
                state: "active".to_string(),
            },
        );
    }

    /// Snapshot of the aggregate statistics including the top-talker list.
    pub fn stats(&self) -> Stats {
        let inner = self.inner.read();
        let mut stats = inner.stats.clone();

        let mut talkers: Vec<Talker> = inner
            .ip_stats
            .iter()
            .map(|(ip, traffic)| {
                let info = self.enricher.lookup(ip);
                if info.is_empty() {
                    self.enricher.resolve(ip);
                }
                Talker {
                    ip: ip.clone(),
                    packets: traffic.packets,
                    bytes: traffic.bytes,
                    hostname: info.hostname,
                    country: info.country,
                }
            })
            .collect();
        talkers.sort_by(|a, b| b.bytes.cmp(&a.bytes).then_with(|| a.ip.cmp(&b.ip)));
        talkers.truncate(TOP_TALKERS);
        stats.top_talkers = talkers;

        stats
    }

    /// Copy of the newest `limit` ring entries, oldest first. A limit of 0
    /// returns the whole ring.
    pub fn recent_packets(&self, limit: usize) -> Vec<Packet> {
        let inner = self.inner.read();
        let len = inner.packets.len();
        let take = if limit == 0 || limit > len { len } else { limit };
        inner
            .packets
            .iter()
            .skip(len - take)
            .cloned()
            .collect()
    }

    /// Top connections by bytes, ties broken by 5-tuple, capped at 100.
    pub fn connections(&self) -> Vec<Connection> {
        let inner = self.inner.read();
        let mut connections: Vec<Connection> = inner.connections.values().cloned().collect();
        connections.sort_by(|a, b| {
            b.bytes.cmp(&a.bytes).then_with(|| {
                (&a.src_ip, a.src_port, &a.dst_ip, a.dst_port, &a.protocol).cmp(&(
                    &b.src_ip,
                    b.src_port,
                    &b.dst_ip,
                    b.dst_port,
                    &b.protocol,
                ))
            })
        });
        connections.truncate(TOP_CONNECTIONS);
        connections
    }
}
