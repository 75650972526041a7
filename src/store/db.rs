use chrono::{DateTime, SecondsFormat, Utc};
use log::{error, info, warn};
use parking_lot::Mutex;
use rusqlite::{Connection, ToSql};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, RecvTimeoutError, SyncSender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::enrich::Enricher;
use crate::models::packet::Packet;
use crate::models::stats::Talker;
use crate::utils::error::AppResult;

const BATCH_SIZE: usize = 100;
const FLUSH_INTERVAL: Duration = Duration::from_secs(5);
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const INSERT_SQL: &str = "\
    INSERT INTO packets (
        timestamp, src_ip, dst_ip, src_port, dst_port,
        protocol, length, info, src_mac, dst_mac,
        application, src_hostname, dst_hostname, src_country, dst_country,
        process_name
    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)";

const SELECT_COLUMNS: &str = "\
    id, timestamp, src_ip, dst_ip, src_port, dst_port, protocol, length, info, \
    src_mac, dst_mac, application, src_hostname, dst_hostname, src_country, \
    dst_country, process_name";

/// Historical query filters for the packets table
#[derive(Debug, Clone, Default)]
pub struct HistoryQuery {
    pub limit: i64,
    pub offset: i64,
    pub text: String,
    pub country: String,
    pub exclude_ips: Vec<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

/// Aggregates over a time range of the persisted packets
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryStats {
    pub total_packets: i64,
    pub total_bytes: i64,
    pub protocol_stats: HashMap<String, i64>,
    pub top_talkers: Vec<Talker>,
}

/// Metadata about the database file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseInfo {
    pub total_packets: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub earliest_packet: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_packet: Option<DateTime<Utc>>,
    pub database_size: i64,
}

/// Append-only SQLite store for every observed packet.
///
/// Ingest goes through an in-memory batch drained by a single writer thread,
/// so a disk write never blocks the capture path. Queries run on their own
/// connection; WAL keeps them from blocking the writer.
pub struct Database {
    read_conn: Mutex<Connection>,
    write_conn: Mutex<Connection>,
    batch: Mutex<Vec<Packet>>,
    flush_tx: SyncSender<()>,
    stop: AtomicBool,
    writer: Mutex<Option<JoinHandle<()>>>,
    enricher: Arc<dyn Enricher>,
}

impl Database {
    pub fn open<P: AsRef<Path>>(path: P, enricher: Arc<dyn Enricher>) -> AppResult<Arc<Self>> {
        let write_conn = open_connection(path.as_ref())?;
        create_tables(&write_conn)?;
        let read_conn = open_connection(path.as_ref())?;

        let (flush_tx, flush_rx) = sync_channel(1);
        let db = Arc::new(Self {
            read_conn: Mutex::new(read_conn),
            write_conn: Mutex::new(write_conn),
            batch: Mutex::new(Vec::with_capacity(BATCH_SIZE)),
            flush_tx,
            stop: AtomicBool::new(false),
            writer: Mutex::new(None),
            enricher,
        });

        let handle = std::thread::Builder::new()
            .name("pitrack-db-writer".to_string())
            .spawn({
                let db = db.clone();
                move || writer_loop(&db, flush_rx)
            })?;
        *db.writer.lock() = Some(handle);

        info!("Database opened: {}", path.as_ref().display());
        Ok(db)
    }

    /// Queue one packet for the next batch insert. Never blocks on disk.
    pub fn enqueue(&self, packet: Packet) {
        let should_flush = {
            let mut queue = self.batch.lock();
            queue.push(packet);
            queue.len() >= BATCH_SIZE
        };
        if should_flush {
            // Single-slot latch: redundant signals coalesce
            let _ = self.flush_tx.try_send(());
        }
    }

    /// Drain the batch and write it in one transaction. Insert errors skip
    /// the row; a failed commit drops the whole batch.
    pub fn flush(&self) {
        let batch: Vec<Packet> = {
            let mut queue = self.batch.lock();
            if queue.is_empty() {
                return;
            }
            std::mem::take(&mut *queue)
        };

        let mut conn = self.write_conn.lock();
        let tx = match conn.transaction() {
            Ok(tx) => tx,
            Err(e) => {
                error!("Failed to start transaction, {} packets lost: {}", batch.len(), e);
                return;
            }
        };
        {
            let mut stmt = match tx.prepare_cached(INSERT_SQL) {
                Ok(stmt) => stmt,
                Err(e) => {
                    error!("Failed to prepare insert, {} packets lost: {}", batch.len(), e);
                    return;
                }
            };
            for p in &batch {
                let result = stmt.execute(rusqlite::params![
                    format_timestamp(&p.timestamp),
                    p.src_ip,
                    p.dst_ip,
                    p.src_port,
                    p.dst_port,
                    p.protocol,
                    p.length as i64,
                    p.info,
                    p.src_mac,
                    p.dst_mac,
                    p.application,
                    p.src_hostname,
                    p.dst_hostname,
                    p.src_country,
                    p.dst_country,
                    p.process_name,
                ]);
                if let Err(e) = result {
                    error!("Packet insert failed: {}", e);
                }
            }
        }
        if let Err(e) = tx.commit() {
            error!("Batch commit failed, {} packets lost: {}", batch.len(), e);
        }
    }

    /// Filtered, paginated read of the packets table, newest first. The
    /// returned total ignores limit/offset.
    pub fn query_packets(&self, query: &HistoryQuery) -> AppResult<(Vec<Packet>, i64)> {
        let mut where_clause = String::new();
        let mut args: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(start) = &query.start {
            where_clause.push_str(" AND timestamp >= ?");
            args.push(Box::new(format_timestamp(start)));
        }
        if let Some(end) = &query.end {
            where_clause.push_str(" AND timestamp <= ?");
            args.push(Box::new(format_timestamp(end)));
        }
        if !query.text.is_empty() {
            where_clause.push_str(
                " AND (src_ip LIKE ? OR dst_ip LIKE ? OR protocol LIKE ? OR application LIKE ? \
                 OR src_hostname LIKE ? OR dst_hostname LIKE ? OR info LIKE ?)",
            );
            let pattern = format!("%{}%", query.text);
            for _ in 0..7 {
                args.push(Box::new(pattern.clone()));
            }
        }
        if !query.country.is_empty() {
            where_clause.push_str(" AND (src_country = ? OR dst_country = ?)");
            args.push(Box::new(query.country.clone()));
            args.push(Box::new(query.country.clone()));
        }
        for ip in &query.exclude_ips {
            let ip = ip.trim();
            if !ip.is_empty() {
                where_clause.push_str(" AND src_ip != ? AND dst_ip != ?");
                args.push(Box::new(ip.to_string()));
                args.push(Box::new(ip.to_string()));
            }
        }

        let conn = self.read_conn.lock();

        let count_sql = format!("SELECT COUNT(*) FROM packets WHERE 1=1{}", where_clause);
        let total: i64 = {
            let params: Vec<&dyn ToSql> = args.iter().map(|a| a.as_ref()).collect();
            conn.query_row(&count_sql, &params[..], |row| row.get(0))?
        };

        let select_sql = format!(
            "SELECT {} FROM packets WHERE 1=1{} ORDER BY timestamp DESC LIMIT ? OFFSET ?",
            SELECT_COLUMNS, where_clause
        );
        args.push(Box::new(query.limit));
        args.push(Box::new(query.offset));
        let params: Vec<&dyn ToSql> = args.iter().map(|a| a.as_ref()).collect();

        let mut stmt = conn.prepare(&select_sql)?;
        let rows = stmt.query_map(&params[..], row_to_packet)?;
        let mut packets = Vec::new();
        for row in rows {
            match row {
                Ok(p) => packets.push(p),
                Err(e) => warn!("Skipping unreadable packet row: {}", e),
            }
        }

        Ok((packets, total))
    }

    /// Totals, top protocols and top source IPs over a time range.
    pub fn stats(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> AppResult<HistoryStats> {
        let mut clause = String::new();
        let mut args: Vec<Box<dyn ToSql>> = Vec::new();
        if let Some(start) = &start {
            clause.push_str(" AND timestamp >= ?");
            args.push(Box::new(format_timestamp(start)));
        }
        if let Some(end) = &end {
            clause.push_str(" AND timestamp <= ?");
            args.push(Box::new(format_timestamp(end)));
        }
        let params: Vec<&dyn ToSql> = args.iter().map(|a| a.as_ref()).collect();

        let conn = self.read_conn.lock();

        let totals_sql = format!(
            "SELECT COUNT(*), COALESCE(SUM(length), 0) FROM packets WHERE 1=1{}",
            clause
        );
        let (total_packets, total_bytes) =
            conn.query_row(&totals_sql, &params[..], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })?;

        let mut protocol_stats = HashMap::new();
        {
            let sql = format!(
                "SELECT protocol, COUNT(*) AS cnt FROM packets WHERE 1=1{} \
                 GROUP BY protocol ORDER BY cnt DESC LIMIT 10",
                clause
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(&params[..], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?;
            for row in rows {
                let (protocol, count) = row?;
                protocol_stats.insert(protocol, count);
            }
        }

        let mut top_talkers = Vec::new();
        {
            let sql = format!(
                "SELECT src_ip, SUM(length) AS bytes, COUNT(*) AS pkts FROM packets \
                 WHERE src_ip != ''{} GROUP BY src_ip ORDER BY bytes DESC, src_ip ASC LIMIT 10",
                clause
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(&params[..], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            })?;
            for row in rows {
                let (ip, bytes, packets) = row?;
                let ip_info = self.enricher.lookup(&ip);
                top_talkers.push(Talker {
                    ip,
                    packets,
                    bytes,
                    hostname: ip_info.hostname,
                    country: ip_info.country,
                });
            }
        }

        Ok(HistoryStats {
            total_packets,
            total_bytes,
            protocol_stats,
            top_talkers,
        })
    }

    /// Row count, time range and on-disk size.
    pub fn info(&self) -> AppResult<DatabaseInfo> {
        let conn = self.read_conn.lock();

        let total_packets: i64 =
            conn.query_row("SELECT COUNT(*) FROM packets", [], |row| row.get(0))?;

        let (earliest, latest): (Option<String>, Option<String>) = conn.query_row(
            "SELECT MIN(timestamp), MAX(timestamp) FROM packets",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let page_count: i64 = conn.query_row("PRAGMA page_count", [], |row| row.get(0))?;
        let page_size: i64 = conn.query_row("PRAGMA page_size", [], |row| row.get(0))?;

        Ok(DatabaseInfo {
            total_packets,
            earliest_packet: earliest.as_deref().and_then(parse_timestamp),
            latest_packet: latest.as_deref().and_then(parse_timestamp),
            database_size: page_count * page_size,
        })
    }

    /// Sorted union of the non-empty country codes seen in either column.
    pub fn distinct_countries(&self) -> AppResult<Vec<String>> {
        let conn = self.read_conn.lock();
        let mut stmt = conn.prepare(
            "SELECT DISTINCT country FROM (
                SELECT src_country AS country FROM packets
                    WHERE src_country IS NOT NULL AND src_country != ''
                UNION
                SELECT dst_country AS country FROM packets
                    WHERE dst_country IS NOT NULL AND dst_country != ''
            ) ORDER BY country",
        )?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut countries = Vec::new();
        for row in rows {
            countries.push(row?);
        }
        Ok(countries)
    }

    /// Stop the writer, flush what is queued, and join the writer thread.
    pub fn close(&self) {
        self.stop.store(true, Ordering::SeqCst);
        let _ = self.flush_tx.try_send(());
        if let Some(handle) = self.writer.lock().take() {
            let _ = handle.join();
        }
    }
}

fn writer_loop(db: &Database, rx: Receiver<()>) {
    loop {
        match rx.recv_timeout(FLUSH_INTERVAL) {
            Ok(()) | Err(RecvTimeoutError::Timeout) => {
                db.flush();
                if db.stop.load(Ordering::SeqCst) {
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => {
                db.flush();
                break;
            }
        }
    }
}

fn open_connection(path: &Path) -> AppResult<Connection> {
    let conn = Connection::open(path)?;
    // WAL lets the query connection read while the batcher writes
    conn.query_row("PRAGMA journal_mode=WAL", [], |_| Ok(()))?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    Ok(conn)
}

fn create_tables(conn: &Connection) -> AppResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS packets (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp TEXT NOT NULL,
            src_ip TEXT,
            dst_ip TEXT,
            src_port INTEGER,
            dst_port INTEGER,
            protocol TEXT,
            length INTEGER,
            info TEXT,
            src_mac TEXT,
            dst_mac TEXT,
            application TEXT,
            src_hostname TEXT,
            dst_hostname TEXT,
            src_country TEXT,
            dst_country TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_packets_timestamp ON packets(timestamp);
        CREATE INDEX IF NOT EXISTS idx_packets_src_ip ON packets(src_ip);
        CREATE INDEX IF NOT EXISTS idx_packets_dst_ip ON packets(dst_ip);
        CREATE INDEX IF NOT EXISTS idx_packets_protocol ON packets(protocol);
        CREATE INDEX IF NOT EXISTS idx_packets_application ON packets(application);

        CREATE TABLE IF NOT EXISTS sessions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            start_time TEXT NOT NULL,
            end_time TEXT,
            interface TEXT,
            total_packets INTEGER DEFAULT 0,
            total_bytes INTEGER DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS ip_stats (
            ip TEXT PRIMARY KEY,
            hostname TEXT,
            country TEXT,
            total_packets INTEGER DEFAULT 0,
            total_bytes INTEGER DEFAULT 0,
            first_seen TEXT,
            last_seen TEXT
        );",
    )?;

    // Migration from schemas predating process attribution
    let _ = conn.execute("ALTER TABLE packets ADD COLUMN process_name TEXT", []);

    Ok(())
}

/// Fixed-precision RFC3339 so string comparison orders chronologically.
fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

fn row_to_packet(row: &rusqlite::Row) -> rusqlite::Result<Packet> {
    let ts: String = row.get(1)?;
    let timestamp = parse_timestamp(&ts).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            1,
            rusqlite::types::Type::Text,
            format!("bad timestamp {:?}", ts).into(),
        )
    })?;
    Ok(Packet {
        id: row.get(0)?,
        timestamp,
        src_ip: row.get(2)?,
        dst_ip: row.get(3)?,
        src_port: row.get(4)?,
        dst_port: row.get(5)?,
        protocol: row.get(6)?,
        length: row.get::<_, i64>(7)? as usize,
        info: row.get(8)?,
        src_mac: row.get(9)?,
        dst_mac: row.get(10)?,
        application: row.get(11)?,
        src_hostname: row.get::<_, Option<String>>(12)?.unwrap_or_default(),
        dst_hostname: row.get::<_, Option<String>>(13)?.unwrap_or_default(),
        src_country: row.get::<_, Option<String>>(14)?.unwrap_or_default(),
        dst_country: row.get::<_, Option<String>>(15)?.unwrap_or_default(),
        process_name: row.get::<_, Option<String>>(16)?.unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrich::IpInfo;
    use chrono::TimeZone;

    struct NullEnricher;

    impl Enricher for NullEnricher {
        fn lookup(&self, _ip: &str) -> IpInfo {
            IpInfo::default()
        }

        fn resolve(&self, _ip: &str) {}
    }

    fn open_test_db(dir: &tempfile::TempDir) -> Arc<Database> {
        Database::open(dir.path().join("test.db"), Arc::new(NullEnricher)).unwrap()
    }

    fn sample_packet(seq: i64) -> Packet {
        Packet {
            id: 0,
            timestamp: Utc.timestamp_opt(1_700_000_000 + seq, 123_456_000).unwrap(),
            src_ip: format!("192.0.2.{}", seq % 200),
            dst_ip: "198.51.100.7".to_string(),
            src_port: 40000 + seq as u16,
            dst_port: 443,
            protocol: "TCP".to_string(),
            length: 60 + seq as usize,
            info: format!("{} → 443 [SYN ] Seq=0 Ack=0 Win=65535", 40000 + seq),
            src_mac: "aa:bb:cc:dd:ee:01".to_string(),
            dst_mac: "aa:bb:cc:dd:ee:02".to_string(),
            application: "HTTPS".to_string(),
            src_hostname: String::new(),
            dst_hostname: "example.net".to_string(),
            src_country: if seq % 2 == 0 { "US" } else { "DE" }.to_string(),
            dst_country: String::new(),
            process_name: "curl".to_string(),
        }
    }

    #[test]
    fn round_trip_preserves_fields() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_test_db(&dir);
        let original = sample_packet(1);
        db.enqueue(original.clone());
        db.flush();

        let (packets, total) = db
            .query_packets(&HistoryQuery {
                limit: 10,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(total, 1);
        let got = &packets[0];
        assert_eq!(got.timestamp, original.timestamp);
        assert_eq!(got.src_ip, original.src_ip);
        assert_eq!(got.dst_ip, original.dst_ip);
        assert_eq!(got.src_port, original.src_port);
        assert_eq!(got.dst_port, original.dst_port);
        assert_eq!(got.protocol, original.protocol);
        assert_eq!(got.length, original.length);
        assert_eq!(got.info, original.info);
        assert_eq!(got.src_mac, original.src_mac);
        assert_eq!(got.application, original.application);
        assert_eq!(got.dst_hostname, original.dst_hostname);
        assert_eq!(got.src_country, original.src_country);
        assert_eq!(got.process_name, original.process_name);
        db.close();
    }

    #[test]
    fn pagination_window_and_total() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_test_db(&dir);
        for i in 0..30 {
            db.enqueue(sample_packet(i));
        }
        db.flush();

        let (page, total) = db
            .query_packets(&HistoryQuery {
                limit: 10,
                offset: 5,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(total, 30);
        assert_eq!(page.len(), 10);
        // Newest first: offset 5 of the DESC ordering starts at seq 24
        assert_eq!(page[0].src_port, 40024);
        assert_eq!(page[9].src_port, 40015);
        db.close();
    }

    #[test]
    fn country_filter_counts_both_columns() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_test_db(&dir);
        for i in 0..100 {
            db.enqueue(sample_packet(i));
        }
        db.flush();

        let (page, total) = db
            .query_packets(&HistoryQuery {
                limit: 10,
                country: "US".to_string(),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(total, 50);
        assert_eq!(page.len(), 10);
        assert!(page
            .iter()
            .all(|p| p.src_country == "US" || p.dst_country == "US"));
        db.close();
    }

    #[test]
    fn text_filter_is_case_insensitive_substring() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_test_db(&dir);
        let mut odd = sample_packet(1);
        odd.info = "DNS Query: printer.lan".to_string();
        odd.application = "DNS".to_string();
        db.enqueue(odd);
        db.enqueue(sample_packet(2));
        db.flush();

        let (page, total) = db
            .query_packets(&HistoryQuery {
                limit: 10,
                text: "PRINTER".to_string(),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(page[0].application, "DNS");
        db.close();
    }

    #[test]
    fn exclude_ips_removes_matches_on_either_side() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_test_db(&dir);
        for i in 0..4 {
            db.enqueue(sample_packet(i));
        }
        db.flush();

        let (_, total) = db
            .query_packets(&HistoryQuery {
                limit: 10,
                exclude_ips: vec![" 198.51.100.7 ".to_string()],
                ..Default::default()
            })
            .unwrap();
        assert_eq!(total, 0);

        let (_, total) = db
            .query_packets(&HistoryQuery {
                limit: 10,
                exclude_ips: vec!["192.0.2.1".to_string(), "".to_string()],
                ..Default::default()
            })
            .unwrap();
        assert_eq!(total, 3);
        db.close();
    }

    #[test]
    fn time_range_filters_inclusively() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_test_db(&dir);
        for i in 0..10 {
            db.enqueue(sample_packet(i));
        }
        db.flush();

        let start = Utc.timestamp_opt(1_700_000_003, 0).unwrap();
        let end = Utc.timestamp_opt(1_700_000_006, 999_999_000).unwrap();
        let (page, total) = db
            .query_packets(&HistoryQuery {
                limit: 100,
                start: Some(start),
                end: Some(end),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(total, 4); // seqs 3,4,5,6
        assert!(page.iter().all(|p| p.timestamp >= start && p.timestamp <= end));
        db.close();
    }

    #[test]
    fn history_stats_aggregates() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_test_db(&dir);
        for i in 0..10 {
            db.enqueue(sample_packet(i));
        }
        let mut udp = sample_packet(50);
        udp.protocol = "UDP".to_string();
        db.enqueue(udp);
        db.flush();

        let stats = db.stats(None, None).unwrap();
        assert_eq!(stats.total_packets, 11);
        assert_eq!(stats.protocol_stats["TCP"], 10);
        assert_eq!(stats.protocol_stats["UDP"], 1);
        assert!(!stats.top_talkers.is_empty());
        assert!(stats.total_bytes > 0);
        db.close();
    }

    #[test]
    fn info_reports_range_and_size() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_test_db(&dir);
        db.enqueue(sample_packet(0));
        db.enqueue(sample_packet(9));
        db.flush();

        let info = db.info().unwrap();
        assert_eq!(info.total_packets, 2);
        assert!(info.earliest_packet.unwrap() < info.latest_packet.unwrap());
        assert!(info.database_size > 0);
        db.close();
    }

    #[test]
    fn distinct_countries_sorted_union() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_test_db(&dir);
        let mut p = sample_packet(0); // src US
        p.dst_country = "FR".to_string();
        db.enqueue(p);
        db.enqueue(sample_packet(1)); // src DE
        db.flush();

        let countries = db.distinct_countries().unwrap();
        assert_eq!(countries, vec!["DE", "FR", "US"]);
        db.close();
    }

    #[test]
    fn close_performs_final_flush() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_test_db(&dir);
        for i in 0..5 {
            db.enqueue(sample_packet(i));
        }
        db.close();

        let (_, total) = db
            .query_packets(&HistoryQuery {
                limit: 10,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(total, 5);
    }

    #[test]
    fn empty_database_info() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_test_db(&dir);
        let info = db.info().unwrap();
        assert_eq!(info.total_packets, 0);
        assert!(info.earliest_packet.is_none());
        assert!(info.latest_packet.is_none());
        db.close();
    }
}
