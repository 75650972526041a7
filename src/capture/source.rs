use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use log::{error, info, warn};
use pcap::{Active, Capture, Device};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::broadcast::Broadcaster;
use crate::capture::decoder::PacketDecoder;
use crate::enrich::{Enricher, PortResolver};
use crate::store::{Database, PacketStore};

const SNAPLEN: i32 = 65535;
const READ_TIMEOUT_MS: i32 = 1000;
const CHANNEL_CAPACITY: usize = 1024;
const MAX_CONSECUTIVE_ERRORS: u32 = 5;

/// One captured frame: bytes, wall-clock timestamp, on-wire length.
type RawFrame = (Vec<u8>, DateTime<Utc>, usize);

/// Pick the capture device: the named one when given, otherwise the first
/// non-loopback device with an address.
pub fn resolve_interface(requested: Option<&str>) -> Result<String> {
    let devices = Device::list()?;
    if let Some(name) = requested {
        if devices.iter().any(|d| d.name == name) {
            return Ok(name.to_string());
        }
        return Err(anyhow!("Interface {} not found", name));
    }

    for device in &devices {
        if device
            .addresses
            .iter()
            .any(|addr| !addr.addr.is_loopback())
        {
            return Ok(device.name.clone());
        }
    }
    devices
        .first()
        .map(|d| d.name.clone())
        .ok_or_else(|| anyhow!("No capture devices found"))
}

/// Open the live capture. Permission failures surface here, before any
/// background task starts.
pub fn open_capture(interface: &str) -> Result<Capture<Active>> {
    let capture = Capture::from_device(interface)?
        .promisc(true)
        .snaplen(SNAPLEN)
        .timeout(READ_TIMEOUT_MS)
        .open()
        .map_err(|e| anyhow!("Failed to open capture on {}: {}", interface, e))?;
    Ok(capture)
}

/// Wire the capture to the rest of the system: a dedicated OS thread runs
/// the blocking pcap loop, an async task decodes and fans the packets in.
pub fn spawn_pipeline(
    capture: Capture<Active>,
    store: Arc<PacketStore>,
    db: Option<Arc<Database>>,
    broadcaster: Arc<Broadcaster>,
    enricher: Arc<dyn Enricher>,
    ports: Arc<dyn PortResolver>,
) {
    let (tx, mut rx) = mpsc::channel::<RawFrame>(CHANNEL_CAPACITY);

    if let Err(e) = std::thread::Builder::new()
        .name("pitrack-capture".to_string())
        .spawn(move || run_capture(capture, tx))
    {
        error!("Failed to start capture thread: {}", e);
        return;
    }

    tokio::spawn(async move {
        let decoder = PacketDecoder::new(enricher);
        while let Some((data, timestamp, wire_len)) = rx.recv().await {
            let mut packet = decoder.decode(&data, timestamp, wire_len);

            if packet.src_port > 0 {
                packet.process_name = ports.name_for_local_port(packet.src_port);
            }
            if packet.process_name.is_empty() && packet.dst_port > 0 {
                packet.process_name = ports.name_for_local_port(packet.dst_port);
            }

            packet.id = store.add(packet.clone());

            if let Some(db) = &db {
                db.enqueue(packet.clone());
            }
            broadcaster.broadcast("packet", &packet);
        }
        info!("Packet pipeline stopped");
    });
}

fn run_capture(mut capture: Capture<Active>, tx: mpsc::Sender<RawFrame>) {
    let mut consecutive_errors: u32 = 0;
    loop {
        match capture.next_packet() {
            Ok(captured) => {
                consecutive_errors = 0;
                if captured.data.is_empty() {
                    continue;
                }
                let frame = (
                    captured.data.to_vec(),
                    Utc::now(),
                    captured.header.len as usize,
                );
                if tx.blocking_send(frame).is_err() {
                    break;
                }
            }
            Err(pcap::Error::TimeoutExpired) => continue,
            Err(e) => {
                warn!("Capture error: {}", e);
                consecutive_errors += 1;
                if consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                    error!("Too many consecutive capture errors, stopping capture");
                    break;
                }
                std::thread::sleep(Duration::from_millis(100));
            }
        }
    }
    info!("Capture loop stopped");
}
