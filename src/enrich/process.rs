use log::warn;
use netstat2::{get_sockets_info, AddressFamilyFlags, ProtocolFlags, ProtocolSocketInfo};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

/// Advisory mapping from a local port to the process bound to it.
pub trait PortResolver: Send + Sync {
    /// Returns "" when either the port or the process name is unknown.
    fn name_for_local_port(&self, port: u16) -> String;
}

const REFRESH_INTERVAL: Duration = Duration::from_secs(2);

/// Periodically snapshots the OS socket table. The port map is rebuilt from
/// scratch each cycle so stale bindings disappear; PID names persist to
/// amortize /proc reads.
pub struct ProcessTracker {
    inner: RwLock<TrackerMaps>,
}

#[derive(Default)]
struct TrackerMaps {
    port_pid: HashMap<u16, u32>,
    pid_name: HashMap<u32, String>,
}

impl ProcessTracker {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(TrackerMaps::default()),
        }
    }

    /// Launch the background refresh loop.
    pub fn spawn_refresh(self: &Arc<Self>) {
        let tracker = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(REFRESH_INTERVAL);
            loop {
                ticker.tick().await;
                let t = tracker.clone();
                let _ = tokio::task::spawn_blocking(move || t.refresh()).await;
            }
        });
    }

    /// One snapshot cycle: rebuild port->pid, resolve names for new PIDs.
    pub fn refresh(&self) {
        let af = AddressFamilyFlags::IPV4 | AddressFamilyFlags::IPV6;
        let protos = ProtocolFlags::TCP | ProtocolFlags::UDP;
        let sockets = match get_sockets_info(af, protos) {
            Ok(s) => s,
            Err(e) => {
                warn!("Failed to read socket table: {}", e);
                return;
            }
        };

        let mut port_pid = HashMap::new();
        let mut seen_pids = HashSet::new();
        for socket in sockets {
            let local_port = match &socket.protocol_socket_info {
                ProtocolSocketInfo::Tcp(tcp) => tcp.local_port,
                ProtocolSocketInfo::Udp(udp) => udp.local_port,
            };
            if local_port == 0 {
                continue;
            }
            if let Some(&pid) = socket.associated_pids.first() {
                port_pid.insert(local_port, pid);
                seen_pids.insert(pid);
            }
        }

        let mut maps = self.inner.write();
        maps.port_pid = port_pid;
        for pid in seen_pids {
            if !maps.pid_name.contains_key(&pid) {
                if let Some(name) = process_name(pid) {
                    maps.pid_name.insert(pid, name);
                }
            }
        }
    }
}

impl Default for ProcessTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl PortResolver for ProcessTracker {
    fn name_for_local_port(&self, port: u16) -> String {
        let maps = self.inner.read();
        maps.port_pid
            .get(&port)
            .and_then(|pid| maps.pid_name.get(pid))
            .cloned()
            .unwrap_or_default()
    }
}

fn process_name(pid: u32) -> Option<String> {
    if pid == 0 {
        return None;
    }
    let proc = procfs::process::Process::new(pid as i32).ok()?;
    Some(proc.stat().ok()?.comm)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker_with(port_pid: &[(u16, u32)], pid_name: &[(u32, &str)]) -> ProcessTracker {
        let tracker = ProcessTracker::new();
        {
            let mut maps = tracker.inner.write();
            maps.port_pid = port_pid.iter().copied().collect();
            maps.pid_name = pid_name
                .iter()
                .map(|(pid, name)| (*pid, name.to_string()))
                .collect();
        }
        tracker
    }

    #[test]
    fn resolves_known_port() {
        let tracker = tracker_with(&[(443, 1000)], &[(1000, "nginx")]);
        assert_eq!(tracker.name_for_local_port(443), "nginx");
    }

    #[test]
    fn unknown_port_or_pid_returns_empty() {
        let tracker = tracker_with(&[(8080, 2000)], &[(1000, "nginx")]);
        assert_eq!(tracker.name_for_local_port(22), "");
        assert_eq!(tracker.name_for_local_port(8080), "");
    }

    #[test]
    fn refresh_replaces_port_map_but_keeps_names() {
        let tracker = tracker_with(&[(443, 1000)], &[(1000, "nginx")]);
        {
            // Simulate the next snapshot observing a different binding
            let mut maps = tracker.inner.write();
            maps.port_pid = [(8443u16, 1000u32)].into_iter().collect();
        }
        assert_eq!(tracker.name_for_local_port(443), "");
        assert_eq!(tracker.name_for_local_port(8443), "nginx");
    }
}
