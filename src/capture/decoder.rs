use chrono::{DateTime, Utc};
use pnet::packet::{
    arp::{ArpOperations, ArpPacket},
    ethernet::{EtherTypes, EthernetPacket},
    icmp::IcmpPacket,
    ip::{IpNextHeaderProtocol, IpNextHeaderProtocols},
    ipv4::Ipv4Packet,
    ipv6::Ipv6Packet,
    tcp::{TcpFlags, TcpPacket},
    udp::UdpPacket,
    Packet as PnetPacket,
};
use std::sync::Arc;

use crate::enrich::Enricher;
use crate::models::packet::Packet;

/// Parses raw frames into Packet records.
///
/// Decoding never blocks and never takes a store lock; the only outside
/// contact is the non-blocking IP-info snapshot at the end.
pub struct PacketDecoder {
    enricher: Arc<dyn Enricher>,
}

impl PacketDecoder {
    pub fn new(enricher: Arc<dyn Enricher>) -> Self {
        Self { enricher }
    }

    /// Decode one link-layer frame. `wire_len` is the on-wire length from
    /// the capture header, which may exceed the captured bytes.
    pub fn decode(&self, data: &[u8], timestamp: DateTime<Utc>, wire_len: usize) -> Packet {
        let mut packet = Packet::new(timestamp, wire_len);

        let eth = match EthernetPacket::new(data) {
            Some(eth) => eth,
            None => return packet,
        };
        packet.src_mac = eth.get_source().to_string();
        packet.dst_mac = eth.get_destination().to_string();

        match eth.get_ethertype() {
            EtherTypes::Ipv4 => self.decode_ipv4(eth.payload(), &mut packet),
            EtherTypes::Ipv6 => self.decode_ipv6(eth.payload(), &mut packet),
            EtherTypes::Arp => decode_arp(eth.payload(), &mut packet),
            _ => {}
        }

        if packet.application.is_empty() {
            packet.application = detect_application(packet.src_port, packet.dst_port);
        }

        let (hostname, country) = self.snapshot(&packet.src_ip);
        packet.src_hostname = hostname;
        packet.src_country = country;
        let (hostname, country) = self.snapshot(&packet.dst_ip);
        packet.dst_hostname = hostname;
        packet.dst_country = country;

        packet
    }

    fn decode_ipv4(&self, data: &[u8], packet: &mut Packet) {
        let ip = match Ipv4Packet::new(data) {
            Some(ip) => ip,
            None => return,
        };
        packet.src_ip = ip.get_source().to_string();
        packet.dst_ip = ip.get_destination().to_string();
        packet.protocol = protocol_name(ip.get_next_level_protocol());
        self.decode_transport(ip.get_next_level_protocol(), ip.payload(), packet);
    }

    fn decode_ipv6(&self, data: &[u8], packet: &mut Packet) {
        let ip = match Ipv6Packet::new(data) {
            Some(ip) => ip,
            None => return,
        };
        packet.src_ip = ip.get_source().to_string();
        packet.dst_ip = ip.get_destination().to_string();
        packet.protocol = protocol_name(ip.get_next_header());
        self.decode_transport(ip.get_next_header(), ip.payload(), packet);
    }

    fn decode_transport(&self, proto: IpNextHeaderProtocol, data: &[u8], packet: &mut Packet) {
        match proto {
            IpNextHeaderProtocols::Tcp => decode_tcp(data, packet),
            IpNextHeaderProtocols::Udp => self.decode_udp(data, packet),
            IpNextHeaderProtocols::Icmp => decode_icmp(data, packet),
            _ => {}
        }
    }

    fn decode_udp(&self, data: &[u8], packet: &mut Packet) {
        let udp = match UdpPacket::new(data) {
            Some(udp) => udp,
            None => return,
        };
        packet.src_port = udp.get_source();
        packet.dst_port = udp.get_destination();
        packet.protocol = "UDP".to_string();
        packet.info = format!(
            "{} → {} Len={}",
            udp.get_source(),
            udp.get_destination(),
            udp.get_length()
        );

        if udp.get_source() == 53 || udp.get_destination() == 53 {
            decode_dns(udp.payload(), packet);
        }
    }

    fn snapshot(&self, ip: &str) -> (String, String) {
        if ip.is_empty() {
            return (String::new(), String::new());
        }
        let info = self.enricher.lookup(ip);
        if info.is_empty() {
            self.enricher.resolve(ip);
            return (String::new(), String::new());
        }
        (info.hostname, info.country)
    }
}

fn decode_tcp(data: &[u8], packet: &mut Packet) {
    let tcp = match TcpPacket::new(data) {
        Some(tcp) => tcp,
        None => return,
    };
    packet.src_port = tcp.get_source();
    packet.dst_port = tcp.get_destination();
    packet.protocol = "TCP".to_string();

    let raw_flags = tcp.get_flags();
    let mut flags = String::new();
    if raw_flags & TcpFlags::SYN != 0 {
        flags.push_str("SYN ");
    }
    if raw_flags & TcpFlags::ACK != 0 {
        flags.push_str("ACK ");
    }
    if raw_flags & TcpFlags::FIN != 0 {
        flags.push_str("FIN ");
    }
    if raw_flags & TcpFlags::RST != 0 {
        flags.push_str("RST ");
    }
    if raw_flags & TcpFlags::PSH != 0 {
        flags.push_str("PSH ");
    }
    packet.info = format!(
        "{} → {} [{}] Seq={} Ack={} Win={}",
        tcp.get_source(),
        tcp.get_destination(),
        flags,
        tcp.get_sequence(),
        tcp.get_acknowledgement(),
        tcp.get_window()
    );
}

fn decode_icmp(data: &[u8], packet: &mut Packet) {
    let icmp = match IcmpPacket::new(data) {
        Some(icmp) => icmp,
        None => return,
    };
    packet.protocol = "ICMP".to_string();
    packet.info = format!(
        "Type={} Code={}",
        icmp.get_icmp_type().0,
        icmp.get_icmp_code().0
    );
}

fn decode_arp(data: &[u8], packet: &mut Packet) {
    let arp = match ArpPacket::new(data) {
        Some(arp) => arp,
        None => return,
    };
    packet.protocol = "ARP".to_string();
    packet.src_ip = arp.get_sender_proto_addr().to_string();
    packet.dst_ip = arp.get_target_proto_addr().to_string();
    if arp.get_operation() == ArpOperations::Request {
        packet.info = format!("Who has {}? Tell {}", packet.dst_ip, packet.src_ip);
    } else {
        packet.info = format!("{} is at {}", packet.src_ip, arp.get_sender_hw_addr());
    }
}

/// Minimal DNS header walk: enough for the question name and answer count.
fn decode_dns(payload: &[u8], packet: &mut Packet) {
    if payload.len() < 12 {
        return;
    }
    packet.application = "DNS".to_string();

    let flags = u16::from_be_bytes([payload[2], payload[3]]);
    let qd_count = u16::from_be_bytes([payload[4], payload[5]]);
    let an_count = u16::from_be_bytes([payload[6], payload[7]]);

    if flags & 0x8000 != 0 {
        packet.info = format!("DNS Response: {} answers", an_count);
    } else if qd_count > 0 {
        if let Some(name) = parse_dns_name(payload, 12) {
            packet.info = format!("DNS Query: {}", name);
        }
    }
}

fn parse_dns_name(data: &[u8], offset: usize) -> Option<String> {
    let mut name = String::new();
    let mut pos = offset;
    for _ in 0..128 {
        let len = *data.get(pos)? as usize;
        if len == 0 || len >= 0xC0 {
            break;
        }
        if !name.is_empty() {
            name.push('.');
        }
        pos += 1;
        let label = data.get(pos..pos + len)?;
        name.push_str(&String::from_utf8_lossy(label));
        pos += len;
    }
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

fn protocol_name(proto: IpNextHeaderProtocol) -> String {
    match proto {
        IpNextHeaderProtocols::Tcp => "TCP".to_string(),
        IpNextHeaderProtocols::Udp => "UDP".to_string(),
        IpNextHeaderProtocols::Icmp => "ICMP".to_string(),
        IpNextHeaderProtocols::Icmpv6 => "ICMPv6".to_string(),
        IpNextHeaderProtocols::Igmp => "IGMP".to_string(),
        IpNextHeaderProtocols::Gre => "GRE".to_string(),
        IpNextHeaderProtocols::Esp => "ESP".to_string(),
        IpNextHeaderProtocols::Ah => "AH".to_string(),
        IpNextHeaderProtocols::Sctp => "SCTP".to_string(),
        other => other.0.to_string(),
    }
}

/// Well-known port table for application detection. The source port is
/// consulted before the destination port.
fn detect_application(src_port: u16, dst_port: u16) -> String {
    for port in [src_port, dst_port] {
        let app = match port {
            20 => "FTP-Data",
            21 => "FTP",
            22 => "SSH",
            23 => "Telnet",
            25 => "SMTP",
            53 => "DNS",
            67 | 68 => "DHCP",
            80 => "HTTP",
            110 => "POP3",
            123 => "NTP",
            143 => "IMAP",
            443 => "HTTPS",
            465 => "SMTPS",
            587 => "SMTP",
            993 => "IMAPS",
            995 => "POP3S",
            1194 => "OpenVPN",
            1883 => "MQTT",
            3306 => "MySQL",
            3389 => "RDP",
            5432 => "PostgreSQL",
            5900 => "VNC",
            6379 => "Redis",
            8080 => "HTTP-Proxy",
            8443 => "HTTPS-Alt",
            8883 => "MQTT-TLS",
            27017 => "MongoDB",
            _ => "",
        };
        if !app.is_empty() {
            return app.to_string();
        }
    }
    String::new()
}
