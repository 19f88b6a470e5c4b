//! NAT core: per-flow endpoint mappings, external-port allocation, the
//! unsolicited-SYN quarantine queue, and the reaper that expires all
//! of the above.
//!
//! Unlike some early reference implementations of this design, mapping
//! insertion and direction classification are both fully implemented
//! here rather than stubbed: the external interface is whatever
//! [`NatConfig::external_iface`] names, not a hardcoded interface.

use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::net::icmp::{unreachable_code, IcmpMessage, IcmpType};
use crate::net::ipv4::{self, Ipv4Header};
use crate::net::tcp::{self, TcpHeader};
use crate::router::icmp_emitter;
use crate::router::interface::InterfaceTable;
use crate::router::link::LinkLayer;
use crate::router::routing_table::RoutingTable;

/// First external port handed out by the allocator.
const PORT_RANGE_START: u16 = 1024;
/// A quarantined SYN past this age gets an ICMP port-unreachable.
const SYN_QUARANTINE_TIMEOUT: Duration = Duration::from_secs(6);
const REAPER_TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MappingType {
    Icmp,
    Tcp,
}

impl MappingType {
    fn of_protocol(protocol: u8) -> Option<Self> {
        match protocol {
            ipv4::protocol::ICMP => Some(MappingType::Icmp),
            ipv4::protocol::TCP => Some(MappingType::Tcp),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Incoming,
    Outgoing,
    NotCrossing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Established,
    Transitory,
}

#[derive(Debug, Clone)]
pub struct TcpConnection {
    pub remote_ip: Ipv4Addr,
    pub remote_port: u16,
    pub state: ConnState,
    pub last_updated: Instant,
}

#[derive(Debug, Clone)]
pub struct NatMapping {
    pub mapping_type: MappingType,
    pub ip_int: Ipv4Addr,
    pub aux_int: u16,
    pub ip_ext: Ipv4Addr,
    pub aux_ext: u16,
    pub last_updated: Instant,
    pub connections: Vec<TcpConnection>,
}

#[derive(Debug, Clone)]
struct PendingSyn {
    ip_src: Ipv4Addr,
    port_src: u16,
    arrived_at: Instant,
    src_mac: [u8; 6],
    /// First `ICMP_DATA_SIZE` bytes of the datagram, starting at its IP
    /// header, saved so the reaper can build a port-unreachable without
    /// keeping the whole original frame around.
    ip_and_body: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranslateOutcome {
    /// Didn't cross the NAT boundary; forward unmodified.
    PassThrough,
    /// Rewritten in place; forward as usual.
    Translated,
    /// Drop (unsupported protocol crossing the boundary, or the packet
    /// was a SYN that just got quarantined).
    Drop,
}

pub struct NatConfig {
    pub external_iface: String,
    pub icmp_idle: Duration,
    pub tcp_established_idle: Duration,
    pub tcp_transitory_idle: Duration,
}

impl NatConfig {
    pub fn new(external_iface: String) -> Self {
        Self {
            external_iface,
            icmp_idle: Duration::from_secs(60),
            tcp_established_idle: Duration::from_secs(7440),
            tcp_transitory_idle: Duration::from_secs(300),
        }
    }
}

struct Inner {
    mappings: Vec<NatMapping>,
    next_port: u16,
    syn_quarantine: Vec<PendingSyn>,
}

pub struct NatTable {
    inner: Mutex<Inner>,
    config: NatConfig,
}

impl NatTable {
    pub fn new(config: NatConfig) -> Self {
        Self {
            inner: Mutex::new(Inner { mappings: Vec::new(), next_port: PORT_RANGE_START, syn_quarantine: Vec::new() }),
            config,
        }
    }

    pub fn external_iface(&self) -> &str {
        &self.config.external_iface
    }

    pub fn lookup_external(&self, aux_ext: u16, mapping_type: MappingType) -> Option<NatMapping> {
        let mut inner = self.inner.lock().unwrap();
        let now = Instant::now();
        let m = inner.mappings.iter_mut().find(|m| m.mapping_type == mapping_type && m.aux_ext == aux_ext)?;
        m.last_updated = now;
        Some(m.clone())
    }

    pub fn lookup_internal(&self, ip_int: Ipv4Addr, aux_int: u16, mapping_type: MappingType) -> Option<NatMapping> {
        let mut inner = self.inner.lock().unwrap();
        let now = Instant::now();
        let m = inner
            .mappings
            .iter_mut()
            .find(|m| m.mapping_type == mapping_type && m.ip_int == ip_int && m.aux_int == aux_int)?;
        m.last_updated = now;
        Some(m.clone())
    }

    /// Create a mapping for `(mapping_type, ip_int, aux_int)`, allocating
    /// the next free external port/ICMP id for this mapping type.
    pub fn insert(&self, mapping_type: MappingType, ip_int: Ipv4Addr, aux_int: u16, ip_ext: Ipv4Addr) -> NatMapping {
        let mut inner = self.inner.lock().unwrap();
        let aux_ext = allocate_port(&mut inner, mapping_type);
        let mapping = NatMapping {
            mapping_type,
            ip_int,
            aux_int,
            ip_ext,
            aux_ext,
            last_updated: Instant::now(),
            connections: Vec::new(),
        };
        tracing::debug!(?mapping_type, %ip_int, aux_int, %ip_ext, aux_ext, "nat: new mapping");
        inner.mappings.push(mapping.clone());
        mapping
    }

    fn is_internal_route(routing_table: &RoutingTable, external_iface: &str, ip: Ipv4Addr) -> bool {
        match routing_table.lookup(ip) {
            Some(entry) => entry.iface != external_iface,
            None => false,
        }
    }

    /// Classify an IPv4 datagram's direction relative to the NAT
    /// boundary.
    pub fn classify_direction(
        &self,
        interfaces: &InterfaceTable,
        routing_table: &RoutingTable,
        src_ip: Ipv4Addr,
        dst_ip: Ipv4Addr,
    ) -> Direction {
        let Some(external) = interfaces.get(&self.config.external_iface) else {
            return Direction::NotCrossing;
        };
        let src_internal = Self::is_internal_route(routing_table, &self.config.external_iface, src_ip);
        let dst_internal = Self::is_internal_route(routing_table, &self.config.external_iface, dst_ip);

        if !src_internal && dst_ip == external.ipv4 {
            Direction::Incoming
        } else if src_internal && !dst_internal {
            Direction::Outgoing
        } else {
            Direction::NotCrossing
        }
    }

    /// Rewrite `frame` in place for NAT. `frame` is a full Ethernet
    /// frame; only the IPv4 header and L4 segment are touched.
    pub fn translate(&self, frame: &mut [u8], interfaces: &InterfaceTable, routing_table: &RoutingTable) -> TranslateOutcome {
        use crate::net::ethernet;

        let ip_off = ethernet::HEADER_SIZE;
        let Ok(ip_header) = Ipv4Header::from_bytes(&frame[ip_off..]) else { return TranslateOutcome::Drop };

        let direction = self.classify_direction(interfaces, routing_table, ip_header.src_ip, ip_header.dest_ip);
        if direction == Direction::NotCrossing {
            return TranslateOutcome::PassThrough;
        }

        let Some(mapping_type) = MappingType::of_protocol(ip_header.protocol) else {
            tracing::debug!(protocol = ip_header.protocol, "nat: unsupported protocol crossing boundary, dropping");
            return TranslateOutcome::Drop;
        };

        let l4_off = ip_off + ipv4::HEADER_SIZE;
        let Some(external) = interfaces.get(&self.config.external_iface) else { return TranslateOutcome::Drop };
        let external_ip = external.ipv4;

        match direction {
            Direction::Outgoing => self.translate_outgoing(frame, ip_off, l4_off, mapping_type, external_ip, ip_header),
            Direction::Incoming => self.translate_incoming(frame, ip_off, l4_off, mapping_type, ip_header),
            Direction::NotCrossing => unreachable!(),
        }
    }

    fn translate_outgoing(
        &self,
        frame: &mut [u8],
        ip_off: usize,
        l4_off: usize,
        mapping_type: MappingType,
        external_ip: Ipv4Addr,
        ip_header: Ipv4Header,
    ) -> TranslateOutcome {
        let aux_int = match mapping_type {
            MappingType::Tcp => {
                let Ok(tcp) = TcpHeader::from_bytes(&frame[l4_off..]) else { return TranslateOutcome::Drop };
                tcp.src_port
            }
            MappingType::Icmp => {
                let Ok(icmp) = IcmpMessage::from_bytes(&frame[l4_off..]) else { return TranslateOutcome::Drop };
                icmp.identifier()
            }
        };

        let mapping = match self.lookup_internal(ip_header.src_ip, aux_int, mapping_type) {
            Some(m) => m,
            None => {
                let created = self.insert(mapping_type, ip_header.src_ip, aux_int, external_ip);
                if mapping_type == MappingType::Tcp {
                    if let Ok(tcp) = TcpHeader::from_bytes(&frame[l4_off..]) {
                        if tcp.is_syn_only() {
                            self.consume_quarantine(ip_header.dest_ip, tcp.dest_port);
                        }
                    }
                }
                created
            }
        };

        if mapping_type == MappingType::Tcp {
            if let Ok(tcp) = TcpHeader::from_bytes(&frame[l4_off..]) {
                self.touch_connection(mapping_type, mapping.ip_int, mapping.aux_int, ip_header.dest_ip, tcp.dest_port, &tcp);
            }
        }

        rewrite_source(frame, ip_off, l4_off, mapping_type, mapping.ip_ext, mapping.aux_ext);
        TranslateOutcome::Translated
    }

    fn translate_incoming(
        &self,
        frame: &mut [u8],
        ip_off: usize,
        l4_off: usize,
        mapping_type: MappingType,
        ip_header: Ipv4Header,
    ) -> TranslateOutcome {
        let aux_ext = match mapping_type {
            MappingType::Tcp => {
                let Ok(tcp) = TcpHeader::from_bytes(&frame[l4_off..]) else { return TranslateOutcome::Drop };
                tcp.dest_port
            }
            MappingType::Icmp => {
                let Ok(icmp) = IcmpMessage::from_bytes(&frame[l4_off..]) else { return TranslateOutcome::Drop };
                icmp.identifier()
            }
        };

        let mapping = match self.lookup_external(aux_ext, mapping_type) {
            Some(m) => m,
            None => {
                return match mapping_type {
                    MappingType::Icmp => TranslateOutcome::PassThrough,
                    MappingType::Tcp => {
                        let Ok(tcp) = TcpHeader::from_bytes(&frame[l4_off..]) else { return TranslateOutcome::Drop };
                        if tcp.is_syn_only() {
                            self.quarantine_syn(ip_header.src_ip, tcp.src_port, frame, ip_off);
                        }
                        TranslateOutcome::Drop
                    }
                };
            }
        };

        if mapping_type == MappingType::Tcp {
            if let Ok(tcp) = TcpHeader::from_bytes(&frame[l4_off..]) {
                self.touch_connection(mapping_type, mapping.ip_int, mapping.aux_int, ip_header.src_ip, tcp.src_port, &tcp);
            }
        }

        rewrite_dest(frame, ip_off, l4_off, mapping_type, mapping.ip_int, mapping.aux_int);
        TranslateOutcome::Translated
    }

    fn touch_connection(
        &self,
        mapping_type: MappingType,
        ip_int: Ipv4Addr,
        aux_int: u16,
        remote_ip: Ipv4Addr,
        remote_port: u16,
        tcp: &TcpHeader,
    ) {
        let mut inner = self.inner.lock().unwrap();
        let Some(mapping) = inner
            .mappings
            .iter_mut()
            .find(|m| m.mapping_type == mapping_type && m.ip_int == ip_int && m.aux_int == aux_int)
        else {
            return;
        };
        let now = Instant::now();
        mapping.last_updated = now;
        let established = tcp.has_flag(tcp::flags::ACK) && !tcp.has_flag(tcp::flags::SYN);
        match mapping.connections.iter_mut().find(|c| c.remote_ip == remote_ip && c.remote_port == remote_port) {
            Some(conn) => {
                conn.last_updated = now;
                if established {
                    conn.state = ConnState::Established;
                }
            }
            None => mapping.connections.push(TcpConnection {
                remote_ip,
                remote_port,
                state: if established { ConnState::Established } else { ConnState::Transitory },
                last_updated: now,
            }),
        }
    }

    fn consume_quarantine(&self, remote_ip: Ipv4Addr, remote_port: u16) {
        let mut inner = self.inner.lock().unwrap();
        let before = inner.syn_quarantine.len();
        inner.syn_quarantine.retain(|p| !(p.ip_src == remote_ip && p.port_src == remote_port));
        if inner.syn_quarantine.len() < before {
            tracing::debug!(%remote_ip, remote_port, "nat: simultaneous open, dropping quarantine entry silently");
        }
    }

    fn quarantine_syn(&self, ip_src: Ipv4Addr, port_src: u16, frame: &[u8], ip_off: usize) {
        let mut inner = self.inner.lock().unwrap();
        if inner.syn_quarantine.iter().any(|p| p.ip_src == ip_src && p.port_src == port_src) {
            return;
        }
        let mut src_mac = [0u8; 6];
        src_mac.copy_from_slice(&frame[6..12]);
        let take = (frame.len() - ip_off).min(crate::net::icmp::ERROR_DATA_SIZE);
        tracing::debug!(%ip_src, port_src, "nat: quarantining unsolicited syn");
        inner.syn_quarantine.push(PendingSyn {
            ip_src,
            port_src,
            arrived_at: Instant::now(),
            src_mac,
            ip_and_body: frame[ip_off..ip_off + take].to_vec(),
        });
    }

    /// Run one reaper tick: expire idle mappings/connections and flush
    /// quarantined SYNs that outlived their grace window.
    pub fn reap(&self, interfaces: &InterfaceTable, link: &dyn LinkLayer) {
        let expired_syns = {
            let mut inner = self.inner.lock().unwrap();
            let now = Instant::now();

            inner.mappings.retain_mut(|m| match m.mapping_type {
                MappingType::Icmp => now.duration_since(m.last_updated) <= self.config.icmp_idle,
                MappingType::Tcp => {
                    m.connections.retain(|c| match c.state {
                        ConnState::Established => now.duration_since(c.last_updated) <= self.config.tcp_established_idle,
                        ConnState::Transitory => now.duration_since(c.last_updated) <= self.config.tcp_transitory_idle,
                    });
                    !m.connections.is_empty()
                }
            });

            let mut expired = Vec::new();
            inner.syn_quarantine.retain(|p| {
                if now.duration_since(p.arrived_at) > SYN_QUARANTINE_TIMEOUT {
                    expired.push(p.clone());
                    false
                } else {
                    true
                }
            });
            expired
        };

        for syn in expired_syns {
            tracing::debug!(ip_src = %syn.ip_src, port_src = syn.port_src, "nat: quarantined syn timed out, sending port-unreachable");
            icmp_emitter::send_error(
                interfaces,
                link,
                IcmpType::DestinationUnreachable,
                unreachable_code::PORT,
                syn.src_mac,
                &syn.ip_and_body,
                &self.config.external_iface,
            );
        }
    }

    pub fn spawn_reaper(self: &Arc<Self>, interfaces: Arc<InterfaceTable>, link: Arc<dyn LinkLayer>) -> JoinHandle<()> {
        let weak: Weak<NatTable> = Arc::downgrade(self);
        thread::spawn(move || loop {
            thread::sleep(REAPER_TICK);
            let Some(nat) = weak.upgrade() else { break };
            nat.reap(&interfaces, &*link);
        })
    }
}

fn allocate_port(inner: &mut Inner, mapping_type: MappingType) -> u16 {
    let start = inner.next_port;
    loop {
        let candidate = inner.next_port;
        inner.next_port = if inner.next_port == u16::MAX { PORT_RANGE_START } else { inner.next_port + 1 };
        let in_use = inner.mappings.iter().any(|m| m.mapping_type == mapping_type && m.aux_ext == candidate);
        if !in_use {
            return candidate;
        }
        if inner.next_port == start {
            tracing::warn!(?mapping_type, "nat: port space exhausted, reusing in-use port");
            return candidate;
        }
    }
}

/// Overwrite the IP/L4 source with `(new_ip, new_aux)` and recompute
/// checksums. The L4 checksum is recomputed over the L4 segment alone,
/// omitting the IPv4 pseudo-header — a known, intentionally reproduced
/// non-conformance with RFC 793 §3.1 rather than a silent fix.
fn rewrite_source(frame: &mut [u8], ip_off: usize, l4_off: usize, mapping_type: MappingType, new_ip: Ipv4Addr, new_aux: u16) {
    rewrite_ip(frame, ip_off, new_ip, true);
    match mapping_type {
        MappingType::Tcp => TcpHeader::rewrite_port_in_place(&mut frame[l4_off..], new_aux, true),
        MappingType::Icmp => crate::net::icmp::rewrite_identifier_in_place(&mut frame[l4_off..], new_aux),
    }
}

fn rewrite_dest(frame: &mut [u8], ip_off: usize, l4_off: usize, mapping_type: MappingType, new_ip: Ipv4Addr, new_aux: u16) {
    rewrite_ip(frame, ip_off, new_ip, false);
    match mapping_type {
        MappingType::Tcp => TcpHeader::rewrite_port_in_place(&mut frame[l4_off..], new_aux, false),
        MappingType::Icmp => crate::net::icmp::rewrite_identifier_in_place(&mut frame[l4_off..], new_aux),
    }
}

fn rewrite_ip(frame: &mut [u8], ip_off: usize, new_ip: Ipv4Addr, is_source: bool) {
    let offset = ip_off + if is_source { 12 } else { 16 };
    frame[offset..offset + 4].copy_from_slice(&new_ip.octets());
    frame[ip_off + 10] = 0;
    frame[ip_off + 11] = 0;
    let checksum = ipv4::internet_checksum(&frame[ip_off..ip_off + ipv4::HEADER_SIZE]);
    frame[ip_off + 10..ip_off + 12].copy_from_slice(&checksum.to_be_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::ethernet;
    use crate::router::interface::Interface;
    use crate::router::link::MockLink;
    use crate::router::routing_table::RoutingEntry;

    fn interfaces() -> InterfaceTable {
        let mut t = InterfaceTable::new();
        t.insert(
            "eth0".into(),
            Interface { mac: [0xaa; 6], ipv4: "10.0.1.1".parse().unwrap(), mask: "255.255.255.0".parse().unwrap() },
        );
        t.insert(
            "eth1".into(),
            Interface { mac: [0xcc; 6], ipv4: "172.64.3.2".parse().unwrap(), mask: "255.255.255.0".parse().unwrap() },
        );
        t
    }

    fn routing_table() -> RoutingTable {
        let mut rt = RoutingTable::new();
        rt.push(RoutingEntry {
            destination: "10.0.1.0".parse().unwrap(),
            mask: "255.255.255.0".parse().unwrap(),
            gateway: "10.0.1.1".parse().unwrap(),
            iface: "eth0".into(),
        });
        rt.push(RoutingEntry {
            destination: "0.0.0.0".parse().unwrap(),
            mask: "0.0.0.0".parse().unwrap(),
            gateway: "172.64.3.1".parse().unwrap(),
            iface: "eth1".into(),
        });
        rt
    }

    fn icmp_echo_frame(src: Ipv4Addr, dst: Ipv4Addr, id: u16) -> Vec<u8> {
        let icmp = IcmpMessage {
            icmp_type: crate::net::icmp::IcmpType::EchoRequest,
            code: 0,
            rest: {
                let mut r = id.to_be_bytes().to_vec();
                r.extend_from_slice(&1u16.to_be_bytes());
                r
            },
        };
        let icmp_bytes = icmp.to_bytes();
        let ip = Ipv4Header::new(src, dst, ipv4::protocol::ICMP, icmp_bytes.len() as u16);
        let mut payload = ip.to_bytes();
        payload.extend_from_slice(&icmp_bytes);
        ethernet::build([0; 6], [0xbb; 6], ethernet::ETHERTYPE_IPV4, &payload)
    }

    fn tcp_frame(src: Ipv4Addr, dst: Ipv4Addr, src_port: u16, dst_port: u16, flags: u8) -> Vec<u8> {
        let mut tcp = vec![0u8; tcp::HEADER_SIZE];
        tcp[0..2].copy_from_slice(&src_port.to_be_bytes());
        tcp[2..4].copy_from_slice(&dst_port.to_be_bytes());
        tcp[12] = 5 << 4;
        tcp[13] = flags;
        let checksum = ipv4::internet_checksum(&tcp);
        tcp[16..18].copy_from_slice(&checksum.to_be_bytes());

        let ip = Ipv4Header::new(src, dst, ipv4::protocol::TCP, tcp.len() as u16);
        let mut payload = ip.to_bytes();
        payload.extend_from_slice(&tcp);
        ethernet::build([0; 6], [0xbb; 6], ethernet::ETHERTYPE_IPV4, &payload)
    }

    #[test]
    fn classifies_outgoing_and_incoming() {
        let interfaces = interfaces();
        let routing_table = routing_table();
        let nat = NatTable::new(NatConfig::new("eth1".into()));

        assert_eq!(
            nat.classify_direction(&interfaces, &routing_table, "10.0.1.9".parse().unwrap(), "8.8.8.8".parse().unwrap()),
            Direction::Outgoing
        );
        assert_eq!(
            nat.classify_direction(&interfaces, &routing_table, "8.8.8.8".parse().unwrap(), "172.64.3.2".parse().unwrap()),
            Direction::Incoming
        );
        assert_eq!(
            nat.classify_direction(&interfaces, &routing_table, "10.0.1.9".parse().unwrap(), "10.0.1.5".parse().unwrap()),
            Direction::NotCrossing
        );
    }

    #[test]
    fn outgoing_icmp_is_translated_and_reversible() {
        let interfaces = interfaces();
        let routing_table = routing_table();
        let nat = NatTable::new(NatConfig::new("eth1".into()));

        let mut frame = icmp_echo_frame("10.0.1.9".parse().unwrap(), "8.8.8.8".parse().unwrap(), 0x1234);
        let outcome = nat.translate(&mut frame, &interfaces, &routing_table);
        assert_eq!(outcome, TranslateOutcome::Translated);

        let ip = Ipv4Header::from_bytes(&frame[ethernet::HEADER_SIZE..]).unwrap();
        assert_eq!(ip.src_ip, "172.64.3.2".parse::<Ipv4Addr>().unwrap());
        let icmp = IcmpMessage::from_bytes(&frame[ethernet::HEADER_SIZE + ipv4::HEADER_SIZE..]).unwrap();
        let aux_ext = icmp.identifier();
        assert!(aux_ext >= PORT_RANGE_START);

        // A reply arriving on the external interface reverses exactly.
        let mut reply = icmp_echo_frame("8.8.8.8".parse().unwrap(), "172.64.3.2".parse().unwrap(), aux_ext);
        let outcome = nat.translate(&mut reply, &interfaces, &routing_table);
        assert_eq!(outcome, TranslateOutcome::Translated);
        let reply_ip = Ipv4Header::from_bytes(&reply[ethernet::HEADER_SIZE..]).unwrap();
        assert_eq!(reply_ip.dest_ip, "10.0.1.9".parse::<Ipv4Addr>().unwrap());
        let reply_icmp = IcmpMessage::from_bytes(&reply[ethernet::HEADER_SIZE + ipv4::HEADER_SIZE..]).unwrap();
        assert_eq!(reply_icmp.identifier(), 0x1234);
    }

    #[test]
    fn aux_ext_is_unique_per_mapping_type() {
        let interfaces = interfaces();
        let routing_table = routing_table();
        let nat = NatTable::new(NatConfig::new("eth1".into()));

        let mut f1 = icmp_echo_frame("10.0.1.9".parse().unwrap(), "8.8.8.8".parse().unwrap(), 1);
        let mut f2 = icmp_echo_frame("10.0.1.10".parse().unwrap(), "8.8.8.8".parse().unwrap(), 1);
        nat.translate(&mut f1, &interfaces, &routing_table);
        nat.translate(&mut f2, &interfaces, &routing_table);

        let id1 = IcmpMessage::from_bytes(&f1[ethernet::HEADER_SIZE + ipv4::HEADER_SIZE..]).unwrap().identifier();
        let id2 = IcmpMessage::from_bytes(&f2[ethernet::HEADER_SIZE + ipv4::HEADER_SIZE..]).unwrap().identifier();
        assert_ne!(id1, id2);
    }

    #[test]
    fn unsolicited_syn_is_quarantined_then_resolved_by_simultaneous_open() {
        let interfaces = interfaces();
        let routing_table = routing_table();
        let nat = NatTable::new(NatConfig::new("eth1".into()));

        let mut incoming_syn =
            tcp_frame("203.0.113.5".parse().unwrap(), "172.64.3.2".parse().unwrap(), 4444, 9000, tcp::flags::SYN);
        let outcome = nat.translate(&mut incoming_syn, &interfaces, &routing_table);
        assert_eq!(outcome, TranslateOutcome::Drop);
        {
            let inner = nat.inner.lock().unwrap();
            assert_eq!(inner.syn_quarantine.len(), 1);
        }

        let mut outgoing_syn =
            tcp_frame("10.0.1.9".parse().unwrap(), "203.0.113.5".parse().unwrap(), 5555, 4444, tcp::flags::SYN);
        let outcome = nat.translate(&mut outgoing_syn, &interfaces, &routing_table);
        assert_eq!(outcome, TranslateOutcome::Translated);

        let inner = nat.inner.lock().unwrap();
        assert!(inner.syn_quarantine.is_empty());
    }

    #[test]
    fn quarantine_reaper_sends_port_unreachable_after_timeout() {
        let interfaces = interfaces();
        let routing_table = routing_table();
        let link = MockLink::new();
        let nat = NatTable::new(NatConfig::new("eth1".into()));

        let mut incoming_syn =
            tcp_frame("203.0.113.5".parse().unwrap(), "172.64.3.2".parse().unwrap(), 4444, 9000, tcp::flags::SYN);
        nat.translate(&mut incoming_syn, &interfaces, &routing_table);

        {
            let mut inner = nat.inner.lock().unwrap();
            inner.syn_quarantine[0].arrived_at = Instant::now() - SYN_QUARANTINE_TIMEOUT - Duration::from_secs(1);
        }
        nat.reap(&interfaces, &link);

        let sent = link.take_sent();
        assert_eq!(sent.len(), 1);
        let ip = Ipv4Header::from_bytes(&sent[0].1[ethernet::HEADER_SIZE..]).unwrap();
        assert_eq!(ip.dest_ip, "203.0.113.5".parse::<Ipv4Addr>().unwrap());
        let icmp = IcmpMessage::from_bytes(&sent[0].1[ethernet::HEADER_SIZE + ipv4::HEADER_SIZE..]).unwrap();
        assert_eq!(icmp.icmp_type, crate::net::icmp::IcmpType::DestinationUnreachable);
        assert_eq!(icmp.code, unreachable_code::PORT);
    }

    #[test]
    fn unsupported_protocol_crossing_boundary_is_dropped() {
        let interfaces = interfaces();
        let routing_table = routing_table();
        let nat = NatTable::new(NatConfig::new("eth1".into()));

        let ip = Ipv4Header::new("10.0.1.9".parse().unwrap(), "8.8.8.8".parse().unwrap(), ipv4::protocol::UDP, 8);
        let mut payload = ip.to_bytes();
        payload.extend_from_slice(&[0u8; 8]);
        let mut frame = ethernet::build([0; 6], [0xbb; 6], ethernet::ETHERTYPE_IPV4, &payload);

        assert_eq!(nat.translate(&mut frame, &interfaces, &routing_table), TranslateOutcome::Drop);
    }

    #[test]
    fn not_crossing_traffic_passes_through_unmodified() {
        let interfaces = interfaces();
        let routing_table = routing_table();
        let nat = NatTable::new(NatConfig::new("eth1".into()));

        let mut frame = icmp_echo_frame("10.0.1.9".parse().unwrap(), "10.0.1.5".parse().unwrap(), 7);
        let before = frame.clone();
        assert_eq!(nat.translate(&mut frame, &interfaces, &routing_table), TranslateOutcome::PassThrough);
        assert_eq!(frame, before);
    }
}
