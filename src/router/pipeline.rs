//! Forwarding pipeline: the single entry point from the link layer.
//! Classifies on EtherType and orchestrates every other subsystem
//! (ARP cache, emitters, NAT, routing table).

use std::sync::Arc;

use crate::net::arp::ArpPacket;
use crate::net::ethernet::{self, EthernetFrame};
use crate::net::icmp::{unreachable_code, time_exceeded_code, IcmpMessage, IcmpType};
use crate::net::ipv4::{self, Ipv4Header};
use crate::router::arp_cache::ArpCache;
use crate::router::interface::InterfaceTable;
use crate::router::link::LinkLayer;
use crate::router::nat::{Direction, NatTable, TranslateOutcome};
use crate::router::routing_table::RoutingTable;
use crate::router::{arp_emitter, icmp_emitter, sanity};

/// Ties interface/routing tables, ARP cache, NAT, and a [`LinkLayer`]
/// together into the one call the link layer drives: [`Pipeline::handle`].
pub struct Pipeline {
    interfaces: Arc<InterfaceTable>,
    routing_table: Arc<RoutingTable>,
    arp_cache: Arc<ArpCache>,
    nat: Option<Arc<NatTable>>,
    link: Arc<dyn LinkLayer>,
}

impl Pipeline {
    pub fn new(
        interfaces: Arc<InterfaceTable>,
        routing_table: Arc<RoutingTable>,
        arp_cache: Arc<ArpCache>,
        nat: Option<Arc<NatTable>>,
        link: Arc<dyn LinkLayer>,
    ) -> Self {
        Self { interfaces, routing_table, arp_cache, nat, link }
    }

    /// Entry point from the link layer's `receive` callback. `len` may
    /// be smaller than `frame.len()` if the caller's buffer is
    /// over-allocated; only the first `len` bytes are processed.
    pub fn handle(&self, frame: &[u8], len: usize, iface: &str) {
        let frame = &frame[..len.min(frame.len())];
        let Ok(eth) = EthernetFrame::from_bytes(frame) else { return };

        match eth.ethertype {
            ethernet::ETHERTYPE_ARP => self.handle_arp(frame, &eth, iface),
            ethernet::ETHERTYPE_IPV4 => self.handle_ipv4(frame, iface),
            other => tracing::trace!(ethertype = format!("{other:#06x}"), iface, "ignoring unsupported ethertype"),
        }
    }

    fn handle_arp(&self, frame: &[u8], eth: &EthernetFrame<'_>, iface: &str) {
        let Ok(arp) = ArpPacket::from_bytes(eth.payload) else { return };

        if !(sanity::is_broadcast_mac(&eth.dest_mac) || self.interfaces.is_own_ip(arp.target_ip)) {
            tracing::trace!(target = %arp.target_ip, "ignoring arp packet not addressed to us");
            return;
        }

        let drained = self.arp_cache.insert(arp.sender_ip, arp.sender_mac);
        if !drained.is_empty() {
            match self.routing_table.lookup(arp.sender_ip) {
                Some(route) => {
                    let out_iface = route.iface.clone();
                    for pkt in drained {
                        let bytes = pkt.frame[..pkt.len.min(pkt.frame.len())].to_vec();
                        self.send_resolved(&out_iface, arp.sender_mac, bytes);
                    }
                }
                None => tracing::warn!(target = %arp.sender_ip, "arp resolved but no route for its queued packets"),
            }
        }

        if arp.is_request() {
            arp_emitter::reply(&self.interfaces, &*self.link, frame, iface);
        }
    }

    fn handle_ipv4(&self, frame: &[u8], iface: &str) {
        if frame.len() < ethernet::HEADER_SIZE + ipv4::HEADER_SIZE {
            return;
        }
        let Ok(ip_header) = Ipv4Header::from_bytes(&frame[ethernet::HEADER_SIZE..]) else { return };

        if self.is_addressed_to_router(&ip_header) {
            self.deliver_local(frame, iface);
        } else {
            self.forward(frame, iface);
        }
    }

    /// Whether `ip_header` should take the local-delivery branch rather
    /// than `forward`. Plain `interfaces.is_own_ip` would also catch NAT
    /// reply traffic addressed to the external interface's own IP,
    /// short-circuiting it before NAT ever translates it back to the
    /// internal host. Such traffic is excluded here whenever NAT's own
    /// classifier would call it `Incoming`, so it reaches `forward`'s
    /// translate step instead.
    fn is_addressed_to_router(&self, ip_header: &Ipv4Header) -> bool {
        if !self.interfaces.is_own_ip(ip_header.dest_ip) {
            return false;
        }
        match &self.nat {
            Some(nat) => {
                nat.classify_direction(&self.interfaces, &self.routing_table, ip_header.src_ip, ip_header.dest_ip)
                    != Direction::Incoming
            }
            None => true,
        }
    }

    /// Local delivery. TTL is decremented unconditionally before
    /// branching on protocol — reproduced rather than "fixed": a
    /// TCP/UDP packet addressed to the router with TTL=1 yields
    /// time-exceeded, not port-unreachable.
    fn deliver_local(&self, frame: &[u8], iface: &str) {
        if !sanity::is_sane_ip_packet(frame) {
            tracing::debug!(iface, "dropping insane ip packet addressed to us");
            return;
        }
        let ip_off = ethernet::HEADER_SIZE;
        let mut owned = frame.to_vec();
        let new_ttl = decrement_ttl_in_place(&mut owned, ip_off);
        let Ok(ip_header) = Ipv4Header::from_bytes(&owned[ip_off..]) else { return };

        match ip_header.protocol {
            ipv4::protocol::ICMP => {
                if !sanity::is_sane_icmp_packet(&owned) {
                    return;
                }
                let icmp_off = ip_off + ipv4::HEADER_SIZE;
                if let Ok(msg) = IcmpMessage::from_bytes(&owned[icmp_off..]) {
                    if msg.is_echo_request() {
                        icmp_emitter::echo_reply(&self.interfaces, &self.arp_cache, &*self.link, &owned, iface);
                    }
                }
            }
            ipv4::protocol::TCP | ipv4::protocol::UDP => {
                let src_mac = eth_src_mac(&owned);
                if new_ttl == 0 {
                    icmp_emitter::send_error(
                        &self.interfaces,
                        &*self.link,
                        IcmpType::TimeExceeded,
                        time_exceeded_code::TTL_EXCEEDED,
                        src_mac,
                        &owned[ip_off..],
                        iface,
                    );
                } else {
                    icmp_emitter::send_error(
                        &self.interfaces,
                        &*self.link,
                        IcmpType::DestinationUnreachable,
                        unreachable_code::PORT,
                        src_mac,
                        &owned[ip_off..],
                        iface,
                    );
                }
            }
            other => tracing::trace!(protocol = other, iface, "dropping unsupported protocol addressed to us"),
        }
    }

    /// Transit traffic: TTL check, optional NAT, routing lookup, ARP
    /// resolution or queueing.
    fn forward(&self, frame: &[u8], arrival_iface: &str) {
        if !sanity::is_sane_ip_packet(frame) {
            tracing::debug!(iface = arrival_iface, "dropping insane transit ip packet");
            return;
        }
        let ip_off = ethernet::HEADER_SIZE;
        let mut owned = frame.to_vec();
        let new_ttl = decrement_ttl_in_place(&mut owned, ip_off);
        if new_ttl == 0 {
            let src_mac = eth_src_mac(&owned);
            icmp_emitter::send_error(
                &self.interfaces,
                &*self.link,
                IcmpType::TimeExceeded,
                time_exceeded_code::TTL_EXCEEDED,
                src_mac,
                &owned[ip_off..],
                arrival_iface,
            );
            return;
        }

        if let Some(nat) = &self.nat {
            match nat.translate(&mut owned, &self.interfaces, &self.routing_table) {
                TranslateOutcome::Drop => {
                    tracing::debug!(iface = arrival_iface, "nat dropped transit packet");
                    return;
                }
                TranslateOutcome::PassThrough | TranslateOutcome::Translated => {}
            }
        }

        let Ok(ip_header) = Ipv4Header::from_bytes(&owned[ip_off..]) else { return };
        match self.routing_table.lookup(ip_header.dest_ip) {
            None => {
                let src_mac = eth_src_mac(&owned);
                icmp_emitter::send_error(
                    &self.interfaces,
                    &*self.link,
                    IcmpType::DestinationUnreachable,
                    unreachable_code::NET,
                    src_mac,
                    &owned[ip_off..],
                    arrival_iface,
                );
            }
            Some(route) => match self.arp_cache.lookup(route.gateway) {
                Some(mac) => self.send_resolved(&route.iface, mac, owned),
                None => {
                    let len = owned.len();
                    tracing::debug!(gateway = %route.gateway, iface = %route.iface, "queueing transit packet for arp resolution");
                    self.arp_cache.queue(route.gateway, &owned, len, arrival_iface);
                }
            },
        }
    }

    /// Rewrite the Ethernet header for `iface`/`dest_mac` and send.
    fn send_resolved(&self, iface: &str, dest_mac: [u8; 6], mut frame: Vec<u8>) {
        let Some(own) = self.interfaces.get(iface) else {
            tracing::warn!(iface, "send_resolved: unknown interface");
            return;
        };
        if frame.len() < ethernet::HEADER_SIZE {
            return;
        }
        frame[0..6].copy_from_slice(&dest_mac);
        frame[6..12].copy_from_slice(&own.mac);
        if let Err(err) = self.link.send(iface, &frame) {
            tracing::warn!(iface, %err, "failed to send forwarded frame");
        }
    }
}

fn eth_src_mac(frame: &[u8]) -> [u8; 6] {
    let mut mac = [0u8; 6];
    if frame.len() >= 12 {
        mac.copy_from_slice(&frame[6..12]);
    }
    mac
}

/// Decrement the IPv4 TTL in place and recompute its header checksum,
/// returning the new TTL. Saturates at zero rather than wrapping.
fn decrement_ttl_in_place(frame: &mut [u8], ip_off: usize) -> u8 {
    let ttl = frame[ip_off + 8].saturating_sub(1);
    frame[ip_off + 8] = ttl;
    frame[ip_off + 10] = 0;
    frame[ip_off + 11] = 0;
    let checksum = ipv4::internet_checksum(&frame[ip_off..ip_off + ipv4::HEADER_SIZE]);
    frame[ip_off + 10..ip_off + 12].copy_from_slice(&checksum.to_be_bytes());
    ttl
}
