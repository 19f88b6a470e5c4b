//! ARP emitter: builds unicast replies and broadcast requests.
//! Retry policy (how many times, how often) lives in
//! [`crate::router::arp_cache`]'s reaper; this module only builds and
//! sends one message at a time.

use std::net::Ipv4Addr;

use crate::net::arp::ArpPacket;
use crate::net::ethernet::{self, EthernetFrame};
use crate::router::interface::InterfaceTable;
use crate::router::link::LinkLayer;
use crate::router::routing_table::RoutingTable;

/// Reply to an inbound ARP request on `iface` with our own MAC/IP.
pub fn reply(interfaces: &InterfaceTable, link: &dyn LinkLayer, frame: &[u8], iface: &str) {
    let Some(own) = interfaces.get(iface) else {
        tracing::warn!(iface, "arp reply: unknown interface");
        return;
    };
    let Ok(eth) = EthernetFrame::from_bytes(frame) else { return };
    let Ok(arp) = ArpPacket::from_bytes(eth.payload) else { return };

    let reply_arp = ArpPacket::new_reply(own.mac, own.ipv4, arp.sender_mac, arp.sender_ip);
    let reply_frame = ethernet::build(eth.src_mac, own.mac, ethernet::ETHERTYPE_ARP, &reply_arp.to_bytes());

    tracing::debug!(iface, target = %arp.sender_ip, "sending arp reply");
    if let Err(err) = link.send(iface, &reply_frame) {
        tracing::warn!(iface, %err, "failed to send arp reply");
    }
}

/// Broadcast an ARP request for `target_ip` out whichever interface the
/// routing table's longest-prefix match says is next hop for it.
pub fn request(interfaces: &InterfaceTable, routing_table: &RoutingTable, link: &dyn LinkLayer, target_ip: Ipv4Addr) {
    let Some(route) = routing_table.lookup(target_ip) else {
        tracing::debug!(target = %target_ip, "arp request: no route, dropping");
        return;
    };
    let Some(own) = interfaces.get(&route.iface) else {
        tracing::warn!(iface = %route.iface, "arp request: unknown interface in route");
        return;
    };

    let request_arp = ArpPacket::new_request(own.mac, own.ipv4, route.gateway);
    let frame = ethernet::build(ethernet::BROADCAST_MAC, own.mac, ethernet::ETHERTYPE_ARP, &request_arp.to_bytes());

    tracing::debug!(iface = %route.iface, target = %route.gateway, "sending arp request");
    if let Err(err) = link.send(&route.iface, &frame) {
        tracing::warn!(iface = %route.iface, %err, "failed to send arp request");
    }
}
