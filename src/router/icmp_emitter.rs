//! ICMP emitter: builds the echo reply and the type-3/type-11 error
//! messages, and hands them to the link layer (queueing through the
//! ARP cache for echo replies, since those need a resolved next hop).

use std::net::Ipv4Addr;

use crate::net::ethernet::{self, EthernetFrame};
use crate::net::icmp::{IcmpMessage, IcmpType};
use crate::net::ipv4::{self, Ipv4Header};
use crate::router::arp_cache::ArpCache;
use crate::router::interface::InterfaceTable;
use crate::router::link::LinkLayer;

/// Build an echo reply for an inbound echo request and send it, or
/// queue it on the ARP cache if the destination isn't resolved yet.
///
/// `frame` must already have passed [`crate::router::sanity::is_sane_icmp_packet`]
/// and parse as an echo request; callers that haven't checked get a
/// silently dropped packet rather than a panic.
pub fn echo_reply(interfaces: &InterfaceTable, arp_cache: &ArpCache, link: &dyn LinkLayer, frame: &[u8], iface: &str) {
    let Some(own) = interfaces.get(iface) else {
        tracing::warn!(iface, "echo_reply: unknown interface");
        return;
    };
    let Ok(eth) = EthernetFrame::from_bytes(frame) else { return };
    let ip_off = ethernet::HEADER_SIZE;
    let Ok(ip_header) = Ipv4Header::from_bytes(&frame[ip_off..]) else { return };
    let icmp_off = ip_off + ipv4::HEADER_SIZE;
    let Ok(icmp_msg) = IcmpMessage::from_bytes(&frame[icmp_off..]) else { return };

    let reply_icmp = IcmpMessage::new_echo_reply_to(&icmp_msg);
    let reply_ip = Ipv4Header {
        dscp_ecn: ip_header.dscp_ecn,
        total_length: ip_header.total_length,
        identification: ip_header.identification,
        flags_fragment: ip_header.flags_fragment,
        ttl: ipv4::DEFAULT_TTL,
        protocol: ip_header.protocol,
        checksum: 0,
        src_ip: ip_header.dest_ip,
        dest_ip: ip_header.src_ip,
    };

    let mut payload = reply_ip.to_bytes();
    payload.extend_from_slice(&reply_icmp.to_bytes());
    let reply_frame = ethernet::build(eth.src_mac, own.mac, ethernet::ETHERTYPE_IPV4, &payload);

    tracing::debug!(iface, dest = %reply_ip.dest_ip, "sending echo reply");

    match arp_cache.lookup(reply_ip.dest_ip) {
        Some(_) => {
            if let Err(err) = link.send(iface, &reply_frame) {
                tracing::warn!(iface, %err, "failed to send echo reply");
            }
        }
        None => {
            let len = reply_frame.len();
            arp_cache.queue(reply_ip.dest_ip, &reply_frame, len, iface);
        }
    }
}

/// Build and immediately send a type-3 ("destination unreachable") or
/// type-11 ("time exceeded") error message. No ARP resolution is
/// performed: the destination is the host that just sent us
/// `original_ip_and_body`, so `dest_mac` is already known from its
/// inbound frame.
///
/// `original_ip_and_body` must start at the offending datagram's IP
/// header; only the first [`crate::net::icmp::ERROR_DATA_SIZE`] bytes
/// are embedded (zero-padded if shorter).
pub fn send_error(
    interfaces: &InterfaceTable,
    link: &dyn LinkLayer,
    icmp_type: IcmpType,
    code: u8,
    dest_mac: [u8; 6],
    original_ip_and_body: &[u8],
    iface: &str,
) {
    let Some(own) = interfaces.get(iface) else {
        tracing::warn!(iface, "send_error: unknown interface");
        return;
    };
    if original_ip_and_body.len() < ipv4::HEADER_SIZE {
        tracing::debug!(iface, "send_error: offending datagram too short to embed");
        return;
    }
    let offending_src = Ipv4Addr::new(
        original_ip_and_body[12],
        original_ip_and_body[13],
        original_ip_and_body[14],
        original_ip_and_body[15],
    );

    let icmp_msg = IcmpMessage::new_error(icmp_type, code, original_ip_and_body);
    let icmp_bytes = icmp_msg.to_bytes();

    let ip_header = Ipv4Header::new(own.ipv4, offending_src, ipv4::protocol::ICMP, icmp_bytes.len() as u16);
    let mut payload = ip_header.to_bytes();
    payload.extend_from_slice(&icmp_bytes);

    let frame = ethernet::build(dest_mac, own.mac, ethernet::ETHERTYPE_IPV4, &payload);

    tracing::debug!(iface, dest = %offending_src, icmp_type = ?icmp_type, code, "sending icmp error");
    if let Err(err) = link.send(iface, &frame) {
        tracing::warn!(iface, %err, "failed to send icmp error");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::ipv4::protocol;
    use crate::router::interface::Interface;

    fn interfaces() -> InterfaceTable {
        let mut t = InterfaceTable::new();
        t.insert(
            "eth0".into(),
            Interface { mac: [0xaa; 6], ipv4: "10.0.1.1".parse().unwrap(), mask: "255.255.255.0".parse().unwrap() },
        );
        t
    }

    fn echo_request_frame(id: u16, seq: u16) -> Vec<u8> {
        let icmp = IcmpMessage {
            icmp_type: IcmpType::EchoRequest,
            code: 0,
            rest: {
                let mut r = id.to_be_bytes().to_vec();
                r.extend_from_slice(&seq.to_be_bytes());
                r
            },
        };
        let icmp_bytes = icmp.to_bytes();
        let ip = Ipv4Header::new("10.0.1.9".parse().unwrap(), "10.0.1.1".parse().unwrap(), protocol::ICMP, icmp_bytes.len() as u16);
        let mut payload = ip.to_bytes();
        payload.extend_from_slice(&icmp_bytes);
        ethernet::build([0xbb; 6], [0xaa; 6], ethernet::ETHERTYPE_IPV4, &payload)
    }

    #[test]
    fn echo_reply_sends_directly_when_arp_resolved() {
        let interfaces = interfaces();
        let arp_cache = ArpCache::new(std::time::Duration::from_secs(15));
        arp_cache.insert("10.0.1.9".parse().unwrap(), [0xbb; 6]);
        let link = crate::router::link::MockLink::new();
        let frame = echo_request_frame(0x1234, 1);

        echo_reply(&interfaces, &arp_cache, &link, &frame, "eth0");

        let sent = link.take_sent();
        assert_eq!(sent.len(), 1);
        let (iface, bytes) = &sent[0];
        assert_eq!(iface, "eth0");
        let reply_eth = EthernetFrame::from_bytes(bytes).unwrap();
        assert_eq!(reply_eth.dest_mac, [0xbb; 6]);
        let reply_ip = Ipv4Header::from_bytes(&bytes[ethernet::HEADER_SIZE..]).unwrap();
        assert_eq!(reply_ip.src_ip, "10.0.1.1".parse::<Ipv4Addr>().unwrap());
        assert_eq!(reply_ip.dest_ip, "10.0.1.9".parse::<Ipv4Addr>().unwrap());
        assert_eq!(reply_ip.ttl, 64);
        let reply_icmp = IcmpMessage::from_bytes(&bytes[ethernet::HEADER_SIZE + ipv4::HEADER_SIZE..]).unwrap();
        assert_eq!(reply_icmp.icmp_type, IcmpType::EchoReply);
        assert_eq!(reply_icmp.identifier(), 0x1234);
    }

    #[test]
    fn echo_reply_queues_when_arp_unresolved() {
        let interfaces = interfaces();
        let arp_cache = ArpCache::new(std::time::Duration::from_secs(15));
        let link = crate::router::link::MockLink::new();
        let frame = echo_request_frame(1, 1);

        echo_reply(&interfaces, &arp_cache, &link, &frame, "eth0");

        assert!(link.take_sent().is_empty());
        assert!(arp_cache.has_pending_request("10.0.1.9".parse().unwrap()));
    }

    #[test]
    fn send_error_targets_the_original_sender() {
        let interfaces = interfaces();
        let link = crate::router::link::MockLink::new();
        let offending = {
            let ip = Ipv4Header::new("10.0.1.9".parse().unwrap(), "192.168.5.5".parse().unwrap(), protocol::TCP, 8);
            let mut bytes = ip.to_bytes();
            bytes.extend_from_slice(&[0u8; 8]);
            bytes
        };

        send_error(
            &interfaces,
            &link,
            IcmpType::TimeExceeded,
            crate::net::icmp::time_exceeded_code::TTL_EXCEEDED,
            [0xbb; 6],
            &offending,
            "eth0",
        );

        let sent = link.take_sent();
        assert_eq!(sent.len(), 1);
        let (_, bytes) = &sent[0];
        let ip = Ipv4Header::from_bytes(&bytes[ethernet::HEADER_SIZE..]).unwrap();
        assert_eq!(ip.dest_ip, "10.0.1.9".parse::<Ipv4Addr>().unwrap());
        assert_eq!(ip.protocol, protocol::ICMP);
        let icmp = IcmpMessage::from_bytes(&bytes[ethernet::HEADER_SIZE + ipv4::HEADER_SIZE..]).unwrap();
        assert_eq!(icmp.icmp_type, IcmpType::TimeExceeded);
    }
}
