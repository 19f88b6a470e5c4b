//! ARP cache: IP→MAC entries with a fixed TTL, plus a per-target
//! pending-packet queue for addresses under resolution, and the reaper
//! thread that retries or gives up on them.
//!
//! A plain `std::sync::Mutex` guards all mutable state — a non-recursive
//! lock plus the discipline that public entrypoints never call back
//! into each other re-entrantly. Every public operation acquires the
//! lock for the duration of its critical section and releases it on
//! every exit path; lookups return owned copies so callers never hold
//! a reference into the locked state.

use std::collections::{HashMap, VecDeque};
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::net::icmp::{unreachable_code, IcmpType};
use crate::router::interface::InterfaceTable;
use crate::router::{arp_emitter, icmp_emitter};
use crate::router::link::LinkLayer;
use crate::router::routing_table::RoutingTable;

/// Cap on retransmissions before a pending request gives up.
const MAX_RETRIES: u32 = 5;
/// Reaper tick and minimum spacing between retransmissions.
const RETRY_INTERVAL: Duration = Duration::from_secs(1);
/// Default entry lifetime, matching the CS144 reference router's cache
/// timeout; callers that need a different value pass it to [`ArpCache::new`].
pub const DEFAULT_ENTRY_TTL: Duration = Duration::from_secs(15);

/// A frame queued while its next hop's MAC is being resolved.
#[derive(Debug, Clone)]
pub struct PendingPacket {
    pub frame: Vec<u8>,
    pub len: usize,
    pub iface: String,
}

struct Entry {
    mac: [u8; 6],
    inserted_at: Instant,
}

struct Request {
    times_sent: u32,
    last_sent_at: Instant,
    pending: VecDeque<PendingPacket>,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<Ipv4Addr, Entry>,
    requests: HashMap<Ipv4Addr, Request>,
}

pub struct ArpCache {
    inner: Mutex<Inner>,
    entry_ttl: Duration,
}

impl ArpCache {
    pub fn new(entry_ttl: Duration) -> Self {
        Self { inner: Mutex::new(Inner::default()), entry_ttl }
    }

    /// The MAC for `ip`, if cached and not yet expired.
    pub fn lookup(&self, ip: Ipv4Addr) -> Option<[u8; 6]> {
        let inner = self.inner.lock().unwrap();
        inner.entries.get(&ip).filter(|e| e.inserted_at.elapsed() < self.entry_ttl).map(|e| e.mac)
    }

    /// Record `mac` for `ip`. If a pending request existed for `ip`,
    /// it is destroyed and its queued packets are returned for the
    /// caller to drain (resolve next hop, rewrite, send).
    pub fn insert(&self, ip: Ipv4Addr, mac: [u8; 6]) -> Vec<PendingPacket> {
        let mut inner = self.inner.lock().unwrap();
        inner.entries.insert(ip, Entry { mac, inserted_at: Instant::now() });
        tracing::debug!(%ip, mac = %crate::net::ethernet::format_mac(&mac), "arp cache insert");
        match inner.requests.remove(&ip) {
            Some(req) => req.pending.into_iter().collect(),
            None => Vec::new(),
        }
    }

    /// Queue `frame` for delivery once `ip` resolves, creating a fresh
    /// pending request (`times_sent = 0`) if none exists yet. FIFO
    /// order among packets for the same target is preserved.
    pub fn queue(&self, ip: Ipv4Addr, frame: &[u8], len: usize, iface: &str) {
        let mut inner = self.inner.lock().unwrap();
        let req = inner.requests.entry(ip).or_insert_with(|| {
            tracing::debug!(%ip, "arp: new pending request");
            Request {
                times_sent: 0,
                // Already "due" so the next reaper tick fires the first request.
                last_sent_at: Instant::now() - RETRY_INTERVAL,
                pending: VecDeque::new(),
            }
        });
        req.pending.push_back(PendingPacket { frame: frame.to_vec(), len, iface: iface.to_string() });
    }

    #[cfg(test)]
    pub fn has_pending_request(&self, ip: Ipv4Addr) -> bool {
        self.inner.lock().unwrap().requests.contains_key(&ip)
    }

    /// Run one reaper tick: retransmit due requests or, past the retry
    /// cap, flush their queues with ICMP host-unreachable.
    pub fn reap(&self, interfaces: &InterfaceTable, routing_table: &RoutingTable, link: &dyn LinkLayer) {
        let mut due_retries = Vec::new();
        let mut exhausted = Vec::new();

        {
            let mut inner = self.inner.lock().unwrap();
            let now = Instant::now();
            for (&ip, req) in inner.requests.iter_mut() {
                if now.duration_since(req.last_sent_at) < RETRY_INTERVAL {
                    continue;
                }
                if req.times_sent >= MAX_RETRIES {
                    exhausted.push(ip);
                } else {
                    req.times_sent += 1;
                    req.last_sent_at = now;
                    due_retries.push(ip);
                }
            }

            for ip in &exhausted {
                inner.requests.remove(ip);
            }
        }

        for ip in due_retries {
            arp_emitter::request(interfaces, routing_table, link, ip);
        }

        for ip in exhausted {
            // Re-take ownership of the queue under a fresh lock acquisition;
            // the entry was already removed above so this just reclaims the
            // packets we're responsible for flushing.
            let pending = {
                let mut inner = self.inner.lock().unwrap();
                inner.requests.remove(&ip).map(|r| r.pending).unwrap_or_default()
            };
            tracing::warn!(%ip, packets = pending.len(), "arp resolution exhausted, sending host-unreachable");
            for pkt in pending {
                let Some(eth_off) = pkt.frame.get(..crate::net::ethernet::HEADER_SIZE) else { continue };
                let mut src_mac = [0u8; 6];
                src_mac.copy_from_slice(&eth_off[6..12]);
                let ip_and_body = &pkt.frame[crate::net::ethernet::HEADER_SIZE..pkt.len.min(pkt.frame.len())];
                icmp_emitter::send_error(
                    interfaces,
                    link,
                    IcmpType::DestinationUnreachable,
                    unreachable_code::HOST,
                    src_mac,
                    ip_and_body,
                    &pkt.iface,
                );
            }
        }
    }

    /// Spawn the once-per-second reaper thread. The thread holds only a
    /// [`Weak`] reference to `self`, so it exits on its own once the
    /// last strong owner drops the cache.
    pub fn spawn_reaper(
        self: &Arc<Self>,
        interfaces: Arc<InterfaceTable>,
        routing_table: Arc<RoutingTable>,
        link: Arc<dyn LinkLayer>,
    ) -> JoinHandle<()> {
        let weak: Weak<ArpCache> = Arc::downgrade(self);
        thread::spawn(move || loop {
            thread::sleep(RETRY_INTERVAL);
            let Some(cache) = weak.upgrade() else { break };
            cache.reap(&interfaces, &routing_table, &*link);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::interface::Interface;
    use crate::router::link::MockLink;
    use crate::router::routing_table::RoutingEntry;

    fn interfaces() -> InterfaceTable {
        let mut t = InterfaceTable::new();
        t.insert(
            "eth0".into(),
            Interface { mac: [0xaa; 6], ipv4: "10.0.1.1".parse().unwrap(), mask: "255.255.255.0".parse().unwrap() },
        );
        t
    }

    fn routing_table() -> RoutingTable {
        let mut rt = RoutingTable::new();
        rt.push(RoutingEntry {
            destination: "0.0.0.0".parse().unwrap(),
            mask: "0.0.0.0".parse().unwrap(),
            gateway: "10.0.1.254".parse().unwrap(),
            iface: "eth0".into(),
        });
        rt
    }

    #[test]
    fn lookup_reflects_most_recent_insert() {
        let cache = ArpCache::new(Duration::from_secs(15));
        assert!(cache.lookup("10.0.1.9".parse().unwrap()).is_none());
        cache.insert("10.0.1.9".parse().unwrap(), [1; 6]);
        assert_eq!(cache.lookup("10.0.1.9".parse().unwrap()), Some([1; 6]));
    }

    #[test]
    fn expired_entries_are_not_returned() {
        let cache = ArpCache::new(Duration::from_millis(1));
        cache.insert("10.0.1.9".parse().unwrap(), [1; 6]);
        thread::sleep(Duration::from_millis(5));
        assert!(cache.lookup("10.0.1.9".parse().unwrap()).is_none());
    }

    #[test]
    fn insert_drains_pending_packets_in_fifo_order() {
        let cache = ArpCache::new(Duration::from_secs(15));
        let target: Ipv4Addr = "192.168.5.5".parse().unwrap();
        cache.queue(target, &[1, 1, 1], 3, "eth0");
        cache.queue(target, &[2, 2, 2], 3, "eth0");

        let drained = cache.insert(target, [9; 6]);
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].frame, vec![1, 1, 1]);
        assert_eq!(drained[1].frame, vec![2, 2, 2]);
        assert!(!cache.has_pending_request(target));
    }

    #[test]
    fn reaper_retransmits_then_gives_up_with_host_unreachable() {
        let interfaces = interfaces();
        let routing_table = routing_table();
        let link = MockLink::new();
        let cache = ArpCache::new(Duration::from_secs(15));
        let target: Ipv4Addr = "192.168.5.5".parse().unwrap();

        let mut frame = vec![0u8; crate::net::ethernet::HEADER_SIZE];
        frame[0..6].copy_from_slice(&[0xaa; 6]);
        frame[6..12].copy_from_slice(&[0xbb; 6]);
        let ip = crate::net::ipv4::Ipv4Header::new(
            "10.0.1.9".parse().unwrap(),
            target,
            crate::net::ipv4::protocol::ICMP,
            0,
        );
        frame.extend_from_slice(&ip.to_bytes());
        let len = frame.len();
        cache.queue(target, &frame, len, "eth0");

        // Force every retry to be immediately due.
        for _ in 0..MAX_RETRIES {
            {
                let mut inner = cache.inner.lock().unwrap();
                if let Some(req) = inner.requests.get_mut(&target) {
                    req.last_sent_at = Instant::now() - RETRY_INTERVAL;
                }
            }
            cache.reap(&interfaces, &routing_table, &link);
        }
        assert!(cache.has_pending_request(target));
        assert_eq!(link.sent_count(), MAX_RETRIES as usize);
        link.take_sent();

        {
            let mut inner = cache.inner.lock().unwrap();
            let req = inner.requests.get_mut(&target).unwrap();
            req.last_sent_at = Instant::now() - RETRY_INTERVAL;
        }
        cache.reap(&interfaces, &routing_table, &link);

        assert!(!cache.has_pending_request(target));
        let sent = link.take_sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "eth0");
    }
}
