//! The link-layer boundary: the one trait the forwarding pipeline
//! calls out to, and the two reference implementations this crate ships.
//!
//! Neither implementation here is a production transport — wiring a tap
//! device, pcap, or a VNS-style UDP tunnel onto [`LinkLayer`] is left to
//! whatever embeds this crate.

use std::io;
use std::sync::Mutex;

/// Non-blocking frame transmission, keyed by interface name.
///
/// `Ok(())` stands in for a C-style "returns 0 on success"; any `Err`
/// is treated by the pipeline as a lost frame and never propagated
/// further — nothing escapes the pipeline as a `Result` the caller
/// must act on.
pub trait LinkLayer: Send + Sync {
    fn send(&self, iface: &str, frame: &[u8]) -> io::Result<()>;
}

/// Logs every transmit at `info` level and always succeeds.
///
/// This is the default wired up by `main.rs` when no real transport is
/// available: it lets the binary run the full pipeline end-to-end
/// (config load, ARP/NAT reapers, packet processing) without requiring
/// raw-socket privileges or a tap device, while its name and this doc
/// make clear it is a stand-in, not a transport.
#[derive(Debug, Default)]
pub struct LoggingLink;

impl LinkLayer for LoggingLink {
    fn send(&self, iface: &str, frame: &[u8]) -> io::Result<()> {
        tracing::info!(iface, bytes = frame.len(), "would transmit frame");
        Ok(())
    }
}

/// Records every transmitted frame for test assertions.
#[derive(Debug, Default)]
pub struct MockLink {
    sent: Mutex<Vec<(String, Vec<u8>)>>,
}

impl MockLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drains and returns every frame sent so far, in send order.
    pub fn take_sent(&self) -> Vec<(String, Vec<u8>)> {
        std::mem::take(&mut self.sent.lock().unwrap())
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

impl LinkLayer for MockLink {
    fn send(&self, iface: &str, frame: &[u8]) -> io::Result<()> {
        self.sent.lock().unwrap().push((iface.to_string(), frame.to_vec()));
        Ok(())
    }
}
