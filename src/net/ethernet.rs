//! Ethernet Frame Layer (OSI Layer 2)
//!
//! Handles Ethernet II frame parsing and building.
//! Frame structure: [Dest MAC (6)][Src MAC (6)][EtherType (2)][Payload]
//!
//! Framing (preamble, FCS) is the link layer's concern, not ours: by the
//! time a frame reaches [`EthernetFrame::from_bytes`] it has already been
//! stripped of those, and [`EthernetFrame::to_bytes`] does not add them back.

use thiserror::Error;

/// EtherType constants
pub const ETHERTYPE_IPV4: u16 = 0x0800;
pub const ETHERTYPE_ARP: u16 = 0x0806;

/// Broadcast MAC address (FF:FF:FF:FF:FF:FF)
pub const BROADCAST_MAC: [u8; 6] = [0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF];

/// Ethernet frame header size
pub const HEADER_SIZE: usize = 14;

/// Errors that can occur while parsing an Ethernet frame
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum EthernetError {
    #[error("ethernet frame shorter than {HEADER_SIZE} byte header")]
    FrameTooShort,
}

/// A parsed Ethernet II frame. `payload` is everything after the header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EthernetFrame<'a> {
    pub dest_mac: [u8; 6],
    pub src_mac: [u8; 6],
    pub ethertype: u16,
    pub payload: &'a [u8],
}

impl<'a> EthernetFrame<'a> {
    /// Parse an Ethernet frame from raw bytes (no CRC expected).
    pub fn from_bytes(data: &'a [u8]) -> Result<Self, EthernetError> {
        if data.len() < HEADER_SIZE {
            return Err(EthernetError::FrameTooShort);
        }

        let mut dest_mac = [0u8; 6];
        dest_mac.copy_from_slice(&data[0..6]);
        let mut src_mac = [0u8; 6];
        src_mac.copy_from_slice(&data[6..12]);
        let ethertype = u16::from_be_bytes([data[12], data[13]]);

        Ok(Self {
            dest_mac,
            src_mac,
            ethertype,
            payload: &data[HEADER_SIZE..],
        })
    }

    pub fn is_broadcast(&self) -> bool {
        self.dest_mac == BROADCAST_MAC
    }
}

/// Serialize an Ethernet header + payload to bytes for transmission.
pub fn build(dest_mac: [u8; 6], src_mac: [u8; 6], ethertype: u16, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len());
    frame.extend_from_slice(&dest_mac);
    frame.extend_from_slice(&src_mac);
    frame.extend_from_slice(&ethertype.to_be_bytes());
    frame.extend_from_slice(payload);
    frame
}

/// Format a MAC address for display/logging, e.g. `aa:bb:cc:dd:ee:ff`.
pub fn format_mac(mac: &[u8; 6]) -> String {
    format!(
        "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
        mac[0], mac[1], mac[2], mac[3], mac[4], mac[5]
    )
}
