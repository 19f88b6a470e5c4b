//! TCP header codec (RFC 793).
//!
//! The router never terminates TCP connections; it only needs the header
//! far enough to read ports and flags for [`crate::router::nat`]. No
//! state machine, retransmission, or options parsing lives here.

use thiserror::Error;

pub const HEADER_SIZE: usize = 20;

pub mod flags {
    pub const FIN: u8 = 0x01;
    pub const SYN: u8 = 0x02;
    pub const RST: u8 = 0x04;
    pub const PSH: u8 = 0x08;
    pub const ACK: u8 = 0x10;
    pub const URG: u8 = 0x20;
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TcpError {
    #[error("tcp segment shorter than {HEADER_SIZE} byte header")]
    SegmentTooShort,
}

/// A parsed TCP header. Only the fields the router reads or rewrites are
/// exposed; checksum recomputation happens where NAT rewrites ports, not
/// here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpHeader {
    pub src_port: u16,
    pub dest_port: u16,
    pub sequence: u32,
    pub acknowledgment: u32,
    pub data_offset: u8,
    pub flags: u8,
    pub window: u16,
    pub checksum: u16,
}

impl TcpHeader {
    pub fn from_bytes(data: &[u8]) -> Result<Self, TcpError> {
        if data.len() < HEADER_SIZE {
            return Err(TcpError::SegmentTooShort);
        }

        Ok(Self {
            src_port: u16::from_be_bytes([data[0], data[1]]),
            dest_port: u16::from_be_bytes([data[2], data[3]]),
            sequence: u32::from_be_bytes([data[4], data[5], data[6], data[7]]),
            acknowledgment: u32::from_be_bytes([data[8], data[9], data[10], data[11]]),
            data_offset: data[12] >> 4,
            flags: data[13],
            window: u16::from_be_bytes([data[14], data[15]]),
            checksum: u16::from_be_bytes([data[16], data[17]]),
        })
    }

    pub fn has_flag(&self, flag: u8) -> bool {
        self.flags & flag != 0
    }

    pub fn is_syn_only(&self) -> bool {
        self.has_flag(flags::SYN) && !self.has_flag(flags::ACK)
    }

    /// Overwrite the source or destination port in a full segment buffer
    /// (header + data) and recompute the checksum over the segment alone.
    ///
    /// This omits the IPv4 pseudo-header, which RFC 793 requires — see
    /// `router::nat`'s checksum helper for why that divergence is kept
    /// rather than silently fixed.
    pub fn rewrite_port_in_place(segment: &mut [u8], new_port: u16, is_source: bool) {
        let offset = if is_source { 0 } else { 2 };
        segment[offset..offset + 2].copy_from_slice(&new_port.to_be_bytes());
        segment[16] = 0;
        segment[17] = 0;
        let checksum = crate::net::ipv4::internet_checksum(segment);
        segment[16..18].copy_from_slice(&checksum.to_be_bytes());
    }
}
