//! ICMP wire format (RFC 792).
//!
//! Only the message types this router actually emits or parses are
//! modeled: echo request/reply, destination unreachable, time exceeded.
//! [`crate::router::icmp_emitter`] builds the error replies; this module
//! is the codec.

use thiserror::Error;

use crate::net::ipv4::internet_checksum;

pub const HEADER_SIZE: usize = 8;

/// Bytes of the original packet (starting at its IP header) embedded in
/// a type-3/type-11 ICMP error, per RFC 792.
pub const ERROR_DATA_SIZE: usize = 28;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IcmpType {
    EchoReply,
    DestinationUnreachable,
    EchoRequest,
    TimeExceeded,
    Unknown(u8),
}

impl From<u8> for IcmpType {
    fn from(value: u8) -> Self {
        match value {
            0 => IcmpType::EchoReply,
            3 => IcmpType::DestinationUnreachable,
            8 => IcmpType::EchoRequest,
            11 => IcmpType::TimeExceeded,
            other => IcmpType::Unknown(other),
        }
    }
}

impl From<IcmpType> for u8 {
    fn from(value: IcmpType) -> Self {
        match value {
            IcmpType::EchoReply => 0,
            IcmpType::DestinationUnreachable => 3,
            IcmpType::EchoRequest => 8,
            IcmpType::TimeExceeded => 11,
            IcmpType::Unknown(code) => code,
        }
    }
}

pub mod unreachable_code {
    pub const NET: u8 = 0;
    pub const HOST: u8 = 1;
    pub const PORT: u8 = 3;
}

pub mod time_exceeded_code {
    pub const TTL_EXCEEDED: u8 = 0;
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum IcmpError {
    #[error("icmp message shorter than {HEADER_SIZE} byte header")]
    MessageTooShort,
    #[error("icmp checksum mismatch")]
    ChecksumMismatch,
}

/// A parsed ICMP message. `rest` holds the identifier/sequence fields for
/// echo messages and the error payload for type-3/type-11 messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IcmpMessage {
    pub icmp_type: IcmpType,
    pub code: u8,
    pub rest: Vec<u8>,
}

impl IcmpMessage {
    pub fn new_echo_reply_to(request: &IcmpMessage) -> Self {
        Self {
            icmp_type: IcmpType::EchoReply,
            code: 0,
            rest: request.rest.clone(),
        }
    }

    /// Build a type-3/type-11 error message embedding `original_ip_packet`
    /// (the failed packet, starting at its IP header). Exactly
    /// [`ERROR_DATA_SIZE`] bytes are embedded, zero-padded if the
    /// original is shorter.
    pub fn new_error(icmp_type: IcmpType, code: u8, original_ip_packet: &[u8]) -> Self {
        let take = original_ip_packet.len().min(ERROR_DATA_SIZE);
        let mut rest = vec![0u8; 4 + ERROR_DATA_SIZE];
        rest[4..4 + take].copy_from_slice(&original_ip_packet[..take]);
        Self { icmp_type, code, rest }
    }

    pub fn is_echo_request(&self) -> bool {
        matches!(self.icmp_type, IcmpType::EchoRequest)
    }

    /// The echo identifier (bytes 0..2 of `rest`), NAT's stand-in for a
    /// port number on ICMP flows. `0` if the message is too short to
    /// carry one (e.g. a bare type-3/time-exceeded header).
    pub fn identifier(&self) -> u16 {
        if self.rest.len() >= 2 {
            u16::from_be_bytes([self.rest[0], self.rest[1]])
        } else {
            0
        }
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, IcmpError> {
        if data.len() < HEADER_SIZE {
            return Err(IcmpError::MessageTooShort);
        }
        if internet_checksum(data) != 0 {
            return Err(IcmpError::ChecksumMismatch);
        }

        Ok(Self {
            icmp_type: IcmpType::from(data[0]),
            code: data[1],
            rest: data[4..].to_vec(),
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(HEADER_SIZE + self.rest.len());
        bytes.push(self.icmp_type.into());
        bytes.push(self.code);
        bytes.push(0);
        bytes.push(0);
        bytes.extend_from_slice(&self.rest);

        let checksum = internet_checksum(&bytes);
        bytes[2..4].copy_from_slice(&checksum.to_be_bytes());
        bytes
    }
}

/// Overwrite the echo identifier in a full ICMP message buffer
/// (header + rest) and recompute the checksum over the message.
///
/// NAT's ICMP-flow equivalent of
/// [`crate::net::tcp::TcpHeader::rewrite_port_in_place`].
pub fn rewrite_identifier_in_place(message: &mut [u8], new_id: u16) {
    message[4..6].copy_from_slice(&new_id.to_be_bytes());
    message[2] = 0;
    message[3] = 0;
    let checksum = internet_checksum(message);
    message[2..4].copy_from_slice(&checksum.to_be_bytes());
}
