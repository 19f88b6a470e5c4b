//! ARP (Address Resolution Protocol) wire format — RFC 826.
//!
//! Packet layout: [HW Type (2)][Proto Type (2)][HW Len (1)][Proto Len (1)]
//!                [Operation (2)][Sender MAC (6)][Sender IP (4)]
//!                [Target MAC (6)][Target IP (4)]
//!
//! This module is the codec only. The cache, pending-packet queue and
//! reaper live in [`crate::router::arp_cache`]; reply/request framing
//! lives in [`crate::router::arp_emitter`].

use std::net::Ipv4Addr;
use thiserror::Error;

pub const HW_TYPE_ETHERNET: u16 = 1;
pub const PROTO_TYPE_IPV4: u16 = 0x0800;

pub const OP_REQUEST: u16 = 1;
pub const OP_REPLY: u16 = 2;

/// Fixed size of an ARP packet for Ethernet/IPv4 (no options).
pub const PACKET_SIZE: usize = 28;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ArpError {
    #[error("arp packet shorter than {PACKET_SIZE} bytes")]
    PacketTooShort,
    #[error("unsupported hardware type {0}")]
    InvalidHardwareType(u16),
    #[error("unsupported protocol type {0:#06x}")]
    InvalidProtocolType(u16),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArpPacket {
    pub operation: u16,
    pub sender_mac: [u8; 6],
    pub sender_ip: Ipv4Addr,
    pub target_mac: [u8; 6],
    pub target_ip: Ipv4Addr,
}

impl ArpPacket {
    pub fn new_request(sender_mac: [u8; 6], sender_ip: Ipv4Addr, target_ip: Ipv4Addr) -> Self {
        Self {
            operation: OP_REQUEST,
            sender_mac,
            sender_ip,
            target_mac: [0; 6],
            target_ip,
        }
    }

    pub fn new_reply(
        sender_mac: [u8; 6],
        sender_ip: Ipv4Addr,
        target_mac: [u8; 6],
        target_ip: Ipv4Addr,
    ) -> Self {
        Self {
            operation: OP_REPLY,
            sender_mac,
            sender_ip,
            target_mac,
            target_ip,
        }
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, ArpError> {
        if data.len() < PACKET_SIZE {
            return Err(ArpError::PacketTooShort);
        }

        let hw_type = u16::from_be_bytes([data[0], data[1]]);
        if hw_type != HW_TYPE_ETHERNET {
            return Err(ArpError::InvalidHardwareType(hw_type));
        }
        let proto_type = u16::from_be_bytes([data[2], data[3]]);
        if proto_type != PROTO_TYPE_IPV4 {
            return Err(ArpError::InvalidProtocolType(proto_type));
        }

        let operation = u16::from_be_bytes([data[6], data[7]]);

        let mut sender_mac = [0u8; 6];
        sender_mac.copy_from_slice(&data[8..14]);
        let sender_ip = Ipv4Addr::new(data[14], data[15], data[16], data[17]);

        let mut target_mac = [0u8; 6];
        target_mac.copy_from_slice(&data[18..24]);
        let target_ip = Ipv4Addr::new(data[24], data[25], data[26], data[27]);

        Ok(Self {
            operation,
            sender_mac,
            sender_ip,
            target_mac,
            target_ip,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(PACKET_SIZE);
        bytes.extend_from_slice(&HW_TYPE_ETHERNET.to_be_bytes());
        bytes.extend_from_slice(&PROTO_TYPE_IPV4.to_be_bytes());
        bytes.push(6); // hw addr len
        bytes.push(4); // proto addr len
        bytes.extend_from_slice(&self.operation.to_be_bytes());
        bytes.extend_from_slice(&self.sender_mac);
        bytes.extend_from_slice(&self.sender_ip.octets());
        bytes.extend_from_slice(&self.target_mac);
        bytes.extend_from_slice(&self.target_ip.octets());
        bytes
    }

    pub fn is_request(&self) -> bool {
        self.operation == OP_REQUEST
    }
}
