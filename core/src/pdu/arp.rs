//! ARPv4-over-Ethernet PDU: the fixed 28-byte wire layout (RFC 826, restricted
//! to hardware type Ethernet and protocol type IPv4).

use std::net::Ipv4Addr;

use pnet::util::MacAddr;

use super::ethernet::{mac_from_octets, mac_octets};
use crate::error::{Result, RouterError};

/// `OP` field: ARP request.
pub const ARP_OP_REQUEST: u16 = 1;
/// `OP` field: ARP reply.
pub const ARP_OP_REPLY: u16 = 2;

const HTYPE_ETHERNET: u16 = 1;
const PTYPE_IPV4: u16 = 0x0800;
const HLEN_MAC: u8 = 6;
const PLEN_IPV4: u8 = 4;

/// A decoded ARPv4-over-Ethernet PDU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArpPdu {
    pub htype: u16,
    pub ptype: u16,
    pub hlen: u8,
    pub plen: u8,
    pub op: u16,
    pub sha: MacAddr,
    pub spa: Ipv4Addr,
    pub tha: MacAddr,
    pub tpa: Ipv4Addr,
}

impl ArpPdu {
    /// Builds a well-formed Ethernet/IPv4 ARP PDU (HTYPE=1, PTYPE=0x0800,
    /// HLEN=6, PLEN=4), as any locally originated PDU must be.
    pub fn new(op: u16, sha: MacAddr, spa: Ipv4Addr, tha: MacAddr, tpa: Ipv4Addr) -> Self {
        ArpPdu {
            htype: HTYPE_ETHERNET,
            ptype: PTYPE_IPV4,
            hlen: HLEN_MAC,
            plen: PLEN_IPV4,
            op,
            sha,
            spa,
            tha,
            tpa,
        }
    }

    /// True if this PDU is the Ethernet/IPv4 combination this router speaks.
    pub fn is_ethernet_ipv4(&self) -> bool {
        self.htype == HTYPE_ETHERNET
            && self.ptype == PTYPE_IPV4
            && self.hlen == HLEN_MAC
            && self.plen == PLEN_IPV4
    }

    /// Decodes the fixed 28-byte ARPv4 layout. Accepts payloads of at least
    /// 28 bytes; anything past byte 28 is ignored.
    pub fn decode(buf: &[u8]) -> Result<ArpPdu> {
        if buf.len() < 28 {
            return Err(RouterError::DropPdu);
        }
        let htype = u16::from_be_bytes([buf[0], buf[1]]);
        let ptype = u16::from_be_bytes([buf[2], buf[3]]);
        let hlen = buf[4];
        let plen = buf[5];
        let op = u16::from_be_bytes([buf[6], buf[7]]);
        let sha = mac_from_octets(buf[8..14].try_into().unwrap());
        let spa = Ipv4Addr::from(<[u8; 4]>::try_from(&buf[14..18]).unwrap());
        let tha = mac_from_octets(buf[18..24].try_into().unwrap());
        let tpa = Ipv4Addr::from(<[u8; 4]>::try_from(&buf[24..28]).unwrap());
        Ok(ArpPdu {
            htype,
            ptype,
            hlen,
            plen,
            op,
            sha,
            spa,
            tha,
            tpa,
        })
    }

    /// Encodes this PDU into its fixed 28-byte wire layout.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(28);
        out.extend_from_slice(&self.htype.to_be_bytes());
        out.extend_from_slice(&self.ptype.to_be_bytes());
        out.push(self.hlen);
        out.push(self.plen);
        out.extend_from_slice(&self.op.to_be_bytes());
        out.extend_from_slice(&mac_octets(self.sha));
        out.extend_from_slice(&self.spa.octets());
        out.extend_from_slice(&mac_octets(self.tha));
        out.extend_from_slice(&self.tpa.octets());
        out
    }
}
