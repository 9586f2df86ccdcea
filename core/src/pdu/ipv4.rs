//! IPv4 header parsing and encoding (RFC 791), IHL-aware on decode, fixed
//! at IHL=5 (no options) on encode.

use std::net::Ipv4Addr;

use super::checksum::ones_complement_checksum;
use crate::error::{Result, RouterError};

/// IP protocol number for ICMP.
pub const PROTO_ICMP: u8 = 1;

const VERSION_4: u8 = 4;
const IHL_NO_OPTIONS: u8 = 5;
const DEFAULT_TTL: u8 = 64;

/// A decoded IPv4 header plus its payload (everything past the header,
/// options included if `ihl > 5`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ipv4Pdu {
    pub version: u8,
    pub ihl: u8,
    pub tos: u8,
    pub total_length: u16,
    pub identification: u16,
    pub flags: u8,
    pub fragment_offset: u16,
    pub ttl: u8,
    pub protocol: u8,
    pub checksum: u16,
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    pub payload: Vec<u8>,
}

impl Ipv4Pdu {
    /// Builds a PDU for local origination: version 4, IHL 5, TTL 64, no
    /// fragmentation. `checksum` is left at 0 until `encode` fills it in.
    pub fn new(src: Ipv4Addr, dst: Ipv4Addr, protocol: u8, payload: Vec<u8>) -> Self {
        Ipv4Pdu {
            version: VERSION_4,
            ihl: IHL_NO_OPTIONS,
            tos: 0,
            total_length: (IHL_NO_OPTIONS as u16) * 4 + payload.len() as u16,
            identification: 0,
            flags: 0,
            fragment_offset: 0,
            ttl: DEFAULT_TTL,
            protocol,
            checksum: 0,
            src,
            dst,
            payload,
        }
    }

    /// Decodes an IPv4 header. The payload starts at `IHL * 4`; any IP
    /// options present between byte 20 and that offset are skipped over and
    /// discarded rather than parsed.
    pub fn decode(buf: &[u8]) -> Result<Ipv4Pdu> {
        if buf.len() < 20 {
            return Err(RouterError::DropPdu);
        }
        let version = buf[0] >> 4;
        let ihl = buf[0] & 0x0F;
        let header_len = ihl as usize * 4;
        if header_len < 20 || buf.len() < header_len {
            return Err(RouterError::DropPdu);
        }
        let tos = buf[1];
        let total_length = u16::from_be_bytes([buf[2], buf[3]]);
        let identification = u16::from_be_bytes([buf[4], buf[5]]);
        let flags_and_offset = u16::from_be_bytes([buf[6], buf[7]]);
        let flags = (flags_and_offset >> 13) as u8;
        let fragment_offset = flags_and_offset & 0x1FFF;
        let ttl = buf[8];
        let protocol = buf[9];
        let checksum = u16::from_be_bytes([buf[10], buf[11]]);
        let src = Ipv4Addr::from(<[u8; 4]>::try_from(&buf[12..16]).unwrap());
        let dst = Ipv4Addr::from(<[u8; 4]>::try_from(&buf[16..20]).unwrap());
        Ok(Ipv4Pdu {
            version,
            ihl,
            tos,
            total_length,
            identification,
            flags,
            fragment_offset,
            ttl,
            protocol,
            checksum,
            src,
            dst,
            payload: buf[header_len..].to_vec(),
        })
    }

    /// Encodes with IHL fixed to 5 (no options) and the header checksum
    /// recomputed over the header with the checksum field zeroed.
    pub fn encode(&self) -> Vec<u8> {
        let mut header = [0u8; 20];
        header[0] = (VERSION_4 << 4) | IHL_NO_OPTIONS;
        header[1] = self.tos;
        let total_length = 20u16 + self.payload.len() as u16;
        header[2..4].copy_from_slice(&total_length.to_be_bytes());
        header[4..6].copy_from_slice(&self.identification.to_be_bytes());
        let flags_and_offset = ((self.flags as u16) << 13) | (self.fragment_offset & 0x1FFF);
        header[6..8].copy_from_slice(&flags_and_offset.to_be_bytes());
        header[8] = self.ttl;
        header[9] = self.protocol;
        // header[10..12] (checksum) left zeroed for the checksum pass.
        header[12..16].copy_from_slice(&self.src.octets());
        header[16..20].copy_from_slice(&self.dst.octets());

        let checksum = ones_complement_checksum(&header);
        header[10..12].copy_from_slice(&checksum.to_be_bytes());

        let mut out = Vec::with_capacity(20 + self.payload.len());
        out.extend_from_slice(&header);
        out.extend_from_slice(&self.payload);
        out
    }

    /// Returns a copy with the TTL decremented by 1, or `None` if the TTL
    /// reaches 0 after decrementing — including the already-0 case, which
    /// would otherwise underflow.
    pub fn decrement_ttl(&self) -> Option<Ipv4Pdu> {
        match self.ttl.checked_sub(1) {
            Some(ttl) if ttl > 0 => Some(Ipv4Pdu {
                ttl,
                ..self.clone()
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Ipv4Pdu {
        Ipv4Pdu::new(
            Ipv4Addr::new(192, 168, 100, 1),
            Ipv4Addr::new(192, 168, 100, 50),
            PROTO_ICMP,
            vec![1, 2, 3, 4, 5, 6, 7, 8],
        )
    }

    #[test]
    fn round_trips_through_encode_decode_except_checksum_field() {
        let pdu = sample();
        let encoded = pdu.encode();
        let decoded = Ipv4Pdu::decode(&encoded).unwrap();

        assert_eq!(decoded.version, pdu.version);
        assert_eq!(decoded.ihl, 5);
        assert_eq!(decoded.src, pdu.src);
        assert_eq!(decoded.dst, pdu.dst);
        assert_eq!(decoded.protocol, pdu.protocol);
        assert_eq!(decoded.payload, pdu.payload);

        // Checksum of a just-encoded, correctly-checksummed header is 0 when
        // summed including the checksum field itself.
        assert_eq!(ones_complement_checksum(&encoded[..20]), 0);
    }

    #[test]
    fn decode_skips_ip_options() {
        let mut raw = sample().encode();
        raw[0] = (4 << 4) | 6; // IHL = 6 words = 24 bytes
        raw.splice(20..20, [0u8; 4]); // one options word
        let decoded = Ipv4Pdu::decode(&raw).unwrap();
        assert_eq!(decoded.ihl, 6);
        assert_eq!(decoded.payload, sample().payload);
    }

    #[test]
    fn decrement_ttl_drops_when_it_would_reach_zero() {
        let mut pdu = sample();
        pdu.ttl = 2;
        assert_eq!(pdu.decrement_ttl().unwrap().ttl, 1);

        pdu.ttl = 1;
        assert!(pdu.decrement_ttl().is_none());

        pdu.ttl = 0;
        assert!(pdu.decrement_ttl().is_none());
    }
}
