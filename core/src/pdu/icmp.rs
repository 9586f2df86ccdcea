//! ICMPv4 echo request/reply (RFC 792).

use super::checksum::ones_complement_checksum;
use crate::error::{Result, RouterError};

/// ICMP type: echo reply.
pub const ICMP_TYPE_ECHO_REPLY: u8 = 0;
/// ICMP type: echo request.
pub const ICMP_TYPE_ECHO_REQUEST: u8 = 8;

/// A decoded ICMP echo request/reply message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IcmpPacket {
    pub icmp_type: u8,
    pub code: u8,
    pub id: u16,
    pub seq: u16,
    pub data: Vec<u8>,
}

impl IcmpPacket {
    pub fn new(icmp_type: u8, code: u8, id: u16, seq: u16, data: Vec<u8>) -> Self {
        IcmpPacket {
            icmp_type,
            code,
            id,
            seq,
            data,
        }
    }

    pub fn echo_request(id: u16, seq: u16, data: Vec<u8>) -> Self {
        Self::new(ICMP_TYPE_ECHO_REQUEST, 0, id, seq, data)
    }

    /// Builds the echo reply to this packet, preserving id/seq/data. Only
    /// meaningful when `self` is an echo request.
    pub fn to_echo_reply(&self) -> IcmpPacket {
        IcmpPacket::new(ICMP_TYPE_ECHO_REPLY, 0, self.id, self.seq, self.data.clone())
    }

    /// Decodes an ICMP message, verifying its checksum. `ChecksumMismatch`
    /// is returned verbatim rather than folded into a generic drop so
    /// callers can distinguish "not ours" noise from on-wire corruption.
    pub fn decode(buf: &[u8]) -> Result<IcmpPacket> {
        if buf.len() < 8 {
            return Err(RouterError::DropPdu);
        }
        let icmp_type = buf[0];
        let code = buf[1];
        let checksum = u16::from_be_bytes([buf[2], buf[3]]);
        let id = u16::from_be_bytes([buf[4], buf[5]]);
        let seq = u16::from_be_bytes([buf[6], buf[7]]);

        let mut zeroed = buf.to_vec();
        zeroed[2] = 0;
        zeroed[3] = 0;
        if ones_complement_checksum(&zeroed) != checksum {
            return Err(RouterError::ChecksumMismatch);
        }

        Ok(IcmpPacket {
            icmp_type,
            code,
            id,
            seq,
            data: buf[8..].to_vec(),
        })
    }

    /// Encodes the packet and computes a fresh checksum over the whole
    /// message with the checksum field zeroed first.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(8 + self.data.len());
        out.push(self.icmp_type);
        out.push(self.code);
        out.extend_from_slice(&[0, 0]); // checksum placeholder
        out.extend_from_slice(&self.id.to_be_bytes());
        out.extend_from_slice(&self.seq.to_be_bytes());
        out.extend_from_slice(&self.data);

        let checksum = ones_complement_checksum(&out);
        out[2..4].copy_from_slice(&checksum.to_be_bytes());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_preserving_fields() {
        let pkt = IcmpPacket::echo_request(1, 2, vec![0xde, 0xad, 0xbe, 0xef]);
        let encoded = pkt.encode();
        let decoded = IcmpPacket::decode(&encoded).unwrap();
        assert_eq!(decoded, pkt);
    }

    #[test]
    fn fresh_encoding_validates_its_own_checksum() {
        let pkt = IcmpPacket::echo_request(7, 9, vec![1, 2, 3]);
        assert!(IcmpPacket::decode(&pkt.encode()).is_ok());
    }

    #[test]
    fn corrupted_payload_fails_checksum() {
        let mut encoded = IcmpPacket::echo_request(1, 1, vec![1, 2, 3]).encode();
        let last = encoded.len() - 1;
        encoded[last] ^= 0xFF;
        assert_eq!(
            IcmpPacket::decode(&encoded).unwrap_err(),
            RouterError::ChecksumMismatch
        );
    }

    #[test]
    fn echo_reply_preserves_id_seq_data() {
        let req = IcmpPacket::echo_request(200, 5, vec![9, 9, 9]);
        let reply = req.to_echo_reply();
        assert_eq!(reply.icmp_type, ICMP_TYPE_ECHO_REPLY);
        assert_eq!(reply.id, req.id);
        assert_eq!(reply.seq, req.seq);
        assert_eq!(reply.data, req.data);
    }
}
