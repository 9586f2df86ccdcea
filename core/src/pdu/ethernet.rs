//! Ethernet II framing.

use pnet::util::MacAddr;

use crate::error::{Result, RouterError};

/// EtherType for ARP.
pub const ETHERTYPE_ARP: u16 = 0x0806;
/// EtherType for IPv4.
pub const ETHERTYPE_IPV4: u16 = 0x0800;

/// The all-ones broadcast hardware address.
pub const MAC_BROADCAST: MacAddr = MacAddr(0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF);
/// The all-zeros hardware address, used as ARP's "unknown" THA.
pub const MAC_ZERO: MacAddr = MacAddr(0, 0, 0, 0, 0, 0);

/// Converts a `MacAddr` to its 6 octets, in transmission order.
pub fn mac_octets(mac: MacAddr) -> [u8; 6] {
    let MacAddr(a, b, c, d, e, f) = mac;
    [a, b, c, d, e, f]
}

/// Builds a `MacAddr` from 6 octets.
pub fn mac_from_octets(bytes: [u8; 6]) -> MacAddr {
    MacAddr(bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5])
}

/// A decoded Ethernet II frame: header fields plus the unparsed payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub dst: MacAddr,
    pub src: MacAddr,
    pub ethertype: u16,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(dst: MacAddr, src: MacAddr, ethertype: u16, payload: Vec<u8>) -> Self {
        Frame {
            dst,
            src,
            ethertype,
            payload,
        }
    }

    /// Decodes a frame off the wire. Fails if shorter than the 14-byte header.
    pub fn decode(buf: &[u8]) -> Result<Frame> {
        if buf.len() < 14 {
            return Err(RouterError::DropPdu);
        }
        let dst = mac_from_octets(buf[0..6].try_into().unwrap());
        let src = mac_from_octets(buf[6..12].try_into().unwrap());
        let ethertype = u16::from_be_bytes([buf[12], buf[13]]);
        Ok(Frame {
            dst,
            src,
            ethertype,
            payload: buf[14..].to_vec(),
        })
    }

    /// Encodes the frame onto the wire.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(14 + self.payload.len());
        out.extend_from_slice(&mac_octets(self.dst));
        out.extend_from_slice(&mac_octets(self.src));
        out.extend_from_slice(&self.ethertype.to_be_bytes());
        out.extend_from_slice(&self.payload);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_encode_decode() {
        let frame = Frame::new(
            MAC_BROADCAST,
            MacAddr::new(1, 1, 1, 2, 2, 2),
            ETHERTYPE_ARP,
            vec![1, 2, 3, 4],
        );
        let encoded = frame.encode();
        let decoded = Frame::decode(&encoded).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn decode_rejects_short_buffers() {
        assert!(Frame::decode(&[0u8; 10]).is_err());
    }
}
