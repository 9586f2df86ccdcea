//! Protocol data unit codecs: Ethernet, ARPv4, IPv4, ICMPv4.
//!
//! Every codec here is byte-exact to its wire format; none of them consult
//! `smoltcp` or `pnet::packet`-style zero-copy views, since hand-rolled
//! encode/decode is simpler to reason about than pulling in a
//! general-purpose network stack crate for four small fixed layouts.

pub mod arp;
pub mod checksum;
pub mod ethernet;
pub mod icmp;
pub mod ipv4;

pub use arp::{ArpPdu, ARP_OP_REPLY, ARP_OP_REQUEST};
pub use checksum::ones_complement_checksum;
pub use ethernet::{mac_from_octets, mac_octets, Frame, ETHERTYPE_ARP, ETHERTYPE_IPV4, MAC_BROADCAST, MAC_ZERO};
pub use icmp::{IcmpPacket, ICMP_TYPE_ECHO_REPLY, ICMP_TYPE_ECHO_REQUEST};
pub use ipv4::{Ipv4Pdu, PROTO_ICMP};
