//! Error types shared across the pipeline.

use std::fmt;
use std::net::Ipv4Addr;

/// Everything that can go wrong while configuring or running the router.
///
/// Pipeline-internal errors (bad checksums, no route, a dropped PDU) are
/// never fatal — a worker that receives one logs it at `error!`/`warn!` and
/// moves on to the next frame. Configuration errors (`add_interface`,
/// `RouteTable::add`) are returned to the caller and rejected outright.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouterError {
    /// Malformed `name:ip/prefix` interface configuration string.
    InvalidInterfaceConfig(String),
    /// A byte slice handed to an address parser was not 4 bytes long.
    NotAnIpv4Address,
    /// A byte slice handed to an address parser was not 6 bytes long.
    NotAMacAddress,
    /// A route's destination has nonzero host bits under its own mask.
    NotANetworkAddress,
    /// A link-local route was given a next-hop.
    LinkLocalRouteShouldNotHaveNextHop,
    /// A static route's next-hop does not lie on its out-interface's subnet.
    NextHopNotOnLinkLocalNetwork,
    /// No route in the table matched a lookup.
    NoRoute,
    /// Explicit "drop this PDU" signal raised inside the pipeline.
    DropPdu,
    /// An ARP PDU was not HTYPE=1/PTYPE=0x0800/HLEN=6/PLEN=4.
    UnsupportedArpProtocol,
    /// No handler registered for a frame's EtherType.
    NoLinkLayerHandler(u16),
    /// No handler registered for an IPv4 packet's protocol number.
    NoInternetLayerHandler(u8),
    /// `ARPCache::resolve` exhausted its 1-second resolution budget.
    ArpTimeout(Ipv4Addr),
    /// Egress before the cache's writer was injected by the interface worker.
    ArpWriterNotInitialized,
    /// A checksum did not match on decode.
    ChecksumMismatch,
    /// A route index handed to `RouteTable::delete` was out of bounds.
    NoSuchRoute(usize),
    /// An out-interface named in a route does not exist.
    NoSuchInterface(String),
    /// A raw socket or host interface lookup failed.
    Io(String),
}

impl fmt::Display for RouterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouterError::InvalidInterfaceConfig(s) => {
                write!(f, "invalid interface config string: {s:?}")
            }
            RouterError::NotAnIpv4Address => write!(f, "value is not a 4-byte IPv4 address"),
            RouterError::NotAMacAddress => write!(f, "value is not a 6-byte MAC address"),
            RouterError::NotANetworkAddress => {
                write!(f, "route destination has nonzero host bits under its mask")
            }
            RouterError::LinkLocalRouteShouldNotHaveNextHop => {
                write!(f, "link-local route must not have a next-hop")
            }
            RouterError::NextHopNotOnLinkLocalNetwork => write!(
                f,
                "static route's next-hop is not on the out-interface's subnet"
            ),
            RouterError::NoRoute => write!(f, "no matching route"),
            RouterError::DropPdu => write!(f, "pdu dropped"),
            RouterError::UnsupportedArpProtocol => {
                write!(f, "ARP pdu is not Ethernet/IPv4 (HTYPE/PTYPE/HLEN/PLEN mismatch)")
            }
            RouterError::NoLinkLayerHandler(et) => {
                write!(f, "no link-layer handler registered for ethertype 0x{et:04x}")
            }
            RouterError::NoInternetLayerHandler(proto) => {
                write!(f, "no internet-layer handler registered for protocol {proto}")
            }
            RouterError::ArpTimeout(ip) => write!(f, "ARP resolution of {ip} timed out"),
            RouterError::ArpWriterNotInitialized => {
                write!(f, "ARP cache's writer was never injected")
            }
            RouterError::ChecksumMismatch => write!(f, "checksum mismatch"),
            RouterError::NoSuchRoute(i) => write!(f, "no route at index {i}"),
            RouterError::NoSuchInterface(name) => write!(f, "no such interface: {name:?}"),
            RouterError::Io(msg) => write!(f, "I/O error: {msg}"),
        }
    }
}

impl std::error::Error for RouterError {}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, RouterError>;
