//! The pipeline's worker stages: one port (a message type plus the channel
//! it travels on) per stage, composed by [`crate::orchestrator::Orchestrator`].
//! No stage knows about any other stage's internals — only the message
//! types below, which is what lets them be wired up (or re-wired, for
//! tests) purely at construction time.

pub mod arp_handler;
pub mod icmp_terminator;
pub mod ip_egress;
pub mod ip_ingress;
pub mod router;

use std::sync::Arc;

use crate::interface::InterfaceConfig;
use crate::pdu::Ipv4Pdu;
use crate::route::Route;

/// Output of the IPv4 ingress handler: a parsed packet plus the interface it
/// arrived on.
pub struct IngressIpPacket {
    pub pdu: Ipv4Pdu,
    pub inbound: Arc<InterfaceConfig>,
}

/// A packet injected straight into the router's forwarding case, bypassing
/// local delivery (used by the ping originator). `Ipv4Addr::UNSPECIFIED` in
/// `pdu.src` means "fill in the source from whichever interface the route
/// lookup selects".
pub struct LocalOriginationPacket {
    pub pdu: Ipv4Pdu,
}

/// Sent by the router to a registered protocol handler for local delivery.
pub struct LocalDeliverMessage {
    pub pdu: Ipv4Pdu,
    pub inbound: Arc<InterfaceConfig>,
}

/// A protocol handler's reply, fed back into the router so it can perform a
/// second route lookup on the reply's own destination.
pub struct LocalDeliveryReply {
    pub pdu: Ipv4Pdu,
}

/// Output of the router: a packet ready for the egress handler, paired with
/// the route that selected its next hop.
pub struct RoutedPdu {
    pub pdu: Ipv4Pdu,
    pub route: Route,
}
