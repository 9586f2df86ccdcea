//! The router: the one component that knows about routes,
//! interfaces, and protocol handlers all at once. Runs as a single
//! long-lived worker task multiplexing three inbound queues — packets
//! freshly decoded off the wire, packets locally originated (the ping
//! initiator), and replies handed back by a protocol handler — against one
//! outbound queue to the egress handler.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{select, Receiver, Sender};

use crate::cancel::CancellationToken;
use crate::handlers::{
    IngressIpPacket, LocalDeliverMessage, LocalDeliveryReply, LocalOriginationPacket, RoutedPdu,
};
use crate::interface::InterfaceRegistry;
use crate::pdu::Ipv4Pdu;
use crate::route::RouteTable;

/// Per-protocol local-delivery queues, keyed by IP protocol number. The set
/// of protocols this router understands is small and fixed, so a plain
/// lookup table is all the dispatch this needs.
pub type ProtocolHandlers = HashMap<u8, Sender<LocalDeliverMessage>>;

#[allow(clippy::too_many_arguments)]
pub fn spawn(
    route_table: Arc<RouteTable>,
    interfaces: Arc<InterfaceRegistry>,
    protocol_handlers: ProtocolHandlers,
    ingress_rx: Receiver<IngressIpPacket>,
    local_origin_rx: Receiver<LocalOriginationPacket>,
    reply_rx: Receiver<LocalDeliveryReply>,
    egress_tx: Sender<RoutedPdu>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    thread::spawn(move || {
        run(
            &route_table,
            &interfaces,
            &protocol_handlers,
            &ingress_rx,
            &local_origin_rx,
            &reply_rx,
            &egress_tx,
            &cancel,
        )
    })
}

#[allow(clippy::too_many_arguments)]
fn run(
    route_table: &RouteTable,
    interfaces: &InterfaceRegistry,
    protocol_handlers: &ProtocolHandlers,
    ingress_rx: &Receiver<IngressIpPacket>,
    local_origin_rx: &Receiver<LocalOriginationPacket>,
    reply_rx: &Receiver<LocalDeliveryReply>,
    egress_tx: &Sender<RoutedPdu>,
    cancel: &CancellationToken,
) {
    loop {
        select! {
            recv(ingress_rx) -> msg => match msg {
                Ok(packet) => handle_ingress(packet, route_table, interfaces, protocol_handlers, egress_tx),
                Err(_) => return,
            },
            recv(local_origin_rx) -> msg => match msg {
                Ok(packet) => forward(packet.pdu, route_table, interfaces, egress_tx, true),
                Err(_) => return,
            },
            recv(reply_rx) -> msg => match msg {
                Ok(reply) => forward(reply.pdu, route_table, interfaces, egress_tx, false),
                Err(_) => return,
            },
            recv(cancel.receiver()) -> _ => return,
        }
    }
}

fn handle_ingress(
    packet: IngressIpPacket,
    route_table: &RouteTable,
    interfaces: &InterfaceRegistry,
    protocol_handlers: &ProtocolHandlers,
    egress_tx: &Sender<RoutedPdu>,
) {
    let IngressIpPacket { pdu, inbound } = packet;

    // Case 1: addressed to the host's real (non-simulated) address. This
    // router never terminates real-address traffic, only simulated-address
    // traffic.
    if inbound.real_ip() == Some(pdu.dst) {
        log::trace!("[iface:{}] ignoring traffic addressed to the real interface", inbound.name);
        return;
    }

    // Case 2: addressed to this interface's simulated identity. Local
    // delivery to whichever protocol handler owns `pdu.protocol`.
    if pdu.dst == inbound.simulated_ip() {
        match protocol_handlers.get(&pdu.protocol) {
            Some(handler_tx) => {
                if handler_tx
                    .send(LocalDeliverMessage {
                        pdu,
                        inbound: inbound.clone(),
                    })
                    .is_err()
                {
                    log::debug!("[iface:{}] protocol handler queue closed", inbound.name);
                }
            }
            None => {
                log::debug!(
                    "[iface:{}] no handler for ip protocol {}, dropping",
                    inbound.name,
                    pdu.protocol
                );
            }
        }
        return;
    }

    // Case 3: forward.
    forward(pdu, route_table, interfaces, egress_tx, true);
}

/// Routes `pdu` towards its destination. `decrement` is true for packets
/// that traverse an actual hop (forwarded traffic and locally-originated
/// traffic alike, both of which enter here straight at the forwarding step)
/// and false for a protocol handler's freshly-minted reply, which is not
/// decremented again on top of the TTL the handler already set.
fn forward(
    mut pdu: Ipv4Pdu,
    route_table: &RouteTable,
    interfaces: &InterfaceRegistry,
    egress_tx: &Sender<RoutedPdu>,
    decrement: bool,
) {
    let route = match route_table.lookup(pdu.dst) {
        Some(route) => route,
        None => {
            log::debug!("no route to {}, dropping", pdu.dst);
            return;
        }
    };

    if pdu.src == Ipv4Addr::UNSPECIFIED {
        if let Some(out_iface) = interfaces.get(&route.out_interface) {
            pdu.src = out_iface.simulated_ip();
        }
    }

    if decrement {
        pdu = match pdu.decrement_ttl() {
            Some(pdu) => pdu,
            None => {
                log::debug!("ttl exhausted en route to {}, dropping", pdu.dst);
                return;
            }
        };
    }

    if egress_tx.send(RoutedPdu { pdu, route }).is_err() {
        log::debug!("egress queue closed, dropping routed pdu");
    }
}
