//! IPv4 ingress handler: decodes inbound IPv4 frames, opportunistically
//! learns the sender's IP→MAC mapping, and forwards the decoded packet to the
//! router.

use std::thread::{self, JoinHandle};

use crossbeam_channel::{select, Receiver, Sender};

use crate::cancel::CancellationToken;
use crate::handlers::IngressIpPacket;
use crate::interface::FrameIn;
use crate::pdu::Ipv4Pdu;

/// Spawns the IPv4 ingress handler thread. `frame_in_rx` carries only
/// `ethertype == ETHERTYPE_IPV4` frames.
pub fn spawn(
    frame_in_rx: Receiver<FrameIn>,
    router_tx: Sender<IngressIpPacket>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    thread::spawn(move || run(&frame_in_rx, &router_tx, &cancel))
}

fn run(frame_in_rx: &Receiver<FrameIn>, router_tx: &Sender<IngressIpPacket>, cancel: &CancellationToken) {
    loop {
        select! {
            recv(frame_in_rx) -> msg => {
                match msg {
                    Ok(frame_in) => handle(frame_in, router_tx),
                    Err(_) => return,
                }
            }
            recv(cancel.receiver()) -> _ => return,
        }
    }
}

fn handle(frame_in: FrameIn, router_tx: &Sender<IngressIpPacket>) {
    let FrameIn { frame, interface } = frame_in;

    let pdu = match Ipv4Pdu::decode(&frame.payload) {
        Ok(pdu) => pdu,
        Err(e) => {
            log::debug!("[iface:{}] dropping malformed IPv4 pdu: {e}", interface.name);
            return;
        }
    };

    // Every inbound frame carries the sender's link-layer source; learn it
    // regardless of whether the packet is addressed to us, same as a real
    // ARP cache fed by ordinary traffic.
    interface.arp_cache.store(pdu.src, frame.src);

    if router_tx.send(IngressIpPacket { pdu, inbound: interface.clone() }).is_err() {
        log::debug!("[iface:{}] router queue closed, dropping inbound ipv4 pdu", interface.name);
    }
}
