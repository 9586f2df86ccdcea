//! ARP handler: answers requests for an interface's own simulated
//! IP and learns mappings from replies. Runs as one long-lived worker task
//! reading the link-layer dispatcher's ARP queue and writing straight to
//! the orchestrator's outbox.

use std::thread::{self, JoinHandle};

use crossbeam_channel::{select, Receiver, Sender};

use crate::cancel::CancellationToken;
use crate::interface::{FrameIn, FrameOut};
use crate::pdu::{ArpPdu, Frame, ARP_OP_REPLY, ARP_OP_REQUEST, ETHERTYPE_ARP, MAC_ZERO};

/// Spawns the ARP handler thread. `frame_in_rx` carries only
/// `ethertype == ETHERTYPE_ARP` frames (the orchestrator's dispatch table
/// guarantees this); `outbox_tx` is shared with every other handler that
/// emits frames.
pub fn spawn(
    frame_in_rx: Receiver<FrameIn>,
    outbox_tx: Sender<FrameOut>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    thread::spawn(move || run(&frame_in_rx, &outbox_tx, &cancel))
}

fn run(frame_in_rx: &Receiver<FrameIn>, outbox_tx: &Sender<FrameOut>, cancel: &CancellationToken) {
    loop {
        select! {
            recv(frame_in_rx) -> msg => {
                match msg {
                    Ok(frame_in) => handle(frame_in, outbox_tx),
                    Err(_) => return,
                }
            }
            recv(cancel.receiver()) -> _ => return,
        }
    }
}

fn handle(frame_in: FrameIn, outbox_tx: &Sender<FrameOut>) {
    let FrameIn { frame, interface } = frame_in;

    let arp = match ArpPdu::decode(&frame.payload) {
        Ok(arp) if arp.is_ethernet_ipv4() => arp,
        Ok(_) => {
            log::debug!("[iface:{}] dropping non-Ethernet/IPv4 ARP pdu", interface.name);
            return;
        }
        Err(e) => {
            log::debug!("[iface:{}] dropping malformed ARP pdu: {e}", interface.name);
            return;
        }
    };

    match arp.op {
        ARP_OP_REPLY => {
            interface.arp_cache.store(arp.spa, arp.sha);
        }
        ARP_OP_REQUEST if arp.tpa == interface.simulated_ip() && arp.tha == MAC_ZERO => {
            let reply = ArpPdu::new(ARP_OP_REPLY, interface.mac(), interface.simulated_ip(), arp.sha, arp.spa);
            let out = Frame::new(arp.sha, interface.mac(), ETHERTYPE_ARP, reply.encode());
            if outbox_tx.send(FrameOut { frame: out }).is_err() {
                log::debug!("[iface:{}] outbox closed, dropping ARP reply", interface.name);
            }
        }
        _ => {
            log::trace!("[iface:{}] ARP pdu not for this interface, dropping", interface.name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::cancellation_pair;
    use crate::interface::InterfaceConfig;
    use crossbeam_channel::{bounded, RecvTimeoutError};
    use ipnetwork::Ipv4Network;
    use pnet::util::MacAddr;
    use std::str::FromStr;
    use std::time::Duration;

    fn test_interface() -> std::sync::Arc<InterfaceConfig> {
        InterfaceConfig::for_test(
            "eth0",
            Ipv4Network::from_str("192.168.100.0/24").unwrap(),
            MacAddr::new(1, 1, 1, 1, 1, 1),
        )
    }

    #[test]
    fn answers_request_for_own_simulated_ip() {
        let (frame_in_tx, frame_in_rx) = bounded(8);
        let (outbox_tx, outbox_rx) = bounded(8);
        let (cancel, _handle) = cancellation_pair();
        let iface = test_interface();

        let request = ArpPdu::new(
            ARP_OP_REQUEST,
            MacAddr::new(2, 2, 2, 2, 2, 2),
            "192.168.100.50".parse().unwrap(),
            MAC_ZERO,
            iface.simulated_ip(),
        );
        let frame = Frame::new(
            pnet::util::MacAddr::broadcast(),
            request.sha,
            ETHERTYPE_ARP,
            request.encode(),
        );
        frame_in_tx
            .send(FrameIn {
                frame,
                interface: iface.clone(),
            })
            .unwrap();

        let worker = spawn(frame_in_rx, outbox_tx, cancel);
        let out = outbox_rx.recv_timeout(Duration::from_secs(1)).unwrap();
        let reply = ArpPdu::decode(&out.frame.payload).unwrap();
        assert_eq!(reply.op, ARP_OP_REPLY);
        assert_eq!(reply.spa, iface.simulated_ip());
        assert_eq!(reply.tpa, request.spa);
        assert_eq!(reply.sha, iface.mac());

        drop(worker);
    }

    #[test]
    fn request_for_a_different_ip_is_ignored() {
        let (frame_in_tx, frame_in_rx) = bounded(8);
        let (outbox_tx, outbox_rx) = bounded(8);
        let (cancel, _handle) = cancellation_pair();
        let iface = test_interface();

        let request = ArpPdu::new(
            ARP_OP_REQUEST,
            MacAddr::new(2, 2, 2, 2, 2, 2),
            "192.168.100.50".parse().unwrap(),
            MAC_ZERO,
            "192.168.100.254".parse().unwrap(),
        );
        let frame = Frame::new(pnet::util::MacAddr::broadcast(), request.sha, ETHERTYPE_ARP, request.encode());
        frame_in_tx.send(FrameIn { frame, interface: iface }).unwrap();

        let _worker = spawn(frame_in_rx, outbox_tx, cancel);
        assert_eq!(
            outbox_rx.recv_timeout(Duration::from_millis(200)),
            Err(RecvTimeoutError::Timeout)
        );
    }

    #[test]
    fn reply_is_learned_into_the_arp_cache() {
        let (frame_in_tx, frame_in_rx) = bounded(8);
        let (outbox_tx, _outbox_rx) = bounded(8);
        let (cancel, _handle) = cancellation_pair();
        let iface = test_interface();

        let sender_mac = MacAddr::new(3, 3, 3, 3, 3, 3);
        let sender_ip: std::net::Ipv4Addr = "192.168.100.77".parse().unwrap();
        let reply = ArpPdu::new(ARP_OP_REPLY, sender_mac, sender_ip, iface.mac(), iface.simulated_ip());
        let frame = Frame::new(iface.mac(), sender_mac, ETHERTYPE_ARP, reply.encode());
        frame_in_tx
            .send(FrameIn {
                frame,
                interface: iface.clone(),
            })
            .unwrap();

        let worker = spawn(frame_in_rx, outbox_tx, cancel);
        thread::sleep(Duration::from_millis(100));
        assert_eq!(iface.arp_cache.get(sender_ip), Some(sender_mac));
        drop(worker);
    }
}
