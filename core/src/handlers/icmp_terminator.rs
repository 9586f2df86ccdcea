//! ICMP terminator and ping originator: the router's only built-in
//! protocol handler. Answers echo requests addressed to a simulated
//! interface identity and logs echo replies that come back from a ping this
//! router originated.

use std::net::Ipv4Addr;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{select, Receiver, Sender};

use crate::cancel::CancellationToken;
use crate::handlers::{LocalDeliverMessage, LocalDeliveryReply, LocalOriginationPacket};
use crate::pdu::{IcmpPacket, Ipv4Pdu, PROTO_ICMP, ICMP_TYPE_ECHO_REPLY, ICMP_TYPE_ECHO_REQUEST};

/// Interval between successive echoes sent by [`spawn_ping`].
const PING_INTERVAL: Duration = Duration::from_secs(1);

/// Spawns the ICMP terminator thread. `reply_tx` feeds generated replies
/// back into the router for a second route lookup.
pub fn spawn(
    deliver_rx: Receiver<LocalDeliverMessage>,
    reply_tx: Sender<LocalDeliveryReply>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    thread::spawn(move || run(&deliver_rx, &reply_tx, &cancel))
}

fn run(deliver_rx: &Receiver<LocalDeliverMessage>, reply_tx: &Sender<LocalDeliveryReply>, cancel: &CancellationToken) {
    loop {
        select! {
            recv(deliver_rx) -> msg => match msg {
                Ok(deliver) => handle(deliver, reply_tx),
                Err(_) => return,
            },
            recv(cancel.receiver()) -> _ => return,
        }
    }
}

fn handle(deliver: LocalDeliverMessage, reply_tx: &Sender<LocalDeliveryReply>) {
    let LocalDeliverMessage { pdu, .. } = deliver;

    let icmp = match IcmpPacket::decode(&pdu.payload) {
        Ok(icmp) => icmp,
        Err(e) => {
            log::debug!("dropping malformed icmp packet from {}: {e}", pdu.src);
            return;
        }
    };

    match icmp.icmp_type {
        ICMP_TYPE_ECHO_REQUEST => {
            let reply = icmp.to_echo_reply();
            let reply_pdu = Ipv4Pdu::new(pdu.dst, pdu.src, PROTO_ICMP, reply.encode());
            if reply_tx.send(LocalDeliveryReply { pdu: reply_pdu }).is_err() {
                log::debug!("router reply queue closed, dropping echo reply to {}", pdu.src);
            }
        }
        ICMP_TYPE_ECHO_REPLY => {
            log::info!("64 bytes from {}: icmp_seq={}, ttl={}", pdu.src, icmp.seq, pdu.ttl);
        }
        other => {
            log::debug!("dropping unsupported icmp type {other} from {}", pdu.src);
        }
    }
}

/// Originates `count` echo requests to `target`, one per second, for
/// sequences 1..=count, `id = 200 + seq` and 48 random bytes of payload per
/// request, via the router's local-origination intake. Source and
/// out-interface are left for the router to fill in from its route lookup.
/// Stops early if cancelled.
pub fn spawn_ping(
    target: Ipv4Addr,
    count: u32,
    local_origin_tx: Sender<LocalOriginationPacket>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    thread::spawn(move || {
        for seq in 1..=count {
            if cancel.is_cancelled() {
                return;
            }
            let data: Vec<u8> = (0..48).map(|_| rand::random::<u8>()).collect();
            let echo = IcmpPacket::echo_request(200 + seq as u16, seq as u16, data);
            let pdu = Ipv4Pdu::new(Ipv4Addr::UNSPECIFIED, target, PROTO_ICMP, echo.encode());
            if local_origin_tx.send(LocalOriginationPacket { pdu }).is_err() {
                return;
            }
            if seq < count {
                thread::sleep(PING_INTERVAL);
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::InterfaceConfig;
    use crate::cancel::cancellation_pair;
    use crossbeam_channel::bounded;
    use ipnetwork::Ipv4Network;
    use pnet::util::MacAddr;
    use std::str::FromStr;
    use std::time::Duration as StdDuration;

    fn test_interface() -> std::sync::Arc<InterfaceConfig> {
        InterfaceConfig::for_test(
            "eth0",
            Ipv4Network::from_str("192.168.100.0/24").unwrap(),
            MacAddr::new(1, 1, 1, 1, 1, 1),
        )
    }

    #[test]
    fn echo_request_produces_a_reply_with_swapped_addresses() {
        let (deliver_tx, deliver_rx) = bounded(4);
        let (reply_tx, reply_rx) = bounded(4);
        let (cancel, _handle) = cancellation_pair();

        let src: Ipv4Addr = "192.168.100.55".parse().unwrap();
        let dst: Ipv4Addr = "192.168.100.1".parse().unwrap();
        let echo = IcmpPacket::echo_request(1, 1, vec![1, 2, 3]);
        let pdu = Ipv4Pdu::new(src, dst, PROTO_ICMP, echo.encode());
        deliver_tx
            .send(LocalDeliverMessage {
                pdu,
                inbound: test_interface(),
            })
            .unwrap();

        let worker = spawn(deliver_rx, reply_tx, cancel);
        let reply = reply_rx.recv_timeout(StdDuration::from_secs(1)).unwrap();
        assert_eq!(reply.pdu.src, dst);
        assert_eq!(reply.pdu.dst, src);
        let icmp_reply = IcmpPacket::decode(&reply.pdu.payload).unwrap();
        assert_eq!(icmp_reply.icmp_type, ICMP_TYPE_ECHO_REPLY);
        assert_eq!(icmp_reply.seq, 1);
        drop(worker);
    }

    #[test]
    fn echo_reply_produces_no_further_message() {
        let (deliver_tx, deliver_rx) = bounded(4);
        let (reply_tx, reply_rx) = bounded(4);
        let (cancel, _handle) = cancellation_pair();

        let echo = IcmpPacket::new(ICMP_TYPE_ECHO_REPLY, 0, 1, 1, vec![1, 2, 3, 4]);
        let pdu = Ipv4Pdu::new(
            "10.0.0.1".parse().unwrap(),
            "192.168.100.1".parse().unwrap(),
            PROTO_ICMP,
            echo.encode(),
        );
        deliver_tx
            .send(LocalDeliverMessage {
                pdu,
                inbound: test_interface(),
            })
            .unwrap();

        let worker = spawn(deliver_rx, reply_tx, cancel);
        assert_eq!(
            reply_rx.recv_timeout(StdDuration::from_millis(200)),
            Err(crossbeam_channel::RecvTimeoutError::Timeout)
        );
        drop(worker);
    }

    #[test]
    fn spawn_ping_emits_count_requests_with_unspecified_source() {
        let (local_origin_tx, local_origin_rx) = bounded(8);
        let (cancel, _handle) = cancellation_pair();

        let worker = spawn_ping("192.168.100.1".parse().unwrap(), 2, local_origin_tx, cancel);
        let first = local_origin_rx.recv_timeout(StdDuration::from_secs(1)).unwrap();
        assert_eq!(first.pdu.src, Ipv4Addr::UNSPECIFIED);
        assert_eq!(first.pdu.dst, "192.168.100.1".parse::<Ipv4Addr>().unwrap());
        let first_icmp = IcmpPacket::decode(&first.pdu.payload).unwrap();
        assert_eq!(first_icmp.seq, 1);
        assert_eq!(first_icmp.id, 201);
        assert_eq!(first_icmp.data.len(), 48);
        let second = local_origin_rx.recv_timeout(StdDuration::from_secs(2)).unwrap();
        let icmp = IcmpPacket::decode(&second.pdu.payload).unwrap();
        assert_eq!(icmp.seq, 2);
        worker.join().unwrap();
    }
}
