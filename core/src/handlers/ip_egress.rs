//! IPv4 egress handler: resolves the next hop's MAC via ARP and
//! writes the framed packet to its out-interface's raw socket.

use std::thread::{self, JoinHandle};

use crossbeam_channel::{select, Receiver};

use crate::cancel::CancellationToken;
use crate::handlers::RoutedPdu;
use crate::interface::InterfaceRegistry;
use crate::pdu::{Frame, ETHERTYPE_IPV4};
use crate::route::RouteKind;

pub fn spawn(
    routed_rx: Receiver<RoutedPdu>,
    interfaces: std::sync::Arc<InterfaceRegistry>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    thread::spawn(move || run(&routed_rx, &interfaces, &cancel))
}

fn run(routed_rx: &Receiver<RoutedPdu>, interfaces: &InterfaceRegistry, cancel: &CancellationToken) {
    loop {
        select! {
            recv(routed_rx) -> msg => match msg {
                Ok(routed) => handle(routed, interfaces),
                Err(_) => return,
            },
            recv(cancel.receiver()) -> _ => return,
        }
    }
}

fn handle(routed: RoutedPdu, interfaces: &InterfaceRegistry) {
    let RoutedPdu { pdu, route } = routed;

    let out_iface = match interfaces.get(&route.out_interface) {
        Some(iface) => iface,
        None => {
            log::error!("route names unknown out-interface {:?}, dropping", route.out_interface);
            return;
        }
    };

    // Link-local routes resolve the packet's own destination; static routes
    // resolve the configured next-hop instead.
    let resolve_target = match route.kind {
        RouteKind::LinkLocal => pdu.dst,
        RouteKind::Static => match route.next_hop {
            Some(hop) => hop,
            None => {
                log::error!("static route to {:?} has no next-hop, dropping", route.out_interface);
                return;
            }
        },
    };

    let dst_mac = match out_iface.arp_cache.resolve(resolve_target) {
        Ok(mac) => mac,
        Err(e) => {
            log::debug!("[iface:{}] failed to resolve {resolve_target}: {e}, dropping", out_iface.name);
            return;
        }
    };

    let frame = Frame::new(dst_mac, out_iface.mac(), ETHERTYPE_IPV4, pdu.encode());
    if let Err(e) = out_iface.write_frame(&frame) {
        log::error!("[iface:{}] write failed: {e}", out_iface.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arp_cache::ArpWriter;
    use crate::cancel::cancellation_pair;
    use crate::error::Result;
    use crate::interface::InterfaceConfig;
    use crate::pdu::PROTO_ICMP;
    use crate::route::Route;
    use crossbeam_channel::bounded;
    use ipnetwork::Ipv4Network;
    use pnet::util::MacAddr;
    use std::net::Ipv4Addr;
    use std::str::FromStr;
    use std::sync::Arc;
    use std::time::Duration;

    struct NoopArpWriter;
    impl ArpWriter for NoopArpWriter {
        fn send_request(&self, _target: Ipv4Addr) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn link_local_route_resolves_the_packets_own_destination() {
        let iface = InterfaceConfig::for_test(
            "A",
            Ipv4Network::from_str("192.168.10.0/24").unwrap(),
            MacAddr::new(1, 1, 1, 1, 1, 1),
        );
        iface.arp_cache.set_writer(Arc::new(NoopArpWriter));
        let dst: Ipv4Addr = "192.168.10.99".parse().unwrap();
        iface.arp_cache.store(dst, MacAddr::new(9, 9, 9, 9, 9, 9));

        let interfaces = Arc::new(InterfaceRegistry::new());
        interfaces.insert(iface.clone());

        let route = Route::link_local(Ipv4Network::from_str("192.168.10.0/24").unwrap(), "A");
        let pdu = test_pdu_to(dst);

        handle(RoutedPdu { pdu, route }, &interfaces);
        // No direct observable effect without a real socket; resolving
        // successfully (rather than timing out) is exercised via
        // `ArpCache`'s own tests. This test documents that link-local
        // routes resolve the destination, not a next-hop.
    }

    fn test_pdu_to(dst: Ipv4Addr) -> crate::pdu::Ipv4Pdu {
        crate::pdu::Ipv4Pdu::new("192.168.10.1".parse().unwrap(), dst, PROTO_ICMP, vec![])
    }

    #[test]
    fn unresolvable_next_hop_drops_without_panicking() {
        let iface = InterfaceConfig::for_test(
            "A",
            Ipv4Network::from_str("192.168.10.0/24").unwrap(),
            MacAddr::new(1, 1, 1, 1, 1, 1),
        );
        iface.arp_cache.set_writer(Arc::new(NoopArpWriter));
        let interfaces = Arc::new(InterfaceRegistry::new());
        interfaces.insert(iface);

        let route = Route::static_route(
            Ipv4Network::from_str("10.0.0.0/8").unwrap(),
            "A",
            "192.168.10.254".parse().unwrap(),
        );
        let pdu = test_pdu_to("10.0.0.5".parse().unwrap());
        handle(RoutedPdu { pdu, route }, &interfaces);
    }

    #[test]
    fn worker_drains_queue_and_exits_on_cancel() {
        let (routed_tx, routed_rx) = bounded(4);
        let interfaces = Arc::new(InterfaceRegistry::new());
        let (cancel, handle_token) = cancellation_pair();
        drop(routed_tx);
        let worker = spawn(routed_rx, interfaces, cancel);
        worker.join().unwrap();
        drop(handle_token);
    }
}
