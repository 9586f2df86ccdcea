//! The orchestrator: owns every interface, the route table, and the
//! cancellation token; wires the handler ports together; and runs the
//! link-layer dispatch + egress demultiplex loop itself.
//!
//! ```text
//!           ┌──────────────┐  ethertype=ARP   ┌─────────────┐
//!           │              ├─────────────────>│ arp_handler │──┐
//!  ingress ─┤  dispatch    │                  └─────────────┘  │
//!  threads ─┤  (inbox)     │  ethertype=IPv4  ┌─────────────┐  │ outbox
//!           │              ├─────────────────>│ ip_ingress  │  │ (demux by
//!           └──────────────┘                  └──────┬──────┘  │ src MAC)
//!                                                     │         │
//!                                                     v         │
//!                                              ┌─────────────┐  │
//!                                              │   router    │  │
//!                                              └──┬───────┬──┘  │
//!                                 local-origin ────┘       │    │
//!                              (ping originator)      ┌────v────┐
//!                                                      │ icmp    │
//!                                                      │terminator│
//!                                                      └────┬────┘
//!                                                           │ reply
//!                                                           v
//!                                                     (back to router)
//!                                                           │
//!                                                      ┌────v─────┐
//!                                                      │ip_egress │──> outbox
//!                                                      └──────────┘
//! ```

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, select, Sender};
use ipnetwork::Ipv4Network;

use crate::cancel::{cancellation_pair, CancellationHandle, CancellationToken};
use crate::error::{Result, RouterError};
use crate::handlers::{
    arp_handler, icmp_terminator, ip_egress, ip_ingress, router as router_handler, LocalOriginationPacket,
};
use crate::interface::{FrameIn, FrameOut, InterfaceConfig, InterfaceRegistry};
use crate::pdu::{ETHERTYPE_ARP, ETHERTYPE_IPV4, PROTO_ICMP};
use crate::route::{Route, RouteTable};

/// Depth shared by every channel in the pipeline.
const CHANNEL_CAPACITY: usize = 128;

/// The running router. [`Orchestrator::new`] wires every handler
/// and starts every worker thread, including its own dispatch/demux loop;
/// nothing blocks the calling thread. [`add_interface`](Orchestrator::add_interface)
/// brings up interfaces (and their own ingress threads) against the
/// already-running pipeline. [`shutdown`](Orchestrator::shutdown) signals
/// every worker via the shared cancellation token and joins them all.
pub struct Orchestrator {
    interfaces: Arc<InterfaceRegistry>,
    routes: Arc<RouteTable>,
    cancel_handle: Option<CancellationHandle>,
    cancel_token: CancellationToken,
    worker_handles: Vec<JoinHandle<()>>,
    interface_handles: Mutex<Vec<JoinHandle<()>>>,
    inbox_tx: Sender<FrameIn>,
    local_origin_tx: Sender<LocalOriginationPacket>,
    dispatch: HashMap<u16, Sender<FrameIn>>,
}

impl Orchestrator {
    /// Builds the full handler graph and starts every worker thread. No
    /// interface has a live socket yet — call
    /// [`add_interface`](Orchestrator::add_interface) for each one.
    pub fn new() -> Self {
        let interfaces = Arc::new(InterfaceRegistry::new());
        let routes = Arc::new(RouteTable::new());
        let (cancel_token, cancel_handle) = cancellation_pair();

        let (inbox_tx, inbox_rx) = bounded::<FrameIn>(CHANNEL_CAPACITY);
        let (outbox_tx, outbox_rx) = bounded::<FrameOut>(CHANNEL_CAPACITY);

        let (arp_in_tx, arp_in_rx) = bounded::<FrameIn>(CHANNEL_CAPACITY);
        let (ip_in_tx, ip_in_rx) = bounded::<FrameIn>(CHANNEL_CAPACITY);

        let (router_ingress_tx, router_ingress_rx) = bounded(CHANNEL_CAPACITY);
        let (local_origin_tx, local_origin_rx) = bounded(CHANNEL_CAPACITY);
        let (reply_tx, reply_rx) = bounded(CHANNEL_CAPACITY);
        let (egress_tx, egress_rx) = bounded(CHANNEL_CAPACITY);
        let (icmp_in_tx, icmp_in_rx) = bounded(CHANNEL_CAPACITY);

        let mut protocol_handlers = HashMap::new();
        protocol_handlers.insert(PROTO_ICMP, icmp_in_tx);

        let mut worker_handles = Vec::new();
        worker_handles.push(arp_handler::spawn(arp_in_rx, outbox_tx.clone(), cancel_token.clone()));
        worker_handles.push(ip_ingress::spawn(ip_in_rx, router_ingress_tx, cancel_token.clone()));
        worker_handles.push(router_handler::spawn(
            Arc::clone(&routes),
            Arc::clone(&interfaces),
            protocol_handlers,
            router_ingress_rx,
            local_origin_rx,
            reply_rx,
            egress_tx,
            cancel_token.clone(),
        ));
        worker_handles.push(icmp_terminator::spawn(icmp_in_rx, reply_tx, cancel_token.clone()));
        worker_handles.push(ip_egress::spawn(egress_rx, Arc::clone(&interfaces), cancel_token.clone()));

        let mut dispatch = HashMap::new();
        dispatch.insert(ETHERTYPE_ARP, arp_in_tx);
        dispatch.insert(ETHERTYPE_IPV4, ip_in_tx);

        // The outbox demux (outbox -> source-MAC lookup -> write_frame) gets
        // its own background thread, same as every other worker above; the
        // inbox dispatch thread is spawned next, in `with_inbox_loop`.
        let demux_handle = spawn_demux_loop(outbox_rx, Arc::clone(&interfaces), cancel_token.clone());
        worker_handles.push(demux_handle);

        Orchestrator {
            interfaces,
            routes,
            cancel_handle: Some(cancel_handle),
            cancel_token,
            worker_handles,
            interface_handles: Mutex::new(Vec::new()),
            inbox_tx,
            local_origin_tx,
            dispatch,
        }
        .with_inbox_loop(inbox_rx)
    }

    fn with_inbox_loop(mut self, inbox_rx: crossbeam_channel::Receiver<FrameIn>) -> Self {
        let dispatch = self.dispatch.clone();
        let cancel = self.cancel_token.clone();
        self.worker_handles.push(thread::spawn(move || {
            run_inbox_dispatch(inbox_rx, dispatch, cancel);
        }));
        self
    }

    /// Configures and brings up a new interface: opens its raw sockets,
    /// records its MAC/real IP, registers it for routing, and installs a
    /// link-local route for its subnet with no next-hop.
    ///
    /// Interfaces can be added after the pipeline is already running, so
    /// this takes `&self`; the ingress threads it spawns are tracked in a
    /// `Mutex` rather than `worker_handles` to keep `shutdown` the only
    /// method requiring ownership.
    pub fn add_interface(&self, name: impl Into<String>, simulated_network: Ipv4Network) -> Result<()> {
        let name = name.into();
        let config = InterfaceConfig::new(name.clone(), simulated_network);
        let handles = config.setup_and_listen(self.cancel_token.clone(), self.inbox_tx.clone())?;
        self.interfaces.insert(config);
        self.interface_handles.lock().unwrap().extend(handles);

        let network = Ipv4Network::new(simulated_network.network(), simulated_network.prefix())
            .expect("prefix copied from an already-valid Ipv4Network is itself valid");
        self.routes.add(Route::link_local(network, name), &self.interfaces)
    }

    /// Validates and inserts a route (delegates to [`RouteTable::add`]).
    pub fn add_route(&self, route: Route) -> Result<()> {
        self.routes.add(route, &self.interfaces)
    }

    pub fn delete_route(&self, index: usize) -> Result<Route> {
        self.routes.delete(index)
    }

    pub fn list_routes(&self) -> Vec<Route> {
        self.routes.list()
    }

    pub fn list_interfaces(&self) -> Vec<Arc<InterfaceConfig>> {
        self.interfaces.list()
    }

    /// Originates `count` ICMP echo requests to `target`, one per second,
    /// via the router's local-origination intake.
    pub fn ping(&self, target: Ipv4Addr, count: u32) -> JoinHandle<()> {
        icmp_terminator::spawn_ping(target, count, self.local_origin_tx.clone(), self.cancel_token.clone())
    }

    /// Signals every worker to stop and waits for them to exit.
    pub fn shutdown(mut self) {
        if let Some(handle) = self.cancel_handle.take() {
            handle.cancel();
        }
        for worker in self.worker_handles.drain(..) {
            let _ = worker.join();
        }
        for worker in self.interface_handles.lock().unwrap().drain(..) {
            let _ = worker.join();
        }
    }
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new()
    }
}

fn run_inbox_dispatch(
    inbox_rx: crossbeam_channel::Receiver<FrameIn>,
    dispatch: HashMap<u16, Sender<FrameIn>>,
    cancel: CancellationToken,
) {
    loop {
        select! {
            recv(inbox_rx) -> msg => match msg {
                Ok(frame_in) => {
                    let ethertype = frame_in.frame.ethertype;
                    match dispatch.get(&ethertype) {
                        Some(handler_tx) => {
                            if handler_tx.send(frame_in).is_err() {
                                log::debug!("handler for ethertype {ethertype:#06x} has shut down");
                            }
                        }
                        None => {
                            log::trace!("{}", RouterError::NoLinkLayerHandler(ethertype));
                        }
                    }
                }
                Err(_) => return,
            },
            recv(cancel.receiver()) -> _ => return,
        }
    }
}

fn spawn_demux_loop(
    outbox_rx: crossbeam_channel::Receiver<FrameOut>,
    interfaces: Arc<InterfaceRegistry>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    thread::spawn(move || loop {
        select! {
            recv(outbox_rx) -> msg => match msg {
                Ok(frame_out) => {
                    let frame = frame_out.frame;
                    match interfaces.find_by_mac(frame.src) {
                        Some(iface) => {
                            if let Err(e) = iface.write_frame(&frame) {
                                log::error!("[iface:{}] write failed: {e}", iface.name);
                            }
                        }
                        None => log::error!("no interface owns source mac {}, dropping outbound frame", frame.src),
                    }
                }
                Err(_) => return,
            },
            recv(cancel.receiver()) -> _ => return,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_orchestrator_has_no_interfaces_or_routes() {
        let orchestrator = Orchestrator::new();
        assert!(orchestrator.list_interfaces().is_empty());
        assert!(orchestrator.list_routes().is_empty());
        orchestrator.shutdown();
    }

    #[test]
    fn shutdown_joins_every_worker_without_hanging() {
        let orchestrator = Orchestrator::new();
        orchestrator.shutdown();
    }
}
