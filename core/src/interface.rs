//! `InterfaceConfig` and the interface worker: opening the host link,
//! reading its MAC/real IPv4 address, and the per-EtherType raw socket
//! ingress tasks.

use std::collections::HashMap;
use std::io;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex, OnceLock, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::Sender;
use ipnetwork::Ipv4Network;
use pnet::util::MacAddr;
use pnet_datalink::{self as datalink, Channel::Ethernet, Config as DatalinkConfig, DataLinkSender};

use crate::arp_cache::{ArpCache, ArpWriter};
use crate::cancel::CancellationToken;
use crate::error::{Result, RouterError};
use crate::pdu::{ArpPdu, Frame, ARP_OP_REQUEST, ETHERTYPE_ARP, ETHERTYPE_IPV4, MAC_BROADCAST, MAC_ZERO};

/// EtherTypes this router opens a raw socket for. Adding a protocol means
/// appending its EtherType here and registering a handler at the
/// orchestrator's dispatch table.
pub const SUPPORTED_ETHERTYPES: [u16; 2] = [ETHERTYPE_ARP, ETHERTYPE_IPV4];

/// A frame paired with the interface it arrived on.
pub struct FrameIn {
    pub frame: Frame,
    pub interface: Arc<InterfaceConfig>,
}

/// A built frame waiting to leave on whichever interface owns its source
/// MAC; the orchestrator demultiplexes this back to the right interface.
pub struct FrameOut {
    pub frame: Frame,
}

/// One configured interface: its simulated identity, the host link it
/// rides on, and the per-protocol raw sockets opened for it.
///
/// `mac` and `real_ip` become known only once [`setup_and_listen`] runs, so
/// they're `OnceLock`s rather than plain fields.
///
/// [`setup_and_listen`]: InterfaceConfig::setup_and_listen
pub struct InterfaceConfig {
    pub name: String,
    pub simulated_network: Ipv4Network,
    mac: OnceLock<MacAddr>,
    real_ip: OnceLock<Ipv4Addr>,
    pub arp_cache: Arc<ArpCache>,
    senders: Mutex<HashMap<u16, Box<dyn DataLinkSender>>>,
}

impl InterfaceConfig {
    pub fn new(name: impl Into<String>, simulated_network: Ipv4Network) -> Arc<Self> {
        Arc::new(InterfaceConfig {
            name: name.into(),
            simulated_network,
            mac: OnceLock::new(),
            real_ip: OnceLock::new(),
            arp_cache: Arc::new(ArpCache::new()),
            senders: Mutex::new(HashMap::new()),
        })
    }

    /// Builds an already-"set up" config for unit tests that never touch a
    /// real host link (route-table and handler tests).
    #[cfg(test)]
    pub fn for_test(name: &str, simulated_network: Ipv4Network, mac: MacAddr) -> Arc<Self> {
        let cfg = InterfaceConfig::new(name, simulated_network);
        let _ = cfg.mac.set(mac);
        cfg
    }

    /// Like [`for_test`](Self::for_test), but also pins the host's real IPv4
    /// address, for tests of the "ignore traffic to the real address" case.
    #[cfg(test)]
    pub fn for_test_with_real_ip(
        name: &str,
        simulated_network: Ipv4Network,
        mac: MacAddr,
        real_ip: Ipv4Addr,
    ) -> Arc<Self> {
        let cfg = InterfaceConfig::for_test(name, simulated_network, mac);
        let _ = cfg.real_ip.set(real_ip);
        cfg
    }

    pub fn simulated_ip(&self) -> Ipv4Addr {
        self.simulated_network.ip()
    }

    pub fn simulated_network(&self) -> Ipv4Network {
        self.simulated_network
    }

    /// The interface's hardware address, known after `setup_and_listen`.
    pub fn mac(&self) -> MacAddr {
        *self
            .mac
            .get()
            .expect("InterfaceConfig::mac read before setup_and_listen")
    }

    /// The host's real IPv4 address on this link, if one was configured.
    /// Traffic destined to it is ignored by the router rather than
    /// terminated — that address belongs to the OS, not this router.
    pub fn real_ip(&self) -> Option<Ipv4Addr> {
        self.real_ip.get().copied()
    }

    /// Opens the host interface by name, records its MAC and first IPv4
    /// address, opens one raw socket per entry in [`SUPPORTED_ETHERTYPES`],
    /// injects the ARP writer, and spawns one ingress thread per socket.
    /// Returns their join handles so the orchestrator can wait for a clean
    /// shutdown.
    pub fn setup_and_listen(
        self: &Arc<Self>,
        cancel: CancellationToken,
        frame_in_tx: Sender<FrameIn>,
    ) -> Result<Vec<JoinHandle<()>>> {
        let host_iface = datalink::interfaces()
            .into_iter()
            .find(|i| i.name == self.name)
            .ok_or_else(|| RouterError::Io(format!("host interface {:?} not found", self.name)))?;

        let mac = host_iface
            .mac
            .ok_or_else(|| RouterError::Io(format!("interface {:?} has no MAC address", self.name)))?;
        let _ = self.mac.set(mac);

        if let Some(real_ip) = host_iface.ips.iter().find_map(|net| match net.ip() {
            std::net::IpAddr::V4(v4) => Some(v4),
            std::net::IpAddr::V6(_) => None,
        }) {
            let _ = self.real_ip.set(real_ip);
        }

        self.arp_cache.set_writer(Arc::new(InterfaceArpWriter {
            interface: Arc::clone(self),
        }));

        let mut handles = Vec::new();
        for &ethertype in &SUPPORTED_ETHERTYPES {
            let config = DatalinkConfig {
                read_timeout: Some(Duration::from_millis(200)),
                ..Default::default()
            };
            let channel = datalink::channel(&host_iface, config)
                .map_err(|e| RouterError::Io(e.to_string()))?;
            let (tx, mut rx) = match channel {
                Ethernet(tx, rx) => (tx, rx),
                _ => return Err(RouterError::Io("unsupported datalink channel type".into())),
            };
            self.senders.lock().unwrap().insert(ethertype, tx);

            let iface = Arc::clone(self);
            let frame_in_tx = frame_in_tx.clone();
            let cancel = cancel.clone();
            handles.push(thread::spawn(move || {
                ingress_loop(iface, ethertype, rx.as_mut(), frame_in_tx, cancel);
            }));
        }

        Ok(handles)
    }

    /// Encodes `frame` and writes it to the raw socket keyed by its
    /// EtherType.
    pub fn write_frame(&self, frame: &Frame) -> Result<()> {
        let mut senders = self.senders.lock().unwrap();
        let sender = senders
            .get_mut(&frame.ethertype)
            .ok_or(RouterError::NoLinkLayerHandler(frame.ethertype))?;
        let bytes = frame.encode();
        match sender.send_to(&bytes, None) {
            Some(Ok(())) => Ok(()),
            Some(Err(e)) => Err(RouterError::Io(e.to_string())),
            None => Err(RouterError::Io("raw socket send buffer full".into())),
        }
    }
}

fn ingress_loop(
    iface: Arc<InterfaceConfig>,
    ethertype: u16,
    rx: &mut dyn datalink::DataLinkReceiver,
    frame_in_tx: Sender<FrameIn>,
    cancel: CancellationToken,
) {
    loop {
        if cancel.is_cancelled() {
            log::debug!("[iface:{}] ingress ({ethertype:#06x}) cancelled", iface.name);
            return;
        }
        match rx.next() {
            Ok(raw) => match Frame::decode(raw) {
                // Two sockets are open on the same host link (one per
                // EtherType); each only forwards the frames matching the
                // EtherType it was opened for and silently drops the rest.
                Ok(frame) if frame.ethertype == ethertype => {
                    if frame_in_tx
                        .send(FrameIn {
                            frame,
                            interface: Arc::clone(&iface),
                        })
                        .is_err()
                    {
                        return;
                    }
                }
                _ => {}
            },
            Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => {
                continue;
            }
            Err(e) => {
                log::error!("[iface:{}] raw socket read error: {e}", iface.name);
                return;
            }
        }
    }
}

/// Emits ARP requests on behalf of [`ArpCache::resolve`], using the
/// interface's own MAC/simulated IP as sender hardware/protocol address.
struct InterfaceArpWriter {
    interface: Arc<InterfaceConfig>,
}

impl ArpWriter for InterfaceArpWriter {
    fn send_request(&self, target: Ipv4Addr) -> Result<()> {
        let pdu = ArpPdu::new(
            ARP_OP_REQUEST,
            self.interface.mac(),
            self.interface.simulated_ip(),
            MAC_ZERO,
            target,
        );
        let frame = Frame::new(MAC_BROADCAST, self.interface.mac(), ETHERTYPE_ARP, pdu.encode());
        self.interface.write_frame(&frame)
    }
}

/// The set of configured interfaces, read-shared/write-exclusive. Owned by
/// the orchestrator; `RouteTable::add` consults it for
/// `NextHopNotOnLinkLocalNetwork`.
pub struct InterfaceRegistry {
    interfaces: RwLock<Vec<Arc<InterfaceConfig>>>,
}

impl InterfaceRegistry {
    pub fn new() -> Self {
        InterfaceRegistry {
            interfaces: RwLock::new(Vec::new()),
        }
    }

    pub fn insert(&self, interface: Arc<InterfaceConfig>) {
        self.interfaces.write().unwrap().push(interface);
    }

    pub fn get(&self, name: &str) -> Option<Arc<InterfaceConfig>> {
        self.interfaces
            .read()
            .unwrap()
            .iter()
            .find(|i| i.name == name)
            .cloned()
    }

    pub fn find_by_mac(&self, mac: MacAddr) -> Option<Arc<InterfaceConfig>> {
        self.interfaces
            .read()
            .unwrap()
            .iter()
            .find(|i| i.mac() == mac)
            .cloned()
    }

    pub fn list(&self) -> Vec<Arc<InterfaceConfig>> {
        self.interfaces.read().unwrap().clone()
    }
}

impl Default for InterfaceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn registry_looks_up_by_name_and_mac() {
        let registry = InterfaceRegistry::new();
        let eth0 = InterfaceConfig::for_test(
            "eth0",
            Ipv4Network::from_str("192.168.0.1/24").unwrap(),
            MacAddr::new(1, 2, 3, 4, 5, 6),
        );
        let eth1 = InterfaceConfig::for_test(
            "eth1",
            Ipv4Network::from_str("10.0.0.1/8").unwrap(),
            MacAddr::new(6, 5, 4, 3, 2, 1),
        );
        registry.insert(eth0.clone());
        registry.insert(eth1.clone());

        assert_eq!(registry.get("eth0").unwrap().name, "eth0");
        assert!(registry.get("eth2").is_none());
        assert_eq!(
            registry.find_by_mac(MacAddr::new(6, 5, 4, 3, 2, 1)).unwrap().name,
            "eth1"
        );
        assert!(registry.find_by_mac(MacAddr::new(9, 9, 9, 9, 9, 9)).is_none());
        assert_eq!(registry.list().len(), 2);
    }

    #[test]
    fn simulated_ip_is_the_configured_network_address() {
        let iface = InterfaceConfig::for_test(
            "eth0",
            Ipv4Network::from_str("192.168.50.1/24").unwrap(),
            MacAddr::new(1, 1, 1, 1, 1, 1),
        );
        assert_eq!(iface.simulated_ip(), "192.168.50.1".parse::<Ipv4Addr>().unwrap());
        assert_eq!(iface.real_ip(), None);
    }
}
