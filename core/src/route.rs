//! The longest-prefix-match route table.

use std::net::Ipv4Addr;
use std::sync::RwLock;

use ipnetwork::Ipv4Network;

use crate::error::{Result, RouterError};
use crate::interface::InterfaceRegistry;

/// A route's precedence class. Declaration order matters: `LinkLocal`
/// sorts before `Static` because `RouteKind` derives `Ord` and variants
/// compare by discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RouteKind {
    LinkLocal,
    Static,
}

/// A single routing entry: its precedence class, the network it matches,
/// the interface to send matching traffic out of, and an optional next-hop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub kind: RouteKind,
    pub destination: Ipv4Network,
    pub out_interface: String,
    pub next_hop: Option<Ipv4Addr>,
}

impl Route {
    pub fn link_local(destination: Ipv4Network, out_interface: impl Into<String>) -> Self {
        Route {
            kind: RouteKind::LinkLocal,
            destination,
            out_interface: out_interface.into(),
            next_hop: None,
        }
    }

    pub fn static_route(
        destination: Ipv4Network,
        out_interface: impl Into<String>,
        next_hop: Ipv4Addr,
    ) -> Self {
        Route {
            kind: RouteKind::Static,
            destination,
            out_interface: out_interface.into(),
            next_hop: Some(next_hop),
        }
    }

    fn network_addr_u32(&self) -> u32 {
        u32::from(self.destination.network())
    }

    fn prefix_len(&self) -> u8 {
        self.destination.prefix()
    }
}

/// Ordered sequence of [`Route`]s. Reads lock-shared, writes lock-exclusive.
pub struct RouteTable {
    routes: RwLock<Vec<Route>>,
}

impl RouteTable {
    pub fn new() -> Self {
        RouteTable {
            routes: RwLock::new(Vec::new()),
        }
    }

    /// Validates `route`'s invariants, inserts it, and re-establishes the
    /// ordering invariant with a stable sort.
    pub fn add(&self, route: Route, interfaces: &InterfaceRegistry) -> Result<()> {
        if route.destination.ip() != route.destination.network() {
            return Err(RouterError::NotANetworkAddress);
        }

        let out_iface = interfaces
            .get(&route.out_interface)
            .ok_or_else(|| RouterError::NoSuchInterface(route.out_interface.clone()))?;

        match route.kind {
            RouteKind::LinkLocal => {
                if route.next_hop.is_some() {
                    return Err(RouterError::LinkLocalRouteShouldNotHaveNextHop);
                }
            }
            RouteKind::Static => {
                let next_hop = route
                    .next_hop
                    .ok_or(RouterError::NextHopNotOnLinkLocalNetwork)?;
                if !out_iface.simulated_network().contains(next_hop) {
                    return Err(RouterError::NextHopNotOnLinkLocalNetwork);
                }
            }
        }

        let mut routes = self.routes.write().unwrap();
        routes.push(route);
        routes.sort_by(|a, b| {
            a.kind
                .cmp(&b.kind)
                .then(a.network_addr_u32().cmp(&b.network_addr_u32()))
                .then(b.prefix_len().cmp(&a.prefix_len()))
        });
        Ok(())
    }

    /// Removes the route at `index`, preserving the relative order of the
    /// rest of the table.
    pub fn delete(&self, index: usize) -> Result<Route> {
        let mut routes = self.routes.write().unwrap();
        if index >= routes.len() {
            return Err(RouterError::NoSuchRoute(index));
        }
        Ok(routes.remove(index))
    }

    /// A snapshot of the table in lookup order.
    pub fn list(&self) -> Vec<Route> {
        self.routes.read().unwrap().clone()
    }

    /// Returns the first route whose network contains `dest`, per the
    /// ordering established by `add`.
    pub fn lookup(&self, dest: Ipv4Addr) -> Option<Route> {
        self.routes
            .read()
            .unwrap()
            .iter()
            .find(|r| r.destination.contains(dest))
            .cloned()
    }
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::new()
    }
}
