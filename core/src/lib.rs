//! Core packet-processing pipeline for an educational userspace IPv4 router:
//! ARP termination, ICMP echo on simulated interface addresses, and
//! longest-prefix-match forwarding between interfaces.
//!
//! ```text
//! raw socket -> interface worker -> inbox -> link-layer dispatch -+-> arp_handler -> outbox -+
//!                                                                 |                           |
//!                                                                 +-> ip_ingress -> router <--+ reply
//!                                                                                  |      |
//!                                                                                  |      +-> icmp_terminator
//!                                                                                  |
//!                                                                                  +-> ip_egress -> outbox -> demux -> raw socket
//! ```
//!
//! [`Orchestrator`] is the single entry point: it owns every interface, the
//! route table, and the shared cancellation token, and wires every handler
//! together on construction.

pub mod arp_cache;
pub mod cancel;
pub mod config;
pub mod error;
pub mod handlers;
pub mod interface;
pub mod orchestrator;
pub mod pdu;
pub mod route;

pub use error::{Result, RouterError};
pub use orchestrator::Orchestrator;

/// The crate's semantic version, exposed for the CLI's `version` command.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Adjusts the `log` crate's max level at runtime, for the CLI's
/// `log none|debug|info|error` command.
pub fn set_log_level(level: log::LevelFilter) {
    log::set_max_level(level);
}
