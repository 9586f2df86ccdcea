//! Interface configuration string parsing: `name:IPv4/prefix`, e.g.
//! `eth0:192.168.0.1/24`.

use std::str::FromStr;

use ipnetwork::Ipv4Network;

use crate::error::{Result, RouterError};

/// A parsed `name:IPv4/prefix` interface configuration string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceConfigString {
    pub name: String,
    pub simulated_network: Ipv4Network,
}

/// Parses `name:IPv4/prefix`. The simulated IP must be a valid IPv4 address
/// and the mask a valid prefix length 0–32; anything else is rejected with
/// `InvalidInterfaceConfig` rather than propagating the underlying parse
/// error, since none of that detail is actionable to a caller beyond "fix
/// the string".
pub fn parse_interface_config(input: &str) -> Result<InterfaceConfigString> {
    let (name, network) = input
        .split_once(':')
        .ok_or_else(|| RouterError::InvalidInterfaceConfig(input.to_string()))?;

    if name.is_empty() {
        return Err(RouterError::InvalidInterfaceConfig(input.to_string()));
    }

    let simulated_network = Ipv4Network::from_str(network)
        .map_err(|_| RouterError::InvalidInterfaceConfig(input.to_string()))?;

    Ok(InterfaceConfigString {
        name: name.to_string(),
        simulated_network,
    })
}
