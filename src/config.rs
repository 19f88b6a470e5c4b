//! Startup configuration loading: parses the `interfaces` and
//! `routing-table` files and assembles the NAT timeout knobs.

use std::fs;
use std::net::Ipv4Addr;
use std::path::Path;
use std::time::Duration;

use crate::error::StartupError;
use crate::router::interface::{Interface, InterfaceTable};
use crate::router::nat::NatConfig;
use crate::router::routing_table::{RoutingEntry, RoutingTable};

/// Parse `name mac ipv4 mask` lines. Blank lines and `#`-prefixed
/// comments are skipped.
pub fn load_interfaces(path: &Path) -> Result<InterfaceTable, StartupError> {
    let contents = fs::read_to_string(path)?;
    let mut table = InterfaceTable::new();

    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        let [name, mac, ip, mask] = fields[..] else {
            return Err(StartupError::BadInterfaceLine(line.to_string()));
        };
        let mac = parse_mac(mac).ok_or_else(|| StartupError::BadInterfaceLine(line.to_string()))?;
        let ipv4: Ipv4Addr = ip.parse().map_err(|_| StartupError::BadInterfaceLine(line.to_string()))?;
        let mask: Ipv4Addr = mask.parse().map_err(|_| StartupError::BadInterfaceLine(line.to_string()))?;

        if !table.insert(name.to_string(), Interface { mac, ipv4, mask }) {
            return Err(StartupError::DuplicateInterfaceName(name.to_string()));
        }
    }

    Ok(table)
}

/// Parse `dst_ipv4 gateway_ipv4 mask iface_name` lines.
/// Every `iface_name` must already be present in `interfaces` — a
/// routing entry naming an unknown interface is a startup error, not a
/// runtime one.
pub fn load_routing_table(path: &Path, interfaces: &InterfaceTable) -> Result<RoutingTable, StartupError> {
    let contents = fs::read_to_string(path)?;
    let mut table = RoutingTable::new();

    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        let [dest, gateway, mask, iface] = fields[..] else {
            return Err(StartupError::BadRoutingLine(line.to_string()));
        };
        let destination: Ipv4Addr = dest.parse().map_err(|_| StartupError::BadRoutingLine(line.to_string()))?;
        let gateway: Ipv4Addr = gateway.parse().map_err(|_| StartupError::BadRoutingLine(line.to_string()))?;
        let mask: Ipv4Addr = mask.parse().map_err(|_| StartupError::BadRoutingLine(line.to_string()))?;

        if !interfaces.contains(iface) {
            return Err(StartupError::UnknownInterface(iface.to_string()));
        }

        table.push(RoutingEntry { destination, mask, gateway, iface: iface.to_string() });
    }

    Ok(table)
}

/// Build the NAT configuration from CLI flags, validating that the
/// named external interface actually exists.
pub fn nat_config(
    external_iface: String,
    icmp_idle_secs: Option<u64>,
    tcp_established_idle_secs: Option<u64>,
    tcp_transitory_idle_secs: Option<u64>,
    interfaces: &InterfaceTable,
) -> Result<NatConfig, StartupError> {
    if !interfaces.contains(&external_iface) {
        return Err(StartupError::UnknownInterface(external_iface));
    }
    let mut config = NatConfig::new(external_iface);
    if let Some(secs) = icmp_idle_secs {
        config.icmp_idle = Duration::from_secs(secs);
    }
    if let Some(secs) = tcp_established_idle_secs {
        config.tcp_established_idle = Duration::from_secs(secs);
    }
    if let Some(secs) = tcp_transitory_idle_secs {
        config.tcp_transitory_idle = Duration::from_secs(secs);
    }
    Ok(config)
}

fn parse_mac(s: &str) -> Option<[u8; 6]> {
    let parts: Vec<&str> = s.split(':').collect();
    if parts.len() != 6 {
        return None;
    }
    let mut mac = [0u8; 6];
    for (i, part) in parts.iter().enumerate() {
        mac[i] = u8::from_str_radix(part, 16).ok()?;
    }
    Some(mac)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{contents}").unwrap();
        file
    }

    #[test]
    fn parses_a_well_formed_interfaces_file() {
        let file = write_temp(
            "# comment\n\neth0 00:11:22:33:44:00 10.0.1.1 255.255.255.0\neth1 00:11:22:33:44:01 172.64.3.2 255.255.255.0\n",
        );
        let table = load_interfaces(file.path()).unwrap();
        assert_eq!(table.len(), 2);
        let eth0 = table.get("eth0").unwrap();
        assert_eq!(eth0.mac, [0x00, 0x11, 0x22, 0x33, 0x44, 0x00]);
        assert_eq!(eth0.ipv4, "10.0.1.1".parse::<Ipv4Addr>().unwrap());
    }

    #[test]
    fn rejects_duplicate_interface_names() {
        let file = write_temp(
            "eth0 00:11:22:33:44:00 10.0.1.1 255.255.255.0\neth0 00:11:22:33:44:01 10.0.2.1 255.255.255.0\n",
        );
        assert!(matches!(load_interfaces(file.path()), Err(StartupError::DuplicateInterfaceName(_))));
    }

    #[test]
    fn rejects_malformed_interface_lines() {
        let file = write_temp("eth0 not-a-mac 10.0.1.1 255.255.255.0\n");
        assert!(matches!(load_interfaces(file.path()), Err(StartupError::BadInterfaceLine(_))));
    }

    #[test]
    fn parses_a_routing_table_referencing_known_interfaces() {
        let ifaces = write_temp("eth0 00:11:22:33:44:00 10.0.1.1 255.255.255.0\n");
        let interfaces = load_interfaces(ifaces.path()).unwrap();
        let routes = write_temp("0.0.0.0 10.0.1.254 0.0.0.0 eth0\n");
        let table = load_routing_table(routes.path(), &interfaces).unwrap();
        assert!(table.lookup("8.8.8.8".parse().unwrap()).is_some());
    }

    #[test]
    fn rejects_routing_entries_for_unknown_interfaces() {
        let interfaces = InterfaceTable::new();
        let routes = write_temp("0.0.0.0 10.0.1.254 0.0.0.0 eth0\n");
        assert!(matches!(
            load_routing_table(routes.path(), &interfaces),
            Err(StartupError::UnknownInterface(_))
        ));
    }

    #[test]
    fn nat_config_rejects_unknown_external_interface() {
        let interfaces = InterfaceTable::new();
        assert!(matches!(
            nat_config("eth1".into(), None, None, None, &interfaces),
            Err(StartupError::UnknownInterface(_))
        ));
    }
}
