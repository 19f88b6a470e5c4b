//! Interface table: an immutable map from interface name to its
//! MAC/IPv4/subnet mask, fixed at startup.

use std::collections::HashMap;
use std::net::Ipv4Addr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interface {
    pub mac: [u8; 6],
    pub ipv4: Ipv4Addr,
    pub mask: Ipv4Addr,
}

/// Read-only once built; there is no insert/remove after startup.
#[derive(Debug, Clone, Default)]
pub struct InterfaceTable {
    interfaces: HashMap<String, Interface>,
}

impl InterfaceTable {
    pub fn new() -> Self {
        Self { interfaces: HashMap::new() }
    }

    /// Returns `false` (and leaves the table unchanged) if `name` is
    /// already present; callers surface this as a startup error.
    pub fn insert(&mut self, name: String, interface: Interface) -> bool {
        if self.interfaces.contains_key(&name) {
            return false;
        }
        self.interfaces.insert(name, interface);
        true
    }

    pub fn get(&self, name: &str) -> Option<&Interface> {
        self.interfaces.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.interfaces.contains_key(name)
    }

    /// Finds the interface, if any, whose own address is `ip` — used to
    /// decide whether a packet is destined for the router itself.
    pub fn find_by_ip(&self, ip: Ipv4Addr) -> Option<(&str, &Interface)> {
        self.interfaces
            .iter()
            .find(|(_, iface)| iface.ipv4 == ip)
            .map(|(name, iface)| (name.as_str(), iface))
    }

    pub fn is_own_ip(&self, ip: Ipv4Addr) -> bool {
        self.find_by_ip(ip).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Interface)> {
        self.interfaces.iter()
    }

    pub fn len(&self) -> usize {
        self.interfaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interfaces.is_empty()
    }
}
