use pkg_types::endpoint::EndpointPort;
use pkg_types::endpointslice::AddressType;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Groups slices that share an address type and a set of ports.
///
/// Port order does not matter: the ports are sorted before hashing, so
/// `[http, https]` and `[https, http]` produce the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AddrTypePortMapKey {
    address_type: AddressType,
    ports_hash: u64,
}

impl AddrTypePortMapKey {
    pub fn new(ports: &[EndpointPort], address_type: AddressType) -> Self {
        Self {
            address_type,
            ports_hash: hash_ports(ports),
        }
    }

    pub fn address_type(&self) -> AddressType {
        self.address_type
    }
}

impl fmt::Display for AddrTypePortMapKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:016x}", self.address_type, self.ports_hash)
    }
}

fn hash_ports(ports: &[EndpointPort]) -> u64 {
    let mut sorted: Vec<&EndpointPort> = ports.iter().collect();
    sorted.sort();
    let mut hasher = DefaultHasher::new();
    sorted.hash(&mut hasher);
    hasher.finish()
}

/// Port map keys for one subset, one per IP family.
#[derive(Debug, Clone, Copy)]
pub struct MultiAddrTypePortMapKey {
    pub ipv4: AddrTypePortMapKey,
    pub ipv6: AddrTypePortMapKey,
}

impl MultiAddrTypePortMapKey {
    pub fn new(ports: &[EndpointPort]) -> Self {
        Self {
            ipv4: AddrTypePortMapKey::new(ports, AddressType::IPv4),
            ipv6: AddrTypePortMapKey::new(ports, AddressType::IPv6),
        }
    }

    pub fn get(&self, address_type: AddressType) -> Option<AddrTypePortMapKey> {
        match address_type {
            AddressType::IPv4 => Some(self.ipv4),
            AddressType::IPv6 => Some(self.ipv6),
            AddressType::FQDN => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn port(name: &str, port: u16, protocol: &str) -> EndpointPort {
        EndpointPort {
            name: name.to_string(),
            port,
            protocol: protocol.to_string(),
        }
    }

    #[test]
    fn port_order_is_ignored() {
        let a = [port("http", 80, "TCP"), port("dns", 53, "UDP")];
        let b = [port("dns", 53, "UDP"), port("http", 80, "TCP")];
        assert_eq!(
            AddrTypePortMapKey::new(&a, AddressType::IPv4),
            AddrTypePortMapKey::new(&b, AddressType::IPv4)
        );
    }

    #[test]
    fn family_and_port_fields_distinguish_keys() {
        let http = [port("http", 80, "TCP")];
        assert_ne!(
            AddrTypePortMapKey::new(&http, AddressType::IPv4),
            AddrTypePortMapKey::new(&http, AddressType::IPv6)
        );
        assert_ne!(
            AddrTypePortMapKey::new(&http, AddressType::IPv4),
            AddrTypePortMapKey::new(&[port("http", 80, "UDP")], AddressType::IPv4)
        );
        assert_ne!(
            AddrTypePortMapKey::new(&http, AddressType::IPv4),
            AddrTypePortMapKey::new(&[port("web", 80, "TCP")], AddressType::IPv4)
        );
    }

    #[test]
    fn multi_key_has_no_fqdn_entry() {
        let multi = MultiAddrTypePortMapKey::new(&[port("http", 80, "TCP")]);
        assert_eq!(
            multi.get(AddressType::IPv6).map(|k| k.address_type()),
            Some(AddressType::IPv6)
        );
        assert!(multi.get(AddressType::FQDN).is_none());
    }
}
