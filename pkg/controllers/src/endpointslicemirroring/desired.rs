use pkg_types::endpoint::{EndpointAddress, EndpointPort, Endpoints};
use pkg_types::validate::address_type;
use std::collections::HashMap;
use tracing::debug;

use super::endpoint_set::EndpointSet;
use super::port_map::{AddrTypePortMapKey, MultiAddrTypePortMapKey};
use super::utils::address_to_endpoint;

/// Desired endpoints for one Endpoints object, grouped by port map key.
#[derive(Debug, Default)]
pub struct DesiredCalc {
    pub endpoints_by_key: HashMap<AddrTypePortMapKey, EndpointSet>,
    pub ports_by_key: HashMap<AddrTypePortMapKey, Vec<EndpointPort>>,
    /// Invalid addresses skipped in each subset, in subset order.
    pub invalid_by_subset: Vec<usize>,
}

impl DesiredCalc {
    /// Compute the desired state of every subset.
    ///
    /// Ready addresses are visited before not-ready ones. Every address
    /// counts toward `max_endpoints_per_subset` whether or not it is valid;
    /// anything past the limit is dropped.
    pub fn calculate(endpoints: &Endpoints, max_endpoints_per_subset: usize) -> Self {
        let mut d = DesiredCalc::default();

        for subset in &endpoints.subsets {
            let multi_key = d.init_ports(&subset.ports);

            let addresses = subset
                .addresses
                .iter()
                .map(|a| (a, true))
                .chain(subset.not_ready_addresses.iter().map(|a| (a, false)))
                .take(max_endpoints_per_subset);

            let mut invalid = 0usize;
            for (address, ready) in addresses {
                if !d.add_address(address, &multi_key, ready) {
                    invalid += 1;
                    debug!(
                        "Address {} in {} Endpoints is not a valid IP and will not be mirrored",
                        address.ip,
                        endpoints.key()
                    );
                }
            }
            d.invalid_by_subset.push(invalid);
        }

        d
    }

    /// Register the port map keys for a subset's ports. Keys for both IP
    /// families are registered, so a key with no valid addresses still
    /// shows up with an empty set.
    fn init_ports(&mut self, ports: &[EndpointPort]) -> MultiAddrTypePortMapKey {
        let multi_key = MultiAddrTypePortMapKey::new(ports);
        for key in [multi_key.ipv4, multi_key.ipv6] {
            self.endpoints_by_key.entry(key).or_default();
            self.ports_by_key
                .entry(key)
                .or_insert_with(|| ports.to_vec());
        }
        multi_key
    }

    /// Add an address under the key for its IP family. The first
    /// occurrence of an endpoint wins. Returns false if the address is not
    /// a valid IP.
    fn add_address(
        &mut self,
        address: &EndpointAddress,
        multi_key: &MultiAddrTypePortMapKey,
        ready: bool,
    ) -> bool {
        let Some(key) = address_type(&address.ip).and_then(|t| multi_key.get(t)) else {
            return false;
        };
        self.endpoints_by_key
            .entry(key)
            .or_default()
            .insert_if_absent(address_to_endpoint(address, ready));
        true
    }
}
