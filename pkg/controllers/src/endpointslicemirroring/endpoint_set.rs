use pkg_types::endpoint::ObjectReference;
use pkg_types::endpointslice::Endpoint;
use std::collections::HashMap;
use std::collections::hash_map::{DefaultHasher, Entry};
use std::hash::{Hash, Hasher};

/// Structural hash over the fields that identify an endpoint: its sorted
/// addresses and its target reference. Readiness, hostname and topology can
/// change without changing the hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EndpointHash(u64);

#[derive(Hash)]
struct EndpointHashObj<'a> {
    addresses: Vec<&'a str>,
    target_ref: Option<&'a ObjectReference>,
}

pub fn hash_endpoint(endpoint: &Endpoint) -> EndpointHash {
    let mut addresses: Vec<&str> = endpoint.addresses.iter().map(String::as_str).collect();
    addresses.sort_unstable();
    let obj = EndpointHashObj {
        addresses,
        target_ref: endpoint.target_ref.as_ref(),
    };
    let mut hasher = DefaultHasher::new();
    obj.hash(&mut hasher);
    EndpointHash(hasher.finish())
}

/// Set of endpoints keyed by `hash_endpoint`.
#[derive(Debug, Clone, Default)]
pub struct EndpointSet {
    items: HashMap<EndpointHash, Endpoint>,
}

impl EndpointSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an endpoint unless one with the same hash is already present.
    /// Returns whether the endpoint was added.
    pub fn insert_if_absent(&mut self, endpoint: Endpoint) -> bool {
        match self.items.entry(hash_endpoint(&endpoint)) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(endpoint);
                true
            }
        }
    }

    /// The member sharing `endpoint`'s hash, which may differ in fields
    /// outside the hash.
    pub fn get(&self, endpoint: &Endpoint) -> Option<&Endpoint> {
        self.items.get(&hash_endpoint(endpoint))
    }

    /// Remove and return an arbitrary member.
    pub fn pop_any(&mut self) -> Option<Endpoint> {
        let hash = *self.items.keys().next()?;
        self.items.remove(&hash)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Whether two endpoints with the same hash also agree on every field
/// outside it.
pub fn endpoints_equal_beyond_hash(a: &Endpoint, b: &Endpoint) -> bool {
    a.conditions.ready == b.conditions.ready
        && a.hostname == b.hostname
        && a.topology == b.topology
        && a.target_ref == b.target_ref
}
