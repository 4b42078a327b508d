use pkg_types::endpointslice::EndpointSlice;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::utils::owning_endpoints_name;

/// (namespace, endpoints name)
type OwnerKey = (String, String);

/// Last resource version written for every slice this controller manages,
/// grouped by owning Endpoints. A slice read back at an older version than
/// the one recorded comes from a stale read and must not be planned against.
#[derive(Debug, Default)]
pub struct EndpointSliceTracker {
    versions: Mutex<HashMap<OwnerKey, HashMap<String, String>>>,
}

fn owner_key(slice: &EndpointSlice) -> OwnerKey {
    (
        slice.namespace.clone(),
        owning_endpoints_name(slice).unwrap_or_default().to_string(),
    )
}

impl EndpointSliceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<OwnerKey, HashMap<String, String>>> {
        self.versions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    #[cfg(test)]
    pub fn has(&self, slice: &EndpointSlice) -> bool {
        self.lock()
            .get(&owner_key(slice))
            .is_some_and(|slices| slices.contains_key(&slice.name))
    }

    /// True when the slice is tracked and was read at an older resource
    /// version than the last one written. Untracked slices and slices
    /// rewritten by someone else at a newer version are not stale.
    pub fn stale(&self, slice: &EndpointSlice) -> bool {
        self.lock()
            .get(&owner_key(slice))
            .and_then(|slices| slices.get(&slice.name))
            .is_some_and(|written| older_version(&slice.resource_version, written))
    }

    /// Record the slice's current resource version.
    pub fn update(&self, slice: &EndpointSlice) {
        self.lock()
            .entry(owner_key(slice))
            .or_default()
            .insert(slice.name.clone(), slice.resource_version.clone());
    }

    /// Stop tracking a slice.
    pub fn delete(&self, slice: &EndpointSlice) {
        let key = owner_key(slice);
        let mut versions = self.lock();
        if let Some(slices) = versions.get_mut(&key) {
            slices.remove(&slice.name);
            if slices.is_empty() {
                versions.remove(&key);
            }
        }
    }

    /// Stop tracking every slice owned by the given Endpoints.
    pub fn delete_owner(&self, namespace: &str, name: &str) {
        self.lock()
            .remove(&(namespace.to_string(), name.to_string()));
    }
}

/// Versions are decimal counters; anything unparsable never compares older.
fn older_version(read: &str, written: &str) -> bool {
    match (read.parse::<u64>(), written.parse::<u64>()) {
        (Ok(read), Ok(written)) => read < written,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpointslicemirroring::utils::new_endpoint_slice;
    use pkg_types::endpoint::Endpoints;
    use pkg_types::endpointslice::AddressType;

    fn slice(name: &str, rv: &str) -> EndpointSlice {
        let eps = Endpoints {
            name: "web".to_string(),
            namespace: "default".to_string(),
            ..Default::default()
        };
        let mut slice = new_endpoint_slice(&eps, &[], AddressType::IPv4, name);
        slice.resource_version = rv.to_string();
        slice
    }

    #[test]
    fn only_older_reads_are_stale() {
        let tracker = EndpointSliceTracker::new();
        let s2 = slice("web-1", "2");
        assert!(!tracker.has(&s2));
        assert!(!tracker.stale(&s2));

        tracker.update(&s2);
        assert!(tracker.has(&s2));
        assert!(!tracker.stale(&s2));
        assert!(tracker.stale(&slice("web-1", "1")));
        assert!(!tracker.stale(&slice("web-1", "7")));
        assert!(!tracker.stale(&slice("web-1", "")));
        assert!(!tracker.stale(&slice("web-2", "1")));
    }

    #[test]
    fn delete_removes_entries() {
        let tracker = EndpointSliceTracker::new();
        tracker.update(&slice("web-1", "1"));
        tracker.update(&slice("web-2", "1"));

        tracker.delete(&slice("web-1", "1"));
        assert!(!tracker.has(&slice("web-1", "1")));
        assert!(tracker.has(&slice("web-2", "1")));

        tracker.delete_owner("default", "web");
        assert!(!tracker.has(&slice("web-2", "1")));
        assert!(!tracker.stale(&slice("web-2", "0")));
    }
}
