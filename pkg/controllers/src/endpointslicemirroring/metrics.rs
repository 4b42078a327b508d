use pkg_metrics::MetricsRegistry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::port_map::AddrTypePortMapKey;

pub const ENDPOINTS_ADDED_PER_SYNC: &str = "endpointslice_mirroring_endpoints_added_per_sync";
pub const ENDPOINTS_UPDATED_PER_SYNC: &str = "endpointslice_mirroring_endpoints_updated_per_sync";
pub const ENDPOINTS_REMOVED_PER_SYNC: &str = "endpointslice_mirroring_endpoints_removed_per_sync";
pub const ENDPOINT_SLICE_CHANGES: &str = "endpointslice_mirroring_changes_total";
pub const ENDPOINTS_DESIRED: &str = "endpointslice_mirroring_endpoints_desired";
pub const NUM_ENDPOINT_SLICES: &str = "endpointslice_mirroring_num_endpoint_slices";
pub const DESIRED_ENDPOINT_SLICES: &str = "endpointslice_mirroring_desired_endpoint_slices";

/// Register every metric the mirroring controller reports.
pub fn register(registry: &MetricsRegistry) {
    registry.register_counter(
        ENDPOINTS_ADDED_PER_SYNC,
        "Number of endpoints added on each Endpoints sync",
    );
    registry.register_counter(
        ENDPOINTS_UPDATED_PER_SYNC,
        "Number of endpoints updated on each Endpoints sync",
    );
    registry.register_counter(
        ENDPOINTS_REMOVED_PER_SYNC,
        "Number of endpoints removed on each Endpoints sync",
    );
    registry.register_counter(
        ENDPOINT_SLICE_CHANGES,
        "Number of EndpointSlice changes by operation",
    );
    registry.register_gauge(ENDPOINTS_DESIRED, "Number of endpoints desired");
    registry.register_gauge(NUM_ENDPOINT_SLICES, "Number of EndpointSlices");
    registry.register_gauge(
        DESIRED_ENDPOINT_SLICES,
        "Number of EndpointSlices that would exist with perfect endpoint allocation",
    );
}

/// Endpoint and slice counts for one port map key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EfficiencyInfo {
    pub endpoints: usize,
    pub slices: usize,
}

/// Efficiency info for every port map key of one Endpoints object.
#[derive(Debug, Clone, Default)]
pub struct EndpointPortCache {
    items: HashMap<AddrTypePortMapKey, EfficiencyInfo>,
}

impl EndpointPortCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: AddrTypePortMapKey, info: EfficiencyInfo) {
        self.items.insert(key, info);
    }

    pub fn get(&self, key: &AddrTypePortMapKey) -> Option<EfficiencyInfo> {
        self.items.get(key).copied()
    }

    /// (endpoints, actual slices, desired slices) summed over every key.
    fn totals(&self, max_endpoints_per_subset: usize) -> (usize, usize, usize) {
        self.items
            .values()
            .fold((0, 0, 0), |(endpoints, slices, desired), info| {
                (
                    endpoints + info.endpoints,
                    slices + info.slices,
                    desired + info.endpoints.div_ceil(max_endpoints_per_subset.max(1)),
                )
            })
    }
}

/// Process-wide efficiency cache keyed by (namespace, endpoints name).
/// Every change republishes the aggregate gauges.
pub struct MetricsCache {
    registry: Arc<MetricsRegistry>,
    max_endpoints_per_subset: usize,
    cache: Mutex<HashMap<(String, String), EndpointPortCache>>,
}

impl MetricsCache {
    pub fn new(registry: Arc<MetricsRegistry>, max_endpoints_per_subset: usize) -> Self {
        register(&registry);
        Self {
            registry,
            max_endpoints_per_subset,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &MetricsRegistry {
        &self.registry
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<(String, String), EndpointPortCache>> {
        self.cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Replace the entry for one Endpoints object.
    pub fn update_endpoint_port_cache(&self, namespace: &str, name: &str, cache: EndpointPortCache) {
        let mut entries = self.lock();
        entries.insert((namespace.to_string(), name.to_string()), cache);
        self.publish(&entries);
    }

    /// Drop the entry for an Endpoints object that no longer exists.
    pub fn delete_endpoints(&self, namespace: &str, name: &str) {
        let mut entries = self.lock();
        entries.remove(&(namespace.to_string(), name.to_string()));
        self.publish(&entries);
    }

    pub fn get(&self, namespace: &str, name: &str) -> Option<EndpointPortCache> {
        self.lock()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    fn publish(&self, entries: &HashMap<(String, String), EndpointPortCache>) {
        let (endpoints, slices, desired) = entries.values().fold((0, 0, 0), |acc, cache| {
            let (e, s, d) = cache.totals(self.max_endpoints_per_subset);
            (acc.0 + e, acc.1 + s, acc.2 + d)
        });
        self.registry.gauge_set(ENDPOINTS_DESIRED, to_i64(endpoints));
        self.registry.gauge_set(NUM_ENDPOINT_SLICES, to_i64(slices));
        self.registry.gauge_set(DESIRED_ENDPOINT_SLICES, to_i64(desired));
    }
}

fn to_i64(v: usize) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}
