use pkg_constants::mirroring::REASON_INVALID_IP_ADDRESS;
use pkg_state::slices::SliceClient;
use pkg_types::endpoint::{EndpointPort, Endpoints};
use pkg_types::endpointslice::{AddressType, EndpointSlice};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

use super::desired::DesiredCalc;
use super::endpoint_set::{EndpointSet, endpoints_equal_beyond_hash};
use super::error::{ReconcileError, Result, SliceAction};
use super::events::EventRecorder;
use super::metrics::{
    ENDPOINTS_ADDED_PER_SYNC, ENDPOINTS_REMOVED_PER_SYNC,
    ENDPOINTS_UPDATED_PER_SYNC, EfficiencyInfo, EndpointPortCache, MetricsCache,
};
use super::port_map::AddrTypePortMapKey;
use super::tracker::EndpointSliceTracker;
use super::utils::new_endpoint_slice;

/// Slices to write, grouped by the store call that writes them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SlicesByAction {
    pub to_create: Vec<EndpointSlice>,
    pub to_update: Vec<EndpointSlice>,
    pub to_delete: Vec<EndpointSlice>,
}

impl SlicesByAction {
    pub fn append(&mut self, other: SlicesByAction) {
        self.to_create.extend(other.to_create);
        self.to_update.extend(other.to_update);
        self.to_delete.extend(other.to_delete);
    }

    pub fn is_empty(&self) -> bool {
        self.to_create.is_empty() && self.to_update.is_empty() && self.to_delete.is_empty()
    }
}

/// Endpoint-level change counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TotalsByAction {
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
}

impl TotalsByAction {
    pub fn add(&mut self, other: TotalsByAction) {
        self.added += other.added;
        self.updated += other.updated;
        self.removed += other.removed;
    }

    pub fn is_zero(&self) -> bool {
        self.added == 0 && self.updated == 0 && self.removed == 0
    }
}

/// Everything one reconcile pass intends to do, before any store call.
#[derive(Debug, Default)]
pub struct Plan {
    pub slices: SlicesByAction,
    pub totals: TotalsByAction,
    pub port_cache: EndpointPortCache,
    pub invalid_by_subset: Vec<usize>,
}

/// Compute the slice changes that make `existing_slices` mirror `endpoints`.
/// Pure: nothing here touches the store, tracker or metrics.
pub fn plan_reconcile(
    endpoints: &Endpoints,
    existing_slices: Vec<EndpointSlice>,
    max_endpoints_per_subset: usize,
) -> Plan {
    let DesiredCalc {
        mut endpoints_by_key,
        mut ports_by_key,
        invalid_by_subset,
    } = DesiredCalc::calculate(endpoints, max_endpoints_per_subset);

    let mut existing_by_key = endpoint_slices_by_key(existing_slices);
    let mut plan = Plan {
        invalid_by_subset,
        ..Default::default()
    };

    // Sorted so the order of planned writes is stable across passes.
    let mut keys: Vec<AddrTypePortMapKey> = endpoints_by_key.keys().copied().collect();
    keys.sort();

    for key in keys {
        let desired = endpoints_by_key.remove(&key).unwrap_or_default();
        let ports = ports_by_key.remove(&key).unwrap_or_default();
        let existing = existing_by_key.remove(&key).unwrap_or_default();
        let num_endpoints = desired.len();
        let num_existing = existing.len();

        let (pm_slices, pm_totals) = reconcile_by_port_mapping(
            endpoints,
            existing,
            desired,
            &ports,
            key.address_type(),
            max_endpoints_per_subset,
        );

        plan.port_cache.set(
            key,
            EfficiencyInfo {
                endpoints: num_endpoints,
                slices: (num_existing + pm_slices.to_create.len())
                    .saturating_sub(pm_slices.to_delete.len()),
            },
        );
        plan.slices.append(pm_slices);
        plan.totals.add(pm_totals);
    }

    // Whatever is left has a port map key that is no longer desired.
    for (_, orphaned) in existing_by_key {
        plan.slices.to_delete.extend(orphaned);
    }

    plan
}

/// Compare the slices of one port map key against the desired endpoints
/// for that key.
///
/// At most one slice survives: the first existing slice is rebuilt in place
/// (or a new slice is created when none exists) and every other existing
/// slice is deleted. The rebuilt slice holds at most
/// `max_endpoints_per_subset` endpoints.
pub fn reconcile_by_port_mapping(
    endpoints: &Endpoints,
    existing_slices: Vec<EndpointSlice>,
    mut desired_set: EndpointSet,
    ports: &[EndpointPort],
    address_type: AddressType,
    max_endpoints_per_subset: usize,
) -> (SlicesByAction, TotalsByAction) {
    let mut slices = SlicesByAction::default();
    let mut totals = TotalsByAction::default();

    if desired_set.is_empty() {
        totals.removed = existing_slices.iter().map(|s| s.endpoints.len()).sum();
        slices.to_delete = existing_slices;
        return (slices, totals);
    }

    let mut existing = existing_slices.into_iter();
    let kept = existing.next();
    slices.to_delete = existing.collect();

    match &kept {
        None => totals.added = desired_set.len(),
        Some(first) => {
            totals = total_changes(first, &desired_set);
            if totals.is_zero() {
                return (slices, totals);
            }
        }
    }

    let (slice_name, resource_version) = kept
        .map(|s| (s.name, s.resource_version))
        .unwrap_or_default();
    let mut new_slice = new_endpoint_slice(endpoints, ports, address_type, &slice_name);
    new_slice.resource_version = resource_version;
    while new_slice.endpoints.len() < max_endpoints_per_subset {
        let Some(endpoint) = desired_set.pop_any() else {
            break;
        };
        new_slice.endpoints.push(endpoint);
    }

    if new_slice.name.is_empty() {
        slices.to_create.push(new_slice);
    } else {
        slices.to_update.push(new_slice);
    }

    (slices, totals)
}

/// Group slices by port map key, keeping the order they were supplied in.
pub fn endpoint_slices_by_key(
    slices: Vec<EndpointSlice>,
) -> BTreeMap<AddrTypePortMapKey, Vec<EndpointSlice>> {
    let mut by_key: BTreeMap<AddrTypePortMapKey, Vec<EndpointSlice>> = BTreeMap::new();
    for slice in slices {
        let key = AddrTypePortMapKey::new(&slice.ports, slice.address_type);
        by_key.entry(key).or_default().push(slice);
    }
    by_key
}

/// Changes needed for `existing` to hold exactly `desired`.
pub fn total_changes(existing: &EndpointSlice, desired: &EndpointSet) -> TotalsByAction {
    let mut totals = TotalsByAction::default();
    let mut matches = 0usize;

    for endpoint in &existing.endpoints {
        match desired.get(endpoint) {
            None => totals.removed += 1,
            Some(want) => {
                matches += 1;
                if !endpoints_equal_beyond_hash(want, endpoint) {
                    totals.updated += 1;
                }
            }
        }
    }

    totals.added = desired.len().saturating_sub(matches);
    totals
}

/// Mirrors Endpoints objects into EndpointSlices through a `SliceClient`.
///
/// Planning is pure; the tracker, metrics cache and event recorder are
/// shared handles touched only when reporting and applying a plan.
pub struct Reconciler {
    pub(crate) client: Arc<dyn SliceClient>,
    pub(crate) max_endpoints_per_subset: usize,
    pub(crate) tracker: Arc<EndpointSliceTracker>,
    pub(crate) metrics_cache: Arc<MetricsCache>,
    pub(crate) event_recorder: Arc<dyn EventRecorder>,
}

impl Reconciler {
    pub fn new(
        client: Arc<dyn SliceClient>,
        max_endpoints_per_subset: usize,
        tracker: Arc<EndpointSliceTracker>,
        metrics_cache: Arc<MetricsCache>,
        event_recorder: Arc<dyn EventRecorder>,
    ) -> Self {
        Self {
            client,
            max_endpoints_per_subset,
            tracker,
            metrics_cache,
            event_recorder,
        }
    }

    pub fn tracker(&self) -> &EndpointSliceTracker {
        &self.tracker
    }

    /// Make the slices of `endpoints` match its subsets. `existing_slices`
    /// must be every slice currently mirrored from it.
    pub async fn reconcile(
        &self,
        endpoints: &Endpoints,
        existing_slices: Vec<EndpointSlice>,
    ) -> Result<()> {
        let plan = plan_reconcile(endpoints, existing_slices, self.max_endpoints_per_subset);

        for invalid in plan.invalid_by_subset.iter().copied().filter(|n| *n > 0) {
            warn!(
                "Skipped {} invalid IP addresses in {} Endpoints",
                invalid,
                endpoints.key()
            );
            self.event_recorder.warning(
                endpoints,
                REASON_INVALID_IP_ADDRESS,
                &format!(
                    "Skipped {} invalid IP addresses when mirroring to EndpointSlices",
                    invalid
                ),
            );
        }

        let registry = self.metrics_cache.registry();
        registry.counter_add(ENDPOINTS_ADDED_PER_SYNC, plan.totals.added as u64);
        registry.counter_add(ENDPOINTS_UPDATED_PER_SYNC, plan.totals.updated as u64);
        registry.counter_add(ENDPOINTS_REMOVED_PER_SYNC, plan.totals.removed as u64);
        self.metrics_cache.update_endpoint_port_cache(
            &endpoints.namespace,
            &endpoints.name,
            plan.port_cache,
        );

        debug!(
            "Endpoints {}: {} added, {} updated, {} removed; {} creates, {} updates, {} deletes planned",
            endpoints.key(),
            plan.totals.added,
            plan.totals.updated,
            plan.totals.removed,
            plan.slices.to_create.len(),
            plan.slices.to_update.len(),
            plan.slices.to_delete.len()
        );

        self.finalize(endpoints, plan.slices).await
    }

    /// Remove every slice of an Endpoints object that no longer exists (or
    /// is no longer mirrored) and forget its efficiency info. Slices that
    /// were deleted stay deleted even when others fail.
    pub async fn delete_endpoints(
        &self,
        namespace: &str,
        name: &str,
        slices: &[EndpointSlice],
    ) -> Result<()> {
        self.metrics_cache.delete_endpoints(namespace, name);

        let mut errs = Vec::new();
        for slice in slices {
            match self.client.delete(namespace, &slice.name).await {
                Ok(()) => self.record_write(SliceAction::Delete, slice),
                Err(e) => errs.push(e),
            }
        }

        let failed = errs.len();
        match errs.into_iter().next() {
            None => Ok(()),
            Some(first) => Err(ReconcileError::DeleteEndpoints {
                failed,
                total: slices.len(),
                namespace: namespace.to_string(),
                name: name.to_string(),
                first,
            }),
        }
    }
}
