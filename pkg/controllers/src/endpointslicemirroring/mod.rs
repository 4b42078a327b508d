//! Mirrors legacy Endpoints objects into EndpointSlices.
//!
//! Planning (`desired`, `reconciler::plan_reconcile`) is pure. Store writes,
//! tracker updates and metrics happen in `Reconciler::finalize` and
//! `Reconciler::delete_endpoints`. `EndpointSliceMirroringController` drives
//! the reconciler periodically from the state store.

pub mod desired;
pub mod endpoint_set;
pub mod error;
pub mod events;
mod finalize;
pub mod metrics;
pub mod port_map;
pub mod reconciler;
pub mod tracker;
pub mod utils;

#[cfg(test)]
mod test_support;

pub use error::{ReconcileError, SliceAction, SliceError};
pub use reconciler::{Reconciler, SlicesByAction, TotalsByAction};

use pkg_constants::state::{ENDPOINT_SLICES_PREFIX, ENDPOINTS_PREFIX, NAMESPACES_PREFIX};
use pkg_metrics::MetricsRegistry;
use pkg_state::client::StateStore;
use pkg_state::slices::StoreSliceClient;
use pkg_types::endpoint::Endpoints;
use pkg_types::endpointslice::EndpointSlice;
use pkg_types::namespace::Namespace;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use events::EventRecorder;
use metrics::MetricsCache;
use tracker::EndpointSliceTracker;
use utils::{owning_endpoints_name, should_mirror};

/// Outcome of one pass over the store.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncSummary {
    pub reconciled: usize,
    pub deleted: usize,
    pub failed: usize,
}

/// Background controller that keeps EndpointSlices in the state store in
/// line with the Endpoints objects stored next to them.
pub struct EndpointSliceMirroringController {
    store: StateStore,
    reconciler: Reconciler,
    sync_interval: Duration,
}

impl EndpointSliceMirroringController {
    pub fn new(
        store: StateStore,
        max_endpoints_per_subset: usize,
        sync_interval: Duration,
        registry: Arc<MetricsRegistry>,
        event_recorder: Arc<dyn EventRecorder>,
    ) -> Self {
        let client = Arc::new(StoreSliceClient::new(store.clone()));
        let reconciler = Reconciler::new(
            client,
            max_endpoints_per_subset,
            Arc::new(EndpointSliceTracker::new()),
            Arc::new(MetricsCache::new(registry, max_endpoints_per_subset)),
            event_recorder,
        );
        Self {
            store,
            reconciler,
            sync_interval,
        }
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    /// Start the controller loop as a background task.
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                "EndpointSliceMirroringController started (interval={}s, max-endpoints-per-subset={})",
                self.sync_interval.as_secs(),
                self.reconciler.max_endpoints_per_subset
            );
            let mut interval = tokio::time::interval(self.sync_interval);
            loop {
                interval.tick().await;
                match self.sync_all().await {
                    Ok(summary) if summary.failed > 0 => warn!(
                        "EndpointSliceMirroringController: {} Endpoints failed to sync, retrying next pass",
                        summary.failed
                    ),
                    Ok(summary) => debug!("EndpointSliceMirroringController pass: {:?}", summary),
                    Err(e) => warn!("EndpointSliceMirroringController reconcile error: {}", e),
                }
            }
        })
    }

    /// One pass over every namespace.
    pub async fn sync_all(&self) -> anyhow::Result<SyncSummary> {
        let namespaces: Vec<Namespace> = self.store.list_json(NAMESPACES_PREFIX).await?;
        let mut summary = SyncSummary::default();
        for ns in namespaces {
            let ns_summary = self.sync_namespace(&ns.name).await?;
            summary.reconciled += ns_summary.reconciled;
            summary.deleted += ns_summary.deleted;
            summary.failed += ns_summary.failed;
        }
        Ok(summary)
    }

    /// Reconcile every Endpoints object in a namespace and clean up slices
    /// whose Endpoints are gone or no longer mirrored.
    pub async fn sync_namespace(&self, ns: &str) -> anyhow::Result<SyncSummary> {
        let endpoints_prefix = format!("{}{}/", ENDPOINTS_PREFIX, ns);
        let (endpoints, undecodable): (Vec<Endpoints>, _) =
            self.store.list_json_checked(&endpoints_prefix).await?;
        let slices: Vec<EndpointSlice> = self
            .store
            .list_json(&format!("{}{}/", ENDPOINT_SLICES_PREFIX, ns))
            .await?;

        let mut slices_by_owner: BTreeMap<String, Vec<EndpointSlice>> = BTreeMap::new();
        for slice in slices {
            let Some(owner) = owning_endpoints_name(&slice).map(str::to_string) else {
                continue;
            };
            slices_by_owner.entry(owner).or_default().push(slice);
        }

        let mut summary = SyncSummary::default();

        // A record that exists but does not decode is not a deleted
        // Endpoints; its slices stay until it can be read again.
        for key in undecodable {
            let name = key.strip_prefix(endpoints_prefix.as_str()).unwrap_or(key.as_str());
            if let Some(kept) = slices_by_owner.remove(name) {
                warn!(
                    "Endpoints {}/{} could not be decoded, leaving its {} EndpointSlices untouched",
                    ns,
                    name,
                    kept.len()
                );
            }
            summary.failed += 1;
        }

        for eps in endpoints {
            let existing = slices_by_owner.remove(&eps.name).unwrap_or_default();
            if !should_mirror(&eps) {
                if !existing.is_empty() {
                    self.delete_owned(ns, &eps.name, &existing, &mut summary)
                        .await;
                }
                continue;
            }
            if existing.iter().any(|s| self.reconciler.tracker().stale(s)) {
                warn!(
                    "EndpointSlices of Endpoints {} are older than the last write, retrying next pass",
                    eps.key()
                );
                self.reconciler.tracker().delete_owner(ns, &eps.name);
                summary.failed += 1;
                continue;
            }
            match self.reconciler.reconcile(&eps, existing).await {
                Ok(()) => summary.reconciled += 1,
                Err(e) => {
                    warn!("Failed to mirror Endpoints {}: {}", eps.key(), e);
                    summary.failed += 1;
                }
            }
        }

        for (owner, orphaned) in slices_by_owner {
            self.delete_owned(ns, &owner, &orphaned, &mut summary).await;
        }

        Ok(summary)
    }

    async fn delete_owned(
        &self,
        ns: &str,
        name: &str,
        slices: &[EndpointSlice],
        summary: &mut SyncSummary,
    ) {
        match self.reconciler.delete_endpoints(ns, name, slices).await {
            Ok(()) => {
                info!(
                    "Removed {} EndpointSlices of Endpoints {}/{}",
                    slices.len(),
                    ns,
                    name
                );
                summary.deleted += 1;
            }
            Err(e) => {
                warn!("{}", e);
                summary.failed += 1;
            }
        }
    }
}
