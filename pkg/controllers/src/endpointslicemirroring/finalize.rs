use pkg_types::endpoint::Endpoints;
use pkg_types::endpointslice::EndpointSlice;
use tracing::{debug, info};

use super::error::{ReconcileError, Result, SliceAction, SliceError};
use super::metrics::ENDPOINT_SLICE_CHANGES;
use super::reconciler::{Reconciler, SlicesByAction};
use super::utils::recycle_slices;

impl Reconciler {
    /// Apply a plan: creates, then updates, then deletes.
    ///
    /// Every item is attempted; failures are collected and returned together.
    /// Creates are skipped while the Endpoints object is being deleted, and
    /// a create rejected because the namespace is terminating ends the call
    /// successfully.
    pub async fn finalize(&self, endpoints: &Endpoints, mut slices: SlicesByAction) -> Result<()> {
        recycle_slices(&mut slices);

        let mut errs: Vec<SliceError> = Vec::new();
        let owner = endpoints.key();

        if endpoints.is_terminating() {
            if !slices.to_create.is_empty() {
                debug!(
                    "Endpoints {} is being deleted, skipping {} EndpointSlice creates",
                    owner,
                    slices.to_create.len()
                );
            }
        } else {
            for slice in &slices.to_create {
                match self.client.create(slice).await {
                    Ok(created) => {
                        info!("Created EndpointSlice {} for Endpoints {}", created.name, owner);
                        self.record_write(SliceAction::Create, &created);
                    }
                    Err(e) if e.is_namespace_terminating() => {
                        debug!(
                            "Namespace {} is terminating, dropping EndpointSlice creates for {}",
                            endpoints.namespace, owner
                        );
                        return Ok(());
                    }
                    Err(e) => errs.push(SliceError {
                        action: SliceAction::Create,
                        slice: slice.generate_name.clone(),
                        endpoints: owner.clone(),
                        source: e,
                    }),
                }
            }
        }

        for slice in &slices.to_update {
            match self.client.update(slice).await {
                Ok(updated) => {
                    info!("Updated EndpointSlice {} for Endpoints {}", updated.name, owner);
                    self.record_write(SliceAction::Update, &updated);
                }
                Err(e) => errs.push(SliceError {
                    action: SliceAction::Update,
                    slice: slice.name.clone(),
                    endpoints: owner.clone(),
                    source: e,
                }),
            }
        }

        for slice in &slices.to_delete {
            match self.client.delete(&slice.namespace, &slice.name).await {
                Ok(()) => {
                    info!("Deleted EndpointSlice {} for Endpoints {}", slice.name, owner);
                    self.record_write(SliceAction::Delete, slice);
                }
                Err(e) => errs.push(SliceError {
                    action: SliceAction::Delete,
                    slice: slice.name.clone(),
                    endpoints: owner.clone(),
                    source: e,
                }),
            }
        }

        if errs.is_empty() {
            Ok(())
        } else {
            Err(ReconcileError::Aggregate(errs))
        }
    }

    /// Track the written slice and count the operation.
    pub(super) fn record_write(&self, action: SliceAction, slice: &EndpointSlice) {
        match action {
            SliceAction::Create | SliceAction::Update => self.tracker.update(slice),
            SliceAction::Delete => self.tracker.delete(slice),
        }
        self.metrics_cache
            .registry()
            .counter_inc_with(ENDPOINT_SLICE_CHANGES, &[("operation", action.as_str())]);
    }
}
