//! In-memory collaborators for reconciler tests.

use async_trait::async_trait;
use pkg_metrics::MetricsRegistry;
use pkg_state::slices::{SliceClient, StoreError, next_resource_version};
use pkg_types::endpoint::{EndpointAddress, EndpointPort, EndpointSubset, Endpoints};
use pkg_types::endpointslice::EndpointSlice;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};

use super::events::{EventRecorder, EventType};
use super::metrics::MetricsCache;
use super::reconciler::Reconciler;
use super::tracker::EndpointSliceTracker;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Create(String),
    Update(String),
    Delete(String),
}

#[derive(Default)]
pub struct FakeSliceClient {
    pub slices: Mutex<BTreeMap<String, EndpointSlice>>,
    pub calls: Mutex<Vec<Call>>,
    /// Names (or generate_name prefixes) whose writes fail.
    pub failing: Mutex<HashSet<String>>,
    pub namespace_terminating: Mutex<bool>,
    next_id: Mutex<u32>,
}

impl FakeSliceClient {
    pub fn fail(&self, name: &str) {
        self.failing.lock().unwrap().insert(name.to_string());
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Stored slices in name order, as a lister would return them.
    pub fn list(&self) -> Vec<EndpointSlice> {
        self.slices.lock().unwrap().values().cloned().collect()
    }

    fn backend_error(name: &str) -> StoreError {
        StoreError::Backend(anyhow::anyhow!("injected failure for {}", name))
    }
}

#[async_trait]
impl SliceClient for FakeSliceClient {
    async fn create(&self, slice: &EndpointSlice) -> Result<EndpointSlice, StoreError> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::Create(slice.generate_name.clone()));
        if *self.namespace_terminating.lock().unwrap() {
            return Err(StoreError::NamespaceTerminating(slice.namespace.clone()));
        }
        if self.failing.lock().unwrap().contains(&slice.generate_name) {
            return Err(Self::backend_error(&slice.generate_name));
        }
        let mut created = slice.clone();
        let mut id = self.next_id.lock().unwrap();
        *id += 1;
        created.name = format!("{}{:05}", slice.generate_name, *id);
        created.resource_version = "1".to_string();
        self.slices
            .lock()
            .unwrap()
            .insert(created.name.clone(), created.clone());
        Ok(created)
    }

    async fn update(&self, slice: &EndpointSlice) -> Result<EndpointSlice, StoreError> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::Update(slice.name.clone()));
        if self.failing.lock().unwrap().contains(&slice.name) {
            return Err(Self::backend_error(&slice.name));
        }
        let mut slices = self.slices.lock().unwrap();
        let Some(current) = slices.get(&slice.name) else {
            return Err(StoreError::NotFound {
                namespace: slice.namespace.clone(),
                name: slice.name.clone(),
            });
        };
        if !slice.resource_version.is_empty() && slice.resource_version != current.resource_version
        {
            return Err(StoreError::Conflict {
                namespace: slice.namespace.clone(),
                name: slice.name.clone(),
                given: slice.resource_version.clone(),
                current: current.resource_version.clone(),
            });
        }
        let mut updated = slice.clone();
        updated.resource_version = next_resource_version(&current.resource_version);
        slices.insert(updated.name.clone(), updated.clone());
        Ok(updated)
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::Delete(name.to_string()));
        if self.failing.lock().unwrap().contains(name) {
            return Err(Self::backend_error(name));
        }
        match self.slices.lock().unwrap().remove(name) {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound {
                namespace: namespace.to_string(),
                name: name.to_string(),
            }),
        }
    }
}

#[derive(Default)]
pub struct RecordingEventRecorder {
    pub events: Mutex<Vec<(EventType, String, String)>>,
}

impl EventRecorder for RecordingEventRecorder {
    fn event(&self, _endpoints: &Endpoints, event_type: EventType, reason: &str, message: &str) {
        self.events
            .lock()
            .unwrap()
            .push((event_type, reason.to_string(), message.to_string()));
    }
}

pub struct Harness {
    pub client: Arc<FakeSliceClient>,
    pub events: Arc<RecordingEventRecorder>,
    pub tracker: Arc<EndpointSliceTracker>,
    pub registry: Arc<MetricsRegistry>,
    pub metrics_cache: Arc<MetricsCache>,
    pub reconciler: Reconciler,
}

pub fn harness(max_endpoints_per_subset: usize) -> Harness {
    let client = Arc::new(FakeSliceClient::default());
    let events = Arc::new(RecordingEventRecorder::default());
    let tracker = Arc::new(EndpointSliceTracker::new());
    let registry = Arc::new(MetricsRegistry::new());
    let metrics_cache = Arc::new(MetricsCache::new(
        registry.clone(),
        max_endpoints_per_subset,
    ));
    let reconciler = Reconciler::new(
        client.clone(),
        max_endpoints_per_subset,
        tracker.clone(),
        metrics_cache.clone(),
        events.clone(),
    );
    Harness {
        client,
        events,
        tracker,
        registry,
        metrics_cache,
        reconciler,
    }
}

pub fn address(ip: &str) -> EndpointAddress {
    EndpointAddress {
        ip: ip.to_string(),
        target_ref: None,
        hostname: None,
        node_name: None,
    }
}

pub fn port(name: &str, number: u16) -> EndpointPort {
    EndpointPort {
        name: name.to_string(),
        port: number,
        protocol: "TCP".to_string(),
    }
}

pub fn subset(ready: &[&str], not_ready: &[&str], ports: Vec<EndpointPort>) -> EndpointSubset {
    EndpointSubset {
        addresses: ready.iter().map(|ip| address(ip)).collect(),
        not_ready_addresses: not_ready.iter().map(|ip| address(ip)).collect(),
        ports,
    }
}

pub fn endpoints(name: &str, subsets: Vec<EndpointSubset>) -> Endpoints {
    Endpoints {
        name: name.to_string(),
        namespace: "default".to_string(),
        uid: format!("{}-uid", name),
        subsets,
        ..Default::default()
    }
}
