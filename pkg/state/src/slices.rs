use async_trait::async_trait;
use pkg_constants::state::{ENDPOINT_SLICES_PREFIX, NAMESPACES_PREFIX};
use pkg_types::endpointslice::EndpointSlice;
use pkg_types::namespace::{Namespace, NamespacePhase};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::client::StateStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("namespace {0} is being terminated")]
    NamespaceTerminating(String),

    #[error("endpointslice {namespace}/{name} not found")]
    NotFound { namespace: String, name: String },

    #[error("endpointslice {namespace}/{name} already exists")]
    AlreadyExists { namespace: String, name: String },

    #[error(
        "endpointslice {namespace}/{name} has been modified: resource version {given} does not match {current}"
    )]
    Conflict {
        namespace: String,
        name: String,
        given: String,
        current: String,
    },

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl StoreError {
    /// Creates into a terminating namespace keep failing; callers drop the
    /// work instead of retrying.
    pub fn is_namespace_terminating(&self) -> bool {
        matches!(self, StoreError::NamespaceTerminating(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

/// Write access to EndpointSlice objects.
#[async_trait]
pub trait SliceClient: Send + Sync {
    /// Create a slice. When `name` is empty the store derives one from
    /// `generate_name`. Returns the stored object with its resource version.
    async fn create(&self, slice: &EndpointSlice) -> Result<EndpointSlice, StoreError>;

    /// Replace an existing slice. A non-empty resource version must match
    /// the stored one.
    async fn update(&self, slice: &EndpointSlice) -> Result<EndpointSlice, StoreError>;

    /// Delete a slice by name.
    async fn delete(&self, namespace: &str, name: &str) -> Result<(), StoreError>;
}

pub fn slice_key(namespace: &str, name: &str) -> String {
    format!("{}{}/{}", ENDPOINT_SLICES_PREFIX, namespace, name)
}

/// `generate_name` plus a short random suffix.
pub fn generated_name(prefix: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}{}", prefix, &suffix[..5])
}

/// Resource version after a successful write on top of `current`.
/// Versions are decimal counters; anything unparsable restarts at 1.
pub fn next_resource_version(current: &str) -> String {
    current
        .parse::<u64>()
        .map(|v| v.saturating_add(1))
        .unwrap_or(1)
        .to_string()
}

/// `SliceClient` backed by the SlateDB state store.
///
/// Writes are serialized through one lock so the read-compare-write of an
/// update is atomic within the process.
#[derive(Clone)]
pub struct StoreSliceClient {
    store: StateStore,
    write_lock: Arc<Mutex<()>>,
}

impl StoreSliceClient {
    pub fn new(store: StateStore) -> Self {
        Self {
            store,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    async fn namespace_terminating(&self, namespace: &str) -> Result<bool, StoreError> {
        let key = format!("{}{}", NAMESPACES_PREFIX, namespace);
        let ns: Option<Namespace> = self.store.get_json(&key).await?;
        Ok(ns.is_some_and(|ns| ns.phase == NamespacePhase::Terminating))
    }

    async fn get_slice(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<EndpointSlice>, StoreError> {
        Ok(self.store.get_json(&slice_key(namespace, name)).await?)
    }
}

#[async_trait]
impl SliceClient for StoreSliceClient {
    async fn create(&self, slice: &EndpointSlice) -> Result<EndpointSlice, StoreError> {
        let _guard = self.write_lock.lock().await;

        if self.namespace_terminating(&slice.namespace).await? {
            return Err(StoreError::NamespaceTerminating(slice.namespace.clone()));
        }

        let mut created = slice.clone();
        if created.name.is_empty() {
            created.name = generated_name(&created.generate_name);
        }
        if self.get_slice(&created.namespace, &created.name).await?.is_some() {
            return Err(StoreError::AlreadyExists {
                namespace: created.namespace,
                name: created.name,
            });
        }
        created.resource_version = next_resource_version("");

        self.store
            .put_json(&slice_key(&created.namespace, &created.name), &created)
            .await?;
        debug!(
            "Stored endpointslice {}/{} at version {}",
            created.namespace, created.name, created.resource_version
        );
        Ok(created)
    }

    async fn update(&self, slice: &EndpointSlice) -> Result<EndpointSlice, StoreError> {
        let _guard = self.write_lock.lock().await;

        let Some(current) = self.get_slice(&slice.namespace, &slice.name).await? else {
            return Err(StoreError::NotFound {
                namespace: slice.namespace.clone(),
                name: slice.name.clone(),
            });
        };
        if !slice.resource_version.is_empty()
            && slice.resource_version != current.resource_version
        {
            return Err(StoreError::Conflict {
                namespace: slice.namespace.clone(),
                name: slice.name.clone(),
                given: slice.resource_version.clone(),
                current: current.resource_version,
            });
        }

        let mut updated = slice.clone();
        updated.generate_name = current.generate_name;
        updated.resource_version = next_resource_version(&current.resource_version);

        self.store
            .put_json(&slice_key(&updated.namespace, &updated.name), &updated)
            .await?;
        debug!(
            "Updated endpointslice {}/{} to version {}",
            updated.namespace, updated.name, updated.resource_version
        );
        Ok(updated)
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;

        if self.get_slice(namespace, name).await?.is_none() {
            return Err(StoreError::NotFound {
                namespace: namespace.to_string(),
                name: name.to_string(),
            });
        }
        self.store.delete(&slice_key(namespace, name)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pkg_types::endpointslice::AddressType;
    use std::collections::BTreeMap;

    async fn open_store() -> StateStore {
        let dir = std::env::temp_dir().join(format!("slicemirror-test-{}", Uuid::new_v4()));
        StateStore::new(dir.to_str().unwrap()).await.unwrap()
    }

    fn make_slice(namespace: &str) -> EndpointSlice {
        EndpointSlice {
            name: String::new(),
            generate_name: "web-".to_string(),
            namespace: namespace.to_string(),
            labels: BTreeMap::new(),
            annotations: BTreeMap::new(),
            owner_references: vec![],
            address_type: AddressType::IPv4,
            ports: vec![],
            endpoints: vec![],
            resource_version: String::new(),
        }
    }

    #[test]
    fn resource_versions_count_up() {
        assert_eq!(next_resource_version(""), "1");
        assert_eq!(next_resource_version("1"), "2");
        assert_eq!(next_resource_version("41"), "42");
        assert_eq!(next_resource_version("garbage"), "1");
    }

    #[test]
    fn generated_names_use_prefix() {
        let name = generated_name("web-");
        assert!(name.starts_with("web-"));
        assert_eq!(name.len(), "web-".len() + 5);
    }

    #[tokio::test]
    async fn create_update_delete_lifecycle() {
        let client = StoreSliceClient::new(open_store().await);

        let created = client.create(&make_slice("default")).await.unwrap();
        assert!(created.name.starts_with("web-"));
        assert_eq!(created.resource_version, "1");

        let updated = client.update(&created).await.unwrap();
        assert_eq!(updated.resource_version, "2");

        // Writing with the old version is rejected.
        let err = client.update(&created).await.unwrap_err();
        assert!(err.is_conflict());

        client.delete("default", &created.name).await.unwrap();
        let err = client.delete("default", &created.name).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn create_in_terminating_namespace_fails() {
        let store = open_store().await;
        let ns = Namespace {
            name: "doomed".to_string(),
            labels: BTreeMap::new(),
            phase: NamespacePhase::Terminating,
            created_at: Utc::now(),
        };
        store
            .put_json(&format!("{}doomed", NAMESPACES_PREFIX), &ns)
            .await
            .unwrap();

        let client = StoreSliceClient::new(store);
        let err = client.create(&make_slice("doomed")).await.unwrap_err();
        assert!(err.is_namespace_terminating());
    }
}
