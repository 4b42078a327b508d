use pkg_constants::mirroring::{
    ANNOTATION_LAST_CHANGE_TRIGGER_TIME, ANNOTATION_LEADER, CONTROLLER_NAME,
    DEFAULT_SLICE_PREFIX, LABEL_MANAGED_BY, LABEL_SERVICE_NAME, LABEL_SKIP_MIRROR,
    TOPOLOGY_HOSTNAME,
};
use pkg_types::endpoint::{EndpointAddress, EndpointPort, Endpoints};
use pkg_types::endpointslice::{
    AddressType, Endpoint, EndpointConditions, EndpointSlice, OwnerReference,
};
use pkg_types::validate::validate_generate_name_prefix;
use std::collections::{BTreeMap, HashMap};

use super::reconciler::SlicesByAction;

/// Build an empty slice owned by `endpoints`. A non-empty `slice_name`
/// means the slice replaces an existing one; otherwise the store names it
/// from `generate_name`.
pub fn new_endpoint_slice(
    endpoints: &Endpoints,
    ports: &[EndpointPort],
    address_type: AddressType,
    slice_name: &str,
) -> EndpointSlice {
    let mut labels: BTreeMap<String, String> = endpoints.labels.clone();
    labels.insert(LABEL_SERVICE_NAME.to_string(), endpoints.name.clone());
    labels.insert(LABEL_MANAGED_BY.to_string(), CONTROLLER_NAME.to_string());

    let annotations = endpoints
        .annotations
        .iter()
        .filter(|(k, _)| k.as_str() != ANNOTATION_LAST_CHANGE_TRIGGER_TIME)
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    let (name, generate_name) = if slice_name.is_empty() {
        (String::new(), slice_name_prefix(&endpoints.name))
    } else {
        (slice_name.to_string(), String::new())
    };

    EndpointSlice {
        name,
        generate_name,
        namespace: endpoints.namespace.clone(),
        labels,
        annotations,
        owner_references: vec![OwnerReference {
            api_version: "v1".to_string(),
            kind: "Endpoints".to_string(),
            name: endpoints.name.clone(),
            uid: endpoints.uid.clone(),
            controller: true,
            block_owner_deletion: true,
        }],
        address_type,
        ports: ports.to_vec(),
        endpoints: Vec::new(),
        resource_version: String::new(),
    }
}

/// `generate_name` for slices of the named Endpoints.
pub fn slice_name_prefix(endpoints_name: &str) -> String {
    let prefix = format!("{}-", endpoints_name);
    if validate_generate_name_prefix(&prefix).is_ok() {
        prefix
    } else {
        DEFAULT_SLICE_PREFIX.to_string()
    }
}

pub fn address_to_endpoint(address: &EndpointAddress, ready: bool) -> Endpoint {
    let mut topology = BTreeMap::new();
    if let Some(node_name) = &address.node_name {
        topology.insert(TOPOLOGY_HOSTNAME.to_string(), node_name.clone());
    }
    Endpoint {
        addresses: vec![address.ip.clone()],
        conditions: EndpointConditions { ready: Some(ready) },
        hostname: address.hostname.clone().filter(|h| !h.is_empty()),
        target_ref: address.target_ref.clone(),
        topology,
    }
}

/// Whether an Endpoints object should be mirrored at all. Objects opted
/// out with the skip-mirror label and leader-election records are left
/// alone.
pub fn should_mirror(endpoints: &Endpoints) -> bool {
    if endpoints
        .labels
        .get(LABEL_SKIP_MIRROR)
        .is_some_and(|v| v == "true")
    {
        return false;
    }
    !endpoints.annotations.contains_key(ANNOTATION_LEADER)
}

/// Name of the Endpoints object a mirrored slice belongs to, if the slice
/// is managed by this controller.
pub fn owning_endpoints_name(slice: &EndpointSlice) -> Option<&str> {
    if slice.labels.get(LABEL_MANAGED_BY).map(String::as_str) != Some(CONTROLLER_NAME) {
        return None;
    }
    slice.labels.get(LABEL_SERVICE_NAME).map(String::as_str)
}

/// Turn create+delete pairs of the same address type into updates that
/// reuse the deleted slice's name.
///
/// Deletes are visited in order; each one takes the most recently queued
/// create of its address type. Recycled slices are appended to `to_update`.
pub fn recycle_slices(slices: &mut SlicesByAction) {
    if slices.to_create.is_empty() || slices.to_delete.is_empty() {
        return;
    }

    let mut create_indexes: HashMap<AddressType, Vec<usize>> = HashMap::new();
    for (i, slice) in slices.to_create.iter().enumerate() {
        create_indexes.entry(slice.address_type).or_default().push(i);
    }

    let mut recycled = vec![false; slices.to_create.len()];
    let mut remaining_deletes = Vec::with_capacity(slices.to_delete.len());

    for to_delete in std::mem::take(&mut slices.to_delete) {
        let index = create_indexes
            .get_mut(&to_delete.address_type)
            .and_then(Vec::pop);
        let Some((i, create)) =
            index.and_then(|i| slices.to_create.get_mut(i).map(|s| (i, s)))
        else {
            remaining_deletes.push(to_delete);
            continue;
        };
        create.name = to_delete.name;
        create.generate_name.clear();
        create.resource_version = to_delete.resource_version;
        if let Some(flag) = recycled.get_mut(i) {
            *flag = true;
        }
    }

    let mut to_create = Vec::with_capacity(slices.to_create.len());
    for (slice, was_recycled) in std::mem::take(&mut slices.to_create)
        .into_iter()
        .zip(recycled)
    {
        if was_recycled {
            slices.to_update.push(slice);
        } else {
            to_create.push(slice);
        }
    }
    slices.to_create = to_create;
    slices.to_delete = remaining_deletes;
}

#[cfg(test)]
mod tests {
    use super::*;
    use pkg_types::endpoint::ObjectReference;

    fn make_endpoints(name: &str) -> Endpoints {
        Endpoints {
            name: name.to_string(),
            namespace: "default".to_string(),
            uid: format!("{}-uid", name),
            ..Default::default()
        }
    }

    fn named_slice(name: &str, address_type: AddressType) -> EndpointSlice {
        let mut slice = new_endpoint_slice(&make_endpoints("web"), &[], address_type, name);
        slice.resource_version = format!("{}-rv", name);
        slice
    }

    fn pending_slice(address_type: AddressType, ips: &[&str]) -> EndpointSlice {
        let mut slice = new_endpoint_slice(&make_endpoints("web"), &[], address_type, "");
        slice.endpoints = ips
            .iter()
            .map(|ip| Endpoint {
                addresses: vec![ip.to_string()],
                ..Default::default()
            })
            .collect();
        slice
    }

    #[test]
    fn new_slice_copies_metadata() {
        let mut eps = make_endpoints("web");
        eps.labels.insert("app".to_string(), "web".to_string());
        eps.annotations
            .insert("team".to_string(), "payments".to_string());
        eps.annotations.insert(
            ANNOTATION_LAST_CHANGE_TRIGGER_TIME.to_string(),
            "2024-01-01T00:00:00Z".to_string(),
        );

        let slice = new_endpoint_slice(&eps, &[], AddressType::IPv4, "");
        assert_eq!(slice.name, "");
        assert_eq!(slice.generate_name, "web-");
        assert_eq!(slice.namespace, "default");
        assert_eq!(slice.labels.get("app").map(String::as_str), Some("web"));
        assert_eq!(
            slice.labels.get(LABEL_SERVICE_NAME).map(String::as_str),
            Some("web")
        );
        assert_eq!(
            slice.labels.get(LABEL_MANAGED_BY).map(String::as_str),
            Some(CONTROLLER_NAME)
        );
        assert_eq!(
            slice.annotations.get("team").map(String::as_str),
            Some("payments")
        );
        assert!(
            !slice
                .annotations
                .contains_key(ANNOTATION_LAST_CHANGE_TRIGGER_TIME)
        );
        assert_eq!(slice.owner_references.len(), 1);
        assert_eq!(slice.owner_references[0].kind, "Endpoints");
        assert_eq!(slice.owner_references[0].uid, "web-uid");
        assert!(slice.owner_references[0].controller);
        assert_eq!(owning_endpoints_name(&slice), Some("web"));
    }

    #[test]
    fn named_slice_has_no_generate_name() {
        let slice = new_endpoint_slice(&make_endpoints("web"), &[], AddressType::IPv6, "web-abcde");
        assert_eq!(slice.name, "web-abcde");
        assert!(slice.generate_name.is_empty());
    }

    #[test]
    fn invalid_prefix_falls_back() {
        assert_eq!(slice_name_prefix("web"), "web-");
        assert_eq!(slice_name_prefix("Web_Service"), DEFAULT_SLICE_PREFIX);
    }

    #[test]
    fn address_conversion() {
        let address = EndpointAddress {
            ip: "10.0.0.1".to_string(),
            target_ref: Some(ObjectReference {
                kind: "Pod".to_string(),
                namespace: "default".to_string(),
                name: "web-0".to_string(),
                uid: "uid-0".to_string(),
            }),
            hostname: Some(String::new()),
            node_name: Some("node-1".to_string()),
        };
        let ep = address_to_endpoint(&address, false);
        assert_eq!(ep.addresses, vec!["10.0.0.1"]);
        assert_eq!(ep.conditions.ready, Some(false));
        assert!(ep.hostname.is_none());
        assert_eq!(
            ep.topology.get(TOPOLOGY_HOSTNAME).map(String::as_str),
            Some("node-1")
        );
        assert_eq!(ep.target_ref.map(|r| r.name), Some("web-0".to_string()));
    }

    #[test]
    fn mirror_filter() {
        let eps = make_endpoints("web");
        assert!(should_mirror(&eps));

        let mut skipped = make_endpoints("web");
        skipped
            .labels
            .insert(LABEL_SKIP_MIRROR.to_string(), "true".to_string());
        assert!(!should_mirror(&skipped));

        let mut leader = make_endpoints("kube-scheduler");
        leader
            .annotations
            .insert(ANNOTATION_LEADER.to_string(), "{}".to_string());
        assert!(!should_mirror(&leader));
    }

    #[test]
    fn unmanaged_slices_have_no_owner() {
        let mut slice = named_slice("web-abcde", AddressType::IPv4);
        slice.labels.remove(LABEL_MANAGED_BY);
        assert_eq!(owning_endpoints_name(&slice), None);
    }

    #[test]
    fn recycle_turns_create_and_delete_into_update() {
        let mut slices = SlicesByAction {
            to_create: vec![pending_slice(AddressType::IPv4, &["10.0.0.1"])],
            to_update: vec![],
            to_delete: vec![named_slice("web-old", AddressType::IPv4)],
        };
        recycle_slices(&mut slices);

        assert!(slices.to_create.is_empty());
        assert!(slices.to_delete.is_empty());
        assert_eq!(slices.to_update.len(), 1);
        let updated = &slices.to_update[0];
        assert_eq!(updated.name, "web-old");
        assert_eq!(updated.resource_version, "web-old-rv");
        assert!(updated.generate_name.is_empty());
        assert_eq!(updated.endpoints[0].addresses, vec!["10.0.0.1"]);
    }

    #[test]
    fn recycle_only_pairs_matching_address_types() {
        let mut slices = SlicesByAction {
            to_create: vec![
                pending_slice(AddressType::IPv4, &["10.0.0.1"]),
                pending_slice(AddressType::IPv6, &["fd00::1"]),
            ],
            to_update: vec![],
            to_delete: vec![
                named_slice("web-v6", AddressType::IPv6),
                named_slice("web-extra", AddressType::IPv6),
            ],
        };
        recycle_slices(&mut slices);

        assert_eq!(slices.to_create.len(), 1);
        assert_eq!(slices.to_create[0].address_type, AddressType::IPv4);
        assert_eq!(slices.to_update.len(), 1);
        assert_eq!(slices.to_update[0].name, "web-v6");
        assert_eq!(slices.to_update[0].endpoints[0].addresses, vec!["fd00::1"]);
        assert_eq!(slices.to_delete.len(), 1);
        assert_eq!(slices.to_delete[0].name, "web-extra");
    }

    #[test]
    fn recycle_uses_latest_create_first() {
        let mut slices = SlicesByAction {
            to_create: vec![
                pending_slice(AddressType::IPv4, &["10.0.0.1"]),
                pending_slice(AddressType::IPv4, &["10.0.0.2"]),
            ],
            to_update: vec![],
            to_delete: vec![named_slice("web-old", AddressType::IPv4)],
        };
        recycle_slices(&mut slices);

        assert_eq!(slices.to_update.len(), 1);
        assert_eq!(slices.to_update[0].endpoints[0].addresses, vec!["10.0.0.2"]);
        assert_eq!(slices.to_create.len(), 1);
        assert_eq!(slices.to_create[0].endpoints[0].addresses, vec!["10.0.0.1"]);
    }
}
