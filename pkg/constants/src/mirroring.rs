//! EndpointSlice mirroring constants.

/// Name the controller records in the managed-by label.
pub const CONTROLLER_NAME: &str = "endpointslicemirroring-controller.k8s.io";

/// Label naming the Service (and Endpoints) a slice belongs to.
pub const LABEL_SERVICE_NAME: &str = "kubernetes.io/service-name";

/// Label naming the controller that manages a slice.
pub const LABEL_MANAGED_BY: &str = "endpointslice.kubernetes.io/managed-by";

/// Endpoints carrying this label set to "true" are never mirrored.
pub const LABEL_SKIP_MIRROR: &str = "endpointslice.kubernetes.io/skip-mirror";

/// Annotation on Endpoints that is not copied onto slices.
pub const ANNOTATION_LAST_CHANGE_TRIGGER_TIME: &str =
    "endpoints.kubernetes.io/last-change-trigger-time";

/// Annotation that marks leader-election Endpoints objects.
pub const ANNOTATION_LEADER: &str = "control-plane.alpha.kubernetes.io/leader";

/// Topology key holding the node name of an endpoint.
pub const TOPOLOGY_HOSTNAME: &str = "kubernetes.io/hostname";

/// Fallback generate-name prefix when `<endpoints-name>-` is not a valid prefix.
pub const DEFAULT_SLICE_PREFIX: &str = "endpointslice-";

/// Default number of addresses mirrored per Endpoints subset.
pub const DEFAULT_MAX_ENDPOINTS_PER_SUBSET: usize = 1000;

/// Default interval between mirroring passes, in seconds.
pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 10;

/// Event reason emitted when invalid IP addresses are skipped.
pub const REASON_INVALID_IP_ADDRESS: &str = "InvalidIPAddress";
