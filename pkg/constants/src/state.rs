//! State store key layout.

/// Prefix under which Namespace objects are stored.
pub const NAMESPACES_PREFIX: &str = "/registry/namespaces/";

/// Prefix under which Endpoints objects are stored.
/// Full key = `ENDPOINTS_PREFIX + namespace + "/" + name`.
pub const ENDPOINTS_PREFIX: &str = "/registry/endpoints/";

/// Prefix under which EndpointSlice objects are stored.
/// Full key = `ENDPOINT_SLICES_PREFIX + namespace + "/" + name`.
pub const ENDPOINT_SLICES_PREFIX: &str = "/registry/endpointslices/";
