pub mod config;
pub mod endpoint;
pub mod endpointslice;
pub mod namespace;
pub mod validate;
