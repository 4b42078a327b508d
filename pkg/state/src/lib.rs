pub mod client;
pub mod slices;
