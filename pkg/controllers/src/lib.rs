pub mod endpointslicemirroring;
