//! Storage Operator CRD Definitions
//!
//! Kubernetes Custom Resource Definitions consumed by the storage operator,
//! plus the read-only accessors the components use to interpret them.

pub mod predicates;
pub mod storage_cluster;

pub use storage_cluster::*;
