//! Component reconciliation framework
//!
//! Drives a multi-part platform into conformance with a declarative cluster
//! spec, one cycle at a time:
//!
//! - [`Component`]: one independently enable-able unit with a create/update
//!   and delete lifecycle
//! - [`ComponentRegistry`]: named components in priority order
//! - [`ReconciliationDriver`]: runs a cycle over the registry and classifies
//!   failures as critical (stop) or advisory (continue)
//! - [`ConvergenceWaiter`]: bounded polling until a condition holds
//! - [`VersionedResource`]: installs the schema variant matching the platform
//!   version and waits for it to be established
//!
//! The framework is generic over the spec type and never inspects it; only
//! components do.

pub mod component;
pub mod convergence;
pub mod driver;
pub mod error;
pub mod registry;
pub mod versioned;

pub use component::{Component, ComponentContext, DEFAULT_COMPONENT_PRIORITY, SetupGuard, SetupPolicy};
pub use convergence::{ConvergenceWaiter, ProbeOutcome};
pub use driver::{
    ComponentFailure, ComponentStep, CycleOutcome, CyclePhase, CycleReport, Operation, ReconciliationDriver, StepKind,
};
pub use error::{AdapterError, BoxError, ComponentError, ConvergenceError, RegistryError, Severity};
pub use registry::ComponentRegistry;
pub use platform_client::PlatformVersion;
pub use versioned::{
    CrdApi, CrdDescriptor, CrdScope, CrdVersion, DEFAULT_ESTABLISH_POLL_INTERVAL, DEFAULT_ESTABLISH_TIMEOUT,
    SchemaVariant, VersionedResource,
};
