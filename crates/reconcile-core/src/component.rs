//! Component contract
//!
//! A component owns one slice of the platform (a set of definitions, a
//! workload, a policy) and knows how to converge it toward a cluster spec of
//! type `S`, and how to remove it when the spec no longer wants it.

use crate::error::ComponentError;
use k8s_openapi::api::core::v1::ObjectReference;
use platform_client::{EventSeverity, EventSink, PlatformClient, PlatformVersion};
use std::sync::Arc;

/// Priority assigned to components that do not override [`Component::priority`]
pub const DEFAULT_COMPONENT_PRIORITY: i32 = 0;

/// Everything a component receives at initialization time
#[derive(Clone)]
pub struct ComponentContext {
    /// Platform API access
    pub client: Arc<dyn PlatformClient>,
    /// Control-plane version read at the start of the cycle
    pub platform_version: PlatformVersion,
    /// Sink for cluster events
    pub recorder: Arc<dyn EventSink>,
    /// Object events are recorded against (the cluster resource)
    pub event_target: ObjectReference,
}

impl std::fmt::Debug for ComponentContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentContext")
            .field("platform_version", &self.platform_version)
            .field("event_target", &self.event_target.name)
            .finish_non_exhaustive()
    }
}

impl ComponentContext {
    /// Bundle the per-cycle inputs
    pub fn new(
        client: Arc<dyn PlatformClient>,
        platform_version: PlatformVersion,
        recorder: Arc<dyn EventSink>,
        event_target: ObjectReference,
    ) -> Self {
        Self {
            client,
            platform_version,
            recorder,
            event_target,
        }
    }

    /// Record an event against the cluster resource
    pub fn record(&self, severity: EventSeverity, reason: &str, message: &str) {
        self.recorder.record(&self.event_target, severity, reason, message);
    }
}

/// Whether an expensive one-time setup is trusted once done
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SetupPolicy {
    /// Skip the setup once it has succeeded, until the component is reset.
    /// Out-of-band deletion is not noticed until restart or reset.
    #[default]
    TrustCached,
    /// Re-run the (idempotent) setup every cycle
    Revalidate,
}

/// Tracks a component's one-time setup under a [`SetupPolicy`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SetupGuard {
    policy: SetupPolicy,
    done: bool,
}

impl SetupGuard {
    /// Not yet done
    pub const fn new(policy: SetupPolicy) -> Self {
        Self { policy, done: false }
    }

    /// Whether the setup has to run this cycle
    pub fn needs_setup(&self) -> bool {
        !self.done || self.policy == SetupPolicy::Revalidate
    }

    /// Record a successful setup
    pub fn mark_done(&mut self) {
        self.done = true;
    }

    /// Forget the cached result so the next cycle re-runs the setup
    pub fn reset(&mut self) {
        self.done = false;
    }

    /// Whether a setup has succeeded since the last reset
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Policy the guard was built with
    pub fn policy(&self) -> SetupPolicy {
        self.policy
    }
}

/// One independently enable-able unit of the platform.
///
/// All methods are called sequentially by the driver; a component is never
/// invoked concurrently with itself. `reconcile` must be idempotent and
/// `delete` must tolerate the managed resources being absent.
#[async_trait::async_trait]
pub trait Component<S: Sync>: Send + Sync {
    /// Unique, stable name used for registration and logs
    fn name(&self) -> &str;

    /// Lower runs earlier
    fn priority(&self) -> i32 {
        DEFAULT_COMPONENT_PRIORITY
    }

    /// Capture the platform handle and version. Must not touch the cluster.
    fn initialize(&mut self, ctx: &ComponentContext);

    /// Whether the spec wants this component deployed. Pure.
    fn is_enabled(&self, spec: &S) -> bool;

    /// Whether the component is frozen for an in-progress migration. Pure.
    fn is_paused_for_migration(&self, _spec: &S) -> bool {
        false
    }

    /// Converge the component's resources toward `spec`
    async fn reconcile(&mut self, spec: &S) -> Result<(), ComponentError>;

    /// Remove the component's resources
    async fn delete(&mut self, spec: &S) -> Result<(), ComponentError>;

    /// Reset internal flags so the next reconcile starts from scratch
    fn mark_deleted(&mut self);

    /// How the component treats its own one-time setup
    fn setup_policy(&self) -> SetupPolicy {
        SetupPolicy::TrustCached
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use platform_client::{MockPlatformClient, RecordingEventSink};

    #[test]
    fn test_trust_cached_skips_after_success() {
        let mut guard = SetupGuard::new(SetupPolicy::TrustCached);
        assert!(guard.needs_setup());
        guard.mark_done();
        assert!(!guard.needs_setup());
        guard.reset();
        assert!(guard.needs_setup());
    }

    #[test]
    fn test_revalidate_always_runs() {
        let mut guard = SetupGuard::new(SetupPolicy::Revalidate);
        guard.mark_done();
        assert!(guard.is_done());
        assert!(guard.needs_setup());
    }

    #[test]
    fn test_default_policy_is_trust_cached() {
        assert_eq!(SetupGuard::default().policy(), SetupPolicy::TrustCached);
    }

    #[test]
    fn test_context_records_against_target() {
        let sink = Arc::new(RecordingEventSink::new());
        let target = ObjectReference {
            name: Some("px-cluster".to_string()),
            ..Default::default()
        };
        let ctx = ComponentContext::new(
            Arc::new(MockPlatformClient::new(PlatformVersion::new(1, 30, 0))),
            PlatformVersion::new(1, 30, 0),
            sink.clone(),
            target,
        );
        ctx.record(EventSeverity::Normal, "ComponentReady", "installed");

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].target.as_deref(), Some("px-cluster"));
        assert_eq!(events[0].reason, "ComponentReady");
    }
}
