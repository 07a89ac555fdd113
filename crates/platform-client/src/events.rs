//! Event recording sink
//!
//! Components report notable transitions as Kubernetes Events, visible via
//! `kubectl describe storagecluster`. Recording is fire-and-forget: the sink
//! never blocks the caller and never returns an error, since a failed event
//! must not break reconciliation.

use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::Client;
use std::sync::Arc;
use tracing::warn;

/// Event severity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventSeverity {
    /// Informational
    Normal,
    /// Something needs attention
    Warning,
}

impl From<EventSeverity> for EventType {
    fn from(severity: EventSeverity) -> Self {
        match severity {
            EventSeverity::Normal => EventType::Normal,
            EventSeverity::Warning => EventType::Warning,
        }
    }
}

/// Sink accepting `(severity, reason, message)` about a target object
pub trait EventSink: Send + Sync {
    fn record(&self, target: &ObjectReference, severity: EventSeverity, reason: &str, message: &str);
}

/// Production sink wrapping `kube::runtime::events::Recorder`.
///
/// Each event is published from a spawned task so `record` returns immediately.
pub struct KubeEventSink {
    recorder: Arc<Recorder>,
}

impl std::fmt::Debug for KubeEventSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeEventSink").finish_non_exhaustive()
    }
}

impl KubeEventSink {
    /// `controller_name` appears as the reporting component on Events.
    pub fn new(client: Client, controller_name: &str) -> Self {
        let reporter = Reporter {
            controller: controller_name.to_string(),
            instance: std::env::var("POD_NAME").ok(),
        };
        Self {
            recorder: Arc::new(Recorder::new(client, reporter)),
        }
    }
}

impl EventSink for KubeEventSink {
    fn record(&self, target: &ObjectReference, severity: EventSeverity, reason: &str, message: &str) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(reason, "No async runtime available, dropping event");
            return;
        };
        let event = Event {
            type_: severity.into(),
            reason: reason.to_string(),
            note: Some(message.to_string()),
            action: actions::RECONCILE.to_string(),
            secondary: None,
        };
        let recorder = Arc::clone(&self.recorder);
        let target = target.clone();
        handle.spawn(async move {
            if let Err(e) = recorder.publish(&event, &target).await {
                warn!(reason = %event.reason, error = %e, "Failed to publish Kubernetes event");
            }
        });
    }
}

/// Sink that drops everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn record(&self, _target: &ObjectReference, _severity: EventSeverity, _reason: &str, _message: &str) {}
}

/// Well-known event reason strings.
///
/// These appear in `kubectl get events` under the REASON column.
pub mod reasons {
    /// A component finished its one-time setup
    pub const COMPONENT_READY: &str = "ComponentReady";
    /// A component failed but the cycle continued
    pub const COMPONENT_DEGRADED: &str = "ComponentDegraded";
    /// A critical component failure aborted the cycle
    pub const CYCLE_BLOCKED: &str = "ReconcileBlocked";
    /// Every component converged after a previous failure
    pub const CLUSTER_ONLINE: &str = "ClusterOnline";
}

/// Well-known event action strings.
pub mod actions {
    /// Standard reconciliation cycle
    pub const RECONCILE: &str = "Reconcile";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_maps_to_event_type() {
        assert!(matches!(EventType::from(EventSeverity::Normal), EventType::Normal));
        assert!(matches!(EventType::from(EventSeverity::Warning), EventType::Warning));
    }

    #[test]
    fn test_noop_sink_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<NoopEventSink>();
        NoopEventSink.record(&ObjectReference::default(), EventSeverity::Normal, reasons::CLUSTER_ONLINE, "ok");
    }
}
