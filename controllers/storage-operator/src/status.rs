//! Cycle report to StorageCluster status and events

use chrono::{DateTime, Utc};
use crds::{ClusterPhase, StorageCluster, StorageClusterStatus};
use kube::Api;
use kube::api::{Patch, PatchParams};
use k8s_openapi::api::core::v1::ObjectReference;
use platform_client::{EventSeverity, EventSink};
use platform_client::events::reasons;
use reconcile_core::{CyclePhase, CycleReport};
use serde_json::json;
use tracing::debug;

/// Status reasons, one per phase
pub mod status_reasons {
    pub const CONVERGED: &str = "Converged";
    pub const ADVISORY_FAILURES: &str = "AdvisoryFailures";
    pub const COMPONENT_FAILED: &str = "ComponentFailed";
}

/// Status phase for a cycle phase
pub fn cluster_phase(phase: CyclePhase) -> ClusterPhase {
    match phase {
        CyclePhase::Converged => ClusterPhase::Online,
        CyclePhase::ConvergingWithIssues => ClusterPhase::Degraded,
        CyclePhase::Blocked => ClusterPhase::Blocked,
    }
}

/// Status reflecting `report`, stamped with `now`
pub fn status_from_report(report: &CycleReport, now: DateTime<Utc>) -> StorageClusterStatus {
    let advisories: Vec<String> = report.advisories.iter().map(|a| a.summary()).collect();
    let (reason, message) = match (report.phase(), report.blocking()) {
        (CyclePhase::Blocked, Some(failure)) => (status_reasons::COMPONENT_FAILED, Some(failure.summary())),
        (CyclePhase::ConvergingWithIssues, _) => (
            status_reasons::ADVISORY_FAILURES,
            Some(format!("{} component(s) reported advisory failures", advisories.len())),
        ),
        _ => (status_reasons::CONVERGED, None),
    };

    StorageClusterStatus {
        phase: cluster_phase(report.phase()),
        reason: Some(reason.to_string()),
        message,
        advisories,
        last_reconciled: Some(now),
    }
}

/// Record events for a finished cycle.
///
/// `previous` is the phase stored on the cluster before the cycle; the
/// online event is only emitted on a transition into `Online`.
pub fn record_cycle_events(
    sink: &dyn EventSink,
    target: &ObjectReference,
    report: &CycleReport,
    previous: Option<ClusterPhase>,
) {
    for advisory in &report.advisories {
        sink.record(target, EventSeverity::Warning, reasons::COMPONENT_DEGRADED, &advisory.summary());
    }
    match report.blocking() {
        Some(failure) => sink.record(target, EventSeverity::Warning, reasons::CYCLE_BLOCKED, &failure.summary()),
        None if report.phase() == CyclePhase::Converged && previous != Some(ClusterPhase::Online) => {
            sink.record(target, EventSeverity::Normal, reasons::CLUSTER_ONLINE, "All components converged");
        }
        None => {}
    }
}

/// Merge-patch the status subresource
pub async fn patch_status(
    api: &Api<StorageCluster>,
    name: &str,
    status: &StorageClusterStatus,
) -> Result<(), kube::Error> {
    let status_patch = json!({ "status": status });
    api.patch_status(name, &PatchParams::default(), &Patch::Merge(&status_patch))
        .await?;
    debug!(cluster = name, phase = status.phase.as_str(), "Updated StorageCluster status");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use platform_client::RecordingEventSink;
    use reconcile_core::{ComponentError, ComponentFailure, CycleOutcome, Operation};

    fn report(outcome: CycleOutcome, advisories: Vec<ComponentFailure>) -> CycleReport {
        CycleReport {
            cycle_id: Default::default(),
            outcome,
            advisories,
            steps: Vec::new(),
        }
    }

    fn failure(component: &str, error: ComponentError) -> ComponentFailure {
        ComponentFailure {
            component: component.to_string(),
            operation: Operation::Reconcile,
            error,
        }
    }

    fn target() -> ObjectReference {
        ObjectReference {
            name: Some("px-cluster".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_converged_status() {
        let status = status_from_report(&report(CycleOutcome::Converged, vec![]), Utc::now());
        assert_eq!(status.phase, ClusterPhase::Online);
        assert_eq!(status.reason.as_deref(), Some(status_reasons::CONVERGED));
        assert!(status.message.is_none());
        assert!(status.last_reconciled.is_some());
    }

    #[test]
    fn test_degraded_status_lists_advisories() {
        let report = report(
            CycleOutcome::Degraded,
            vec![failure("Stork", ComponentError::advisory("scheduler image pull failed"))],
        );
        let status = status_from_report(&report, Utc::now());
        assert_eq!(status.phase, ClusterPhase::Degraded);
        assert_eq!(status.advisories, vec!["Stork reconcile: scheduler image pull failed".to_string()]);
    }

    #[test]
    fn test_blocked_status_carries_blocking_error() {
        let blocked = CycleOutcome::Blocked(failure("Portworx CRDs", ComponentError::critical("timed out")));
        let status = status_from_report(&report(blocked, vec![]), Utc::now());
        assert_eq!(status.phase, ClusterPhase::Blocked);
        assert_eq!(status.reason.as_deref(), Some(status_reasons::COMPONENT_FAILED));
        assert_eq!(status.message.as_deref(), Some("Portworx CRDs reconcile: timed out"));
    }

    #[test]
    fn test_online_event_only_on_transition() {
        let sink = RecordingEventSink::new();
        let converged = report(CycleOutcome::Converged, vec![]);

        record_cycle_events(&sink, &target(), &converged, Some(ClusterPhase::Online));
        assert!(sink.events().is_empty());

        record_cycle_events(&sink, &target(), &converged, Some(ClusterPhase::Blocked));
        record_cycle_events(&sink, &target(), &converged, None);
        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.reason == reasons::CLUSTER_ONLINE && e.severity == EventSeverity::Normal));
    }

    #[test]
    fn test_warning_events_for_advisories_and_blocking() {
        let sink = RecordingEventSink::new();
        let blocked = report(
            CycleOutcome::Blocked(failure("Portworx CRDs", ComponentError::critical("names conflict"))),
            vec![failure("Telemetry", ComponentError::advisory("unreachable"))],
        );

        record_cycle_events(&sink, &target(), &blocked, Some(ClusterPhase::Online));

        let reasons_seen: Vec<String> = sink.events().into_iter().map(|e| e.reason).collect();
        assert_eq!(reasons_seen, vec![reasons::COMPONENT_DEGRADED, reasons::CYCLE_BLOCKED]);
        assert!(sink.events().iter().all(|e| e.severity == EventSeverity::Warning));
    }
}
