//! Reconciliation driver
//!
//! Runs one cycle over a [`ComponentRegistry`]: components are visited in
//! priority order, disabled ones are deleted, paused ones are skipped, and the
//! rest are reconciled. A critical failure stops the cycle; advisory failures
//! are collected and the cycle continues.

use crate::component::{Component, ComponentContext};
use crate::error::{ComponentError, Severity};
use crate::registry::ComponentRegistry;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

/// Which component operation failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Reconcile or install
    Reconcile,
    /// Remove because the component is disabled
    Delete,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::Reconcile => f.write_str("reconcile"),
            Operation::Delete => f.write_str("delete"),
        }
    }
}

/// A component failure captured during a cycle
#[derive(Debug)]
pub struct ComponentFailure {
    /// Registered component name
    pub component: String,
    /// Operation that failed
    pub operation: Operation,
    /// Failure with its severity
    pub error: ComponentError,
}

impl ComponentFailure {
    /// `"<component> <operation>: <error>"`, the form used in status and events
    pub fn summary(&self) -> String {
        format!("{} {}: {}", self.component, self.operation, self.error)
    }
}

/// What happened to one component in a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    /// Reconcile succeeded
    Reconciled,
    /// Reconcile failed with this severity
    ReconcileFailed(Severity),
    /// Disabled and removed
    Deleted,
    /// Disabled but removal failed; always advisory
    DeleteFailed,
    /// Enabled but the cluster is paused
    SkippedPaused,
    /// A critical failure earlier in the cycle stopped traversal
    NotReached,
}

/// Per-component entry in a [`CycleReport`], in traversal order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentStep {
    /// Registered component name
    pub component: String,
    /// What happened
    pub kind: StepKind,
}

/// Aggregate result of a cycle
#[derive(Debug)]
pub enum CycleOutcome {
    /// Every component succeeded
    Converged,
    /// Only advisory failures occurred
    Degraded,
    /// A critical failure aborted the cycle
    Blocked(ComponentFailure),
}

impl CycleOutcome {
    /// Lowercase label for logs
    pub fn as_str(&self) -> &'static str {
        match self {
            CycleOutcome::Converged => "converged",
            CycleOutcome::Degraded => "degraded",
            CycleOutcome::Blocked(_) => "blocked",
        }
    }
}

/// User-visible phase derived from a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    /// Every enabled component is in place
    Converged,
    /// Advisory failures only; retried on resync
    ConvergingWithIssues,
    /// A critical failure stops progress
    Blocked,
}

/// Everything observed in one cycle
#[derive(Debug)]
pub struct CycleReport {
    /// Correlates log lines of one cycle
    pub cycle_id: Uuid,
    /// Aggregate result
    pub outcome: CycleOutcome,
    /// Advisory failures in traversal order
    pub advisories: Vec<ComponentFailure>,
    /// One entry per registered component
    pub steps: Vec<ComponentStep>,
}

impl CycleReport {
    /// Phase reported in the cluster status
    pub fn phase(&self) -> CyclePhase {
        match self.outcome {
            CycleOutcome::Blocked(_) => CyclePhase::Blocked,
            CycleOutcome::Degraded => CyclePhase::ConvergingWithIssues,
            CycleOutcome::Converged => CyclePhase::Converged,
        }
    }

    /// The critical failure that stopped the cycle
    pub fn blocking(&self) -> Option<&ComponentFailure> {
        match &self.outcome {
            CycleOutcome::Blocked(failure) => Some(failure),
            _ => None,
        }
    }

    /// What happened to `component`, if it was visited
    pub fn step(&self, component: &str) -> Option<StepKind> {
        self.steps.iter().find(|s| s.component == component).map(|s| s.kind)
    }

    /// Names of components whose reconcile or delete was called, in order
    pub fn invoked(&self) -> Vec<&str> {
        self.steps
            .iter()
            .filter(|s| !matches!(s.kind, StepKind::SkippedPaused | StepKind::NotReached))
            .map(|s| s.component.as_str())
            .collect()
    }

    /// `Ok(advisories)` unless a critical failure blocked the cycle
    pub fn into_result(self) -> Result<Vec<ComponentFailure>, ComponentFailure> {
        match self.outcome {
            CycleOutcome::Blocked(failure) => Err(failure),
            _ => Ok(self.advisories),
        }
    }
}

/// Stateless cycle runner; one instance can be shared across cycles
#[derive(Debug, Default, Clone, Copy)]
pub struct ReconciliationDriver;

impl ReconciliationDriver {
    /// New driver
    pub fn new() -> Self {
        Self
    }

    /// Run one reconciliation cycle.
    ///
    /// Re-initializes the registry first when it was never initialized, or was
    /// initialized for a different platform version or event target. Never
    /// panics on component errors.
    pub async fn run_cycle<S: Sync>(
        &self,
        registry: &mut ComponentRegistry<S>,
        spec: &S,
        ctx: &ComponentContext,
    ) -> CycleReport {
        let cycle_id = Uuid::new_v4();
        let span = info_span!("cycle", %cycle_id, platform_version = %ctx.platform_version);
        Self::cycle(cycle_id, registry, spec, ctx).instrument(span).await
    }

    async fn cycle<S: Sync>(
        cycle_id: Uuid,
        registry: &mut ComponentRegistry<S>,
        spec: &S,
        ctx: &ComponentContext,
    ) -> CycleReport {
        if registry.needs_initialize(ctx) {
            info!(
                previous = ?registry.initialized_for().map(|v| v.to_string()),
                current = %ctx.platform_version,
                target = ctx.event_target.name.as_deref().unwrap_or_default(),
                "Initializing components for platform version and target"
            );
            registry.initialize(ctx);
        }

        let mut steps = Vec::with_capacity(registry.len());
        let mut advisories = Vec::new();
        let mut blocked = None;

        let mut components = registry.ordered_mut().into_iter();
        while let Some(component) = components.next() {
            let name = component.name().to_string();
            let kind = match Self::visit(component.as_mut(), spec).await {
                Visit::Reconciled => StepKind::Reconciled,
                Visit::Deleted => StepKind::Deleted,
                Visit::Paused => StepKind::SkippedPaused,
                Visit::DeleteFailed(err) => {
                    warn!(component = %name, error = %err, "Delete failed, continuing");
                    advisories.push(ComponentFailure {
                        component: name.clone(),
                        operation: Operation::Delete,
                        error: err.into_advisory(),
                    });
                    StepKind::DeleteFailed
                }
                Visit::ReconcileFailed(err) if err.is_critical() => {
                    error!(component = %name, error = %err, "Critical failure, aborting cycle");
                    blocked = Some(ComponentFailure {
                        component: name.clone(),
                        operation: Operation::Reconcile,
                        error: err,
                    });
                    steps.push(ComponentStep {
                        component: name,
                        kind: StepKind::ReconcileFailed(Severity::Critical),
                    });
                    break;
                }
                Visit::ReconcileFailed(err) => {
                    warn!(component = %name, error = %err, "Advisory failure, continuing");
                    advisories.push(ComponentFailure {
                        component: name.clone(),
                        operation: Operation::Reconcile,
                        error: err,
                    });
                    StepKind::ReconcileFailed(Severity::Advisory)
                }
            };
            steps.push(ComponentStep { component: name, kind });
        }
        for component in components {
            steps.push(ComponentStep {
                component: component.name().to_string(),
                kind: StepKind::NotReached,
            });
        }

        let outcome = match blocked {
            Some(failure) => CycleOutcome::Blocked(failure),
            None if advisories.is_empty() => CycleOutcome::Converged,
            None => CycleOutcome::Degraded,
        };
        info!(
            outcome = outcome.as_str(),
            advisories = advisories.len(),
            visited = steps.len(),
            "Cycle finished"
        );

        CycleReport {
            cycle_id,
            outcome,
            advisories,
            steps,
        }
    }

    async fn visit<S: Sync>(component: &mut dyn Component<S>, spec: &S) -> Visit {
        if !component.is_enabled(spec) {
            debug!(component = component.name(), "Disabled, deleting");
            return match component.delete(spec).await {
                Ok(()) => {
                    component.mark_deleted();
                    Visit::Deleted
                }
                Err(err) => Visit::DeleteFailed(err),
            };
        }
        if component.is_paused_for_migration(spec) {
            debug!(component = component.name(), "Paused for migration, skipping");
            return Visit::Paused;
        }
        debug!(component = component.name(), setup_policy = ?component.setup_policy(), "Reconciling");
        match component.reconcile(spec).await {
            Ok(()) => Visit::Reconciled,
            Err(err) => Visit::ReconcileFailed(err),
        }
    }
}

enum Visit {
    Reconciled,
    Deleted,
    Paused,
    DeleteFailed(ComponentError),
    ReconcileFailed(ComponentError),
}
