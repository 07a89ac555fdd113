//! Portworx CRDs component
//!
//! Installs the `VolumePlacementStrategy` definition used by the storage
//! driver's placement engine. Platforms before 1.16 only serve the
//! `apiextensions.k8s.io/v1beta1` definition API.

use crds::StorageCluster;
use crds::predicates::is_portworx_enabled;
use platform_client::EventSeverity;
use platform_client::events::reasons;
use reconcile_core::{
    AdapterError, Component, ComponentContext, ComponentError, ConvergenceWaiter, CrdApi, CrdDescriptor, CrdScope,
    CrdVersion, DEFAULT_COMPONENT_PRIORITY, PlatformVersion, SchemaVariant, SetupGuard, SetupPolicy,
    VersionedResource,
};
use tracing::{debug, info};

/// Registration name of the component
pub const PORTWORX_CRD_COMPONENT_NAME: &str = "Portworx CRDs";

const VPS_GROUP: &str = "portworx.io";
const VPS_PLURAL: &str = "volumeplacementstrategies";
const VPS_SINGULAR: &str = "volumeplacementstrategy";
const VPS_KIND: &str = "VolumePlacementStrategy";

/// First platform version serving `apiextensions.k8s.io/v1`
pub const CRD_V1_MIN_VERSION: PlatformVersion = PlatformVersion::new(1, 16, 0);

fn vps_descriptor(api: CrdApi) -> CrdDescriptor {
    CrdDescriptor {
        api,
        group: VPS_GROUP.to_string(),
        kind: VPS_KIND.to_string(),
        singular: VPS_SINGULAR.to_string(),
        plural: VPS_PLURAL.to_string(),
        short_names: vec!["vps".to_string(), "vp".to_string()],
        scope: CrdScope::Cluster,
        versions: vec![
            CrdVersion::new("v1beta2", true, true),
            CrdVersion::new("v1beta1", false, false),
        ],
    }
}

/// The `volumeplacementstrategies.portworx.io` definition in both API flavours
pub fn volume_placement_strategy() -> Result<VersionedResource, AdapterError> {
    VersionedResource::new(vec![
        SchemaVariant::new(PlatformVersion::ZERO, vps_descriptor(CrdApi::V1beta1)),
        SchemaVariant::new(CRD_V1_MIN_VERSION, vps_descriptor(CrdApi::V1)),
    ])
}

/// Installs the storage driver's custom resource definitions.
///
/// Deleting the component only forgets that the definitions were installed;
/// the definitions themselves stay so existing objects survive a disable.
pub struct PortworxCrdComponent {
    vps: VersionedResource,
    waiter: ConvergenceWaiter,
    setup: SetupGuard,
    ctx: Option<ComponentContext>,
}

impl std::fmt::Debug for PortworxCrdComponent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortworxCrdComponent")
            .field("setup", &self.setup)
            .field("platform_version", &self.ctx.as_ref().map(|c| c.platform_version))
            .finish_non_exhaustive()
    }
}

impl PortworxCrdComponent {
    /// Fails only if the built-in schema variants are inconsistent
    pub fn new(waiter: ConvergenceWaiter, policy: SetupPolicy) -> Result<Self, AdapterError> {
        Ok(Self {
            vps: volume_placement_strategy()?,
            waiter,
            setup: SetupGuard::new(policy),
            ctx: None,
        })
    }

    /// Whether the definitions are considered installed
    pub fn is_installed(&self) -> bool {
        self.setup.is_done()
    }
}

#[async_trait::async_trait]
impl Component<StorageCluster> for PortworxCrdComponent {
    fn name(&self) -> &str {
        PORTWORX_CRD_COMPONENT_NAME
    }

    fn priority(&self) -> i32 {
        DEFAULT_COMPONENT_PRIORITY
    }

    fn initialize(&mut self, ctx: &ComponentContext) {
        self.ctx = Some(ctx.clone());
    }

    fn is_enabled(&self, cluster: &StorageCluster) -> bool {
        is_portworx_enabled(cluster)
    }

    async fn reconcile(&mut self, _cluster: &StorageCluster) -> Result<(), ComponentError> {
        if !self.setup.needs_setup() {
            return Ok(());
        }
        let ctx = self
            .ctx
            .as_ref()
            .ok_or_else(|| ComponentError::critical("component used before initialization"))?;

        debug!(crd = %self.vps.name(), "Ensuring VolumePlacementStrategy CRD");
        let variant = self
            .vps
            .ensure(ctx.client.as_ref(), ctx.platform_version, &self.waiter)
            .await
            .map_err(ComponentError::critical)?;

        if !self.setup.is_done() {
            info!(crd = %self.vps.name(), api = variant.descriptor.api.version(), "VolumePlacementStrategy CRD ready");
            ctx.record(
                EventSeverity::Normal,
                reasons::COMPONENT_READY,
                &format!("{} installed", self.vps.name()),
            );
        }
        self.setup.mark_done();
        Ok(())
    }

    async fn delete(&mut self, _cluster: &StorageCluster) -> Result<(), ComponentError> {
        self.mark_deleted();
        Ok(())
    }

    fn mark_deleted(&mut self) {
        self.setup.reset();
    }

    fn setup_policy(&self) -> SetupPolicy {
        self.setup.policy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crds::StorageClusterSpec;
    use crds::predicates::ANNOTATION_DISABLE_STORAGE;
    use k8s_openapi::api::core::v1::ObjectReference;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use platform_client::{MockOp, MockPlatformClient, PlatformError, RecordingEventSink};
    use reconcile_core::{ComponentRegistry, CycleOutcome, ReconciliationDriver, Severity, StepKind};
    use std::sync::Arc;
    use std::time::Duration;

    const CRD_NAME: &str = "volumeplacementstrategies.portworx.io";

    fn cluster(annotations: &[(&str, &str)]) -> StorageCluster {
        StorageCluster {
            metadata: ObjectMeta {
                name: Some("px-cluster".to_string()),
                namespace: Some("kube-system".to_string()),
                annotations: Some(
                    annotations
                        .iter()
                        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                        .collect(),
                ),
                ..Default::default()
            },
            spec: StorageClusterSpec::default(),
            status: None,
        }
    }

    fn component(policy: SetupPolicy) -> PortworxCrdComponent {
        let waiter = ConvergenceWaiter::new(Duration::from_secs(60), Duration::from_secs(5)).unwrap();
        PortworxCrdComponent::new(waiter, policy).unwrap()
    }

    fn context(mock: &MockPlatformClient, version: PlatformVersion, sink: &Arc<RecordingEventSink>) -> ComponentContext {
        ComponentContext::new(
            Arc::new(mock.clone()),
            version,
            Arc::clone(sink) as Arc<dyn platform_client::EventSink>,
            ObjectReference {
                name: Some("px-cluster".to_string()),
                ..Default::default()
            },
        )
    }

    fn initialized(version: PlatformVersion) -> (PortworxCrdComponent, MockPlatformClient, Arc<RecordingEventSink>) {
        let mock = MockPlatformClient::new(version);
        mock.activate_crds_when_created();
        let sink = Arc::new(RecordingEventSink::new());
        let mut component = component(SetupPolicy::TrustCached);
        component.initialize(&context(&mock, version, &sink));
        (component, mock, sink)
    }

    #[test]
    fn test_definition_shape() {
        let vps = volume_placement_strategy().unwrap();
        assert_eq!(vps.name(), CRD_NAME);
        let current = vps.select(CRD_V1_MIN_VERSION).unwrap();
        assert_eq!(current.descriptor.scope, CrdScope::Cluster);
        assert_eq!(current.descriptor.short_names, vec!["vps", "vp"]);
        assert_eq!(current.descriptor.storage_version().map(|v| v.name.as_str()), Some("v1beta2"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_legacy_definition_below_threshold() {
        let (mut component, mock, _) = initialized(PlatformVersion::new(1, 15, 3));

        component.reconcile(&cluster(&[])).await.unwrap();

        let submissions = mock.submissions();
        assert_eq!(submissions.len(), 1);
        assert_eq!(submissions[0].0, "apiextensions.k8s.io/v1beta1");
        assert_eq!(submissions[0].1.metadata.name.as_deref(), Some(CRD_NAME));
        assert!(submissions[0].1.data["spec"]["versions"][0].get("schema").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_current_definition_at_threshold() {
        let (mut component, mock, _) = initialized(CRD_V1_MIN_VERSION);

        component.reconcile(&cluster(&[])).await.unwrap();

        let submissions = mock.submissions();
        assert_eq!(submissions.len(), 1);
        assert_eq!(submissions[0].0, "apiextensions.k8s.io/v1");
        let versions = &submissions[0].1.data["spec"]["versions"];
        assert_eq!(versions[0]["name"], "v1beta2");
        assert_eq!(versions[1]["served"], false);
    }

    #[tokio::test(start_paused = true)]
    async fn test_existing_definition_counts_as_installed() {
        let (mut component, mock, _) = initialized(PlatformVersion::new(1, 30, 0));
        let mut existing = vps_descriptor(CrdApi::V1).manifest();
        existing.data["status"] = serde_json::json!({"conditions": [{"type": "Established", "status": "True"}]});
        mock.insert(&CrdApi::V1.api_resource(), existing);

        component.reconcile(&cluster(&[])).await.unwrap();

        assert!(component.is_installed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_installs_once_until_reset() {
        let (mut component, mock, sink) = initialized(PlatformVersion::new(1, 30, 0));

        component.reconcile(&cluster(&[])).await.unwrap();
        component.reconcile(&cluster(&[])).await.unwrap();
        assert_eq!(mock.submissions().len(), 1);
        assert_eq!(sink.events().len(), 1);
        assert_eq!(sink.events()[0].reason, reasons::COMPONENT_READY);

        component.delete(&cluster(&[])).await.unwrap();
        assert!(!component.is_installed());
        // delete leaves the definition in place
        assert!(mock.object(&CrdApi::V1.api_resource(), None, CRD_NAME).is_some());

        component.reconcile(&cluster(&[])).await.unwrap();
        assert_eq!(mock.submissions().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_revalidate_resubmits_every_cycle() {
        let version = PlatformVersion::new(1, 30, 0);
        let mock = MockPlatformClient::new(version);
        mock.activate_crds_when_created();
        let sink = Arc::new(RecordingEventSink::new());
        let mut component = component(SetupPolicy::Revalidate);
        component.initialize(&context(&mock, version, &sink));

        component.reconcile(&cluster(&[])).await.unwrap();
        mock.remove(&CrdApi::V1.api_resource(), None, CRD_NAME);
        component.reconcile(&cluster(&[])).await.unwrap();

        assert_eq!(mock.submissions().len(), 2);
        assert!(mock.object(&CrdApi::V1.api_resource(), None, CRD_NAME).is_some());
        // the ready event is only recorded the first time
        assert_eq!(sink.events().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_failure_is_critical() {
        let (mut component, mock, _) = initialized(PlatformVersion::new(1, 30, 0));
        mock.fail_next(MockOp::Create, PlatformError::InvalidObject("rejected".to_string()));

        let err = component.reconcile(&cluster(&[])).await.unwrap_err();

        assert_eq!(err.severity(), Severity::Critical);
        assert!(!component.is_installed());
    }

    #[tokio::test]
    async fn test_uninitialized_reconcile_is_critical() {
        let mut component = component(SetupPolicy::TrustCached);
        let err = component.reconcile(&cluster(&[])).await.unwrap_err();
        assert!(err.is_critical());
    }

    #[test]
    fn test_enabled_follows_storage_annotation() {
        let component = component(SetupPolicy::TrustCached);
        assert!(component.is_enabled(&cluster(&[])));
        assert!(!component.is_enabled(&cluster(&[(ANNOTATION_DISABLE_STORAGE, "true")])));
        assert!(!component.is_paused_for_migration(&cluster(&[])));
    }

    #[tokio::test(start_paused = true)]
    async fn test_driver_deletes_when_storage_disabled() {
        let version = PlatformVersion::new(1, 30, 0);
        let mock = MockPlatformClient::new(version);
        mock.activate_crds_when_created();
        let sink = Arc::new(RecordingEventSink::new());
        let ctx = context(&mock, version, &sink);
        let mut registry: ComponentRegistry<StorageCluster> = ComponentRegistry::new();
        registry
            .register(PORTWORX_CRD_COMPONENT_NAME, Box::new(component(SetupPolicy::TrustCached)))
            .unwrap();
        let driver = ReconciliationDriver::new();

        let report = driver.run_cycle(&mut registry, &cluster(&[]), &ctx).await;
        assert!(matches!(report.outcome, CycleOutcome::Converged));
        assert_eq!(report.step(PORTWORX_CRD_COMPONENT_NAME), Some(StepKind::Reconciled));

        let disabled = cluster(&[(ANNOTATION_DISABLE_STORAGE, "true")]);
        let report = driver.run_cycle(&mut registry, &disabled, &ctx).await;
        assert_eq!(report.step(PORTWORX_CRD_COMPONENT_NAME), Some(StepKind::Deleted));

        driver.run_cycle(&mut registry, &cluster(&[]), &ctx).await;
        assert_eq!(mock.submissions().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_follow_the_cycle_cluster() {
        use kube::Resource;

        let version = PlatformVersion::new(1, 30, 0);
        let mock = MockPlatformClient::new(version);
        mock.activate_crds_when_created();
        let sink = Arc::new(RecordingEventSink::new());
        let named = |name: &str, annotations: &[(&str, &str)]| {
            let mut c = cluster(annotations);
            c.metadata.name = Some(name.to_string());
            c.metadata.uid = Some(format!("{name}-uid"));
            c
        };
        let ctx_for = |c: &StorageCluster| {
            ComponentContext::new(
                Arc::new(mock.clone()),
                version,
                Arc::clone(&sink) as Arc<dyn platform_client::EventSink>,
                c.object_ref(&()),
            )
        };
        let mut registry: ComponentRegistry<StorageCluster> = ComponentRegistry::new();
        registry
            .register(PORTWORX_CRD_COMPONENT_NAME, Box::new(component(SetupPolicy::TrustCached)))
            .unwrap();
        let driver = ReconciliationDriver::new();

        let first = named("cluster-a", &[(ANNOTATION_DISABLE_STORAGE, "true")]);
        driver.run_cycle(&mut registry, &first, &ctx_for(&first)).await;
        let second = named("cluster-b", &[]);
        driver.run_cycle(&mut registry, &second, &ctx_for(&second)).await;

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].reason, reasons::COMPONENT_READY);
        assert_eq!(events[0].target.as_deref(), Some("cluster-b"));
    }
}
