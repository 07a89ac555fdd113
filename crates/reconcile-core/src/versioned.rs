//! Version-selected resource definitions
//!
//! A [`VersionedResource`] carries the same custom resource definition in
//! several schema variants, each tagged with the minimum platform version that
//! accepts it. [`VersionedResource::ensure`] picks the variant for the running
//! platform, submits it (an existing definition counts as success) and blocks
//! until the platform reports it established.

use crate::convergence::{ConvergenceWaiter, ProbeOutcome};
use crate::error::{AdapterError, ConvergenceError};
use kube::core::{ApiResource, DynamicObject, GroupVersionKind};
use platform_client::{PlatformClient, PlatformVersion};
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, info};

/// How long to wait for a submitted definition to become established
pub const DEFAULT_ESTABLISH_TIMEOUT: Duration = Duration::from_secs(60);
/// How often to re-check a submitted definition
pub const DEFAULT_ESTABLISH_POLL_INTERVAL: Duration = Duration::from_secs(5);

const APIEXTENSIONS_GROUP: &str = "apiextensions.k8s.io";
const CRD_KIND: &str = "CustomResourceDefinition";
const CRD_PLURAL: &str = "customresourcedefinitions";

/// API flavour the definition is submitted under
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrdApi {
    /// `apiextensions.k8s.io/v1`
    V1,
    /// `apiextensions.k8s.io/v1beta1`, for platforms that predate v1
    V1beta1,
}

impl CrdApi {
    /// API version string
    pub fn version(self) -> &'static str {
        match self {
            CrdApi::V1 => "v1",
            CrdApi::V1beta1 => "v1beta1",
        }
    }

    /// Addressing for `customresourcedefinitions` under this flavour
    pub fn api_resource(self) -> ApiResource {
        ApiResource::from_gvk_with_plural(
            &GroupVersionKind::gvk(APIEXTENSIONS_GROUP, self.version(), CRD_KIND),
            CRD_PLURAL,
        )
    }
}

/// Scope of the custom resource's objects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrdScope {
    /// One object per name cluster-wide
    Cluster,
    /// Objects live in namespaces
    Namespaced,
}

impl CrdScope {
    /// Value of `spec.scope`
    pub fn as_str(self) -> &'static str {
        match self {
            CrdScope::Cluster => "Cluster",
            CrdScope::Namespaced => "Namespaced",
        }
    }
}

/// One served version of the custom resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrdVersion {
    /// e.g. `v1alpha1`
    pub name: String,
    /// Served by the API server
    pub served: bool,
    /// Exactly one version is the storage version
    pub storage: bool,
}

impl CrdVersion {
    /// Version `name` with its served and storage flags
    pub fn new(name: impl Into<String>, served: bool, storage: bool) -> Self {
        Self {
            name: name.into(),
            served,
            storage,
        }
    }
}

/// Everything needed to render one schema variant of a definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrdDescriptor {
    /// Definition API the variant is submitted through
    pub api: CrdApi,
    /// API group, e.g. `portworx.io`
    pub group: String,
    /// Object kind, e.g. `VolumePlacementStrategy`
    pub kind: String,
    /// Singular resource name
    pub singular: String,
    /// Plural resource name, the first label of the definition name
    pub plural: String,
    /// kubectl short names
    pub short_names: Vec<String>,
    /// Scope of the custom objects
    pub scope: CrdScope,
    /// Served versions
    pub versions: Vec<CrdVersion>,
}

impl CrdDescriptor {
    /// `<plural>.<group>`, the definition's object name
    pub fn name(&self) -> String {
        format!("{}.{}", self.plural, self.group)
    }

    /// The version that is both served and used for storage
    pub fn storage_version(&self) -> Option<&CrdVersion> {
        self.versions.iter().find(|v| v.storage)
    }

    fn validate(&self) -> Result<(), AdapterError> {
        let storage: Vec<&CrdVersion> = self.versions.iter().filter(|v| v.storage).collect();
        match storage.as_slice() {
            [only] if only.served => Ok(()),
            [only] => Err(AdapterError::InvalidVariants(format!(
                "{} ({}): storage version {} is not served",
                self.name(),
                self.api.version(),
                only.name
            ))),
            _ => Err(AdapterError::InvalidVariants(format!(
                "{} ({}): expected exactly one storage version, found {}",
                self.name(),
                self.api.version(),
                storage.len()
            ))),
        }
    }

    /// Render the definition as an object for the platform client
    pub fn manifest(&self) -> DynamicObject {
        let versions: Vec<Value> = self
            .versions
            .iter()
            .map(|v| match self.api {
                CrdApi::V1 => json!({
                    "name": v.name,
                    "served": v.served,
                    "storage": v.storage,
                    "schema": {
                        "openAPIV3Schema": {
                            "type": "object",
                            "x-kubernetes-preserve-unknown-fields": true,
                        }
                    },
                }),
                CrdApi::V1beta1 => json!({
                    "name": v.name,
                    "served": v.served,
                    "storage": v.storage,
                }),
            })
            .collect();

        let mut object = DynamicObject::new(&self.name(), &self.api.api_resource());
        object.data = json!({
            "spec": {
                "group": self.group,
                "scope": self.scope.as_str(),
                "names": {
                    "kind": self.kind,
                    "singular": self.singular,
                    "plural": self.plural,
                    "shortNames": self.short_names,
                },
                "versions": versions,
            }
        });
        object
    }
}

/// A descriptor plus the lowest platform version that accepts it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaVariant {
    /// Lowest platform version this variant applies to
    pub min_version: PlatformVersion,
    /// Definition submitted for this range
    pub descriptor: CrdDescriptor,
}

impl SchemaVariant {
    /// Pair a descriptor with its threshold
    pub fn new(min_version: PlatformVersion, descriptor: CrdDescriptor) -> Self {
        Self {
            min_version,
            descriptor,
        }
    }
}

/// One logical definition with its per-platform-version variants
#[derive(Debug, Clone)]
pub struct VersionedResource {
    // sorted by ascending threshold
    variants: Vec<SchemaVariant>,
}

impl VersionedResource {
    /// Fails on an empty list, duplicate thresholds, variants describing
    /// different resources, or a variant without exactly one served storage
    /// version.
    pub fn new(mut variants: Vec<SchemaVariant>) -> Result<Self, AdapterError> {
        let Some(first) = variants.first() else {
            return Err(AdapterError::InvalidVariants("no schema variants".to_string()));
        };
        let identity = (first.descriptor.group.clone(), first.descriptor.kind.clone(), first.descriptor.plural.clone());

        for variant in &variants {
            let d = &variant.descriptor;
            if (&d.group, &d.kind, &d.plural) != (&identity.0, &identity.1, &identity.2) {
                return Err(AdapterError::InvalidVariants(format!(
                    "variant for {} describes {}, expected {}.{}",
                    variant.min_version,
                    d.name(),
                    identity.2,
                    identity.0
                )));
            }
            d.validate()?;
        }

        variants.sort_by_key(|v| v.min_version);
        if let Some(pair) = variants.windows(2).find(|w| w[0].min_version == w[1].min_version) {
            return Err(AdapterError::InvalidVariants(format!(
                "two variants share threshold {}",
                pair[0].min_version
            )));
        }
        Ok(Self { variants })
    }

    /// `<plural>.<group>` shared by every variant
    pub fn name(&self) -> String {
        self.variants
            .first()
            .map(|v| v.descriptor.name())
            .unwrap_or_default()
    }

    /// Variants by ascending threshold
    pub fn variants(&self) -> &[SchemaVariant] {
        &self.variants
    }

    /// The variant with the highest threshold at or below `version`
    pub fn select(&self, version: PlatformVersion) -> Result<&SchemaVariant, AdapterError> {
        self.variants
            .iter()
            .rev()
            .find(|v| v.min_version <= version)
            .ok_or_else(|| AdapterError::NoVariant {
                resource: self.name(),
                version: version.to_string(),
            })
    }

    /// Install the variant for `version` and wait until it is established.
    ///
    /// Safe to call repeatedly: a definition that already exists is not an
    /// error, and an established one returns after a single check.
    pub async fn ensure(
        &self,
        client: &dyn PlatformClient,
        version: PlatformVersion,
        waiter: &ConvergenceWaiter,
    ) -> Result<&SchemaVariant, AdapterError> {
        let variant = self.select(version)?;
        let descriptor = &variant.descriptor;
        let resource = descriptor.api.api_resource();
        let name = descriptor.name();

        match client.create(&resource, &descriptor.manifest()).await {
            Ok(_) => info!(crd = %name, api = %resource.api_version, %version, "Created custom resource definition"),
            Err(e) if e.is_already_exists() => {
                debug!(crd = %name, api = %resource.api_version, "Custom resource definition already exists");
            }
            Err(source) => return Err(AdapterError::Submit { name, source }),
        }

        let operation = format!("{name} to be established");
        waiter
            .wait(&operation, || establish_probe(client, &resource, &name))
            .await
            .map_err(|err| match err {
                ConvergenceError::Probe { source, .. } => source,
                other => AdapterError::NotEstablished {
                    name: name.clone(),
                    source: Box::new(other),
                },
            })?;

        info!(crd = %name, "Custom resource definition established");
        Ok(variant)
    }
}

async fn establish_probe(client: &dyn PlatformClient, resource: &ApiResource, name: &str) -> ProbeOutcome<(), AdapterError> {
    let object = match client.get(resource, None, name).await {
        Ok(object) => object,
        Err(e) if e.is_not_found() => return ProbeOutcome::pending("definition not visible yet"),
        // lookup errors are retried until the deadline
        Err(e) => return ProbeOutcome::pending(format!("lookup failed: {e}")),
    };

    let conditions = object.data["status"]["conditions"]
        .as_array()
        .cloned()
        .unwrap_or_default();
    for condition in &conditions {
        let status = condition["status"].as_str().unwrap_or_default();
        match condition["type"].as_str() {
            Some("Established") if status == "True" => return ProbeOutcome::Ready(()),
            Some("NamesAccepted") if status == "False" => {
                return ProbeOutcome::Failed(AdapterError::NameConflict {
                    name: name.to_string(),
                    reason: condition["reason"].as_str().unwrap_or("NamesNotAccepted").to_string(),
                });
            }
            _ => {}
        }
    }
    ProbeOutcome::pending("not established yet")
}
