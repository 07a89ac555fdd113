//! kube-rs backed platform client

use crate::error::PlatformError;
use crate::platform_trait::PlatformClient;
use crate::version::PlatformVersion;
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::core::{ApiResource, DynamicObject};
use kube::Client;
use tracing::debug;

/// Platform client talking to a real Kubernetes API server
#[derive(Clone)]
pub struct KubePlatformClient {
    client: Client,
}

impl std::fmt::Debug for KubePlatformClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubePlatformClient").finish_non_exhaustive()
    }
}

impl KubePlatformClient {
    /// Wrap an existing kube client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a client from the in-cluster service account or local kubeconfig
    pub async fn try_default() -> Result<Self, PlatformError> {
        let client = Client::try_default().await?;
        Ok(Self::new(client))
    }

    /// The underlying kube client, for typed APIs outside this trait
    pub fn kube_client(&self) -> &Client {
        &self.client
    }

    fn api(&self, resource: &ApiResource, namespace: Option<&str>) -> Api<DynamicObject> {
        match namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, resource),
            None => Api::all_with(self.client.clone(), resource),
        }
    }
}

/// `plural.group/namespace/name`, as used in error messages and logs
pub(crate) fn describe(resource: &ApiResource, namespace: Option<&str>, name: &str) -> String {
    let kind = if resource.group.is_empty() {
        resource.plural.clone()
    } else {
        format!("{}.{}", resource.plural, resource.group)
    };
    match namespace {
        Some(ns) => format!("{kind}/{ns}/{name}"),
        None => format!("{kind}/{name}"),
    }
}

fn object_name(object: &DynamicObject) -> Result<&str, PlatformError> {
    object
        .metadata
        .name
        .as_deref()
        .ok_or_else(|| PlatformError::InvalidObject("object is missing metadata.name".to_string()))
}

#[async_trait::async_trait]
impl PlatformClient for KubePlatformClient {
    async fn server_version(&self) -> Result<PlatformVersion, PlatformError> {
        let info = self.client.apiserver_version().await?;
        let version = PlatformVersion::try_from(&info)?;
        debug!("API server reports {} (parsed as {})", info.git_version, version);
        Ok(version)
    }

    async fn create(&self, resource: &ApiResource, object: &DynamicObject) -> Result<DynamicObject, PlatformError> {
        let name = object_name(object)?;
        let namespace = object.metadata.namespace.as_deref();
        let what = describe(resource, namespace, name);
        debug!("POST {}", what);
        self.api(resource, namespace)
            .create(&PostParams::default(), object)
            .await
            .map_err(|e| PlatformError::from_kube(e, &what))
    }

    async fn get(&self, resource: &ApiResource, namespace: Option<&str>, name: &str) -> Result<DynamicObject, PlatformError> {
        let what = describe(resource, namespace, name);
        debug!("GET {}", what);
        self.api(resource, namespace)
            .get(name)
            .await
            .map_err(|e| PlatformError::from_kube(e, &what))
    }

    async fn update(&self, resource: &ApiResource, object: &DynamicObject) -> Result<DynamicObject, PlatformError> {
        let name = object_name(object)?;
        let namespace = object.metadata.namespace.as_deref();
        let what = describe(resource, namespace, name);
        debug!("PUT {}", what);
        self.api(resource, namespace)
            .replace(name, &PostParams::default(), object)
            .await
            .map_err(|e| PlatformError::from_kube(e, &what))
    }

    async fn delete(&self, resource: &ApiResource, namespace: Option<&str>, name: &str) -> Result<(), PlatformError> {
        let what = describe(resource, namespace, name);
        debug!("DELETE {}", what);
        self.api(resource, namespace)
            .delete(name, &DeleteParams::default())
            .await
            .map(|_| ())
            .map_err(|e| PlatformError::from_kube(e, &what))
    }

    async fn list(&self, resource: &ApiResource, namespace: Option<&str>, label_selector: Option<&str>) -> Result<Vec<DynamicObject>, PlatformError> {
        let mut params = ListParams::default();
        if let Some(selector) = label_selector {
            params = params.labels(selector);
        }
        let what = describe(resource, namespace, "*");
        debug!("LIST {}", what);
        let list = self
            .api(resource, namespace)
            .list(&params)
            .await
            .map_err(|e| PlatformError::from_kube(e, &what))?;
        Ok(list.items)
    }
}
