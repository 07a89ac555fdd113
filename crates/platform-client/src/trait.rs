//! PlatformClient trait for mocking
//!
//! This trait abstracts the orchestration platform API so components can be
//! unit tested without a cluster. The kube-rs backed client implements it, and
//! tests use the in-memory mock behind the `test-util` feature.

use crate::error::PlatformError;
use crate::version::PlatformVersion;
use kube::core::{ApiResource, DynamicObject};

/// Trait for platform API operations
///
/// Objects are addressed by their [`ApiResource`] (group, version, kind, plural)
/// plus namespace and name, and carried as untyped [`DynamicObject`]s so one
/// client serves every resource kind, including API versions the typed
/// bindings no longer ship.
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait PlatformClient: Send + Sync {
    /// Report the control-plane version
    async fn server_version(&self) -> Result<PlatformVersion, PlatformError>;

    /// Create an object. Fails with [`PlatformError::AlreadyExists`] if present.
    async fn create(&self, resource: &ApiResource, object: &DynamicObject) -> Result<DynamicObject, PlatformError>;

    /// Fetch an object. Fails with [`PlatformError::NotFound`] if absent.
    async fn get(&self, resource: &ApiResource, namespace: Option<&str>, name: &str) -> Result<DynamicObject, PlatformError>;

    /// Replace an existing object
    async fn update(&self, resource: &ApiResource, object: &DynamicObject) -> Result<DynamicObject, PlatformError>;

    /// Delete an object. Fails with [`PlatformError::NotFound`] if absent.
    async fn delete(&self, resource: &ApiResource, namespace: Option<&str>, name: &str) -> Result<(), PlatformError>;

    /// List objects, optionally filtered by a label selector (`app=px,tier!=db`)
    async fn list(&self, resource: &ApiResource, namespace: Option<&str>, label_selector: Option<&str>) -> Result<Vec<DynamicObject>, PlatformError>;

    /// List objects carrying an owner reference to `owner_uid`
    async fn list_owned(&self, resource: &ApiResource, namespace: Option<&str>, owner_uid: &str) -> Result<Vec<DynamicObject>, PlatformError> {
        let objects = self.list(resource, namespace, None).await?;
        Ok(objects
            .into_iter()
            .filter(|o| {
                o.metadata
                    .owner_references
                    .as_ref()
                    .is_some_and(|refs| refs.iter().any(|r| r.uid == owner_uid))
            })
            .collect())
    }
}
