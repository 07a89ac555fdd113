//! In-memory PlatformClient for unit testing
//!
//! Stores objects in memory keyed by group, plural, namespace and name, and can
//! be configured to fail specific calls or to mutate objects as they are
//! created (for example to mark a CRD as established the way the API server
//! eventually would).

use crate::client::describe;
use crate::error::PlatformError;
use crate::events::{EventSeverity, EventSink};
use crate::platform_trait::PlatformClient;
use crate::version::PlatformVersion;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::core::{ApiResource, DynamicObject};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

type ObjectKey = (String, String, Option<String>, String);
type CreateHook = Arc<dyn Fn(&ApiResource, &mut DynamicObject) + Send + Sync>;

/// Calls whose failure can be scripted with [`MockPlatformClient::fail_next`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOp {
    /// [`PlatformClient::server_version`](crate::PlatformClient::server_version)
    ServerVersion,
    /// `create`
    Create,
    /// `get`
    Get,
    /// `update`
    Update,
    /// `delete`
    Delete,
    /// `list` and `list_owned`
    List,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn key(resource: &ApiResource, namespace: Option<&str>, name: &str) -> ObjectKey {
    (
        resource.group.clone(),
        resource.plural.clone(),
        namespace.map(str::to_string),
        name.to_string(),
    )
}

/// Mock PlatformClient for testing
#[derive(Clone)]
pub struct MockPlatformClient {
    version: Arc<Mutex<PlatformVersion>>,
    objects: Arc<Mutex<HashMap<ObjectKey, DynamicObject>>>,
    // (api_version, object) in submission order, including rejected duplicates
    submissions: Arc<Mutex<Vec<(String, DynamicObject)>>>,
    failures: Arc<Mutex<HashMap<MockOp, VecDeque<PlatformError>>>>,
    create_hook: Arc<Mutex<Option<CreateHook>>>,
    get_calls: Arc<AtomicUsize>,
    next_uid: Arc<AtomicU64>,
}

impl std::fmt::Debug for MockPlatformClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockPlatformClient")
            .field("version", &*lock(&self.version))
            .field("objects", &lock(&self.objects).len())
            .finish_non_exhaustive()
    }
}

impl MockPlatformClient {
    /// Create a new mock reporting the given server version
    pub fn new(version: PlatformVersion) -> Self {
        Self {
            version: Arc::new(Mutex::new(version)),
            objects: Arc::new(Mutex::new(HashMap::new())),
            submissions: Arc::new(Mutex::new(Vec::new())),
            failures: Arc::new(Mutex::new(HashMap::new())),
            create_hook: Arc::new(Mutex::new(None)),
            get_calls: Arc::new(AtomicUsize::new(0)),
            next_uid: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Change the reported server version
    pub fn set_version(&self, version: PlatformVersion) {
        *lock(&self.version) = version;
    }

    /// Queue an error to be returned by the next call of `op`
    pub fn fail_next(&self, op: MockOp, error: PlatformError) {
        lock(&self.failures).entry(op).or_default().push_back(error);
    }

    /// Run `hook` on every object as it is stored by `create`
    pub fn on_create(&self, hook: impl Fn(&ApiResource, &mut DynamicObject) + Send + Sync + 'static) {
        *lock(&self.create_hook) = Some(Arc::new(hook));
    }

    /// Mark every created CustomResourceDefinition as `Established=True`
    /// and `NamesAccepted=True`
    pub fn activate_crds_when_created(&self) {
        self.on_create(|resource, object| {
            if resource.kind == "CustomResourceDefinition" {
                object.data["status"] = serde_json::json!({
                    "conditions": [
                        {"type": "NamesAccepted", "status": "True"},
                        {"type": "Established", "status": "True"},
                    ]
                });
            }
        });
    }

    /// Store an object directly, bypassing hooks and failure injection
    pub fn insert(&self, resource: &ApiResource, object: DynamicObject) {
        let name = object.metadata.name.clone().unwrap_or_default();
        let k = key(resource, object.metadata.namespace.as_deref(), &name);
        lock(&self.objects).insert(k, object);
    }

    /// Merge `status` into a stored object's `.status`
    pub fn set_status(&self, resource: &ApiResource, namespace: Option<&str>, name: &str, status: serde_json::Value) {
        if let Some(object) = lock(&self.objects).get_mut(&key(resource, namespace, name)) {
            object.data["status"] = status;
        }
    }

    /// Remove an object out-of-band, as another actor would
    pub fn remove(&self, resource: &ApiResource, namespace: Option<&str>, name: &str) -> Option<DynamicObject> {
        lock(&self.objects).remove(&key(resource, namespace, name))
    }

    /// Look up a stored object
    pub fn object(&self, resource: &ApiResource, namespace: Option<&str>, name: &str) -> Option<DynamicObject> {
        lock(&self.objects).get(&key(resource, namespace, name)).cloned()
    }

    /// Every object passed to `create`, with the API version it was submitted under
    pub fn submissions(&self) -> Vec<(String, DynamicObject)> {
        lock(&self.submissions).clone()
    }

    /// Number of `get` calls served so far
    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    fn take_failure(&self, op: MockOp) -> Option<PlatformError> {
        lock(&self.failures).get_mut(&op).and_then(VecDeque::pop_front)
    }
}

/// Equality-only selector matching (`a=b,c=d`)
fn matches_selector(object: &DynamicObject, selector: &str) -> bool {
    let empty = BTreeMap::new();
    let labels = object.metadata.labels.as_ref().unwrap_or(&empty);
    selector
        .split(',')
        .map(str::trim)
        .filter(|term| !term.is_empty())
        .all(|term| match term.split_once('=') {
            Some((k, v)) => labels.get(k.trim()).is_some_and(|actual| actual == v.trim()),
            None => labels.contains_key(term),
        })
}

#[async_trait::async_trait]
impl PlatformClient for MockPlatformClient {
    async fn server_version(&self) -> Result<PlatformVersion, PlatformError> {
        if let Some(err) = self.take_failure(MockOp::ServerVersion) {
            return Err(err);
        }
        Ok(*lock(&self.version))
    }

    async fn create(&self, resource: &ApiResource, object: &DynamicObject) -> Result<DynamicObject, PlatformError> {
        lock(&self.submissions).push((resource.api_version.clone(), object.clone()));
        if let Some(err) = self.take_failure(MockOp::Create) {
            return Err(err);
        }
        let name = object
            .metadata
            .name
            .clone()
            .ok_or_else(|| PlatformError::InvalidObject("object is missing metadata.name".to_string()))?;
        let namespace = object.metadata.namespace.as_deref();
        let k = key(resource, namespace, &name);

        let mut objects = lock(&self.objects);
        if objects.contains_key(&k) {
            return Err(PlatformError::AlreadyExists(describe(resource, namespace, &name)));
        }
        let mut stored = object.clone();
        let uid = self.next_uid.fetch_add(1, Ordering::SeqCst);
        stored.metadata.uid = Some(format!("mock-uid-{uid}"));
        stored.metadata.resource_version = Some("1".to_string());
        let hook = lock(&self.create_hook).clone();
        if let Some(hook) = hook {
            hook(resource, &mut stored);
        }
        objects.insert(k, stored.clone());
        Ok(stored)
    }

    async fn get(&self, resource: &ApiResource, namespace: Option<&str>, name: &str) -> Result<DynamicObject, PlatformError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.take_failure(MockOp::Get) {
            return Err(err);
        }
        lock(&self.objects)
            .get(&key(resource, namespace, name))
            .cloned()
            .ok_or_else(|| PlatformError::NotFound(describe(resource, namespace, name)))
    }

    async fn update(&self, resource: &ApiResource, object: &DynamicObject) -> Result<DynamicObject, PlatformError> {
        if let Some(err) = self.take_failure(MockOp::Update) {
            return Err(err);
        }
        let name = object.metadata.name.clone().unwrap_or_default();
        let namespace = object.metadata.namespace.as_deref();
        let mut objects = lock(&self.objects);
        match objects.get_mut(&key(resource, namespace, &name)) {
            Some(existing) => {
                *existing = object.clone();
                Ok(existing.clone())
            }
            None => Err(PlatformError::NotFound(describe(resource, namespace, &name))),
        }
    }

    async fn delete(&self, resource: &ApiResource, namespace: Option<&str>, name: &str) -> Result<(), PlatformError> {
        if let Some(err) = self.take_failure(MockOp::Delete) {
            return Err(err);
        }
        lock(&self.objects)
            .remove(&key(resource, namespace, name))
            .map(|_| ())
            .ok_or_else(|| PlatformError::NotFound(describe(resource, namespace, name)))
    }

    async fn list(&self, resource: &ApiResource, namespace: Option<&str>, label_selector: Option<&str>) -> Result<Vec<DynamicObject>, PlatformError> {
        if let Some(err) = self.take_failure(MockOp::List) {
            return Err(err);
        }
        let objects = lock(&self.objects);
        let mut found: Vec<DynamicObject> = objects
            .iter()
            .filter(|((group, plural, ns, _), _)| {
                *group == resource.group
                    && *plural == resource.plural
                    && (namespace.is_none() || ns.as_deref() == namespace)
            })
            .map(|(_, o)| o.clone())
            .filter(|o| label_selector.is_none_or(|s| matches_selector(o, s)))
            .collect();
        found.sort_by(|a, b| a.metadata.name.cmp(&b.metadata.name));
        Ok(found)
    }
}

/// An event captured by [`RecordingEventSink`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedEvent {
    /// Name of the object the event was recorded against
    pub target: Option<String>,
    /// Normal or warning
    pub severity: EventSeverity,
    /// Machine-readable reason
    pub reason: String,
    /// Human-readable message
    pub message: String,
}

/// Event sink that keeps every event in memory
#[derive(Debug, Default, Clone)]
pub struct RecordingEventSink {
    events: Arc<Mutex<Vec<RecordedEvent>>>,
}

impl RecordingEventSink {
    /// New driver
    pub fn new() -> Self {
        Self::default()
    }

    /// Events recorded so far, oldest first
    pub fn events(&self) -> Vec<RecordedEvent> {
        lock(&self.events).clone()
    }
}

impl EventSink for RecordingEventSink {
    fn record(&self, target: &ObjectReference, severity: EventSeverity, reason: &str, message: &str) {
        lock(&self.events).push(RecordedEvent {
            target: target.name.clone(),
            severity,
            reason: reason.to_string(),
            message: message.to_string(),
        });
    }
}
