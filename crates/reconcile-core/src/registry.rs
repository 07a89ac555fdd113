//! Ordered registry of named components

use crate::component::{Component, ComponentContext};
use crate::error::RegistryError;
use k8s_openapi::api::core::v1::ObjectReference;
use platform_client::PlatformVersion;
use tracing::{debug, info};

struct Entry<S: Sync> {
    name: String,
    sequence: usize,
    component: Box<dyn Component<S>>,
}

/// Named collection of components, traversed in `(priority, registration order)`.
///
/// Built by the caller at startup; there is no process-wide instance. The
/// registry is not synchronized; callers serialize access (the operator holds
/// it behind an async mutex, which also keeps cycles single-flight).
pub struct ComponentRegistry<S: Sync> {
    entries: Vec<Entry<S>>,
    next_sequence: usize,
    initialized_for: Option<PlatformVersion>,
    initialized_target: Option<ObjectReference>,
}

impl<S: Sync> std::fmt::Debug for ComponentRegistry<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("components", &self.names())
            .field("initialized_for", &self.initialized_for)
            .finish()
    }
}

impl<S: Sync> Default for ComponentRegistry<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Sync> ComponentRegistry<S> {
    /// Empty, never initialized
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_sequence: 0,
            initialized_for: None,
            initialized_target: None,
        }
    }

    /// Add a component under `name`.
    ///
    /// Fails if the name is taken or differs from `component.name()`.
    pub fn register(&mut self, name: impl Into<String>, component: Box<dyn Component<S>>) -> Result<(), RegistryError> {
        let name = name.into();
        if component.name() != name {
            return Err(RegistryError::NameMismatch {
                registered: name,
                reported: component.name().to_string(),
            });
        }
        if self.entries.iter().any(|e| e.name == name) {
            return Err(RegistryError::Duplicate(name));
        }
        debug!(component = %name, priority = component.priority(), "Registered component");
        self.entries.push(Entry {
            name,
            sequence: self.next_sequence,
            component,
        });
        self.next_sequence += 1;
        Ok(())
    }

    /// Components in traversal order
    pub fn list(&self) -> Vec<&dyn Component<S>> {
        self.sorted_indices()
            .into_iter()
            .map(|i| self.entries[i].component.as_ref())
            .collect()
    }

    /// Component names in traversal order
    pub fn names(&self) -> Vec<&str> {
        self.sorted_indices()
            .into_iter()
            .map(|i| self.entries[i].name.as_str())
            .collect()
    }

    /// Component registered under `name`
    pub fn get(&self, name: &str) -> Option<&dyn Component<S>> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.component.as_ref())
    }

    /// Number of registered components
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is registered
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Initialize every component and remember the version and event
    /// target it was done for
    pub fn initialize(&mut self, ctx: &ComponentContext) {
        for entry in &mut self.entries {
            entry.component.initialize(ctx);
        }
        self.initialized_for = Some(ctx.platform_version);
        self.initialized_target = Some(ctx.event_target.clone());
        info!(
            components = self.entries.len(),
            platform_version = %ctx.platform_version,
            target = ctx.event_target.name.as_deref().unwrap_or_default(),
            "Initialized components"
        );
    }

    /// Whether components still hold a context other than `ctx`.
    ///
    /// A different platform version or a different event target object
    /// (by uid, namespace and name) both count.
    pub fn needs_initialize(&self, ctx: &ComponentContext) -> bool {
        if self.initialized_for != Some(ctx.platform_version) {
            return true;
        }
        match &self.initialized_target {
            Some(target) => !same_object(target, &ctx.event_target),
            None => true,
        }
    }

    /// Platform version of the last [`initialize`](Self::initialize), if any
    pub fn initialized_for(&self) -> Option<PlatformVersion> {
        self.initialized_for
    }

    /// Event target of the last [`initialize`](Self::initialize), if any
    pub fn initialized_target(&self) -> Option<&ObjectReference> {
        self.initialized_target.as_ref()
    }

    /// Mutable components in traversal order
    pub(crate) fn ordered_mut(&mut self) -> Vec<&mut Box<dyn Component<S>>> {
        let mut entries: Vec<&mut Entry<S>> = self.entries.iter_mut().collect();
        entries.sort_by_key(|e| (e.component.priority(), e.sequence));
        entries.into_iter().map(|e| &mut e.component).collect()
    }

    fn sorted_indices(&self) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..self.entries.len()).collect();
        indices.sort_by_key(|&i| (self.entries[i].component.priority(), self.entries[i].sequence));
        indices
    }
}

fn same_object(a: &ObjectReference, b: &ObjectReference) -> bool {
    a.uid == b.uid && a.namespace == b.namespace && a.name == b.name && a.kind == b.kind
}
