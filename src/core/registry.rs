//! Resource registry: known managed units, their state, and dependency edges.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a managed resource.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceState {
    /// Not yet observed.
    #[default]
    Unknown,
    /// Coming up.
    Starting,
    /// Serving.
    Running,
    /// Going down.
    Stopping,
    /// Down.
    Stopped,
    /// Failed; candidate for auto-recovery.
    Error,
}

impl ResourceState {
    /// Snake-case name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for ResourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static description supplied at registration time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSpec {
    /// Resource identifier.
    pub id: String,
    /// Exposed ports (containers) or device slots (GPUs).
    #[serde(default)]
    pub ports: Vec<u16>,
    /// Free-form capability tags.
    #[serde(default)]
    pub capabilities: BTreeSet<String>,
    /// Resources this one depends on.
    #[serde(default)]
    pub dependencies: BTreeSet<String>,
}

impl ResourceSpec {
    /// Spec with no ports, capabilities, or dependencies.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Add a dependency edge.
    #[must_use]
    pub fn depends_on(mut self, dependency: impl Into<String>) -> Self {
        self.dependencies.insert(dependency.into());
        self
    }

    /// Add a capability tag.
    #[must_use]
    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capabilities.insert(capability.into());
        self
    }

    /// Set the ports.
    #[must_use]
    pub fn with_ports(mut self, ports: impl IntoIterator<Item = u16>) -> Self {
        self.ports = ports.into_iter().collect();
        self
    }
}

/// A managed unit known to the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedResource {
    /// Resource identifier.
    pub id: String,
    /// Current lifecycle state.
    pub state: ResourceState,
    /// Free-form health tag.
    pub health: String,
    /// Exposed ports or device slots.
    pub ports: Vec<u16>,
    /// Capability tags.
    pub capabilities: BTreeSet<String>,
    /// Resources this one depends on.
    pub dependencies: BTreeSet<String>,
    /// Last state change, milliseconds since epoch.
    pub updated_at_ms: u128,
}

impl ManagedResource {
    fn from_spec(spec: ResourceSpec, now_ms: u128) -> Self {
        Self {
            id: spec.id,
            state: ResourceState::Unknown,
            health: "unknown".into(),
            ports: spec.ports,
            capabilities: spec.capabilities,
            dependencies: spec.dependencies,
            updated_at_ms: now_ms,
        }
    }
}

/// Registry of managed resources. Resources are never removed.
#[derive(Debug, Default)]
pub struct ResourceRegistry {
    resources: HashMap<String, ManagedResource>,
}

impl ResourceRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resource in state `unknown`. Returns `false` if the id is
    /// already present; the existing entry is left untouched.
    pub fn register(&mut self, spec: ResourceSpec, now_ms: u128) -> bool {
        if self.resources.contains_key(&spec.id) {
            tracing::warn!(resource = %spec.id, "resource already registered");
            return false;
        }
        tracing::info!(
            resource = %spec.id,
            dependencies = ?spec.dependencies,
            "registered resource"
        );
        self.resources
            .insert(spec.id.clone(), ManagedResource::from_spec(spec, now_ms));
        true
    }

    /// Register `id` with no metadata if it is unknown. Returns `true` when a
    /// new entry was created.
    pub fn ensure(&mut self, id: &str, now_ms: u128) -> bool {
        if self.resources.contains_key(id) {
            return false;
        }
        tracing::debug!(resource = %id, "auto-registering resource");
        self.resources
            .insert(id.to_string(), ManagedResource::from_spec(ResourceSpec::new(id), now_ms));
        true
    }

    /// Overwrite state, health, and timestamp, auto-registering if needed.
    pub fn update_state(
        &mut self,
        id: &str,
        state: ResourceState,
        health: impl Into<String>,
        now_ms: u128,
    ) -> bool {
        self.ensure(id, now_ms);
        if let Some(resource) = self.resources.get_mut(id) {
            let previous = resource.state;
            resource.state = state;
            resource.health = health.into();
            resource.updated_at_ms = now_ms;
            tracing::debug!(resource = %id, from = %previous, to = %state, "resource state updated");
        }
        true
    }

    /// Full record for `id`.
    pub fn get(&self, id: &str) -> Option<&ManagedResource> {
        self.resources.get(id)
    }

    /// Current state of `id`.
    pub fn get_state(&self, id: &str) -> Option<ResourceState> {
        self.resources.get(id).map(|r| r.state)
    }

    /// Whether `id` is registered.
    pub fn contains(&self, id: &str) -> bool {
        self.resources.contains_key(id)
    }

    /// State of every resource, ordered by id.
    pub fn list_states(&self) -> BTreeMap<String, ResourceState> {
        self.resources
            .iter()
            .map(|(id, r)| (id.clone(), r.state))
            .collect()
    }

    /// Resources `id` depends on. Empty for unknown ids.
    pub fn dependencies_of(&self, id: &str) -> BTreeSet<String> {
        self.resources
            .get(id)
            .map(|r| r.dependencies.clone())
            .unwrap_or_default()
    }

    /// Resources that depend on `id`.
    pub fn dependents_of(&self, id: &str) -> BTreeSet<String> {
        self.resources
            .values()
            .filter(|r| r.dependencies.contains(id))
            .map(|r| r.id.clone())
            .collect()
    }

    /// Ids of resources currently in `state`, ordered.
    pub fn resources_in_state(&self, state: ResourceState) -> Vec<String> {
        let mut ids: Vec<String> = self
            .resources
            .values()
            .filter(|r| r.state == state)
            .map(|r| r.id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Iterate over all resources in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = &ManagedResource> {
        self.resources.values()
    }

    /// Number of registered resources.
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}
