//! Run context - caller state shared with tools, guardrails and hooks

use serde_json::{Map, Value};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use crate::items::Usage;

// ============================================================================
// ResourceMap - Type-safe container for run resources
// ============================================================================

/// Type-safe container for runtime objects handed to tools
///
/// # Example
///
/// ```ignore
/// let mut resources = ResourceMap::new();
/// resources.insert(WeatherClient::new());
///
/// let ctx = RunContext::new(Map::new()).with_resources(resources);
/// let client = ctx.resource::<WeatherClient>();
/// ```
#[derive(Default, Clone)]
pub struct ResourceMap {
    map: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl ResourceMap {
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
        }
    }

    /// Insert a resource by type, replacing any previous value of that type
    pub fn insert<T: Send + Sync + 'static>(&mut self, value: T) {
        self.map.insert(TypeId::of::<T>(), Arc::new(value));
    }

    /// Insert an already shared resource
    pub fn insert_arc<T: Send + Sync + 'static>(&mut self, value: Arc<T>) {
        self.map.insert(TypeId::of::<T>(), value);
    }

    pub fn get<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.map
            .get(&TypeId::of::<T>())
            .and_then(|arc| arc.clone().downcast::<T>().ok())
    }

    pub fn contains<T: Send + Sync + 'static>(&self) -> bool {
        self.map.contains_key(&TypeId::of::<T>())
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl fmt::Debug for ResourceMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceMap")
            .field("count", &self.map.len())
            .finish()
    }
}

// ============================================================================
// RunContext - cheap-to-clone handle passed through a run
// ============================================================================

/// Context shared by every capability invoked during a run
///
/// Clones share the same usage counter and resources. The JSON `values` map
/// is the manifest's `context` object and is never sent to the model.
#[derive(Clone, Default)]
pub struct RunContext {
    values: Arc<Map<String, Value>>,
    resources: Arc<ResourceMap>,
    usage: Arc<Mutex<Usage>>,
}

impl RunContext {
    pub fn new(values: Map<String, Value>) -> Self {
        Self {
            values: Arc::new(values),
            resources: Arc::new(ResourceMap::new()),
            usage: Arc::new(Mutex::new(Usage::default())),
        }
    }

    pub fn with_resources(mut self, resources: ResourceMap) -> Self {
        self.resources = Arc::new(resources);
        self
    }

    /// Caller-provided context values
    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    pub fn value(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn value_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(|v| v.as_str())
    }

    pub fn resource<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.resources.get::<T>()
    }

    /// Accumulate token usage from a model response
    pub fn add_usage(&self, usage: &Usage) {
        self.usage
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .add(usage);
    }

    /// Usage accumulated so far
    pub fn usage(&self) -> Usage {
        self.usage
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl fmt::Debug for RunContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunContext")
            .field("values", &self.values)
            .field("resources", &self.resources)
            .field("usage", &self.usage())
            .finish()
    }
}
