use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;

use crate::correlator::{Continuation, Handle};

/// Named action/event handler: `(value, continuation, handle)`.
pub trait Handler: Send + Sync + 'static {
    fn handle(&self, value: Value, reply: Continuation, handle: Option<Handle>);
}

impl<F> Handler for F
where
    F: Fn(Value, Continuation, Option<Handle>) + Send + Sync + 'static,
{
    fn handle(&self, value: Value, reply: Continuation, handle: Option<Handle>) {
        self(value, reply, handle)
    }
}

/// Registry of named handlers, shared between the caller and the correlator.
///
/// Lookup is an exact key match on entries inserted through this API.
#[derive(Clone, Default)]
pub struct HandlerTable {
    inner: Arc<DashMap<String, Arc<dyn Handler>>>,
}

impl HandlerTable {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
        }
    }

    /// Builder-style `insert`.
    pub fn with<F>(self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Value, Continuation, Option<Handle>) + Send + Sync + 'static,
    {
        self.insert(name, f);
        self
    }

    /// Install closure `f` under `name`, returning the handler it replaced.
    pub fn insert<F>(&self, name: impl Into<String>, f: F) -> Option<Arc<dyn Handler>>
    where
        F: Fn(Value, Continuation, Option<Handle>) + Send + Sync + 'static,
    {
        self.insert_handler(name, f)
    }

    pub fn insert_handler(&self, name: impl Into<String>, handler: impl Handler) -> Option<Arc<dyn Handler>> {
        self.inner.insert(name.into(), Arc::new(handler))
    }

    pub fn remove(&self, name: &str) -> bool {
        self.inner.remove(name).is_some()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.inner.iter().map(|e| e.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Clone the handler out so no map lock is held while it runs.
    pub(crate) fn get(&self, name: &str) -> Option<Arc<dyn Handler>> {
        self.inner.get(name).map(|e| e.value().clone())
    }
}

impl std::fmt::Debug for HandlerTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.names()).finish()
    }
}
