use std::any::Any;
use std::sync::Arc;

use futures::future::{self, BoxFuture};
use indexmap::IndexMap;
use serde_json::Value;

use crate::component::AsAny;
use crate::engine::Engine;
use crate::error::{EngineError, Result};
use crate::scene::ResourceEntry;
use crate::scheduler;

/// Free-form options handed to a resource (or system) by the scene document.
pub type InitOptions = Value;

/// Whether a resource takes part in the per-frame update pass.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ResourceKind {
    Static,
    Updatable,
}

/// Which store a resource lives in.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Populated once at startup, survives scene transitions.
    Global,
    /// Repopulated on every level load.
    Level,
}

/// A named singleton shared by every system.
///
/// Resources are shared behind `Arc` and reached through `&self`, so any
/// state that changes after registration needs interior mutability.
pub trait Resource: AsAny {
    fn name(&self) -> &str;

    /// Resources to resolve (from both stores) before `init` runs.
    ///
    /// Nothing is sorted: a dependency must already be resident because it
    /// was added earlier, or because it lives in the other store.
    fn init_query(&self) -> Vec<String> {
        Vec::new()
    }

    /// Read once, at registration.
    fn kind(&self) -> ResourceKind {
        ResourceKind::Static
    }

    /// Called synchronously by `add`. Must only stash the options.
    fn prepare_init(&self, _options: &InitOptions) {}

    fn init(&self, _cx: InitContext) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(future::ready(Ok(())))
    }

    /// Only dispatched for [`ResourceKind::Updatable`] resources.
    fn update(&self) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(future::ready(Ok(())))
    }
}

/// Everything a resource's `init` hook receives.
pub struct InitContext {
    pub engine: Engine,
    pub scope: Scope,
    /// The resolved `init_query` dependencies. Missing names are omitted.
    pub resources: ResourceMap,
}

/// Name-keyed view over a set of resources, in insertion order.
#[derive(Clone, Default)]
pub struct ResourceMap {
    inner: IndexMap<String, Arc<dyn Resource>>,
}

impl ResourceMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, resource: Arc<dyn Resource>) {
        self.inner.insert(resource.name().to_owned(), resource);
    }

    /// Union with `other`; entries of `other` win on name collisions.
    pub fn merge(&mut self, other: ResourceMap) {
        self.inner.extend(other.inner);
    }

    pub fn get<T: Resource>(&self, name: &str) -> Option<&T> {
        self.inner.get(name).and_then(|r| (**r).as_any().downcast_ref::<T>())
    }

    pub fn get_arc<T: Resource>(&self, name: &str) -> Option<Arc<T>> {
        let resource = Arc::clone(self.inner.get(name)?);
        let any: Arc<dyn Any + Send + Sync> = resource.into_any_arc();
        any.downcast::<T>().ok()
    }

    pub fn get_dyn(&self, name: &str) -> Option<&Arc<dyn Resource>> {
        self.inner.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.inner.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// A registry entry. Capabilities are captured once, at registration.
#[derive(Clone)]
pub(crate) struct Registered {
    resource: Arc<dyn Resource>,
    kind: ResourceKind,
    init_query: Arc<[String]>,
}

impl Registered {
    fn new(resource: Arc<dyn Resource>) -> Self {
        Self {
            kind: resource.kind(),
            init_query: resource.init_query().into(),
            resource,
        }
    }

    fn name(&self) -> &str {
        self.resource.name()
    }
}

/// The active resources of one scope, in the order they were added.
pub struct ResourceStore {
    scope: Scope,
    active: Vec<Registered>,
}

impl ResourceStore {
    fn new(scope: Scope) -> Self {
        Self {
            scope,
            active: Vec::new(),
        }
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    /// Evicts every resource. The registry keeps its templates.
    pub fn clear(&mut self) {
        self.active.clear();
    }

    /// First resource added under `name`.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Resource>> {
        self.active
            .iter()
            .find(|r| r.name() == name)
            .map(|r| &r.resource)
    }

    /// Resolves each of `names` held by this store; absent names are skipped.
    pub fn query<S: AsRef<str>>(&self, names: &[S]) -> ResourceMap {
        let mut map = ResourceMap::new();
        for name in names {
            if let Some(resource) = self.get(name.as_ref()) {
                map.insert(Arc::clone(resource));
            }
        }
        map
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.active.iter().map(Registered::name)
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}

/// Resource registry plus the global and level stores.
pub struct Resources {
    registry: IndexMap<String, Registered>,
    global: ResourceStore,
    level: ResourceStore,
}

impl Resources {
    pub fn new() -> Self {
        Self {
            registry: IndexMap::new(),
            global: ResourceStore::new(Scope::Global),
            level: ResourceStore::new(Scope::Level),
        }
    }

    /// Inserts or replaces the template for `resource.name()`.
    pub fn register(&mut self, resource: Arc<dyn Resource>) {
        let entry = Registered::new(resource);
        log::debug!("registered resource `{}` ({:?})", entry.name(), entry.kind);
        self.registry.insert(entry.name().to_owned(), entry);
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.registry.contains_key(name)
    }

    pub fn store(&self, scope: Scope) -> &ResourceStore {
        match scope {
            Scope::Global => &self.global,
            Scope::Level => &self.level,
        }
    }

    pub fn store_mut(&mut self, scope: Scope) -> &mut ResourceStore {
        match scope {
            Scope::Global => &mut self.global,
            Scope::Level => &mut self.level,
        }
    }

    /// Activates a registered resource in `scope` and runs its `prepare_init`.
    pub fn add(&mut self, scope: Scope, name: &str, options: &InitOptions) -> Result<()> {
        let entry = self
            .registry
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::ResourceNotFound(name.to_owned()))?;

        let store = self.store_mut(scope);
        if store.get(name).is_some() {
            log::warn!("resource `{}` added twice to the {:?} store; the first one wins", name, scope);
        }
        entry.resource.prepare_init(options);
        store.active.push(entry);
        Ok(())
    }

    /// Clears `scope`, then adds every entry in order. An unregistered name
    /// fails the load before the store is touched.
    pub fn load_configs(&mut self, scope: Scope, entries: &[ResourceEntry]) -> Result<()> {
        if let Some(missing) = entries.iter().find(|entry| !self.is_registered(&entry.name)) {
            return Err(EngineError::ResourceNotFound(missing.name.clone()));
        }
        self.store_mut(scope).clear();
        for entry in entries {
            self.add(scope, &entry.name, &entry.init_options)?;
        }
        Ok(())
    }

    /// Union of both stores' answers. Level entries override global ones.
    pub fn query_all<S: AsRef<str>>(&self, names: &[S]) -> ResourceMap {
        let mut map = self.global.query(names);
        map.merge(self.level.query(names));
        map
    }

    /// Builds the init batch for `scope`: one job per active resource, in add order.
    pub(crate) fn init_jobs(&self, scope: Scope, engine: &Engine) -> Vec<InitJob> {
        self.store(scope)
            .active
            .iter()
            .map(|entry| {
                let resources = self.query_all(&entry.init_query[..]);
                for dependency in entry.init_query.iter() {
                    if !resources.contains(dependency) {
                        log::warn!(
                            "resource `{}` depends on `{}`, which is not active in any store",
                            entry.name(),
                            dependency
                        );
                    }
                }
                InitJob {
                    resource: Arc::clone(&entry.resource),
                    cx: InitContext {
                        engine: engine.clone(),
                        scope,
                        resources,
                    },
                }
            })
            .collect()
    }

    /// Every updatable resource in `scope`.
    pub(crate) fn updatable(&self, scope: Scope) -> Vec<Arc<dyn Resource>> {
        self.store(scope)
            .active
            .iter()
            .filter(|entry| entry.kind == ResourceKind::Updatable)
            .map(|entry| Arc::clone(&entry.resource))
            .collect()
    }
}

impl Default for Resources {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) struct InitJob {
    resource: Arc<dyn Resource>,
    cx: InitContext,
}

/// Starts every init in the batch, then waits for all of them.
pub(crate) async fn init_all(jobs: Vec<InitJob>) -> Result<()> {
    let started = jobs.into_iter().map(|job| async move {
        let outcome = job.resource.init(job.cx).await;
        (job.resource.name().to_owned(), outcome)
    });
    let outcomes = future::join_all(started).await;
    scheduler::settle(outcomes, |name, source| EngineError::ResourceInit { name, source })
}

/// Fires every update hook, then waits for all of them.
pub(crate) async fn update_all(resources: Vec<Arc<dyn Resource>>) -> Result<()> {
    let started = resources.into_iter().map(|resource| async move {
        let outcome = resource.update().await;
        (resource.name().to_owned(), outcome)
    });
    let outcomes = future::join_all(started).await;
    scheduler::settle(outcomes, |name, source| EngineError::ResourceUpdate { name, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use parking_lot::Mutex;

    struct Counter {
        name: &'static str,
        ticks: AtomicU32,
        options: Mutex<Option<Value>>,
    }

    impl Counter {
        fn new(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                ticks: AtomicU32::new(0),
                options: Mutex::new(None),
            })
        }
    }

    impl Resource for Counter {
        fn name(&self) -> &str {
            self.name
        }

        fn kind(&self) -> ResourceKind {
            ResourceKind::Updatable
        }

        fn prepare_init(&self, options: &InitOptions) {
            *self.options.lock() = Some(options.clone());
        }

        fn update(&self) -> BoxFuture<'_, anyhow::Result<()>> {
            self.ticks.fetch_add(1, Ordering::SeqCst);
            Box::pin(future::ready(Ok(())))
        }
    }

    struct Label(&'static str);

    impl Resource for Label {
        fn name(&self) -> &str {
            self.0
        }
    }

    #[test]
    fn add_requires_registration() {
        let mut resources = Resources::new();
        let err = resources.add(Scope::Level, "missing", &Value::Null).unwrap_err();
        assert!(matches!(err, EngineError::ResourceNotFound(name) if name == "missing"));
    }

    #[test]
    fn add_hands_options_to_prepare_init() {
        let counter = Counter::new("time");
        let mut resources = Resources::new();
        resources.register(counter.clone());
        resources.add(Scope::Global, "time", &json!({ "scale": 2 })).unwrap();
        assert_eq!(*counter.options.lock(), Some(json!({ "scale": 2 })));
        assert!(resources.store(Scope::Global).get("time").is_some());
        assert!(resources.store(Scope::Level).get("time").is_none());
    }

    #[test]
    fn query_skips_absent_names() {
        let mut resources = Resources::new();
        resources.register(Arc::new(Label("a")));
        resources.add(Scope::Level, "a", &Value::Null).unwrap();
        let map = resources.store(Scope::Level).query(&["a", "b"]);
        assert_eq!(map.names().collect::<Vec<_>>(), vec!["a"]);
        assert_eq!(map.get::<Label>("a").map(|l| l.0), Some("a"));
        assert_eq!(map.get_dyn("a").map(|r| r.name()), Some("a"));
        assert!(map.get_dyn("b").is_none());
        assert!(map.get::<Counter>("a").is_none());
    }

    #[test]
    fn level_overrides_global_in_combined_queries() {
        let global = Arc::new(Label("shared"));
        let level = Arc::new(Label("shared"));
        let mut resources = Resources::new();
        resources.register(global.clone());
        resources.add(Scope::Global, "shared", &Value::Null).unwrap();
        resources.register(level.clone());
        resources.add(Scope::Level, "shared", &Value::Null).unwrap();

        let map = resources.query_all(&["shared"]);
        let found = map.get_arc::<Label>("shared").unwrap();
        assert!(Arc::ptr_eq(&found, &level));
        assert!(!Arc::ptr_eq(&found, &global));
    }

    #[test]
    fn clearing_a_store_keeps_the_registry() {
        let mut resources = Resources::new();
        resources.register(Arc::new(Label("a")));
        resources.add(Scope::Level, "a", &Value::Null).unwrap();
        resources.store_mut(Scope::Level).clear();
        assert!(resources.store(Scope::Level).is_empty());
        assert!(resources.is_registered("a"));
        resources.add(Scope::Level, "a", &Value::Null).unwrap();
        assert_eq!(resources.store(Scope::Level).len(), 1);
    }

    #[test]
    fn load_configs_replaces_the_store_contents() {
        let mut resources = Resources::new();
        resources.register(Arc::new(Label("a")));
        resources.register(Arc::new(Label("b")));
        resources.add(Scope::Level, "a", &Value::Null).unwrap();

        let entries = vec![ResourceEntry::named("b")];
        resources.load_configs(Scope::Level, &entries).unwrap();
        assert_eq!(resources.store(Scope::Level).names().collect::<Vec<_>>(), vec!["b"]);
    }

    #[test]
    fn failed_load_leaves_the_store_alone() {
        let mut resources = Resources::new();
        resources.register(Arc::new(Label("a")));
        resources.add(Scope::Level, "a", &Value::Null).unwrap();

        let entries = vec![ResourceEntry::named("a"), ResourceEntry::named("ghost")];
        let err = resources.load_configs(Scope::Level, &entries).unwrap_err();
        assert!(matches!(err, EngineError::ResourceNotFound(name) if name == "ghost"));
        assert_eq!(resources.store(Scope::Level).len(), 1);
    }

    #[test]
    fn only_updatable_resources_are_updated() {
        let counter = Counter::new("time");
        let mut resources = Resources::new();
        resources.register(counter.clone());
        resources.register(Arc::new(Label("static")));
        resources.add(Scope::Global, "time", &Value::Null).unwrap();
        resources.add(Scope::Global, "static", &Value::Null).unwrap();

        let updatable = resources.updatable(Scope::Global);
        assert_eq!(updatable.len(), 1);
        futures::executor::block_on(update_all(updatable)).unwrap();
        assert_eq!(counter.ticks.load(Ordering::SeqCst), 1);
    }
}
