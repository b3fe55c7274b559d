use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use futures::future::{self, BoxFuture};
use indexmap::IndexMap;

use crate::error::{EngineError, Result};
use crate::resources::InitOptions;
use crate::scene::StageConfig;
use crate::scheduler::Payload;

/// The four phases of a level, in execution order.
///
/// `Init` runs once per level load; the other three repeat every frame.
#[derive(Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Init,
    FrameInit,
    FrameMain,
    FrameEnd,
}

impl Stage {
    pub const ALL: [Stage; 4] = [Stage::Init, Stage::FrameInit, Stage::FrameMain, Stage::FrameEnd];
    pub const FRAME: [Stage; 3] = [Stage::FrameInit, Stage::FrameMain, Stage::FrameEnd];

    pub fn index(&self) -> usize {
        match self {
            Stage::Init => 0,
            Stage::FrameInit => 1,
            Stage::FrameMain => 2,
            Stage::FrameEnd => 3,
        }
    }

    /// Key used for this stage in scene documents.
    pub fn key(&self) -> &'static str {
        match self {
            Stage::Init => "init",
            Stage::FrameInit => "frameInit",
            Stage::FrameMain => "frameMain",
            Stage::FrameEnd => "frameEnd",
        }
    }
}

/// What a system wants resolved into its payload before it runs.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SystemQuery {
    /// Resource names, looked up across the global and level stores.
    pub resources: Vec<String>,
    /// Query name -> component names an entity must all carry.
    pub components: IndexMap<String, Vec<String>>,
}

impl SystemQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resource(mut self, name: impl Into<String>) -> Self {
        self.resources.push(name.into());
        self
    }

    pub fn components<I, S>(mut self, query: impl Into<String>, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.components
            .insert(query.into(), names.into_iter().map(Into::into).collect());
        self
    }
}

/// A named routine run once per tick of each stage it is queued in.
///
/// `run` is the only entry point. Synchronous bodies return an
/// already-completed future; see [`FunctionSystem`].
pub trait System: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Read once, at registration.
    fn query(&self) -> SystemQuery {
        SystemQuery::default()
    }

    /// Called when the system is queued from a `{ name, initOptions }` entry.
    fn configure(&self, _options: &InitOptions) {}

    fn run(&self, payload: Payload) -> BoxFuture<'_, anyhow::Result<()>>;
}

/// A system backed by a synchronous closure.
pub struct FunctionSystem<F> {
    name: String,
    query: SystemQuery,
    func: F,
}

impl<F> FunctionSystem<F>
where
    F: Fn(Payload) -> anyhow::Result<()> + Send + Sync + 'static,
{
    pub fn new(name: impl Into<String>, query: SystemQuery, func: F) -> Self {
        Self {
            name: name.into(),
            query,
            func,
        }
    }
}

impl<F> System for FunctionSystem<F>
where
    F: Fn(Payload) -> anyhow::Result<()> + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn query(&self) -> SystemQuery {
        self.query.clone()
    }

    fn run(&self, payload: Payload) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(future::ready((self.func)(payload)))
    }
}

/// A system backed by a closure returning a future.
pub struct AsyncFunctionSystem<F, Fut> {
    name: String,
    query: SystemQuery,
    func: F,
    marker: PhantomData<fn() -> Fut>,
}

impl<F, Fut> AsyncFunctionSystem<F, Fut>
where
    F: Fn(Payload) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    pub fn new(name: impl Into<String>, query: SystemQuery, func: F) -> Self {
        Self {
            name: name.into(),
            query,
            func,
            marker: PhantomData,
        }
    }
}

impl<F, Fut> System for AsyncFunctionSystem<F, Fut>
where
    F: Fn(Payload) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn query(&self) -> SystemQuery {
        self.query.clone()
    }

    fn run(&self, payload: Payload) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin((self.func)(payload))
    }
}

#[derive(Clone)]
pub(crate) struct RegisteredSystem {
    pub(crate) system: Arc<dyn System>,
    pub(crate) query: Arc<SystemQuery>,
}

impl RegisteredSystem {
    pub(crate) fn name(&self) -> &str {
        self.system.name()
    }
}

/// Stage queues resolved from a config but not yet installed.
#[derive(Default)]
pub(crate) struct ResolvedQueues {
    queues: [Vec<RegisteredSystem>; 4],
    configure: Vec<(Arc<dyn System>, InitOptions)>,
}

/// System registry plus one queue per [`Stage`].
pub struct Systems {
    registry: IndexMap<String, RegisteredSystem>,
    queues: [Vec<RegisteredSystem>; 4],
}

impl Systems {
    pub fn new() -> Self {
        Self {
            registry: IndexMap::new(),
            queues: Default::default(),
        }
    }

    pub fn register(&mut self, system: Arc<dyn System>) {
        let entry = RegisteredSystem {
            query: Arc::new(system.query()),
            system,
        };
        log::debug!("registered system `{}`", entry.name());
        self.registry.insert(entry.name().to_owned(), entry);
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.registry.contains_key(name)
    }

    pub fn clear_queues(&mut self) {
        for queue in self.queues.iter_mut() {
            queue.clear();
        }
    }

    /// Rebuilds every stage queue from `config`, preserving listed order.
    ///
    /// The queues are only replaced once every name resolved.
    pub fn load_queues(&mut self, config: &StageConfig) -> Result<()> {
        let queues = self.resolve_queues(config)?;
        self.install_queues(queues);
        Ok(())
    }

    /// Looks up every name in `config` without touching the current queues.
    pub(crate) fn resolve_queues(&self, config: &StageConfig) -> Result<ResolvedQueues> {
        let mut resolved = ResolvedQueues::default();
        for stage in Stage::ALL {
            for entry in config.get(stage).unwrap_or_default() {
                let system = self
                    .registry
                    .get(entry.name())
                    .cloned()
                    .ok_or_else(|| EngineError::SystemNotFound(entry.name().to_owned()))?;
                if let Some(options) = entry.init_options() {
                    resolved.configure.push((Arc::clone(&system.system), options.clone()));
                }
                resolved.queues[stage.index()].push(system);
            }
        }
        Ok(resolved)
    }

    /// Hands out per-entry options, then swaps the queues in.
    pub(crate) fn install_queues(&mut self, resolved: ResolvedQueues) {
        for (system, options) in &resolved.configure {
            system.configure(options);
        }
        self.queues = resolved.queues;
    }

    /// Appends a registered system to `stage`.
    pub fn push(&mut self, stage: Stage, name: &str) -> Result<()> {
        let system = self
            .registry
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::SystemNotFound(name.to_owned()))?;
        self.queues[stage.index()].push(system);
        Ok(())
    }

    pub fn queue_names(&self, stage: Stage) -> Vec<&str> {
        self.queues[stage.index()].iter().map(RegisteredSystem::name).collect()
    }

    pub(crate) fn queue(&self, stage: Stage) -> &[RegisteredSystem] {
        &self.queues[stage.index()]
    }
}

impl Default for Systems {
    fn default() -> Self {
        Self::new()
    }
}
