use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::builder::EngineBuilder;
use crate::component::{Component, ComponentHandle};
use crate::controller::{Controller, FrameHost};
use crate::entity::{ComponentRecord, Entities, EntityId};
use crate::error::{EngineError, Result};
use crate::resources::{self, InitOptions, Resource, ResourceMap, Resources, Scope};
use crate::scene::{SceneConfig, SceneLoader, SceneSource};
use crate::scheduler;
use crate::systems::{Stage, System, Systems};

/// Handle to a running world. Clones share the same state.
///
/// Systems and resources receive a clone in their payloads, so everything
/// here takes `&self`. Locks are only held for the duration of a call.
#[derive(Clone)]
pub struct Engine {
    shared: Arc<Shared>,
}

struct Shared {
    entities: RwLock<Entities>,
    resources: RwLock<Resources>,
    systems: RwLock<Systems>,
    scene: Mutex<SceneLoader>,
    source: Option<Arc<dyn SceneSource>>,
    controller: Controller,
}

impl Engine {
    pub(crate) fn new(
        resources: Resources,
        systems: Systems,
        source: Option<Arc<dyn SceneSource>>,
        host: Arc<dyn FrameHost>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                entities: RwLock::new(Entities::new()),
                resources: RwLock::new(resources),
                systems: RwLock::new(systems),
                scene: Mutex::new(SceneLoader::default()),
                source,
                controller: Controller::new(host),
            }),
        }
    }

    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    pub fn register_resource(&self, resource: Arc<dyn Resource>) {
        self.shared.resources.write().register(resource);
    }

    pub fn register_system(&self, system: Arc<dyn System>) {
        self.shared.systems.write().register(system);
    }

    // --- entities ---

    pub fn spawn(&self) -> EntityBuilder {
        let id = self.shared.entities.write().spawn().id();
        EntityBuilder {
            engine: self.clone(),
            id,
        }
    }

    pub fn query_components<S: AsRef<str> + Sync>(&self, names: &[S]) -> Vec<ComponentRecord> {
        self.shared.entities.read().query(names)
    }

    pub fn get_components(&self, entity: EntityId, name: &str) -> Vec<ComponentHandle> {
        self.shared.entities.read().get_components(entity, name)
    }

    pub fn entity_count(&self) -> usize {
        self.shared.entities.read().len()
    }

    pub fn despawn_all(&self) {
        self.shared.entities.write().despawn_all();
    }

    // --- resources ---

    pub fn add_resource(&self, scope: Scope, name: &str, options: &InitOptions) -> Result<()> {
        self.shared.resources.write().add(scope, name, options)
    }

    /// Resolves `names` across both stores; level entries win.
    pub fn query_resources<S: AsRef<str>>(&self, names: &[S]) -> ResourceMap {
        self.shared.resources.read().query_all(names)
    }

    pub fn resource<T: Resource>(&self, name: &str) -> Option<Arc<T>> {
        self.query_resources(&[name]).get_arc(name)
    }

    /// Names active in `scope`, in the order they were added.
    pub fn active_resources(&self, scope: Scope) -> Vec<String> {
        self.shared
            .resources
            .read()
            .store(scope)
            .names()
            .map(str::to_owned)
            .collect()
    }

    pub async fn init_global(&self) -> Result<()> {
        self.init_store(Scope::Global).await
    }

    /// Initializes the level store, then runs the `Init` stage once.
    pub async fn init_level(&self) -> Result<()> {
        self.init_store(Scope::Level).await?;
        self.run_stage(Stage::Init).await
    }

    async fn init_store(&self, scope: Scope) -> Result<()> {
        let jobs = self.shared.resources.read().init_jobs(scope, self);
        log::debug!("initializing {} {:?} resource(s)", jobs.len(), scope);
        resources::init_all(jobs).await
    }

    /// Runs every update hook in both stores and waits for all of them.
    pub async fn update_resources(&self) -> Result<()> {
        let updatable = {
            let resources = self.shared.resources.read();
            let mut updatable = resources.updatable(Scope::Global);
            updatable.extend(resources.updatable(Scope::Level));
            updatable
        };
        resources::update_all(updatable).await
    }

    // --- systems ---

    pub fn queue_system(&self, stage: Stage, name: &str) -> Result<()> {
        self.shared.systems.write().push(stage, name)
    }

    pub fn queued_systems(&self, stage: Stage) -> Vec<String> {
        self.shared
            .systems
            .read()
            .queue_names(stage)
            .into_iter()
            .map(str::to_owned)
            .collect()
    }

    /// Runs one stage: payloads for the whole queue are resolved first, then
    /// every system is started, then all of them are awaited.
    pub async fn run_stage(&self, stage: Stage) -> Result<()> {
        let batch = self.shared.systems.read().queue(stage).to_vec();
        if batch.is_empty() {
            return Ok(());
        }
        let payloads = {
            let resources = self.shared.resources.read();
            let entities = self.shared.entities.read();
            scheduler::build_payloads(self, &resources, &entities, &batch)
        };
        scheduler::dispatch(stage, batch, payloads).await
    }

    // --- frame loop ---

    /// Clears the stop flag and schedules the next frame. Does not wait for it.
    pub fn start(&self) {
        let epoch = self.shared.controller.begin();
        log::debug!("frame loop started (epoch {})", epoch);
        self.schedule_frame(epoch);
    }

    /// Cancels the pending frame. A running frame stops at its next stage boundary.
    pub fn stop(&self) {
        self.shared.controller.halt();
    }

    pub fn is_running(&self) -> bool {
        self.shared.controller.is_running()
    }

    /// Frames that ran every stage to completion.
    pub fn frame_count(&self) -> u64 {
        self.shared.controller.frame_count()
    }

    /// The error that ended the frame loop, if any.
    pub fn take_fault(&self) -> Option<EngineError> {
        self.shared.controller.take_fault()
    }

    fn schedule_frame(&self, epoch: u64) {
        let engine = self.clone();
        self.shared
            .controller
            .schedule(epoch, Box::pin(engine.run_frame(epoch)));
    }

    async fn run_frame(self, epoch: u64) {
        let controller = &self.shared.controller;
        controller.frame_started(epoch);
        match self.tick(epoch).await {
            Ok(true) => {
                controller.frame_completed();
                self.schedule_frame(epoch);
            }
            Ok(false) => log::debug!("frame of epoch {} aborted at a stage boundary", epoch),
            Err(err) if controller.is_current(epoch) => {
                log::error!("frame loop halted: {}", err);
                controller.halt();
                controller.record_fault(err);
            }
            // a transition already replaced this loop; the new one keeps going
            Err(err) => log::error!("superseded frame of epoch {} failed: {}", epoch, err),
        }
    }

    /// One frame. Returns false if the loop was stopped part way.
    async fn tick(&self, epoch: u64) -> Result<bool> {
        self.update_resources().await?;
        if self.shared.controller.should_abort(epoch) {
            return Ok(false);
        }
        for stage in Stage::FRAME {
            self.run_stage(stage).await?;
            if self.shared.controller.should_abort(epoch) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    // --- scene ---

    /// Fetches and parses the scene document from the configured source.
    pub async fn load_scene(&self) -> Result<()> {
        let source = self.shared.source.clone().ok_or(EngineError::SceneNotLoaded)?;
        let text = source.fetch().await?;
        self.set_scene(SceneConfig::parse(&text)?);
        Ok(())
    }

    pub fn set_scene(&self, config: SceneConfig) {
        self.shared.scene.lock().set_config(config);
    }

    /// Loads the `_global` resource list into the global store, if present.
    pub fn load_globals(&self) -> Result<()> {
        let entries = self.shared.scene.lock().global_resources()?;
        if let Some(entries) = entries {
            self.shared
                .resources
                .write()
                .load_configs(Scope::Global, &entries)?;
        }
        Ok(())
    }

    /// Activates `name`'s resources and rebuilds the stage queues from it.
    ///
    /// A level without a `resources` list keeps the current level store, and
    /// one without `systems` keeps the current queues.
    ///
    /// Every resource and system name is resolved before either is replaced,
    /// so a failed load leaves the running level untouched.
    pub fn load_level(&self, name: &str) -> Result<()> {
        let level = self.shared.scene.lock().level(name)?;
        log::info!("loading level `{}`", name);
        {
            let mut resources = self.shared.resources.write();
            let mut systems = self.shared.systems.write();
            let queues = match &level.systems {
                Some(config) => Some(systems.resolve_queues(config)?),
                None => None,
            };
            if let Some(entries) = &level.resources {
                resources.load_configs(Scope::Level, entries)?;
            }
            if let Some(queues) = queues {
                systems.install_queues(queues);
            }
        }
        self.shared.scene.lock().enter(name, &level);
        Ok(())
    }

    pub fn current_level(&self) -> Option<String> {
        self.shared.scene.lock().current().map(str::to_owned)
    }

    pub fn next_level(&self) -> Option<String> {
        self.shared.scene.lock().next().map(str::to_owned)
    }

    /// Moves to the next level: stop, despawn, load, init, restart.
    ///
    /// Usually called from a running system. The frame that made the call
    /// stops at its next stage boundary; the restarted loop takes over.
    pub async fn load_next(&self) -> Result<()> {
        let next = self.next_level().ok_or(EngineError::NoNextLevel)?;
        log::info!("transition to level `{}`", next);
        self.stop();
        self.despawn_all();
        self.load_level(&next)?;
        self.init_level().await?;
        self.start();
        Ok(())
    }

    /// Full startup: fetch the scene, load and init globals, load and init the
    /// first level, then start the frame loop.
    pub async fn boot(&self) -> Result<()> {
        self.load_scene().await?;
        self.load_globals()?;
        self.init_global().await?;
        let first = self.shared.scene.lock().first_level()?;
        self.load_level(&first)?;
        self.init_level().await?;
        self.start();
        Ok(())
    }
}

/// Owned spawn handle returned by [`Engine::spawn`].
pub struct EntityBuilder {
    engine: Engine,
    id: EntityId,
}

impl EntityBuilder {
    pub fn id(&self) -> EntityId {
        self.id
    }

    /// Attaches `component`. Dropped with a warning if the entity was
    /// despawned since this builder was created.
    pub fn add_component<C: Component>(self, component: C) -> Self {
        let mut entities = self.engine.shared.entities.write();
        match entities.entity_mut(self.id) {
            Some(entity) => {
                entity.add_component(component);
            }
            None => log::warn!("component `{}` added to despawned entity {:?}", component.name(), self.id),
        }
        drop(entities);
        self
    }
}
