//! Stage-scheduled entity/component/resource runtime.
//!
//! A scene document activates resources (global or per level) and fills four
//! stage queues with systems. The engine initializes resources, runs `Init`
//! once per level, then repeats `FrameInit`, `FrameMain` and `FrameEnd` every
//! frame. Systems within a stage are started together and awaited together;
//! stages never overlap.

mod builder;
mod component;
mod config;
mod controller;
mod engine;
mod entity;
mod error;
mod resources;
mod scene;
mod scheduler;
mod systems;

pub use builder::EngineBuilder;
pub use component::{AsAny, Component, ComponentHandle};
pub use config::EngineConfig;
pub use controller::{Frame, FrameHost, FrameRequest, ManualFrameHost, TokioFrameHost};
pub use engine::{Engine, EntityBuilder};
pub use entity::{ComponentRecord, Entities, Entity, EntityId, EntityMut};
pub use error::{ConfigError, EngineError, Result};
pub use resources::{InitContext, InitOptions, Resource, ResourceKind, ResourceMap, ResourceStore, Resources, Scope};
pub use scene::{FileSource, GlobalConfig, InlineSource, LevelConfig, ResourceEntry, SceneConfig, SceneSource, StageConfig, SystemEntry};
pub use scheduler::Payload;
pub use systems::{AsyncFunctionSystem, FunctionSystem, Stage, System, SystemQuery, Systems};

pub mod prelude {
    pub use crate::{
        Component, ComponentHandle, Engine, EngineError, InitContext, InitOptions, Payload, Resource,
        ResourceKind, Scope, Stage, System, SystemQuery,
    };
    pub use futures::future::BoxFuture;
}
