use std::sync::Arc;

use crate::config::EngineConfig;
use crate::controller::{FrameHost, TokioFrameHost};
use crate::engine::Engine;
use crate::error::Result;
use crate::resources::{Resource, Resources};
use crate::scene::{FileSource, SceneSource};
use crate::systems::{System, Systems};

pub struct EngineBuilder {
    config: EngineConfig,
    resources: Resources,
    systems: Systems,
    source: Option<Arc<dyn SceneSource>>,
    host: Option<Arc<dyn FrameHost>>,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            resources: Resources::new(),
            systems: Systems::new(),
            source: None,
            host: None,
        }
    }

    /// Applies `config`. A `scene_path` becomes the scene source unless one was set.
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn resource(mut self, resource: Arc<dyn Resource>) -> Self {
        self.resources.register(resource);
        self
    }

    pub fn system(mut self, system: Arc<dyn System>) -> Self {
        self.systems.register(system);
        self
    }

    pub fn scene_source(mut self, source: impl SceneSource) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    pub fn frame_host(mut self, host: impl FrameHost) -> Self {
        self.host = Some(Arc::new(host));
        self
    }

    /// Builds the engine. Without an explicit frame host, frames are paced on
    /// the current tokio runtime at the configured interval.
    pub fn build(self) -> Result<Engine> {
        let host = match self.host {
            Some(host) => host,
            None => Arc::new(TokioFrameHost::current(self.config.frame_interval())?),
        };
        let source = self.source.or_else(|| {
            self.config
                .scene_path
                .clone()
                .map(|path| Arc::new(FileSource::new(path)) as Arc<dyn SceneSource>)
        });
        Ok(Engine::new(self.resources, self.systems, source, host))
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::ManualFrameHost;
    use crate::error::EngineError;

    #[test]
    fn building_without_a_runtime_needs_a_host() {
        assert!(matches!(EngineBuilder::new().build(), Err(EngineError::NoRuntime)));
        assert!(EngineBuilder::new().frame_host(ManualFrameHost::new()).build().is_ok());
    }

    #[tokio::test]
    async fn defaults_to_the_tokio_host_inside_a_runtime() {
        let engine = EngineBuilder::new().build().unwrap();
        assert!(!engine.is_running());
    }
}
