use std::path::PathBuf;

use futures::future::{self, BoxFuture};
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{ConfigError, EngineError, Result};
use crate::systems::Stage;

/// A resource activation: `{ "name": ..., "initOptions": ... }`.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceEntry {
    pub name: String,
    #[serde(default)]
    pub init_options: Value,
}

impl ResourceEntry {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            init_options: Value::Null,
        }
    }
}

/// A stage queue entry: a bare name or `{ "name": ..., "initOptions": ... }`.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum SystemEntry {
    Name(String),
    #[serde(rename_all = "camelCase")]
    Configured {
        name: String,
        #[serde(default)]
        init_options: Value,
    },
}

impl SystemEntry {
    pub fn named(name: impl Into<String>) -> Self {
        SystemEntry::Name(name.into())
    }

    pub fn name(&self) -> &str {
        match self {
            SystemEntry::Name(name) => name,
            SystemEntry::Configured { name, .. } => name,
        }
    }

    pub fn init_options(&self) -> Option<&Value> {
        match self {
            SystemEntry::Name(_) => None,
            SystemEntry::Configured { init_options, .. } => Some(init_options),
        }
    }
}

/// Stage name -> ordered system list. Absent stages stay empty.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageConfig {
    pub init: Option<Vec<SystemEntry>>,
    pub frame_init: Option<Vec<SystemEntry>>,
    pub frame_main: Option<Vec<SystemEntry>>,
    pub frame_end: Option<Vec<SystemEntry>>,
}

impl StageConfig {
    pub fn get(&self, stage: Stage) -> Option<&[SystemEntry]> {
        let entries = match stage {
            Stage::Init => &self.init,
            Stage::FrameInit => &self.frame_init,
            Stage::FrameMain => &self.frame_main,
            Stage::FrameEnd => &self.frame_end,
        };
        entries.as_deref()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct GlobalConfig {
    pub resources: Option<Vec<ResourceEntry>>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct LevelConfig {
    pub resources: Option<Vec<ResourceEntry>>,
    pub systems: Option<StageConfig>,
    pub next: Option<String>,
}

/// The whole scene document.
///
/// ```json
/// {
///   "_first": "intro",
///   "_global": { "resources": [{ "name": "time" }] },
///   "intro": {
///     "resources": [{ "name": "score", "initOptions": { "start": 0 } }],
///     "systems": { "init": ["spawner"], "frameMain": ["physics"] },
///     "next": "cave"
///   }
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct SceneConfig {
    #[serde(default, rename = "_first")]
    pub first: Option<String>,
    #[serde(default, rename = "_global")]
    pub global: Option<GlobalConfig>,
    #[serde(flatten)]
    pub levels: IndexMap<String, LevelConfig>,
}

impl SceneConfig {
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    /// The designated first level, or the first one declared.
    pub fn first_level(&self) -> Option<&str> {
        self.first
            .as_deref()
            .or_else(|| self.levels.keys().next().map(String::as_str))
    }
}

/// Where the scene document comes from.
pub trait SceneSource: Send + Sync + 'static {
    fn fetch(&self) -> BoxFuture<'_, Result<String, ConfigError>>;
}

/// Reads the document from disk.
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SceneSource for FileSource {
    fn fetch(&self) -> BoxFuture<'_, Result<String, ConfigError>> {
        Box::pin(async move { Ok(tokio::fs::read_to_string(&self.path).await?) })
    }
}

/// A document held in memory.
pub struct InlineSource {
    text: String,
}

impl InlineSource {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl SceneSource for InlineSource {
    fn fetch(&self) -> BoxFuture<'_, Result<String, ConfigError>> {
        Box::pin(future::ready(Ok(self.text.clone())))
    }
}

/// Scene document plus the loader's position in it.
#[derive(Default)]
pub(crate) struct SceneLoader {
    config: Option<SceneConfig>,
    current: Option<String>,
    next: Option<String>,
}

impl SceneLoader {
    pub(crate) fn set_config(&mut self, config: SceneConfig) {
        self.config = Some(config);
        self.current = None;
        self.next = None;
    }

    fn config(&self) -> Result<&SceneConfig> {
        self.config.as_ref().ok_or(EngineError::SceneNotLoaded)
    }

    pub(crate) fn first_level(&self) -> Result<String> {
        let config = self.config()?;
        config
            .first_level()
            .map(str::to_owned)
            .ok_or_else(|| EngineError::LevelNotFound("_first".to_owned()))
    }

    pub(crate) fn global_resources(&self) -> Result<Option<Vec<ResourceEntry>>> {
        Ok(self
            .config()?
            .global
            .as_ref()
            .and_then(|global| global.resources.clone()))
    }

    pub(crate) fn level(&self, name: &str) -> Result<LevelConfig> {
        self.config()?
            .levels
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::LevelNotFound(name.to_owned()))
    }

    /// Records `name` as the current level along with its `next` pointer.
    pub(crate) fn enter(&mut self, name: &str, level: &LevelConfig) {
        self.current = Some(name.to_owned());
        self.next = level.next.clone();
    }

    pub(crate) fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub(crate) fn next(&self) -> Option<&str> {
        self.next.as_deref()
    }
}
