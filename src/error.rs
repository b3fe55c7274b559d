/// Errors produced while loading, initializing or running a scene.
#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    /// The scene referenced a resource that was never registered.
    #[error("resource not found: {0}")]
    ResourceNotFound(String),

    /// The scene referenced a system that was never registered.
    #[error("system not found: {0}")]
    SystemNotFound(String),

    #[error("resource `{name}` failed to initialize")]
    ResourceInit {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("resource `{name}` failed to update")]
    ResourceUpdate {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("system `{name}` failed")]
    SystemRun {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("level not found: {0}")]
    LevelNotFound(String),

    /// `load_next` was called on a level without a `next` pointer.
    #[error("current level has no next level")]
    NoNextLevel,

    /// A level was requested before the scene document was fetched.
    #[error("scene configuration has not been loaded")]
    SceneNotLoaded,

    #[error("no tokio runtime available for the frame host")]
    NoRuntime,

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Configuration errors
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Scene document is not valid JSON for the expected shape
    #[error("scene parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// Engine config is not valid TOML
    #[error("config parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;
