pub mod interactive;
pub mod settings;


pub use interactive::{run_interactive_config, show_config};
pub use settings::{
    CompletionConfig, Config, ConfigError, EmbeddingConfig, IngestionConfig, RetrievalConfig,
    VectorBackend, VectorStoreConfig,
};

/// Get the configuration directory path
#[inline]
pub fn get_config_dir() -> Result<std::path::PathBuf, ConfigError> {
    Config::config_dir()
}
