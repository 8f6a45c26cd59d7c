//! Configuration for the streaming translation relay
//!
//! Settings are layered: `config/default.toml`, then an optional
//! `config/{env}.toml`, then `BABELCAST__`-prefixed environment variables.
//! Behavioural constants that are contracts rather than knobs live in
//! [`constants`].

pub mod constants;
pub mod settings;

pub use settings::{
    load_settings, AuthConfig, FanoutConfig, FlagsConfig, ObservabilityConfig, PipelineConfig,
    RuntimeEnvironment, ServerConfig, SessionConfig, Settings, UpstreamConfig,
};

use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}
