//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::constants::{dedup, fanout, flags, ingress, session, translation_cache};
use crate::ConfigError;

/// Runtime environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnvironment {
    #[default]
    Development,
    Staging,
    Production,
}

impl RuntimeEnvironment {
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub environment: RuntimeEnvironment,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub fanout: FanoutConfig,

    #[serde(default)]
    pub upstream: UpstreamConfig,

    #[serde(default)]
    pub flags: FlagsConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate settings, failing fast on out-of-contract values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_session()?;
        self.validate_pipeline()?;
        self.validate_fanout()?;
        self.validate_server()?;
        Ok(())
    }

    fn validate_session(&self) -> Result<(), ConfigError> {
        let s = &self.session;
        if s.max_listeners == 0 {
            return Err(ConfigError::InvalidValue {
                field: "session.max_listeners".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if s.max_sessions == 0 {
            return Err(ConfigError::InvalidValue {
                field: "session.max_sessions".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if s.idle_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "session.idle_timeout_secs".to_string(),
                message: "must be at least 1 second".to_string(),
            });
        }
        Ok(())
    }

    fn validate_pipeline(&self) -> Result<(), ConfigError> {
        let p = &self.pipeline;
        if !(session::MIN_STABILITY_LOW..=session::MIN_STABILITY_HIGH)
            .contains(&p.min_stability_threshold)
        {
            return Err(ConfigError::InvalidValue {
                field: "pipeline.min_stability_threshold".to_string(),
                message: format!(
                    "must be in [{}, {}], got {}",
                    session::MIN_STABILITY_LOW,
                    session::MIN_STABILITY_HIGH,
                    p.min_stability_threshold
                ),
            });
        }
        if !(session::BUFFER_TIMEOUT_LOW_SECS..=session::BUFFER_TIMEOUT_HIGH_SECS)
            .contains(&p.max_buffer_timeout_secs)
        {
            return Err(ConfigError::InvalidValue {
                field: "pipeline.max_buffer_timeout_secs".to_string(),
                message: format!(
                    "must be in [{}, {}], got {}",
                    session::BUFFER_TIMEOUT_LOW_SECS,
                    session::BUFFER_TIMEOUT_HIGH_SECS,
                    p.max_buffer_timeout_secs
                ),
            });
        }
        if p.pause_threshold_secs <= 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "pipeline.pause_threshold_secs".to_string(),
                message: "must be positive".to_string(),
            });
        }
        if p.max_audio_frames_per_sec == 0 {
            return Err(ConfigError::InvalidValue {
                field: "pipeline.max_audio_frames_per_sec".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    fn validate_fanout(&self) -> Result<(), ConfigError> {
        let f = &self.fanout;
        if f.max_concurrent_broadcasts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "fanout.max_concurrent_broadcasts".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if f.max_cache_entries == 0 {
            return Err(ConfigError::InvalidValue {
                field: "fanout.max_cache_entries".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    fn validate_server(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.port".to_string(),
                message: "port cannot be 0".to_string(),
            });
        }
        if self.server.max_connections == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.max_connections".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_ws_path")]
    pub ws_path: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    #[serde(default)]
    pub cors_origins: Vec<String>,

    #[serde(default)]
    pub auth: AuthConfig,
}

/// Speaker authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// When disabled (development), any non-empty token verifies.
    #[serde(default)]
    pub enabled: bool,

    /// Shared secret checked against the speaker's token
    /// (set via BABELCAST__SERVER__AUTH__API_KEY).
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: None,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_ws_path() -> String {
    "/ws".to_string()
}
fn default_max_connections() -> usize {
    2000
}
fn default_true() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            ws_path: default_ws_path(),
            max_connections: default_max_connections(),
            cors_enabled: default_true(),
            cors_origins: Vec::new(),
            auth: AuthConfig::default(),
        }
    }
}

/// Session / connection directory configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    #[serde(default = "default_max_listeners")]
    pub max_listeners: u32,

    #[serde(default = "default_session_lifetime")]
    pub max_lifetime_secs: u64,

    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    #[serde(default = "default_reap_interval")]
    pub reap_interval_secs: u64,
}

fn default_max_sessions() -> usize {
    200
}
fn default_max_listeners() -> u32 {
    session::MAX_LISTENERS
}
fn default_session_lifetime() -> u64 {
    session::MAX_LIFETIME_SECS
}
fn default_idle_timeout() -> u64 {
    session::IDLE_TIMEOUT_SECS
}
fn default_reap_interval() -> u64 {
    session::REAP_INTERVAL_SECS
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_sessions: default_max_sessions(),
            max_listeners: default_max_listeners(),
            max_lifetime_secs: default_session_lifetime(),
            idle_timeout_secs: default_idle_timeout(),
            reap_interval_secs: default_reap_interval(),
        }
    }
}

/// Partial-result pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Default for sessions that do not override the tunable.
    #[serde(default = "default_true")]
    pub partial_results_enabled: bool,

    #[serde(default = "default_min_stability")]
    pub min_stability_threshold: f32,

    #[serde(default = "default_max_buffer_timeout")]
    pub max_buffer_timeout_secs: f32,

    #[serde(default = "default_pause_threshold")]
    pub pause_threshold_secs: f32,

    #[serde(default = "default_orphan_timeout")]
    pub orphan_timeout_secs: u64,

    #[serde(default = "default_dedup_ttl")]
    pub dedup_cache_ttl_secs: u64,

    #[serde(default = "default_audio_frames_per_sec")]
    pub max_audio_frames_per_sec: u32,

    #[serde(default = "default_audio_burst")]
    pub audio_burst: u32,
}

fn default_min_stability() -> f32 {
    0.85
}
fn default_max_buffer_timeout() -> f32 {
    5.0
}
fn default_pause_threshold() -> f32 {
    2.0
}
fn default_orphan_timeout() -> u64 {
    crate::constants::orphan::TIMEOUT_SECS
}
fn default_dedup_ttl() -> u64 {
    dedup::DEFAULT_TTL_SECS
}
fn default_audio_frames_per_sec() -> u32 {
    ingress::AUDIO_FRAMES_PER_SEC
}
fn default_audio_burst() -> u32 {
    ingress::AUDIO_BURST
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            partial_results_enabled: true,
            min_stability_threshold: default_min_stability(),
            max_buffer_timeout_secs: default_max_buffer_timeout(),
            pause_threshold_secs: default_pause_threshold(),
            orphan_timeout_secs: default_orphan_timeout(),
            dedup_cache_ttl_secs: default_dedup_ttl(),
            max_audio_frames_per_sec: default_audio_frames_per_sec(),
            audio_burst: default_audio_burst(),
        }
    }
}

/// Fan-out / broadcast configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FanoutConfig {
    #[serde(default = "default_max_broadcasts")]
    pub max_concurrent_broadcasts: usize,

    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,

    #[serde(default = "default_max_cache_entries")]
    pub max_cache_entries: usize,

    #[serde(default = "default_translate_timeout")]
    pub translate_timeout_secs: u64,

    #[serde(default = "default_synthesize_timeout")]
    pub synthesize_timeout_secs: u64,

    #[serde(default = "default_send_timeout")]
    pub send_timeout_secs: u64,
}

fn default_max_broadcasts() -> usize {
    fanout::MAX_CONCURRENT_BROADCASTS
}
fn default_cache_ttl() -> u64 {
    translation_cache::DEFAULT_TTL_SECS
}
fn default_max_cache_entries() -> usize {
    translation_cache::MAX_ENTRIES
}
fn default_translate_timeout() -> u64 {
    fanout::TRANSLATE_TIMEOUT_SECS
}
fn default_synthesize_timeout() -> u64 {
    fanout::SYNTHESIZE_TIMEOUT_SECS
}
fn default_send_timeout() -> u64 {
    fanout::SEND_TIMEOUT_SECS
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            max_concurrent_broadcasts: default_max_broadcasts(),
            cache_ttl_secs: default_cache_ttl(),
            max_cache_entries: default_max_cache_entries(),
            translate_timeout_secs: default_translate_timeout(),
            synthesize_timeout_secs: default_synthesize_timeout(),
            send_timeout_secs: default_send_timeout(),
        }
    }
}

/// External service endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// "http" for the remote services, "noop" for local development.
    #[serde(default = "default_provider")]
    pub provider: String,

    #[serde(default = "default_translate_endpoint")]
    pub translate_endpoint: String,

    #[serde(default = "default_synthesize_endpoint")]
    pub synthesize_endpoint: String,
}

fn default_provider() -> String {
    "http".to_string()
}

fn default_translate_endpoint() -> String {
    "http://127.0.0.1:7021/translate".to_string()
}
fn default_synthesize_endpoint() -> String {
    "http://127.0.0.1:7022/synthesize".to_string()
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            translate_endpoint: default_translate_endpoint(),
            synthesize_endpoint: default_synthesize_endpoint(),
        }
    }
}

/// Feature-flag oracle configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlagsConfig {
    #[serde(default = "default_flag_cache_ttl")]
    pub cache_ttl_secs: u64,
}

fn default_flag_cache_ttl() -> u64 {
    flags::CACHE_TTL_SECS
}

impl Default for FlagsConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_flag_cache_ttl(),
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_json: bool,

    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
            metrics_enabled: true,
        }
    }
}

/// Load settings from files and environment.
///
/// Priority (highest to lowest):
/// 1. Environment variables (`BABELCAST__` prefix, `__` separator)
/// 2. `config/{env}.toml` (if env specified)
/// 3. `config/default.toml`
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    builder = builder.add_source(File::with_name("config/default").required(false));

    if let Some(env_name) = env {
        builder =
            builder.add_source(File::with_name(&format!("config/{}", env_name)).required(false));
    }

    builder = builder.add_source(
        Environment::with_prefix("BABELCAST")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;

    settings.validate()?;

    Ok(settings)
}
