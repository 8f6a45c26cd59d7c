//! Streaming translation relay server
//!
//! WebSocket ingress for speakers and listeners, the session/connection
//! directory, and the HTTP surface (health, readiness, metrics, session
//! status).

pub mod auth;
pub mod directory;
pub mod http;
pub mod metrics;
pub mod pump;
pub mod rate_limit;
pub mod session_id;
pub mod state;
pub mod websocket;

pub use auth::StaticTokenAuth;
pub use directory::{ConnectionRecord, DisconnectOutcome, Role, SessionDirectory, SessionRecord};
pub use http::create_router;
pub use metrics::init_metrics;
pub use pump::{NullTranscriptionEngine, ScriptedTranscriptionEngine, TranscriptionPump};
pub use rate_limit::{AudioRateLimiter, RateLimitError};
pub use session_id::generate_session_id;
pub use state::{AppState, ConnectionRegistry};
pub use websocket::ws_handler;
