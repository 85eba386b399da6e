// Voicebridge: HTTP bridge for a desktop TTS binary with an engine-compatible
// API surface.

pub mod backend;
pub mod config;
pub mod engine;
pub mod error;
pub mod http_server;
pub mod query;
pub mod rate_limit;
pub mod speakers;
pub mod types;
pub mod voicepeak;

pub use backend::{BackendRouter, SynthesisBackend};
pub use config::Settings;
pub use error::AppError;
pub use types::NormalizedRequest;
