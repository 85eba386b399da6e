// Runtime settings, resolved once from environment variables at startup.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Longest text accepted by any synthesis endpoint, in characters.
pub const MAX_TEXT_CHARS: usize = 1000;

#[derive(Debug, Clone)]
pub struct Settings {
    pub port: u16,
    /// Path to the narrator binary.
    pub voicepeak_bin: PathBuf,
    /// Working directory for every spawn; the binary resolves its licensed
    /// resources relative to its installation directory.
    pub voicepeak_dir: PathBuf,
    /// Directory for per-request output files.
    pub temp_dir: PathBuf,
    /// Ceiling for one binary invocation; the child is killed on expiry.
    pub process_timeout: Duration,
    /// Narrator used by `/api/synthesize` when the body names none. When unset
    /// the first narrator in catalog order is used.
    pub default_narrator: Option<String>,
    /// Base URL of the remote engine, e.g. `http://127.0.0.1:10101`.
    pub engine_url: Option<String>,
    pub engine_timeout: Duration,
    /// Per-capability routing: true sends the capability to the remote engine.
    pub route_narrators_remote: bool,
    pub route_emotions_remote: bool,
    pub route_synthesis_remote: bool,
    pub rate_limit_window: Duration,
    pub rate_limit_max: u32,
}

impl Settings {
    pub fn from_env() -> Self {
        let voicepeak_bin = env::var("VOICEPEAK_BIN")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/opt/voicepeak/voicepeak"));
        let voicepeak_dir = env::var("VOICEPEAK_DIR")
            .map(PathBuf::from)
            .ok()
            .or_else(|| voicepeak_bin.parent().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("."));

        Settings {
            port: env_parse("VOICEBRIDGE_PORT", 3000),
            voicepeak_bin,
            voicepeak_dir,
            temp_dir: env::var("VOICEBRIDGE_TEMP_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| env::temp_dir()),
            process_timeout: Duration::from_millis(env_parse("VOICEPEAK_TIMEOUT_MS", 30_000u64)),
            default_narrator: env::var("VOICEPEAK_NARRATOR").ok().filter(|s| !s.is_empty()),
            engine_url: env::var("ENGINE_URL").ok().filter(|s| !s.is_empty()),
            engine_timeout: Duration::from_millis(env_parse("ENGINE_TIMEOUT_MS", 30_000u64)),
            route_narrators_remote: env_flag("USE_ENGINE_NARRATORS"),
            route_emotions_remote: env_flag("USE_ENGINE_EMOTIONS"),
            route_synthesis_remote: env_flag("USE_ENGINE_SYNTHESIS"),
            rate_limit_window: Duration::from_millis(env_parse("RATE_LIMIT_WINDOW_MS", 60_000u64)),
            rate_limit_max: env_parse("RATE_LIMIT_MAX", 60u32),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse::<T>().ok())
        .unwrap_or(default)
}

fn env_flag(key: &str) -> bool {
    matches!(
        env::var(key).unwrap_or_default().to_lowercase().as_str(),
        "1" | "true" | "yes"
    )
}
