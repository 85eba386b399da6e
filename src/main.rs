// Voicebridge server entry point.
// Use: cargo run  (configuration via environment variables, see config.rs)

use std::sync::Arc;
use tracing::{info, warn};

use voicebridge::backend::BackendRouter;
use voicebridge::config::Settings;
use voicebridge::engine::EngineClient;
use voicebridge::http_server::{run_http_server, AppState};
use voicebridge::rate_limit::FixedWindowLimiter;
use voicebridge::voicepeak::VoicepeakBinary;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().init();

    let settings = Settings::from_env();
    info!(
        bin = %settings.voicepeak_bin.display(),
        port = settings.port,
        "starting voicebridge"
    );
    if !settings.voicepeak_bin.exists() {
        warn!(
            bin = %settings.voicepeak_bin.display(),
            "narrator binary not found; local capabilities will fail until VOICEPEAK_BIN points at it"
        );
    }

    let binary = Arc::new(VoicepeakBinary::new(&settings));
    let engine = settings
        .engine_url
        .as_ref()
        .map(|url| Arc::new(EngineClient::new(url.clone(), settings.engine_timeout)));
    if engine.is_none()
        && (settings.route_narrators_remote
            || settings.route_emotions_remote
            || settings.route_synthesis_remote)
    {
        warn!("a capability is routed to the remote engine but ENGINE_URL is not set; those requests will fail");
    }

    let backends = Arc::new(BackendRouter::from_settings(&settings, binary, engine));
    let limiter = Arc::new(FixedWindowLimiter::new(
        settings.rate_limit_window,
        settings.rate_limit_max,
    ));

    let port = settings.port;
    let state = AppState {
        settings: Arc::new(settings),
        backends,
        limiter,
    };
    run_http_server(state, port).await;
    Ok(())
}
