// HTTP server exposing the native API under /api and the engine-compatible
// surface at the root.

use axum::{
    extract::{ConnectInfo, Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::backend::BackendRouter;
use crate::config::Settings;
use crate::error::AppError;
use crate::query::{
    self, synthetic_audio_query, AudioQuery, SynthesisPayload, DEFAULT_PITCH, DEFAULT_SPEED,
};
use crate::rate_limit::FixedWindowLimiter;
use crate::speakers::{self, FALLBACK_STYLE};
use crate::types::{
    EmotionsResponse, NarratorsResponse, NormalizedRequest, Speaker, SynthesizeRequest,
};

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub backends: Arc<BackendRouter>,
    pub limiter: Arc<FixedWindowLimiter>,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(root))
        .route("/api/health", get(health))
        // Native surface
        .route("/api/narrators", get(list_narrators))
        .route("/api/emotions", get(list_emotions_default))
        .route("/api/emotions/:narrator", get(list_emotions))
        .route("/api/synthesize", post(synthesize))
        // Engine-compatible surface
        .route("/speakers", get(list_speakers))
        .route("/audio_query", post(audio_query))
        .route("/synthesis", post(synthesis))
        .route("/docs", get(docs))
        .layer(cors)
        .with_state(state)
}

pub async fn run_http_server(state: AppState, port: u16) {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = build_router(state);
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            error!(%addr, error = %e, "failed to bind HTTP server");
            return;
        }
    };
    info!(%addr, "listening");
    if let Err(e) = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    {
        error!(error = %e, "HTTP server error");
    }
}

fn check_rate(state: &AppState, addr: &SocketAddr) -> Result<(), AppError> {
    state.limiter.check(&addr.ip().to_string(), Instant::now())
}

fn wav_response(bytes: Vec<u8>) -> Response {
    ([(header::CONTENT_TYPE, "audio/wav")], bytes).into_response()
}

async fn root() -> impl IntoResponse {
    Json(serde_json::json!({
        "name": "voicebridge",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "endpoints": {
            "native": {
                "narrators": "GET /api/narrators",
                "emotions": "GET /api/emotions[/:narrator]",
                "synthesize": "POST /api/synthesize"
            },
            "compat": {
                "speakers": "GET /speakers",
                "audio_query": "POST /audio_query?text=&speaker=",
                "synthesis": "POST /synthesis?speaker="
            },
            "docs": "GET /docs"
        }
    }))
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn list_narrators(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> Result<Response, AppError> {
    check_rate(&state, &addr)?;
    let narrators = state.backends.narrators.list_narrators().await?;
    Ok(Json(NarratorsResponse { narrators }).into_response())
}

async fn list_emotions_default(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> Result<Response, AppError> {
    check_rate(&state, &addr)?;
    let narrator = default_narrator(&state).await?;
    let emotions = state.backends.emotions.list_emotions(&narrator).await?;
    Ok(Json(EmotionsResponse { emotions }).into_response())
}

async fn list_emotions(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(narrator): Path<String>,
) -> Result<Response, AppError> {
    check_rate(&state, &addr)?;
    let emotions = state.backends.emotions.list_emotions(&narrator).await?;
    Ok(Json(EmotionsResponse { emotions }).into_response())
}

/// Narrator used when a request names none: the configured default, falling
/// back to the first narrator in catalog order.
async fn default_narrator(state: &AppState) -> Result<String, AppError> {
    if let Some(narrator) = &state.settings.default_narrator {
        return Ok(narrator.clone());
    }
    state
        .backends
        .narrators
        .list_narrators()
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| AppError::validation(&["body", "narrator"], "no narrators available"))
}

async fn synthesize(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(body): Json<serde_json::Value>,
) -> Result<Response, AppError> {
    check_rate(&state, &addr)?;
    let req: SynthesizeRequest = serde_json::from_value(body)
        .map_err(|e| AppError::validation(&["body"], e.to_string()))?;
    query::validate_text(&req.text, &["body", "text"])?;
    let speed = query::validate_speed(req.speed.unwrap_or(DEFAULT_SPEED), &["body", "speed"])?;
    let pitch = query::validate_pitch(req.pitch.unwrap_or(DEFAULT_PITCH), &["body", "pitch"])?;

    let narrator = match req.narrator {
        Some(narrator) => narrator,
        None => default_narrator(&state).await?,
    };
    let emotion = resolve_emotion(&state, &narrator, req.emotion).await?;

    let normalized = NormalizedRequest {
        text: req.text,
        narrator,
        emotion,
        speed,
        pitch,
    };
    let bytes = state.backends.synthesis.synthesize(&normalized).await?;
    Ok(wav_response(bytes))
}

/// Validate a requested emotion against the narrator's catalog (matching on
/// the base name so an `=intensity` suffix passes through), or pick the
/// narrator's first emotion when none was requested.
async fn resolve_emotion(
    state: &AppState,
    narrator: &str,
    requested: Option<String>,
) -> Result<String, AppError> {
    let emotions = state.backends.emotions.list_emotions(narrator).await?;
    match requested {
        Some(emotion) => {
            let base = emotion.split('=').next().unwrap_or(&emotion);
            if emotions.iter().any(|e| e == base) {
                Ok(emotion)
            } else {
                Err(AppError::validation(
                    &["body", "emotion"],
                    format!("emotion \"{}\" is not available for narrator \"{}\"", base, narrator),
                ))
            }
        }
        None => Ok(emotions
            .into_iter()
            .next()
            .unwrap_or_else(|| FALLBACK_STYLE.to_string())),
    }
}

async fn list_speakers(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> Result<Response, AppError> {
    check_rate(&state, &addr)?;
    let speakers: Vec<Speaker> = speakers::build_speaker_catalog(&*state.backends).await?;
    Ok(Json(speakers).into_response())
}

async fn audio_query(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, AppError> {
    check_rate(&state, &addr)?;
    let text = params
        .get("text")
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::validation(&["query", "text"], "field required"))?;
    query::validate_text(text, &["query", "text"])?;
    let speaker = parse_speaker(&params)?;

    // The query itself carries no narrator; resolving here rejects unknown
    // ids before the client proceeds to /synthesis.
    if speakers::resolve_style_id(&*state.backends, speaker)
        .await?
        .is_none()
    {
        return Err(AppError::UnknownSpeaker(speaker));
    }

    let query: AudioQuery = synthetic_audio_query(text, DEFAULT_SPEED, DEFAULT_PITCH);
    Ok(Json(query).into_response())
}

async fn synthesis(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Query(params): Query<HashMap<String, String>>,
    Json(body): Json<serde_json::Value>,
) -> Result<Response, AppError> {
    check_rate(&state, &addr)?;
    let speaker = parse_speaker(&params)?;
    let (narrator, emotion) = speakers::resolve_style_id(&*state.backends, speaker)
        .await?
        .ok_or(AppError::UnknownSpeaker(speaker))?;

    let payload: SynthesisPayload = serde_json::from_value(body).map_err(|_| {
        AppError::validation(&["body"], "body must be an audio query or {text, speed, pitch}")
    })?;
    let (text, speed, pitch) = query::normalize_payload(&payload)?;

    let normalized = NormalizedRequest {
        text,
        narrator,
        emotion,
        speed,
        pitch,
    };
    let bytes = state.backends.synthesis.synthesize(&normalized).await?;
    Ok(wav_response(bytes))
}

fn parse_speaker(params: &HashMap<String, String>) -> Result<i64, AppError> {
    params
        .get("speaker")
        .ok_or_else(|| AppError::validation(&["query", "speaker"], "field required"))?
        .parse::<i64>()
        .map_err(|_| AppError::validation(&["query", "speaker"], "speaker must be an integer"))
}

async fn docs() -> impl IntoResponse {
    Json(serde_json::json!({
        "openapi": "3.0.0",
        "info": {
            "title": "voicebridge",
            "version": env!("CARGO_PKG_VERSION")
        },
        "paths": {
            "/api/narrators": { "get": { "summary": "List narrators" } },
            "/api/emotions": { "get": { "summary": "List emotions for the default narrator" } },
            "/api/emotions/{narrator}": { "get": { "summary": "List emotions for a narrator" } },
            "/api/synthesize": { "post": { "summary": "Synthesize speech (native shape)" } },
            "/speakers": { "get": { "summary": "List speakers (compat shape)" } },
            "/audio_query": { "post": { "summary": "Build an audio query for a text" } },
            "/synthesis": { "post": { "summary": "Synthesize speech from an audio query" } }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SynthesisBackend;
    use crate::speakers::BASE_STYLE_ID;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use std::path::PathBuf;
    use std::time::Duration;
    use tower::ServiceExt;

    struct StubBackend;

    #[async_trait::async_trait]
    impl SynthesisBackend for StubBackend {
        async fn list_narrators(&self) -> Result<Vec<String>, AppError> {
            Ok(vec!["Miyamai Moca".to_string()])
        }

        async fn list_emotions(&self, _narrator: &str) -> Result<Vec<String>, AppError> {
            Ok(vec!["honwaka".to_string(), "fun".to_string()])
        }

        async fn synthesize(&self, _req: &NormalizedRequest) -> Result<Vec<u8>, AppError> {
            Ok(b"RIFFfake".to_vec())
        }
    }

    fn test_state(rate_limit_max: u32) -> AppState {
        let stub: Arc<dyn SynthesisBackend> = Arc::new(StubBackend);
        let settings = Settings {
            port: 0,
            voicepeak_bin: PathBuf::from("/nonexistent/voicepeak"),
            voicepeak_dir: PathBuf::from("/nonexistent"),
            temp_dir: std::env::temp_dir(),
            process_timeout: Duration::from_secs(1),
            default_narrator: None,
            engine_url: None,
            engine_timeout: Duration::from_secs(1),
            route_narrators_remote: false,
            route_emotions_remote: false,
            route_synthesis_remote: false,
            rate_limit_window: Duration::from_secs(60),
            rate_limit_max,
        };
        AppState {
            settings: Arc::new(settings),
            backends: Arc::new(BackendRouter {
                narrators: Arc::clone(&stub),
                emotions: Arc::clone(&stub),
                synthesis: stub,
            }),
            limiter: Arc::new(FixedWindowLimiter::new(Duration::from_secs(60), rate_limit_max)),
        }
    }

    fn request(method: &str, uri: &str, body: Option<serde_json::Value>) -> Request<Body> {
        let builder = Request::builder().method(method).uri(uri);
        let mut req = match body {
            Some(v) => builder
                .header("content-type", "application/json")
                .body(Body::from(v.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 40000))));
        req
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn speakers_lists_flat_ids() {
        let app = build_router(test_state(60));
        let response = app.oneshot(request("GET", "/speakers", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json[0]["name"], "Miyamai Moca");
        assert_eq!(json[0]["styles"][0]["id"], BASE_STYLE_ID);
        assert_eq!(json[0]["styles"][1]["id"], BASE_STYLE_ID + 1);
    }

    #[tokio::test]
    async fn audio_query_missing_text_gives_envelope() {
        let app = build_router(test_state(60));
        let uri = format!("/audio_query?speaker={}", BASE_STYLE_ID);
        let response = app.oneshot(request("POST", &uri, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let json = body_json(response).await;
        assert_eq!(json["detail"][0]["loc"][0], "query");
        assert_eq!(json["detail"][0]["loc"][1], "text");
        assert_eq!(json["detail"][0]["msg"], "field required");
    }

    #[tokio::test]
    async fn audio_query_unknown_speaker_is_422() {
        let app = build_router(test_state(60));
        let response = app
            .oneshot(request("POST", "/audio_query?text=test&speaker=99999", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let json = body_json(response).await;
        assert_eq!(json["detail"][0]["type"], "value_error.speaker");
    }

    #[tokio::test]
    async fn audio_query_returns_one_mora_per_character() {
        let app = build_router(test_state(60));
        let uri = format!("/audio_query?text=abc&speaker={}", BASE_STYLE_ID);
        let response = app.oneshot(request("POST", &uri, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["accent_phrases"][0]["moras"].as_array().unwrap().len(), 3);
        assert_eq!(json["speedScale"], 1.0);
    }

    #[tokio::test]
    async fn synthesis_resolves_speaker_and_returns_wav() {
        let app = build_router(test_state(60));
        let uri = format!("/synthesis?speaker={}", BASE_STYLE_ID + 1);
        let body = serde_json::json!({"text": "やあ", "speed": 120, "pitch": -10});
        let response = app.oneshot(request("POST", &uri, Some(body))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "audio/wav"
        );
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"RIFFfake");
    }

    #[tokio::test]
    async fn synthesis_rejects_malformed_body_with_envelope() {
        let app = build_router(test_state(60));
        let uri = format!("/synthesis?speaker={}", BASE_STYLE_ID);
        let body = serde_json::json!({"accent_phrases": "invalid"});
        let response = app.oneshot(request("POST", &uri, Some(body))).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let json = body_json(response).await;
        assert_eq!(json["detail"][0]["type"], "value_error");
    }

    #[tokio::test]
    async fn api_synthesize_rejects_unknown_emotion() {
        let app = build_router(test_state(60));
        let body = serde_json::json!({"text": "テスト", "emotion": "invalid_emotion_name"});
        let response = app
            .oneshot(request("POST", "/api/synthesize", Some(body)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let json = body_json(response).await;
        assert_eq!(json["detail"][0]["loc"][1], "emotion");
    }

    #[tokio::test]
    async fn api_synthesize_defaults_to_first_narrator_and_emotion() {
        let app = build_router(test_state(60));
        let body = serde_json::json!({"text": "こんにちは"});
        let response = app
            .oneshot(request("POST", "/api/synthesize", Some(body)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "audio/wav"
        );
    }

    #[tokio::test]
    async fn requests_over_the_limit_get_429() {
        let app = build_router(test_state(1));
        let first = app
            .clone()
            .oneshot(request("GET", "/api/narrators", None))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);
        let second = app
            .oneshot(request("GET", "/api/narrators", None))
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        let json = body_json(second).await;
        assert_eq!(json["detail"][0]["type"], "rate_limit");
    }

    #[tokio::test]
    async fn health_and_docs_are_open() {
        let app = build_router(test_state(0));
        let health = app
            .clone()
            .oneshot(request("GET", "/api/health", None))
            .await
            .unwrap();
        assert_eq!(health.status(), StatusCode::OK);
        let docs = app.oneshot(request("GET", "/docs", None)).await.unwrap();
        assert_eq!(docs.status(), StatusCode::OK);
    }
}
