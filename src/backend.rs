// Backend arbitration: each capability (list narrators, list emotions,
// synthesize) is routed to the local binary or the remote engine by a flag
// fixed at startup. A capability routed to a remote engine that was never
// configured fails every request with a configuration error; it never
// degrades to the local path.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use crate::config::Settings;
use crate::engine::EngineClient;
use crate::error::AppError;
use crate::speakers::CatalogSource;
use crate::types::NormalizedRequest;
use crate::voicepeak::VoicepeakBinary;

#[async_trait]
pub trait SynthesisBackend: Send + Sync {
    async fn list_narrators(&self) -> Result<Vec<String>, AppError>;
    async fn list_emotions(&self, narrator: &str) -> Result<Vec<String>, AppError>;
    async fn synthesize(&self, req: &NormalizedRequest) -> Result<Vec<u8>, AppError>;
}

pub struct LocalBackend {
    binary: Arc<VoicepeakBinary>,
}

#[async_trait]
impl SynthesisBackend for LocalBackend {
    async fn list_narrators(&self) -> Result<Vec<String>, AppError> {
        self.binary.list_narrators().await
    }

    async fn list_emotions(&self, narrator: &str) -> Result<Vec<String>, AppError> {
        self.binary.list_emotions(narrator).await
    }

    async fn synthesize(&self, req: &NormalizedRequest) -> Result<Vec<u8>, AppError> {
        self.binary.synthesize(req).await
    }
}

pub struct RemoteBackend {
    engine: Arc<EngineClient>,
}

#[async_trait]
impl SynthesisBackend for RemoteBackend {
    async fn list_narrators(&self) -> Result<Vec<String>, AppError> {
        let speakers = self.engine.speakers().await?;
        Ok(speakers.into_iter().map(|s| s.name).collect())
    }

    async fn list_emotions(&self, narrator: &str) -> Result<Vec<String>, AppError> {
        let speakers = self.engine.speakers().await?;
        let speaker = speakers.into_iter().find(|s| s.name == narrator).ok_or_else(|| {
            AppError::validation(
                &["path", "narrator"],
                format!("narrator \"{}\" not found on the engine", narrator),
            )
        })?;
        Ok(speaker.styles.into_iter().map(|st| st.name).collect())
    }

    async fn synthesize(&self, req: &NormalizedRequest) -> Result<Vec<u8>, AppError> {
        let style_id = self.engine.find_style(&req.narrator, &req.emotion).await?;
        let mut query = self.engine.audio_query(&req.text, style_id).await?;
        query.speed_scale = f64::from(req.speed) / 100.0;
        query.pitch_scale = f64::from(req.pitch) / 50.0;
        self.engine.synthesis(&query, style_id).await
    }
}

/// Stands in for a remote-routed capability whose engine URL is missing.
struct MisconfiguredBackend {
    capability: &'static str,
}

impl MisconfiguredBackend {
    fn fail(&self) -> AppError {
        AppError::Config(format!(
            "capability \"{}\" is routed to the remote engine but ENGINE_URL is not set",
            self.capability
        ))
    }
}

#[async_trait]
impl SynthesisBackend for MisconfiguredBackend {
    async fn list_narrators(&self) -> Result<Vec<String>, AppError> {
        Err(self.fail())
    }

    async fn list_emotions(&self, _narrator: &str) -> Result<Vec<String>, AppError> {
        Err(self.fail())
    }

    async fn synthesize(&self, _req: &NormalizedRequest) -> Result<Vec<u8>, AppError> {
        Err(self.fail())
    }
}

/// One backend per capability, fixed at startup.
pub struct BackendRouter {
    pub narrators: Arc<dyn SynthesisBackend>,
    pub emotions: Arc<dyn SynthesisBackend>,
    pub synthesis: Arc<dyn SynthesisBackend>,
}

impl BackendRouter {
    pub fn from_settings(
        settings: &Settings,
        binary: Arc<VoicepeakBinary>,
        engine: Option<Arc<EngineClient>>,
    ) -> Self {
        let pick = |remote: bool, capability: &'static str| -> Arc<dyn SynthesisBackend> {
            if remote {
                match &engine {
                    Some(engine) => {
                        info!(capability, "routing to remote engine");
                        Arc::new(RemoteBackend { engine: Arc::clone(engine) })
                    }
                    None => Arc::new(MisconfiguredBackend { capability }),
                }
            } else {
                Arc::new(LocalBackend { binary: Arc::clone(&binary) })
            }
        };

        BackendRouter {
            narrators: pick(settings.route_narrators_remote, "narrators"),
            emotions: pick(settings.route_emotions_remote, "emotions"),
            synthesis: pick(settings.route_synthesis_remote, "synthesis"),
        }
    }
}

// Listings for the flat id space follow the same capability routing as the
// list endpoints, so compat ids resolve against whichever catalog the client
// actually sees.
#[async_trait]
impl CatalogSource for BackendRouter {
    async fn narrators(&self) -> Result<Vec<String>, AppError> {
        self.narrators.list_narrators().await
    }

    async fn emotions(&self, narrator: &str) -> Result<Vec<String>, AppError> {
        self.emotions.list_emotions(narrator).await
    }
}
