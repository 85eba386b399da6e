// HTTP client for the remote synthesis engine.

use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use crate::error::AppError;
use crate::query::AudioQuery;
use crate::types::Speaker;

pub struct EngineClient {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl EngineClient {
    pub fn new(base_url: String, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(15))
            .build()
            .expect("Failed to create HTTP client");

        EngineClient {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        }
    }

    fn map_transport(&self, e: reqwest::Error) -> AppError {
        if e.is_connect() {
            AppError::EngineUnreachable(e.to_string())
        } else if e.is_timeout() {
            AppError::Timeout(self.timeout)
        } else {
            AppError::Backend(format!("engine request failed: {}", e))
        }
    }

    pub async fn speakers(&self) -> Result<Vec<Speaker>, AppError> {
        let url = format!("{}/speakers", self.base_url);
        let response = self.client.get(&url).send().await.map_err(|e| self.map_transport(e))?;
        if !response.status().is_success() {
            return Err(AppError::Backend(format!(
                "engine GET /speakers returned {}",
                response.status()
            )));
        }
        response
            .json::<Vec<Speaker>>()
            .await
            .map_err(|e| AppError::Backend(format!("engine speakers response: {}", e)))
    }

    pub async fn audio_query(&self, text: &str, speaker: i64) -> Result<AudioQuery, AppError> {
        let url = format!("{}/audio_query", self.base_url);
        debug!(speaker, "requesting engine audio query");
        let response = self
            .client
            .post(&url)
            .query(&[("text", text), ("speaker", &speaker.to_string())])
            .send()
            .await
            .map_err(|e| self.map_transport(e))?;
        if !response.status().is_success() {
            return Err(AppError::Backend(format!(
                "engine POST /audio_query returned {}",
                response.status()
            )));
        }
        response
            .json::<AudioQuery>()
            .await
            .map_err(|e| AppError::Backend(format!("engine audio query response: {}", e)))
    }

    pub async fn synthesis(&self, query: &AudioQuery, speaker: i64) -> Result<Vec<u8>, AppError> {
        let url = format!("{}/synthesis", self.base_url);
        debug!(speaker, "requesting engine synthesis");
        let response = self
            .client
            .post(&url)
            .query(&[("speaker", speaker.to_string())])
            .json(query)
            .send()
            .await
            .map_err(|e| self.map_transport(e))?;
        if !response.status().is_success() {
            return Err(AppError::Backend(format!(
                "engine POST /synthesis returned {}",
                response.status()
            )));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| AppError::Backend(format!("engine synthesis body: {}", e)))?;
        Ok(bytes.to_vec())
    }

    /// Locate a narrator/emotion pair in the engine's own speaker list and
    /// return the engine's style id. The list is fetched per call, never
    /// cached; the local flat id space is never sent to the engine. When the
    /// narrator exists but the emotion does not, its first style is used.
    pub async fn find_style(&self, narrator: &str, emotion: &str) -> Result<i64, AppError> {
        let speakers = self.speakers().await?;
        let speaker = speakers
            .iter()
            .find(|s| s.name == narrator)
            .ok_or_else(|| {
                AppError::validation(
                    &["body", "narrator"],
                    format!("narrator \"{}\" not found on the engine", narrator),
                )
            })?;

        // Request-side emotions can carry an `=intensity` suffix; match on the
        // base name.
        let base = emotion.split('=').next().unwrap_or(emotion);
        let style = speaker
            .styles
            .iter()
            .find(|st| st.name == base)
            .or_else(|| speaker.styles.first())
            .ok_or_else(|| {
                AppError::Backend(format!("engine speaker \"{}\" has no styles", narrator))
            })?;
        Ok(style.id)
    }
}
