// Wire types shared across the HTTP surface and backends.

use serde::{Deserialize, Serialize};

/// Body of `POST /api/synthesize`. Narrator and emotion fall back to the
/// configured default narrator and the neutral emotion when omitted.
#[derive(Debug, Clone, Deserialize)]
pub struct SynthesizeRequest {
    pub text: String,
    pub narrator: Option<String>,
    pub emotion: Option<String>,
    pub speed: Option<i32>,
    pub pitch: Option<i32>,
}

/// Fully resolved synthesis parameters, independent of which API surface the
/// request arrived on. Built per request and consumed immediately.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRequest {
    pub text: String,
    pub narrator: String,
    /// Emotion name, optionally carrying an `=intensity` suffix (0-100).
    pub emotion: String,
    pub speed: i32,
    pub pitch: i32,
}

/// One expressive style of a speaker, in the compat wire shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeakerStyle {
    pub name: String,
    pub id: i64,
    #[serde(rename = "type", default = "default_style_type")]
    pub style_type: String,
}

fn default_style_type() -> String {
    "talk".to_string()
}

/// Compat speaker entry: one narrator with its flat-id styles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Speaker {
    pub name: String,
    pub speaker_uuid: String,
    pub styles: Vec<SpeakerStyle>,
    #[serde(default)]
    pub version: String,
}

#[derive(Debug, Serialize)]
pub struct NarratorsResponse {
    pub narrators: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct EmotionsResponse {
    pub emotions: Vec<String>,
}
