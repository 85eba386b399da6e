// Flat style-id space over the (narrator, emotion) catalog.
//
// Ids are a pure function of the current catalog enumeration order and
// BASE_STYLE_ID: walking narrators in catalog order and emotions within each
// narrator in catalog order, each pair gets BASE + running count. Nothing is
// persisted, so a narrator added, removed, or reordered upstream silently
// shifts every id after it. That matches the engine this surface emulates;
// any future move to a stable scheme only has to touch this module.

use async_trait::async_trait;
use tracing::warn;
use uuid::Uuid;

use crate::error::AppError;
use crate::types::{Speaker, SpeakerStyle};

/// First flat style id. Chosen far away from the id ranges real engines hand
/// out so compat clients cannot confuse the two.
pub const BASE_STYLE_ID: i64 = 2_041_348_160;

/// Style label substituted when a narrator's emotion listing fails; the
/// narrator still occupies exactly one id slot so the numbering stays dense.
pub const FALLBACK_STYLE: &str = "normal";

const STYLE_TYPE: &str = "talk";
const SPEAKER_VERSION: &str = "1.0.0";

/// Where the catalog comes from. Implemented by the narrator binary and by
/// the backend router (so listings follow capability routing); tests script it.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn narrators(&self) -> Result<Vec<String>, AppError>;
    async fn emotions(&self, narrator: &str) -> Result<Vec<String>, AppError>;
}

/// List the full catalog in the compat wire shape, assigning flat ids in
/// enumeration order.
pub async fn build_speaker_catalog(source: &dyn CatalogSource) -> Result<Vec<Speaker>, AppError> {
    let mut speakers = Vec::new();
    let mut next_id = BASE_STYLE_ID;

    for narrator in source.narrators().await? {
        let emotions = match source.emotions(&narrator).await {
            Ok(emotions) => emotions,
            Err(e) => {
                warn!(narrator = %narrator, error = %e, "emotion listing failed, using fallback style");
                vec![FALLBACK_STYLE.to_string()]
            }
        };
        let styles = emotions
            .into_iter()
            .map(|name| {
                let style = SpeakerStyle {
                    name,
                    id: next_id,
                    style_type: STYLE_TYPE.to_string(),
                };
                next_id += 1;
                style
            })
            .collect();
        speakers.push(Speaker {
            speaker_uuid: speaker_uuid(&narrator),
            name: narrator,
            styles,
            version: SPEAKER_VERSION.to_string(),
        });
    }
    Ok(speakers)
}

/// Reverse-map a flat id to its (narrator, emotion) pair by replaying the
/// exact walk `build_speaker_catalog` performs. An unknown id is a normal
/// outcome, not a failure.
pub async fn resolve_style_id(
    source: &dyn CatalogSource,
    id: i64,
) -> Result<Option<(String, String)>, AppError> {
    let mut next_id = BASE_STYLE_ID;

    for narrator in source.narrators().await? {
        match source.emotions(&narrator).await {
            Ok(emotions) => {
                for emotion in emotions {
                    if next_id == id {
                        return Ok(Some((narrator, emotion)));
                    }
                    next_id += 1;
                }
            }
            // The failing narrator holds exactly one synthetic slot.
            Err(_) => {
                if next_id == id {
                    return Ok(Some((narrator, FALLBACK_STYLE.to_string())));
                }
                next_id += 1;
            }
        }
    }
    Ok(None)
}

/// Deterministic per-narrator UUID so repeated listings agree without any
/// stored state.
fn speaker_uuid(narrator: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, narrator.as_bytes()).to_string()
}
