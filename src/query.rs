// Schema translation between the native parameter model and the compat
// audio-query model, plus the argument list for the narrator binary.
//
// The compat engine expresses speed and pitch as scale factors (1.0 = neutral
// speed, 0.0 = neutral pitch); the binary takes integers (100 / 0). The fixed
// linear conversions are speed = round(speedScale * 100) and
// pitch = round(pitchScale * 50).

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::config::MAX_TEXT_CHARS;
use crate::error::AppError;
use crate::types::NormalizedRequest;

pub const DEFAULT_SPEED: i32 = 100;
pub const DEFAULT_PITCH: i32 = 0;
pub const MIN_SPEED: i32 = 50;
pub const MAX_SPEED: i32 = 200;
pub const MIN_PITCH: i32 = -50;
pub const MAX_PITCH: i32 = 50;
/// Applied when an emotion carries no embedded `=value` suffix.
pub const DEFAULT_INTENSITY: u32 = 50;

const OUTPUT_SAMPLING_RATE: u32 = 48_000;
const MORA_VOWEL_LENGTH: f64 = 0.1;
const MORA_PITCH: f64 = 5.0;
const PHONEME_SILENCE: f64 = 0.1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mora {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consonant: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consonant_length: Option<f64>,
    pub vowel: String,
    pub vowel_length: f64,
    pub pitch: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccentPhrase {
    pub moras: Vec<Mora>,
    pub accent: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pause_mora: Option<Mora>,
    #[serde(default)]
    pub is_interrogative: bool,
}

/// Compat audio-query object. Field names follow the engine's wire format:
/// `accent_phrases` stays snake_case while the scale factors are camelCase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioQuery {
    pub accent_phrases: Vec<AccentPhrase>,
    #[serde(rename = "speedScale")]
    pub speed_scale: f64,
    #[serde(rename = "pitchScale")]
    pub pitch_scale: f64,
    #[serde(rename = "intonationScale")]
    pub intonation_scale: f64,
    #[serde(rename = "volumeScale")]
    pub volume_scale: f64,
    #[serde(rename = "prePhonemeLength")]
    pub pre_phoneme_length: f64,
    #[serde(rename = "postPhonemeLength")]
    pub post_phoneme_length: f64,
    #[serde(rename = "outputSamplingRate")]
    pub output_sampling_rate: u32,
    #[serde(rename = "outputStereo")]
    pub output_stereo: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kana: Option<String>,
}

/// Simplified synthesis body some compat clients send instead of a full
/// audio query.
#[derive(Debug, Clone, Deserialize)]
pub struct SimpleQuery {
    pub text: String,
    #[serde(default = "default_speed")]
    pub speed: i32,
    #[serde(default)]
    pub pitch: i32,
}

fn default_speed() -> i32 {
    DEFAULT_SPEED
}

/// Body of `POST /synthesis`: either a full audio query or the simple shape.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SynthesisPayload {
    Query(AudioQuery),
    Simple(SimpleQuery),
}

pub fn validate_text(text: &str, loc: &[&str]) -> Result<(), AppError> {
    if text.trim().is_empty() {
        return Err(AppError::validation(loc, "text must not be empty"));
    }
    let chars = text.chars().count();
    if chars > MAX_TEXT_CHARS {
        return Err(AppError::validation(
            loc,
            format!("text is {} characters, the maximum is {}", chars, MAX_TEXT_CHARS),
        ));
    }
    Ok(())
}

pub fn validate_speed(speed: i32, loc: &[&str]) -> Result<i32, AppError> {
    if speed < MIN_SPEED {
        return Err(AppError::validation(
            loc,
            format!("speed {} is below the minimum of {}", speed, MIN_SPEED),
        ));
    }
    if speed > MAX_SPEED {
        return Err(AppError::validation(
            loc,
            format!("speed {} is above the maximum of {}", speed, MAX_SPEED),
        ));
    }
    Ok(speed)
}

pub fn validate_pitch(pitch: i32, loc: &[&str]) -> Result<i32, AppError> {
    if pitch < MIN_PITCH {
        return Err(AppError::validation(
            loc,
            format!("pitch {} is below the minimum of {}", pitch, MIN_PITCH),
        ));
    }
    if pitch > MAX_PITCH {
        return Err(AppError::validation(
            loc,
            format!("pitch {} is above the maximum of {}", pitch, MAX_PITCH),
        ));
    }
    Ok(pitch)
}

/// Reduce a synthesis payload to the (text, speed, pitch) triple the backends
/// work with. Structured queries take text from the `kana` transliteration
/// when present, otherwise from the mora texts in order.
pub fn normalize_payload(payload: &SynthesisPayload) -> Result<(String, i32, i32), AppError> {
    match payload {
        SynthesisPayload::Simple(s) => {
            validate_text(&s.text, &["body", "text"])?;
            let speed = validate_speed(s.speed, &["body", "speed"])?;
            let pitch = validate_pitch(s.pitch, &["body", "pitch"])?;
            Ok((s.text.clone(), speed, pitch))
        }
        SynthesisPayload::Query(q) => {
            let text = match q.kana.as_deref().filter(|k| !k.is_empty()) {
                Some(kana) => kana.to_string(),
                None => q
                    .accent_phrases
                    .iter()
                    .flat_map(|p| p.moras.iter())
                    .map(|m| m.text.as_str())
                    .collect(),
            };
            validate_text(&text, &["body", "accent_phrases"])?;
            let speed = validate_speed(
                (q.speed_scale * f64::from(DEFAULT_SPEED)).round() as i32,
                &["body", "speedScale"],
            )?;
            let pitch = validate_pitch(
                (q.pitch_scale * f64::from(MAX_PITCH)).round() as i32,
                &["body", "pitchScale"],
            )?;
            Ok((text, speed, pitch))
        }
    }
}

/// Argument list for one `--say` invocation of the narrator binary.
///
/// Speed and pitch flags are appended only when they differ from the neutral
/// defaults: the binary treats the presence of an optional flag as an
/// override, so default-valued flags would still change its behavior.
pub fn build_say_args(req: &NormalizedRequest, out_path: &Path) -> Vec<String> {
    let emotion = if req.emotion.contains('=') {
        req.emotion.clone()
    } else {
        format!("{}={}", req.emotion, DEFAULT_INTENSITY)
    };

    let mut args = vec![
        "--say".to_string(),
        req.text.clone(),
        "--out".to_string(),
        out_path.to_string_lossy().into_owned(),
        "--narrator".to_string(),
        req.narrator.clone(),
        "--emotion".to_string(),
        emotion,
    ];
    if req.speed != DEFAULT_SPEED {
        args.push("--speed".to_string());
        args.push(req.speed.to_string());
    }
    if req.pitch != DEFAULT_PITCH {
        args.push("--pitch".to_string());
        args.push(req.pitch.to_string());
    }
    args
}

/// Build a structurally valid audio query for the given text: one mora per
/// character with fixed duration and pitch, a single accent phrase, accent on
/// the first mora. A stand-in, not a phonetic analysis; clients get a correct
/// shape but no real prosody.
pub fn synthetic_audio_query(text: &str, speed: i32, pitch: i32) -> AudioQuery {
    let moras = text
        .chars()
        .map(|c| Mora {
            text: c.to_string(),
            consonant: None,
            consonant_length: None,
            vowel: c.to_string(),
            vowel_length: MORA_VOWEL_LENGTH,
            pitch: MORA_PITCH,
        })
        .collect();
    let is_interrogative = text.contains('?') || text.contains('？');

    AudioQuery {
        accent_phrases: vec![AccentPhrase {
            moras,
            accent: 1,
            pause_mora: None,
            is_interrogative,
        }],
        speed_scale: f64::from(speed) / f64::from(DEFAULT_SPEED),
        pitch_scale: f64::from(pitch) / f64::from(MAX_PITCH),
        intonation_scale: 1.0,
        volume_scale: 1.0,
        pre_phoneme_length: PHONEME_SILENCE,
        post_phoneme_length: PHONEME_SILENCE,
        output_sampling_rate: OUTPUT_SAMPLING_RATE,
        output_stereo: false,
        kana: Some(text.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalized(text: &str, speed: i32, pitch: i32) -> NormalizedRequest {
        NormalizedRequest {
            text: text.to_string(),
            narrator: "Miyamai Moca".to_string(),
            emotion: "honwaka".to_string(),
            speed,
            pitch,
        }
    }

    #[test]
    fn simple_payload_passes_values_through() {
        let payload = SynthesisPayload::Simple(SimpleQuery {
            text: "こんにちは".to_string(),
            speed: 120,
            pitch: -10,
        });
        let (text, speed, pitch) = normalize_payload(&payload).unwrap();
        assert_eq!(text, "こんにちは");
        assert_eq!(speed, 120);
        assert_eq!(pitch, -10);
    }

    #[test]
    fn structured_payload_converts_scales() {
        let mut q = synthetic_audio_query("テスト", DEFAULT_SPEED, DEFAULT_PITCH);
        q.speed_scale = 1.5;
        q.pitch_scale = 0.4;
        let (text, speed, pitch) = normalize_payload(&SynthesisPayload::Query(q)).unwrap();
        assert_eq!(text, "テスト");
        assert_eq!(speed, 150);
        assert_eq!(pitch, 20);
    }

    #[test]
    fn structured_payload_rebuilds_text_from_moras_when_kana_absent() {
        let mut q = synthetic_audio_query("あいう", DEFAULT_SPEED, DEFAULT_PITCH);
        q.kana = None;
        let (text, _, _) = normalize_payload(&SynthesisPayload::Query(q)).unwrap();
        assert_eq!(text, "あいう");
    }

    #[test]
    fn speed_bound_violations_name_the_bound() {
        let err = validate_speed(30, &["body", "speed"]).unwrap_err();
        assert!(err.to_string().contains("below the minimum of 50"), "{err}");
        let err = validate_speed(250, &["body", "speed"]).unwrap_err();
        assert!(err.to_string().contains("above the maximum of 200"), "{err}");
        assert_eq!(validate_speed(50, &[]).unwrap(), 50);
        assert_eq!(validate_speed(200, &[]).unwrap(), 200);
    }

    #[test]
    fn pitch_bound_violations_name_the_bound() {
        let err = validate_pitch(60, &["body", "pitch"]).unwrap_err();
        assert!(err.to_string().contains("above the maximum of 50"), "{err}");
        let err = validate_pitch(-60, &["body", "pitch"]).unwrap_err();
        assert!(err.to_string().contains("below the minimum of -50"), "{err}");
    }

    #[test]
    fn out_of_range_scales_are_rejected() {
        let mut q = synthetic_audio_query("あ", DEFAULT_SPEED, DEFAULT_PITCH);
        q.speed_scale = 0.3; // rounds to 30
        let err = normalize_payload(&SynthesisPayload::Query(q)).unwrap_err();
        assert!(err.to_string().contains("speed 30"), "{err}");
    }

    #[test]
    fn say_args_omit_neutral_speed_and_pitch() {
        let args = build_say_args(&normalized("やあ", 100, 0), Path::new("/tmp/out.wav"));
        assert!(!args.contains(&"--speed".to_string()));
        assert!(!args.contains(&"--pitch".to_string()));
        assert_eq!(args[0], "--say");
        assert_eq!(args[1], "やあ");
    }

    #[test]
    fn say_args_include_non_default_speed_and_pitch() {
        let args = build_say_args(&normalized("やあ", 150, -20), Path::new("/tmp/out.wav"));
        let speed_at = args.iter().position(|a| a == "--speed").unwrap();
        assert_eq!(args[speed_at + 1], "150");
        let pitch_at = args.iter().position(|a| a == "--pitch").unwrap();
        assert_eq!(args[pitch_at + 1], "-20");
    }

    #[test]
    fn say_args_default_emotion_intensity_to_50() {
        let args = build_say_args(&normalized("やあ", 100, 0), Path::new("/tmp/out.wav"));
        let at = args.iter().position(|a| a == "--emotion").unwrap();
        assert_eq!(args[at + 1], "honwaka=50");

        let mut req = normalized("やあ", 100, 0);
        req.emotion = "fun=80".to_string();
        let args = build_say_args(&req, Path::new("/tmp/out.wav"));
        let at = args.iter().position(|a| a == "--emotion").unwrap();
        assert_eq!(args[at + 1], "fun=80");
    }

    #[test]
    fn synthetic_query_has_one_mora_per_character() {
        let q = synthetic_audio_query("こんにちは", 100, 0);
        assert_eq!(q.accent_phrases.len(), 1);
        assert_eq!(q.accent_phrases[0].moras.len(), 5);
        assert_eq!(q.accent_phrases[0].accent, 1);
        assert!(!q.accent_phrases[0].is_interrogative);
        assert_eq!(q.speed_scale, 1.0);
        assert_eq!(q.pitch_scale, 0.0);
    }

    #[test]
    fn synthetic_query_detects_both_question_marks() {
        assert!(synthetic_audio_query("いいの？", 100, 0).accent_phrases[0].is_interrogative);
        assert!(synthetic_audio_query("really?", 100, 0).accent_phrases[0].is_interrogative);
        assert!(!synthetic_audio_query("はい", 100, 0).accent_phrases[0].is_interrogative);
    }

    #[test]
    fn audio_query_uses_compat_field_names() {
        let q = synthetic_audio_query("あ", 120, -10);
        let json = serde_json::to_value(&q).unwrap();
        assert!(json.get("speedScale").is_some());
        assert!(json.get("pitchScale").is_some());
        assert!(json.get("outputSamplingRate").is_some());
        assert!(json.get("accent_phrases").is_some());
        assert!((json["speedScale"].as_f64().unwrap() - 1.2).abs() < 1e-9);
    }

    #[test]
    fn synthesis_payload_parses_both_shapes() {
        let simple: SynthesisPayload =
            serde_json::from_value(serde_json::json!({"text": "やあ", "speed": 120})).unwrap();
        assert!(matches!(simple, SynthesisPayload::Simple(_)));

        let full = serde_json::to_value(synthetic_audio_query("やあ", 100, 0)).unwrap();
        let parsed: SynthesisPayload = serde_json::from_value(full).unwrap();
        assert!(matches!(parsed, SynthesisPayload::Query(_)));
    }

    #[test]
    fn empty_and_oversized_text_rejected() {
        assert!(validate_text("", &["body", "text"]).is_err());
        assert!(validate_text("   ", &["body", "text"]).is_err());
        let long = "あ".repeat(1001);
        let err = validate_text(&long, &["body", "text"]).unwrap_err();
        assert!(err.to_string().contains("1001"), "{err}");
        assert!(validate_text(&"あ".repeat(1000), &["body", "text"]).is_ok());
    }
}
