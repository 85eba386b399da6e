// Adapter for the local narrator binary: catalog listing and synthesis.
//
// Every call spawns the binary fresh; nothing is cached, so two calls made
// back to back can observe different catalogs if voices are installed or
// removed in between. That race is accepted, not guarded against.

use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::Settings;
use crate::error::AppError;
use crate::query::build_say_args;
use crate::speakers::CatalogSource;
use crate::types::NormalizedRequest;

/// Substring of the startup banner the binary prints on stdout before the
/// actual listing; any line containing it is dropped from parsed output.
const BANNER_MARKER: &str = "Runtime";

#[derive(Debug, Clone)]
pub struct VoicepeakBinary {
    bin: PathBuf,
    work_dir: PathBuf,
    temp_dir: PathBuf,
    timeout: std::time::Duration,
}

impl VoicepeakBinary {
    pub fn new(settings: &Settings) -> Self {
        VoicepeakBinary {
            bin: settings.voicepeak_bin.clone(),
            work_dir: settings.voicepeak_dir.clone(),
            temp_dir: settings.temp_dir.clone(),
            timeout: settings.process_timeout,
        }
    }

    /// Spawn the binary with the given arguments and wait for it, bounded by
    /// the configured timeout. The child is killed if the bound expires.
    async fn run(&self, args: &[String]) -> Result<std::process::Output, AppError> {
        debug!(bin = %self.bin.display(), ?args, "spawning narrator binary");
        let mut cmd = Command::new(&self.bin);
        cmd.args(args)
            .current_dir(&self.work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match timeout(self.timeout, cmd.output()).await {
            Ok(result) => result.map_err(|e| {
                AppError::Backend(format!("failed to spawn {}: {}", self.bin.display(), e))
            })?,
            Err(_) => return Err(AppError::Timeout(self.timeout)),
        };

        if !output.status.success() {
            return Err(AppError::Backend(format!(
                "{} exited with {}: {}",
                self.bin.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(output)
    }

    pub async fn list_narrators(&self) -> Result<Vec<String>, AppError> {
        let output = self.run(&["--list-narrator".to_string()]).await?;
        Ok(parse_listing(&String::from_utf8_lossy(&output.stdout)))
    }

    pub async fn list_emotions(&self, narrator: &str) -> Result<Vec<String>, AppError> {
        let output = self
            .run(&["--list-emotion".to_string(), narrator.to_string()])
            .await?;
        Ok(parse_listing(&String::from_utf8_lossy(&output.stdout)))
    }

    /// Synthesize to a per-request output file and return its bytes. The file
    /// is deleted afterwards; deletion failure is logged, never escalated.
    pub async fn synthesize(&self, req: &NormalizedRequest) -> Result<Vec<u8>, AppError> {
        let out_path = self.temp_dir.join(format!("vp_{}.wav", Uuid::new_v4()));
        let args = build_say_args(req, &out_path);

        let result = self.run(&args).await;
        let bytes = match result {
            Ok(_) => match tokio::fs::read(&out_path).await {
                Ok(bytes) => Ok(bytes),
                // Zero exit but nothing on disk: the binary reported success
                // without producing audio. Distinct from an invocation failure.
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(AppError::NoOutput),
                Err(e) => Err(AppError::Backend(format!(
                    "failed to read synthesis output: {}",
                    e
                ))),
            },
            Err(e) => Err(e),
        };

        if let Err(e) = tokio::fs::remove_file(&out_path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %out_path.display(), error = %e, "failed to delete synthesis artifact");
            }
        }
        bytes
    }
}

fn parse_listing(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.contains(BANNER_MARKER))
        .map(str::to_string)
        .collect()
}

#[async_trait::async_trait]
impl CatalogSource for VoicepeakBinary {
    async fn narrators(&self) -> Result<Vec<String>, AppError> {
        self.list_narrators().await
    }

    async fn emotions(&self, narrator: &str) -> Result<Vec<String>, AppError> {
        self.list_emotions(narrator).await
    }
}
