use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use tokio::process::Command;
use tracing::{debug, error, info};

use crate::config::TtsConfig;
use crate::error::PipelineError;
use crate::utils::{collapse_whitespace, remove_file_quietly, take_chars};

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Narrate `text` into an audio file at `out_path` and return its path.
    async fn synthesize(&self, text: &str, out_path: &Path) -> Result<PathBuf, PipelineError>;
}

/// Signed percentage offset from a 1.0 baseline: 1.2 -> "+20%", 0.8 -> "-20%".
pub fn percent_offset(factor: f64) -> String {
    let percent = ((factor - 1.0) * 100.0).round() as i64;
    if percent >= 0 {
        format!("+{percent}%")
    } else {
        format!("{percent}%")
    }
}

static BOLD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*\*(.*?)\*\*").expect("valid regex"));
static ITALIC: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*(.*?)\*").expect("valid regex"));
static STRIKE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"~~(.*?)~~").expect("valid regex"));
static CODE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"`(.*?)`").expect("valid regex"));
static URL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"https?://\S+").expect("valid regex"));

/// Drop markdown and URLs and characters the speech engine trips over.
pub fn clean_for_speech(text: &str) -> String {
    let text = BOLD.replace_all(text, "$1");
    let text = ITALIC.replace_all(&text, "$1");
    let text = STRIKE.replace_all(&text, "$1");
    let text = CODE.replace_all(&text, "$1");
    let text = URL.replace_all(&text, "");
    let text = text
        .replace('&', "and")
        .replace(['<', '>', '"', '\''], "");
    collapse_whitespace(&text)
}

/// Narration through the `edge-tts` command line tool.
pub struct EdgeTts {
    config: TtsConfig,
}

impl EdgeTts {
    pub fn new(config: TtsConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl SpeechSynthesizer for EdgeTts {
    async fn synthesize(&self, text: &str, out_path: &Path) -> Result<PathBuf, PipelineError> {
        info!("Generating TTS audio for text: {}...", take_chars(text, 50));

        let text_file = out_path.with_extension("txt");
        tokio::fs::write(&text_file, clean_for_speech(text))
            .await
            .map_err(|e| PipelineError::Synthesis(format!("cannot write text file: {e}")))?;

        let rate = percent_offset(self.config.speed);
        let volume = percent_offset(self.config.volume);
        debug!(voice = %self.config.voice, %rate, %volume, "Calling {}", self.config.command);

        let result = Command::new(&self.config.command)
            .arg("--file")
            .arg(&text_file)
            .args(["--voice", &self.config.voice])
            .arg(format!("--rate={rate}"))
            .arg(format!("--volume={volume}"))
            .arg("--write-media")
            .arg(out_path)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await;
        remove_file_quietly(&text_file);

        let output = result.map_err(|e| {
            PipelineError::Synthesis(format!("failed to spawn {}: {e}", self.config.command))
        })?;

        if !output.status.success() || !out_path.exists() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            error!("TTS generation failed for {}: {}", out_path.display(), stderr.trim());
            remove_file_quietly(out_path);
            return Err(PipelineError::Synthesis(format!(
                "{} exited with {}",
                self.config.command, output.status
            )));
        }

        info!("TTS audio generated successfully: {}", out_path.display());
        Ok(out_path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_signed_offsets() {
        assert_eq!(percent_offset(1.0), "+0%");
        assert_eq!(percent_offset(1.2), "+20%");
        assert_eq!(percent_offset(0.8), "-20%");
        assert_eq!(percent_offset(1.5), "+50%");
    }

    #[test]
    fn strips_markdown_and_urls() {
        let cleaned = clean_for_speech(
            "**Bold** and *soft* ~~gone~~ `code` see https://example.com/x now & \"then\" it's <ok>",
        );
        assert_eq!(cleaned, "Bold and soft gone code see now and then its ok");
    }

    #[tokio::test]
    async fn missing_binary_is_a_synthesis_error() {
        let dir = tempfile::tempdir().unwrap();
        let tts = EdgeTts::new(TtsConfig {
            command: "definitely-not-a-real-tts-binary".into(),
            ..TtsConfig::default()
        });
        let out = dir.path().join("audio.mp3");
        let err = tts.synthesize("hello there", &out).await.unwrap_err();
        assert!(matches!(err, PipelineError::Synthesis(_)));
        assert!(!out.with_extension("txt").exists());
    }
}
