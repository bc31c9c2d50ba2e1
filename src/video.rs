use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::audio;
use crate::background::BackgroundFetcher;
use crate::config::{TextStyle, VideoConfig};
use crate::error::PipelineError;
use crate::story::Story;
use crate::subtitle::{build_cues, write_srt};
use crate::utils::remove_file_quietly;

#[async_trait]
pub trait VideoComposer: Send + Sync {
    /// Render narration, captions and background footage into `out_path`.
    async fn compose(
        &self,
        story: &Story,
        audio_path: &Path,
        out_path: &Path,
    ) -> Result<PathBuf, PipelineError>;
}

#[async_trait]
pub trait ThumbnailExtractor: Send + Sync {
    /// Best effort: `None` on any failure.
    async fn extract_frame(&self, video: &Path, at: Duration, out_path: &Path) -> Option<PathBuf>;
}

/// Run `ffmpeg` quietly; on failure the error carries the tail of stderr.
pub async fn run_ffmpeg<I, S>(args: I) -> Result<(), String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let output = Command::new("ffmpeg")
        .args(["-hide_banner", "-loglevel", "error"])
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| format!("failed to spawn ffmpeg: {e}"))?;
    if output.status.success() {
        Ok(())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let tail: Vec<&str> = stderr.lines().rev().take(5).collect();
        Err(format!(
            "ffmpeg exited with {}: {}",
            output.status,
            tail.into_iter().rev().collect::<Vec<_>>().join(" | ")
        ))
    }
}

/// `#RRGGBB` to the `BBGGRR` order ASS subtitle styles expect.
pub fn ass_color(color: &str) -> String {
    let hex = color.trim_start_matches('#');
    if hex.len() == 6 && hex.chars().all(|c| c.is_ascii_hexdigit()) {
        format!("{}{}{}", &hex[4..6], &hex[2..4], &hex[0..2]).to_uppercase()
    } else {
        "000000".to_string()
    }
}

fn subtitle_style(style: &TextStyle) -> String {
    format!(
        "FontName={},FontSize={},PrimaryColour=&H{},OutlineColour=&H{},Outline={},Shadow={},Alignment=10,MarginL=5,MarginV=25",
        style.font,
        style.font_size,
        ass_color(&style.font_color),
        ass_color(&style.outline_color),
        style.outline_width,
        u8::from(style.shadow),
    )
}

pub struct FfmpegComposer {
    background: BackgroundFetcher,
    config: VideoConfig,
    temp_dir: PathBuf,
}

impl FfmpegComposer {
    pub fn new(config: VideoConfig, temp_dir: PathBuf) -> Result<Self, PipelineError> {
        let background = BackgroundFetcher::new(
            config.pexels.clone(),
            config.background_keywords.clone(),
            (config.width, config.height),
            temp_dir.clone(),
        )?;
        Ok(Self {
            background,
            config,
            temp_dir,
        })
    }

    async fn render(
        &self,
        background: &Path,
        audio_path: &Path,
        subtitles: &Path,
        out_path: &Path,
        duration: f64,
    ) -> Result<(), PipelineError> {
        let (w, h) = (self.config.width, self.config.height);
        let srt = subtitles.to_string_lossy().replace('\'', "\\'");
        let filter = format!(
            "[0:v]scale={w}:{h}:force_original_aspect_ratio=increase,crop={w}:{h}[scaled];[scaled]subtitles='{srt}':force_style='{}'[outv]",
            subtitle_style(&self.config.text_style)
        );

        let duration_arg = format!("{duration:.2}");
        let mut args: Vec<OsString> = vec!["-stream_loop".into(), "-1".into(), "-i".into()];
        args.push(background.into());
        args.push("-i".into());
        args.push(audio_path.into());
        args.extend(
            [
                "-filter_complex",
                filter.as_str(),
                "-map",
                "[outv]",
                "-map",
                "1:a",
                "-c:v",
                "libx264",
                "-c:a",
                "aac",
                "-ac",
                "2",
                "-ar",
                "44100",
                "-t",
                duration_arg.as_str(),
                "-y",
            ]
            .map(OsString::from),
        );
        args.push(out_path.into());

        debug!("Rendering video with filter {}", filter);
        run_ffmpeg(args).await.map_err(PipelineError::Composition)?;
        if !out_path.exists() {
            return Err(PipelineError::Composition(format!(
                "{} was not created",
                out_path.display()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl VideoComposer for FfmpegComposer {
    async fn compose(
        &self,
        story: &Story,
        audio_path: &Path,
        out_path: &Path,
    ) -> Result<PathBuf, PipelineError> {
        info!("Generating video for story: {}", story.title);
        if let Some(parent) = out_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::create_dir_all(&self.temp_dir).await?;

        let duration = audio::duration_seconds(audio_path).await?;
        let cues = build_cues(&story.body, duration, self.config.caption_words);
        let srt_path = self.temp_dir.join(format!("subtitles_{}.srt", Uuid::new_v4()));
        if let Err(e) = write_srt(&srt_path, &cues) {
            remove_file_quietly(&srt_path);
            return Err(PipelineError::Composition(format!("cannot write subtitles: {e}")));
        }

        let result = match self.background.fetch(&story.theme, duration).await {
            Ok(background) => {
                let rendered = self
                    .render(&background, audio_path, &srt_path, out_path, duration)
                    .await;
                remove_file_quietly(&background);
                rendered
            }
            Err(e) => Err(e),
        };
        remove_file_quietly(&srt_path);

        match result {
            Ok(()) => {
                info!("Video generated successfully: {}", out_path.display());
                Ok(out_path.to_path_buf())
            }
            Err(e) => {
                error!("Failed to generate video: {}", e);
                remove_file_quietly(out_path);
                Err(e)
            }
        }
    }
}

#[async_trait]
impl ThumbnailExtractor for FfmpegComposer {
    async fn extract_frame(&self, video: &Path, at: Duration, out_path: &Path) -> Option<PathBuf> {
        let offset = format!("{:.3}", at.as_secs_f64());
        let args: Vec<OsString> = vec![
            "-ss".into(),
            offset.into(),
            "-i".into(),
            video.into(),
            "-vframes".into(),
            "1".into(),
            "-q:v".into(),
            "2".into(),
            "-y".into(),
            out_path.into(),
        ];
        match run_ffmpeg(args).await {
            Ok(()) if out_path.exists() => Some(out_path.to_path_buf()),
            Ok(()) => None,
            Err(e) => {
                warn!("Thumbnail extraction failed: {}", e);
                remove_file_quietly(out_path);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_rgb_to_ass_order() {
        assert_eq!(ass_color("#FF8800"), "0088FF");
        assert_eq!(ass_color("123abc"), "BC3A12");
        assert_eq!(ass_color("#FFF"), "000000");
        assert_eq!(ass_color("zzzzzz"), "000000");
    }

    #[test]
    fn style_string_uses_config() {
        let style = subtitle_style(&TextStyle::default());
        assert!(style.starts_with("FontName=Arial-Bold,FontSize=14,PrimaryColour=&HFFFFFF"));
        assert!(style.contains("Shadow=0"));
    }
}
