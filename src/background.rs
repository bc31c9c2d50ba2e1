//! Background footage: a portrait stock clip from Pexels, or a generated
//! solid-colour clip when the stock provider cannot be used.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rand::seq::IndexedRandom;
use reqwest::header::{AUTHORIZATION, USER_AGENT};
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::PexelsConfig;
use crate::error::PipelineError;
use crate::video::run_ffmpeg;

const PALETTE: &[&str] = &["0x1a1a2e", "0x16213e", "0x0f3460", "0x533483", "0x7209b7"];

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    videos: Vec<StockVideo>,
}

#[derive(Debug, Deserialize)]
struct StockVideo {
    url: String,
    #[serde(default)]
    video_files: Vec<StockFile>,
}

#[derive(Debug, Clone, Deserialize)]
struct StockFile {
    quality: Option<String>,
    #[serde(default)]
    link: String,
}

/// Colour for the fallback clip. Same theme, same colour.
pub fn fallback_color(theme: &str) -> &'static str {
    let sum: usize = theme.bytes().map(usize::from).sum();
    PALETTE[sum % PALETTE.len()]
}

fn pick_file(files: &[StockFile]) -> Option<&StockFile> {
    ["hd", "sd"]
        .iter()
        .find_map(|q| {
            files
                .iter()
                .find(|f| f.quality.as_deref() == Some(*q) && !f.link.is_empty())
        })
        .or_else(|| files.first())
        .filter(|f| !f.link.is_empty())
}

pub struct BackgroundFetcher {
    client: reqwest::Client,
    pexels: PexelsConfig,
    keywords: Vec<String>,
    size: (u32, u32),
    temp_dir: PathBuf,
}

impl BackgroundFetcher {
    pub fn new(
        pexels: PexelsConfig,
        keywords: Vec<String>,
        size: (u32, u32),
        temp_dir: PathBuf,
    ) -> Result<Self, PipelineError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| PipelineError::Composition(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            client,
            pexels,
            keywords,
            size,
            temp_dir,
        })
    }

    /// A background clip in the temp directory; the caller owns and removes it.
    pub async fn fetch(&self, theme: &str, duration: f64) -> Result<PathBuf, PipelineError> {
        tokio::fs::create_dir_all(&self.temp_dir).await?;
        match self.download_stock(theme).await {
            Ok(path) => Ok(path),
            Err(reason) => {
                warn!("Stock footage unavailable ({}), generating solid background", reason);
                self.solid_color(theme, duration).await
            }
        }
    }

    async fn download_stock(&self, theme: &str) -> Result<PathBuf, String> {
        let api_key = self
            .pexels
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or("Pexels API key not configured")?;

        let query = self
            .keywords
            .choose(&mut rand::rng())
            .cloned()
            .unwrap_or_else(|| theme.replace('_', " "));
        info!("Searching Pexels for background footage: {}", query);

        let response: SearchResponse = self
            .client
            .get(&self.pexels.endpoint)
            .query(&[
                ("query", query.as_str()),
                ("per_page", "10"),
                ("orientation", "portrait"),
            ])
            .header(AUTHORIZATION, api_key)
            .header(USER_AGENT, "storyshorts/0.1")
            .timeout(Duration::from_secs(30))
            .send()
            .await
            .and_then(|res| res.error_for_status())
            .map_err(|e| format!("search failed: {e}"))?
            .json()
            .await
            .map_err(|e| format!("cannot decode search response: {e}"))?;

        let video = response
            .videos
            .choose(&mut rand::rng())
            .ok_or_else(|| format!("no videos found for query {query}"))?;
        let file = pick_file(&video.video_files)
            .ok_or("no downloadable file in search result")?
            .clone();
        info!(
            "Selected Pexels video {} (quality: {})",
            video.url,
            file.quality.as_deref().unwrap_or("unknown")
        );

        let bytes = self
            .client
            .get(&file.link)
            .header(USER_AGENT, "storyshorts/0.1")
            .send()
            .await
            .and_then(|res| res.error_for_status())
            .map_err(|e| format!("download failed: {e}"))?
            .bytes()
            .await
            .map_err(|e| format!("download interrupted: {e}"))?;
        if bytes.is_empty() {
            return Err("downloaded video is empty".to_string());
        }

        let path = self.temp_dir.join(format!("pexels_{}.mp4", Uuid::new_v4()));
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|e| format!("cannot save {}: {e}", path.display()))?;
        info!(
            "Downloaded background video {} ({:.2} MB)",
            path.display(),
            bytes.len() as f64 / 1024.0 / 1024.0
        );
        Ok(path)
    }

    async fn solid_color(&self, theme: &str, duration: f64) -> Result<PathBuf, PipelineError> {
        let path = self.temp_dir.join(format!("bg_{}.mp4", Uuid::new_v4()));
        let (w, h) = self.size;
        let seconds = duration.ceil().max(1.0);
        let source = format!(
            "color=c={}:size={w}x{h}:duration={seconds}",
            fallback_color(theme)
        );
        let args: Vec<OsString> = vec![
            "-f".into(),
            "lavfi".into(),
            "-i".into(),
            source.into(),
            "-c:v".into(),
            "libx264".into(),
            "-y".into(),
            path.clone().into_os_string(),
        ];
        run_ffmpeg(args)
            .await
            .map_err(|e| PipelineError::Composition(format!("cannot create background: {e}")))?;
        ensure_exists(&path)?;
        info!("Created solid background video: {}", path.display());
        Ok(path)
    }
}

fn ensure_exists(path: &Path) -> Result<(), PipelineError> {
    if path.exists() {
        Ok(())
    } else {
        Err(PipelineError::Composition(format!(
            "{} was not created",
            path.display()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(quality: &str, link: &str) -> StockFile {
        StockFile {
            quality: Some(quality.to_string()),
            link: link.to_string(),
        }
    }

    #[test]
    fn prefers_hd_then_sd_then_first() {
        let files = vec![file("sd", "sd-link"), file("hd", "hd-link")];
        assert_eq!(pick_file(&files).unwrap().link, "hd-link");

        let files = vec![file("uhd", "uhd-link"), file("sd", "sd-link")];
        assert_eq!(pick_file(&files).unwrap().link, "sd-link");

        let files = vec![file("uhd", "uhd-link")];
        assert_eq!(pick_file(&files).unwrap().link, "uhd-link");

        assert!(pick_file(&[file("hd", "")]).is_none());
    }

    #[test]
    fn fallback_color_is_stable_per_theme() {
        assert_eq!(fallback_color("revenge_stories"), fallback_color("revenge_stories"));
        assert!(PALETTE.contains(&fallback_color("anything")));
    }

    #[test]
    fn search_response_tolerates_missing_fields() {
        let parsed: SearchResponse =
            serde_json::from_str(r#"{"videos":[{"url":"u","video_files":[{"link":"l"}]}]}"#)
                .unwrap();
        assert_eq!(parsed.videos[0].video_files[0].quality, None);
        let empty: SearchResponse = serde_json::from_str("{}").unwrap();
        assert!(empty.videos.is_empty());
    }
}
