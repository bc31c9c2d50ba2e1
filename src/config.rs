//! YAML configuration with environment overrides.
//!
//! [`load_config`] reads the file, loads `.env` via `dotenvy`, applies the
//! `STORYSHORTS_*` / `PEXELS_API_KEY` overrides and validates the result.

use std::collections::HashSet;
use std::env::VarError;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub story: StoryConfig,
    pub tts: TtsConfig,
    pub video: VideoConfig,
    pub upload: UploadConfig,
    pub channels: Vec<ChannelConfig>,
    pub automation: AutomationConfig,
    pub paths: PathsConfig,
    pub tracker: TrackerConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoryProvider {
    Ollama,
    Template,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoryConfig {
    pub provider: StoryProvider,
    pub ollama: OllamaConfig,
    pub min_words: usize,
    pub max_words: usize,
    pub themes: Vec<String>,
    pub prompts_dir: PathBuf,
    pub profanity_filter: bool,
}

impl Default for StoryConfig {
    fn default() -> Self {
        Self {
            provider: StoryProvider::Ollama,
            ollama: OllamaConfig::default(),
            min_words: 150,
            max_words: 300,
            themes: [
                "relationship_drama",
                "workplace_stories",
                "family_issues",
                "friendship_conflicts",
                "life_decisions",
                "revenge_stories",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            prompts_dir: PathBuf::from("prompts"),
            profanity_filter: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OllamaConfig {
    pub endpoint: String,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:11434/api/generate".to_string(),
            model: "llama3.2:3b".to_string(),
            temperature: 0.8,
            max_tokens: 300,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    pub command: String,
    pub voice: String,
    pub speed: f64,
    pub volume: f64,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            command: "edge-tts".to_string(),
            voice: "en-US-AndrewNeural".to_string(),
            speed: 1.0,
            volume: 0.8,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    pub width: u32,
    pub height: u32,
    pub caption_words: usize,
    pub thumbnail_offset_secs: u64,
    pub background_keywords: Vec<String>,
    pub text_style: TextStyle,
    pub pexels: PexelsConfig,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            width: 1080,
            height: 1920,
            caption_words: 8,
            thumbnail_offset_secs: 3,
            background_keywords: [
                "animals", "asmr", "workout", "working", "cooking", "nature", "gameplay",
                "relaxing",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            text_style: TextStyle::default(),
            pexels: PexelsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TextStyle {
    pub font: String,
    pub font_size: u32,
    pub font_color: String,
    pub outline_color: String,
    pub outline_width: u32,
    pub shadow: bool,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            font: "Arial-Bold".to_string(),
            font_size: 14,
            font_color: "#FFFFFF".to_string(),
            outline_color: "#000000".to_string(),
            outline_width: 2,
            shadow: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PexelsConfig {
    pub api_key: Option<String>,
    pub endpoint: String,
}

impl Default for PexelsConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: "https://api.pexels.com/videos/search".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    pub privacy_status: String,
    pub category_id: String,
    pub tags: Vec<String>,
    pub description_template: String,
    pub disclaimers: Vec<String>,
    pub hashtags: String,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            privacy_status: "public".to_string(),
            category_id: "24".to_string(),
            tags: [
                "reddit stories",
                "reddit",
                "stories",
                "shorts",
                "reddit shorts",
                "askreddit",
                "reddit drama",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            description_template: "CRAZY Reddit Story!".to_string(),
            disclaimers: vec![
                "This story is AI-generated for entertainment purposes.".to_string(),
                "Any resemblance to real events is purely coincidental.".to_string(),
            ],
            hashtags: "#RedditStories #Shorts #Reddit #Drama #Stories #AIGenerated".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    pub key: String,
    pub name: String,
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    pub schedule: Option<ScheduleConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub posts_per_day: u32,
    pub start_hour: u32,
    pub end_hour: u32,
    pub timezone: String,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            posts_per_day: 1,
            start_hour: 0,
            end_hour: 23,
            timezone: "UTC".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AutomationConfig {
    pub enabled: bool,
    pub skip_upload: bool,
    pub max_runs: u32,
    pub retry_delay_secs: u64,
    pub run_delay_secs: u64,
    pub channel_delay_secs: u64,
    pub cycle_interval_secs: u64,
    pub error_backoff_secs: u64,
    pub poll_interval_secs: u64,
    pub cleanup_old_videos: bool,
    pub keep_videos_days: u64,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            skip_upload: true,
            max_runs: 5,
            retry_delay_secs: 300,
            run_delay_secs: 60,
            channel_delay_secs: 5,
            cycle_interval_secs: 30 * 60,
            error_backoff_secs: 5 * 60,
            poll_interval_secs: 60,
            cleanup_old_videos: true,
            keep_videos_days: 7,
        }
    }
}

impl AutomationConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn run_delay(&self) -> Duration {
        Duration::from_secs(self.run_delay_secs)
    }

    pub fn channel_delay(&self) -> Duration {
        Duration::from_secs(self.channel_delay_secs)
    }

    pub fn cycle_interval(&self) -> Duration {
        Duration::from_secs(self.cycle_interval_secs)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_secs(self.error_backoff_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub output: PathBuf,
    pub temp: PathBuf,
    pub counters: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            output: PathBuf::from("output"),
            temp: PathBuf::from("temp"),
            counters: PathBuf::from("logs"),
        }
    }
}

/// Timezone of the tracker's own clock. Upload-count day boundaries use this,
/// not the channel's posting timezone.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub timezone: String,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            timezone: "UTC".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: Some(PathBuf::from("logs/app.log")),
        }
    }
}

/// Load, override and validate the configuration at `path`.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read or parsed, or if a value
/// fails validation.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let mut config = parse_config(&raw, path)?;
    apply_env_overrides(&mut config, |key| std::env::var(key))?;
    validate(&config)?;
    Ok(config)
}

pub fn parse_config(raw: &str, path: &Path) -> Result<AppConfig, ConfigError> {
    serde_yaml::from_str(raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Apply environment overrides using `lookup`, decoupled from the process
/// environment so tests can pass a plain map.
pub fn apply_env_overrides<F>(config: &mut AppConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Result<String, VarError>,
{
    if let Ok(endpoint) = lookup("STORYSHORTS_OLLAMA_ENDPOINT") {
        config.story.ollama.endpoint = endpoint;
    }
    if let Ok(model) = lookup("STORYSHORTS_OLLAMA_MODEL") {
        config.story.ollama.model = model;
    }
    if let Ok(key) = lookup("PEXELS_API_KEY") {
        config.video.pexels.api_key = Some(key);
    }
    if let Ok(level) = lookup("STORYSHORTS_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Ok(raw) = lookup("STORYSHORTS_SKIP_UPLOAD") {
        config.automation.skip_upload =
            raw.trim().parse::<bool>().map_err(|e| ConfigError::Invalid {
                field: "STORYSHORTS_SKIP_UPLOAD".to_string(),
                reason: e.to_string(),
            })?;
    }
    Ok(())
}

/// Channel keys end up in counter file names.
fn is_valid_channel_key(key: &str) -> bool {
    !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

pub fn validate(config: &AppConfig) -> Result<(), ConfigError> {
    let invalid = |field: &str, reason: &str| ConfigError::Invalid {
        field: field.to_string(),
        reason: reason.to_string(),
    };

    if config.story.themes.is_empty() {
        return Err(invalid("story.themes", "at least one theme is required"));
    }
    if config.tts.speed <= 0.0 {
        return Err(invalid("tts.speed", "must be greater than zero"));
    }
    if config.tts.volume <= 0.0 {
        return Err(invalid("tts.volume", "must be greater than zero"));
    }
    if config.video.caption_words == 0 {
        return Err(invalid("video.caption_words", "must be at least 1"));
    }

    let mut seen = HashSet::new();
    for channel in &config.channels {
        if channel.key.trim().is_empty() {
            return Err(invalid("channels.key", "channel key must not be empty"));
        }
        if !is_valid_channel_key(&channel.key) {
            return Err(invalid(
                "channels.key",
                &format!("{:?} may only contain ASCII letters, digits, '_' and '-'", channel.key),
            ));
        }
        if !seen.insert(channel.key.as_str()) {
            return Err(ConfigError::DuplicateChannel(channel.key.clone()));
        }
        if let Some(schedule) = &channel.schedule {
            let field = format!("channels.{}.schedule", channel.key);
            if schedule.posts_per_day == 0 {
                return Err(invalid(&field, "posts_per_day must be at least 1"));
            }
            if schedule.end_hour > 23 {
                return Err(invalid(&field, "end_hour must be within 0..=23"));
            }
            if schedule.start_hour > schedule.end_hour {
                return Err(invalid(&field, "start_hour must not exceed end_hour"));
            }
            schedule
                .timezone
                .parse::<chrono_tz::Tz>()
                .map_err(|_| ConfigError::InvalidTimezone(schedule.timezone.clone()))?;
        }
    }

    config
        .tracker
        .timezone
        .parse::<chrono_tz::Tz>()
        .map_err(|_| ConfigError::InvalidTimezone(config.tracker.timezone.clone()))?;

    Ok(())
}
