use std::path::Path;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::seq::IndexedRandom;
use regex::Regex;
use reqwest::header::USER_AGENT;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{OllamaConfig, StoryConfig, StoryProvider};
use crate::error::PipelineError;
use crate::templates;
use crate::utils::{collapse_whitespace, word_count};

#[derive(Debug, Clone)]
pub struct Story {
    pub title: String,
    pub body: String,
    pub theme: String,
    pub word_count: usize,
    pub generated_at: DateTime<Utc>,
    pub is_fallback: bool,
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Produce a story for `theme`, or for a randomly chosen configured theme.
    async fn generate(&self, theme: Option<&str>) -> Result<Story, PipelineError>;
}

/// A remote model that turns a prompt into raw story text.
#[async_trait]
pub trait StoryBackend: Send + Sync {
    fn name(&self) -> &'static str;
    async fn complete(&self, prompt: &str) -> Result<String, PipelineError>;
}

#[derive(Debug, Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f64,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: Option<String>,
}

pub struct OllamaBackend {
    client: reqwest::Client,
    config: OllamaConfig,
}

impl OllamaBackend {
    pub fn new(config: OllamaConfig) -> Result<Self, PipelineError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PipelineError::Generation(format!("cannot build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl StoryBackend for OllamaBackend {
    fn name(&self) -> &'static str {
        "ollama"
    }

    async fn complete(&self, prompt: &str) -> Result<String, PipelineError> {
        info!("Generating story with Ollama model {}", self.config.model);
        let request = OllamaRequest {
            model: &self.config.model,
            prompt,
            stream: false,
            options: OllamaOptions {
                temperature: self.config.temperature,
                num_predict: self.config.max_tokens,
            },
        };
        let parsed: OllamaResponse = self
            .client
            .post(&self.config.endpoint)
            .header(USER_AGENT, "storyshorts/0.1")
            .json(&request)
            .send()
            .await
            .and_then(|res| res.error_for_status())
            .map_err(|e| PipelineError::Generation(format!("Ollama request failed: {e}")))?
            .json()
            .await
            .map_err(|e| PipelineError::Generation(format!("invalid Ollama response: {e}")))?;

        parsed
            .response
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| PipelineError::Generation("Ollama returned no text".to_string()))
    }
}

static BRACKETED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[.*?\]").expect("valid regex"));

static PROFANITY: LazyLock<Regex> = LazyLock::new(|| {
    let words = templates::PROFANITY.join("|");
    Regex::new(&format!(r"(?i)\b(?:{words})\b")).expect("valid regex")
});

/// Prompts a backend for a story and falls back to built-in templates
/// whenever the backend is missing, unreachable or returns nothing usable.
pub struct StoryGenerator {
    backend: Option<Arc<dyn StoryBackend>>,
    config: StoryConfig,
}

impl StoryGenerator {
    pub fn new(backend: Option<Arc<dyn StoryBackend>>, config: StoryConfig) -> Self {
        Self { backend, config }
    }

    pub fn from_config(config: &StoryConfig) -> Result<Self, PipelineError> {
        let backend: Option<Arc<dyn StoryBackend>> = match config.provider {
            StoryProvider::Ollama => Some(Arc::new(OllamaBackend::new(config.ollama.clone())?)),
            StoryProvider::Template => None,
        };
        Ok(Self::new(backend, config.clone()))
    }

    fn pick_theme(&self) -> String {
        self.config
            .themes
            .choose(&mut rand::rng())
            .cloned()
            .unwrap_or_else(|| templates::DEFAULT_THEME.to_string())
    }

    async fn build_prompt(&self, theme: &str) -> String {
        let lines = read_prompt_lines(&self.config.prompts_dir, theme).await;
        let base = lines
            .choose(&mut rand::rng())
            .cloned()
            .unwrap_or_else(|| {
                format!(
                    "Write a first-person Reddit post about {}.",
                    theme.replace('_', " ")
                )
            });
        format!(
            "{base} Write this as a compelling Reddit story with emotional details and a clear narrative arc. Keep it between {}-{} words.",
            self.config.min_words, self.config.max_words
        )
    }

    fn fallback(&self, theme: &str) -> Story {
        info!("Using fallback story generation for theme: {}", theme);
        let body = templates::fallback_body(theme).to_string();
        self.finish(theme, body, true)
    }

    fn finish(&self, theme: &str, body: String, is_fallback: bool) -> Story {
        let title = templates::titles(theme)
            .choose(&mut rand::rng())
            .map_or_else(|| theme.replace('_', " "), |t| (*t).to_string());
        Story {
            title,
            word_count: word_count(&body),
            body,
            theme: theme.to_string(),
            generated_at: Utc::now(),
            is_fallback,
        }
    }

    /// Strip prompt echo and model artifacts, mask profanity, pad short text.
    pub fn clean_story(&self, raw: &str, prompt: &str) -> String {
        let story = raw.replace(prompt, "");
        let story = BRACKETED.replace_all(&story, "");
        let mut story = collapse_whitespace(&story);

        if self.config.profanity_filter {
            story = PROFANITY
                .replace_all(&story, |caps: &regex::Captures| "*".repeat(caps[0].len()))
                .into_owned();
        }

        if !story.is_empty() {
            for sentence in templates::EXPANSIONS {
                if word_count(&story) >= self.config.min_words {
                    break;
                }
                story.push_str(sentence);
            }
        }
        story
    }
}

async fn read_prompt_lines(dir: &Path, theme: &str) -> Vec<String> {
    for candidate in [theme, templates::DEFAULT_THEME] {
        let path = dir.join(format!("{candidate}.txt"));
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => {
                let lines: Vec<String> = contents
                    .lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .map(String::from)
                    .collect();
                if !lines.is_empty() {
                    return lines;
                }
                warn!("Prompts file is empty: {}", path.display());
            }
            Err(_) => debug!("No prompts file at {}", path.display()),
        }
    }
    Vec::new()
}

#[async_trait]
impl TextGenerator for StoryGenerator {
    async fn generate(&self, theme: Option<&str>) -> Result<Story, PipelineError> {
        let theme = theme.map_or_else(|| self.pick_theme(), String::from);
        info!("Generating new story for theme {}", theme);

        let Some(backend) = &self.backend else {
            return Ok(self.fallback(&theme));
        };

        let prompt = self.build_prompt(&theme).await;
        match backend.complete(&prompt).await {
            Ok(raw) => {
                let body = self.clean_story(&raw, &prompt);
                if body.is_empty() {
                    warn!("{} produced no usable text", backend.name());
                    Ok(self.fallback(&theme))
                } else {
                    Ok(self.finish(&theme, body, false))
                }
            }
            Err(e) => {
                warn!("{} unavailable, using template: {}", backend.name(), e);
                Ok(self.fallback(&theme))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedBackend(Result<String, ()>);

    #[async_trait]
    impl StoryBackend for FixedBackend {
        fn name(&self) -> &'static str {
            "fixed"
        }

        async fn complete(&self, _prompt: &str) -> Result<String, PipelineError> {
            self.0
                .clone()
                .map_err(|()| PipelineError::Generation("backend down".into()))
        }
    }

    fn config() -> StoryConfig {
        StoryConfig {
            min_words: 5,
            prompts_dir: "does-not-exist".into(),
            ..StoryConfig::default()
        }
    }

    #[tokio::test]
    async fn backend_failure_falls_back_to_template() {
        let generator = StoryGenerator::new(Some(Arc::new(FixedBackend(Err(())))), config());
        let story = generator.generate(Some("workplace_stories")).await.unwrap();
        assert!(story.is_fallback);
        assert_eq!(story.body, templates::fallback_body("workplace_stories"));
        assert!(templates::titles("workplace_stories").contains(&story.title.as_str()));
        assert_eq!(story.word_count, word_count(&story.body));
    }

    #[tokio::test]
    async fn blank_backend_text_falls_back() {
        let generator =
            StoryGenerator::new(Some(Arc::new(FixedBackend(Ok("[ ]".into())))), config());
        let story = generator.generate(Some("family_issues")).await.unwrap();
        assert!(story.is_fallback);
    }

    #[tokio::test]
    async fn backend_text_is_cleaned() {
        let raw = "[intro] My   boss was a damn idiot about the hello  thing today at work honestly";
        let generator = StoryGenerator::new(Some(Arc::new(FixedBackend(Ok(raw.into())))), config());
        let story = generator.generate(Some("workplace_stories")).await.unwrap();
        assert!(!story.is_fallback);
        assert_eq!(
            story.body,
            "My boss was a **** ***** about the hello thing today at work honestly"
        );
    }

    #[tokio::test]
    async fn random_theme_comes_from_config() {
        let generator = StoryGenerator::new(None, config());
        let story = generator.generate(None).await.unwrap();
        assert!(config().themes.contains(&story.theme));
    }

    #[test]
    fn short_stories_are_padded() {
        let generator = StoryGenerator::new(
            None,
            StoryConfig {
                min_words: 20,
                ..config()
            },
        );
        let cleaned = generator.clean_story("It was short.", "prompt");
        assert!(word_count(&cleaned) >= 20);
        assert!(cleaned.starts_with("It was short. I've been thinking"));
    }
}
