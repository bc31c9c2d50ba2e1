//! Read-only views for operators: per-channel posting status and an
//! environment check.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use chrono::NaiveDate;
use reqwest::Url;
use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;
use uuid::Uuid;

use crate::channel::ChannelTarget;
use crate::config::{AppConfig, OllamaConfig, StoryProvider};
use crate::tracker::UploadTracker;
use crate::utils::remove_file_quietly;

pub const HISTORY_DAYS: u32 = 7;

#[derive(Debug, Clone, PartialEq)]
pub struct ChannelStatus {
    pub key: String,
    pub name: String,
    pub configured: bool,
    pub daily_quota: Option<u32>,
    /// `None` when the counter could not be read.
    pub uploads_today: Option<u32>,
    pub ready: bool,
    pub history: Vec<(NaiveDate, u32)>,
}

pub fn channel_status(tracker: &UploadTracker, channels: &[ChannelTarget]) -> Vec<ChannelStatus> {
    channels
        .iter()
        .map(|c| ChannelStatus {
            key: c.key.clone(),
            name: c.name.clone(),
            configured: c.credentials.is_configured(),
            daily_quota: c.daily_quota(),
            uploads_today: tracker.uploads_today(&c.key).ok(),
            ready: tracker.should_post_now(c),
            history: tracker.history(&c.key, HISTORY_DAYS),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckItem {
    pub name: String,
    pub passed: bool,
    pub detail: String,
}

impl CheckItem {
    fn new(name: impl Into<String>, passed: bool, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed,
            detail: detail.into(),
        }
    }
}

/// External tools, working directories and channel credentials.
pub async fn check_environment(config: &AppConfig, channels: &[ChannelTarget]) -> Vec<CheckItem> {
    let mut items = Vec::new();
    for (tool, flag) in [
        ("ffmpeg", "-version"),
        ("ffprobe", "-version"),
        (config.tts.command.as_str(), "--version"),
    ] {
        items.push(probe_tool(tool, flag).await);
    }
    for (label, dir) in [
        ("output directory", &config.paths.output),
        ("temp directory", &config.paths.temp),
        ("counter directory", &config.paths.counters),
    ] {
        items.push(check_directory(label, dir));
    }
    if config.story.provider == StoryProvider::Ollama {
        items.push(probe_ollama(&config.story.ollama).await);
    }
    items.extend(check_channels(channels));
    items
}

#[derive(Debug, Deserialize)]
struct OllamaTags {
    #[serde(default)]
    models: Vec<OllamaModel>,
}

#[derive(Debug, Deserialize)]
struct OllamaModel {
    name: String,
}

/// The model listing lives next to the generate endpoint, at `/api/tags`.
fn ollama_tags_url(endpoint: &str) -> Option<Url> {
    let mut url = Url::parse(endpoint).ok()?;
    if url.cannot_be_a_base() {
        return None;
    }
    url.set_path("/api/tags");
    url.set_query(None);
    Some(url)
}

fn installed_models(body: &str) -> Result<Vec<String>, serde_json::Error> {
    let tags: OllamaTags = serde_json::from_str(body)?;
    Ok(tags.models.into_iter().map(|m| m.name).collect())
}

/// Ollama lists untagged models as `<name>:latest`.
fn model_installed(installed: &[String], model: &str) -> bool {
    installed
        .iter()
        .any(|name| name == model || (!model.contains(':') && *name == format!("{model}:latest")))
}

async fn probe_ollama(config: &OllamaConfig) -> CheckItem {
    let name = format!("ollama model {}", config.model);
    let Some(url) = ollama_tags_url(&config.endpoint) else {
        return CheckItem::new(name, false, format!("invalid endpoint {}", config.endpoint));
    };
    debug!("Probing {}", url);

    let client = match reqwest::Client::builder().timeout(Duration::from_secs(5)).build() {
        Ok(client) => client,
        Err(e) => return CheckItem::new(name, false, format!("cannot build HTTP client: {e}")),
    };
    let body = match client.get(url.clone()).send().await.and_then(|r| r.error_for_status()) {
        Ok(res) => match res.text().await {
            Ok(body) => body,
            Err(e) => return CheckItem::new(name, false, format!("cannot read {url}: {e}")),
        },
        Err(e) => return CheckItem::new(name, false, format!("unreachable at {url}: {e}")),
    };
    match installed_models(&body) {
        Ok(models) if model_installed(&models, &config.model) => {
            CheckItem::new(name, true, "installed")
        }
        Ok(models) if models.is_empty() => CheckItem::new(
            name,
            false,
            format!("no models installed, run `ollama pull {}`", config.model),
        ),
        Ok(models) => CheckItem::new(
            name,
            false,
            format!("not installed; available: {}", models.join(", ")),
        ),
        Err(e) => CheckItem::new(name, false, format!("unexpected response from {url}: {e}")),
    }
}

async fn probe_tool(tool: &str, flag: &str) -> CheckItem {
    debug!("Probing {} {}", tool, flag);
    let status = Command::new(tool)
        .arg(flag)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;
    match status {
        Ok(s) if s.success() => CheckItem::new(tool, true, "available"),
        Ok(s) => CheckItem::new(tool, false, format!("exited with {s}")),
        Err(e) => CheckItem::new(tool, false, format!("not found: {e}")),
    }
}

/// Creates the directory if needed, then proves it is writable.
fn check_directory(label: &str, dir: &Path) -> CheckItem {
    let name = format!("{label} {}", dir.display());
    if let Err(e) = std::fs::create_dir_all(dir) {
        return CheckItem::new(name, false, format!("cannot create: {e}"));
    }
    let probe = dir.join(format!(".probe_{}", Uuid::new_v4().simple()));
    match std::fs::write(&probe, b"ok") {
        Ok(()) => {
            remove_file_quietly(&probe);
            CheckItem::new(name, true, "writable")
        }
        Err(e) => CheckItem::new(name, false, format!("not writable: {e}")),
    }
}

pub fn check_channels(channels: &[ChannelTarget]) -> Vec<CheckItem> {
    if channels.is_empty() {
        return vec![CheckItem::new("channels", false, "no channels configured")];
    }
    channels
        .iter()
        .map(|c| {
            let name = format!("channel {}", c.key);
            match (c.credentials.is_configured(), &c.window) {
                (false, _) => CheckItem::new(name, false, "not configured"),
                (true, None) => CheckItem::new(name, false, "no posting schedule"),
                (true, Some(w)) => CheckItem::new(
                    name,
                    true,
                    format!(
                        "{} posts/day between {}:00 and {}:59 {}",
                        w.daily_quota, w.start_hour, w.end_hour, w.timezone
                    ),
                ),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::channel::ChannelCredentials;
    use crate::store::MemoryCounterStore;
    use crate::tracker::FixedClock;
    use crate::tracker::tests::channel;

    #[test]
    fn status_reports_counts_and_readiness() {
        let tracker = UploadTracker::new(
            Arc::new(MemoryCounterStore::new()),
            Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2026, 3, 10, 14, 0, 0).unwrap())),
            chrono_tz::UTC,
        );
        tracker.record_upload("open").unwrap();
        let channels = vec![channel("open", 0, 23, 3), channel("closed", 0, 5, 3)];

        let status = channel_status(&tracker, &channels);
        assert_eq!(status.len(), 2);
        assert_eq!(status[0].uploads_today, Some(1));
        assert!(status[0].ready);
        assert!(!status[0].configured);
        assert_eq!(status[0].history.len(), HISTORY_DAYS as usize);
        assert_eq!(status[0].history.last().map(|(_, n)| *n), Some(1));
        assert!(!status[1].ready);
        assert_eq!(status[1].daily_quota, Some(3));
    }

    #[test]
    fn channels_without_credentials_are_not_configured() {
        let mut ready = channel("ready", 6, 22, 5);
        ready.credentials = ChannelCredentials {
            client_id: "id".into(),
            client_secret: "secret".into(),
            refresh_token: "token".into(),
        };
        let items = check_channels(&[ready, channel("bare", 6, 22, 5)]);
        assert!(items[0].passed);
        assert!(!items[1].passed);
        assert_eq!(items[1].detail, "not configured");
        assert!(!check_channels(&[])[0].passed);
    }

    #[test]
    fn directory_check_creates_and_probes() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nested/output");
        let item = check_directory("output directory", &target);
        assert!(item.passed);
        assert!(target.is_dir());
        assert_eq!(std::fs::read_dir(&target).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn missing_tool_fails_probe() {
        let item = probe_tool("definitely-not-installed-tool", "--version").await;
        assert!(!item.passed);
    }

    #[test]
    fn tags_url_replaces_generate_path() {
        let url = ollama_tags_url("http://localhost:11434/api/generate").unwrap();
        assert_eq!(url.as_str(), "http://localhost:11434/api/tags");
        let url = ollama_tags_url("http://gpu-box:8080").unwrap();
        assert_eq!(url.as_str(), "http://gpu-box:8080/api/tags");
        assert!(ollama_tags_url("not a url").is_none());
    }

    #[test]
    fn parses_model_listing() {
        let body = r#"{"models":[
            {"name":"llama3.2:3b","size":2019393189,"digest":"a80c4f17acd5"},
            {"name":"mistral:latest","size":4113301824}
        ]}"#;
        let models = installed_models(body).unwrap();
        assert_eq!(models, ["llama3.2:3b", "mistral:latest"]);
        assert!(model_installed(&models, "llama3.2:3b"));
        assert!(model_installed(&models, "mistral"));
        assert!(!model_installed(&models, "llama3.2"));
        assert!(!model_installed(&models, "mistral:7b"));

        assert!(installed_models("{}").unwrap().is_empty());
        assert!(installed_models("<html>").is_err());
    }

    #[tokio::test]
    async fn unreachable_ollama_fails_check() {
        let config = OllamaConfig {
            endpoint: "http://127.0.0.1:1/api/generate".to_string(),
            ..OllamaConfig::default()
        };
        let item = probe_ollama(&config).await;
        assert!(!item.passed);
        assert!(item.detail.starts_with("unreachable"));
    }
}
