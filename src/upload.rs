//! Publishing finished videos to YouTube channels.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, LOCATION};
use reqwest::Url;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::channel::{ChannelCredentials, ChannelTarget};
use crate::config::UploadConfig;
use crate::error::PipelineError;
use crate::story::Story;
use crate::templates::theme_tags;
use crate::utils::{take_chars, truncate_with_ellipsis};

const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/auth";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const UPLOAD_SCOPE: &str = "https://www.googleapis.com/auth/youtube.upload";
/// Google shows the code on screen instead of redirecting.
const OOB_REDIRECT_URI: &str = "urn:ietf:wg:oauth:2.0:oob";
const UPLOAD_URL: &str = "https://www.googleapis.com/upload/youtube/v3/videos";
const THUMBNAIL_URL: &str = "https://www.googleapis.com/upload/youtube/v3/thumbnails/set";

const MAX_TITLE_CHARS: usize = 100;
const PREVIEW_CHARS: usize = 100;

#[derive(Debug, Clone, PartialEq)]
pub struct VideoMetadata {
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub category_id: String,
    pub privacy_status: String,
}

#[async_trait]
pub trait Uploader: Send + Sync {
    /// Publish `video` to `channel` and return the remote video id.
    async fn upload(
        &self,
        channel: &ChannelTarget,
        video: &Path,
        metadata: &VideoMetadata,
        thumbnail: Option<&Path>,
    ) -> Result<String, PipelineError>;
}

/// Turns a story into upload metadata using the configured templates.
#[derive(Debug, Clone)]
pub struct MetadataBuilder {
    config: UploadConfig,
}

impl MetadataBuilder {
    pub fn new(config: UploadConfig) -> Self {
        Self { config }
    }

    pub fn build(&self, story: &Story) -> VideoMetadata {
        let mut description = format!(
            "{}\n\nStory Preview: {}...\n\n",
            self.config.description_template,
            take_chars(&story.body, PREVIEW_CHARS)
        );
        for line in &self.config.disclaimers {
            description.push_str(line);
            description.push('\n');
        }
        description.push('\n');
        description.push_str(&self.config.hashtags);

        let tags = self
            .config
            .tags
            .iter()
            .cloned()
            .chain(theme_tags(&story.theme).iter().map(|t| t.to_string()))
            .collect();

        VideoMetadata {
            title: truncate_with_ellipsis(&story.title, MAX_TITLE_CHARS),
            description,
            tags,
            category_id: self.config.category_id.clone(),
            privacy_status: self.config.privacy_status.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct UploadedVideo {
    id: String,
}

#[derive(Debug, Deserialize)]
struct AuthorizationGrant {
    refresh_token: Option<String>,
}

impl AuthorizationGrant {
    fn into_refresh_token(self) -> Result<String, PipelineError> {
        self.refresh_token.filter(|t| !t.is_empty()).ok_or_else(|| {
            PipelineError::Upload(
                "no refresh token in response; the consent must use access_type=offline and prompt=consent"
                    .to_string(),
            )
        })
    }
}

/// Offline-access consent page for uploading on behalf of a channel.
pub fn consent_url(client_id: &str) -> Result<Url, PipelineError> {
    Url::parse_with_params(
        AUTH_URL,
        &[
            ("client_id", client_id),
            ("redirect_uri", OOB_REDIRECT_URI),
            ("scope", UPLOAD_SCOPE),
            ("response_type", "code"),
            ("access_type", "offline"),
            ("prompt", "consent"),
        ],
    )
    .map_err(|e| PipelineError::Upload(format!("cannot build consent URL: {e}")))
}

/// YouTube Data API v3 client using a per-channel OAuth refresh token.
pub struct YouTubeUploader {
    client: reqwest::Client,
}

impl YouTubeUploader {
    pub fn new() -> Result<Self, PipelineError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(600))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| PipelineError::Upload(format!("cannot build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Trade the code shown after consent for a long-lived refresh token.
    pub async fn exchange_code(
        &self,
        credentials: &ChannelCredentials,
        code: &str,
    ) -> Result<String, PipelineError> {
        let grant: AuthorizationGrant = self
            .client
            .post(TOKEN_URL)
            .form(&[
                ("client_id", credentials.client_id.as_str()),
                ("client_secret", credentials.client_secret.as_str()),
                ("code", code.trim()),
                ("grant_type", "authorization_code"),
                ("redirect_uri", OOB_REDIRECT_URI),
            ])
            .send()
            .await
            .and_then(|res| res.error_for_status())
            .map_err(|e| PipelineError::Upload(format!("code exchange failed: {e}")))?
            .json()
            .await
            .map_err(|e| PipelineError::Upload(format!("cannot decode token response: {e}")))?;
        grant.into_refresh_token()
    }

    async fn access_token(&self, channel: &ChannelTarget) -> Result<String, PipelineError> {
        let creds = &channel.credentials;
        let token: TokenResponse = self
            .client
            .post(TOKEN_URL)
            .form(&[
                ("client_id", creds.client_id.as_str()),
                ("client_secret", creds.client_secret.as_str()),
                ("refresh_token", creds.refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .and_then(|res| res.error_for_status())
            .map_err(|e| PipelineError::Upload(format!("token refresh failed: {e}")))?
            .json()
            .await
            .map_err(|e| PipelineError::Upload(format!("cannot decode token response: {e}")))?;
        Ok(token.access_token)
    }

    async fn start_session(
        &self,
        token: &str,
        metadata: &VideoMetadata,
        size: usize,
    ) -> Result<String, PipelineError> {
        let body = json!({
            "snippet": {
                "title": metadata.title,
                "description": metadata.description,
                "tags": metadata.tags,
                "categoryId": metadata.category_id,
            },
            "status": {
                "privacyStatus": metadata.privacy_status,
                "selfDeclaredMadeForKids": false,
            },
        });
        let res = self
            .client
            .post(UPLOAD_URL)
            .query(&[("uploadType", "resumable"), ("part", "snippet,status")])
            .bearer_auth(token)
            .header("X-Upload-Content-Type", "video/mp4")
            .header("X-Upload-Content-Length", size.to_string())
            .json(&body)
            .send()
            .await
            .and_then(|res| res.error_for_status())
            .map_err(|e| PipelineError::Upload(format!("cannot start upload session: {e}")))?;

        res.headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(String::from)
            .ok_or_else(|| PipelineError::Upload("upload session has no location".to_string()))
    }

    async fn set_thumbnail(&self, token: &str, video_id: &str, thumbnail: &Path) {
        let bytes = match tokio::fs::read(thumbnail).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Cannot read thumbnail {}: {}", thumbnail.display(), e);
                return;
            }
        };
        let result = self
            .client
            .post(THUMBNAIL_URL)
            .query(&[("videoId", video_id)])
            .bearer_auth(token)
            .header(CONTENT_TYPE, "image/jpeg")
            .body(bytes)
            .send()
            .await
            .and_then(|res| res.error_for_status());
        match result {
            Ok(_) => info!("Thumbnail set for video {}", video_id),
            Err(e) => warn!("Failed to set thumbnail for {}: {}", video_id, e),
        }
    }
}

#[async_trait]
impl Uploader for YouTubeUploader {
    async fn upload(
        &self,
        channel: &ChannelTarget,
        video: &Path,
        metadata: &VideoMetadata,
        thumbnail: Option<&Path>,
    ) -> Result<String, PipelineError> {
        if !channel.credentials.is_configured() {
            return Err(PipelineError::Configuration {
                channel: channel.key.clone(),
                reason: "missing OAuth client id, secret or refresh token".to_string(),
            });
        }

        info!("Uploading {} to {}", video.display(), channel.name);
        let bytes = tokio::fs::read(video).await?;
        let token = self.access_token(channel).await?;
        let session = self.start_session(&token, metadata, bytes.len()).await?;
        debug!("Resumable upload session opened for {}", channel.key);

        let uploaded: UploadedVideo = self
            .client
            .put(&session)
            .bearer_auth(&token)
            .header(CONTENT_TYPE, "video/mp4")
            .header(CONTENT_LENGTH, bytes.len())
            .body(bytes)
            .send()
            .await
            .and_then(|res| res.error_for_status())
            .map_err(|e| PipelineError::Upload(format!("video transfer failed: {e}")))?
            .json()
            .await
            .map_err(|e| PipelineError::Upload(format!("cannot decode upload response: {e}")))?;

        info!(
            "Video uploaded to {}: https://www.youtube.com/watch?v={}",
            channel.name, uploaded.id
        );
        if let Some(thumbnail) = thumbnail {
            self.set_thumbnail(&token, &uploaded.id, thumbnail).await;
        }
        Ok(uploaded.id)
    }
}
