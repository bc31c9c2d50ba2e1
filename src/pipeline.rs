//! One production run: story, narration, video, thumbnail, upload.
//!
//! Stages run strictly in order and each is gated on the previous one. Stage
//! failures never escape [`StageRunner::run`]; they come back as
//! [`RunOutcome::Failed`]. Transient artifacts (audio, thumbnail) are removed
//! before `run` returns on every path, including panics inside a
//! collaborator. The finished video is always kept.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use futures::FutureExt;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::channel::ChannelTarget;
use crate::config::AppConfig;
use crate::error::PipelineError;
use crate::story::{StoryGenerator, TextGenerator};
use crate::tracker::UploadTracker;
use crate::tts::{EdgeTts, SpeechSynthesizer};
use crate::upload::{MetadataBuilder, Uploader, YouTubeUploader};
use crate::utils::remove_file_quietly;
use crate::video::{FfmpegComposer, ThumbnailExtractor, VideoComposer};

/// The external services a run talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub generator: Arc<dyn TextGenerator>,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
    pub composer: Arc<dyn VideoComposer>,
    pub thumbnails: Arc<dyn ThumbnailExtractor>,
    pub uploader: Arc<dyn Uploader>,
}

impl Collaborators {
    /// Production bindings: Ollama or templates, edge-tts, ffmpeg, YouTube.
    pub fn from_config(config: &AppConfig) -> Result<Self, PipelineError> {
        let composer = Arc::new(FfmpegComposer::new(
            config.video.clone(),
            config.paths.temp.clone(),
        )?);
        Ok(Self {
            generator: Arc::new(StoryGenerator::from_config(&config.story)?),
            synthesizer: Arc::new(EdgeTts::new(config.tts.clone())),
            composer: composer.clone(),
            thumbnails: composer,
            uploader: Arc::new(YouTubeUploader::new()?),
        })
    }
}

#[derive(Debug, Clone)]
pub struct RunSettings {
    pub temp_dir: PathBuf,
    pub output_dir: PathBuf,
    pub skip_upload: bool,
    pub thumbnail_offset: Duration,
}

impl RunSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            temp_dir: config.paths.temp.clone(),
            output_dir: config.paths.output.clone(),
            skip_upload: config.automation.skip_upload,
            thumbnail_offset: Duration::from_secs(config.video.thumbnail_offset_secs),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Generate,
    Synthesize,
    Compose,
    Thumbnail,
    Upload,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Generate => "generate",
            Stage::Synthesize => "synthesize",
            Stage::Compose => "compose",
            Stage::Thumbnail => "thumbnail",
            Stage::Upload => "upload",
        };
        f.write_str(name)
    }
}

/// Progress of a single run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Started,
    Generated,
    AudioReady,
    VideoReady,
    ThumbnailReady,
    Uploaded,
    SkippedUpload,
    Failed(Stage),
}

impl RunState {
    /// The stage that runs after this state; used to attribute panics.
    fn next_stage(self) -> Stage {
        match self {
            RunState::Started => Stage::Generate,
            RunState::Generated => Stage::Synthesize,
            RunState::AudioReady => Stage::Compose,
            RunState::VideoReady => Stage::Thumbnail,
            RunState::ThumbnailReady | RunState::Uploaded | RunState::SkippedUpload => Stage::Upload,
            RunState::Failed(stage) => stage,
        }
    }
}

#[derive(Debug)]
pub struct StageFailure {
    pub stage: Stage,
    pub error: PipelineError,
    pub title: Option<String>,
    pub channel: Option<String>,
}

impl fmt::Display for StageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} stage failed: {}", self.stage, self.error)
    }
}

#[derive(Debug)]
pub enum RunOutcome {
    /// Uploaded and counted against the channel's quota.
    Uploaded {
        channel: String,
        remote_id: String,
        video: PathBuf,
    },
    /// Upload disabled; the video stays in the output directory.
    Saved { video: PathBuf },
    /// No channel may post right now. A normal negative result.
    NotScheduled { video: PathBuf },
    Failed(StageFailure),
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Uploaded { .. } | RunOutcome::Saved { .. })
    }

    pub fn video(&self) -> Option<&Path> {
        match self {
            RunOutcome::Uploaded { video, .. }
            | RunOutcome::Saved { video }
            | RunOutcome::NotScheduled { video } => Some(video),
            RunOutcome::Failed(_) => None,
        }
    }
}

/// Transient files owned by one run, removed when the guard goes out of scope.
#[derive(Debug, Default)]
struct TransientArtifacts {
    paths: Vec<PathBuf>,
}

impl TransientArtifacts {
    fn track(&mut self, path: &Path) {
        if !self.paths.iter().any(|p| p == path) {
            self.paths.push(path.to_path_buf());
        }
    }

    fn cleanup(&mut self) {
        for path in self.paths.drain(..) {
            remove_file_quietly(&path);
        }
    }
}

impl Drop for TransientArtifacts {
    fn drop(&mut self) {
        self.cleanup();
    }
}

pub struct StageRunner {
    collaborators: Collaborators,
    tracker: Arc<UploadTracker>,
    channels: Vec<ChannelTarget>,
    metadata: MetadataBuilder,
    settings: RunSettings,
}

impl StageRunner {
    pub fn new(
        collaborators: Collaborators,
        tracker: Arc<UploadTracker>,
        channels: Vec<ChannelTarget>,
        metadata: MetadataBuilder,
        settings: RunSettings,
    ) -> Self {
        Self {
            collaborators,
            tracker,
            channels,
            metadata,
            settings,
        }
    }

    /// Configured channels, in configuration order.
    pub fn channels(&self) -> &[ChannelTarget] {
        &self.channels
    }

    pub fn tracker(&self) -> &UploadTracker {
        &self.tracker
    }

    pub fn skip_upload(&self) -> bool {
        self.settings.skip_upload
    }

    pub fn output_dir(&self) -> &Path {
        &self.settings.output_dir
    }

    /// Produce one video and, unless uploads are disabled, publish it to
    /// `channel` or to the first configured channel whose schedule allows it.
    pub async fn run(&self, channel: Option<&ChannelTarget>) -> RunOutcome {
        let run_id = Uuid::new_v4();
        let span = info_span!(
            "pipeline_run",
            run = %run_id.simple(),
            channel = channel.map_or("auto", |c| c.key.as_str()),
        );

        let mut state = RunState::Started;
        let result = AssertUnwindSafe(self.run_stages(run_id, channel, &mut state))
            .catch_unwind()
            .instrument(span.clone())
            .await;

        match result {
            Ok(outcome) => outcome,
            Err(panic) => {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                let stage = state.next_stage();
                span.in_scope(|| error!(%stage, "Pipeline panicked: {}", reason));
                RunOutcome::Failed(StageFailure {
                    stage,
                    error: PipelineError::Io(std::io::Error::other(format!("panic: {reason}"))),
                    title: None,
                    channel: channel.map(|c| c.key.clone()),
                })
            }
        }
    }

    async fn run_stages(
        &self,
        run_id: Uuid,
        channel: Option<&ChannelTarget>,
        state: &mut RunState,
    ) -> RunOutcome {
        let c = &self.collaborators;
        let bound = channel.map(|ch| ch.key.clone());

        info!("Starting pipeline run");
        let story = match c.generator.generate(None).await {
            Ok(story) => story,
            Err(e) => return fail(state, Stage::Generate, e, None, bound),
        };
        *state = RunState::Generated;
        info!(
            title = %story.title,
            theme = %story.theme,
            words = story.word_count,
            fallback = story.is_fallback,
            "Story generated"
        );
        let title = Some(story.title.clone());

        let mut transient = TransientArtifacts::default();
        if let Err(e) = tokio::fs::create_dir_all(&self.settings.temp_dir).await {
            return fail(state, Stage::Synthesize, e.into(), title, bound);
        }
        let audio_path = self
            .settings
            .temp_dir
            .join(format!("audio_{}.mp3", run_id.simple()));
        transient.track(&audio_path);
        let audio = match c.synthesizer.synthesize(&story.body, &audio_path).await {
            Ok(audio) => audio,
            Err(e) => return fail(state, Stage::Synthesize, e, title, bound),
        };
        transient.track(&audio);
        *state = RunState::AudioReady;

        let video_path = self.settings.output_dir.join(format!(
            "video_{}_{}.mp4",
            Local::now().format("%Y-%m-%d_%H-%M-%S"),
            run_id.simple()
        ));
        let video = match c.composer.compose(&story, &audio, &video_path).await {
            Ok(video) => video,
            Err(e) => {
                // The narration is useless without its video.
                transient.cleanup();
                return fail(state, Stage::Compose, e, title, bound);
            }
        };
        *state = RunState::VideoReady;

        let thumb_path = self
            .settings
            .temp_dir
            .join(format!("thumbnail_{}.jpg", run_id.simple()));
        transient.track(&thumb_path);
        let thumbnail = c
            .thumbnails
            .extract_frame(&video, self.settings.thumbnail_offset, &thumb_path)
            .await;
        match &thumbnail {
            Some(path) => {
                transient.track(path);
                *state = RunState::ThumbnailReady;
            }
            None => warn!("Continuing without thumbnail"),
        }

        if self.settings.skip_upload {
            *state = RunState::SkippedUpload;
            info!("Upload skipped, video saved to {}", video.display());
            return RunOutcome::Saved { video };
        }

        let target = match channel {
            Some(ch) => Some(ch).filter(|ch| self.tracker.should_post_now(ch)),
            None => self.channels.iter().find(|ch| self.tracker.should_post_now(ch)),
        };
        let Some(target) = target else {
            info!("No channel may post right now, video kept at {}", video.display());
            return RunOutcome::NotScheduled { video };
        };

        let metadata = self.metadata.build(&story);
        match c
            .uploader
            .upload(target, &video, &metadata, thumbnail.as_deref())
            .await
        {
            Ok(remote_id) => {
                *state = RunState::Uploaded;
                match self.tracker.record_upload(&target.key) {
                    Ok(count) => info!(
                        channel = %target.key,
                        title = %story.title,
                        remote_id = %remote_id,
                        uploads_today = count,
                        "Upload recorded"
                    ),
                    Err(e) => error!(channel = %target.key, error = %e, "Upload succeeded but could not be counted"),
                }
                RunOutcome::Uploaded {
                    channel: target.key.clone(),
                    remote_id,
                    video,
                }
            }
            Err(e) => fail(state, Stage::Upload, e, title, Some(target.key.clone())),
        }
    }
}

fn fail(
    state: &mut RunState,
    stage: Stage,
    error: PipelineError,
    title: Option<String>,
    channel: Option<String>,
) -> RunOutcome {
    *state = RunState::Failed(stage);
    error!(
        %stage,
        channel = channel.as_deref().unwrap_or("-"),
        title = title.as_deref().unwrap_or("-"),
        "Pipeline stage failed: {}",
        error
    );
    RunOutcome::Failed(StageFailure {
        stage,
        error,
        title,
        channel,
    })
}
