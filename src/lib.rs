//! Generates narrated story shorts and uploads them to YouTube channels on a
//! per-channel posting schedule with daily quotas.

pub mod audio;
pub mod automation;
pub mod background;
pub mod channel;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod pipeline;
pub mod status;
pub mod store;
pub mod story;
pub mod subtitle;
pub mod templates;
pub mod tracker;
pub mod tts;
pub mod upload;
pub mod utils;
pub mod video;
