use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "storyshorts", version, about = "Generate and upload story shorts")]
pub struct Args {
    #[clap(long, global = true, default_value = "config/config.yaml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Produce a batch of videos now.
    Generate {
        #[clap(short = 'n', long, default_value_t = 1)]
        count: u32,

        /// Upload only to this channel.
        #[clap(long, conflicts_with = "broadcast")]
        channel: Option<String>,

        /// One video per configured channel on every iteration.
        #[clap(long)]
        broadcast: bool,

        #[clap(long, conflicts_with = "upload")]
        skip_upload: bool,

        /// Upload even if the configuration disables uploads.
        #[clap(long)]
        upload: bool,

        /// Seconds to wait between videos.
        #[clap(long, default_value_t = 30)]
        delay: u64,
    },
    /// Run the automation supervisor until interrupted.
    Automate,
    /// Show per-channel quotas, today's uploads and recent history.
    Status,
    /// Check external tools, the story model, directories and channel credentials.
    Check,
    /// Obtain a YouTube refresh token for a channel.
    Auth {
        #[clap(long)]
        channel: String,
    },
}
