mod compress;
mod deliver;
mod get_image;

pub use compress::{format_bytes, run_compress, CompressReport};
pub use deliver::run_deliver;
pub use get_image::run_get_image;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "imagegate", version, about = "Deliver Slack message images within size budgets")]
pub struct Cli {
    /// Config file (JSON5, YAML or TOML)
    #[arg(short, long, global = true)]
    pub config: Option<String>,
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fetch the images referenced by a dump of Slack messages
    Deliver(DeliverOpts),
    /// Fetch one image by Slack file ID
    GetImage(GetImageOpts),
    /// Transcode PNG files to JPEG and report the savings
    Compress(CompressOpts),
    Config(ConfigOpts),
    Version,
}

#[derive(clap::Args)]
pub struct DeliverOpts {
    /// Slack message JSON: one message, an array, or a conversations.history response
    #[arg(short, long)]
    pub messages: PathBuf,
    /// Inline byte budget; defaults to images.inlineBudgetBytes
    #[arg(short, long, conflicts_with = "pooled")]
    pub budget: Option<u64>,
    /// Download concurrently without a budget or re-encoding
    #[arg(long)]
    pub pooled: bool,
    /// Directory to write delivered images to
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    /// Print delivered images as a JSON array of {mimeType, data}
    #[arg(long)]
    pub json: bool,
}

#[derive(clap::Args)]
pub struct GetImageOpts {
    pub file_id: String,
    /// Where to write the image
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(clap::Args)]
pub struct CompressOpts {
    /// PNG file or directory containing PNG files
    #[arg(short, long)]
    pub input: PathBuf,
    #[arg(short, long, default_value_t = 80, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub quality: u8,
    /// Output directory; defaults to the directory of the input
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(clap::Args)]
pub struct ConfigOpts {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand)]
pub enum ConfigAction {
    Show,
    Validate,
    Init,
}
