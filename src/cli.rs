use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "movdemux")]
#[command(author, version, about = "MOV/MP4 demuxer and inspection tool")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show stream and track information for a media file
    Info {
        /// File to inspect
        #[arg(required = true)]
        file: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List packets in decode order
    Packets {
        /// File to demux
        #[arg(required = true)]
        file: PathBuf,

        /// Stop after this many packets
        #[arg(short, long)]
        limit: Option<usize>,

        /// Seek to this position (milliseconds) before reading
        #[arg(long)]
        seek_ms: Option<i64>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Display version information
    Version,
}
