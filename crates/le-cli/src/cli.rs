//! Command-line argument definitions.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Lecture engagement analytics.
///
/// Aggregates attention, watch-time and view telemetry from lecture viewers
/// into per-lecture statistics.
#[derive(Debug, Parser)]
#[command(name = "le", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the analytics ingress.
    Serve {
        /// Address to listen on (overrides `server.bind`).
        #[arg(long)]
        bind: Option<SocketAddr>,
    },

    /// Show the analytics record for one lecture.
    Stats {
        /// Lecture identifier.
        lecture_id: String,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show the database location and a summary of every lecture.
    Status,

    /// Drive a recorded viewing trace through the viewer state machine.
    Replay {
        /// JSONL trace file, one step per line.
        trace: PathBuf,

        /// Send telemetry to the configured ingress instead of the local database.
        #[arg(long)]
        post: bool,
    },

    /// Score one camera frame with the configured inference service.
    Infer {
        /// JPEG frame to send.
        frame: PathBuf,

        /// Lecture the frame belongs to.
        lecture_id: String,
    },
}
