// CLI definition (clap derive)

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "focusbuddy",
    about = "Camera presence monitoring for focus sessions",
    version
)]
pub struct Cli {
    /// Data directory (defaults to the platform data dir + "focusbuddy")
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the session aggregation HTTP server
    Serve {
        /// Address to listen on, e.g. 0.0.0.0:5000
        #[arg(long)]
        bind: Option<String>,
    },
    /// Monitor one focus session in the terminal
    Watch(WatchArgs),
    /// Print the locally stored sessions and aggregates of a user as JSON
    Summary {
        #[arg(long, default_value = "local")]
        user: String,
    },
    /// Delete every locally stored session of a user
    Clear {
        #[arg(long, default_value = "local")]
        user: String,
    },
}

#[derive(Args, Debug, Clone)]
pub struct WatchArgs {
    /// Directory of image frames used as the camera
    #[arg(long)]
    pub frames: Option<PathBuf>,

    /// Read presence from stdin, one line per sample ("1"/"0", "present"/"absent")
    #[arg(long, conflicts_with = "frames")]
    pub stdin_presence: bool,

    /// End the session automatically after this many seconds
    #[arg(long)]
    pub duration: Option<u64>,

    /// Upload the ended session to this aggregation server instead of the local store
    #[arg(long, requires = "token")]
    pub server: Option<String>,

    /// Bearer token for --server
    #[arg(long)]
    pub token: Option<String>,

    /// User id for the local store
    #[arg(long, default_value = "local")]
    pub user: String,

    /// Absent ticks before the first warning
    #[arg(long)]
    pub t1: Option<u32>,

    /// Further absent ticks before escalating
    #[arg(long)]
    pub t2: Option<u32>,

    /// Minimum luma standard deviation of a frame counted as presence
    #[arg(long)]
    pub min_contrast: Option<f64>,

    /// Discard the session instead of recording it
    #[arg(long)]
    pub discard: bool,
}
