use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "healthsync")]
#[command(about = "Periodic background upload of health measurements", long_about = None)]
pub struct Cli {
    /// Directory holding the database and settings (default: platform data dir)
    #[arg(long, global = true, env = "HEALTHSYNC_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Settings file (default: <data-dir>/settings.json)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the data directory, database and a default settings file
    Init,
    /// Run the sync loop until interrupted (SIGUSR1 locks, SIGUSR2 unlocks)
    Run {
        /// Project to sync into; falls back to the last synced project
        #[arg(short, long)]
        project: Option<i64>,
    },
    /// List projects available on the server
    Projects,
    /// Show the watermark and recent sync cycles
    Status {
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },
    /// Load samples, locations and the user profile from a JSON-lines file
    Import { file: PathBuf },
}
