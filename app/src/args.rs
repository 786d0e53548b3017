use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "dream")]
#[command(version)]
#[command(about = "Runs a Dream project directory")]
pub struct CliArgs {
    /// Project directory containing project.json
    #[arg(default_value = ".", env = "DREAM_PROJECT")]
    pub project: PathBuf,

    /// Engine settings file (JSON)
    #[arg(long, env = "DREAM_CONFIG")]
    pub config: Option<PathBuf>,

    /// Stop after this many frames
    #[arg(long)]
    pub frames: Option<u64>,

    /// Task threads, overriding the settings file
    #[arg(long, env = "DREAM_THREADS")]
    pub threads: Option<usize>,

    /// Log level, overriding the settings file
    #[arg(long)]
    pub log_level: Option<String>,

    /// Step frames from an interactive console instead of running freely
    #[arg(long)]
    pub console: bool,
}
