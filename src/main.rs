use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use savewatch_lib::{OutputMode, WatcherSettings};

#[derive(Debug, Parser)]
#[command(name = "savewatch", about = "Watches Teslagrad 2 save slots and tracks splits")]
struct Cli {
    /// JSON settings file; missing files fall back to defaults.
    #[arg(long)]
    settings: Option<PathBuf>,
    #[arg(long)]
    save_path: Option<PathBuf>,
    /// Directory for episode logs and completed-run exports.
    #[arg(long)]
    output_dir: Option<PathBuf>,
    #[arg(long)]
    poll_ms: Option<u64>,
    #[arg(long)]
    save_log: bool,
    #[arg(long)]
    save_runs: bool,
    /// Print full JSON snapshots instead of activity lines.
    #[arg(long)]
    json: bool,
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn resolve_settings(&self) -> Result<WatcherSettings, String> {
        let mut settings = match &self.settings {
            Some(settings_path) => WatcherSettings::load(settings_path)?,
            None => WatcherSettings::default(),
        };

        if let Some(save_path) = &self.save_path {
            settings.save_path = save_path.clone();
        }
        if let Some(output_dir) = &self.output_dir {
            settings.output_directory = output_dir.clone();
        }
        if let Some(poll_ms) = self.poll_ms {
            settings.poll_interval_ms = poll_ms;
        }
        settings.save_activity_log |= self.save_log;
        settings.save_completed_runs |= self.save_runs;

        Ok(settings)
    }
}

#[tokio::main]
async fn main() -> Result<(), String> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if cli.verbose {
            "savewatch=debug,savewatch_lib=debug"
        } else {
            "savewatch=info,savewatch_lib=info"
        })
    });
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    let settings = cli.resolve_settings()?;
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::ActivityLines
    };

    savewatch_lib::run(settings, output_mode).await
}
