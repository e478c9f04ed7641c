use backup2s3::backup::orchestrator::run;
use backup2s3::backup::run_config::RunConfig;
use clap::Parser;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process::exit;
use std::sync::Mutex;
use tracing::{error, warn, Level};

/// Backup a local directory to an existing S3 bucket
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: PathBuf,
}

fn init_logging(log_file: Option<&Path>) {
    let builder = tracing_subscriber::fmt().with_max_level(Level::INFO);
    match log_file.map(|p| OpenOptions::new().create(true).append(true).open(p)) {
        Some(Ok(file)) => builder.with_ansi(false).with_writer(Mutex::new(file)).init(),
        Some(Err(e)) => {
            builder.init();
            warn!("Cannot open log file {:?}, logging to stderr: {e}", log_file);
        }
        None => builder.init(),
    }
}

fn main() {
    let args = Args::parse();

    let code = match RunConfig::load(&args.config) {
        Ok(config) => {
            init_logging(config.log_file().as_deref());
            run(&config).exit_code()
        }
        Err(failure) => {
            init_logging(None);
            error!("{failure}");
            failure.exit_code()
        }
    };

    exit(code);
}
