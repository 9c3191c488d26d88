mod cli;
mod config;
mod error;
mod launch;
mod logging;
mod utils;

use crate::cli::Cli;
use crate::error::Result;
use clap::Parser;
use tracing::{debug, error, info};

fn main() {
    if let Err(e) = run_app() {
        eprintln!("\n❌ Error: {}", e);
        std::process::exit(1);
    }
}

fn run_app() -> Result<()> {
    let cli = Cli::parse();
    logging::setup_logging(cli.verbose, cli.quiet, cli.log_file.as_deref())?;

    info!("🚀 CPML CLI v{} starting up.", env!("CARGO_PKG_VERSION"));
    debug!("Full CLI arguments parsed: {:?}", &cli);

    match launch::run(&cli) {
        Ok(summary) => {
            info!(
                frames = summary.total_frames,
                rounds = summary.rounds,
                "✅ Run completed successfully."
            );
            println!("✅ Run completed successfully.");
            Ok(())
        }
        Err(e) => {
            error!("❌ Run failed: {}", e);
            Err(e)
        }
    }
}
