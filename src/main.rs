use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use nimbus::Result;
use nimbus::config::Config;
use nimbus::pipeline::BatchRunner;
use nimbus::readers::write_profiles;
use nimbus::simulation::{ExtinctionModel, Simulator};

/// Cloud detection and aerosol extinction retrieval for ceilometers
#[derive(Parser, Debug)]
#[command(name = "nimbus")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the retrieval on every input file covered by a configuration
    Run {
        /// Path to the JSON configuration
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Write a day of synthetic profiles
    Simulate {
        /// Extinction model: empty, step or aloft
        #[arg(short, long, default_value = "step")]
        model: ExtinctionModel,

        /// Output JSON file
        #[arg(short, long)]
        output: PathBuf,

        #[arg(long, default_value_t = 1064.0)]
        wavelength: f64,

        #[arg(long, default_value_t = 50.0)]
        lidar_ratio: f64,

        /// Noise relative to the peak extinction
        #[arg(long, default_value_t = 0.0)]
        noise: f64,

        /// Day of the simulated profiles (YYYY-MM-DD)
        #[arg(long)]
        date: Option<NaiveDate>,

        #[arg(long, default_value_t = 0)]
        seed: u64,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    match cli.command {
        Commands::Run { config } => {
            let config = Config::from_file(config)?;
            let runner = BatchRunner::new(config)?;
            let files = runner.process()?;
            info!(files = files.len(), "processing complete");
        }
        Commands::Simulate {
            model,
            output,
            wavelength,
            lidar_ratio,
            noise,
            date,
            seed,
        } => {
            let mut simulator = Simulator::new(model, wavelength, lidar_ratio, noise).with_seed(seed);
            if let Some(date) = date {
                simulator.date = date;
            }
            let simulated = simulator.simulate()?;
            write_profiles(&output, &simulated.profiles)?;
            info!(file = %output.display(), "simulated profiles written");
        }
    }

    Ok(())
}
