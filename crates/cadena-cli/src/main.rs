//! cadena - low-latency guitar amp/cab engine.

mod audio;
mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "cadena")]
#[command(author, version, about = "Low-latency guitar signal-chain engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the engine daemon on an audio device pair
    Run(commands::run::RunArgs),

    /// List capture and playback devices
    Devices(commands::devices::DevicesArgs),

    /// Talk to a running engine's control socket
    Chain(commands::chain::ChainArgs),
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => commands::run::run(args),
        Commands::Devices(args) => commands::devices::run(args),
        Commands::Chain(args) => commands::chain::run(args),
    }
}
