//! Engine daemon command.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;

use cadena_dsp::NamFileLoader;
use cadena_engine::{run_audio_loop, ChainRuntime, EngineConfig};

use crate::audio::{CpalDuplex, DuplexConfig};

#[derive(Args)]
pub struct RunArgs {
    /// Chain file (loaded at boot, rewritten on accepted edits)
    #[arg(long, default_value = "/var/lib/cadena/chain.json")]
    config: PathBuf,

    /// Control socket path
    #[arg(long, default_value = "/tmp/cadena.sock")]
    socket: PathBuf,

    /// Capture device (index, exact name, or partial name)
    #[arg(short, long)]
    input: Option<String>,

    /// Playback device (index, exact name, or partial name)
    #[arg(short, long)]
    output: Option<String>,

    /// Sample rate
    #[arg(long, default_value = "48000")]
    sample_rate: u32,

    /// Period length in frames (also the convolver block size)
    #[arg(long, default_value = "256")]
    period: usize,

    /// Click-safe swap ramp in samples (0 = swap hard at the period
    /// boundary)
    #[arg(long, default_value = "0")]
    ramp_samples: u32,

    /// Bypass all processing (capture straight to playback)
    #[arg(long)]
    passthrough: bool,

    /// Record per-node and per-period timing
    #[arg(long)]
    timing: bool,
}

pub fn run(args: RunArgs) -> anyhow::Result<()> {
    let mut device = CpalDuplex::open(&DuplexConfig {
        sample_rate: args.sample_rate,
        period_frames: args.period,
        input_device: args.input,
        output_device: args.output,
    })?;

    println!("cadena engine");
    println!("  sample rate: {} Hz", args.sample_rate);
    println!("  period: {} frames", args.period);
    println!("  chain file: {}", args.config.display());
    println!("  control socket: {}", args.socket.display());
    println!("\nPress Ctrl+C to stop...\n");

    let (runtime, mut coordinator) = ChainRuntime::start(
        EngineConfig {
            config_path: args.config,
            socket_path: args.socket,
            ramp_samples: args.ramp_samples,
            passthrough: args.passthrough,
            timing: args.timing,
        },
        args.sample_rate,
        args.period,
        Arc::new(NamFileLoader::new()),
    )?;

    let shared = runtime.shared().clone();
    ctrlc::set_handler(move || {
        println!("\nStopping...");
        shared.request_stop();
    })?;

    // The period loop runs on this thread until shutdown or a fatal
    // device error.
    if let Err(e) = run_audio_loop(&mut device, &mut coordinator) {
        log::error!("audio loop stopped: {e}");
    }

    if device.overruns() > 0 {
        log::warn!("{} capture samples dropped to ring overruns", device.overruns());
    }

    runtime.stop();
    println!("Done.");
    Ok(())
}
