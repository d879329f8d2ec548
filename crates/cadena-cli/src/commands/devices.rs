//! Device listing command.

use clap::Args;
use cpal::traits::{DeviceTrait, HostTrait};

#[derive(Args)]
pub struct DevicesArgs {
    /// Only list capture devices
    #[arg(long)]
    input: bool,

    /// Only list playback devices
    #[arg(long)]
    output: bool,
}

pub fn run(args: DevicesArgs) -> anyhow::Result<()> {
    let host = cpal::default_host();
    let both = !args.input && !args.output;

    if args.input || both {
        println!("Capture devices:");
        for (index, device) in host.input_devices()?.enumerate() {
            let name = device.name().unwrap_or_else(|_| "<unknown>".to_string());
            let rate = device
                .default_input_config()
                .map(|c| c.sample_rate().0.to_string())
                .unwrap_or_else(|_| "?".to_string());
            println!("  [{index}] {name} ({rate} Hz)");
        }
    }

    if args.output || both {
        println!("Playback devices:");
        for (index, device) in host.output_devices()?.enumerate() {
            let name = device.name().unwrap_or_else(|_| "<unknown>".to_string());
            let rate = device
                .default_output_config()
                .map(|c| c.sample_rate().0.to_string())
                .unwrap_or_else(|_| "?".to_string());
            println!("  [{index}] {name} ({rate} Hz)");
        }
    }

    Ok(())
}
