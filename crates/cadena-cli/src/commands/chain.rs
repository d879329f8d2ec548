//! Control-socket client command.
//!
//! Speaks the engine's line-delimited JSON protocol: one request per
//! connection, one-line response printed to stdout.

use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Subcommand};
use serde_json::{json, Value};

#[derive(Args)]
pub struct ChainArgs {
    /// Control socket of the running engine
    #[arg(long, default_value = "/tmp/cadena.sock")]
    socket: PathBuf,

    #[command(subcommand)]
    action: ChainAction,
}

#[derive(Subcommand)]
enum ChainAction {
    /// Print the node-type manifest
    ListTypes,

    /// Print the currently accepted chain
    Get,

    /// Validate, build and install a chain from a JSON file
    Set {
        /// Chain document (canonical v1 or legacy shape)
        file: PathBuf,
    },
}

pub fn run(args: ChainArgs) -> anyhow::Result<()> {
    let request = match &args.action {
        ChainAction::ListTypes => json!({"cmd": "list_types"}),
        ChainAction::Get => json!({"cmd": "get_chain"}),
        ChainAction::Set { file } => {
            let text = std::fs::read_to_string(file)
                .with_context(|| format!("reading {}", file.display()))?;
            let chain: Value = serde_json::from_str(&text)
                .with_context(|| format!("parsing {}", file.display()))?;
            json!({"cmd": "set_chain", "chain": chain})
        }
    };

    let response = send_request(&args.socket, &request)?;
    println!("{response}");

    let ok = response.get("ok").and_then(Value::as_bool).unwrap_or(false);
    if !ok {
        anyhow::bail!("engine rejected the request");
    }
    Ok(())
}

fn send_request(socket: &PathBuf, request: &Value) -> anyhow::Result<Value> {
    let mut stream = UnixStream::connect(socket)
        .with_context(|| format!("connecting to {}", socket.display()))?;

    let mut line = request.to_string();
    line.push('\n');
    stream.write_all(line.as_bytes()).context("sending request")?;

    let mut response = String::new();
    BufReader::new(&stream)
        .read_line(&mut response)
        .context("reading response")?;
    serde_json::from_str(response.trim_end()).context("parsing response")
}
