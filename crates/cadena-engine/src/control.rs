//! Local control server.
//!
//! A unix-domain stream socket speaking line-delimited JSON, one
//! request per connection:
//!
//! - `{"cmd":"list_types"}` → the node-type manifest
//! - `{"cmd":"get_chain"}` → the last accepted chain spec
//! - `{"cmd":"set_chain","chain":{..}}` → validate, build, persist,
//!   publish
//!
//! Every response is exactly one line of JSON with an `ok` flag.
//! `set_chain` touches `pending` only after validation, build and the
//! atomic disk write have all succeeded; any earlier failure leaves
//! the running chain untouched and reports `{"ok":false,"error":..}`.
//!
//! The accept loop is non-blocking with a short sleep so it observes
//! shutdown promptly; the socket file is unlinked on start collision
//! and again on exit.

use std::io::{self, BufRead, BufReader, Read, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cadena_chain::{
    chain_to_json, node_type_manifest, parse_chain_value, persist_chain, validate_chain_spec,
    ChainSpec,
};
use cadena_dsp::{ModelLoader, ProcessContext};
use serde_json::{json, Value};

use crate::chain::{build_chain, NodeTimingTable};
use crate::swap::EngineShared;

/// Upper bound on a single request line.
const MAX_REQUEST_BYTES: u64 = 1024 * 1024;

/// Sleep between accept polls; bounds shutdown latency.
const ACCEPT_POLL: Duration = Duration::from_millis(100);

/// Everything the control thread needs to serve requests.
pub struct ControlContext {
    /// Shared swap state; `set_chain` publishes here.
    pub shared: Arc<EngineShared>,
    /// Build context for incoming chains.
    pub ctx: ProcessContext,
    /// Amp-model collaborator.
    pub models: Arc<dyn ModelLoader>,
    /// Timing table handed to newly built chains.
    pub timing: Option<Arc<NodeTimingTable>>,
    /// Where accepted chains are persisted.
    pub config_path: PathBuf,
    /// Last accepted spec; what `get_chain` serves. Seeded from the
    /// boot chain, updated on each accepted `set_chain`. Control
    /// thread only.
    pub last_spec: Option<ChainSpec>,
}

/// Bind the control socket and spawn the server thread.
///
/// Binding happens on the caller so startup failures (bad path,
/// permissions) surface immediately instead of inside the thread.
pub fn spawn_control_server(
    socket_path: PathBuf,
    mut state: ControlContext,
) -> io::Result<JoinHandle<()>> {
    // A previous run may have left its socket file behind.
    let _ = std::fs::remove_file(&socket_path);

    let listener = UnixListener::bind(&socket_path)?;
    listener.set_nonblocking(true)?;
    log::info!("control socket listening at {}", socket_path.display());

    thread::Builder::new()
        .name("cadena-control".to_string())
        .spawn(move || {
            while state.shared.is_running() {
                match listener.accept() {
                    Ok((stream, _addr)) => {
                        if let Err(e) = handle_connection(&mut state, stream) {
                            log::warn!("control connection failed: {e}");
                        }
                    }
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                        thread::sleep(ACCEPT_POLL);
                    }
                    Err(e) => {
                        log::error!("control accept failed: {e}");
                        break;
                    }
                }
            }
            drop(listener);
            let _ = std::fs::remove_file(&socket_path);
        })
}

fn handle_connection(state: &mut ControlContext, stream: UnixStream) -> io::Result<()> {
    stream.set_read_timeout(Some(Duration::from_millis(500)))?;

    let mut line = String::new();
    let mut reader = BufReader::new(&stream).take(MAX_REQUEST_BYTES);
    reader.read_line(&mut line)?;
    if line.trim().is_empty() {
        return Ok(());
    }

    let response = match serde_json::from_str::<Value>(line.trim_end()) {
        Ok(request) => handle_request(state, &request),
        Err(e) => json!({"ok": false, "error": format!("parse error: {e}")}),
    };

    let mut text = response.to_string();
    text.push('\n');
    (&stream).write_all(text.as_bytes())
}

fn handle_request(state: &mut ControlContext, request: &Value) -> Value {
    if !request.is_object() {
        return json!({"ok": false, "error": "request must be an object"});
    }
    let Some(cmd) = request.get("cmd").and_then(Value::as_str) else {
        return json!({"ok": false, "error": "missing string cmd"});
    };

    match cmd {
        "list_types" => json!({"ok": true, "types": node_type_manifest()}),
        "get_chain" => match &state.last_spec {
            Some(spec) => json!({"ok": true, "chain": chain_to_json(spec)}),
            None => json!({"ok": false, "error": "no chain accepted"}),
        },
        "set_chain" => set_chain(state, request),
        _ => json!({"ok": false, "error": "unknown cmd"}),
    }
}

fn set_chain(state: &mut ControlContext, request: &Value) -> Value {
    let Some(chain_doc) = request.get("chain") else {
        return json!({"ok": false, "error": "missing chain"});
    };

    let mut spec = match parse_chain_value(chain_doc) {
        Ok(spec) => spec,
        Err(e) => return json!({"ok": false, "error": e.to_string()}),
    };

    // The engine's rate is fixed for its lifetime; chains always build
    // against it.
    spec.sample_rate = state.ctx.sample_rate;

    let spec = match validate_chain_spec(spec) {
        Ok(spec) => spec,
        Err(e) => return json!({"ok": false, "error": e.to_string()}),
    };

    let built = match build_chain(
        &spec,
        &state.ctx,
        state.models.as_ref(),
        state.timing.clone(),
    ) {
        Ok(built) => built,
        Err(e) => return json!({"ok": false, "error": e.to_string()}),
    };

    if let Err(e) = persist_chain(&state.config_path, &spec) {
        return json!({"ok": false, "error": format!("persist failed: {e}")});
    }

    state.last_spec = Some(spec);
    state.shared.publish_chain(built.chain);
    log::info!("accepted new chain, pending install");

    match built.warning {
        Some(warning) => json!({"ok": true, "warning": warning}),
        None => json!({"ok": true}),
    }
}
