//! Control-server tests over a real unix socket.

use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use cadena_dsp::{AmpModel, ModelLoadError, ModelLoader, ModelProcessError, ProcessContext};
use cadena_engine::{spawn_control_server, ControlContext, EngineShared};
use serde_json::{json, Value};

struct UnityLoader;

impl ModelLoader for UnityLoader {
    fn load(&self, _path: &Path) -> Result<Box<dyn AmpModel>, ModelLoadError> {
        struct Unity;
        impl AmpModel for Unity {
            fn reset_and_prewarm(&mut self, _sr: u32, _frames: usize) {}
            fn process(
                &mut self,
                input: &[f32],
                output: &mut [f32],
            ) -> Result<(), ModelProcessError> {
                output.copy_from_slice(input);
                Ok(())
            }
        }
        Ok(Box::new(Unity))
    }
}

struct Server {
    shared: Arc<EngineShared>,
    socket_path: PathBuf,
    config_path: PathBuf,
    handle: Option<std::thread::JoinHandle<()>>,
    _dir: tempfile::TempDir,
}

fn start_server() -> Server {
    let dir = tempfile::tempdir().unwrap();
    let socket_path = dir.path().join("control.sock");
    let config_path = dir.path().join("chain.json");
    let shared = EngineShared::new(false);

    let handle = spawn_control_server(
        socket_path.clone(),
        ControlContext {
            shared: shared.clone(),
            ctx: ProcessContext::new(48000, 128),
            models: Arc::new(UnityLoader),
            timing: None,
            config_path: config_path.clone(),
            last_spec: None,
        },
    )
    .unwrap();

    Server {
        shared,
        socket_path,
        config_path,
        handle: Some(handle),
        _dir: dir,
    }
}

impl Server {
    fn request_raw(&self, line: &str) -> String {
        let mut stream = UnixStream::connect(&self.socket_path).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        stream.write_all(line.as_bytes()).unwrap();
        stream.write_all(b"\n").unwrap();

        let mut response = String::new();
        BufReader::new(&stream).read_line(&mut response).unwrap();
        response
    }

    fn request(&self, body: &Value) -> Value {
        let response = self.request_raw(&body.to_string());
        serde_json::from_str(response.trim_end()).unwrap()
    }

    fn stop(mut self) {
        self.shared.request_stop();
        self.handle.take().unwrap().join().unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while self.socket_path.exists() {
            assert!(Instant::now() < deadline, "socket file not removed");
            std::thread::sleep(Duration::from_millis(10));
        }
    }
}

fn valid_chain_doc() -> Value {
    json!({
        "version": 1,
        "chain": [
            {"id": "input", "type": "input", "params": {"inputTrimDb": 0.0}},
            {"id": "amp1", "type": "nam_model", "enabled": false},
            {"id": "cab1", "type": "ir_convolver", "enabled": false},
            {"id": "output", "type": "output"},
        ],
    })
}

#[test]
fn full_round_trip_over_the_socket() {
    let server = start_server();

    // list_types works before any chain is accepted.
    let resp = server.request(&json!({"cmd": "list_types"}));
    assert_eq!(resp["ok"], true);
    let types: Vec<&str> = resp["types"]["types"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["type"].as_str().unwrap())
        .collect();
    assert!(types.contains(&"nam_model"));

    // get_chain fails first.
    let resp = server.request(&json!({"cmd": "get_chain"}));
    assert_eq!(resp["ok"], false);

    // set_chain validates, persists and publishes.
    let resp = server.request(&json!({"cmd": "set_chain", "chain": valid_chain_doc()}));
    assert_eq!(resp["ok"], true, "{resp}");
    assert!(server.config_path.exists());
    assert!(server.shared.has_pending());

    // get_chain now serves the accepted spec, one line of JSON.
    let resp = server.request(&json!({"cmd": "get_chain"}));
    assert_eq!(resp["ok"], true);
    assert_eq!(resp["chain"]["version"], 1);
    assert_eq!(resp["chain"]["chain"].as_array().unwrap().len(), 4);

    server.stop();
}

#[test]
fn rejects_malformed_and_unknown_requests() {
    let server = start_server();

    let resp = server.request_raw("this is not json");
    let resp: Value = serde_json::from_str(resp.trim_end()).unwrap();
    assert_eq!(resp["ok"], false);
    assert!(resp["error"].as_str().unwrap().contains("parse error"));

    let resp = server.request(&json!({"cmd": "frobnicate"}));
    assert_eq!(resp["error"], "unknown cmd");

    let resp = server.request(&json!({"no_cmd": true}));
    assert_eq!(resp["error"], "missing string cmd");

    server.stop();
}

#[test]
fn failed_set_chain_leaves_state_untouched() {
    let server = start_server();

    // Accept one good chain first.
    let resp = server.request(&json!({"cmd": "set_chain", "chain": valid_chain_doc()}));
    assert_eq!(resp["ok"], true);
    let accepted = std::fs::read_to_string(&server.config_path).unwrap();

    // An invalid chain (cab before amp) must change nothing.
    let bad = json!({
        "version": 1,
        "chain": [
            {"id": "input", "type": "input"},
            {"id": "cab1", "type": "ir_convolver", "enabled": false},
            {"id": "amp1", "type": "nam_model", "enabled": false},
            {"id": "output", "type": "output"},
        ],
    });
    let resp = server.request(&json!({"cmd": "set_chain", "chain": bad}));
    assert_eq!(resp["ok"], false);
    assert!(resp["error"]
        .as_str()
        .unwrap()
        .contains("'nam_model' must appear before"));

    assert_eq!(
        std::fs::read_to_string(&server.config_path).unwrap(),
        accepted,
        "persisted chain must be untouched after a rejected edit"
    );

    // The previously accepted spec still serves.
    let resp = server.request(&json!({"cmd": "get_chain"}));
    assert_eq!(resp["ok"], true);

    server.stop();
}

#[test]
fn legacy_shape_is_accepted_over_the_socket() {
    let server = start_server();

    let legacy = json!({
        "audio": {"inputTrimDb": -3.0},
        "chain": {},
    });
    let resp = server.request(&json!({"cmd": "set_chain", "chain": legacy}));
    // Converted to the canonical four-node chain; amp and cab have no
    // assets, so both bypass with warnings.
    assert_eq!(resp["ok"], true, "{resp}");
    let warning = resp["warning"].as_str().unwrap();
    assert!(warning.contains("nam_model missing asset.path"));
    assert!(warning.contains("ir_convolver missing asset.path"));

    let resp = server.request(&json!({"cmd": "get_chain"}));
    let ids: Vec<&str> = resp["chain"]["chain"]
        .as_array()
        .unwrap()
        .iter()
        .map(|n| n["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, ["input", "amp1", "cab1", "output"]);

    server.stop();
}
