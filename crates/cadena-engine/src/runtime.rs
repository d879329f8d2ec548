//! Engine runtime: thread lifecycle and boot sequence.
//!
//! Wires the pieces together the way the daemon runs them: load the
//! persisted chain (boot-safe), start the retirement worker, the
//! control server and the stats reporter, and hand the caller a
//! [`SwapCoordinator`] to drive from the device loop. Shutdown flips
//! one flag; every thread observes it and winds down in order.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cadena_chain::load_chain_file;
use cadena_dsp::{ModelLoader, ProcessContext};

use crate::chain::{build_chain, NodeTimingTable, SignalChain};
use crate::control::{spawn_control_server, ControlContext};
use crate::retire::spawn_retirement_worker;
use crate::swap::{
    CoordinatorOptions, EngineShared, SwapCoordinator, RETIRE_QUEUE_CAPACITY,
};

/// Interval between stats reports.
const STATS_INTERVAL: Duration = Duration::from_secs(2);

/// Engine configuration supplied by the host binary.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Persisted chain file; loaded at boot, rewritten on accepted
    /// `set_chain`.
    pub config_path: PathBuf,
    /// Control socket path.
    pub socket_path: PathBuf,
    /// Click-safe swap ramp length in samples (0 disables ramping).
    pub ramp_samples: u32,
    /// Start bypassed (debug knob).
    pub passthrough: bool,
    /// Enable per-node and per-period timing.
    pub timing: bool,
}

/// Handles to the engine's background threads.
pub struct ChainRuntime {
    shared: Arc<EngineShared>,
    control: Option<JoinHandle<()>>,
    retire: Option<JoinHandle<()>>,
    stats: Option<JoinHandle<()>>,
    timing: Option<Arc<NodeTimingTable>>,
}

impl ChainRuntime {
    /// Boot the engine for a device reporting `sample_rate` and
    /// `period_frames`. Returns the runtime and the coordinator to
    /// move onto the audio thread.
    pub fn start(
        config: EngineConfig,
        sample_rate: u32,
        period_frames: usize,
        models: Arc<dyn ModelLoader>,
    ) -> io::Result<(Self, SwapCoordinator)> {
        let shared = EngineShared::new(config.passthrough);
        let timing = config.timing.then(|| Arc::new(NodeTimingTable::new()));

        let ctx = ProcessContext {
            sample_rate,
            max_block_frames: period_frames,
            input_trim: Some(shared.input_trim.clone()),
        };

        // Boot-safe chain load: a missing or broken chain file starts
        // the engine chainless (passthrough) rather than failing.
        let (boot_chain, boot_spec) = match load_chain_file(&config.config_path) {
            Ok(spec) => match build_chain(&spec, &ctx, models.as_ref(), timing.clone()) {
                Ok(built) => {
                    if let Some(warning) = &built.warning {
                        log::warn!("boot chain warnings:\n{warning}");
                    }
                    log::info!(
                        "boot chain loaded from {} ({} nodes)",
                        config.config_path.display(),
                        built.chain.len()
                    );
                    (Some(built.chain), Some(spec))
                }
                Err(e) => {
                    log::warn!("boot chain build failed, starting chainless: {e}");
                    (None, None)
                }
            },
            Err(e) => {
                log::warn!("no boot chain ({e}), starting chainless");
                (None, None)
            }
        };

        let (retire_tx, retire_rx) = rtrb::RingBuffer::<Box<SignalChain>>::new(RETIRE_QUEUE_CAPACITY);
        let coordinator = SwapCoordinator::new(
            shared.clone(),
            retire_tx,
            boot_chain,
            CoordinatorOptions {
                ramp_samples: config.ramp_samples,
                timing: config.timing,
                period_frames,
                sample_rate,
            },
        );

        let retire = spawn_retirement_worker(shared.clone(), retire_rx)?;

        let control = spawn_control_server(
            config.socket_path.clone(),
            ControlContext {
                shared: shared.clone(),
                ctx,
                models,
                timing: timing.clone(),
                config_path: config.config_path.clone(),
                last_spec: boot_spec,
            },
        )?;

        let stats = spawn_stats_reporter(shared.clone(), timing.clone())?;

        Ok((
            Self {
                shared,
                control: Some(control),
                retire: Some(retire),
                stats: Some(stats),
                timing,
            },
            coordinator,
        ))
    }

    /// Shared state handle.
    pub fn shared(&self) -> &Arc<EngineShared> {
        &self.shared
    }

    /// Timing table, when timing is enabled.
    pub fn timing(&self) -> Option<&Arc<NodeTimingTable>> {
        self.timing.as_ref()
    }

    /// Request shutdown and join every background thread.
    pub fn stop(mut self) {
        self.shared.request_stop();
        for handle in [
            self.control.take(),
            self.retire.take(),
            self.stats.take(),
        ]
        .into_iter()
        .flatten()
        {
            if handle.join().is_err() {
                log::error!("engine thread panicked during shutdown");
            }
        }
    }
}

fn spawn_stats_reporter(
    shared: Arc<EngineShared>,
    timing: Option<Arc<NodeTimingTable>>,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("cadena-stats".to_string())
        .spawn(move || {
            let mut last_retire_full = 0u64;
            while shared.is_running() {
                // Sleep in short slices so shutdown is prompt.
                let mut slept = Duration::ZERO;
                while shared.is_running() && slept < STATS_INTERVAL {
                    let slice = Duration::from_millis(100);
                    thread::sleep(slice);
                    slept += slice;
                }
                if !shared.is_running() {
                    break;
                }

                let retire_full = shared.retire_full();
                if retire_full > last_retire_full {
                    log::warn!(
                        "retirement ring saturated ({} times total); swaps are being deferred",
                        retire_full
                    );
                    last_retire_full = retire_full;
                }

                log::debug!(
                    "stats: swaps={} retired={} retire_full={} overruns={} peak_in={:.3} peak_out={:.3}",
                    shared.swap_count(),
                    shared.retired_count(),
                    retire_full,
                    shared.overruns(),
                    shared.peak_input.take(),
                    shared.peak_output.take(),
                );

                if let Some(table) = &timing {
                    for stat in table.snapshot(true) {
                        if stat.calls > 0 {
                            log::debug!(
                                "timing: {} calls={} avg_us={:.1} max_us={}",
                                stat.node_type,
                                stat.calls,
                                stat.sum_us as f64 / stat.calls as f64,
                                stat.max_us,
                            );
                        }
                    }
                }
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadena_dsp::{AmpModel, ModelLoadError};
    use std::path::Path;

    struct NoModels;

    impl ModelLoader for NoModels {
        fn load(&self, _path: &Path) -> Result<Box<dyn AmpModel>, ModelLoadError> {
            Err(ModelLoadError::Backend("no backend in tests".to_string()))
        }
    }

    fn config(dir: &tempfile::TempDir) -> EngineConfig {
        EngineConfig {
            config_path: dir.path().join("chain.json"),
            socket_path: dir.path().join("control.sock"),
            ramp_samples: 0,
            passthrough: false,
            timing: false,
        }
    }

    #[test]
    fn starts_chainless_without_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let (runtime, mut coordinator) =
            ChainRuntime::start(config(&dir), 48000, 64, Arc::new(NoModels)).unwrap();

        assert_eq!(runtime.shared().active_instance(), 0);

        // Chainless periods pass through.
        let input = vec![0.25f32; 64];
        let mut output = vec![0.0f32; 64];
        coordinator.run_period(&input, &mut output);
        assert_eq!(output, input);

        runtime.stop();
    }

    #[test]
    fn boots_from_persisted_chain() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(&dir);
        std::fs::write(
            &cfg.config_path,
            r#"{"version":1,"sampleRate":48000,"chain":[
                {"id":"input","type":"input"},
                {"id":"amp1","type":"nam_model","enabled":false},
                {"id":"cab1","type":"ir_convolver","enabled":false},
                {"id":"output","type":"output"}
            ]}"#,
        )
        .unwrap();

        let (runtime, _coordinator) =
            ChainRuntime::start(cfg, 48000, 64, Arc::new(NoModels)).unwrap();
        assert_ne!(runtime.shared().active_instance(), 0);
        runtime.stop();
    }

    #[test]
    fn stop_joins_all_threads() {
        let dir = tempfile::tempdir().unwrap();
        let (runtime, coordinator) =
            ChainRuntime::start(config(&dir), 48000, 64, Arc::new(NoModels)).unwrap();
        drop(coordinator);
        runtime.stop();
        // Socket file is removed by the control thread on exit.
        assert!(!dir.path().join("control.sock").exists());
    }
}
