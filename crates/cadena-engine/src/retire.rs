//! Retirement worker: drops replaced chains off the audio thread.
//!
//! The audio thread pushes every replaced `Box<SignalChain>` into a
//! bounded SPSC ring; this worker is the sole consumer. Dropping a
//! chain here runs the expensive teardown (FFT plans, model instances,
//! history buffers) on an ordinary thread. On shutdown the worker
//! drains whatever is left before exiting, so no handle is ever lost.

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::chain::SignalChain;
use crate::swap::EngineShared;

/// Poll interval between drains.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Spawn the retirement worker. Returns the join handle; the thread
/// exits once [`EngineShared::request_stop`] is called and the ring is
/// drained.
pub fn spawn_retirement_worker(
    shared: Arc<EngineShared>,
    mut retire_rx: rtrb::Consumer<Box<SignalChain>>,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("cadena-retire".to_string())
        .spawn(move || {
            while shared.is_running() {
                drain(&shared, &mut retire_rx);
                thread::sleep(POLL_INTERVAL);
            }
            // Final drain so shutdown never leaks a chain.
            drain(&shared, &mut retire_rx);
        })
}

fn drain(shared: &EngineShared, retire_rx: &mut rtrb::Consumer<Box<SignalChain>>) {
    while let Ok(chain) = retire_rx.pop() {
        log::debug!(
            "retiring chain instance {} ({} nodes)",
            chain.instance_id(),
            chain.len()
        );
        drop(chain);
        shared
            .retired_count
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::swap::RETIRE_QUEUE_CAPACITY;
    use cadena_chain::ChainSpec;
    use cadena_dsp::ProcessContext;
    use std::time::Instant;

    fn empty_chain() -> Box<SignalChain> {
        Box::new(SignalChain::new(
            ChainSpec::default(),
            Vec::new(),
            ProcessContext::new(48000, 8),
            None,
        ))
    }

    fn wait_for(mut cond: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while !cond() {
            assert!(Instant::now() < deadline, "condition never held");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn drains_enqueued_chains() {
        let shared = EngineShared::new(false);
        let (mut tx, rx) = rtrb::RingBuffer::new(RETIRE_QUEUE_CAPACITY);
        let worker = spawn_retirement_worker(shared.clone(), rx).unwrap();

        for _ in 0..3 {
            tx.push(empty_chain()).unwrap();
        }
        wait_for(|| shared.retired_count() == 3);

        shared.request_stop();
        worker.join().unwrap();
    }

    #[test]
    fn final_drain_covers_late_enqueues() {
        let shared = EngineShared::new(false);
        let (mut tx, rx) = rtrb::RingBuffer::new(RETIRE_QUEUE_CAPACITY);

        // Stop already requested and a chain already queued: the worker
        // must still drain it on its way out.
        shared.request_stop();
        tx.push(empty_chain()).unwrap();

        let worker = spawn_retirement_worker(shared.clone(), rx).unwrap();
        worker.join().unwrap();

        assert_eq!(shared.retired_count(), 1);
    }
}
