// Lorekeep: Debouncer
//
// Coalesces bursts of triggers into one job. Every trigger restarts the timer
// and drops the job queued by the previous trigger; only the last one in a
// burst runs. A job whose timer already fired is never interrupted.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use log::debug;
use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::atoms::error::{LoreError, LoreResult};

#[derive(Default)]
struct Slot {
    generation: u64,
    handle: Option<JoinHandle<()>>,
    /// The queued job's timer elapsed and the job is running or done.
    fired: bool,
}

pub struct Debouncer {
    delay: Duration,
    slot: Arc<Mutex<Slot>>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            slot: Arc::new(Mutex::new(Slot::default())),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Queue `job` to run after the delay, replacing any queued job.
    /// Must be called from within a tokio runtime.
    pub fn trigger<F>(&self, job: F) -> LoreResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| LoreError::Other(format!("debounce needs a tokio runtime: {e}")))?;

        let mut slot = self.slot.lock();
        if let Some(previous) = slot.handle.take() {
            if !slot.fired {
                previous.abort();
                debug!("[lorekeep:window] Debounce restarted");
            }
        }
        slot.generation += 1;
        slot.fired = false;

        let generation = slot.generation;
        let shared = Arc::clone(&self.slot);
        let delay = self.delay;
        slot.handle = Some(runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut s = shared.lock();
                if s.generation != generation {
                    return;
                }
                s.fired = true;
            }
            job.await;
        }));
        Ok(())
    }

    /// Drop the queued job. Returns true if one was waiting.
    pub fn cancel(&self) -> bool {
        let mut slot = self.slot.lock();
        slot.generation += 1;
        match slot.handle.take() {
            Some(handle) if !slot.fired && !handle.is_finished() => {
                handle.abort();
                true
            }
            _ => false,
        }
    }

    /// True while a job is waiting for its timer.
    pub fn is_pending(&self) -> bool {
        let slot = self.slot.lock();
        match &slot.handle {
            Some(handle) => !slot.fired && !handle.is_finished(),
            None => false,
        }
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}
