//! Per-session liveness timeout (RFC 2326 §12.37).
//!
//! Each session owns one timer thread. Commands push the deadline forward
//! with [`LivenessTimer::note_liveness`]; the thread is never restarted.
//! If the deadline passes, the expiry callback runs once on the timer
//! thread. [`LivenessTimer::cancel`] stops the thread and joins it.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use super::SessionId;

struct TimerState {
    deadline: Instant,
    /// Set by cancel() or once the timer has fired.
    done: bool,
}

struct Shared {
    state: Mutex<TimerState>,
    wakeup: Condvar,
    timeout: Duration,
}

pub struct LivenessTimer {
    shared: Arc<Shared>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl LivenessTimer {
    /// Arm a countdown of `timeout` and spawn the thread that watches it.
    pub fn start<F>(session_id: SessionId, timeout: Duration, on_expiry: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let shared = Arc::new(Shared {
            state: Mutex::new(TimerState {
                deadline: Instant::now() + timeout,
                done: false,
            }),
            wakeup: Condvar::new(),
            timeout,
        });

        let thread_shared = shared.clone();
        let spawned = thread::Builder::new()
            .name(format!("liveness-{session_id}"))
            .spawn(move || run(thread_shared, session_id, on_expiry));

        let handle = match spawned {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::error!(%session_id, error = %e, "failed to spawn liveness timer");
                None
            }
        };

        Self {
            shared,
            handle: Mutex::new(handle),
        }
    }

    /// Reset the countdown to the full timeout from now.
    pub fn note_liveness(&self) {
        let mut state = self.shared.state.lock();
        state.deadline = Instant::now() + self.shared.timeout;
    }

    pub fn deadline(&self) -> Instant {
        self.shared.state.lock().deadline
    }

    pub fn timeout(&self) -> Duration {
        self.shared.timeout
    }

    /// Whether the timer was cancelled or has already fired.
    pub fn is_done(&self) -> bool {
        self.shared.state.lock().done
    }

    /// Stop the timer thread and wait for it to exit.
    ///
    /// Safe to call from the expiry callback itself; the join is skipped
    /// when running on the timer thread.
    pub fn cancel(&self) {
        {
            let mut state = self.shared.state.lock();
            state.done = true;
        }
        self.shared.wakeup.notify_all();

        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                tracing::warn!("liveness timer thread panicked");
            }
        }
    }
}

impl Drop for LivenessTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

fn run<F>(shared: Arc<Shared>, session_id: SessionId, on_expiry: F)
where
    F: FnOnce(),
{
    let mut state = shared.state.lock();
    loop {
        if state.done {
            tracing::trace!(%session_id, "liveness timer stopped");
            return;
        }
        let deadline = state.deadline;
        if Instant::now() >= deadline {
            state.done = true;
            break;
        }
        shared.wakeup.wait_until(&mut state, deadline);
    }
    drop(state);

    tracing::info!(%session_id, timeout_secs = shared.timeout.as_secs(), "session liveness timeout");
    on_expiry();
}
