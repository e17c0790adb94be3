//! Progressive reveal of an already complete reply.
//!
//! The emitter turns a full string into a timed sequence of growing
//! prefixes, one more character per tick. It keeps no state between
//! invocations; single-flight is enforced by the controller.

use std::str::CharIndices;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::Instrument;

/// Tick period used when nothing else is configured.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(20);

/// Iterator over the non-empty prefixes of a string, growing by one
/// character at a time and ending with the string itself.
#[derive(Clone, Debug)]
pub struct Prefixes<'a> {
    text: &'a str,
    chars: CharIndices<'a>,
}

impl<'a> Iterator for Prefixes<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        let (idx, ch) = self.chars.next()?;
        Some(&self.text[..idx + ch.len_utf8()])
    }
}

/// Returns the prefixes the emitter reveals for `text`.
#[inline]
pub fn prefixes(text: &str) -> Prefixes<'_> {
    Prefixes {
        text,
        chars: text.char_indices(),
    }
}

/// Shared between a reveal task and its handle.
///
/// `busy` is held for the whole duration of a callback, so a `cancel` from
/// elsewhere waits for the ongoing tick. A `cancel` issued from inside the
/// callback itself is recognized through `ticking_on` and doesn't wait.
#[derive(Debug, Default)]
struct Gate {
    cancelled: AtomicBool,
    busy: Mutex<()>,
    ticking_on: Mutex<Option<ThreadId>>,
}

impl Gate {
    /// Runs `f` unless cancelled. Returns `false` if cancelled.
    fn run(&self, f: impl FnOnce()) -> bool {
        let _busy = lock(&self.busy);
        if self.cancelled.load(Ordering::SeqCst) {
            return false;
        }
        *lock(&self.ticking_on) = Some(thread::current().id());
        f();
        *lock(&self.ticking_on) = None;
        true
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        let reentrant =
            *lock(&self.ticking_on) == Some(thread::current().id());
        if !reentrant {
            drop(lock(&self.busy));
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Reveals text at a fixed cadence.
#[derive(Clone, Copy, Debug)]
pub struct StreamEmitter {
    tick_interval: Duration,
}

impl StreamEmitter {
    /// Creates an emitter ticking every `tick_interval`, which is raised
    /// to one millisecond if shorter.
    #[inline]
    pub fn new(tick_interval: Duration) -> Self {
        Self {
            tick_interval: tick_interval.max(Duration::from_millis(1)),
        }
    }

    /// Returns the tick period.
    #[inline]
    pub fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    /// Starts revealing `target`.
    ///
    /// `on_tick` receives every prefix in order, one per tick, the first
    /// one a tick period after this call. After the full text has been
    /// delivered, `on_done` fires exactly once. An empty target finishes
    /// immediately: `on_done` is invoked before this method returns and
    /// no tick fires.
    ///
    /// The callbacks run on the reveal task. Calling
    /// [`StreamHandle::cancel`] from within `on_tick` is allowed; the tick in
    /// progress completes and nothing fires after it.
    ///
    /// Must be called within a Tokio runtime.
    pub fn start<T, D>(
        &self,
        target: String,
        on_tick: T,
        on_done: D,
    ) -> StreamHandle
    where
        T: FnMut(&str) + Send + 'static,
        D: FnOnce() + Send + 'static,
    {
        let gate = Arc::new(Gate::default());
        if target.is_empty() {
            on_done();
            return StreamHandle { gate, task: None };
        }

        let period = self.tick_interval;
        let task_gate = Arc::clone(&gate);
        let task = tokio::spawn(
            async move {
                let mut on_tick = on_tick;
                let mut ticker = interval_at(Instant::now() + period, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

                for prefix in prefixes(&target) {
                    ticker.tick().await;
                    let ticked = task_gate.run(|| {
                        trace!("tick: {} bytes", prefix.len());
                        on_tick(prefix);
                    });
                    if !ticked {
                        trace!("cancelled");
                        return;
                    }
                }

                if task_gate.run(on_done) {
                    trace!("finished");
                }
            }
            .instrument(trace_span!("stream")),
        );

        StreamHandle {
            gate,
            task: Some(task),
        }
    }
}

impl Default for StreamEmitter {
    #[inline]
    fn default() -> Self {
        Self::new(DEFAULT_TICK_INTERVAL)
    }
}

/// Handle to a running reveal.
///
/// Dropping the handle does not stop the reveal; call
/// [`StreamHandle::cancel`] for that.
#[derive(Debug)]
pub struct StreamHandle {
    gate: Arc<Gate>,
    task: Option<JoinHandle<()>>,
}

impl StreamHandle {
    /// Stops the reveal. No tick fires after this returns, and `on_done`
    /// is not invoked. Calling it again, or after completion, is a no-op.
    pub fn cancel(&self) {
        self.gate.cancel();
        if let Some(task) = &self.task {
            task.abort();
        }
    }

    /// Returns `true` once the reveal has completed or been cancelled.
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }
}
