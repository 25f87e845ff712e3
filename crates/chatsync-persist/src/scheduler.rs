//! Debounced, single-flight flush scheduling.
//!
//! [`FlushScheduler`] holds at most one pending state and one deadline.
//! Each [`FlushScheduler::schedule`] replaces the pending state and re-arms
//! the deadline to `now + delay`, so a burst of mutations inside one quiet
//! window produces exactly one flush carrying the last state. A background
//! worker runs due flushes one at a time; [`FlushScheduler::flush_now`]
//! shares the same flight lock, so at most one flush is ever in progress.
//! The pending state is only taken while holding that lock, so a flush never
//! writes a state older than the one before it. A schedule that lands while
//! a flush is running arms a follow-up flush.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::PersistError;

/// Default quiet period before a scheduled flush runs.
pub const DEFAULT_FLUSH_DELAY: Duration = Duration::from_millis(250);

/// Destination of flushed states.
#[async_trait]
pub trait FlushSink<T>: Send + Sync + 'static {
    async fn flush(&self, state: T) -> Result<(), PersistError>;
}

struct Slot<T> {
    pending: Option<T>,
    deadline: Option<Instant>,
}

struct Shared<T> {
    slot: Mutex<Slot<T>>,
    delay: Mutex<Duration>,
    notify: Notify,
    flight: tokio::sync::Mutex<()>,
    flushes: AtomicUsize,
    failures: AtomicUsize,
    sink: Arc<dyn FlushSink<T>>,
}

impl<T: Send + 'static> Shared<T> {
    /// Takes the pending state if its deadline has passed.
    fn take_due(&self) -> Option<T> {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        match slot.deadline {
            Some(deadline) if deadline <= Instant::now() => {
                slot.deadline = None;
                slot.pending.take()
            }
            _ => None,
        }
    }

    fn take_any(&self) -> Option<T> {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        slot.deadline = None;
        slot.pending.take()
    }

    fn deadline(&self) -> Option<Instant> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .deadline
    }

    /// Hands `state` to the sink. Callers hold `flight`.
    async fn run(&self, state: T) {
        match self.sink.flush(state).await {
            Ok(()) => {
                self.flushes.fetch_add(1, Ordering::SeqCst);
                tracing::debug!("flushed state");
            }
            Err(err) => {
                self.failures.fetch_add(1, Ordering::SeqCst);
                tracing::warn!(error = %err, "flush failed; state stays in memory only");
            }
        }
    }

    async fn worker(self: Arc<Self>) {
        loop {
            match self.deadline() {
                None => self.notify.notified().await,
                Some(deadline) => {
                    tokio::select! {
                        _ = tokio::time::sleep_until(deadline) => {
                            let _flight = self.flight.lock().await;
                            // A newer schedule may have re-armed the deadline
                            // while this waited for the lock.
                            if let Some(state) = self.take_due() {
                                self.run(state).await;
                            }
                        }
                        _ = self.notify.notified() => {}
                    }
                }
            }
        }
    }
}

pub struct FlushScheduler<T> {
    shared: Arc<Shared<T>>,
    worker: JoinHandle<()>,
}

impl<T: Send + 'static> FlushScheduler<T> {
    /// Creates a scheduler and spawns its worker on the current runtime.
    pub fn new(sink: Arc<dyn FlushSink<T>>, delay: Duration) -> Self {
        let shared = Arc::new(Shared {
            slot: Mutex::new(Slot {
                pending: None,
                deadline: None,
            }),
            delay: Mutex::new(delay),
            notify: Notify::new(),
            flight: tokio::sync::Mutex::new(()),
            flushes: AtomicUsize::new(0),
            failures: AtomicUsize::new(0),
            sink,
        });
        let worker = tokio::spawn(Arc::clone(&shared).worker());
        FlushScheduler { shared, worker }
    }

    /// Replaces the pending state and re-arms the deadline.
    pub fn schedule(&self, state: T) {
        let delay = self.delay();
        {
            let mut slot = self
                .shared
                .slot
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            slot.pending = Some(state);
            slot.deadline = Some(Instant::now() + delay);
        }
        self.shared.notify.notify_one();
    }

    /// Drops the pending state without flushing it.
    pub fn cancel(&self) {
        drop(self.shared.take_any());
        self.shared.notify.notify_one();
    }

    /// Flushes the pending state immediately, waiting out any flush already
    /// in flight. Returns whether there was anything to flush.
    pub async fn flush_now(&self) -> bool {
        let _flight = self.shared.flight.lock().await;
        match self.shared.take_any() {
            Some(state) => {
                self.shared.run(state).await;
                true
            }
            None => false,
        }
    }

    pub fn delay(&self) -> Duration {
        *self
            .shared
            .delay
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Changes the quiet period for subsequent schedules.
    pub fn set_delay(&self, delay: Duration) {
        *self
            .shared
            .delay
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = delay;
    }

    /// Number of flushes the sink accepted.
    pub fn flush_count(&self) -> usize {
        self.shared.flushes.load(Ordering::SeqCst)
    }

    /// Number of flushes the sink rejected.
    pub fn failure_count(&self) -> usize {
        self.shared.failures.load(Ordering::SeqCst)
    }
}

impl<T> Drop for FlushScheduler<T> {
    fn drop(&mut self) {
        self.worker.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Recorder {
        seen: Mutex<Vec<u32>>,
    }

    #[async_trait]
    impl FlushSink<u32> for Recorder {
        async fn flush(&self, state: u32) -> Result<(), PersistError> {
            self.seen.lock().unwrap().push(state);
            Ok(())
        }
    }

    fn recorder() -> Arc<Recorder> {
        Arc::new(Recorder {
            seen: Mutex::new(Vec::new()),
        })
    }

    struct SlowRecorder {
        seen: Mutex<Vec<u32>>,
        delay: Duration,
    }

    #[async_trait]
    impl FlushSink<u32> for SlowRecorder {
        async fn flush(&self, state: u32) -> Result<(), PersistError> {
            tokio::time::sleep(self.delay).await;
            self.seen.lock().unwrap().push(state);
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn burst_inside_window_flushes_last_state_once() {
        let sink = recorder();
        let scheduler = FlushScheduler::new(sink.clone(), Duration::from_millis(250));
        for i in 1..=5 {
            scheduler.schedule(i);
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(*sink.seen.lock().unwrap(), vec![5]);
        assert_eq!(scheduler.flush_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn each_schedule_re_arms_the_deadline() {
        let sink = recorder();
        let scheduler = FlushScheduler::new(sink.clone(), Duration::from_millis(100));
        scheduler.schedule(1);
        tokio::time::sleep(Duration::from_millis(80)).await;
        scheduler.schedule(2);
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(sink.seen.lock().unwrap().is_empty());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(*sink.seen.lock().unwrap(), vec![2]);
    }

    #[tokio::test(start_paused = true)]
    async fn flush_now_skips_the_wait_and_cancel_drops() {
        let sink = recorder();
        let scheduler = FlushScheduler::new(sink.clone(), Duration::from_secs(60));
        scheduler.schedule(7);
        assert!(scheduler.flush_now().await);
        assert!(!scheduler.flush_now().await);

        scheduler.schedule(8);
        scheduler.cancel();
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(*sink.seen.lock().unwrap(), vec![7]);
    }

    #[tokio::test(start_paused = true)]
    async fn superseded_state_is_not_written_after_a_slow_flush() {
        let sink = Arc::new(SlowRecorder {
            seen: Mutex::new(Vec::new()),
            delay: Duration::from_secs(1),
        });
        let scheduler = FlushScheduler::new(sink.clone(), Duration::from_millis(10));
        scheduler.schedule(1);

        let later = async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            scheduler.schedule(2);
            // The timer for 2 fires while 1 is still being written.
            tokio::time::sleep(Duration::from_millis(15)).await;
            scheduler.schedule(3);
            scheduler.flush_now().await;
            sink.seen.lock().unwrap().clone()
        };
        let (first, seen_after_flush_now) = tokio::join!(scheduler.flush_now(), later);

        assert!(first);
        assert_eq!(seen_after_flush_now, vec![1, 3]);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(*sink.seen.lock().unwrap(), vec![1, 3]);
        assert_eq!(scheduler.flush_count(), 2);
    }
}
