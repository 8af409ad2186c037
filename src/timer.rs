//! One-shot deadline bound to a cancellation handle.
//!
//! Deadlines run on tokio's monotonic clock, so tests can drive them with
//! `tokio::time::pause` instead of waiting in real time.

use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use tokio::{task::AbortHandle, time::Instant};
use tokio_util::sync::CancellationToken;

type ExpireFn = Box<dyn FnOnce() + Send>;

/// Triggerable capability that aborts an in-flight operation.
///
/// Clones share the same underlying signal; cancelling is idempotent.
#[derive(Clone, Debug, Default)]
pub struct CancellationHandle {
    token: CancellationToken,
}

impl CancellationHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the handle has been triggered.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }
}

struct TimerInner {
    handle: CancellationHandle,
    settled: AtomicBool,
    fired: AtomicBool,
    on_expire: Mutex<Option<ExpireFn>>,
}

impl TimerInner {
    fn take_callback(&self) -> Option<ExpireFn> {
        self.on_expire
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }

    fn fire(&self) -> bool {
        if self.settled.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.fired.store(true, Ordering::SeqCst);
        if let Some(callback) = self.take_callback() {
            callback();
        }
        self.handle.cancel();
        true
    }
}

/// Armed deadline for a single call.
///
/// Dropping the timer disarms it, so a deadline can never fire after the
/// owning call has settled.
pub struct CancellationTimer {
    inner: Arc<TimerInner>,
    task: AbortHandle,
    deadline: Instant,
}

impl CancellationTimer {
    /// Arm a deadline `after` from now. Must be called within a tokio runtime.
    ///
    /// When the deadline elapses before [`disarm`](Self::disarm), `on_expire`
    /// runs once and the bound [`CancellationHandle`] is triggered.
    pub fn arm(after: Duration, on_expire: impl FnOnce() + Send + 'static) -> Self {
        let inner = Arc::new(TimerInner {
            handle: CancellationHandle::new(),
            settled: AtomicBool::new(false),
            fired: AtomicBool::new(false),
            on_expire: Mutex::new(Some(Box::new(on_expire))),
        });
        let deadline = Instant::now() + after;
        let task_inner = inner.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            task_inner.fire();
        })
        .abort_handle();
        Self {
            inner,
            task,
            deadline,
        }
    }

    /// Cancellation handle to bind to the network operation.
    pub fn handle(&self) -> CancellationHandle {
        self.inner.handle.clone()
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn is_armed(&self) -> bool {
        !self.inner.settled.load(Ordering::SeqCst)
    }

    /// Whether the deadline fired. A cancel issued directly on the handle
    /// does not count.
    pub fn has_fired(&self) -> bool {
        self.inner.fired.load(Ordering::SeqCst)
    }

    /// Stop the deadline. Returns `false` if it had already fired or been disarmed.
    pub fn disarm(&self) -> bool {
        self.task.abort();
        if self.inner.settled.swap(true, Ordering::SeqCst) {
            return false;
        }
        drop(self.inner.take_callback());
        true
    }

    /// Fire the deadline now. No effect once fired or disarmed.
    pub fn fire(&self) -> bool {
        let fired = self.inner.fire();
        if fired {
            self.task.abort();
        }
        fired
    }
}

impl Drop for CancellationTimer {
    fn drop(&mut self) {
        self.disarm();
    }
}

impl fmt::Debug for CancellationTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationTimer")
            .field("deadline", &self.deadline)
            .field("armed", &self.is_armed())
            .field("fired", &self.has_fired())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    fn counter() -> (Arc<AtomicUsize>, impl FnOnce() + Send + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        (count, move || {
            c.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test(start_paused = true)]
    async fn fires_once_after_deadline() {
        let (count, on_expire) = counter();
        let timer = CancellationTimer::arm(Duration::from_secs(600), on_expire);
        let handle = timer.handle();

        tokio::time::sleep(Duration::from_secs(599)).await;
        assert!(!handle.is_cancelled());
        assert!(timer.is_armed());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(handle.is_cancelled());
        assert!(timer.has_fired());
        assert_eq!(count.load(Ordering::SeqCst), 1);

        assert!(!timer.fire());
        assert!(!timer.disarm());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn disarmed_timer_never_fires() {
        let (count, on_expire) = counter();
        let timer = CancellationTimer::arm(Duration::from_secs(10), on_expire);
        let handle = timer.handle();

        assert!(timer.disarm());
        assert!(!timer.disarm());

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(!timer.fire());
        assert!(!handle.is_cancelled());
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_timer_disarms() {
        let (count, on_expire) = counter();
        let timer = CancellationTimer::arm(Duration::from_secs(10), on_expire);
        let handle = timer.handle();
        drop(timer);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(!handle.is_cancelled());
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn manual_fire_is_idempotent() {
        let (count, on_expire) = counter();
        let timer = CancellationTimer::arm(Duration::from_secs(10), on_expire);
        assert!(timer.fire());
        assert!(!timer.fire());

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(timer.handle().is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn timers_are_independent() {
        let (short_count, short_cb) = counter();
        let (long_count, long_cb) = counter();
        let short = CancellationTimer::arm(Duration::from_secs(1), short_cb);
        let long = CancellationTimer::arm(Duration::from_secs(60), long_cb);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(short.handle().is_cancelled());
        assert!(!long.handle().is_cancelled());
        assert!(long.is_armed());
        assert_eq!(short_count.load(Ordering::SeqCst), 1);
        assert_eq!(long_count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn external_cancel_resolves_waiters() {
        let handle = CancellationHandle::new();
        let waiter = handle.clone();
        let task = tokio::spawn(async move { waiter.cancelled().await });
        handle.cancel();
        handle.cancel();
        task.await.expect("waiter");
        assert!(handle.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn external_cancel_is_not_a_fired_deadline() {
        let (count, on_expire) = counter();
        let timer = CancellationTimer::arm(Duration::from_secs(10), on_expire);
        timer.handle().cancel();
        assert!(timer.handle().is_cancelled());
        assert!(!timer.has_fired());

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(timer.has_fired());
        assert_eq!(count.load(Ordering::SeqCst), 1);

        let (count, on_expire) = counter();
        let disarmed = CancellationTimer::arm(Duration::from_secs(10), on_expire);
        disarmed.handle().cancel();
        assert!(disarmed.disarm());
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(!disarmed.has_fired());
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
