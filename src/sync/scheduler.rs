// Poll Scheduler: the single timer-driven loop that stands in for a push
// channel. One tick refreshes the chat directory and, while a chat is
// selected, that chat's timeline; both ride the same cadence.
//
// The loop itself is dumb on purpose: coalescing of overlapping polls is
// handled by per-resource in-flight guards (see InflightGuard), and
// cancellation is a plain task abort so no timer can outlive the session.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Default poll cadence for directory and active-chat refreshes.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

pub struct PollScheduler {
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl PollScheduler {
    pub fn new() -> Self {
        PollScheduler {
            handle: Mutex::new(None),
        }
    }

    /// Start the periodic loop. `tick` runs once immediately (so a fresh
    /// session seeds its caches without waiting a full interval) and then
    /// on every cadence boundary. Calling start again replaces the
    /// previous loop.
    pub async fn start<F, Fut>(&self, interval: Duration, tick: F)
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let task = tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                timer.tick().await;
                tick().await;
            }
        });

        let mut slot = self.handle.lock().await;
        if let Some(old) = slot.replace(task) {
            debug!("Replacing an already-running poll loop");
            old.abort();
        }
        info!("Poll scheduler started (cadence {:?})", interval);
    }

    /// Stop polling immediately. Idempotent.
    pub async fn stop(&self) {
        if let Some(handle) = self.handle.lock().await.take() {
            handle.abort();
            info!("Poll scheduler stopped");
        }
    }

    pub async fn is_running(&self) -> bool {
        self.handle.lock().await.is_some()
    }
}

impl Default for PollScheduler {
    fn default() -> Self {
        PollScheduler::new()
    }
}

/// Per-resource reentrancy guard: at most one refresh in flight.
///
/// `try_begin` returns None while a previous refresh is still running,
/// which is how two ticks arriving faster than the network coalesce into
/// one call instead of queueing. The flag clears on drop, so an aborted
/// refresh releases the resource too.
#[derive(Clone, Default)]
pub struct InflightGuard {
    busy: Arc<AtomicBool>,
}

pub struct InflightToken {
    busy: Arc<AtomicBool>,
}

impl InflightGuard {
    pub fn new() -> Self {
        InflightGuard::default()
    }

    pub fn try_begin(&self) -> Option<InflightToken> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            Some(InflightToken {
                busy: self.busy.clone(),
            })
        } else {
            None
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }
}

impl Drop for InflightToken {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[test]
    fn inflight_guard_admits_one_at_a_time() {
        let guard = InflightGuard::new();
        let token = guard.try_begin().expect("first begin succeeds");
        assert!(guard.try_begin().is_none());
        drop(token);
        assert!(guard.try_begin().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn scheduler_ticks_on_cadence_and_stops_cleanly() {
        let counter = Arc::new(AtomicU32::new(0));
        let scheduler = PollScheduler::new();

        let c = counter.clone();
        scheduler
            .start(Duration::from_secs(5), move || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                }
            })
            .await;

        // Immediate seed tick plus two cadence boundaries.
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 3);

        scheduler.stop().await;
        assert!(!scheduler.is_running().await);
        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }
}
