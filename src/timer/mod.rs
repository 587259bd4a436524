// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Deferred work for device drivers.
//!
//! Drivers must return from bus entry points quickly. Anything touching
//! hardware is scheduled here instead: a [`TimerPool`] runs callbacks
//! after a delay on tokio's blocking worker threads, so a callback may
//! perform blocking serial or USB I/O without stalling the runtime.
//!
//! A timer holds only a weak reference to its owner. If the owner has
//! been dropped by the time the timer fires, the callback is skipped.
//!
//! One [`TimerHandle`] never runs its callback twice concurrently:
//! rescheduling from inside the callback defers the re-arm until the
//! callback returns. Self-rearming pollers rely on this.
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use astrobus::timer::TimerPool;
//!
//! # #[tokio::main(flavor = "multi_thread")]
//! # async fn main() {
//! struct Poller;
//!
//! let pool = TimerPool::new(tokio::runtime::Handle::current());
//! let poller = Arc::new(Poller);
//! let handle = pool.schedule(&poller, Duration::from_millis(10), |_poller| {
//!     // talk to hardware
//! });
//! assert!(handle.cancel());
//! # }
//! ```

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, ThreadId};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tokio::runtime::Handle;

type Callback = Arc<dyn Fn() + Send + Sync>;

/// Schedules delayed callbacks on the tokio blocking pool.
#[derive(Debug)]
pub struct TimerPool {
    runtime: Handle,
    next_id: AtomicU64,
}

impl TimerPool {
    /// Creates a pool driven by `runtime`.
    #[must_use]
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            next_id: AtomicU64::new(1),
        }
    }

    /// Runs `callback(&owner)` once after `delay`.
    ///
    /// The pool keeps only a weak reference to `owner`. The returned
    /// handle can reschedule or cancel the timer.
    pub fn schedule<D, F>(&self, owner: &Arc<D>, delay: Duration, callback: F) -> TimerHandle
    where
        D: ?Sized + Send + Sync + 'static,
        F: Fn(&Arc<D>) + Send + Sync + 'static,
    {
        let weak: Weak<D> = Arc::downgrade(owner);
        let callback: Callback = Arc::new(move || {
            if let Some(owner) = weak.upgrade() {
                callback(&owner);
            } else {
                tracing::trace!("Timer owner dropped, skipping callback");
            }
        });
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let shared = Arc::new(TimerShared {
            id,
            runtime: self.runtime.clone(),
            callback,
            state: Mutex::new(TimerState::default()),
            idle: Condvar::new(),
        });
        shared.arm(delay);
        TimerHandle { shared }
    }

    /// Re-arms the timer in `slot` to fire after `delay`.
    ///
    /// Returns `false` if the slot is empty or the timer was cancelled.
    pub fn reschedule(&self, slot: &Option<TimerHandle>, delay: Duration) -> bool {
        slot.as_ref().is_some_and(|handle| handle.reschedule(delay))
    }

    /// Cancels the timer in `slot` and empties it.
    ///
    /// Returns `false` if the slot was already empty. An in-flight
    /// callback is not waited for.
    pub fn cancel(&self, slot: &mut Option<TimerHandle>) -> bool {
        slot.take().is_some_and(|handle| handle.cancel())
    }

    /// Cancels the timer in `slot`, empties it, and waits for an in-flight
    /// callback to return.
    ///
    /// Returns `false` if the slot was already empty.
    pub fn cancel_sync(&self, slot: &mut Option<TimerHandle>) -> bool {
        slot.take().is_some_and(|handle| handle.cancel_sync())
    }
}

/// Handle to one scheduled callback.
///
/// Dropping the handle does not cancel the timer.
#[derive(Clone)]
pub struct TimerHandle {
    shared: Arc<TimerShared>,
}

impl TimerHandle {
    /// Pool-unique timer id, for logging.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.shared.id
    }

    /// Re-arms the timer to fire after `delay`, replacing any pending
    /// firing.
    ///
    /// Called while the callback runs, the re-arm takes effect once the
    /// callback returns. Returns `false` if the timer was cancelled.
    pub fn reschedule(&self, delay: Duration) -> bool {
        self.shared.arm(delay)
    }

    /// Prevents any future firing.
    ///
    /// Returns `true` if a firing was pending or the callback was running.
    pub fn cancel(&self) -> bool {
        let mut state = self.shared.state.lock();
        let active = state.pending || state.running.is_some();
        state.cancelled = true;
        state.pending = false;
        state.rearm = None;
        state.generation += 1;
        active
    }

    /// Like [`cancel`](Self::cancel), then blocks until an in-flight
    /// callback has returned.
    ///
    /// Called from inside the timer's own callback it does not wait.
    pub fn cancel_sync(&self) -> bool {
        let active = self.cancel();
        let current = thread::current().id();
        let mut state = self.shared.state.lock();
        while let Some(running) = state.running {
            if running == current {
                break;
            }
            self.shared.idle.wait(&mut state);
        }
        active
    }

    /// Returns `true` if a firing is scheduled.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.shared.state.lock().pending
    }

    /// Returns `true` while the callback executes.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.shared.state.lock().running.is_some()
    }

    /// Returns `true` once the timer has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.shared.state.lock().cancelled
    }
}

impl std::fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("TimerHandle")
            .field("id", &self.shared.id)
            .field("pending", &state.pending)
            .field("running", &state.running.is_some())
            .field("cancelled", &state.cancelled)
            .finish()
    }
}

#[derive(Debug, Default)]
struct TimerState {
    generation: u64,
    pending: bool,
    cancelled: bool,
    running: Option<ThreadId>,
    rearm: Option<Duration>,
}

struct TimerShared {
    id: u64,
    runtime: Handle,
    callback: Callback,
    state: Mutex<TimerState>,
    idle: Condvar,
}

impl TimerShared {
    fn arm(self: &Arc<Self>, delay: Duration) -> bool {
        let generation = {
            let mut state = self.state.lock();
            if state.cancelled {
                return false;
            }
            state.pending = true;
            if state.running.is_some() {
                state.rearm = Some(delay);
                return true;
            }
            state.generation += 1;
            state.generation
        };
        self.spawn(generation, delay);
        true
    }

    fn spawn(self: &Arc<Self>, generation: u64, delay: Duration) {
        let shared = Arc::clone(self);
        self.runtime.spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let _ = tokio::task::spawn_blocking(move || shared.fire(generation)).await;
        });
    }

    fn fire(self: &Arc<Self>, generation: u64) {
        {
            let mut state = self.state.lock();
            if state.cancelled || state.generation != generation || state.running.is_some() {
                return;
            }
            state.pending = false;
            state.running = Some(thread::current().id());
        }

        if catch_unwind(AssertUnwindSafe(|| (self.callback)())).is_err() {
            tracing::error!(timer_id = self.id, "Timer callback panicked");
        }

        let rearm = {
            let mut state = self.state.lock();
            state.running = None;
            match state.rearm.take() {
                Some(delay) if !state.cancelled => {
                    state.generation += 1;
                    Some((state.generation, delay))
                }
                _ => None,
            }
        };
        self.idle.notify_all();

        if let Some((generation, delay)) = rearm {
            self.spawn(generation, delay);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct Counter {
        hits: AtomicUsize,
    }

    fn counter() -> Arc<Counter> {
        Arc::new(Counter {
            hits: AtomicUsize::new(0),
        })
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(120)).await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn fires_once_after_delay() {
        let pool = TimerPool::new(Handle::current());
        let owner = counter();
        let handle = pool.schedule(&owner, Duration::from_millis(10), |c| {
            c.hits.fetch_add(1, Ordering::SeqCst);
        });
        settle().await;
        assert_eq!(owner.hits.load(Ordering::SeqCst), 1);
        assert!(!handle.is_pending());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn cancel_prevents_firing() {
        let pool = TimerPool::new(Handle::current());
        let owner = counter();
        let mut slot = Some(pool.schedule(&owner, Duration::from_millis(40), |c| {
            c.hits.fetch_add(1, Ordering::SeqCst);
        }));
        assert!(pool.cancel(&mut slot));
        assert!(slot.is_none());
        assert!(!pool.cancel(&mut slot));
        settle().await;
        assert_eq!(owner.hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn reschedule_on_empty_slot_fails() {
        let pool = TimerPool::new(Handle::current());
        assert!(!pool.reschedule(&None, Duration::from_millis(1)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn reschedule_replaces_pending_firing() {
        let pool = TimerPool::new(Handle::current());
        let owner = counter();
        let handle = pool.schedule(&owner, Duration::from_millis(30), |c| {
            c.hits.fetch_add(1, Ordering::SeqCst);
        });
        assert!(handle.reschedule(Duration::from_millis(30)));
        assert!(handle.reschedule(Duration::from_millis(30)));
        settle().await;
        assert_eq!(owner.hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn reschedule_after_cancel_fails() {
        let pool = TimerPool::new(Handle::current());
        let owner = counter();
        let handle = pool.schedule(&owner, Duration::from_millis(30), |_| {});
        handle.cancel();
        assert!(!handle.reschedule(Duration::from_millis(1)));
        assert!(handle.is_cancelled());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn dropped_owner_skips_callback() {
        let pool = TimerPool::new(Handle::current());
        let hits = Arc::new(AtomicUsize::new(0));
        let owner = counter();
        let seen = Arc::clone(&hits);
        let _handle = pool.schedule(&owner, Duration::from_millis(20), move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        drop(owner);
        settle().await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn self_rearming_never_overlaps() {
        struct Poller {
            slot: Mutex<Option<TimerHandle>>,
            active: AtomicUsize,
            overlaps: AtomicUsize,
            runs: AtomicUsize,
        }

        let pool = TimerPool::new(Handle::current());
        let poller = Arc::new(Poller {
            slot: Mutex::new(None),
            active: AtomicUsize::new(0),
            overlaps: AtomicUsize::new(0),
            runs: AtomicUsize::new(0),
        });
        let handle = pool.schedule(&poller, Duration::from_millis(20), |p| {
            if p.active.fetch_add(1, Ordering::SeqCst) > 0 {
                p.overlaps.fetch_add(1, Ordering::SeqCst);
            }
            if let Some(handle) = p.slot.lock().as_ref() {
                handle.reschedule(Duration::ZERO);
            }
            std::thread::sleep(Duration::from_millis(5));
            p.runs.fetch_add(1, Ordering::SeqCst);
            p.active.fetch_sub(1, Ordering::SeqCst);
        });
        *poller.slot.lock() = Some(handle.clone());

        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.cancel_sync();
        let runs = poller.runs.load(Ordering::SeqCst);
        assert!(runs >= 2, "expected repeated runs, got {runs}");
        assert_eq!(poller.overlaps.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(poller.runs.load(Ordering::SeqCst), runs);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn cancel_sync_waits_for_running_callback() {
        let pool = TimerPool::new(Handle::current());
        let owner = counter();
        let handle = pool.schedule(&owner, Duration::ZERO, |c| {
            std::thread::sleep(Duration::from_millis(60));
            c.hits.fetch_add(1, Ordering::SeqCst);
        });
        while !handle.is_running() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        let waiter = handle.clone();
        tokio::task::spawn_blocking(move || waiter.cancel_sync())
            .await
            .unwrap();
        assert_eq!(owner.hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn cancel_sync_from_own_callback_returns() {
        struct SelfCancel {
            slot: Mutex<Option<TimerHandle>>,
            done: AtomicUsize,
        }
        let pool = TimerPool::new(Handle::current());
        let owner = Arc::new(SelfCancel {
            slot: Mutex::new(None),
            done: AtomicUsize::new(0),
        });
        let handle = pool.schedule(&owner, Duration::from_millis(10), |o| {
            let handle = o.slot.lock().clone();
            if let Some(handle) = handle {
                handle.cancel_sync();
            }
            o.done.fetch_add(1, Ordering::SeqCst);
        });
        *owner.slot.lock() = Some(handle);
        settle().await;
        assert_eq!(owner.done.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn panicking_callback_does_not_wedge_timer() {
        let pool = TimerPool::new(Handle::current());
        let owner = counter();
        let handle = pool.schedule(&owner, Duration::ZERO, |c| {
            if c.hits.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("driver bug");
            }
        });
        settle().await;
        assert!(!handle.is_running());
        assert!(handle.reschedule(Duration::ZERO));
        settle().await;
        assert_eq!(owner.hits.load(Ordering::SeqCst), 2);
    }
}
