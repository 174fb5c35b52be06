#![forbid(unsafe_code)]

//! Virtual-clock timer queue (`setTimeout` / `clearTimeout`).
//!
//! Time only moves when the host calls [`Page::advance`](crate::Page::advance)
//! or [`Page::run_until_idle`](crate::Page::run_until_idle). Tasks become due
//! at `now + delay` and run in `(due_at, scheduling order)` order, with the
//! clock set to each task's due time while it runs.
//!
//! # Invariants
//!
//! 1. A cleared timer never runs.
//! 2. Tasks due at the same instant run in the order they were scheduled.
//! 3. [`TimerId`]s are never reused within a scheduler.

use std::fmt;
use std::time::Duration;

use crate::error::DomError;
use crate::page::Page;

/// Default cap on the number of callbacks one drain may run.
pub const DEFAULT_STEP_LIMIT: usize = 10_000;

/// Callback run when a timer fires.
pub type TimerCallback = Box<dyn FnOnce(&mut Page) -> Result<(), DomError>>;

/// Cancellation token for a scheduled task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

/// Public view of a queued task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingTimer {
    pub id: TimerId,
    pub due_at: u64,
}

struct ScheduledTask {
    id: TimerId,
    due_at: u64,
    order: u64,
    callback: TimerCallback,
}

/// The page's timer queue.
pub struct Scheduler {
    now_ms: u64,
    next_id: u64,
    next_order: u64,
    step_limit: usize,
    tasks: Vec<ScheduledTask>,
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("now_ms", &self.now_ms)
            .field("pending", &self.tasks.len())
            .finish()
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            now_ms: 0,
            next_id: 0,
            next_order: 0,
            step_limit: DEFAULT_STEP_LIMIT,
            tasks: Vec::new(),
        }
    }

    /// Current virtual time in milliseconds.
    #[inline]
    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    pub fn step_limit(&self) -> usize {
        self.step_limit
    }

    pub fn set_step_limit(&mut self, limit: usize) {
        self.step_limit = limit.max(1);
    }

    /// Queue `callback` to run `delay` from now.
    pub fn set_timeout(&mut self, delay: Duration, callback: TimerCallback) -> TimerId {
        self.next_id += 1;
        self.next_order += 1;
        let id = TimerId(self.next_id);
        let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.tasks.push(ScheduledTask {
            id,
            due_at: self.now_ms.saturating_add(delay_ms),
            order: self.next_order,
            callback,
        });
        id
    }

    /// Cancel a pending task. Returns whether anything was cancelled;
    /// clearing an unknown or already-fired id is a no-op.
    pub fn clear_timeout(&mut self, id: TimerId) -> bool {
        let before = self.tasks.len();
        self.tasks.retain(|task| task.id != id);
        self.tasks.len() != before
    }

    pub fn is_pending(&self, id: TimerId) -> bool {
        self.tasks.iter().any(|task| task.id == id)
    }

    /// Number of queued tasks.
    pub fn pending(&self) -> usize {
        self.tasks.len()
    }

    /// Queued tasks in the order they will run.
    pub fn pending_timers(&self) -> Vec<PendingTimer> {
        let mut tasks: Vec<_> = self.tasks.iter().map(|t| (t.due_at, t.order, t.id)).collect();
        tasks.sort_unstable();
        tasks
            .into_iter()
            .map(|(due_at, _, id)| PendingTimer { id, due_at })
            .collect()
    }

    /// Remove the earliest task due at or before `limit` (any task when
    /// `limit` is `None`) and move the clock to its due time.
    pub(crate) fn pop_due(&mut self, limit: Option<u64>) -> Option<(TimerId, TimerCallback)> {
        let (pos, _) = self
            .tasks
            .iter()
            .enumerate()
            .filter(|(_, t)| limit.is_none_or(|limit| t.due_at <= limit))
            .min_by_key(|(_, t)| (t.due_at, t.order))?;
        let task = self.tasks.swap_remove(pos);
        self.now_ms = self.now_ms.max(task.due_at);
        Some((task.id, task.callback))
    }

    pub(crate) fn set_now(&mut self, now_ms: u64) {
        self.now_ms = self.now_ms.max(now_ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn noop() -> TimerCallback {
        Box::new(|_: &mut Page| -> Result<(), DomError> { Ok(()) })
    }

    #[test]
    fn pending_timers_sorted_by_due_then_order() {
        let mut s = Scheduler::new();
        let late = s.set_timeout(Duration::from_millis(300), noop());
        let first = s.set_timeout(Duration::ZERO, noop());
        let second = s.set_timeout(Duration::ZERO, noop());
        let ids: Vec<_> = s.pending_timers().into_iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![first, second, late]);
    }

    #[test]
    fn clear_timeout_is_idempotent() {
        let mut s = Scheduler::new();
        let id = s.set_timeout(Duration::from_millis(10), noop());
        assert!(s.clear_timeout(id));
        assert!(!s.clear_timeout(id));
        assert!(!s.is_pending(id));
        assert_eq!(s.pending(), 0);
    }

    #[test]
    fn pop_due_respects_limit_and_moves_clock() {
        let mut s = Scheduler::new();
        s.set_timeout(Duration::from_millis(50), noop());
        assert!(s.pop_due(Some(49)).is_none());
        assert_eq!(s.now_ms(), 0);
        assert!(s.pop_due(Some(50)).is_some());
        assert_eq!(s.now_ms(), 50);
    }

    #[test]
    fn step_limit_has_floor_of_one() {
        let mut s = Scheduler::new();
        s.set_step_limit(0);
        assert_eq!(s.step_limit(), 1);
    }

    proptest! {
        /// Timers fire by deadline, then in scheduling order; cleared timers
        /// never fire.
        #[test]
        fn drain_order_matches_deadline_then_insertion(
            timers in proptest::collection::vec((0u64..500, any::<bool>()), 0..32),
        ) {
            let mut s = Scheduler::new();
            let ids: Vec<_> = timers
                .iter()
                .map(|(delay, _)| s.set_timeout(Duration::from_millis(*delay), noop()))
                .collect();
            let mut expected = Vec::new();
            for (index, (&id, (delay, clear))) in ids.iter().zip(&timers).enumerate() {
                if *clear {
                    prop_assert!(s.clear_timeout(id));
                } else {
                    expected.push((*delay, index, id));
                }
            }
            expected.sort_by_key(|(delay, index, _)| (*delay, *index));

            let mut fired = Vec::new();
            while let Some((id, _)) = s.pop_due(None) {
                fired.push(id);
            }
            let expected: Vec<_> = expected.into_iter().map(|(_, _, id)| id).collect();
            prop_assert_eq!(fired, expected);
            prop_assert_eq!(s.pending(), 0);
        }
    }
}
