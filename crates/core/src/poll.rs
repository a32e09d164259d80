// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Timers.
//!
//! The engine owns a single list of pending timers ordered by expiry. Expiry is measured on
//! the monotonic clock, so system clock adjustments do not disturb ordering. A timer is
//! removed from the list before its callback runs, and cancelling is synchronous: after
//! [`TimerQueue::cancel`] returns, the callback will not fire.

use std::time::{Duration, Instant};

/// Handle for cancelling a pending timer.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TimerHandle(u64);

pub(crate) struct TimerEntry {
    expiry: Instant,
    id: u64,
    callback: Box<dyn FnOnce()>,
}

/// Pending timers, soonest first.
#[derive(Default)]
pub(crate) struct TimerQueue {
    timers: Vec<TimerEntry>,
    next_id: u64,
}

impl TimerQueue {
    /// Schedules a callback to fire after a delay.
    pub(crate) fn add(
        &mut self, delay: Duration, callback: Box<dyn FnOnce()>,
    ) -> TimerHandle {
        let id = self.next_id;
        self.next_id += 1;
        let expiry = Instant::now() + delay;
        // Timers firing in the same instant dispatch in insertion order.
        let at = self.timers.partition_point(|t| t.expiry <= expiry);
        self.timers.insert(at, TimerEntry { expiry, id, callback });
        TimerHandle(id)
    }

    /// Cancels a pending timer. Cancelling one that already fired is a no-op.
    pub(crate) fn cancel(&mut self, handle: TimerHandle) {
        self.timers.retain(|t| t.id != handle.0);
    }

    /// Time until the next timer expires: zero if already due, `None` if no timer pends.
    pub(crate) fn next_delay(&self, now: Instant) -> Option<Duration> {
        self.timers.first().map(|t| t.expiry.saturating_duration_since(now))
    }

    /// Removes the first timer if it is due, returning its callback.
    pub(crate) fn pop_due(&mut self, now: Instant) -> Option<Box<dyn FnOnce()>> {
        if self.timers.first()?.expiry > now {
            return None;
        }
        Some(self.timers.remove(0).callback)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    #[test]
    fn timers_pop_in_expiry_order() {
        let fired = Rc::new(RefCell::new(Vec::new()));
        let mut queue = TimerQueue::default();
        for (delay, name) in [(50, 'a'), (20, 'b'), (30, 'c')] {
            let fired = fired.clone();
            queue.add(Duration::from_millis(delay), Box::new(move || {
                fired.borrow_mut().push(name)
            }));
        }
        let late = Instant::now() + Duration::from_millis(100);
        while let Some(callback) = queue.pop_due(late) {
            callback();
        }
        assert_eq!(*fired.borrow(), ['b', 'c', 'a']);
    }

    #[test]
    fn cancelled_timer_does_not_fire() {
        let mut queue = TimerQueue::default();
        let handle = queue.add(Duration::from_millis(1), Box::new(|| panic!("cancelled")));
        queue.cancel(handle);
        let late = Instant::now() + Duration::from_millis(10);
        assert!(queue.pop_due(late).is_none());
        assert!(queue.next_delay(late).is_none());
    }

    #[test]
    fn next_delay_is_clamped_to_zero_when_due() {
        let mut queue = TimerQueue::default();
        queue.add(Duration::from_millis(0), Box::new(|| ()));
        let later = Instant::now() + Duration::from_millis(5);
        assert_eq!(queue.next_delay(later), Some(Duration::ZERO));
    }
}
