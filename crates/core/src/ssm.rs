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

//! Sequential state machine.
//!
//! Asynchronous protocol drivers are state machines, and in most cases entirely linear ones:
//! each step issues one USB transfer and its completion advances to the next step. The SSM
//! captures that shape. The handler is invoked on entering each step and looks at
//! [`Ssm::cur_state`] to decide what to do; the transfer completion then calls [`Ssm::next`],
//! [`Ssm::jump_to`], or [`Ssm::mark_aborted`]. Iterating past the final step is the canonical
//! way to mark success.
//!
//! A machine started as a child of another advances its parent one step on success and aborts
//! it with the same error on failure.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use fprint_error::Error;
use fprint_logger as log;

use crate::device::Device;

/// A cloneable handle to a sequential state machine.
#[derive(Clone)]
pub struct Ssm {
    inner: Rc<SsmInner>,
}

struct SsmInner {
    device: Device,
    nr_states: usize,
    cur_state: Cell<usize>,
    completed: Cell<bool>,
    error: Cell<Option<Error>>,
    handler: Box<dyn Fn(&Ssm)>,
    callback: RefCell<Option<Box<dyn FnOnce(&Ssm)>>>,
}

impl Ssm {
    /// Allocates a machine over a device with `nr_states` steps.
    ///
    /// The machine starts out completed and must be started with [`Ssm::start`].
    pub fn new(device: &Device, handler: impl Fn(&Ssm) + 'static, nr_states: usize) -> Ssm {
        assert!(nr_states >= 1);
        Ssm {
            inner: Rc::new(SsmInner {
                device: device.clone(),
                nr_states,
                cur_state: Cell::new(0),
                completed: Cell::new(true),
                error: Cell::new(None),
                handler: Box::new(handler),
                callback: RefCell::new(None),
            }),
        }
    }

    /// The device the machine runs against.
    pub fn device(&self) -> &Device {
        &self.inner.device
    }

    /// The current step index.
    pub fn cur_state(&self) -> usize {
        self.inner.cur_state.get()
    }

    /// The error a failed machine was aborted with.
    pub fn error(&self) -> Option<Error> {
        self.inner.error.get()
    }

    /// Whether the machine reached a terminal transition.
    pub fn has_completed(&self) -> bool {
        self.inner.completed.get()
    }

    fn call_handler(&self) {
        log::debug!("entering state {}", self.cur_state());
        (self.inner.handler)(self);
    }

    /// Starts (or restarts) the machine.
    ///
    /// The completion callback is invoked once, at the terminal transition, whether the
    /// machine completed or aborted. Restarting a machine that has not completed is a
    /// programming error.
    pub fn start(&self, callback: impl FnOnce(&Ssm) + 'static) {
        assert!(self.inner.completed.get(), "machine restarted while running");
        *self.inner.callback.borrow_mut() = Some(Box::new(callback));
        self.inner.cur_state.set(0);
        self.inner.completed.set(false);
        self.inner.error.set(None);
        self.call_handler();
    }

    /// Starts `child` as a sub-machine of `self`.
    ///
    /// On success the parent advances one step; on failure the parent is aborted with the
    /// child's error. The child handle may be dropped by the caller: the completion keeps it
    /// alive until its terminal transition.
    pub fn start_subsm(&self, child: &Ssm) {
        let parent = self.clone();
        child.start(move |child| match child.error() {
            None => parent.next(),
            Some(error) => parent.mark_aborted(error),
        });
    }

    /// Iterates to the machine's next step.
    ///
    /// Iterating beyond the final step marks successful completion.
    pub fn next(&self) {
        assert!(!self.inner.completed.get(), "completed machine iterated");
        let next = self.inner.cur_state.get() + 1;
        if next == self.inner.nr_states {
            self.mark_completed();
        } else {
            self.inner.cur_state.set(next);
            self.call_handler();
        }
    }

    /// Jumps to an arbitrary step.
    pub fn jump_to(&self, state: usize) {
        assert!(!self.inner.completed.get(), "completed machine iterated");
        assert!(state < self.inner.nr_states);
        self.inner.cur_state.set(state);
        self.call_handler();
    }

    /// Marks the machine successfully completed.
    pub fn mark_completed(&self) {
        assert!(!self.inner.completed.get(), "machine completed twice");
        self.inner.completed.set(true);
        log::debug!("completed with error {:?}", self.inner.error.get());
        if let Some(callback) = self.inner.callback.borrow_mut().take() {
            callback(self);
        }
    }

    /// Marks the machine failed.
    pub fn mark_aborted(&self, error: Error) {
        log::debug!("error {} from state {}", error, self.cur_state());
        self.inner.error.set(Some(error));
        self.mark_completed();
    }
}
