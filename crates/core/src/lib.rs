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

//! Fingerprint device session engine.
//!
//! The engine is single-threaded and cooperative: every public entry point runs on one
//! caller thread, and asynchronous progress is made exclusively while that thread sits in
//! [`Context::handle_events`] (or its timeout variant), which is the sole suspension point.
//! USB completions dispatch before timers within one iteration, and user callbacks run on
//! that thread, from inside that call.
//!
//! A [`Context`] owns everything that was process-global in older designs: the transport,
//! the registered drivers, the opened devices, and the pending timers.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use fprint_error::Code;
use fprint_logger as log;
use fprint_match::Tunables;
use fprint_transport::{Pollfd, PollfdAddedCallback, PollfdRemovedCallback};

pub mod assembling;
pub mod device;
pub mod drv;
pub mod img;
pub mod imgdev;
mod poll;
pub mod ssm;

pub use device::{CaptureCallback, CaptureResult, CloseCallback, DevState, Device,
    EnrollResult, EnrollStageCallback, IdentifyCallback, OpenCallback, StopCallback,
    VerifyCallback, VerifyResult};
pub use drv::{Capabilities, Discover, DiscoveredDevice, Driver, ScanType, device_for_print_data};
pub use fprint_error::Error;
pub use fprint_store::{Finger, PrintData, PrintStore};
pub use img::{FeatureExtractor, Image, ImageFlags, ThresholdExtractor};
pub use imgdev::{ImageDriver, ImageDriverInfo, ImgDevice, ImgDeviceState};
pub use poll::TimerHandle;
pub use ssm::Ssm;

use crate::poll::TimerQueue;

/// Default timeout of [`Context::handle_events`].
const DEFAULT_EVENTS_TIMEOUT: Duration = Duration::from_secs(2);

pub(crate) struct ContextInner {
    pub(crate) transport: Box<dyn fprint_transport::Api>,
    pub(crate) timers: RefCell<TimerQueue>,
    pub(crate) drivers: RefCell<Vec<Rc<dyn Driver>>>,
    pub(crate) opened: RefCell<Vec<Device>>,
    pub(crate) extractor: Box<dyn FeatureExtractor>,
    pub(crate) tunables: Tunables,
}

/// The engine.
pub struct Context {
    inner: Rc<ContextInner>,
}

impl Context {
    /// Creates an engine over a transport, with the default feature extractor and match
    /// tunables.
    pub fn new(transport: Box<dyn fprint_transport::Api>) -> Context {
        Context::with_parts(transport, Box::new(ThresholdExtractor::default()),
            Tunables::default())
    }

    /// Creates an engine with an explicit analysis front end and match tunables.
    pub fn with_parts(
        transport: Box<dyn fprint_transport::Api>, extractor: Box<dyn FeatureExtractor>,
        tunables: Tunables,
    ) -> Context {
        Context {
            inner: Rc::new(ContextInner {
                transport,
                timers: RefCell::new(TimerQueue::default()),
                drivers: RefCell::new(Vec::new()),
                opened: RefCell::new(Vec::new()),
                extractor,
                tunables,
            }),
        }
    }

    /// Registers a driver.
    pub fn register_driver(&self, driver: Rc<dyn Driver>) -> Result<(), Error> {
        if driver.id() == 0 {
            log::error!("not registering driver {}: driver id is 0", driver.name());
            return Err(Error::user(Code::InvalidArgument));
        }
        log::debug!("registered driver {}", driver.name());
        self.inner.drivers.borrow_mut().push(driver);
        Ok(())
    }

    /// Registers an imaging driver behind the imaging core.
    pub fn register_image_driver(&self, driver: Rc<dyn ImageDriver>) -> Result<(), Error> {
        self.register_driver(Rc::new(imgdev::ImgDriverAdapter::new(driver)))
    }

    /// Scans the bus and claims the supported devices.
    ///
    /// This is the entry point for finding a reader to operate. Each USB device goes to the
    /// first registered driver claiming it, with a confirmed discover hook outranking a
    /// plain identity-table match.
    pub fn discover_devices(&self) -> Result<Vec<DiscoveredDevice>, Error> {
        let drivers = self.inner.drivers.borrow();
        let mut discovered = Vec::new();
        for info in self.inner.transport.enumerate()? {
            if let Some(claimed) = drv::claim_device(&drivers, &info) {
                discovered.push(claimed);
            }
        }
        Ok(discovered)
    }

    /// Asynchronously opens a discovered device.
    ///
    /// The returned handle is immediately usable for state inspection; the callback fires
    /// when the driver finished its open protocol.
    pub fn open_device(
        &self, discovered: &DiscoveredDevice, callback: OpenCallback,
    ) -> Result<Device, Error> {
        let usb = self.inner.transport.open(&discovered.info)?;
        let device = Device::new(&self.inner, discovered, usb, callback);
        if let Err(error) = discovered.driver.clone().open(&device, discovered.driver_data) {
            log::error!("device initialization failed, driver={}", discovered.driver.name());
            return Err(error);
        }
        Ok(device)
    }

    /// The devices currently open.
    pub fn opened_devices(&self) -> Vec<Device> {
        self.inner.opened.borrow().clone()
    }

    /// Schedules a callback to run after a delay, on the engine thread.
    ///
    /// Timers are one-shot; the callback is dropped unrun if the timer is cancelled.
    pub fn add_timeout(
        &self, delay: Duration, callback: impl FnOnce() + 'static,
    ) -> TimerHandle {
        log::debug!("in {}ms", delay.as_millis());
        self.inner.timers.borrow_mut().add(delay, Box::new(callback))
    }

    /// Cancels a pending timer.
    ///
    /// Cancellation is synchronous: once this returns, the callback will not fire.
    pub fn cancel_timeout(&self, handle: TimerHandle) {
        self.inner.timers.borrow_mut().cancel(handle);
    }

    fn fire_due_timers(&self) {
        loop {
            let callback = self.inner.timers.borrow_mut().pop_due(Instant::now());
            match callback {
                Some(callback) => callback(),
                None => break,
            }
        }
    }

    /// Handles pending events, blocking up to `timeout`.
    ///
    /// Each pass waits in the transport for the minimum of the remaining budget, the next
    /// engine timer, and the transport's own required wake; ready USB completions dispatch
    /// first, then every timer whose expiry has passed fires in ascending expiry order. A
    /// zero timeout performs a single non-blocking pass.
    pub fn handle_events_timeout(&self, timeout: Duration) -> Result<(), Error> {
        let deadline = Instant::now() + timeout;
        loop {
            self.fire_due_timers();
            let now = Instant::now();
            let mut wait = deadline.saturating_duration_since(now);
            if let Some(next) = self.inner.timers.borrow().next_delay(now) {
                wait = wait.min(next);
            }
            if let Some(next) = self.inner.transport.next_timeout() {
                wait = wait.min(next);
            }
            self.inner.transport.handle_events(wait)?;
            self.fire_due_timers();
            if Instant::now() >= deadline {
                return Ok(());
            }
        }
    }

    /// Handles pending events with a sensible default timeout of two seconds.
    pub fn handle_events(&self) -> Result<(), Error> {
        self.handle_events_timeout(DEFAULT_EVENTS_TIMEOUT)
    }

    /// How soon [`Context::handle_events`] needs to be called again, if at all.
    ///
    /// The result is the minimum of the engine's next timer and the transport's next
    /// required wake; `None` means no timeout is pending. A zero duration means events must
    /// be handled immediately.
    pub fn get_next_timeout(&self) -> Option<Duration> {
        let engine = self.inner.timers.borrow().next_delay(Instant::now());
        let transport = self.inner.transport.next_timeout();
        match (engine, transport) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (next, None) => next,
            (None, next) => next,
        }
    }

    /// The file descriptors callers with their own main loop must watch.
    pub fn get_pollfds(&self) -> Vec<Pollfd> {
        self.inner.transport.pollfds()
    }

    /// Registers callbacks invoked when the watched-fd set changes.
    pub fn set_pollfd_notifiers(
        &self, added: Option<PollfdAddedCallback>, removed: Option<PollfdRemovedCallback>,
    ) {
        self.inner.transport.set_pollfd_notifiers(added, removed);
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        if !self.inner.opened.borrow().is_empty() {
            log::warn!("devices left open on engine shutdown");
        }
    }
}
