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

//! Devices and their lifecycle state machine.
//!
//! A device exists in exactly one lifecycle state at a time. The public operations move it
//! into a transitional state and hand control to the driver; the driver's `report_*` calls
//! complete the transition and invoke the caller's continuation. Every acquisition delivers
//! exactly one terminal callback: a result, or an error.
//!
//! All callbacks run on the engine thread, from inside [`crate::Context::handle_events`] or
//! the public call that triggered them.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use fprint_error::{Code, Error};
use fprint_logger as log;
use fprint_store::PrintData;
use fprint_transport::{Transfer, TransferCallback};

use crate::ContextInner;
use crate::drv::{Capabilities, DiscoveredDevice, Driver};
use crate::img::Image;

/// Lifecycle state of a device.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DevState {
    Initial,
    Initializing,
    Initialized,
    Error,
    Deinitializing,
    Deinitialized,
    EnrollStarting,
    Enrolling,
    EnrollStopping,
    VerifyStarting,
    Verifying,
    VerifyDone,
    VerifyStopping,
    IdentifyStarting,
    Identifying,
    IdentifyDone,
    IdentifyStopping,
    CaptureStarting,
    Capturing,
    CaptureDone,
    CaptureStopping,
}

/// Enrollment stage outcomes reported to the caller.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum EnrollResult {
    /// Enrollment completed; the callback carries the enrolled print.
    Complete,

    /// Enrollment failed and cannot continue.
    Fail,

    /// The stage passed; more stages follow.
    Pass,

    /// The sample was unusable; retry the stage.
    Retry,

    /// The swipe was too short; retry the stage.
    RetryTooShort,

    /// The finger was off-center; retry the stage.
    RetryCenterFinger,

    /// Remove the finger and retry the stage.
    RetryRemoveFinger,
}

impl EnrollResult {
    /// Whether the stage must be re-acquired without advancing.
    pub fn is_retry(self) -> bool {
        matches!(
            self,
            EnrollResult::Retry
                | EnrollResult::RetryTooShort
                | EnrollResult::RetryCenterFinger
                | EnrollResult::RetryRemoveFinger
        )
    }
}

/// Verification (and identification) outcomes reported to the caller.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum VerifyResult {
    /// The scan did not match.
    NoMatch,

    /// The scan matched.
    Match,

    /// The sample was unusable; retry the scan.
    Retry,

    /// The swipe was too short; retry the scan.
    RetryTooShort,

    /// The finger was off-center; retry the scan.
    RetryCenterFinger,

    /// Remove the finger and retry the scan.
    RetryRemoveFinger,
}

impl VerifyResult {
    /// Whether this outcome terminates the acquisition.
    pub fn is_terminal(self) -> bool {
        matches!(self, VerifyResult::Match | VerifyResult::NoMatch)
    }
}

/// Capture outcomes reported to the caller.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CaptureResult {
    /// The image was captured.
    Complete,

    /// The capture failed.
    Fail,
}

/// Continuation of an open operation.
pub type OpenCallback = Box<dyn FnOnce(&Device, Result<(), Error>)>;

/// Continuation of a close operation.
pub type CloseCallback = Box<dyn FnOnce(&Device)>;

/// Continuation of a stop operation.
pub type StopCallback = Box<dyn FnOnce(&Device)>;

/// Per-stage enrollment continuation.
pub type EnrollStageCallback =
    Box<dyn FnMut(&Device, Result<EnrollResult, Error>, Option<PrintData>, Option<Image>)>;

/// Verification continuation.
pub type VerifyCallback = Box<dyn FnMut(&Device, Result<VerifyResult, Error>, Option<Image>)>;

/// Identification continuation; the `usize` is the index of the matching gallery print.
pub type IdentifyCallback =
    Box<dyn FnMut(&Device, Result<VerifyResult, Error>, usize, Option<Image>)>;

/// Capture continuation.
pub type CaptureCallback = Box<dyn FnMut(&Device, Result<CaptureResult, Error>, Option<Image>)>;

/// A callback slot with an epoch guarding reentrant replacement.
///
/// The callback is taken out of the slot while it runs, so a callback re-entering the engine
/// never trips a borrow. It is put back afterwards unless the slot was set or cleared in the
/// meantime.
struct Slot<T> {
    callback: Option<T>,
    epoch: u64,
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Slot { callback: None, epoch: 0 }
    }
}

impl<T> Slot<T> {
    fn set(&mut self, callback: T) {
        self.callback = Some(callback);
        self.epoch += 1;
    }

    fn clear(&mut self) {
        self.callback = None;
        self.epoch += 1;
    }
}

#[derive(Default)]
struct Callbacks {
    open: Option<OpenCallback>,
    close: Option<CloseCallback>,
    enroll_stage: Slot<EnrollStageCallback>,
    enroll_stop: Option<StopCallback>,
    verify: Slot<VerifyCallback>,
    verify_stop: Option<StopCallback>,
    identify: Slot<IdentifyCallback>,
    identify_stop: Option<StopCallback>,
    capture: Slot<CaptureCallback>,
    capture_stop: Option<StopCallback>,
}

pub(crate) struct DeviceInner {
    ctx: Weak<ContextInner>,
    driver: Rc<dyn Driver>,
    devtype: u32,
    usb: RefCell<Option<Box<dyn fprint_transport::Device>>>,
    state: Cell<DevState>,
    nr_enroll_stages: Cell<u32>,
    enroll_stage: Cell<u32>,
    unconditional_capture: Cell<bool>,
    verify_data: RefCell<Option<PrintData>>,
    identify_gallery: RefCell<Vec<PrintData>>,
    callbacks: RefCell<Callbacks>,
    driver_state: RefCell<Option<Rc<dyn Any>>>,
}

/// An opened fingerprint device.
///
/// Handles are cheaply cloneable references to the same device.
#[derive(Clone)]
pub struct Device {
    pub(crate) inner: Rc<DeviceInner>,
}

/// Invokes a reentrancy-safe callback slot.
macro_rules! invoke_slot {
    ($dev:expr, $slot:ident, |$cb:ident| $body:expr) => {{
        let taken = {
            let mut cbs = $dev.inner.callbacks.borrow_mut();
            (cbs.$slot.callback.take(), cbs.$slot.epoch)
        };
        match taken {
            (Some(mut $cb), epoch) => {
                $body;
                let mut cbs = $dev.inner.callbacks.borrow_mut();
                if cbs.$slot.epoch == epoch {
                    cbs.$slot.callback = Some($cb);
                }
            }
            (None, _) => log::debug!("ignoring result as no callback is subscribed"),
        }
    }};
}

impl Device {
    pub(crate) fn new(
        ctx: &Rc<ContextInner>, discovered: &DiscoveredDevice,
        usb: Box<dyn fprint_transport::Device>, open_callback: OpenCallback,
    ) -> Device {
        let inner = Rc::new(DeviceInner {
            ctx: Rc::downgrade(ctx),
            driver: discovered.driver.clone(),
            devtype: discovered.devtype,
            usb: RefCell::new(Some(usb)),
            state: Cell::new(DevState::Initializing),
            nr_enroll_stages: Cell::new(0),
            enroll_stage: Cell::new(0),
            unconditional_capture: Cell::new(false),
            verify_data: RefCell::new(None),
            identify_gallery: RefCell::new(Vec::new()),
            callbacks: RefCell::new(Callbacks::default()),
            driver_state: RefCell::new(None),
        });
        inner.callbacks.borrow_mut().open = Some(open_callback);
        Device { inner }
    }

    pub(crate) fn ctx(&self) -> Option<Rc<ContextInner>> {
        self.inner.ctx.upgrade()
    }

    /// The driver controlling the device.
    pub fn driver(&self) -> &Rc<dyn Driver> {
        &self.inner.driver
    }

    /// The device type the driver assigned at discovery.
    pub fn devtype(&self) -> u32 {
        self.inner.devtype
    }

    /// The current lifecycle state.
    pub fn state(&self) -> DevState {
        self.inner.state.get()
    }

    /// Number of enroll stages needed to enroll a finger.
    pub fn nr_enroll_stages(&self) -> u32 {
        self.inner.nr_enroll_stages.get()
    }

    /// Sets the enroll stage count. Drivers call this while opening.
    pub fn set_nr_enroll_stages(&self, stages: u32) {
        self.inner.nr_enroll_stages.set(stages);
    }

    /// The current enroll stage, on `[0, nr_enroll_stages)`.
    pub fn enroll_stage(&self) -> u32 {
        self.inner.enroll_stage.get()
    }

    /// Whether the current capture was requested unconditionally (without finger detection).
    pub fn unconditional_capture(&self) -> bool {
        self.inner.unconditional_capture.get()
    }

    /// The print under verification, while a verify acquisition runs.
    pub fn verify_data(&self) -> Option<PrintData> {
        self.inner.verify_data.borrow().clone()
    }

    /// Runs a closure over the identification gallery.
    pub fn with_identify_gallery<R>(&self, f: impl FnOnce(&[PrintData]) -> R) -> R {
        f(&self.inner.identify_gallery.borrow())
    }

    /// Whether a stored print appears usable with this device.
    pub fn supports_print_data(&self, print: &PrintData) -> bool {
        print.is_compatible(
            self.inner.driver.id(),
            self.inner.devtype,
            self.inner.driver.data_type(),
        )
    }

    /// Loads the print stored for a finger and checks it is usable with this device.
    pub fn load_print(
        &self, store: &fprint_store::PrintStore, finger: fprint_store::Finger,
    ) -> Result<PrintData, Error> {
        let print = store.load(self.inner.driver.id(), self.inner.devtype, finger)?;
        if !self.supports_print_data(&print) {
            log::error!("print data is not compatible");
            return Err(Error::user(Code::InvalidArgument));
        }
        Ok(print)
    }

    /// Stashes driver-private per-device state.
    pub fn set_driver_state(&self, state: Rc<dyn Any>) {
        *self.inner.driver_state.borrow_mut() = Some(state);
    }

    /// The driver-private per-device state, if any.
    pub fn driver_state(&self) -> Option<Rc<dyn Any>> {
        self.inner.driver_state.borrow().clone()
    }

    /// Submits an asynchronous USB transfer on the device.
    pub fn submit_transfer(&self, transfer: Transfer, done: TransferCallback) -> Result<(), Error> {
        match self.inner.usb.borrow().as_ref() {
            Some(usb) => usb.submit(transfer, done),
            None => Err(Error::user(Code::InvalidState)),
        }
    }

    fn expect_state(&self, expected: DevState) -> bool {
        let state = self.inner.state.get();
        if state != expected {
            log::error!("device in state {state:?}, expected {expected:?}");
            return false;
        }
        true
    }

    fn start_allowed(&self) -> Result<(), Error> {
        match self.inner.state.get() {
            DevState::Initialized => Ok(()),
            state => {
                log::error!("acquisition started in state {state:?}");
                Err(Error::user(Code::InvalidState))
            }
        }
    }

    fn stop_allowed(&self, running: DevState, done: Option<DevState>) -> Result<(), Error> {
        let state = self.inner.state.get();
        if state == running || state == DevState::Error || Some(state) == done {
            Ok(())
        } else {
            log::error!("acquisition stopped in state {state:?}");
            Err(Error::user(Code::InvalidState))
        }
    }

    // --- Close ---

    /// Asynchronously closes the device.
    ///
    /// The callback fires once the driver released the hardware; afterwards the device is
    /// in the deinitialized state and unusable.
    pub fn close(&self, callback: CloseCallback) {
        if matches!(self.state(), DevState::Deinitializing | DevState::Deinitialized) {
            log::error!("device closed twice");
            return;
        }
        if let Some(ctx) = self.ctx() {
            let mut opened = ctx.opened.borrow_mut();
            match opened.iter().position(|dev| Rc::ptr_eq(&dev.inner, &self.inner)) {
                Some(at) => drop(opened.remove(at)),
                None => log::error!("device not in opened list"),
            }
        }
        self.inner.callbacks.borrow_mut().close = Some(callback);
        self.inner.state.set(DevState::Deinitializing);
        self.inner.driver.clone().close(self);
    }

    /// Drivers call this when device initialization has completed.
    pub fn report_open_complete(&self, status: Result<(), Error>) {
        log::debug!("open status {status:?}");
        self.expect_state(DevState::Initializing);
        self.inner.state.set(match status {
            Ok(()) => DevState::Initialized,
            Err(_) => DevState::Error,
        });
        if let Some(ctx) = self.ctx() {
            ctx.opened.borrow_mut().push(self.clone());
        }
        if let Some(callback) = self.inner.callbacks.borrow_mut().open.take() {
            callback(self, status);
        }
    }

    /// Drivers call this when device deinitialization has completed.
    pub fn report_close_complete(&self) {
        self.expect_state(DevState::Deinitializing);
        self.inner.state.set(DevState::Deinitialized);
        self.inner.usb.borrow_mut().take();
        *self.inner.driver_state.borrow_mut() = None;
        if let Some(callback) = self.inner.callbacks.borrow_mut().close.take() {
            callback(self);
        }
    }

    // --- Enroll ---

    /// Starts an enrollment acquisition.
    ///
    /// The callback fires once per stage report. Retry outcomes do not advance the stage
    /// counter; the final callback carries [`EnrollResult::Complete`] and the enrolled print,
    /// or an error.
    pub fn enroll_start(&self, callback: EnrollStageCallback) -> Result<(), Error> {
        let caps = self.inner.driver.capabilities();
        if self.nr_enroll_stages() == 0 || !caps.enroll {
            log::error!("driver {} has no enroll stages or no enroll op", self.inner.driver.name());
            return Err(Error::user(Code::NotSupported));
        }
        self.start_allowed()?;
        log::debug!("starting enrollment");
        self.inner.callbacks.borrow_mut().enroll_stage.set(callback);
        self.inner.state.set(DevState::EnrollStarting);
        if let Err(error) = self.inner.driver.clone().enroll_start(self) {
            self.inner.callbacks.borrow_mut().enroll_stage.clear();
            log::error!("failed to start enrollment: {error}");
            self.inner.state.set(DevState::Error);
            return Err(error);
        }
        Ok(())
    }

    /// Stops an enrollment acquisition.
    pub fn enroll_stop(&self, callback: StopCallback) -> Result<(), Error> {
        if !self.inner.driver.capabilities().enroll {
            return Err(Error::user(Code::NotSupported));
        }
        self.stop_allowed(DevState::Enrolling, None)?;
        let mut callbacks = self.inner.callbacks.borrow_mut();
        callbacks.enroll_stage.clear();
        callbacks.enroll_stop = Some(callback);
        drop(callbacks);
        self.inner.state.set(DevState::EnrollStopping);
        if let Err(error) = self.inner.driver.clone().enroll_stop(self) {
            log::error!("failed to stop enrollment: {error}");
            self.inner.callbacks.borrow_mut().enroll_stop = None;
            return Err(error);
        }
        Ok(())
    }

    /// Drivers call this when enrollment has started.
    pub fn report_enroll_started(&self, status: Result<(), Error>) {
        log::debug!("enroll start status {status:?}");
        self.expect_state(DevState::EnrollStarting);
        match status {
            Ok(()) => self.inner.state.set(DevState::Enrolling),
            Err(error) => {
                self.inner.state.set(DevState::Error);
                invoke_slot!(self, enroll_stage, |cb| cb(self, Err(error), None, None));
            }
        }
    }

    /// Drivers call this to report an enroll stage outcome.
    pub fn report_enroll_stage(
        &self, result: Result<EnrollResult, Error>, print: Option<PrintData>,
        image: Option<Image>,
    ) {
        self.expect_state(DevState::Enrolling);
        log::debug!("enroll result {result:?}");
        let result = match result {
            Ok(EnrollResult::Complete) if print.is_none() => {
                log::error!("enrollment complete but no print data");
                Ok(EnrollResult::Fail)
            }
            other => other,
        };
        // Stage accounting: a pass advances, completion and failures reset, retries hold.
        match result {
            Ok(EnrollResult::Pass) => {
                self.inner.enroll_stage.set(self.inner.enroll_stage.get() + 1)
            }
            Ok(EnrollResult::Complete) | Ok(EnrollResult::Fail) | Err(_) => {
                self.inner.enroll_stage.set(0)
            }
            Ok(_) => (),
        }
        invoke_slot!(self, enroll_stage, |cb| cb(self, result, print, image));
    }

    /// Drivers call this when enrollment has stopped.
    pub fn report_enroll_stopped(&self) {
        self.expect_state(DevState::EnrollStopping);
        self.inner.state.set(DevState::Initialized);
        if let Some(callback) = self.inner.callbacks.borrow_mut().enroll_stop.take() {
            callback(self);
        }
    }

    // --- Verify ---

    /// Starts a verification acquisition against an enrolled print.
    pub fn verify_start(
        &self, print: PrintData, callback: VerifyCallback,
    ) -> Result<(), Error> {
        if !self.inner.driver.capabilities().verify {
            return Err(Error::user(Code::NotSupported));
        }
        if !self.supports_print_data(&print) {
            log::error!("print data is not compatible");
            return Err(Error::user(Code::InvalidArgument));
        }
        self.start_allowed()?;
        self.inner.state.set(DevState::VerifyStarting);
        self.inner.callbacks.borrow_mut().verify.set(callback);
        *self.inner.verify_data.borrow_mut() = Some(print);
        if let Err(error) = self.inner.driver.clone().verify_start(self) {
            self.inner.callbacks.borrow_mut().verify.clear();
            self.inner.state.set(DevState::Error);
            log::error!("failed to start verification: {error}");
            return Err(error);
        }
        Ok(())
    }

    /// Stops a verification acquisition.
    pub fn verify_stop(&self, callback: StopCallback) -> Result<(), Error> {
        if !self.inner.driver.capabilities().verify {
            return Err(Error::user(Code::NotSupported));
        }
        self.stop_allowed(DevState::Verifying, Some(DevState::VerifyDone))?;
        let iterating = self.inner.state.get() == DevState::Verifying;
        let mut callbacks = self.inner.callbacks.borrow_mut();
        callbacks.verify.clear();
        callbacks.verify_stop = Some(callback);
        drop(callbacks);
        self.inner.state.set(DevState::VerifyStopping);
        if let Err(error) = self.inner.driver.clone().verify_stop(self, iterating) {
            log::error!("failed to stop verification: {error}");
            self.inner.callbacks.borrow_mut().verify_stop = None;
            return Err(error);
        }
        Ok(())
    }

    /// Drivers call this when verification has started.
    pub fn report_verify_started(&self, status: Result<(), Error>) {
        log::debug!("verify start status {status:?}");
        self.expect_state(DevState::VerifyStarting);
        match status {
            Ok(()) => self.inner.state.set(DevState::Verifying),
            Err(error) => {
                self.inner.state.set(DevState::Error);
                invoke_slot!(self, verify, |cb| cb(self, Err(error), None));
            }
        }
    }

    /// Drivers call this to report a verify outcome (possibly marking completion).
    pub fn report_verify_result(
        &self, result: Result<VerifyResult, Error>, image: Option<Image>,
    ) {
        log::debug!("verify result {result:?}");
        self.expect_state(DevState::Verifying);
        if !matches!(result, Ok(r) if !r.is_terminal()) {
            self.inner.state.set(DevState::VerifyDone);
        }
        invoke_slot!(self, verify, |cb| cb(self, result, image));
    }

    /// Drivers call this when verification has stopped.
    pub fn report_verify_stopped(&self) {
        self.expect_state(DevState::VerifyStopping);
        *self.inner.verify_data.borrow_mut() = None;
        self.inner.state.set(DevState::Initialized);
        if let Some(callback) = self.inner.callbacks.borrow_mut().verify_stop.take() {
            callback(self);
        }
    }

    // --- Identify ---

    /// Starts an identification acquisition against a gallery of enrolled prints.
    pub fn identify_start(
        &self, gallery: Vec<PrintData>, callback: IdentifyCallback,
    ) -> Result<(), Error> {
        if !self.inner.driver.capabilities().identify {
            return Err(Error::user(Code::NotSupported));
        }
        self.start_allowed()?;
        self.inner.state.set(DevState::IdentifyStarting);
        self.inner.callbacks.borrow_mut().identify.set(callback);
        *self.inner.identify_gallery.borrow_mut() = gallery;
        if let Err(error) = self.inner.driver.clone().identify_start(self) {
            log::error!("failed to start identification: {error}");
            self.inner.callbacks.borrow_mut().identify.clear();
            self.inner.state.set(DevState::Error);
            return Err(error);
        }
        Ok(())
    }

    /// Stops an identification acquisition.
    pub fn identify_stop(&self, callback: StopCallback) -> Result<(), Error> {
        if !self.inner.driver.capabilities().identify {
            return Err(Error::user(Code::NotSupported));
        }
        self.stop_allowed(DevState::Identifying, Some(DevState::IdentifyDone))?;
        let iterating = self.inner.state.get() == DevState::Identifying;
        let mut callbacks = self.inner.callbacks.borrow_mut();
        callbacks.identify.clear();
        callbacks.identify_stop = Some(callback);
        drop(callbacks);
        self.inner.state.set(DevState::IdentifyStopping);
        if let Err(error) = self.inner.driver.clone().identify_stop(self, iterating) {
            log::error!("failed to stop identification: {error}");
            self.inner.callbacks.borrow_mut().identify_stop = None;
            return Err(error);
        }
        Ok(())
    }

    /// Drivers call this when identification has started.
    pub fn report_identify_started(&self, status: Result<(), Error>) {
        log::debug!("identify start status {status:?}");
        self.expect_state(DevState::IdentifyStarting);
        match status {
            Ok(()) => self.inner.state.set(DevState::Identifying),
            Err(error) => {
                self.inner.state.set(DevState::Error);
                invoke_slot!(self, identify, |cb| cb(self, Err(error), 0, None));
            }
        }
    }

    /// Drivers call this to report an identify outcome (possibly marking completion).
    pub fn report_identify_result(
        &self, result: Result<VerifyResult, Error>, match_offset: usize, image: Option<Image>,
    ) {
        log::debug!("identify result {result:?}");
        self.expect_state(DevState::Identifying);
        if !matches!(result, Ok(r) if !r.is_terminal()) {
            self.inner.state.set(DevState::IdentifyDone);
        }
        invoke_slot!(self, identify, |cb| cb(self, result, match_offset, image));
    }

    /// Drivers call this when identification has stopped.
    pub fn report_identify_stopped(&self) {
        self.expect_state(DevState::IdentifyStopping);
        self.inner.identify_gallery.borrow_mut().clear();
        self.inner.state.set(DevState::Initialized);
        if let Some(callback) = self.inner.callbacks.borrow_mut().identify_stop.take() {
            callback(self);
        }
    }

    // --- Capture ---

    /// Starts an image capture acquisition.
    ///
    /// An unconditional capture scans immediately instead of awaiting a finger.
    pub fn capture_start(
        &self, unconditional: bool, callback: CaptureCallback,
    ) -> Result<(), Error> {
        if !self.inner.driver.capabilities().capture {
            return Err(Error::user(Code::NotSupported));
        }
        self.start_allowed()?;
        self.inner.state.set(DevState::CaptureStarting);
        self.inner.callbacks.borrow_mut().capture.set(callback);
        self.inner.unconditional_capture.set(unconditional);
        if let Err(error) = self.inner.driver.clone().capture_start(self) {
            self.inner.callbacks.borrow_mut().capture.clear();
            self.inner.state.set(DevState::Error);
            log::error!("failed to start capture: {error}");
            return Err(error);
        }
        Ok(())
    }

    /// Stops an image capture acquisition.
    pub fn capture_stop(&self, callback: StopCallback) -> Result<(), Error> {
        if !self.inner.driver.capabilities().capture {
            return Err(Error::user(Code::NotSupported));
        }
        self.stop_allowed(DevState::Capturing, Some(DevState::CaptureDone))?;
        let mut callbacks = self.inner.callbacks.borrow_mut();
        callbacks.capture.clear();
        callbacks.capture_stop = Some(callback);
        drop(callbacks);
        self.inner.state.set(DevState::CaptureStopping);
        if let Err(error) = self.inner.driver.clone().capture_stop(self) {
            log::error!("failed to stop capture: {error}");
            self.inner.callbacks.borrow_mut().capture_stop = None;
            return Err(error);
        }
        Ok(())
    }

    /// Drivers call this when capture has started.
    pub fn report_capture_started(&self, status: Result<(), Error>) {
        log::debug!("capture start status {status:?}");
        self.expect_state(DevState::CaptureStarting);
        match status {
            Ok(()) => self.inner.state.set(DevState::Capturing),
            Err(error) => {
                self.inner.state.set(DevState::Error);
                invoke_slot!(self, capture, |cb| cb(self, Err(error), None));
            }
        }
    }

    /// Drivers call this to report a capture outcome (possibly marking completion).
    pub fn report_capture_result(
        &self, result: Result<CaptureResult, Error>, image: Option<Image>,
    ) {
        log::debug!("capture result {result:?}");
        self.expect_state(DevState::Capturing);
        if !matches!(result, Ok(CaptureResult::Fail)) {
            self.inner.state.set(DevState::CaptureDone);
        }
        invoke_slot!(self, capture, |cb| cb(self, result, image));
    }

    /// Drivers call this when capture has stopped.
    pub fn report_capture_stopped(&self) {
        self.expect_state(DevState::CaptureStopping);
        self.inner.state.set(DevState::Initialized);
        if let Some(callback) = self.inner.callbacks.borrow_mut().capture_stop.take() {
            callback(self);
        }
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("driver", &self.inner.driver.name())
            .field("devtype", &self.inner.devtype)
            .field("state", &self.inner.state.get())
            .finish()
    }
}
