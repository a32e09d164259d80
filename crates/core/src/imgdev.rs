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

//! Imaging device core.
//!
//! Protocol drivers for imaging sensors implement [`ImageDriver`] and only deal in low-level
//! notifications: finger on, finger off, image ready. This module owns the per-acquisition
//! state machine (activate, await finger, capture, await release, deactivate), sanitizes and
//! standardizes the images, converts them to templates, runs the matcher, and reports
//! enroll/verify/identify/capture results through the device.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use fprint_error::{Code, Error};
use fprint_logger as log;
use fprint_store::{PrintData, PrintDataType};
use fprint_transport::{DeviceInfo, UsbId};

use crate::device::{CaptureResult, Device, EnrollResult, VerifyResult};
use crate::drv::{Capabilities, Discover, Driver, ScanType};
use crate::img::{Image, compare_print_data, compare_print_data_to_gallery, image_to_print_data};

/// Minutiae below this count make a scan unusable for enrollment or matching.
pub const MIN_ACCEPTABLE_MINUTIAE: usize = 10;

/// Enroll stages imaging devices use.
pub const IMG_ENROLL_STAGES: u32 = 5;

/// Transport-level states the core asks imaging drivers to move through.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ImgDeviceState {
    /// Nothing to watch.
    Inactive,

    /// Watch for a finger arriving on the sensor.
    AwaitFingerOn,

    /// Capture an image.
    Capture,

    /// Watch for the finger leaving the sensor.
    AwaitFingerOff,
}

/// The per-acquisition state machine.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum AcquireState {
    None,
    Activating,
    AwaitFingerOn,
    AwaitImage,
    AwaitFingerOff,
    Deactivating,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Action {
    None,
    Enroll,
    Verify,
    Identify,
    Capture,
}

/// Early scan termination codes drivers may report.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ScanRetry {
    /// The sample was unusable.
    Retry,

    /// The swipe was too short.
    TooShort,

    /// The finger was not centered.
    CenterFinger,

    /// The finger must be removed and the scan retried.
    RemoveFinger,
}

impl ScanRetry {
    fn enroll(self) -> EnrollResult {
        match self {
            ScanRetry::Retry => EnrollResult::Retry,
            ScanRetry::TooShort => EnrollResult::RetryTooShort,
            ScanRetry::CenterFinger => EnrollResult::RetryCenterFinger,
            ScanRetry::RemoveFinger => EnrollResult::RetryRemoveFinger,
        }
    }

    fn verify(self) -> VerifyResult {
        match self {
            ScanRetry::Retry => VerifyResult::Retry,
            ScanRetry::TooShort => VerifyResult::RetryTooShort,
            ScanRetry::CenterFinger => VerifyResult::RetryCenterFinger,
            ScanRetry::RemoveFinger => VerifyResult::RetryRemoveFinger,
        }
    }
}

/// The result pending delivery once the finger leaves the sensor.
enum PendingResult {
    None,
    Enroll(Result<EnrollResult, Error>),
    Verify(Result<VerifyResult, Error>),
    Identify(Result<VerifyResult, Error>, usize),
    Capture(Result<CaptureResult, Error>),
}

impl PendingResult {
    fn is_none(&self) -> bool {
        matches!(self, PendingResult::None)
    }
}

/// Static description of an imaging driver.
#[derive(Debug, Clone)]
pub struct ImageDriverInfo {
    /// Stable driver id.
    pub id: u16,

    /// Short driver name.
    pub name: &'static str,

    /// Descriptive driver name.
    pub full_name: &'static str,

    /// USB identity table.
    pub id_table: &'static [UsbId],

    /// Scan type of the sensors.
    pub scan_type: ScanType,

    /// Fixed image width, 0 for variable.
    pub img_width: u32,

    /// Fixed image height, 0 for variable.
    pub img_height: u32,

    /// Match threshold override; 0 selects the default.
    pub bz3_threshold: u32,

    /// Whether the sensor can capture without finger detection.
    pub supports_unconditional_capture: bool,
}

/// An imaging sensor protocol driver.
///
/// All hooks run on the engine thread. Completion and sensor notifications are reported
/// through the [`ImgDevice`] handle.
pub trait ImageDriver: 'static {
    /// Static driver description.
    fn info(&self) -> &ImageDriverInfo;

    /// Refines or rejects a USB identity table match.
    fn discover(&self, info: &DeviceInfo) -> Result<Discover, Error> {
        let _ = info;
        Ok(Discover::Table)
    }

    /// Runs the device open protocol.
    fn open(&self, dev: &ImgDevice, driver_data: u64) -> Result<(), Error> {
        let _ = driver_data;
        dev.open_complete(Ok(()));
        Ok(())
    }

    /// Runs the device close protocol.
    fn close(&self, dev: &ImgDevice) {
        dev.close_complete();
    }

    /// Brings the sensor into an acquisition-ready state.
    fn activate(&self, dev: &ImgDevice, state: ImgDeviceState) -> Result<(), Error>;

    /// Moves the active sensor between finger-watch and capture states.
    fn change_state(&self, dev: &ImgDevice, state: ImgDeviceState) -> Result<(), Error> {
        let _ = (dev, state);
        Ok(())
    }

    /// Shuts acquisition down; the driver reports completion asynchronously.
    fn deactivate(&self, dev: &ImgDevice);
}

/// Per-acquisition session state attached to the device.
struct ImgSession {
    driver: Rc<dyn ImageDriver>,
    action: Cell<Action>,
    state: Cell<AcquireState>,
    result: RefCell<PendingResult>,
    acquire_data: RefCell<Option<PrintData>>,
    enroll_data: RefCell<Option<PrintData>>,
    acquire_img: RefCell<Option<Image>>,
    enroll_stage: Cell<u32>,
    identify_match_offset: Cell<usize>,
}

/// Handle imaging drivers use to reach the core.
#[derive(Clone)]
pub struct ImgDevice {
    device: Device,
    session: Rc<ImgSession>,
}

impl ImgDevice {
    fn from_device(device: &Device) -> Option<ImgDevice> {
        let session = device.driver_state()?.downcast::<ImgSession>().ok()?;
        Some(ImgDevice { device: device.clone(), session })
    }

    /// The underlying device.
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Fixed image width declared by the driver, 0 for variable.
    pub fn img_width(&self) -> u32 {
        self.session.driver.info().img_width
    }

    /// Fixed image height declared by the driver, 0 for variable.
    pub fn img_height(&self) -> u32 {
        self.session.driver.info().img_height
    }

    /// Drivers call this when their open protocol completed.
    pub fn open_complete(&self, status: Result<(), Error>) {
        self.device.report_open_complete(status);
    }

    /// Drivers call this when their close protocol completed.
    pub fn close_complete(&self) {
        self.device.report_close_complete();
    }

    fn change_state(&self, state: ImgDeviceState) {
        if let Err(error) = self.session.driver.clone().change_state(self, state) {
            log::error!("state change to {state:?} failed: {error}");
        }
    }

    /// Drivers call this when activation completed.
    pub fn activate_complete(&self, status: Result<(), Error>) {
        log::debug!("activation status {status:?}");
        let ok = status.is_ok();
        match self.session.action.get() {
            Action::Enroll => self.device.report_enroll_started(status),
            Action::Verify => self.device.report_verify_started(status),
            Action::Identify => self.device.report_identify_started(status),
            Action::Capture => self.device.report_capture_started(status),
            Action::None => {
                log::error!("activation completed with no action");
                return;
            }
        }
        if ok {
            self.session.state.set(AcquireState::AwaitFingerOn);
            self.change_state(ImgDeviceState::AwaitFingerOn);
        }
    }

    /// Drivers call this when deactivation completed.
    pub fn deactivate_complete(&self) {
        log::debug!("deactivated");
        match self.session.action.get() {
            Action::Enroll => self.device.report_enroll_stopped(),
            Action::Verify => self.device.report_verify_stopped(),
            Action::Identify => self.device.report_identify_stopped(),
            Action::Capture => self.device.report_capture_stopped(),
            Action::None => log::error!("deactivation completed with no action"),
        }
        self.session.action.set(Action::None);
        self.session.state.set(AcquireState::None);
    }

    /// Drivers call this on finger arrival and removal.
    ///
    /// While awaiting a finger, its arrival moves the sensor to capture. While awaiting
    /// removal, its departure delivers the pending result. Anything else is ignored.
    pub fn report_finger_status(&self, present: bool) {
        log::debug!("{}", if present { "finger on sensor" } else { "finger removed" });
        let state = self.session.state.get();
        if present && state == AcquireState::AwaitFingerOn {
            self.change_state(ImgDeviceState::Capture);
            self.session.state.set(AcquireState::AwaitImage);
            return;
        }
        if present || state != AcquireState::AwaitFingerOff {
            log::debug!("ignoring status report");
            return;
        }

        // Clear the buffers before reporting to keep reentrant calls from seeing them.
        let image = self.session.acquire_img.borrow_mut().take();
        let data = self.session.acquire_data.borrow_mut().take();
        let result = std::mem::replace(&mut *self.session.result.borrow_mut(),
            PendingResult::None);
        match result {
            PendingResult::Enroll(result) => {
                log::debug!("reporting enroll result");
                let print = match result {
                    Ok(EnrollResult::Complete) => self.session.enroll_data.borrow_mut().take(),
                    _ => None,
                };
                self.device.report_enroll_stage(result, print, image);
                // The callback may cancel enrollment: only rearm if it is still running and
                // the stage wants another scan.
                if self.session.action.get() == Action::Enroll
                    && matches!(result, Ok(r) if r != EnrollResult::Complete && r != EnrollResult::Fail)
                {
                    self.session.state.set(AcquireState::AwaitFingerOn);
                    self.change_state(ImgDeviceState::AwaitFingerOn);
                }
            }
            PendingResult::Verify(result) => {
                self.device.report_verify_result(result, image);
                drop(data);
            }
            PendingResult::Identify(result, offset) => {
                self.device.report_identify_result(result, offset, image);
                drop(data);
            }
            PendingResult::Capture(result) => {
                self.device.report_capture_result(result, image);
            }
            PendingResult::None => log::error!("finger removed with no pending result"),
        }
    }

    /// Drivers call this to terminate the scan early with a retry code.
    pub fn abort_scan(&self, retry: ScanRetry) {
        let result = match self.session.action.get() {
            Action::Enroll => PendingResult::Enroll(Ok(retry.enroll())),
            Action::Verify => PendingResult::Verify(Ok(retry.verify())),
            Action::Identify => PendingResult::Identify(Ok(retry.verify()), 0),
            Action::Capture => PendingResult::Capture(Ok(CaptureResult::Fail)),
            Action::None => {
                log::error!("scan aborted with no action");
                return;
            }
        };
        *self.session.result.borrow_mut() = result;
        self.session.state.set(AcquireState::AwaitFingerOff);
        self.change_state(ImgDeviceState::AwaitFingerOff);
    }

    /// Checks the image against the driver's declared geometry.
    fn sanitize_image(&self, image: &mut Image) -> Result<(), Error> {
        let info = self.session.driver.info();
        let mut width = image.width();
        let mut height = image.height();
        if info.img_width > 0 {
            width = info.img_width as usize;
        } else if width == 0 {
            log::error!("no image width assigned");
            return Err(Error::user(Code::InvalidArgument));
        }
        if info.img_height > 0 {
            height = info.img_height as usize;
        } else if height == 0 {
            log::error!("no image height assigned");
            return Err(Error::user(Code::InvalidArgument));
        }
        image.set_size(width, height);
        if !image.is_sane() {
            log::error!("image is not sane");
            return Err(Error::user(Code::InvalidLength));
        }
        Ok(())
    }

    /// Drivers call this with a scanned image.
    ///
    /// Only valid while an image is awaited. The image is sanitized and standardized; for
    /// capture actions it becomes the result, otherwise it is converted to a template and
    /// matched or accumulated according to the action. The session then awaits finger
    /// removal.
    pub fn image_captured(&self, mut image: Image) {
        if self.session.state.get() != AcquireState::AwaitImage {
            log::debug!("ignoring image in state {:?}", self.session.state.get());
            return;
        }
        if !self.session.result.borrow().is_none() {
            log::debug!("not overwriting existing action result");
            return;
        }
        let action = self.session.action.get();

        if let Err(error) = self.sanitize_image(&mut image) {
            self.fail_action(action, error);
            self.session.state.set(AcquireState::AwaitFingerOff);
            self.change_state(ImgDeviceState::AwaitFingerOff);
            return;
        }
        image.standardize();

        let result = match action {
            Action::Capture => PendingResult::Capture(Ok(CaptureResult::Complete)),
            _ => match self.process_scan(action, &mut image) {
                Ok(result) => result,
                Err(error) => {
                    self.session.state.set(AcquireState::AwaitFingerOff);
                    self.change_state(ImgDeviceState::AwaitFingerOff);
                    self.fail_action(action, error);
                    *self.session.acquire_img.borrow_mut() = Some(image);
                    return;
                }
            },
        };
        *self.session.acquire_img.borrow_mut() = Some(image);
        *self.session.result.borrow_mut() = result;
        self.session.state.set(AcquireState::AwaitFingerOff);
        self.change_state(ImgDeviceState::AwaitFingerOff);
    }

    /// Converts a standardized scan to a template and scores or accumulates it.
    fn process_scan(&self, action: Action, image: &mut Image) -> Result<PendingResult, Error> {
        let ctx = self.device.ctx().ok_or_else(|| Error::internal(Code::InvalidState))?;
        let driver = self.device.driver();
        let print =
            match image_to_print_data(image, driver.id(), self.device.devtype(), &*ctx.extractor)
            {
                Ok(print) => print,
                Err(error) => {
                    log::debug!("image to print data conversion error: {error}");
                    return Ok(self.retry_result(action));
                }
            };
        let minutiae = image.minutiae().map_or(0, |m| m.len());
        if minutiae < MIN_ACCEPTABLE_MINUTIAE {
            log::debug!("not enough minutiae, {minutiae}/{MIN_ACCEPTABLE_MINUTIAE}");
            return Ok(self.retry_result(action));
        }

        let threshold = match self.session.driver.info().bz3_threshold {
            0 => fprint_match::DEFAULT_MATCH_THRESHOLD,
            threshold => threshold,
        };
        match action {
            Action::Enroll => {
                let mut enroll_data = self.session.enroll_data.borrow_mut();
                let enroll_data = enroll_data.get_or_insert_with(|| {
                    PrintData::new(driver.id(), self.device.devtype(), PrintDataType::Minutiae)
                });
                enroll_data.items.extend(print.items);
                let stage = self.session.enroll_stage.get() + 1;
                self.session.enroll_stage.set(stage);
                if stage == self.device.nr_enroll_stages() {
                    Ok(PendingResult::Enroll(Ok(EnrollResult::Complete)))
                } else {
                    Ok(PendingResult::Enroll(Ok(EnrollResult::Pass)))
                }
            }
            Action::Verify => {
                let enrolled = self
                    .device
                    .verify_data()
                    .ok_or_else(|| Error::internal(Code::InvalidState))?;
                let score = compare_print_data(&enrolled, &print, &ctx.tunables)?;
                *self.session.acquire_data.borrow_mut() = Some(print);
                let result = if score >= threshold {
                    VerifyResult::Match
                } else {
                    VerifyResult::NoMatch
                };
                Ok(PendingResult::Verify(Ok(result)))
            }
            Action::Identify => {
                let found = self.device.with_identify_gallery(|gallery| {
                    compare_print_data_to_gallery(&print, gallery, threshold, &ctx.tunables)
                })?;
                *self.session.acquire_data.borrow_mut() = Some(print);
                let result = match found {
                    Some(offset) => {
                        self.session.identify_match_offset.set(offset);
                        PendingResult::Identify(Ok(VerifyResult::Match), offset)
                    }
                    None => PendingResult::Identify(Ok(VerifyResult::NoMatch), 0),
                };
                Ok(result)
            }
            Action::Capture | Action::None => Err(Error::internal(Code::InvalidState)),
        }
    }

    fn retry_result(&self, action: Action) -> PendingResult {
        match action {
            Action::Enroll => PendingResult::Enroll(Ok(EnrollResult::Retry)),
            Action::Verify => PendingResult::Verify(Ok(VerifyResult::Retry)),
            Action::Identify => PendingResult::Identify(Ok(VerifyResult::Retry), 0),
            Action::Capture | Action::None => PendingResult::None,
        }
    }

    fn fail_action(&self, action: Action, error: Error) {
        let result = match action {
            Action::Enroll => PendingResult::Enroll(Err(error)),
            Action::Verify => PendingResult::Verify(Err(error)),
            Action::Identify => PendingResult::Identify(Err(error), 0),
            Action::Capture => PendingResult::Capture(Err(error)),
            Action::None => PendingResult::None,
        };
        *self.session.result.borrow_mut() = result;
    }

    /// Drivers call this on an unrecoverable session error.
    ///
    /// The error is delivered through the appropriate completion callback; no further state
    /// transitions are made.
    pub fn session_error(&self, error: Error) {
        log::debug!("session error {error}");
        match self.session.action.get() {
            Action::Enroll => self.device.report_enroll_stage(Err(error), None, None),
            Action::Verify => self.device.report_verify_result(Err(error), None),
            Action::Identify => self.device.report_identify_result(Err(error), 0, None),
            Action::Capture => self.device.report_capture_result(Err(error), None),
            Action::None => log::error!("session error with no action"),
        }
    }
}

/// Adapter implementing the engine driver interface on top of an imaging driver.
pub(crate) struct ImgDriverAdapter {
    driver: Rc<dyn ImageDriver>,
}

impl ImgDriverAdapter {
    pub(crate) fn new(driver: Rc<dyn ImageDriver>) -> Self {
        ImgDriverAdapter { driver }
    }

    fn session(&self, dev: &Device) -> Option<ImgDevice> {
        let imgdev = ImgDevice::from_device(dev);
        if imgdev.is_none() {
            log::error!("device has no imaging session");
        }
        imgdev
    }

    fn acquire_start(&self, dev: &Device, action: Action) -> Result<(), Error> {
        let imgdev = self.session(dev).ok_or_else(|| Error::internal(Code::InvalidState))?;
        log::debug!("action {action:?}");
        imgdev.session.action.set(action);
        imgdev.session.state.set(AcquireState::Activating);
        imgdev.session.enroll_stage.set(0);
        if let Err(error) = self.driver.activate(&imgdev, ImgDeviceState::AwaitFingerOn) {
            log::error!("activation failed: {error}");
            imgdev.session.action.set(Action::None);
            imgdev.session.state.set(AcquireState::None);
            return Err(error);
        }
        Ok(())
    }

    fn acquire_stop(&self, dev: &Device) -> Result<(), Error> {
        let imgdev = self.session(dev).ok_or_else(|| Error::internal(Code::InvalidState))?;
        imgdev.session.state.set(AcquireState::Deactivating);
        self.driver.deactivate(&imgdev);
        *imgdev.session.acquire_data.borrow_mut() = None;
        *imgdev.session.enroll_data.borrow_mut() = None;
        *imgdev.session.acquire_img.borrow_mut() = None;
        *imgdev.session.result.borrow_mut() = PendingResult::None;
        imgdev.session.identify_match_offset.set(0);
        Ok(())
    }
}

impl Driver for ImgDriverAdapter {
    fn id(&self) -> u16 {
        self.driver.info().id
    }

    fn name(&self) -> &'static str {
        self.driver.info().name
    }

    fn full_name(&self) -> &'static str {
        self.driver.info().full_name
    }

    fn id_table(&self) -> &[UsbId] {
        self.driver.info().id_table
    }

    fn scan_type(&self) -> ScanType {
        self.driver.info().scan_type
    }

    fn data_type(&self) -> PrintDataType {
        PrintDataType::Minutiae
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities { enroll: true, verify: true, identify: true, capture: true }
    }

    fn discover(&self, info: &DeviceInfo) -> Result<Discover, Error> {
        self.driver.discover(info)
    }

    fn open(&self, dev: &Device, driver_data: u64) -> Result<(), Error> {
        let session = Rc::new(ImgSession {
            driver: self.driver.clone(),
            action: Cell::new(Action::None),
            state: Cell::new(AcquireState::None),
            result: RefCell::new(PendingResult::None),
            acquire_data: RefCell::new(None),
            enroll_data: RefCell::new(None),
            acquire_img: RefCell::new(None),
            enroll_stage: Cell::new(0),
            identify_match_offset: Cell::new(0),
        });
        dev.set_driver_state(session.clone());
        dev.set_nr_enroll_stages(IMG_ENROLL_STAGES);
        let imgdev = ImgDevice { device: dev.clone(), session };
        self.driver.open(&imgdev, driver_data)
    }

    fn close(&self, dev: &Device) {
        match self.session(dev) {
            Some(imgdev) => self.driver.close(&imgdev),
            None => dev.report_close_complete(),
        }
    }

    fn enroll_start(&self, dev: &Device) -> Result<(), Error> {
        self.acquire_start(dev, Action::Enroll)
    }

    fn enroll_stop(&self, dev: &Device) -> Result<(), Error> {
        self.acquire_stop(dev)
    }

    fn verify_start(&self, dev: &Device) -> Result<(), Error> {
        self.acquire_start(dev, Action::Verify)
    }

    fn verify_stop(&self, dev: &Device, _iterating: bool) -> Result<(), Error> {
        self.acquire_stop(dev)
    }

    fn identify_start(&self, dev: &Device) -> Result<(), Error> {
        self.acquire_start(dev, Action::Identify)
    }

    fn identify_stop(&self, dev: &Device, _iterating: bool) -> Result<(), Error> {
        self.acquire_stop(dev)
    }

    fn capture_start(&self, dev: &Device) -> Result<(), Error> {
        if dev.unconditional_capture() && !self.driver.info().supports_unconditional_capture {
            return Err(Error::user(Code::NotSupported));
        }
        self.acquire_start(dev, Action::Capture)
    }

    fn capture_stop(&self, dev: &Device) -> Result<(), Error> {
        self.acquire_stop(dev)
    }
}
