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

//! Imaging core tests: the acquisition state machine driven by a scripted sensor.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use fprint_core::{CaptureResult, Context, DevState, Device, Discover, EnrollResult,
    FeatureExtractor, Image, ImageDriver, ImageDriverInfo, ImgDevice, ImgDeviceState, ScanType,
    VerifyResult};
use fprint_error::Error;
use fprint_match::Tunables;
use fprint_minutiae::{BinaryImage, FullDir, HIGH_RELIABILITY, Minutia, MinutiaKind, Minutiae};
use fprint_store::PrintData;
use fprint_transport::{Api, DeviceInfo, Pollfd, PollfdAddedCallback, PollfdRemovedCallback,
    Transfer, TransferCallback, UsbId};

struct NullTransport;

impl Api for NullTransport {
    fn enumerate(&self) -> Result<Vec<DeviceInfo>, Error> {
        Ok(vec![DeviceInfo { vendor: 0xabcd, product: 0x0001, bus: 1, address: 1 }])
    }

    fn open(&self, _device: &DeviceInfo) -> Result<Box<dyn fprint_transport::Device>, Error> {
        struct NoTransfers;
        impl fprint_transport::Device for NoTransfers {
            fn submit(&self, _: Transfer, _: TransferCallback) -> Result<(), Error> {
                unreachable!("scripted sensor does not transfer")
            }

            fn cancel_all(&self) {}
        }
        Ok(Box::new(NoTransfers))
    }

    fn handle_events(&self, _timeout: Duration) -> Result<(), Error> {
        Ok(())
    }

    fn next_timeout(&self) -> Option<Duration> {
        None
    }

    fn pollfds(&self) -> Vec<Pollfd> {
        Vec::new()
    }

    fn set_pollfd_notifiers(
        &self, _added: Option<PollfdAddedCallback>, _removed: Option<PollfdRemovedCallback>,
    ) {
    }
}

/// Extracts synthetic minutiae: the image's first pixel is the count, its second pixel
/// seeds the geometry so scans with different seeds share no pair structure.
struct StubExtractor;

impl FeatureExtractor for StubExtractor {
    fn extract(&self, image: &Image) -> Result<(Minutiae, BinaryImage), Error> {
        let count = image.data()[0] as usize;
        let seed = image.data()[1] as i32;
        let list = (0 .. count)
            .map(|i| {
                let i = i as i32;
                let x = 10 + (i * (7 + 13 * seed)).rem_euclid(97);
                let y = 10 + (i * (11 + 17 * seed)).rem_euclid(89);
                Minutia {
                    x,
                    y,
                    ex: x,
                    ey: y - 1,
                    direction: FullDir::new((i as u8 * 5) % 32),
                    reliability: HIGH_RELIABILITY,
                    kind: MinutiaKind::RidgeEnding,
                    appearing: true,
                    feature_id: 0,
                    neighbors: None,
                }
            })
            .collect();
        let bin = BinaryImage::new(image.width(), image.height(),
            vec![0; image.width() * image.height()])?;
        Ok((Minutiae(list), bin))
    }
}

const SENSOR_IDS: &[UsbId] = &[UsbId { vendor: 0xabcd, product: 0x0001, driver_data: 0 }];

const SENSOR_INFO: ImageDriverInfo = ImageDriverInfo {
    id: 0x0077,
    name: "scripted",
    full_name: "Scripted Sensor",
    id_table: SENSOR_IDS,
    scan_type: ScanType::Press,
    img_width: 0,
    img_height: 0,
    bz3_threshold: 0,
    supports_unconditional_capture: false,
};

/// A sensor whose hardware is the test body: it hands its core handle out and records the
/// transport states the core requests.
struct ScriptedSensor {
    handle: Rc<RefCell<Option<ImgDevice>>>,
    states: Rc<RefCell<Vec<ImgDeviceState>>>,
}

impl ImageDriver for ScriptedSensor {
    fn info(&self) -> &ImageDriverInfo {
        &SENSOR_INFO
    }

    fn discover(&self, _info: &DeviceInfo) -> Result<Discover, Error> {
        Ok(Discover::Claim { devtype: 0xaabbccdd })
    }

    fn activate(&self, dev: &ImgDevice, state: ImgDeviceState) -> Result<(), Error> {
        self.states.borrow_mut().push(state);
        *self.handle.borrow_mut() = Some(dev.clone());
        dev.activate_complete(Ok(()));
        Ok(())
    }

    fn change_state(&self, _dev: &ImgDevice, state: ImgDeviceState) -> Result<(), Error> {
        self.states.borrow_mut().push(state);
        Ok(())
    }

    fn deactivate(&self, dev: &ImgDevice) {
        dev.deactivate_complete();
    }
}

struct Rig {
    // The device only holds a weak reference to the engine: the rig keeps it alive.
    _ctx: Context,
    device: Device,
    handle: Rc<RefCell<Option<ImgDevice>>>,
    states: Rc<RefCell<Vec<ImgDeviceState>>>,
}

impl Rig {
    fn new() -> Rig {
        let _ = env_logger::builder().is_test(true).try_init();
        let ctx = Context::with_parts(Box::new(NullTransport), Box::new(StubExtractor),
            Tunables::default());
        let handle = Rc::new(RefCell::new(None));
        let states = Rc::new(RefCell::new(Vec::new()));
        let sensor = ScriptedSensor { handle: handle.clone(), states: states.clone() };
        ctx.register_image_driver(Rc::new(sensor)).unwrap();
        let devices = ctx.discover_devices().unwrap();
        assert_eq!(devices[0].devtype(), 0xaabbccdd);
        let device = ctx.open_device(&devices[0], Box::new(|_, status| status.unwrap())).unwrap();
        assert_eq!(device.state(), DevState::Initialized);
        Rig { _ctx: ctx, device, handle, states }
    }

    fn imgdev(&self) -> ImgDevice {
        self.handle.borrow().clone().unwrap()
    }

    /// A full scan: finger arrives, an image with the given minutiae count and stretch seed
    /// is delivered, the finger leaves.
    fn scan(&self, minutiae: u8, stretch: u8) {
        let imgdev = self.imgdev();
        imgdev.report_finger_status(true);
        let mut data = vec![128u8; 64];
        data[0] = minutiae;
        data[1] = stretch;
        imgdev.image_captured(Image::from_data(8, 8, data));
        imgdev.report_finger_status(false);
    }
}

type EnrollLog = Rc<RefCell<Vec<(Result<EnrollResult, Error>, Option<PrintData>)>>>;

fn start_enroll(rig: &Rig) -> EnrollLog {
    let log: EnrollLog = Rc::default();
    let recorded = log.clone();
    rig.device
        .enroll_start(Box::new(move |_, result, print, _| {
            recorded.borrow_mut().push((result, print));
        }))
        .unwrap();
    log
}

#[test]
fn enroll_with_retry_then_complete() {
    let rig = Rig::new();
    let log = start_enroll(&rig);
    assert_eq!(rig.device.state(), DevState::Enrolling);

    // A scan with too few minutiae is a retry and leaves the stage counter alone.
    rig.scan(5, 0);
    assert_eq!(log.borrow().len(), 1);
    assert_eq!(log.borrow()[0].0, Ok(EnrollResult::Retry));
    assert_eq!(rig.device.enroll_stage(), 0);
    // The core re-armed finger detection for the retried stage.
    assert_eq!(rig.states.borrow().last(), Some(&ImgDeviceState::AwaitFingerOn));

    // Good scans pass each stage until the final one completes.
    for stage in 1 .. rig.device.nr_enroll_stages() {
        rig.scan(40, 0);
        assert_eq!(log.borrow().last().unwrap().0, Ok(EnrollResult::Pass));
        assert_eq!(rig.device.enroll_stage(), stage);
    }
    rig.scan(40, 0);
    let log = log.borrow();
    let (result, print) = log.last().unwrap();
    assert_eq!(*result, Ok(EnrollResult::Complete));
    let print = print.as_ref().expect("complete without print data");
    assert_eq!(print.items.len(), rig.device.nr_enroll_stages() as usize);
    assert!(rig.device.supports_print_data(print));

    drop(log);
    // Stop returns the device to the initialized state.
    rig.device.enroll_stop(Box::new(|_| ())).unwrap();
    assert_eq!(rig.device.state(), DevState::Initialized);
}

fn enroll_print(rig: &Rig, stretch: u8) -> PrintData {
    let log = start_enroll(rig);
    for _ in 0 .. rig.device.nr_enroll_stages() {
        rig.scan(40, stretch);
    }
    let print = log.borrow().last().unwrap().1.clone().expect("enrollment did not complete");
    rig.device.enroll_stop(Box::new(|_| ())).unwrap();
    print
}

#[test]
fn verify_matches_the_enrolled_finger() {
    let rig = Rig::new();
    let print = enroll_print(&rig, 0);

    let results = Rc::new(RefCell::new(Vec::new()));
    let recorded = results.clone();
    rig.device
        .verify_start(print, Box::new(move |_, result, _| recorded.borrow_mut().push(result)))
        .unwrap();
    rig.scan(40, 0);
    assert_eq!(*results.borrow(), [Ok(VerifyResult::Match)]);
    assert_eq!(rig.device.state(), DevState::VerifyDone);
    rig.device.verify_stop(Box::new(|_| ())).unwrap();
    assert_eq!(rig.device.state(), DevState::Initialized);
}

#[test]
fn verify_rejects_a_different_finger() {
    let rig = Rig::new();
    let print = enroll_print(&rig, 0);

    let results = Rc::new(RefCell::new(Vec::new()));
    let recorded = results.clone();
    rig.device
        .verify_start(print, Box::new(move |_, result, _| recorded.borrow_mut().push(result)))
        .unwrap();
    // A differently seeded geometry shares no pairwise structure with the enrolled one.
    rig.scan(40, 9);
    assert_eq!(*results.borrow(), [Ok(VerifyResult::NoMatch)]);
    rig.device.verify_stop(Box::new(|_| ())).unwrap();
}

#[test]
fn identify_returns_the_matching_gallery_offset() {
    let rig = Rig::new();
    let other = enroll_print(&rig, 9);
    let target = enroll_print(&rig, 0);

    let results = Rc::new(RefCell::new(Vec::new()));
    let recorded = results.clone();
    rig.device
        .identify_start(
            vec![other, target],
            Box::new(move |_, result, offset, _| recorded.borrow_mut().push((result, offset))),
        )
        .unwrap();
    rig.scan(40, 0);
    assert_eq!(*results.borrow(), [(Ok(VerifyResult::Match), 1)]);
    rig.device.identify_stop(Box::new(|_| ())).unwrap();
    assert_eq!(rig.device.state(), DevState::Initialized);
}

#[test]
fn capture_standardizes_and_stores_the_image() {
    let rig = Rig::new();
    let results = Rc::new(RefCell::new(Vec::new()));
    let recorded = results.clone();
    rig.device
        .capture_start(
            false,
            Box::new(move |_, result, image| {
                recorded.borrow_mut().push((result, image));
            }),
        )
        .unwrap();

    let imgdev = rig.imgdev();
    imgdev.report_finger_status(true);
    let mut image = Image::from_data(2, 2, vec![10, 20, 30, 40]);
    image.flags.v_flipped = true;
    imgdev.image_captured(image);
    imgdev.report_finger_status(false);

    let results = results.borrow();
    let (result, image) = &results[0];
    assert_eq!(*result, Ok(CaptureResult::Complete));
    let image = image.as_ref().expect("capture without image");
    assert!(!image.flags.needs_standardization());
    assert_eq!(image.data(), [30, 40, 10, 20]);
    assert_eq!(rig.device.state(), DevState::CaptureDone);
}

#[test]
fn session_error_reaches_the_caller_once() {
    let rig = Rig::new();
    let log = start_enroll(&rig);
    rig.imgdev().session_error(Error::world(fprint_error::Code::Io));
    assert_eq!(log.borrow().len(), 1);
    assert_eq!(log.borrow()[0].0, Err(Error::world(fprint_error::Code::Io)));
}

#[test]
fn spurious_finger_reports_are_ignored() {
    let rig = Rig::new();
    let log = start_enroll(&rig);
    let imgdev = rig.imgdev();
    // Removal while awaiting arrival changes nothing; arrival arms the capture once, and
    // repeated reports while an image is awaited are ignored.
    imgdev.report_finger_status(false);
    imgdev.report_finger_status(true);
    imgdev.report_finger_status(true);
    imgdev.report_finger_status(false);
    assert!(log.borrow().is_empty());
    assert_eq!(rig.device.state(), DevState::Enrolling);
}

#[test]
fn unsanitizable_image_fails_the_scan() {
    let rig = Rig::new();
    let log = start_enroll(&rig);
    let imgdev = rig.imgdev();
    imgdev.report_finger_status(true);
    // Zero-width image with a variable-size driver: rejected at sanitization.
    imgdev.image_captured(Image::from_data(0, 8, vec![0; 64]));
    imgdev.report_finger_status(false);
    let log = log.borrow();
    assert_eq!(log.len(), 1);
    assert!(log[0].0.is_err());
}
