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

//! Driver interface, registry, and device discovery.
//!
//! A driver declares a USB identity table and implements the asynchronous operation hooks the
//! engine calls into. Completion is reported back through the `report_*` methods of
//! [`Device`]. Discovery claims each USB device for the best-scoring registered driver: a
//! driver whose discover hook confirms the device beats one matching by table alone.

use std::rc::Rc;

use fprint_error::{Code, Error};
use fprint_logger as log;
use fprint_store::PrintData;
use fprint_transport::{DeviceInfo, UsbId};

use crate::device::Device;

/// How a device's sensor is used.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ScanType {
    /// The finger is pressed on the sensor.
    Press,

    /// The finger is swiped across the sensor.
    Swipe,
}

/// Operations a driver supports.
#[derive(Debug, Copy, Clone, Default)]
pub struct Capabilities {
    /// Supports enrollment.
    pub enroll: bool,

    /// Supports verification.
    pub verify: bool,

    /// Supports one-to-many identification.
    pub identify: bool,

    /// Supports image capture.
    pub capture: bool,
}

/// Outcome of a driver's discover hook.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Discover {
    /// No refinement: claim by the identity table alone.
    Table,

    /// The driver confirms the device and assigns its device type.
    Claim {
        /// Device type distinguishing incompatible sensor ranges under one driver.
        devtype: u32,
    },

    /// The driver rejects the device despite the table match.
    Reject,
}

/// A fingerprint device driver.
///
/// Drivers implement their multi-step USB protocols with [`crate::ssm::Ssm`] machines and
/// report progress through the device's `report_*` methods. All hooks run on the engine
/// thread, from inside the event loop or a public engine call.
pub trait Driver: 'static {
    /// Stable driver id, unique across releases. Id 0 is invalid.
    fn id(&self) -> u16;

    /// Short driver name.
    fn name(&self) -> &'static str;

    /// Descriptive driver name.
    fn full_name(&self) -> &'static str;

    /// USB identity table of claimable devices.
    fn id_table(&self) -> &[UsbId];

    /// Scan type of the devices this driver supports.
    fn scan_type(&self) -> ScanType {
        ScanType::Press
    }

    /// Payload kind of the prints this driver produces.
    fn data_type(&self) -> fprint_store::PrintDataType {
        fprint_store::PrintDataType::Raw
    }

    /// Operations the driver supports.
    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }

    /// Refines or rejects a table match.
    fn discover(&self, info: &DeviceInfo) -> Result<Discover, Error> {
        let _ = info;
        Ok(Discover::Table)
    }

    /// Runs the device open protocol.
    ///
    /// The default reports immediate success for devices needing no initialization.
    fn open(&self, dev: &Device, driver_data: u64) -> Result<(), Error> {
        let _ = driver_data;
        dev.report_open_complete(Ok(()));
        Ok(())
    }

    /// Runs the device close protocol.
    fn close(&self, dev: &Device) {
        dev.report_close_complete();
    }

    /// Starts an enrollment acquisition.
    fn enroll_start(&self, dev: &Device) -> Result<(), Error> {
        let _ = dev;
        Err(Error::user(Code::NotSupported))
    }

    /// Stops an enrollment acquisition. The default has no stop step.
    fn enroll_stop(&self, dev: &Device) -> Result<(), Error> {
        dev.report_enroll_stopped();
        Ok(())
    }

    /// Starts a verification acquisition.
    fn verify_start(&self, dev: &Device) -> Result<(), Error> {
        let _ = dev;
        Err(Error::user(Code::NotSupported))
    }

    /// Stops a verification acquisition.
    ///
    /// `iterating` is whether the acquisition was still awaiting a result.
    fn verify_stop(&self, dev: &Device, iterating: bool) -> Result<(), Error> {
        let _ = iterating;
        dev.report_verify_stopped();
        Ok(())
    }

    /// Starts an identification acquisition.
    fn identify_start(&self, dev: &Device) -> Result<(), Error> {
        let _ = dev;
        Err(Error::user(Code::NotSupported))
    }

    /// Stops an identification acquisition.
    fn identify_stop(&self, dev: &Device, iterating: bool) -> Result<(), Error> {
        let _ = iterating;
        dev.report_identify_stopped();
        Ok(())
    }

    /// Starts an image capture acquisition.
    fn capture_start(&self, dev: &Device) -> Result<(), Error> {
        let _ = dev;
        Err(Error::user(Code::NotSupported))
    }

    /// Stops an image capture acquisition.
    fn capture_stop(&self, dev: &Device) -> Result<(), Error> {
        dev.report_capture_stopped();
        Ok(())
    }
}

/// A USB device claimed by a registered driver, ready to be opened.
#[derive(Clone)]
pub struct DiscoveredDevice {
    pub(crate) driver: Rc<dyn Driver>,
    pub(crate) info: DeviceInfo,
    pub(crate) driver_data: u64,
    pub(crate) devtype: u32,
}

impl DiscoveredDevice {
    /// The driver that claimed the device.
    pub fn driver_name(&self) -> &'static str {
        self.driver.name()
    }

    /// The device type the driver assigned.
    pub fn devtype(&self) -> u32 {
        self.devtype
    }

    /// The USB identity of the device.
    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    /// Whether a stored print appears usable with this device.
    pub fn supports_print_data(&self, print: &PrintData) -> bool {
        print.is_compatible(self.driver.id(), self.devtype, self.driver.data_type())
    }
}

impl std::fmt::Debug for DiscoveredDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscoveredDevice")
            .field("driver", &self.driver.name())
            .field("info", &self.info)
            .field("devtype", &self.devtype)
            .finish()
    }
}

/// Finds the first stored print in a list compatible with a discovered device.
pub fn device_for_print_data<'a>(
    devices: &'a [DiscoveredDevice], print: &PrintData,
) -> Option<&'a DiscoveredDevice> {
    devices.iter().find(|dev| dev.supports_print_data(print))
}

/// Claims a USB device for the best-scoring registered driver.
pub(crate) fn claim_device(
    drivers: &[Rc<dyn Driver>], info: &DeviceInfo,
) -> Option<DiscoveredDevice> {
    let mut best: Option<(u32, DiscoveredDevice)> = None;
    'drivers: for driver in drivers {
        for id in driver.id_table() {
            if id.vendor != info.vendor || id.product != info.product {
                continue;
            }
            let (score, devtype) = match driver.discover(info) {
                Ok(Discover::Table) => (50, 0),
                Ok(Discover::Claim { devtype }) => (100, devtype),
                Ok(Discover::Reject) => continue,
                Err(error) => {
                    log::error!("{} discover failed: {}", driver.name(), error);
                    continue;
                }
            };
            if best.as_ref().is_some_and(|(s, _)| *s >= score) {
                continue;
            }
            log::debug!(
                "driver {} supports USB device {:04x}:{:04x}",
                driver.name(),
                id.vendor,
                id.product
            );
            let claimed = DiscoveredDevice {
                driver: driver.clone(),
                info: info.clone(),
                driver_data: id.driver_data,
                devtype,
            };
            best = Some((score, claimed));
            if score == 100 {
                // No driver can outscore a confirmed discover hook.
                break 'drivers;
            }
        }
    }
    best.map(|(_, claimed)| claimed)
}
