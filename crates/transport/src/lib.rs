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

//! Abstract USB transport interface.
//!
//! The engine never talks to USB directly. It drives an implementation of [`Api`], an
//! asynchronous bulk/interrupt transfer service with a pollfd/timer integration surface.
//! Transfer completions are only dispatched from within [`Api::handle_events`], which is also
//! the engine's sole suspension point.

use std::time::Duration;

pub use fprint_error::Error;

/// Bulk IN endpoint drivers use unless they override per transfer.
pub const BULK_IN_ENDPOINT: u8 = 0x81;

/// Bulk OUT endpoint drivers use unless they override per transfer.
pub const BULK_OUT_ENDPOINT: u8 = 0x02;

/// Interrupt IN endpoint drivers use unless they override per transfer.
pub const INTERRUPT_IN_ENDPOINT: u8 = 0x83;

/// Default transfer timeout in milliseconds.
pub const TRANSFER_TIMEOUT_MS: u32 = 4000;

/// Entry of a driver's USB identity table.
///
/// A driver declares the (vendor, product) pairs it can claim, together with an opaque datum
/// forwarded to the driver when one of them is opened.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct UsbId {
    /// USB vendor id.
    pub vendor: u16,

    /// USB product id.
    pub product: u16,

    /// Opaque per-entry driver datum.
    pub driver_data: u64,
}

/// A USB device visible on the bus, prior to being claimed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// USB vendor id from the device descriptor.
    pub vendor: u16,

    /// USB product id from the device descriptor.
    pub product: u16,

    /// Bus number the device is attached to.
    pub bus: u8,

    /// Device address on its bus.
    pub address: u8,
}

/// A file descriptor the transport needs watched, with its poll event mask.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Pollfd {
    /// The file descriptor.
    pub fd: i32,

    /// Poll events of interest (`POLLIN`/`POLLOUT` semantics).
    pub events: i16,
}

/// Direction and type of a transfer, implied by its endpoint address.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TransferKind {
    /// Device-to-host bulk transfer.
    BulkIn,

    /// Host-to-device bulk transfer.
    BulkOut,

    /// Device-to-host interrupt transfer.
    InterruptIn,
}

/// An asynchronous transfer request.
pub struct Transfer {
    /// Transfer type.
    pub kind: TransferKind,

    /// Endpoint address (bit 7 set for IN endpoints).
    pub endpoint: u8,

    /// OUT payload, or an IN buffer sized to the expected length.
    pub data: Vec<u8>,

    /// Timeout in milliseconds; zero means no timeout.
    pub timeout_ms: u32,
}

impl Transfer {
    /// Creates a bulk IN transfer on the default endpoint with the default timeout.
    pub fn bulk_in(length: usize) -> Self {
        Transfer {
            kind: TransferKind::BulkIn,
            endpoint: BULK_IN_ENDPOINT,
            data: vec![0; length],
            timeout_ms: TRANSFER_TIMEOUT_MS,
        }
    }

    /// Creates a bulk OUT transfer on the default endpoint with the default timeout.
    pub fn bulk_out(data: Vec<u8>) -> Self {
        Transfer {
            kind: TransferKind::BulkOut,
            endpoint: BULK_OUT_ENDPOINT,
            data,
            timeout_ms: TRANSFER_TIMEOUT_MS,
        }
    }

    /// Creates an interrupt IN transfer on the default endpoint with the default timeout.
    pub fn interrupt_in(length: usize) -> Self {
        Transfer {
            kind: TransferKind::InterruptIn,
            endpoint: INTERRUPT_IN_ENDPOINT,
            data: vec![0; length],
            timeout_ms: TRANSFER_TIMEOUT_MS,
        }
    }
}

/// Outcome of an asynchronous transfer.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TransferStatus {
    /// The transfer completed; the callback receives the transferred bytes.
    Completed,

    /// The transfer timed out.
    TimedOut,

    /// The transfer was cancelled.
    Cancelled,

    /// The endpoint stalled.
    Stall,

    /// The device was disconnected.
    NoDevice,

    /// The transfer failed for another reason.
    Failed,
}

impl TransferStatus {
    /// Maps a transfer outcome to the library error convention.
    pub fn to_result(self) -> Result<(), Error> {
        use fprint_error::Code;
        match self {
            TransferStatus::Completed => Ok(()),
            TransferStatus::TimedOut => Err(Error::world(Code::TimedOut)),
            TransferStatus::Cancelled => Err(Error::world(Code::Generic)),
            TransferStatus::Stall => Err(Error::world(Code::Protocol)),
            TransferStatus::NoDevice => Err(Error::world(Code::NotFound)),
            TransferStatus::Failed => Err(Error::world(Code::Io)),
        }
    }
}

/// Completion continuation of an asynchronous transfer.
///
/// Invoked exactly once, from within [`Api::handle_events`], with the outcome and the transfer
/// buffer (truncated to the transferred length for IN transfers).
pub type TransferCallback = Box<dyn FnOnce(TransferStatus, Vec<u8>)>;

/// Notification that a pollfd was added to the watched set.
pub type PollfdAddedCallback = Box<dyn Fn(Pollfd)>;

/// Notification that a pollfd was removed from the watched set.
pub type PollfdRemovedCallback = Box<dyn Fn(i32)>;

/// An opened USB device.
pub trait Device {
    /// Submits an asynchronous transfer.
    ///
    /// The completion callback fires from a later [`Api::handle_events`] call.
    fn submit(&self, transfer: Transfer, done: TransferCallback) -> Result<(), Error>;

    /// Cancels all pending transfers.
    ///
    /// Their callbacks still fire, with [`TransferStatus::Cancelled`].
    fn cancel_all(&self);
}

/// USB transport interface.
pub trait Api {
    /// Lists the devices currently visible on the bus.
    fn enumerate(&self) -> Result<Vec<DeviceInfo>, Error>;

    /// Opens a device for transfer submission.
    fn open(&self, device: &DeviceInfo) -> Result<Box<dyn Device>, Error>;

    /// Waits up to `timeout` and dispatches the transfer completions that became ready.
    fn handle_events(&self, timeout: Duration) -> Result<(), Error>;

    /// Returns how soon the transport itself needs to be woken, if at all.
    fn next_timeout(&self) -> Option<Duration>;

    /// Returns the file descriptors to watch for callers integrating their own main loop.
    fn pollfds(&self) -> Vec<Pollfd>;

    /// Registers callbacks invoked when the watched-fd set changes.
    fn set_pollfd_notifiers(
        &self, added: Option<PollfdAddedCallback>, removed: Option<PollfdRemovedCallback>,
    );
}
