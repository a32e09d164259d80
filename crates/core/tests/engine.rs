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

//! Session engine tests against an in-memory transport.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use fprint_core::{Context, DevState, Ssm};
use fprint_error::Error;
use fprint_transport::{Api, DeviceInfo, Pollfd, PollfdAddedCallback, PollfdRemovedCallback,
    Transfer, TransferCallback, TransferStatus, UsbId};

/// Transfer completions queued until the next event-loop pass.
type CompletionQueue = Rc<RefCell<VecDeque<Box<dyn FnOnce()>>>>;

struct FakeTransport {
    completions: CompletionQueue,
}

impl FakeTransport {
    fn new() -> (Self, CompletionQueue) {
        let completions = CompletionQueue::default();
        (FakeTransport { completions: completions.clone() }, completions)
    }
}

struct FakeUsbDevice {
    completions: CompletionQueue,
}

impl fprint_transport::Device for FakeUsbDevice {
    fn submit(&self, transfer: Transfer, done: TransferCallback) -> Result<(), Error> {
        // Echo transfers: complete with the submitted buffer on the next event-loop pass.
        self.completions
            .borrow_mut()
            .push_back(Box::new(move || done(TransferStatus::Completed, transfer.data)));
        Ok(())
    }

    fn cancel_all(&self) {}
}

impl Api for FakeTransport {
    fn enumerate(&self) -> Result<Vec<DeviceInfo>, Error> {
        Ok(vec![DeviceInfo { vendor: 0x1234, product: 0x5678, bus: 1, address: 2 }])
    }

    fn open(&self, _device: &DeviceInfo) -> Result<Box<dyn fprint_transport::Device>, Error> {
        Ok(Box::new(FakeUsbDevice { completions: self.completions.clone() }))
    }

    fn handle_events(&self, timeout: Duration) -> Result<(), Error> {
        let pending: Vec<_> = self.completions.borrow_mut().drain(..).collect();
        if pending.is_empty() {
            // Nothing ready: block like a real transport would.
            std::thread::sleep(timeout.min(Duration::from_millis(200)));
        }
        for completion in pending {
            completion();
        }
        Ok(())
    }

    fn next_timeout(&self) -> Option<Duration> {
        None
    }

    fn pollfds(&self) -> Vec<Pollfd> {
        vec![Pollfd { fd: 42, events: 1 }]
    }

    fn set_pollfd_notifiers(
        &self, _added: Option<PollfdAddedCallback>, _removed: Option<PollfdRemovedCallback>,
    ) {
    }
}

struct FakeDriver;

const FAKE_IDS: &[UsbId] = &[UsbId { vendor: 0x1234, product: 0x5678, driver_data: 7 }];

impl fprint_core::Driver for FakeDriver {
    fn id(&self) -> u16 {
        0x0042
    }

    fn name(&self) -> &'static str {
        "fake"
    }

    fn full_name(&self) -> &'static str {
        "Fake Sensor"
    }

    fn id_table(&self) -> &[UsbId] {
        FAKE_IDS
    }
}

fn context() -> Context {
    let _ = env_logger::builder().is_test(true).try_init();
    let (transport, _) = FakeTransport::new();
    let ctx = Context::new(Box::new(transport));
    ctx.register_driver(Rc::new(FakeDriver)).unwrap();
    ctx
}

#[test]
fn open_then_immediate_close() {
    let ctx = context();
    let devices = ctx.discover_devices().unwrap();
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].driver_name(), "fake");

    let calls = Rc::new(RefCell::new(Vec::new()));
    let recorded = calls.clone();
    let device = ctx
        .open_device(
            &devices[0],
            Box::new(move |dev, status| {
                status.unwrap();
                recorded.borrow_mut().push("open");
                let recorded = recorded.clone();
                dev.close(Box::new(move |_| recorded.borrow_mut().push("close")));
            }),
        )
        .unwrap();

    assert_eq!(*calls.borrow(), ["open", "close"]);
    assert_eq!(device.state(), DevState::Deinitialized);
    assert!(ctx.opened_devices().is_empty());
}

#[test]
fn timers_fire_in_expiry_order_within_one_call() {
    let ctx = context();
    let fired = Rc::new(RefCell::new(Vec::new()));
    for (delay, name) in [(50, "a"), (20, "b")] {
        let fired = fired.clone();
        ctx.add_timeout(Duration::from_millis(delay), move || fired.borrow_mut().push(name));
    }
    ctx.handle_events_timeout(Duration::from_millis(100)).unwrap();
    assert_eq!(*fired.borrow(), ["b", "a"]);
}

#[test]
fn cancelled_timer_never_fires() {
    let ctx = context();
    let handle = ctx.add_timeout(Duration::from_millis(5), || panic!("cancelled timer fired"));
    ctx.cancel_timeout(handle);
    ctx.handle_events_timeout(Duration::from_millis(20)).unwrap();
}

#[test]
fn timer_callback_may_cancel_other_timers() {
    let ctx = Rc::new(context());
    let fired = Rc::new(RefCell::new(0));
    let late = {
        let fired = fired.clone();
        ctx.add_timeout(Duration::from_millis(60), move || *fired.borrow_mut() += 1)
    };
    {
        let ctx = ctx.clone();
        ctx.clone().add_timeout(Duration::from_millis(10), move || ctx.cancel_timeout(late));
    }
    ctx.handle_events_timeout(Duration::from_millis(100)).unwrap();
    assert_eq!(*fired.borrow(), 0);
}

#[test]
fn next_timeout_reflects_the_earliest_timer() {
    let ctx = context();
    assert_eq!(ctx.get_next_timeout(), None);
    ctx.add_timeout(Duration::from_millis(50), || ());
    let next = ctx.get_next_timeout().unwrap();
    assert!(next <= Duration::from_millis(50));
}

#[test]
fn pollfds_come_from_the_transport() {
    let ctx = context();
    assert_eq!(ctx.get_pollfds(), [Pollfd { fd: 42, events: 1 }]);
}

#[test]
fn ssm_runs_a_linear_protocol_over_transfers() {
    let ctx = context();
    let devices = ctx.discover_devices().unwrap();
    let device = ctx.open_device(&devices[0], Box::new(|_, status| status.unwrap())).unwrap();

    let steps = Rc::new(RefCell::new(Vec::new()));
    let recorded = steps.clone();
    let ssm = Ssm::new(
        &device,
        move |ssm| {
            recorded.borrow_mut().push(ssm.cur_state());
            let ssm = ssm.clone();
            let transfer = Transfer::bulk_out(vec![ssm.cur_state() as u8]);
            let ssm_cb = ssm.clone();
            ssm.device()
                .submit_transfer(
                    transfer,
                    Box::new(move |status, _| {
                        status.to_result().unwrap();
                        ssm_cb.next();
                    }),
                )
                .unwrap();
        },
        3,
    );

    let done = Rc::new(RefCell::new(false));
    let completed = done.clone();
    ssm.start(move |ssm| {
        assert!(ssm.error().is_none());
        *completed.borrow_mut() = true;
    });

    for _ in 0 .. 5 {
        if *done.borrow() {
            break;
        }
        ctx.handle_events_timeout(Duration::from_millis(10)).unwrap();
    }
    assert!(*done.borrow());
    assert!(ssm.has_completed());
    assert_eq!(*steps.borrow(), [0, 1, 2]);
}

#[test]
fn child_ssm_failure_aborts_the_parent() {
    let ctx = context();
    let devices = ctx.discover_devices().unwrap();
    let device = ctx.open_device(&devices[0], Box::new(|_, status| status.unwrap())).unwrap();

    let parent = Ssm::new(
        &device,
        |ssm| {
            if ssm.cur_state() == 0 {
                let child = Ssm::new(
                    ssm.device(),
                    |child| child.mark_aborted(Error::world(fprint_error::Code::Io)),
                    1,
                );
                ssm.start_subsm(&child);
            }
        },
        2,
    );
    let outcome = Rc::new(RefCell::new(None));
    let recorded = outcome.clone();
    parent.start(move |ssm| *recorded.borrow_mut() = Some(ssm.error()));
    assert_eq!(
        *outcome.borrow(),
        Some(Some(Error::world(fprint_error::Code::Io)))
    );
}

#[test]
fn child_ssm_success_advances_the_parent() {
    let ctx = context();
    let devices = ctx.discover_devices().unwrap();
    let device = ctx.open_device(&devices[0], Box::new(|_, status| status.unwrap())).unwrap();

    let steps = Rc::new(RefCell::new(Vec::new()));
    let recorded = steps.clone();
    let parent = Ssm::new(
        &device,
        move |ssm| {
            recorded.borrow_mut().push(ssm.cur_state());
            if ssm.cur_state() == 0 {
                let child = Ssm::new(ssm.device(), |child| child.mark_completed(), 1);
                ssm.start_subsm(&child);
            } else {
                ssm.next();
            }
        },
        2,
    );
    let done = Rc::new(RefCell::new(false));
    let completed = done.clone();
    parent.start(move |ssm| {
        assert!(ssm.error().is_none());
        *completed.borrow_mut() = true;
    });
    assert!(*done.borrow());
    assert_eq!(*steps.borrow(), [0, 1]);
}
