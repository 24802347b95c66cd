// Scripted HID transport shared by the integration tests.
//
// Each mock interface reads from a named inbox and pushes whatever its
// responder returns into another named inbox, so split request/response
// interfaces can be modelled by pointing two interfaces at the same inbox.
// Every open, write and successful read is recorded.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::ffi::CString;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};
use std::time::Duration;

use pulsar_battery::error::TransportError;
use pulsar_battery::hid::{DeviceDescriptor, HidChannel, HidTransport};
use pulsar_battery::pulsar::variant::{self, Timing, Variant};
use pulsar_battery::pulsar::VariantDriver;

/// Longest a mock read blocks when its inbox is empty.
const MAX_IDLE_READ: Duration = Duration::from_millis(20);

/// Maps a written frame (and whether it went out as a feature report) to the
/// frames the device answers with.
pub type Responder = Arc<dyn Fn(&[u8], bool) -> Vec<Vec<u8>> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Opened(String),
    Write {
        path: String,
        feature: bool,
        frame: Vec<u8>,
    },
    Read {
        path: String,
        frame: Vec<u8>,
    },
    WriteTimeout {
        path: String,
        timeout: Duration,
    },
}

#[derive(Clone)]
pub struct MockInterface {
    pub descriptor: DeviceDescriptor,
    pub input_len: usize,
    pub feature_len: usize,
    pub reads_from: &'static str,
    pub replies_to: &'static str,
    pub openable: bool,
    pub responder: Option<Responder>,
}

impl MockInterface {
    pub fn new(vendor_id: u16, product_id: u16, interface_number: i32) -> Self {
        let path = format!("mock/{:04x}:{:04x}/{}", vendor_id, product_id, interface_number);
        Self {
            descriptor: DeviceDescriptor {
                vendor_id,
                product_id,
                interface_number,
                path: CString::new(path).unwrap(),
                product: Some("Mock Mouse".into()),
            },
            input_len: 17,
            feature_len: 0,
            reads_from: "default",
            replies_to: "default",
            openable: true,
            responder: None,
        }
    }

    pub fn input_len(mut self, len: usize) -> Self {
        self.input_len = len;
        self
    }

    pub fn feature_len(mut self, len: usize) -> Self {
        self.feature_len = len;
        self
    }

    pub fn reads_from(mut self, inbox: &'static str) -> Self {
        self.reads_from = inbox;
        self
    }

    pub fn replies_to(mut self, inbox: &'static str) -> Self {
        self.replies_to = inbox;
        self
    }

    pub fn unopenable(mut self) -> Self {
        self.openable = false;
        self
    }

    pub fn responder<F>(mut self, f: F) -> Self
    where
        F: Fn(&[u8], bool) -> Vec<Vec<u8>> + Send + Sync + 'static,
    {
        self.responder = Some(Arc::new(f));
        self
    }

    pub fn path(&self) -> String {
        self.descriptor.path.to_string_lossy().into_owned()
    }
}

#[derive(Default)]
struct Shared {
    interfaces: Mutex<Vec<MockInterface>>,
    inboxes: Mutex<HashMap<&'static str, VecDeque<Vec<u8>>>>,
    events: Mutex<Vec<Event>>,
    open_by_thread: Mutex<HashMap<ThreadId, usize>>,
    overlap: AtomicBool,
}

impl Shared {
    fn record(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }

    fn push(&self, inbox: &'static str, frame: Vec<u8>) {
        self.inboxes
            .lock()
            .unwrap()
            .entry(inbox)
            .or_default()
            .push_back(frame);
    }

    fn pop(&self, inbox: &'static str) -> Option<Vec<u8>> {
        self.inboxes.lock().unwrap().get_mut(inbox)?.pop_front()
    }
}

/// Cheap to clone; clones share interfaces, inboxes and the event log.
#[derive(Clone, Default)]
pub struct MockTransport {
    shared: Arc<Shared>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, interface: MockInterface) -> Self {
        self.shared.interfaces.lock().unwrap().push(interface);
        self
    }

    /// Queues a frame as if the device had sent it before anyone asked.
    pub fn queue(&self, inbox: &'static str, frame: Vec<u8>) {
        self.shared.push(inbox, frame);
    }

    pub fn pending(&self, inbox: &'static str) -> usize {
        self.shared
            .inboxes
            .lock()
            .unwrap()
            .get(inbox)
            .map_or(0, VecDeque::len)
    }

    pub fn events(&self) -> Vec<Event> {
        self.shared.events.lock().unwrap().clone()
    }

    pub fn writes(&self) -> Vec<(String, bool, Vec<u8>)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Write {
                    path,
                    feature,
                    frame,
                } => Some((path, feature, frame)),
                _ => None,
            })
            .collect()
    }

    pub fn opened(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Opened(path) => Some(path),
                _ => None,
            })
            .collect()
    }

    /// True if two threads ever held channels at the same time.
    pub fn overlap_detected(&self) -> bool {
        self.shared.overlap.load(Ordering::SeqCst)
    }
}

impl HidTransport for MockTransport {
    fn enumerate(
        &self,
        vendor_id: u16,
        product_filter: &dyn Fn(u16) -> bool,
    ) -> Vec<DeviceDescriptor> {
        self.shared
            .interfaces
            .lock()
            .unwrap()
            .iter()
            .filter(|i| i.descriptor.vendor_id == vendor_id)
            .filter(|i| product_filter(i.descriptor.product_id))
            .map(|i| i.descriptor.clone())
            .collect()
    }

    fn open(&self, descriptor: &DeviceDescriptor) -> Option<Box<dyn HidChannel>> {
        let interface = self
            .shared
            .interfaces
            .lock()
            .unwrap()
            .iter()
            .find(|i| i.descriptor.path == descriptor.path)
            .cloned()?;
        if !interface.openable {
            return None;
        }

        let me = thread::current().id();
        {
            let mut owners = self.shared.open_by_thread.lock().unwrap();
            if owners.iter().any(|(id, &n)| *id != me && n > 0) {
                self.shared.overlap.store(true, Ordering::SeqCst);
            }
            *owners.entry(me).or_default() += 1;
        }

        self.shared.record(Event::Opened(interface.path()));
        Some(Box::new(MockChannel {
            shared: Arc::clone(&self.shared),
            interface,
            owner: me,
            read_timeout: Duration::from_millis(250),
        }))
    }
}

struct MockChannel {
    shared: Arc<Shared>,
    interface: MockInterface,
    owner: ThreadId,
    read_timeout: Duration,
}

impl MockChannel {
    fn deliver(&self, frame: &[u8], feature: bool) {
        self.shared.record(Event::Write {
            path: self.interface.path(),
            feature,
            frame: frame.to_vec(),
        });
        // Give a concurrent caller the chance to show up mid-exchange
        thread::sleep(Duration::from_millis(1));

        if let Some(responder) = &self.interface.responder {
            for reply in responder(frame, feature) {
                self.shared.push(self.interface.replies_to, reply);
            }
        }
    }
}

impl HidChannel for MockChannel {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        match self.shared.pop(self.interface.reads_from) {
            Some(frame) => {
                let n = frame.len().min(buf.len());
                buf[..n].copy_from_slice(&frame[..n]);
                self.shared.record(Event::Read {
                    path: self.interface.path(),
                    frame: frame[..n].to_vec(),
                });
                Ok(n)
            }
            None => {
                thread::sleep(self.read_timeout.min(MAX_IDLE_READ));
                Ok(0)
            }
        }
    }

    fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    fn set_read_timeout(&mut self, timeout: Duration) {
        self.read_timeout = timeout;
    }

    fn set_write_timeout(&mut self, timeout: Duration) {
        self.shared.record(Event::WriteTimeout {
            path: self.interface.path(),
            timeout,
        });
    }

    fn send_feature_report(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        if self.interface.feature_len == 0 {
            return Err(TransportError::Hid("no feature report declared".into()));
        }
        self.deliver(frame, true);
        Ok(())
    }

    fn write(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        self.deliver(frame, false);
        Ok(())
    }

    fn max_input_report_len(&self) -> usize {
        self.interface.input_len
    }

    fn max_feature_report_len(&self) -> usize {
        self.interface.feature_len
    }
}

impl Drop for MockChannel {
    fn drop(&mut self) {
        let mut owners = self.shared.open_by_thread.lock().unwrap();
        if let Some(n) = owners.get_mut(&self.owner) {
            *n = n.saturating_sub(1);
        }
    }
}

/// 17-byte status response: `[report_id, 0x04, 0, 0, 0, 0, pct, charging, ...]`.
pub fn status_frame(report_id: u8, percentage: u8, charging: u8) -> Vec<u8> {
    frame(report_id, 0x04, percentage, charging)
}

pub fn frame(report_id: u8, command: u8, byte6: u8, byte7: u8) -> Vec<u8> {
    let mut f = vec![0u8; 17];
    f[0] = report_id;
    f[1] = command;
    f[6] = byte6;
    f[7] = byte7;
    f
}

pub fn is_status_request(frame: &[u8]) -> bool {
    frame.len() == 17 && frame[0] == 0x08 && frame[1] == 0x04
}

/// Short deadlines so failing paths finish in well under a second.
pub fn fast_timing() -> Timing {
    Timing {
        fast_deadline: Duration::from_millis(80),
        slow_deadline: Duration::from_millis(150),
        read_slice: Duration::from_millis(20),
        wake_gap: Duration::ZERO,
        settle_after_request: Duration::ZERO,
        idle_backoff: Duration::from_millis(1),
    }
}

pub fn fast_driver(variant: Variant) -> VariantDriver {
    VariantDriver::new(variant).with_timing(fast_timing())
}

pub fn fast_drivers() -> Vec<VariantDriver> {
    variant::all().into_iter().map(fast_driver).collect()
}

pub fn crazylight_interface(interface_number: i32) -> MockInterface {
    MockInterface::new(
        variant::CRAZYLIGHT_VENDOR_ID,
        variant::CRAZYLIGHT_PID_WIRELESS,
        interface_number,
    )
}

pub fn v1_interface(interface_number: i32) -> MockInterface {
    MockInterface::new(variant::V1_VENDOR_ID, variant::V1_PID_WIRELESS, interface_number)
}
