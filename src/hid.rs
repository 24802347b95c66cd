//! HID transport adapter.
//!
//! Everything above this module talks to devices through [`HidTransport`] and
//! [`HidChannel`]. The free functions (`read_with_timeout`, `drain`,
//! `write_report`) carry the timing rules shared by every protocol variant.

use std::collections::HashMap;
use std::ffi::CString;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use hidapi::{HidApi, HidDevice};
use tracing::{debug, trace};

use crate::error::TransportError;

/// Write timeout applied to plain output reports.
pub const OUTPUT_WRITE_TIMEOUT: Duration = Duration::from_millis(500);
/// Per-read timeout used while flushing stale reports.
pub const DRAIN_READ_TIMEOUT: Duration = Duration::from_millis(1);
/// Input length assumed when the report descriptor can't be read.
pub const FALLBACK_INPUT_REPORT_LEN: usize = 64;

const MAX_REPORT_DESCRIPTOR_SIZE: usize = 4096;

/// One attached HID interface, as reported by the OS at enumeration time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub vendor_id: u16,
    pub product_id: u16,
    pub interface_number: i32,
    pub path: CString,
    pub product: Option<String>,
}

/// How a report is pushed to the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportTransport {
    Feature,
    Output,
    /// Feature report if the device declares any feature report, output otherwise.
    Auto,
}

/// Device discovery and opening.
pub trait HidTransport: Send + Sync {
    /// Attached devices with `vendor_id` whose product ID passes `product_filter`.
    fn enumerate(&self, vendor_id: u16, product_filter: &dyn Fn(u16) -> bool)
        -> Vec<DeviceDescriptor>;

    /// Opens a duplex channel. Any OS-level failure yields `None`.
    fn open(&self, descriptor: &DeviceDescriptor) -> Option<Box<dyn HidChannel>>;
}

/// A bidirectional byte channel to one HID interface.
pub trait HidChannel: Send {
    /// Reads one report using the current read timeout. `Ok(0)` on timeout.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;
    fn read_timeout(&self) -> Duration;
    fn set_read_timeout(&mut self, timeout: Duration);
    /// Bound for output-report writes. Backends without a timed write may only
    /// record it.
    fn set_write_timeout(&mut self, timeout: Duration);
    fn send_feature_report(&mut self, frame: &[u8]) -> Result<(), TransportError>;
    fn write(&mut self, frame: &[u8]) -> Result<(), TransportError>;
    fn max_input_report_len(&self) -> usize;
    fn max_feature_report_len(&self) -> usize;
}

/// One bounded read. Timeouts, empty reads and transport errors all come back
/// as `None`.
pub fn read_with_timeout(
    channel: &mut dyn HidChannel,
    max_len: usize,
    timeout: Duration,
) -> Option<Vec<u8>> {
    channel.set_read_timeout(timeout);
    let mut buf = vec![0u8; max_len.max(1)];
    match channel.read(&mut buf) {
        Ok(0) => None,
        Ok(n) => {
            buf.truncate(n);
            Some(buf)
        }
        Err(e) => {
            trace!("read failed: {}", e);
            None
        }
    }
}

/// Flushes up to `attempts` buffered reports. The channel's read timeout is
/// restored before returning.
pub fn drain(channel: &mut dyn HidChannel, attempts: usize, max_len: usize) {
    let original = channel.read_timeout();
    channel.set_read_timeout(DRAIN_READ_TIMEOUT);

    let mut buf = vec![0u8; max_len.max(1)];
    let mut flushed = 0;
    for _ in 0..attempts {
        match channel.read(&mut buf) {
            Ok(n) if n > 0 => flushed += 1,
            _ => break,
        }
    }
    if flushed > 0 {
        trace!(flushed, "drained stale reports");
    }

    channel.set_read_timeout(original);
}

/// Sends `frame` as a feature report or an output report according to `transport`.
pub fn write_report(
    channel: &mut dyn HidChannel,
    frame: &[u8],
    transport: ReportTransport,
) -> Result<(), TransportError> {
    let use_feature = match transport {
        ReportTransport::Feature => true,
        ReportTransport::Output => false,
        ReportTransport::Auto => channel.max_feature_report_len() > 0,
    };

    trace!(feature = use_feature, "write {:02X?}", frame);
    if use_feature {
        return channel.send_feature_report(frame);
    }

    channel.set_write_timeout(OUTPUT_WRITE_TIMEOUT);
    channel.write(frame)
}

/// Largest input and feature report sizes declared by a report descriptor,
/// including the report ID byte when the descriptor uses report IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportLengths {
    pub input: usize,
    pub feature: usize,
}

pub fn report_lengths(descriptor: &[u8]) -> ReportLengths {
    let mut report_size = 0u32;
    let mut report_count = 0u32;
    let mut report_id = 0u8;
    let mut uses_ids = false;
    let mut globals = Vec::new();
    let mut input_bits: HashMap<u8, u32> = HashMap::new();
    let mut feature_bits: HashMap<u8, u32> = HashMap::new();

    let mut i = 0;
    while i < descriptor.len() {
        let prefix = descriptor[i];

        // Long item: 0xFE, size, tag, data
        if prefix == 0xFE {
            let Some(&size) = descriptor.get(i + 1) else { break };
            i += 3 + size as usize;
            continue;
        }

        let size = match prefix & 0x03 {
            3 => 4,
            n => n as usize,
        };
        let Some(data) = descriptor.get(i + 1..i + 1 + size) else { break };
        let value = data
            .iter()
            .rev()
            .fold(0u32, |acc, &b| (acc << 8) | b as u32);

        match prefix & 0xFC {
            0x74 => report_size = value,
            0x94 => report_count = value,
            0x84 => {
                report_id = value as u8;
                uses_ids = true;
            }
            0xA4 => globals.push((report_size, report_count, report_id)),
            0xB4 => {
                if let Some((size, count, id)) = globals.pop() {
                    report_size = size;
                    report_count = count;
                    report_id = id;
                }
            }
            0x80 => *input_bits.entry(report_id).or_default() += report_size * report_count,
            0xB0 => *feature_bits.entry(report_id).or_default() += report_size * report_count,
            _ => {}
        }

        i += 1 + size;
    }

    let id_byte = usize::from(uses_ids);
    let longest = |bits: &HashMap<u8, u32>| {
        bits.values()
            .map(|&b| (b as usize).div_ceil(8) + id_byte)
            .max()
            .unwrap_or(0)
    };

    ReportLengths {
        input: longest(&input_bits),
        feature: longest(&feature_bits),
    }
}

/// [`HidTransport`] backed by the system hidapi library.
pub struct HidApiTransport {
    api: Mutex<HidApi>,
}

impl HidApiTransport {
    pub fn new() -> Result<Self, TransportError> {
        Ok(Self {
            api: Mutex::new(HidApi::new()?),
        })
    }
}

impl HidTransport for HidApiTransport {
    fn enumerate(
        &self,
        vendor_id: u16,
        product_filter: &dyn Fn(u16) -> bool,
    ) -> Vec<DeviceDescriptor> {
        let mut api = self.api.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = api.refresh_devices() {
            debug!("refresh_devices failed: {}", e);
        }

        api.device_list()
            .filter(|info| info.vendor_id() == vendor_id && product_filter(info.product_id()))
            .map(|info| DeviceDescriptor {
                vendor_id: info.vendor_id(),
                product_id: info.product_id(),
                interface_number: info.interface_number(),
                path: info.path().to_owned(),
                product: info.product_string().map(str::to_owned),
            })
            .collect()
    }

    fn open(&self, descriptor: &DeviceDescriptor) -> Option<Box<dyn HidChannel>> {
        let api = self.api.lock().unwrap_or_else(PoisonError::into_inner);
        match api.open_path(&descriptor.path) {
            Ok(device) => Some(Box::new(HidApiChannel::new(device))),
            Err(e) => {
                debug!(path = ?descriptor.path, "open failed: {}", e);
                None
            }
        }
    }
}

pub struct HidApiChannel {
    device: HidDevice,
    read_timeout: Duration,
    write_timeout: Duration,
    lengths: ReportLengths,
}

impl HidApiChannel {
    pub fn new(device: HidDevice) -> Self {
        let mut descriptor = vec![0u8; MAX_REPORT_DESCRIPTOR_SIZE];
        let lengths = match device.get_report_descriptor(&mut descriptor) {
            Ok(n) => report_lengths(&descriptor[..n]),
            Err(e) => {
                debug!("report descriptor unavailable: {}", e);
                ReportLengths {
                    input: FALLBACK_INPUT_REPORT_LEN,
                    feature: 0,
                }
            }
        };

        Self {
            device,
            read_timeout: Duration::from_millis(250),
            write_timeout: OUTPUT_WRITE_TIMEOUT,
            lengths,
        }
    }
}

impl HidChannel for HidApiChannel {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let ms = self.read_timeout.as_millis().min(i32::MAX as u128) as i32;
        Ok(self.device.read_timeout(buf, ms)?)
    }

    fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    fn set_read_timeout(&mut self, timeout: Duration) {
        self.read_timeout = timeout;
    }

    fn set_write_timeout(&mut self, timeout: Duration) {
        self.write_timeout = timeout;
    }

    fn send_feature_report(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        Ok(self.device.send_feature_report(frame)?)
    }

    fn write(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        // hidapi has no write timeout: hid_write blocks until the OS accepts the
        // report, so write_timeout is recorded but not enforced
        trace!(timeout_ms = self.write_timeout.as_millis() as u64, "output report");
        let written = self.device.write(frame)?;
        if written < frame.len() {
            return Err(TransportError::ShortWrite {
                written,
                expected: frame.len(),
            });
        }
        Ok(())
    }

    fn max_input_report_len(&self) -> usize {
        if self.lengths.input == 0 {
            FALLBACK_INPUT_REPORT_LEN
        } else {
            self.lengths.input
        }
    }

    fn max_feature_report_len(&self) -> usize {
        self.lengths.feature
    }
}
