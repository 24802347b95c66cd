use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::error::TransportError;
use crate::hid::{self, DeviceDescriptor, HidChannel, HidTransport};
use crate::pulsar::battery::{
    classify_frame, normalize_frame, parse_status_payload, BatteryStatus, FrameVerdict,
};
use crate::pulsar::variant::{Pairing, Timing, Variant};

/// Stale reports flushed before each request.
pub const DRAIN_ATTEMPTS: usize = 6;

/// Writer and reader for one exchange. `reader == None` means the writer
/// handle also delivers the responses.
struct Link<'a> {
    writer: &'a mut dyn HidChannel,
    reader: Option<&'a mut dyn HidChannel>,
}

impl Link<'_> {
    fn writer(&mut self) -> &mut dyn HidChannel {
        &mut *self.writer
    }

    fn reader(&mut self) -> &mut dyn HidChannel {
        match self.reader.as_mut() {
            Some(reader) => &mut **reader,
            None => &mut *self.writer,
        }
    }

    fn max_input_len(&self) -> usize {
        let writer = self.writer.max_input_report_len();
        match self.reader.as_ref() {
            Some(reader) => writer.max(reader.max_input_report_len()),
            None => writer,
        }
    }
}

/// Runs the request / wake / retry cycle of one [`Variant`].
#[derive(Debug, Clone)]
pub struct VariantDriver {
    variant: Variant,
}

impl VariantDriver {
    pub fn new(variant: Variant) -> Self {
        Self { variant }
    }

    pub fn with_timing(mut self, timing: Timing) -> Self {
        self.variant.timing = timing;
        self
    }

    pub fn variant(&self) -> &Variant {
        &self.variant
    }

    pub fn model(&self) -> &'static str {
        self.variant.model
    }

    pub fn discover(&self, transport: &dyn HidTransport) -> Vec<DeviceDescriptor> {
        let variant = &self.variant;
        transport.enumerate(variant.vendor_id, &|pid| variant.matches_product(pid))
    }

    /// Reads the battery through `writer`. With cross-interface pairing every
    /// other interface in `pool` is tried as the reader when the writer's own
    /// handle stays silent.
    pub fn read_device(
        &self,
        transport: &dyn HidTransport,
        writer: &DeviceDescriptor,
        pool: &[DeviceDescriptor],
    ) -> Option<BatteryStatus> {
        if let Some(status) = self.read_pair(transport, writer, None) {
            return Some(status);
        }

        if self.variant.pairing == Pairing::SingleHandle {
            return None;
        }

        pool.iter()
            .filter(|reader| reader.path != writer.path)
            .find_map(|reader| self.read_pair(transport, writer, Some(reader)))
    }

    fn read_pair(
        &self,
        transport: &dyn HidTransport,
        writer: &DeviceDescriptor,
        reader: Option<&DeviceDescriptor>,
    ) -> Option<BatteryStatus> {
        trace!(
            model = self.variant.model,
            writer = ?writer.path,
            reader = ?reader.map(|r| &r.path),
            "opening"
        );

        let mut writer_channel = transport.open(writer)?;
        let mut reader_channel = match reader {
            Some(descriptor) => Some(transport.open(descriptor)?),
            None => None,
        };

        let mut link = Link {
            writer: &mut *writer_channel,
            reader: reader_channel.as_mut().map(|r| &mut **r as &mut dyn HidChannel),
        };
        self.exchange(&mut link)
    }

    /// Fast path, then wake sequence and slow path.
    fn exchange(&self, link: &mut Link<'_>) -> Option<BatteryStatus> {
        let timing = self.variant.timing;
        let max_len = link.max_input_len();
        hid::drain(link.reader(), DRAIN_ATTEMPTS, max_len);

        let mut frame = self
            .attempt(link, max_len, timing.fast_deadline)
            .unwrap_or_else(|e| {
                debug!(model = self.variant.model, "fast path failed: {}", e);
                None
            });

        if frame.is_none() {
            debug!(model = self.variant.model, "no answer, sending wake sequence");
            self.wake(link);

            frame = if self.variant.resend_after_wake {
                self.attempt(link, max_len, timing.slow_deadline)
                    .unwrap_or_else(|e| {
                        debug!(model = self.variant.model, "slow path failed: {}", e);
                        None
                    })
            } else {
                self.await_response(link.reader(), max_len, timing.slow_deadline)
            };
        }

        let frame = frame?;
        match parse_status_payload(&frame) {
            Some((percentage, is_charging)) => {
                debug!(
                    model = self.variant.model,
                    percentage,
                    is_charging,
                    "status {:02X?}",
                    frame
                );
                Some(BatteryStatus {
                    percentage,
                    is_charging,
                    model: self.variant.model.to_string(),
                })
            }
            None => {
                debug!(model = self.variant.model, "status parse failed {:02X?}", frame);
                None
            }
        }
    }

    fn attempt(
        &self,
        link: &mut Link<'_>,
        max_len: usize,
        deadline: Duration,
    ) -> Result<Option<Vec<u8>>, TransportError> {
        hid::write_report(link.writer(), self.variant.request, self.variant.write_transport)?;
        pause(self.variant.timing.settle_after_request);
        Ok(self.await_response(link.reader(), max_len, deadline))
    }

    fn wake(&self, link: &mut Link<'_>) {
        for packet in (self.variant.wake_sequence)() {
            if let Err(e) = hid::write_report(link.writer(), &packet, self.variant.write_transport)
            {
                debug!(model = self.variant.model, "wake packet rejected: {}", e);
                break;
            }
            pause(self.variant.timing.wake_gap);
        }
    }

    /// Reads until a frame passes the acceptance rule or `deadline` elapses.
    fn await_response(
        &self,
        reader: &mut dyn HidChannel,
        max_len: usize,
        deadline: Duration,
    ) -> Option<Vec<u8>> {
        let variant = &self.variant;
        let deadline = Instant::now() + deadline;

        loop {
            let now = Instant::now();
            if now >= deadline {
                return None;
            }

            let slice = variant.timing.read_slice.min(deadline - now);
            let Some(raw) = hid::read_with_timeout(reader, max_len, slice) else {
                pause(variant.timing.idle_backoff);
                continue;
            };

            let frame = normalize_frame(raw, &variant.fixup);
            match classify_frame(&frame, variant.response_report_ids, variant.expected_cmd) {
                FrameVerdict::Accepted => return Some(frame),
                FrameVerdict::OtherCommand(cmd) => {
                    debug!(model = variant.model, "skip cmd=0x{:02X} {:02X?}", cmd, frame);
                }
                verdict => trace!(model = variant.model, ?verdict, "ignored {:02X?}", frame),
            }
        }
    }
}

fn pause(duration: Duration) {
    if !duration.is_zero() {
        thread::sleep(duration);
    }
}
