use std::sync::{Mutex, PoisonError};

use tracing::debug;

use crate::error::TransportError;
use crate::hid::{HidApiTransport, HidTransport};
use crate::pulsar::{variant, BatteryStatus, VariantDriver};

/// Physical HID access is serialized process-wide: one request/response cycle
/// at a time, whichever reader instance issued it.
static READ_GATE: Mutex<()> = Mutex::new(());

/// Anything that can produce a live battery reading.
pub trait StatusReader: Send + Sync {
    fn read_battery_status(&self) -> Option<BatteryStatus>;
}

/// Tries every known mouse family, in order, on every matching interface.
pub struct BatteryReader {
    transport: Box<dyn HidTransport>,
    drivers: Vec<VariantDriver>,
}

impl BatteryReader {
    /// Reader over the system hidapi library with all known families.
    pub fn new() -> Result<Self, TransportError> {
        let transport = HidApiTransport::new()?;
        Ok(Self::with_transport(
            Box::new(transport),
            variant::all().into_iter().map(VariantDriver::new).collect(),
        ))
    }

    pub fn with_transport(transport: Box<dyn HidTransport>, drivers: Vec<VariantDriver>) -> Self {
        Self { transport, drivers }
    }

    pub fn drivers(&self) -> &[VariantDriver] {
        &self.drivers
    }

    pub fn transport(&self) -> &dyn HidTransport {
        self.transport.as_ref()
    }
}

impl StatusReader for BatteryReader {
    fn read_battery_status(&self) -> Option<BatteryStatus> {
        let _gate = READ_GATE.lock().unwrap_or_else(PoisonError::into_inner);

        for driver in &self.drivers {
            let devices = driver.discover(self.transport.as_ref());
            if devices.is_empty() {
                debug!(model = driver.model(), "no matching devices");
                continue;
            }

            for device in &devices {
                if let Some(status) = driver.read_device(self.transport.as_ref(), device, &devices)
                {
                    debug!(
                        model = %status.model,
                        percentage = status.percentage,
                        charging = status.is_charging,
                        "battery read"
                    );
                    return Some(status);
                }
            }
            debug!(model = driver.model(), candidates = devices.len(), "no device answered");
        }

        None
    }
}
