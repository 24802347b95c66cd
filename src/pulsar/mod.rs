//! Pulsar X2 vendor protocol: frame rules, per-family tables and the shared
//! request/wake/retry engine.

pub mod battery;
pub mod device;
pub mod variant;

pub use battery::BatteryStatus;
pub use device::VariantDriver;
pub use variant::{Pairing, Timing, Variant};
