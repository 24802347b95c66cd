pub mod backend;
pub mod config;
pub mod error;
pub mod hid;
pub mod monitor;
pub mod notify;
pub mod pulsar;

pub use backend::{BatteryReader, StatusReader};
pub use monitor::Monitor;
pub use pulsar::BatteryStatus;
