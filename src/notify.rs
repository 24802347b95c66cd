use tracing::{info, warn};

use crate::monitor::alert::{LevelChange, LowBatteryAlert};

/// Receives the events the monitor decides to raise. Rendering (toast, sound,
/// tray) is up to the implementation.
pub trait BatteryNotifier: Send + Sync {
    fn low_battery(&self, alert: &LowBatteryAlert, beep: bool);

    fn level_changed(&self, _change: &LevelChange) {}
}

/// Writes events to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl BatteryNotifier for LogNotifier {
    fn low_battery(&self, alert: &LowBatteryAlert, beep: bool) {
        warn!(
            model = %alert.model,
            percentage = alert.percentage,
            threshold = alert.threshold,
            beep,
            "Low battery"
        );
    }

    fn level_changed(&self, change: &LevelChange) {
        info!(
            model = %change.model,
            charging = change.is_charging,
            "Battery {}% -> {}%",
            change.previous_percentage,
            change.current_percentage
        );
    }
}
