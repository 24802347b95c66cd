use std::time::{Duration, Instant};

use crate::pulsar::BatteryStatus;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LowBatteryAlert {
    pub percentage: u8,
    pub threshold: u8,
    pub model: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelChange {
    pub previous_percentage: u8,
    pub current_percentage: u8,
    pub is_charging: bool,
    pub model: String,
}

/// Cooldown and level bookkeeping for alert decisions.
#[derive(Debug, Clone, Default)]
pub struct AlertTracker {
    last_alert_at: Option<Instant>,
    last_level: Option<u8>,
}

impl AlertTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decides whether `status` warrants a low-battery alert.
    ///
    /// Charging, or a level at/above `threshold`, clears the cooldown so the
    /// next drop alerts straight away. Below the threshold, an alert fires if
    /// none has been raised yet or more than `cooldown` has passed since the
    /// last one.
    pub fn evaluate(
        &mut self,
        status: &BatteryStatus,
        threshold: u8,
        cooldown: Duration,
        now: Instant,
    ) -> Option<LowBatteryAlert> {
        if status.is_charging || status.percentage >= threshold {
            self.last_alert_at = None;
            return None;
        }

        if let Some(last) = self.last_alert_at {
            if now.saturating_duration_since(last) <= cooldown {
                return None;
            }
        }

        self.last_alert_at = Some(now);
        Some(LowBatteryAlert {
            percentage: status.percentage,
            threshold,
            model: status.model.clone(),
        })
    }

    /// Reports a change against the previously seen level. The very first
    /// reading is only remembered.
    pub fn observe_level(&mut self, status: &BatteryStatus) -> Option<LevelChange> {
        let previous = self.last_level.replace(status.percentage)?;
        (previous != status.percentage).then(|| LevelChange {
            previous_percentage: previous,
            current_percentage: status.percentage,
            is_charging: status.is_charging,
            model: status.model.clone(),
        })
    }

    pub fn last_alert_at(&self) -> Option<Instant> {
        self.last_alert_at
    }
}
