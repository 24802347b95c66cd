/// Battery state reported by one successful status exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatteryStatus {
    pub percentage: u8, // 0-100
    pub is_charging: bool,
    pub model: String,
}

/// Report ID used for every request frame.
pub const OUTPUT_REPORT_ID: u8 = 0x08;
/// Length of a normalized report, report ID included.
pub const REPORT_LEN: usize = 17;
/// Shortest frame the acceptance rule looks at.
pub const MIN_FRAME_LEN: usize = 7;

pub const CMD_IDENTIFY: u8 = 0x01;
pub const CMD_MODE: u8 = 0x02;
pub const CMD_PING: u8 = 0x03;
pub const CMD_STATUS: u8 = 0x04;
pub const CMD_PROBE: u8 = 0x0E;

/// Offsets inside a normalized status response.
pub const BATTERY_OFFSET: usize = 6;
pub const CHARGING_OFFSET: usize = 7;

/// Parses a status response frame (report ID at byte 0).
///
/// Frame format:
/// byte[0] = report ID
/// byte[1] = command (0x04)
/// byte[6] = battery percentage, raw
/// byte[7] = charging flag, any nonzero value means charging
pub fn parse_status_payload(frame: &[u8]) -> Option<(u8, bool)> {
    if frame.len() <= CHARGING_OFFSET {
        return None;
    }

    let percentage = frame[BATTERY_OFFSET];
    if percentage > 100 {
        return None;
    }

    Some((percentage, frame[CHARGING_OFFSET] != 0x00))
}

/// Request checksum shared by the whole command family: `0x55 - sum(body)`.
pub fn checksum(body: &[u8]) -> u8 {
    let sum = body.iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
    0x55u8.wrapping_sub(sum)
}

/// When a 16-byte frame arrives without its report ID, which ID to put back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameFixup {
    pub report_id: u8,
    /// If set, only frames whose first byte is one of these commands are re-prefixed.
    pub leading_commands: Option<&'static [u8]>,
}

/// Re-prepends a missing report ID. Anything that is not a 16-byte frame (or
/// fails the leading-command check) passes through untouched.
pub fn normalize_frame(frame: Vec<u8>, fixup: &FrameFixup) -> Vec<u8> {
    if frame.len() != REPORT_LEN - 1 {
        return frame;
    }

    if let Some(commands) = fixup.leading_commands {
        if !commands.contains(&frame[0]) {
            return frame;
        }
    }

    let mut fixed = Vec::with_capacity(REPORT_LEN);
    fixed.push(fixup.report_id);
    fixed.extend_from_slice(&frame);
    fixed
}

/// Why a normalized frame was not taken as the awaited response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameVerdict {
    Accepted,
    TooShort,
    ForeignReport(u8),
    OtherCommand(u8),
}

pub fn classify_frame(frame: &[u8], report_ids: &[u8], expected_cmd: u8) -> FrameVerdict {
    if frame.len() < MIN_FRAME_LEN {
        return FrameVerdict::TooShort;
    }
    if !report_ids.contains(&frame[0]) {
        return FrameVerdict::ForeignReport(frame[0]);
    }
    if frame[1] != expected_cmd {
        return FrameVerdict::OtherCommand(frame[1]);
    }
    FrameVerdict::Accepted
}
