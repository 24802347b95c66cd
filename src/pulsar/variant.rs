//! Per-family protocol tables.
//!
//! Each mouse family is described as data: IDs, packets, framing quirks and
//! timing. [`super::device::VariantDriver`] runs any of them.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::hid::ReportTransport;
use crate::pulsar::battery::{
    checksum, FrameFixup, CMD_IDENTIFY, CMD_MODE, CMD_PING, CMD_PROBE, CMD_STATUS,
    OUTPUT_REPORT_ID,
};

/// Status request: report 0x08, command 0x04, checksum 0x49.
pub const STATUS_REQUEST: [u8; 17] = [
    OUTPUT_REPORT_ID, CMD_STATUS, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x49,
];

/// Keepalive: command 0x03, checksum 0x4A.
pub const PING_PACKET: [u8; 17] = [
    OUTPUT_REPORT_ID, CMD_PING, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x4A,
];

pub const CRAZYLIGHT_IDENTIFY_A: [u8; 17] = [
    OUTPUT_REPORT_ID, CMD_IDENTIFY, 0x00, 0x00, 0x00, 0x08, 0x8E, 0x0C, 0x4D, 0x4C, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x11,
];

pub const CRAZYLIGHT_IDENTIFY_B: [u8; 17] = [
    OUTPUT_REPORT_ID, CMD_IDENTIFY, 0x00, 0x00, 0x00, 0x08, 0x95, 0x05, 0xDD, 0x4B, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x82,
];

pub const CRAZYLIGHT_MODE: [u8; 17] = [
    OUTPUT_REPORT_ID, CMD_MODE, 0x00, 0x00, 0x00, 0x01, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x49,
];

pub const V1_PROBE: [u8; 17] = [
    OUTPUT_REPORT_ID, CMD_PROBE, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x3F,
];

pub const CRAZYLIGHT_VENDOR_ID: u16 = 0x3710;
pub const CRAZYLIGHT_PID_WIRELESS: u16 = 0x5406;
pub const CRAZYLIGHT_PID_WIRED: u16 = 0x3414;
pub const CRAZYLIGHT_REPORT_ID: u8 = 0x08;

pub const V1_VENDOR_ID: u16 = 0x25A7;
pub const V1_PID_WIRELESS: u16 = 0xFA7C;
pub const V1_PID_WIRED: u16 = 0xFA7B;
pub const V1_DEFAULT_INPUT_REPORT_ID: u8 = 0x09;

/// Commands a headerless V1 frame may legitimately start with.
const V1_LEADING_COMMANDS: &[u8] = &[0x01, 0x02, 0x03, 0x04, 0x08, 0x0E];

/// How request and response interfaces relate on a family's hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pairing {
    /// The opened interface both takes requests and delivers responses.
    SingleHandle,
    /// Responses may show up on any enumerated interface of the same mouse.
    CrossInterface,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    pub fast_deadline: Duration,
    pub slow_deadline: Duration,
    /// Upper bound for a single read inside the response loop.
    pub read_slice: Duration,
    pub wake_gap: Duration,
    /// Pause between sending a request and starting to read.
    pub settle_after_request: Duration,
    /// Pause after a read that returned nothing.
    pub idle_backoff: Duration,
}

#[derive(Debug, Clone)]
pub struct Variant {
    pub model: &'static str,
    pub vendor_id: u16,
    pub product_ids: &'static [u16],
    pub request: &'static [u8],
    pub expected_cmd: u8,
    pub response_report_ids: &'static [u8],
    pub fixup: FrameFixup,
    pub wake_sequence: fn() -> Vec<Vec<u8>>,
    pub write_transport: ReportTransport,
    pub pairing: Pairing,
    /// Send the status request again after the wake sequence before reading.
    pub resend_after_wake: bool,
    pub timing: Timing,
}

impl Variant {
    pub fn matches_product(&self, product_id: u16) -> bool {
        self.product_ids.contains(&product_id)
    }
}

/// X2 Crazylight family: one shared handle, output reports only.
pub fn crazylight() -> Variant {
    Variant {
        model: "X2 Crazylight",
        vendor_id: CRAZYLIGHT_VENDOR_ID,
        product_ids: &[CRAZYLIGHT_PID_WIRELESS, CRAZYLIGHT_PID_WIRED],
        request: &STATUS_REQUEST,
        expected_cmd: CMD_STATUS,
        response_report_ids: &[CRAZYLIGHT_REPORT_ID],
        fixup: FrameFixup {
            report_id: CRAZYLIGHT_REPORT_ID,
            leading_commands: None,
        },
        wake_sequence: crazylight_wake_sequence,
        write_transport: ReportTransport::Output,
        pairing: Pairing::SingleHandle,
        resend_after_wake: false,
        timing: Timing {
            fast_deadline: Duration::from_millis(800),
            slow_deadline: Duration::from_millis(2000),
            read_slice: Duration::from_millis(250),
            wake_gap: Duration::from_millis(10),
            settle_after_request: Duration::ZERO,
            idle_backoff: Duration::ZERO,
        },
    }
}

/// X2 V1 family: split interfaces, inconsistent response report IDs.
pub fn v1() -> Variant {
    Variant {
        model: "X2 V1",
        vendor_id: V1_VENDOR_ID,
        product_ids: &[V1_PID_WIRELESS, V1_PID_WIRED],
        request: &STATUS_REQUEST,
        expected_cmd: CMD_STATUS,
        response_report_ids: &[OUTPUT_REPORT_ID, V1_DEFAULT_INPUT_REPORT_ID],
        fixup: FrameFixup {
            report_id: V1_DEFAULT_INPUT_REPORT_ID,
            leading_commands: Some(V1_LEADING_COMMANDS),
        },
        wake_sequence: v1_wake_sequence,
        write_transport: ReportTransport::Auto,
        pairing: Pairing::CrossInterface,
        resend_after_wake: true,
        timing: Timing {
            fast_deadline: Duration::from_millis(800),
            slow_deadline: Duration::from_millis(1200),
            read_slice: Duration::from_millis(250),
            wake_gap: Duration::from_millis(10),
            settle_after_request: Duration::from_millis(20),
            idle_backoff: Duration::from_millis(10),
        },
    }
}

/// Every known family, in the order the backend tries them.
pub fn all() -> Vec<Variant> {
    vec![crazylight(), v1()]
}

fn crazylight_wake_sequence() -> Vec<Vec<u8>> {
    let a: &[u8] = &CRAZYLIGHT_IDENTIFY_A;
    let b: &[u8] = &CRAZYLIGHT_IDENTIFY_B;
    let ping: &[u8] = &PING_PACKET;
    let mode: &[u8] = &CRAZYLIGHT_MODE;
    let status: &[u8] = &STATUS_REQUEST;

    [
        a, ping, ping, ping, a, ping, ping, a, ping, b, ping, ping, ping, mode, ping, ping,
        status, status,
    ]
    .iter()
    .map(|p| p.to_vec())
    .collect()
}

fn v1_wake_sequence() -> Vec<Vec<u8>> {
    vec![
        v1_identify_packet(session_nonce()),
        PING_PACKET.to_vec(),
        V1_PROBE.to_vec(),
    ]
}

/// Low 32 bits of the wall clock in 100 ns units. Only has to differ from the
/// previous session's value; it is not a secret.
fn session_nonce() -> u32 {
    let ticks = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() / 100)
        .unwrap_or_default();
    (ticks & 0xFFFF_FFFF) as u32
}

/// 16-byte V1 identify packet: nonce little-endian at 6..10, checksum at 15.
pub fn v1_identify_packet(nonce: u32) -> Vec<u8> {
    let mut packet = vec![0u8; 16];
    packet[0] = OUTPUT_REPORT_ID;
    packet[1] = CMD_IDENTIFY;
    packet[5] = 0x08;
    packet[6..10].copy_from_slice(&nonce.to_le_bytes());
    packet[15] = checksum(&packet[..15]);
    packet
}
