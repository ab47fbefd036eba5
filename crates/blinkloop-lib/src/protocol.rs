//! Protocol constants and report builders for blink(1) devices.
//!
//! Every command is a single 9-byte HID feature report. Byte 0 is the report
//! id, byte 1 an ASCII command letter, the rest command-specific.
//!
//! ## Revisions
//!
//! - mk1 serials are `<= 0x1FFFFFFF`: one LED, no pattern end/count, no
//!   server-tickle "maintain" flag.
//! - mk2 serials are `>= 0x20000000`: two independently addressable LEDs
//!   (selector 1 and 2, 0 = all) and the wider `play`/`D` fields.

// ── USB identity ──

pub const BLINK1_VID: u16 = 0x27B8;
pub const BLINK1_PID: u16 = 0x01ED;

// ── Report framing ──

/// Feature report id used by every command.
pub const REPORT_ID: u8 = 1;

/// Length of a feature report, report id included.
pub const REPORT_LEN: usize = 9;

pub type Report = [u8; REPORT_LEN];

// ── Command letters ──

pub const CMD_SET_RGB: u8 = b'n';
pub const CMD_FADE_RGB: u8 = b'c';
pub const CMD_PLAY: u8 = b'p';
pub const CMD_SERVER_TICKLE: u8 = b'D';
pub const CMD_WRITE_PATTERN: u8 = b'P';

// ── LED selectors ──

/// Address every LED at once.
pub const LED_ALL: u8 = 0;
/// Top LED on mk2.
pub const LED_1: u8 = 1;
/// Bottom LED on mk2.
pub const LED_2: u8 = 2;

/// Convert milliseconds to the device's centisecond tick, split big-endian.
///
/// Saturates at `u16::MAX` ticks (~655 s).
pub fn fade_ticks(ms: u32) -> (u8, u8) {
    let ticks = (ms / 10).min(u16::MAX as u32) as u16;
    let [hi, lo] = ticks.to_be_bytes();
    (hi, lo)
}

/// `n`: set color immediately.
pub fn set_rgb(r: u8, g: u8, b: u8) -> Report {
    [REPORT_ID, CMD_SET_RGB, r, g, b, 0, 0, 0, 0]
}

/// `c`: fade to color over `fade_ms` on the given LED selector.
pub fn fade_rgb(fade_ms: u32, r: u8, g: u8, b: u8, led: u8) -> Report {
    let (hi, lo) = fade_ticks(fade_ms);
    [REPORT_ID, CMD_FADE_RGB, r, g, b, hi, lo, led, 0]
}

/// `p`: start or stop playback of the on-device pattern.
pub fn play(on: u8, start: u8, end: u8, count: u8) -> Report {
    [REPORT_ID, CMD_PLAY, on, start, end, count, 0, 0, 0]
}

/// `D`: server tickle. Plays the stored pattern if not tickled within `timeout_ms`.
pub fn server_tickle(on: u8, timeout_ms: u32, maintain: u8, start: u8, end: u8) -> Report {
    let (hi, lo) = fade_ticks(timeout_ms);
    [REPORT_ID, CMD_SERVER_TICKLE, on, hi, lo, maintain, start, end, 0]
}

/// `P`: write one step of the on-device pattern, gamma-corrected.
pub fn write_pattern_step(fade_ms: u32, r: u8, g: u8, b: u8, position: u8) -> Report {
    let (hi, lo) = fade_ticks(fade_ms);
    [
        REPORT_ID,
        CMD_WRITE_PATTERN,
        gamma(r),
        gamma(g),
        gamma(b),
        hi,
        lo,
        position,
        0,
    ]
}

/// Gamma-correct a channel value for the WS2812 LEDs.
pub fn gamma(v: u8) -> u8 {
    GAMMA_E[v as usize]
}

/// `255 * (v / 255) ^ (1 / 0.45)`, precomputed.
const GAMMA_E: [u8; 256] = [
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 1, 1, 1, 2, 2, 2,
    2, 2, 2, 3, 3, 3, 3, 3, 4, 4, 4, 4, 5, 5, 5, 5, 6, 6, 6, 7, 7, 7, 8, 8, 8, 9, 9, 9, 10, 10, 11,
    11, 11, 12, 12, 13, 13, 13, 14, 14, 15, 15, 16, 16, 17, 17, 18, 18, 19, 19, 20, 21, 21, 22, 22,
    23, 23, 24, 25, 25, 26, 27, 27, 28, 29, 29, 30, 31, 31, 32, 33, 34, 34, 35, 36, 37, 37, 38, 39,
    40, 40, 41, 42, 43, 44, 45, 46, 46, 47, 48, 49, 50, 51, 52, 53, 54, 55, 56, 57, 58, 59, 60, 61,
    62, 63, 64, 65, 66, 67, 68, 69, 70, 71, 72, 73, 74, 76, 77, 78, 79, 80, 81, 83, 84, 85, 86, 88,
    89, 90, 91, 93, 94, 95, 96, 98, 99, 100, 102, 103, 104, 106, 107, 109, 110, 111, 113, 114, 116,
    117, 119, 120, 121, 123, 124, 126, 128, 129, 131, 132, 134, 135, 137, 138, 140, 142, 143, 145,
    146, 148, 150, 151, 153, 155, 157, 158, 160, 162, 163, 165, 167, 169, 170, 172, 174, 176, 178,
    179, 181, 183, 185, 187, 189, 191, 193, 194, 196, 198, 200, 202, 204, 206, 208, 210, 212, 214,
    216, 218, 220, 222, 224, 227, 229, 231, 233, 235, 237, 239, 241, 244, 246, 248, 250, 252, 255,
];
