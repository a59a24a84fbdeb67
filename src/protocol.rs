//! Wire layouts for the two serial encodings.
//!
//! The telemetry frame and the command/response envelopes are the byte-level
//! contract of the board and are reproduced here exactly:
//!
//! ```text
//! telemetry: [7A][7B][DIGITAL][AN0_lo][AN0_hi]..[AN7_lo][AN7_hi][7C]   (20 bytes)
//! command:   [55][AA][CMD][LEN][PAYLOAD..][CHK]       CHK = XOR(CMD..PAYLOAD)
//! response:  [55][AB][STATUS][CMD][LEN][PAYLOAD..][CHK] CHK = XOR(STATUS..PAYLOAD)
//! ```
//!
//! `DIGITAL` packs the input snapshot into the high nibble and the output
//! mask into the low nibble; analog words are little-endian. The telemetry
//! frame carries no checksum, only its fixed start/end markers.
//!
//! Encoders run on the firmware side; [`Response`] and [`TelemetryReading`]
//! are the host-side views used by the CLI and the test suites.

use arrayvec::ArrayVec;
use serde::Serialize;
use static_assertions::const_assert;
use thiserror::Error;

use crate::checksum::xor_fold;
use crate::state::{BusState, ANALOG_SNAPSHOT_LEN};

pub const FRAME_START0: u8 = 0x7A;
pub const FRAME_START1: u8 = 0x7B;
pub const FRAME_END: u8 = 0x7C;
/// 2 start markers + DIGITAL + 8 little-endian words + end marker.
pub const TELEMETRY_FRAME_LEN: usize = 3 + 2 * ANALOG_SNAPSHOT_LEN + 1;

pub const SYNC: u8 = 0x55;
pub const SYNC_COMMAND: u8 = 0xAA;
pub const SYNC_RESPONSE: u8 = 0xAB;

/// Capacity of the receive payload buffer; declared lengths above this are
/// rejected before any payload byte is consumed.
pub const MAX_PAYLOAD: usize = 64;
pub const COMMAND_MAX_LEN: usize = 4 + MAX_PAYLOAD + 1;
pub const RESPONSE_MAX_LEN: usize = 5 + MAX_PAYLOAD + 1;

const_assert!(TELEMETRY_FRAME_LEN == 20);
const_assert!(MAX_PAYLOAD <= u8::MAX as usize);

pub const STATUS_OK: u8 = 0x00;
pub const STATUS_BAD_CHECKSUM: u8 = 0x01;
pub const STATUS_BAD_PARAM: u8 = 0x02;
pub const STATUS_UNKNOWN_CMD: u8 = 0x03;

pub const CMD_SET_OUTPUTS: u8 = 0x01;
pub const CMD_GET_INPUTS: u8 = 0x02;
pub const CMD_SET_INPUT_PERIOD: u8 = 0x03;
pub const CMD_GET_INPUT_PERIOD: u8 = 0x04;
pub const CMD_SET_STREAMING: u8 = 0x05;
pub const CMD_SNAPSHOT: u8 = 0x06;
pub const CMD_GET_INFO: u8 = 0x07;
pub const CMD_SET_ANALOG_PERIOD: u8 = 0x08;
pub const CMD_GET_ANALOG_PERIOD: u8 = 0x09;

/// Fixed identification string returned by `CMD_GET_INFO`.
pub const INFO_STRING: &[u8] = b"LAB2 v1.0";

pub type ResponseBytes = ArrayVec<u8, RESPONSE_MAX_LEN>;
pub type CommandBytes = ArrayVec<u8, COMMAND_MAX_LEN>;

/// Serialize the 20-byte telemetry frame from the cached snapshots.
#[must_use]
pub fn encode_telemetry(state: &BusState) -> [u8; TELEMETRY_FRAME_LEN] {
    let mut frame = [0u8; TELEMETRY_FRAME_LEN];
    frame[0] = FRAME_START0;
    frame[1] = FRAME_START1;
    frame[2] = (state.input_snapshot & 0x0F) << 4 | (state.output_mask & 0x0F);
    for (i, value) in state.analog_snapshot.iter().enumerate() {
        let [lo, hi] = value.to_le_bytes();
        frame[3 + i * 2] = lo;
        frame[3 + i * 2 + 1] = hi;
    }
    frame[TELEMETRY_FRAME_LEN - 1] = FRAME_END;
    frame
}

/// Build a response envelope. Payloads over [`MAX_PAYLOAD`] are truncated
/// there; `LEN` always equals the number of payload bytes actually written.
#[must_use]
pub fn encode_response(status: u8, cmd: u8, payload: &[u8]) -> ResponseBytes {
    let payload = &payload[..payload.len().min(MAX_PAYLOAD)];
    let mut bytes = ResponseBytes::new();
    bytes.push(SYNC);
    bytes.push(SYNC_RESPONSE);
    bytes.push(status);
    bytes.push(cmd);
    bytes.push(payload.len() as u8);
    // Cannot overflow: payload was clamped to MAX_PAYLOAD above.
    bytes.try_extend_from_slice(payload).ok();
    let chk = xor_fold(&bytes[2..]);
    bytes.push(chk);
    bytes
}

/// Build a command envelope (host side of the protocol). Payloads over
/// [`MAX_PAYLOAD`] are truncated there, as in [`encode_response`].
#[must_use]
pub fn encode_command(cmd: u8, payload: &[u8]) -> CommandBytes {
    let payload = &payload[..payload.len().min(MAX_PAYLOAD)];
    let mut bytes = CommandBytes::new();
    bytes.push(SYNC);
    bytes.push(SYNC_COMMAND);
    bytes.push(cmd);
    bytes.push(payload.len() as u8);
    // Cannot overflow: payload was clamped to MAX_PAYLOAD above.
    bytes.try_extend_from_slice(payload).ok();
    let chk = xor_fold(&bytes[2..]);
    bytes.push(chk);
    bytes
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("no envelope sync sequence in buffer")]
    MissingSync,
    #[error("envelope or frame truncated")]
    Truncated,
    #[error("checksum mismatch (expected {expected:#04x}, got {actual:#04x})")]
    ChecksumMismatch { expected: u8, actual: u8 },
    #[error("telemetry frame markers invalid")]
    BadFrameMarker,
}

/// A decoded response envelope, host-side view.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Response {
    pub status: u8,
    pub cmd: u8,
    pub payload: Vec<u8>,
}

impl Response {
    /// Decode the first response envelope found in `bytes`.
    ///
    /// Returns the response and the index one past its last byte, so a
    /// caller draining a stream can resume scanning from there.
    pub fn scan(bytes: &[u8]) -> Result<(Self, usize), ProtocolError> {
        let start = bytes
            .windows(2)
            .position(|w| w == [SYNC, SYNC_RESPONSE])
            .ok_or(ProtocolError::MissingSync)?;
        let body = &bytes[start..];
        if body.len() < 6 {
            return Err(ProtocolError::Truncated);
        }
        let len = body[4] as usize;
        let total = 5 + len + 1;
        if body.len() < total {
            return Err(ProtocolError::Truncated);
        }
        let expected = xor_fold(&body[2..5 + len]);
        let actual = body[total - 1];
        if expected != actual {
            return Err(ProtocolError::ChecksumMismatch { expected, actual });
        }
        let response = Self {
            status: body[2],
            cmd: body[3],
            payload: body[5..5 + len].to_vec(),
        };
        Ok((response, start + total))
    }
}

/// A decoded telemetry frame, host-side view.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct TelemetryReading {
    /// Input snapshot, low 4 bits.
    pub inputs: u8,
    /// Output mask, low 4 bits.
    pub outputs: u8,
    /// Channels 0..=3 raw, 4..=7 derived (raw / 2).
    pub analog: [u16; ANALOG_SNAPSHOT_LEN],
}

impl TelemetryReading {
    pub fn from_frame(frame: &[u8]) -> Result<Self, ProtocolError> {
        if frame.len() < TELEMETRY_FRAME_LEN {
            return Err(ProtocolError::Truncated);
        }
        if frame[0] != FRAME_START0 || frame[1] != FRAME_START1 || frame[TELEMETRY_FRAME_LEN - 1] != FRAME_END {
            return Err(ProtocolError::BadFrameMarker);
        }
        let mut analog = [0u16; ANALOG_SNAPSHOT_LEN];
        for (i, value) in analog.iter_mut().enumerate() {
            *value = u16::from_le_bytes([frame[3 + i * 2], frame[3 + i * 2 + 1]]);
        }
        Ok(Self {
            inputs: frame[2] >> 4,
            outputs: frame[2] & 0x0F,
            analog,
        })
    }
}
