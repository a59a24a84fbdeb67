//! Shared firmware state.
//!
//! Everything the dispatcher, sampler and frame encoder touch lives in one
//! explicitly owned [`BusState`] value. There is a single logical writer
//! (the agent's poll pass), so no locking discipline applies.

use serde::{Deserialize, Serialize};

/// Lower clamp bound for both sample periods, in milliseconds.
pub const SAMPLE_MIN_MS: u16 = 10;
/// Upper clamp bound for both sample periods, in milliseconds.
pub const SAMPLE_MAX_MS: u16 = 5000;

/// Default digital-input sample period.
pub const DEFAULT_INPUT_PERIOD_MS: u16 = 100;
/// Default analog sample period.
pub const DEFAULT_ANALOG_PERIOD_MS: u16 = 50;

/// Entries in the analog snapshot: 4 sampled channels + 4 derived values.
pub const ANALOG_SNAPSHOT_LEN: usize = 8;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusState {
    /// Bit i = logic level driven on output i. Low nibble only.
    pub output_mask: u8,
    /// Bit i = 1 when input i last sampled HIGH (active). Low nibble only.
    pub input_snapshot: u8,
    /// Indices 0..=3 are raw samples; 4..=7 hold `raw / 2` of the matching
    /// channel, recomputed on every analog refresh.
    pub analog_snapshot: [u16; ANALOG_SNAPSHOT_LEN],
    /// Digital-input sample period, clamped to the wire bounds.
    pub input_period_ms: u16,
    /// Analog sample period, clamped to the wire bounds.
    pub analog_period_ms: u16,
    /// Telemetry frames are transmitted automatically only while set.
    pub streaming: bool,
}

impl BusState {
    #[must_use]
    pub fn new() -> Self {
        Self {
            output_mask: 0,
            input_snapshot: 0,
            analog_snapshot: [0; ANALOG_SNAPSHOT_LEN],
            input_period_ms: DEFAULT_INPUT_PERIOD_MS,
            analog_period_ms: DEFAULT_ANALOG_PERIOD_MS,
            streaming: false,
        }
    }

    /// Period at which telemetry frames go out while streaming.
    #[must_use]
    pub fn stream_period_ms(&self) -> u16 {
        self.input_period_ms.min(self.analog_period_ms)
    }
}

impl Default for BusState {
    fn default() -> Self {
        Self::new()
    }
}

/// Clamp a requested sample period to the accepted range.
///
/// Out-of-range requests are a silent correction, not an error; the caller
/// echoes the applied value so the far side can detect the clamp.
#[must_use]
pub fn clamp_period(requested_ms: u16) -> u16 {
    requested_ms.clamp(SAMPLE_MIN_MS, SAMPLE_MAX_MS)
}
