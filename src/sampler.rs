//! Snapshot refresh for the two channel groups.
//!
//! Both operations read the physical pins through the [`IoPins`] seam and
//! update the cached snapshots in [`BusState`]; the frame encoder and the
//! dispatcher only ever look at the cache.

use crate::hal::{IoPins, CHANNEL_COUNT};
use crate::state::BusState;

/// Sample the four digital inputs into the cached snapshot.
///
/// Bit i is set when input i reads HIGH. The inputs are wired with
/// pull-ups so that an actuated switch reads HIGH; HIGH is the active
/// level here, deliberately, not the inverted convention.
pub fn sample_inputs<P: IoPins>(pins: &mut P, state: &mut BusState) -> u8 {
    let mut mask = 0u8;
    for channel in 0..CHANNEL_COUNT {
        if pins.read_input(channel) {
            mask |= 1 << channel;
        }
    }
    state.input_snapshot = mask;
    mask
}

/// Sample the four analog channels and recompute the four derived values.
///
/// Raw samples land at indices 0..=3; index i+4 holds `raw / 2` (integer
/// division), so `analog_snapshot[i + 4] == analog_snapshot[i] / 2` holds
/// after every refresh.
pub fn sample_analog<P: IoPins>(pins: &mut P, state: &mut BusState) {
    for channel in 0..CHANNEL_COUNT {
        let raw = pins.read_analog(channel);
        state.analog_snapshot[channel] = raw;
        state.analog_snapshot[channel + CHANNEL_COUNT] = raw / 2;
    }
}

/// Drive the four digital outputs from a 4-bit mask and record it.
pub fn apply_output_mask<P: IoPins>(pins: &mut P, state: &mut BusState, mask: u8) -> u8 {
    let mask = mask & 0x0F;
    for channel in 0..CHANNEL_COUNT {
        pins.write_output(channel, mask & (1 << channel) != 0);
    }
    state.output_mask = mask;
    mask
}
