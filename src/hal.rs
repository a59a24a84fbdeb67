//! Traits the firmware core consumes.
//!
//! Physical I/O, the millisecond clock and the serial transport are external
//! collaborators. The core only ever sees these three seams; everything in
//! [`crate::sim`] implements them for host-side use.

/// Number of digital inputs, digital outputs and analog channels.
pub const CHANNEL_COUNT: usize = 4;

/// Physical pin access for the four channel groups.
///
/// Channel indices are always `0..CHANNEL_COUNT`. Reads are assumed to
/// succeed; a transducer that is momentarily unavailable should return its
/// last valid level rather than fail.
pub trait IoPins {
    /// Logic level of digital input `channel`. The board wires its inputs
    /// with pull-ups so an actuated switch reads HIGH; HIGH is "active".
    fn read_input(&mut self, channel: usize) -> bool;

    /// Raw converter sample of analog input `channel` (e.g. 0..=1023 for a
    /// 10-bit converter).
    fn read_analog(&mut self, channel: usize) -> u16;

    /// Drive digital output `channel` to `level`.
    fn write_output(&mut self, channel: usize, level: bool);
}

/// Monotonic millisecond clock.
///
/// Only elapsed-time comparisons are made against it, always through
/// wrapping subtraction, so rollover of the u32 counter is harmless.
pub trait Clock {
    fn now_ms(&self) -> u32;
}

/// Byte-oriented serial transport.
///
/// All three operations must complete in bounded time; the core never
/// blocks waiting for a byte to arrive or drain.
pub trait Transport {
    /// True when at least one inbound byte can be read without blocking.
    fn recv_available(&mut self) -> bool;

    /// Take one inbound byte, or `None` when nothing is buffered.
    fn recv_byte(&mut self) -> Option<u8>;

    /// Queue `bytes` for transmission. One call is one atomic unit of
    /// output: a whole frame or a whole envelope, never a partial one.
    fn send_bytes(&mut self, bytes: &[u8]);
}
