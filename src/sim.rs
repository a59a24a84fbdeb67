//! Host-side implementations of the HAL traits.
//!
//! These back the integration tests and the TCP simulator binary. They
//! live in the library proper (not behind `cfg(test)`) so both can share
//! them.

use std::time::Instant;

use heapless::Deque;

use crate::hal::{Clock, IoPins, Transport, CHANNEL_COUNT};
use crate::protocol::encode_command;

const SIM_RX_CAPACITY: usize = 256;

/// Settable pin bank: switch levels and converter readings are plain
/// fields, driven outputs are captured for inspection.
#[derive(Debug, Default)]
pub struct SimPins {
    inputs: [bool; CHANNEL_COUNT],
    analog: [u16; CHANNEL_COUNT],
    outputs: [bool; CHANNEL_COUNT],
}

impl SimPins {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_input(&mut self, channel: usize, level: bool) {
        self.inputs[channel] = level;
    }

    pub fn set_analog(&mut self, channel: usize, raw: u16) {
        self.analog[channel] = raw;
    }

    #[must_use]
    pub fn outputs(&self) -> [bool; CHANNEL_COUNT] {
        self.outputs
    }
}

impl IoPins for SimPins {
    fn read_input(&mut self, channel: usize) -> bool {
        self.inputs[channel]
    }

    fn read_analog(&mut self, channel: usize) -> u16 {
        self.analog[channel]
    }

    fn write_output(&mut self, channel: usize, level: bool) {
        self.outputs[channel] = level;
    }
}

/// Test clock advanced by hand, so scheduling decisions are deterministic.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ms: u32,
}

impl ManualClock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start near the top of the u32 range to exercise rollover paths.
    #[must_use]
    pub fn starting_at(now_ms: u32) -> Self {
        Self { now_ms }
    }

    pub fn advance(&mut self, ms: u32) {
        self.now_ms = self.now_ms.wrapping_add(ms);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u32 {
        self.now_ms
    }
}

/// Real-time clock for the simulator binary.
#[derive(Debug)]
pub struct WallClock {
    start: Instant,
}

impl WallClock {
    #[must_use]
    pub fn new() -> Self {
        Self { start: Instant::now() }
    }
}

impl Default for WallClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for WallClock {
    fn now_ms(&self) -> u32 {
        self.start.elapsed().as_millis() as u32
    }
}

/// In-memory transport: inbound bytes are scripted, outbound bytes are
/// captured for assertion.
#[derive(Debug, Default)]
pub struct LoopbackTransport {
    rx: Deque<u8, SIM_RX_CAPACITY>,
    tx: Vec<u8>,
}

impl LoopbackTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Script raw inbound bytes. Bytes over capacity are dropped, which
    /// doubles as a cheap way to simulate a lossy wire in tests.
    pub fn push_bytes(&mut self, bytes: &[u8]) {
        for &b in bytes {
            let _ = self.rx.push_back(b);
        }
    }

    /// Script a well-formed command envelope for `cmd` with `payload`.
    pub fn push_command(&mut self, cmd: u8, payload: &[u8]) {
        self.push_bytes(&encode_command(cmd, payload));
    }

    /// Drain and return everything the firmware has written so far.
    pub fn take_tx(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.tx)
    }
}

impl Transport for LoopbackTransport {
    fn recv_available(&mut self) -> bool {
        !self.rx.is_empty()
    }

    fn recv_byte(&mut self) -> Option<u8> {
        self.rx.pop_front()
    }

    fn send_bytes(&mut self, bytes: &[u8]) {
        self.tx.extend_from_slice(bytes);
    }
}
