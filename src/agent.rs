//! Cooperative poll loop.
//!
//! [`BusAgent`] owns the whole firmware state and runs one non-blocking
//! pass per [`BusAgent::poll`] call: drain inbound bytes, resample each
//! channel group when its period has elapsed, transmit a telemetry frame
//! when streaming. An outer driver re-enters the loop; there is exactly
//! one logical task and no suspension point inside a pass.

use serde::Serialize;

use crate::hal::{Clock, IoPins, Transport};
use crate::protocol::encode_telemetry;
use crate::receiver::{CommandReceiver, FrameOutcome};
use crate::sampler::{sample_analog, sample_inputs};
use crate::state::BusState;

/// Running counters, exposed for the simulator's logs and for tests.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct AgentStats {
    pub commands_dispatched: u32,
    pub checksum_rejects: u32,
    pub length_rejects: u32,
    pub frames_streamed: u32,
}

pub struct BusAgent<P, C, T> {
    pins: P,
    clock: C,
    transport: T,
    state: BusState,
    receiver: CommandReceiver,
    stats: AgentStats,
    last_input_sample_ms: u32,
    last_analog_sample_ms: u32,
    last_stream_tx_ms: u32,
}

impl<P: IoPins, C: Clock, T: Transport> BusAgent<P, C, T> {
    /// Initialize: outputs all-low, one immediate sample of both channel
    /// groups, timestamps stamped from the clock.
    pub fn new(mut pins: P, clock: C, transport: T) -> Self {
        let mut state = BusState::new();
        for channel in 0..crate::hal::CHANNEL_COUNT {
            pins.write_output(channel, false);
        }
        sample_inputs(&mut pins, &mut state);
        sample_analog(&mut pins, &mut state);
        let now = clock.now_ms();
        Self {
            pins,
            clock,
            transport,
            state,
            receiver: CommandReceiver::new(),
            stats: AgentStats::default(),
            last_input_sample_ms: now,
            last_analog_sample_ms: now,
            last_stream_tx_ms: now,
        }
    }

    /// One scheduler pass. Commands are drained first so a request
    /// received in this pass can affect this pass's sampling and
    /// transmission decisions.
    pub fn poll(&mut self) {
        // 1. Drain everything currently buffered, without waiting.
        while self.transport.recv_available() {
            let Some(byte) = self.transport.recv_byte() else { break };
            match self.receiver.feed(byte, &mut self.state, &mut self.pins, &mut self.transport) {
                Some(FrameOutcome::Dispatched) => self.stats.commands_dispatched += 1,
                Some(FrameOutcome::ChecksumRejected) => self.stats.checksum_rejects += 1,
                Some(FrameOutcome::LengthRejected) => self.stats.length_rejects += 1,
                None => {}
            }
        }

        // One clock read shared by the remaining steps.
        let now = self.clock.now_ms();

        // 2. Digital resample on its own period.
        if elapsed(now, self.last_input_sample_ms) >= u32::from(self.state.input_period_ms) {
            self.last_input_sample_ms = now;
            sample_inputs(&mut self.pins, &mut self.state);
        }

        // 3. Analog resample on its own period.
        if elapsed(now, self.last_analog_sample_ms) >= u32::from(self.state.analog_period_ms) {
            self.last_analog_sample_ms = now;
            sample_analog(&mut self.pins, &mut self.state);
        }

        // 4. Stream one frame at the shorter of the two periods.
        if self.state.streaming
            && elapsed(now, self.last_stream_tx_ms) >= u32::from(self.state.stream_period_ms())
        {
            self.last_stream_tx_ms = now;
            self.transport.send_bytes(&encode_telemetry(&self.state));
            self.stats.frames_streamed += 1;
        }
    }

    #[must_use]
    pub fn state(&self) -> &BusState {
        &self.state
    }

    #[must_use]
    pub fn stats(&self) -> &AgentStats {
        &self.stats
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn pins_mut(&mut self) -> &mut P {
        &mut self.pins
    }

    pub fn clock_mut(&mut self) -> &mut C {
        &mut self.clock
    }
}

/// Milliseconds since `last`, correct across a u32 counter rollover.
fn elapsed(now: u32, last: u32) -> u32 {
    now.wrapping_sub(last)
}
