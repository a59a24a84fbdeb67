//! Command execution.
//!
//! The dispatcher receives commands that already passed the envelope
//! checksum; its own validation is limited to the per-command payload
//! length. Every path writes exactly one response envelope; the snapshot
//! command additionally sends one telemetry frame as a separate write.

use crate::hal::{IoPins, Transport};
use crate::protocol::{
    encode_response, encode_telemetry, CMD_GET_ANALOG_PERIOD, CMD_GET_INFO, CMD_GET_INPUTS,
    CMD_GET_INPUT_PERIOD, CMD_SET_ANALOG_PERIOD, CMD_SET_INPUT_PERIOD, CMD_SET_OUTPUTS,
    CMD_SET_STREAMING, CMD_SNAPSHOT, STATUS_BAD_PARAM, STATUS_OK, STATUS_UNKNOWN_CMD,
};
use crate::sampler::{apply_output_mask, sample_inputs};
use crate::state::{clamp_period, BusState};

/// Execute a checksum-validated command and write its response.
pub fn dispatch<P: IoPins, T: Transport>(
    cmd: u8,
    payload: &[u8],
    state: &mut BusState,
    pins: &mut P,
    transport: &mut T,
) {
    match cmd {
        CMD_SET_OUTPUTS => {
            if payload.len() != 1 {
                return respond_bad_param(cmd, transport);
            }
            let applied = apply_output_mask(pins, state, payload[0]);
            transport.send_bytes(&encode_response(STATUS_OK, cmd, &[applied]));
        }

        CMD_GET_INPUTS => {
            if !payload.is_empty() {
                return respond_bad_param(cmd, transport);
            }
            // On-demand resample, bypassing the input period.
            let mask = sample_inputs(pins, state);
            transport.send_bytes(&encode_response(STATUS_OK, cmd, &[mask]));
        }

        CMD_SET_INPUT_PERIOD => {
            if payload.len() != 2 {
                return respond_bad_param(cmd, transport);
            }
            let applied = clamp_period(u16::from_le_bytes([payload[0], payload[1]]));
            state.input_period_ms = applied;
            transport.send_bytes(&encode_response(STATUS_OK, cmd, &applied.to_le_bytes()));
        }

        CMD_GET_INPUT_PERIOD => {
            if !payload.is_empty() {
                return respond_bad_param(cmd, transport);
            }
            transport.send_bytes(&encode_response(STATUS_OK, cmd, &state.input_period_ms.to_le_bytes()));
        }

        CMD_SET_STREAMING => {
            if payload.len() != 1 {
                return respond_bad_param(cmd, transport);
            }
            state.streaming = payload[0] != 0;
            transport.send_bytes(&encode_response(STATUS_OK, cmd, &[u8::from(state.streaming)]));
        }

        CMD_SNAPSHOT => {
            if !payload.is_empty() {
                return respond_bad_param(cmd, transport);
            }
            // OK envelope first, then one telemetry frame as its own write.
            transport.send_bytes(&encode_response(STATUS_OK, cmd, &[]));
            transport.send_bytes(&encode_telemetry(state));
        }

        CMD_GET_INFO => {
            if !payload.is_empty() {
                return respond_bad_param(cmd, transport);
            }
            transport.send_bytes(&encode_response(STATUS_OK, cmd, crate::protocol::INFO_STRING));
        }

        CMD_SET_ANALOG_PERIOD => {
            if payload.len() != 2 {
                return respond_bad_param(cmd, transport);
            }
            let applied = clamp_period(u16::from_le_bytes([payload[0], payload[1]]));
            state.analog_period_ms = applied;
            transport.send_bytes(&encode_response(STATUS_OK, cmd, &applied.to_le_bytes()));
        }

        CMD_GET_ANALOG_PERIOD => {
            if !payload.is_empty() {
                return respond_bad_param(cmd, transport);
            }
            transport.send_bytes(&encode_response(STATUS_OK, cmd, &state.analog_period_ms.to_le_bytes()));
        }

        _ => {
            transport.send_bytes(&encode_response(STATUS_UNKNOWN_CMD, cmd, &[]));
        }
    }
}

fn respond_bad_param<T: Transport>(cmd: u8, transport: &mut T) {
    transport.send_bytes(&encode_response(STATUS_BAD_PARAM, cmd, &[]));
}
