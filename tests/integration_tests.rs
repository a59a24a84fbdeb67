//! End-to-end behavior across sampling, dispatch and telemetry.

use iobus::protocol::*;
use iobus::sim::{LoopbackTransport, ManualClock, SimPins};
use iobus::BusAgent;

type Agent = BusAgent<SimPins, ManualClock, LoopbackTransport>;

fn agent() -> Agent {
    BusAgent::new(SimPins::new(), ManualClock::new(), LoopbackTransport::new())
}

fn snapshot_reading(agent: &mut Agent) -> TelemetryReading {
    agent.transport_mut().push_command(CMD_SNAPSHOT, &[]);
    agent.poll();
    let tx = agent.transport_mut().take_tx();
    let (response, consumed) = Response::scan(&tx).unwrap();
    assert_eq!(response.status, STATUS_OK);
    assert!(response.payload.is_empty());
    TelemetryReading::from_frame(&tx[consumed..]).unwrap()
}

#[test]
fn test_initial_sample_taken_at_startup() {
    let mut pins = SimPins::new();
    pins.set_input(1, true);
    pins.set_analog(2, 900);

    let mut agent = BusAgent::new(pins, ManualClock::new(), LoopbackTransport::new());
    // Without any poll or elapsed time, the startup sample is visible.
    assert_eq!(agent.state().input_snapshot, 0b0010);
    assert_eq!(agent.state().analog_snapshot[2], 900);
    assert_eq!(agent.state().analog_snapshot[6], 450);

    let reading = snapshot_reading(&mut agent);
    assert_eq!(reading.inputs, 0b0010);
    assert_eq!(reading.analog[2], 900);
}

#[test]
fn test_derived_analog_invariant_after_refresh() {
    let mut agent = agent();

    for (channel, raw) in [1023u16, 777, 13, 1].into_iter().enumerate() {
        agent.pins_mut().set_analog(channel, raw);
    }
    agent.clock_mut().advance(50);
    agent.poll();

    let reading = snapshot_reading(&mut agent);
    for i in 0..4 {
        assert_eq!(reading.analog[i + 4], reading.analog[i] / 2);
    }
    assert_eq!(reading.analog[..4], [1023, 777, 13, 1]);
}

#[test]
fn test_every_valid_output_mask_round_trips_to_telemetry() {
    let mut agent = agent();

    for mask in 0u8..16 {
        agent.transport_mut().push_command(CMD_SET_OUTPUTS, &[mask]);
        agent.poll();
        let tx = agent.transport_mut().take_tx();
        let (response, _) = Response::scan(&tx).unwrap();
        assert_eq!(response.payload, vec![mask]);

        let reading = snapshot_reading(&mut agent);
        assert_eq!(reading.outputs, mask);
    }
}

#[test]
fn test_high_level_is_active_in_input_snapshot() {
    let mut agent = agent();
    agent.pins_mut().set_input(0, true);
    agent.pins_mut().set_input(2, true);

    // Command 0x02 resamples on demand, ahead of the input period.
    agent.transport_mut().push_command(CMD_GET_INPUTS, &[]);
    agent.poll();
    let (response, _) = Response::scan(&agent.transport_mut().take_tx()).unwrap();
    assert_eq!(response.payload, vec![0b0101]);

    let reading = snapshot_reading(&mut agent);
    assert_eq!(reading.inputs, 0b0101);
}

#[test]
fn test_period_clamp_observable_only_through_echo() {
    let mut agent = agent();

    for (requested, applied) in [(5u16, 10u16), (10, 10), (3000, 3000), (5000, 5000), (6000, 5000)] {
        agent.transport_mut().push_command(CMD_SET_ANALOG_PERIOD, &requested.to_le_bytes());
        agent.poll();
        let (response, _) = Response::scan(&agent.transport_mut().take_tx()).unwrap();
        // Always STATUS_OK; the clamp shows up only in the echoed value.
        assert_eq!(response.status, STATUS_OK);
        assert_eq!(response.payload, applied.to_le_bytes().to_vec());
    }
}

#[test]
fn test_malformed_traffic_never_wedges_the_agent() {
    let mut agent = agent();

    // A burst of garbage, a bad checksum, an oversized length claim.
    agent.transport_mut().push_bytes(&[0x00, 0x55, 0x13, 0x7A, 0x7B, 0x7C]);
    agent.transport_mut().push_bytes(&[0x55, 0xAA, 0x01, 0x01, 0x0F, 0x00]);
    agent.transport_mut().push_bytes(&[0x55, 0xAA, 0x09, 0xC8]);
    agent.poll();
    agent.transport_mut().take_tx();

    assert_eq!(agent.stats().checksum_rejects, 1);
    assert_eq!(agent.stats().length_rejects, 1);

    // The board still answers a clean request afterwards.
    agent.transport_mut().push_command(CMD_GET_INFO, &[]);
    agent.poll();
    let (response, _) = Response::scan(&agent.transport_mut().take_tx()).unwrap();
    assert_eq!(response.status, STATUS_OK);
    assert_eq!(response.payload, INFO_STRING.to_vec());
}

#[test]
fn test_snapshot_works_while_streaming() {
    let mut agent = agent();

    agent.transport_mut().push_command(CMD_SET_STREAMING, &[1]);
    agent.poll();
    agent.transport_mut().take_tx();

    // Stream a frame and answer a snapshot in the same pass; markers
    // distinguish the envelope from the two frames.
    agent.clock_mut().advance(50);
    agent.transport_mut().push_command(CMD_SNAPSHOT, &[]);
    agent.poll();

    let tx = agent.transport_mut().take_tx();
    let (response, _) = Response::scan(&tx).unwrap();
    assert_eq!(response.status, STATUS_OK);
    let frames = tx.windows(2).filter(|w| *w == [FRAME_START0, FRAME_START1]).count();
    assert_eq!(frames, 2);
    assert_eq!(agent.stats().frames_streamed, 1);
}

#[test]
fn test_stats_track_dispatches() {
    let mut agent = agent();

    agent.transport_mut().push_command(CMD_GET_INFO, &[]);
    agent.transport_mut().push_command(CMD_GET_INPUTS, &[]);
    agent.transport_mut().push_command(0x7E, &[]); // unknown still dispatches
    agent.poll();

    assert_eq!(agent.stats().commands_dispatched, 3);
    assert_eq!(agent.stats().checksum_rejects, 0);
}
