//! # I/O Board Firmware Core
//!
//! Firmware logic for a small acquisition board: 4 analog channels, 4 digital
//! inputs and 4 digital outputs behind a single serial transport that carries
//! both a continuous telemetry stream and a framed request/response command
//! protocol.
//!
//! ## Features
//!
//! - **Byte-level command protocol**: `55 AA` framed requests with XOR
//!   integrity byte, `55 AB` framed responses
//! - **Telemetry streaming**: fixed 20-byte frames at the shorter of the two
//!   configured sample periods
//! - **Cooperative scheduling**: one non-blocking pass per `poll()` call,
//!   no interrupts, no hidden tasks
//! - **Embedded-friendly**: no heap allocations in the firmware path, bounded
//!   buffers throughout
//!
//! ## Quick start
//!
//! ```rust
//! use iobus::BusAgent;
//! use iobus::sim::{LoopbackTransport, ManualClock, SimPins};
//!
//! let mut agent = BusAgent::new(SimPins::new(), ManualClock::new(), LoopbackTransport::new());
//! // Feed a "get info" request and run one scheduler pass.
//! agent.transport_mut().push_command(0x07, &[]);
//! agent.poll();
//! assert!(!agent.transport_mut().take_tx().is_empty());
//! ```
//!
//! ## Architecture
//!
//! - [`agent`] - cooperative poll loop and public entry point
//! - [`receiver`] - inbound byte-stream state machine
//! - [`dispatch`] - command execution against shared state
//! - [`protocol`] - wire layouts, encoders and host-side decoders
//! - [`sampler`] - digital/analog snapshot refresh
//! - [`hal`] - traits the firmware consumes (pins, clock, transport)
//! - [`sim`] - host-side implementations of the HAL traits

#![deny(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]

pub mod agent;
pub mod checksum;
pub mod dispatch;
pub mod hal;
pub mod protocol;
pub mod receiver;
pub mod sampler;
pub mod sim;
pub mod state;

// Re-export main public types for convenience
pub use agent::{AgentStats, BusAgent};
pub use protocol::{ProtocolError, Response, TelemetryReading};
pub use state::BusState;
