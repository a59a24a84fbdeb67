//! TCP-hosted board simulator.
//!
//! Serves the firmware loop to TCP clients so the CLI and external tools
//! can exercise the wire protocol without hardware. Each connection gets
//! its own simulated board: synthetic waveforms on the analog channels, a
//! slow walking pattern on the digital inputs.

use std::io::{Read, Write};
use std::time::{Duration, Instant};

use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use iobus::hal::Transport;
use iobus::sim::{SimPins, WallClock};
use iobus::BusAgent;

const TCP_PORT: u16 = 8090;
const POLL_INTERVAL_MS: u64 = 1;
const STATS_LOG_PERIOD: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let port = std::env::args()
        .nth(1)
        .map(|p| p.parse::<u16>())
        .transpose()?
        .unwrap_or(TCP_PORT);

    let listener = TcpListener::bind(("127.0.0.1", port)).await?;
    info!("I/O board simulator listening on port {}", port);

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                info!("client connected: {}", addr);
                let std_stream = stream.into_std()?;
                tokio::task::spawn_blocking(move || {
                    if let Err(e) = serve_board(std_stream) {
                        warn!("client {} error: {}", addr, e);
                    }
                    info!("client disconnected: {}", addr);
                });
            }
            Err(e) => {
                error!("accept failed: {}", e);
            }
        }
    }
}

/// Drive one simulated board for the lifetime of the connection.
fn serve_board(stream: std::net::TcpStream) -> Result<(), Box<dyn std::error::Error>> {
    stream.set_nonblocking(true)?;
    let transport = TcpTransport::new(stream);
    let mut agent = BusAgent::new(SimPins::new(), WallClock::new(), transport);

    let started = Instant::now();
    let mut last_stats_log = started;

    loop {
        animate_pins(&mut agent, started.elapsed());
        agent.poll();

        // Retry any outbound tail the socket refused on an earlier pass.
        let transport = agent.transport_mut();
        transport.flush();
        if transport.is_closed() {
            return Ok(());
        }

        if last_stats_log.elapsed() >= STATS_LOG_PERIOD {
            last_stats_log = Instant::now();
            if let Ok(stats) = serde_json::to_string(agent.stats()) {
                debug!("stats: {}", stats);
            }
        }

        std::thread::sleep(Duration::from_millis(POLL_INTERVAL_MS));
    }
}

/// Synthetic board activity: sine-ish sweeps on the analog channels and a
/// walking bit on the switch bank, slow enough to watch from the CLI.
fn animate_pins(agent: &mut BusAgent<SimPins, WallClock, TcpTransport>, elapsed: Duration) {
    let t = elapsed.as_secs_f32();
    let pins = agent.pins_mut();
    for channel in 0..4 {
        let phase = t * 0.5 + channel as f32 * 0.7;
        let raw = (512.0 + 511.0 * phase.sin()) as u16;
        pins.set_analog(channel, raw.min(1023));
    }
    let active = (elapsed.as_secs() % 4) as usize;
    for channel in 0..4 {
        pins.set_input(channel, channel == active);
    }
}

/// A client that stops reading gets this much backlog before being dropped.
const OUTBOX_LIMIT: usize = 64 * 1024;

/// Non-blocking byte transport over an accepted TCP stream.
///
/// Outbound bytes go through `outbox` so a partial kernel write never
/// tears a frame: whatever the socket refuses stays queued, in order,
/// until [`TcpTransport::flush`] on a later loop pass.
struct TcpTransport {
    stream: std::net::TcpStream,
    pending: Option<u8>,
    outbox: Vec<u8>,
    closed: bool,
}

impl TcpTransport {
    fn new(stream: std::net::TcpStream) -> Self {
        Self { stream, pending: None, outbox: Vec::new(), closed: false }
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    fn fill_pending(&mut self) {
        if self.pending.is_some() || self.closed {
            return;
        }
        let mut buf = [0u8; 1];
        match self.stream.read(&mut buf) {
            Ok(0) => self.closed = true,
            Ok(_) => self.pending = Some(buf[0]),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
            Err(e) => {
                debug!("read error: {}", e);
                self.closed = true;
            }
        }
    }

    /// Push queued outbound bytes into the socket, keeping the unwritten
    /// tail for the next pass when the kernel buffer is full.
    fn flush(&mut self) {
        while !self.outbox.is_empty() && !self.closed {
            match self.stream.write(&self.outbox) {
                Ok(0) => self.closed = true,
                Ok(n) => {
                    self.outbox.drain(..n);
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => return,
                Err(e) => {
                    debug!("write error: {}", e);
                    self.closed = true;
                }
            }
        }
    }
}

impl Transport for TcpTransport {
    fn recv_available(&mut self) -> bool {
        self.fill_pending();
        self.pending.is_some()
    }

    fn recv_byte(&mut self) -> Option<u8> {
        self.fill_pending();
        self.pending.take()
    }

    fn send_bytes(&mut self, bytes: &[u8]) {
        if self.closed {
            return;
        }
        self.outbox.extend_from_slice(bytes);
        self.flush();
        if self.outbox.len() > OUTBOX_LIMIT {
            debug!("client stalled with {} bytes queued, dropping", self.outbox.len());
            self.outbox.clear();
            self.closed = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{TcpListener, TcpStream};

    fn socket_pair() -> (std::net::TcpStream, std::net::TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        (server, client)
    }

    #[test]
    fn test_backpressured_writes_are_queued_not_torn() {
        let (server, mut client) = socket_pair();
        server.set_nonblocking(true).unwrap();
        client.set_nonblocking(true).unwrap();
        let mut transport = TcpTransport::new(server);

        // Flood a non-reading peer until the kernel buffer pushes back
        // and bytes start queuing in the outbox. 0..=255 cycles so byte i
        // of the whole stream must equal i % 256 on arrival.
        let chunk: Vec<u8> = (0u16..4096).map(|i| (i % 256) as u8).collect();
        let mut sent = 0usize;
        while transport.outbox.is_empty() && sent < 16 * 1024 * 1024 {
            transport.send_bytes(&chunk);
            sent += chunk.len();
        }
        assert!(!transport.outbox.is_empty(), "socket never pushed back");
        assert!(!transport.is_closed());

        // Drain the peer while flushing; the queued tail follows the
        // already-written bytes with nothing dropped or reordered.
        let mut received = Vec::new();
        let mut buf = [0u8; 4096];
        while received.len() < sent {
            match client.read(&mut buf) {
                Ok(0) => panic!("peer closed early"),
                Ok(n) => received.extend_from_slice(&buf[..n]),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
                Err(e) => panic!("read failed: {}", e),
            }
            transport.flush();
        }
        assert!(transport.outbox.is_empty());
        for (i, &b) in received.iter().enumerate() {
            assert_eq!(b, (i % 256) as u8, "stream corrupt at byte {}", i);
        }
    }

    #[test]
    fn test_stalled_client_is_dropped_at_outbox_limit() {
        let (server, client) = socket_pair();
        server.set_nonblocking(true).unwrap();
        let mut transport = TcpTransport::new(server);

        // Peer never reads; the backlog cap must close the transport
        // instead of queuing forever.
        let chunk = [0x5Au8; 4096];
        for _ in 0..16 * 1024 {
            transport.send_bytes(&chunk);
            if transport.is_closed() {
                break;
            }
        }
        assert!(transport.is_closed());
        assert!(transport.outbox.is_empty());
        drop(client);
    }

    #[test]
    fn test_write_after_peer_disconnect_marks_closed() {
        let (server, client) = socket_pair();
        server.set_nonblocking(true).unwrap();
        let mut transport = TcpTransport::new(server);
        drop(client);

        let chunk = [0x00u8; 4096];
        for _ in 0..16 * 1024 {
            transport.send_bytes(&chunk);
            if transport.is_closed() {
                break;
            }
        }
        assert!(transport.is_closed());
    }
}
