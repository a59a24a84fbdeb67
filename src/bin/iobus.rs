//! Operator CLI for the I/O board.
//!
//! Speaks the board's binary envelope protocol over TCP (against real
//! bridge hardware or the bundled simulator) and renders responses for a
//! human.

use clap::{App, Arg, ArgMatches, SubCommand};
use colored::*;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use iobus::protocol::{
    encode_command, ProtocolError, Response, TelemetryReading, CMD_GET_ANALOG_PERIOD,
    CMD_GET_INFO, CMD_GET_INPUTS, CMD_GET_INPUT_PERIOD, CMD_SET_ANALOG_PERIOD,
    CMD_SET_INPUT_PERIOD, CMD_SET_OUTPUTS, CMD_SET_STREAMING, CMD_SNAPSHOT, FRAME_START0,
    FRAME_START1, STATUS_OK, TELEMETRY_FRAME_LEN,
};

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: &str = "8090";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let matches = App::new("iobus")
        .version("0.1.0")
        .author("Embedded Systems Lab Team")
        .about("Operator console for the 4-channel I/O board")
        .arg(
            Arg::with_name("host")
                .long("host")
                .value_name("HOST")
                .help("Board or simulator host address")
                .takes_value(true)
                .default_value(DEFAULT_HOST)
                .global(true),
        )
        .arg(
            Arg::with_name("port")
                .short("p")
                .long("port")
                .value_name("PORT")
                .help("Board or simulator port")
                .takes_value(true)
                .default_value(DEFAULT_PORT)
                .global(true),
        )
        .arg(
            Arg::with_name("format")
                .short("f")
                .long("format")
                .value_name("FORMAT")
                .help("Output format")
                .takes_value(true)
                .possible_values(&["json", "table"])
                .default_value("table")
                .global(true),
        )
        .subcommand(SubCommand::with_name("info").about("Read the firmware identification string"))
        .subcommand(SubCommand::with_name("inputs").about("Resample and read the digital input bank"))
        .subcommand(
            SubCommand::with_name("outputs")
                .about("Drive the digital output bank")
                .arg(
                    Arg::with_name("mask")
                        .help("Output mask, 0-15")
                        .required(true)
                        .validator(|v| match parse_mask(&v) {
                            Some(_) => Ok(()),
                            None => Err("mask must be 0-15 (or 0x0-0xF)".into()),
                        }),
                ),
        )
        .subcommand(
            SubCommand::with_name("period")
                .about("Get or set a sample period")
                .arg(
                    Arg::with_name("group")
                        .help("Channel group")
                        .required(true)
                        .possible_values(&["digital", "analog"]),
                )
                .arg(
                    Arg::with_name("ms")
                        .help("New period in milliseconds (omit to read back)")
                        .validator(|v| v.parse::<u16>().map(|_| ()).map_err(|_| "period must be a u16".into())),
                ),
        )
        .subcommand(
            SubCommand::with_name("stream")
                .about("Enable or disable continuous telemetry")
                .arg(
                    Arg::with_name("state")
                        .help("Streaming state")
                        .required(true)
                        .possible_values(&["on", "off"]),
                ),
        )
        .subcommand(SubCommand::with_name("snapshot").about("Request one telemetry frame on demand"))
        .subcommand(
            SubCommand::with_name("monitor")
                .about("Follow the live telemetry stream")
                .arg(
                    Arg::with_name("count")
                        .short("n")
                        .long("count")
                        .value_name("FRAMES")
                        .help("Stop after this many frames (default: run until Ctrl+C)")
                        .takes_value(true),
                ),
        )
        .get_matches();

    let host = matches.value_of("host").unwrap().to_string();
    let port = matches.value_of("port").unwrap().parse::<u16>()?;
    let format = matches.value_of("format").unwrap().to_string();

    match matches.subcommand() {
        ("info", _) => {
            let response = request(&host, port, CMD_GET_INFO, &[]).await?;
            print_response(&response, &format, |r| {
                format!("firmware: {}", String::from_utf8_lossy(&r.payload).bright_cyan())
            });
        }
        ("inputs", _) => {
            let response = request(&host, port, CMD_GET_INPUTS, &[]).await?;
            print_response(&response, &format, |r| {
                let mask = r.payload.first().copied().unwrap_or(0);
                format!("inputs: {} ({:#06b})", mask.to_string().bright_cyan(), mask)
            });
        }
        ("outputs", Some(sub)) => {
            let mask = parse_mask(sub.value_of("mask").unwrap()).unwrap();
            let response = request(&host, port, CMD_SET_OUTPUTS, &[mask]).await?;
            print_response(&response, &format, |r| {
                let applied = r.payload.first().copied().unwrap_or(0);
                format!("outputs set to {} ({:#06b})", applied.to_string().bright_cyan(), applied)
            });
        }
        ("period", Some(sub)) => {
            handle_period(sub, &host, port, &format).await?;
        }
        ("stream", Some(sub)) => {
            let on = sub.value_of("state").unwrap() == "on";
            let response = request(&host, port, CMD_SET_STREAMING, &[u8::from(on)]).await?;
            print_response(&response, &format, |r| {
                let state = r.payload.first().copied().unwrap_or(0) != 0;
                format!("streaming {}", if state { "ENABLED".bright_green() } else { "DISABLED".yellow() })
            });
        }
        ("snapshot", _) => {
            handle_snapshot(&host, port, &format).await?;
        }
        ("monitor", Some(sub)) => {
            let count = sub.value_of("count").map(|c| c.parse::<u64>()).transpose()?;
            handle_monitor(&host, port, &format, count).await?;
        }
        _ => {
            println!("{}", "No command specified. Use --help for usage information.".yellow());
            println!("{}", "Quick start:".bright_green());
            println!("  {}  Check the link", "iobus info".bright_cyan());
            println!("  {}  Light outputs 1 and 3", "iobus outputs 10".bright_cyan());
            println!("  {}  Watch live telemetry", "iobus stream on && iobus monitor".bright_cyan());
        }
    }

    Ok(())
}

async fn handle_period(
    sub: &ArgMatches<'_>,
    host: &str,
    port: u16,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let analog = sub.value_of("group").unwrap() == "analog";
    let response = match sub.value_of("ms") {
        Some(ms) => {
            let value: u16 = ms.parse()?;
            let cmd = if analog { CMD_SET_ANALOG_PERIOD } else { CMD_SET_INPUT_PERIOD };
            request(host, port, cmd, &value.to_le_bytes()).await?
        }
        None => {
            let cmd = if analog { CMD_GET_ANALOG_PERIOD } else { CMD_GET_INPUT_PERIOD };
            request(host, port, cmd, &[]).await?
        }
    };
    print_response(&response, format, |r| {
        let ms = u16::from_le_bytes([
            r.payload.first().copied().unwrap_or(0),
            r.payload.get(1).copied().unwrap_or(0),
        ]);
        format!(
            "{} sample period: {} ms",
            if analog { "analog" } else { "digital" },
            ms.to_string().bright_cyan()
        )
    });
    Ok(())
}

async fn handle_snapshot(host: &str, port: u16, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let mut stream = connect(host, port).await?;
    stream.write_all(&encode_command(CMD_SNAPSHOT, &[])).await?;

    let mut buffer = Vec::new();
    let reading = tokio::time::timeout(std::time::Duration::from_secs(5), async {
        loop {
            read_some(&mut stream, &mut buffer).await?;
            // OK envelope first, then the 20-byte frame as a second write.
            if let Ok((response, consumed)) = Response::scan(&buffer) {
                if response.status != STATUS_OK {
                    return Err::<TelemetryReading, Box<dyn std::error::Error>>(
                        format!("snapshot refused, status {:#04x}", response.status).into(),
                    );
                }
                if let Some(reading) = find_frame(&buffer[consumed..]) {
                    return Ok(reading);
                }
            }
        }
    })
    .await
    .map_err(|_| "timed out waiting for snapshot")??;

    print_reading(&reading, format);
    Ok(())
}

async fn handle_monitor(
    host: &str,
    port: u16,
    format: &str,
    count: Option<u64>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut stream = connect(host, port).await?;
    stream.write_all(&encode_command(CMD_SET_STREAMING, &[1])).await?;

    if format != "json" {
        println!("{}", "Following telemetry (Ctrl+C to stop)...".dimmed());
    }

    let mut buffer = Vec::new();
    let mut seen = 0u64;
    loop {
        read_some(&mut stream, &mut buffer).await?;
        while let Some(pos) = find_frame_start(&buffer) {
            if buffer.len() - pos < TELEMETRY_FRAME_LEN {
                buffer.drain(..pos);
                break;
            }
            if let Ok(reading) = TelemetryReading::from_frame(&buffer[pos..pos + TELEMETRY_FRAME_LEN]) {
                print_reading(&reading, format);
                seen += 1;
                if let Some(limit) = count {
                    if seen >= limit {
                        return Ok(());
                    }
                }
            }
            buffer.drain(..pos + TELEMETRY_FRAME_LEN);
        }
    }
}

// Wire helpers

async fn connect(host: &str, port: u16) -> Result<TcpStream, Box<dyn std::error::Error>> {
    match TcpStream::connect((host, port)).await {
        Ok(stream) => Ok(stream),
        Err(e) => {
            eprintln!("{} failed to connect to {}:{}", "error:".bright_red(), host, port);
            if e.kind() == std::io::ErrorKind::ConnectionRefused {
                eprintln!("{} no board bridge or simulator is listening; try:", "hint:".yellow());
                eprintln!("   {}", "cargo run --bin iobus-simulator".bright_cyan());
            }
            Err(e.into())
        }
    }
}

async fn request(host: &str, port: u16, cmd: u8, payload: &[u8]) -> Result<Response, Box<dyn std::error::Error>> {
    let mut stream = connect(host, port).await?;
    stream.write_all(&encode_command(cmd, payload)).await?;

    let mut buffer = Vec::new();
    tokio::time::timeout(std::time::Duration::from_secs(5), async {
        loop {
            read_some(&mut stream, &mut buffer).await?;
            match Response::scan(&buffer) {
                Ok((response, _)) => return Ok(response),
                Err(ProtocolError::MissingSync | ProtocolError::Truncated) => continue,
                Err(e) => return Err::<Response, Box<dyn std::error::Error>>(e.into()),
            }
        }
    })
    .await
    .map_err(|_| "request timed out")?
}

async fn read_some(stream: &mut TcpStream, buffer: &mut Vec<u8>) -> Result<(), Box<dyn std::error::Error>> {
    let mut chunk = [0u8; 256];
    let n = stream.read(&mut chunk).await?;
    if n == 0 {
        return Err("connection closed by board".into());
    }
    buffer.extend_from_slice(&chunk[..n]);
    Ok(())
}

fn find_frame_start(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|w| w == [FRAME_START0, FRAME_START1])
}

fn find_frame(buffer: &[u8]) -> Option<TelemetryReading> {
    let pos = find_frame_start(buffer)?;
    if buffer.len() - pos < TELEMETRY_FRAME_LEN {
        return None;
    }
    TelemetryReading::from_frame(&buffer[pos..pos + TELEMETRY_FRAME_LEN]).ok()
}

// Rendering

fn parse_mask(value: &str) -> Option<u8> {
    let parsed = if let Some(hex) = value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        u8::from_str_radix(hex, 16).ok()?
    } else {
        value.parse::<u8>().ok()?
    };
    (parsed <= 0x0F).then_some(parsed)
}

fn print_response<F: FnOnce(&Response) -> String>(response: &Response, format: &str, render: F) {
    if format == "json" {
        println!("{}", serde_json::to_string(response).unwrap_or_default());
        return;
    }
    match response.status {
        STATUS_OK => println!("{} {}", "ok".bright_green(), render(response)),
        0x01 => println!("{} board reported checksum mismatch, retry", "error:".bright_red()),
        0x02 => println!("{} board rejected parameters (length)", "error:".bright_red()),
        0x03 => println!("{} board does not know command {:#04x}", "error:".bright_red(), response.cmd),
        other => println!("{} unexpected status {:#04x}", "error:".bright_red(), other),
    }
}

fn print_reading(reading: &TelemetryReading, format: &str) {
    if format == "json" {
        println!("{}", serde_json::to_string(reading).unwrap_or_default());
        return;
    }
    let an = &reading.analog;
    println!(
        "in={:04b} out={:04b} | an0={:4} an1={:4} an2={:4} an3={:4} | half={:4} {:4} {:4} {:4}",
        reading.inputs, reading.outputs, an[0], an[1], an[2], an[3], an[4], an[5], an[6], an[7],
    );
}
