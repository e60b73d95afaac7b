// tools/link_cli/main.rs
//
// Transmitter link diagnostics.
//
//   link_cli ports
//   link_cli decode '{"type": "MOTION", "data": 1}'
//   link_cli listen --port /dev/ttyAMA0 --count 20
//   link_cli send --port /dev/ttyUSB0 --motion 1
//
// Build with: cargo run --features cli --bin link_cli -- <command>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use motion_hmi_lib::io::{
    list_serial_ports, Message, MessageCodec, SerialTransport, TransportManager,
};
use motion_hmi_lib::{default_settings_path, load_settings, StationSettings};

#[derive(Parser, Debug)]
#[command(name = "link_cli", about = "MotionHMI transmitter link diagnostics")]
struct Cli {
    /// Settings file (JSON or TOML); defaults to the station settings
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List serial ports on this machine
    Ports,

    /// Decode one frame with the configured message types
    Decode { frame: String },

    /// Print decoded frames from the transmitter link
    Listen {
        #[arg(long)]
        port: Option<String>,
        #[arg(long)]
        baud: Option<u32>,
        /// Stop after this many lines (0 = until the link drops)
        #[arg(long, default_value_t = 0)]
        count: usize,
    },

    /// Write a single frame, e.g. to drive a station from a loopback adapter
    Send {
        #[arg(long)]
        port: Option<String>,
        #[arg(long)]
        baud: Option<u32>,
        /// Send a motion reading instead of a raw frame
        #[arg(long, conflicts_with = "frame")]
        motion: Option<i64>,
        /// Send a log line instead of a raw frame
        #[arg(long, conflicts_with_all = ["frame", "motion"])]
        log: Option<String>,
        frame: Option<String>,
    },
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), String> {
    let settings_path = cli.settings.unwrap_or_else(default_settings_path);
    let settings = load_settings(&settings_path)?;

    match cli.command {
        Command::Ports => ports(),
        Command::Decode { frame } => decode(&settings.codec(), &frame),
        Command::Listen { port, baud, count } => {
            listen(&with_overrides(settings, port, baud), count)
        }
        Command::Send {
            port,
            baud,
            motion,
            log,
            frame,
        } => {
            let settings = with_overrides(settings, port, baud);
            let codec = settings.codec();
            let line = match (motion, log, frame) {
                (Some(value), _, _) => codec.encode(&Message::Motion { value }),
                (_, Some(payload), _) => codec.encode(&Message::Log { payload }),
                (_, _, Some(frame)) => frame.into_bytes(),
                _ => return Err("nothing to send: pass --motion, --log or a frame".to_string()),
            };
            send(&settings, &line)
        }
    }
}

fn with_overrides(
    mut settings: StationSettings,
    port: Option<String>,
    baud: Option<u32>,
) -> StationSettings {
    if let Some(port) = port {
        settings.serial_port = port;
    }
    if let Some(baud) = baud {
        settings.baud_rate = baud;
    }
    settings
}

fn ports() -> Result<(), String> {
    let ports = list_serial_ports()?;
    if ports.is_empty() {
        println!("No serial ports found");
    }
    for port in ports {
        let detail = [port.manufacturer, port.product]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ");
        println!("{:<24} {:<8} {}", port.port_name, port.port_type, detail);
    }
    Ok(())
}

fn decode(codec: &MessageCodec, frame: &str) -> Result<(), String> {
    let message = codec.decode(frame.as_bytes())?;
    println!("{:?}", message);
    Ok(())
}

fn listen(settings: &StationSettings, count: usize) -> Result<(), String> {
    let codec = settings.codec();
    let mut manager = TransportManager::new(Box::new(SerialTransport::new()));
    manager.open(&settings.serial())?;

    println!(
        "Listening on {} @ {} ({})",
        settings.serial_port,
        settings.baud_rate,
        settings.serial().line_format()
    );

    let mut seen = 0usize;
    while count == 0 || seen < count {
        let Some(line) = manager.read_line()? else {
            continue;
        };
        seen += 1;

        match codec.decode(&line) {
            Ok(message) => println!("{:?}", message),
            Err(e) => println!("! {} ({})", e, String::from_utf8_lossy(&line)),
        }
    }

    manager.close();
    Ok(())
}

fn send(settings: &StationSettings, line: &[u8]) -> Result<(), String> {
    let mut manager = TransportManager::new(Box::new(SerialTransport::new()));
    manager.open(&settings.serial())?;
    manager.write_line(line)?;
    manager.close();

    println!("Sent {} bytes to {}", line.len() + 1, settings.serial_port);
    Ok(())
}
