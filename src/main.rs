//! nbpcast - Numeric Broadcast Protocol broadcaster
//!
//! Reads JSON-lines KPI payloads from stdin (or a file) and broadcasts them
//! as NBP packets over a serial port or a TCP socket.

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use nbpcast_core::cli::{exit_code_description, exit_code_for, finish_input, pump, ExitCodes};
use nbpcast_core::config::config_path;
use nbpcast_core::{
    payload_queue, AppConfig, Broadcaster, BroadcasterHandle, PacketLog, SerialTransport,
    SocketTransport, Transport,
};
use std::io::{self, BufReader};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::Ordering;
use std::thread;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// nbpcast CLI
#[derive(Parser, Debug)]
#[command(
    name = "nbpcast",
    version,
    about = "Broadcast KPI updates using the Numeric Broadcast Protocol",
    long_about = None
)]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(short, long, env = "NBPCAST_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode (warnings and errors only)
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Broadcast over a serial port
    Serial {
        /// Serial device (e.g., /dev/rfcomm0, COM3)
        #[arg(short, long)]
        device: Option<String>,

        /// Baud rate
        #[arg(short, long)]
        baud: Option<u32>,

        #[command(flatten)]
        common: BroadcastArgs,
    },

    /// Broadcast to a TCP client
    Socket {
        /// Address to bind
        #[arg(long)]
        ip: Option<String>,

        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Accept timeout (milliseconds)
        #[arg(long)]
        accept_timeout: Option<u64>,

        #[command(flatten)]
        common: BroadcastArgs,
    },

    /// List available serial ports
    ListPorts {
        /// Show detailed info
        #[arg(short, long)]
        detailed: bool,
    },

    /// Show or create the configuration file
    Config {
        /// Write the default configuration file
        #[arg(long)]
        init: bool,
    },
}

#[derive(Args, Debug)]
struct BroadcastArgs {
    /// Device name announced in metadata packets
    #[arg(short = 'n', long)]
    device_name: Option<String>,

    /// Protocol version token
    #[arg(long)]
    protocol_version: Option<String>,

    /// Minimum seconds between packets
    #[arg(short = 'i', long)]
    min_interval: Option<f64>,

    /// Read payloads from a file instead of stdin
    #[arg(long)]
    input: Option<PathBuf>,

    /// Record sent packets and client requests to a file
    #[arg(short = 'l', long)]
    packet_log: Option<PathBuf>,

    /// Bound the payload queue (producer blocks when full)
    #[arg(long)]
    queue_capacity: Option<usize>,
}

impl BroadcastArgs {
    fn apply(&self, config: &mut AppConfig) {
        if let Some(name) = &self.device_name {
            config.broadcaster.device_name.clone_from(name);
        }
        if let Some(version) = &self.protocol_version {
            config.broadcaster.protocol_version.clone_from(version);
        }
        if let Some(interval) = self.min_interval {
            config.broadcaster.min_update_interval = interval;
        }
        if let Some(path) = &self.packet_log {
            config.logging.packet_log = Some(path.clone());
        }
        if self.queue_capacity.is_some() {
            config.queue.capacity = self.queue_capacity;
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(&cli) {
        Ok(()) => ExitCode::from(ExitCodes::SUCCESS),
        Err(e) => {
            let code = exit_code_for(&e);
            tracing::error!("{:#}", e);
            eprintln!("Error ({}): {e:#}", exit_code_description(code));
            ExitCode::from(code)
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load()?,
    };

    match &cli.command {
        Commands::Serial {
            device,
            baud,
            common,
        } => {
            if let Some(device) = device {
                config.serial.device.clone_from(device);
            }
            if let Some(baud) = baud {
                config.serial.baud_rate = *baud;
            }
            common.apply(&mut config);
            let _guard = init_tracing(cli, &config);

            let transport = SerialTransport::new(config.serial.clone());
            broadcast(&config, common, transport)
        }
        Commands::Socket {
            ip,
            port,
            accept_timeout,
            common,
        } => {
            if let Some(ip) = ip {
                config.socket.ip.clone_from(ip);
            }
            if let Some(port) = port {
                config.socket.port = *port;
            }
            if let Some(timeout) = accept_timeout {
                config.socket.accept_timeout_ms = *timeout;
            }
            common.apply(&mut config);
            let _guard = init_tracing(cli, &config);

            let transport = SocketTransport::bind(config.socket.clone())?;
            broadcast(&config, common, transport)
        }
        Commands::ListPorts { detailed } => list_ports(*detailed),
        Commands::Config { init } => {
            if *init {
                let path = config.save()?;
                println!("Wrote {}", path.display());
            } else {
                if let Some(path) = cli.config.clone().or_else(config_path) {
                    println!("# {}", path.display());
                }
                print!("{}", config.to_toml()?);
            }
            Ok(())
        }
    }
}

fn init_tracing(cli: &Cli, config: &AppConfig) -> Option<WorkerGuard> {
    let level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        config.logging.level.as_str()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let stderr = fmt::layer().with_writer(io::stderr);

    let directory = config
        .logging
        .directory
        .as_ref()
        .filter(|_| config.logging.file)
        .filter(|dir| std::fs::create_dir_all(dir).is_ok());

    if let Some(directory) = directory {
        let appender = tracing_appender::rolling::daily(directory, "nbpcast.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        tracing_subscriber::registry()
            .with(filter)
            .with(stderr)
            .with(fmt::layer().with_ansi(false).with_writer(writer))
            .init();
        Some(guard)
    } else {
        tracing_subscriber::registry().with(filter).with(stderr).init();
        None
    }
}

fn broadcast<T: Transport + 'static>(
    config: &AppConfig,
    args: &BroadcastArgs,
    transport: T,
) -> anyhow::Result<()> {
    tracing::info!("Starting nbpcast v{}", env!("CARGO_PKG_VERSION"));

    let (tx, rx) = payload_queue(config.queue.capacity);

    let mut broadcaster = Broadcaster::new(&config.broadcaster, transport);
    if let Some(path) = &config.logging.packet_log {
        let mut log = PacketLog::new();
        log.start(path, config.logging.packet_log_format)
            .with_context(|| format!("Failed to open packet log {}", path.display()))?;
        if let Some(file) = log.path() {
            tracing::info!("Packet log: {}", file.display());
        }
        broadcaster = broadcaster.with_packet_log(log.shared());
    }

    let mut handle = BroadcasterHandle::spawn(broadcaster, rx)?;

    let running = handle.running_flag();
    let cancel = running.clone();
    ctrlc::set_handler(move || cancel.store(false, Ordering::Relaxed))
        .context("Failed to install Ctrl-C handler")?;

    let input = args.input.clone();
    let producer = thread::Builder::new()
        .name("nbp-input".to_string())
        .spawn(move || -> anyhow::Result<()> {
            let stats = match input {
                Some(path) => {
                    let file = std::fs::File::open(&path)
                        .with_context(|| format!("Failed to open {}", path.display()))?;
                    pump(BufReader::new(file), &tx)?
                }
                None => pump(io::stdin().lock(), &tx)?,
            };
            tracing::info!("Input closed after {} payloads", stats.enqueued);
            Ok(())
        })?;

    handle.wait();
    let stats = handle.stats();
    tracing::info!(
        "Sent {} packets ({} bytes), {} rate limited, {} ALL requests",
        stats.packets_sent,
        stats.bytes_sent,
        stats.rate_limited,
        stats.full_requests
    );

    // Stdin may still be blocked after Ctrl-C
    finish_input(producer, !running.load(Ordering::Relaxed))
}

fn list_ports(detailed: bool) -> anyhow::Result<()> {
    let ports = nbpcast_core::core::transport::list_ports()?;

    if ports.is_empty() {
        println!("No serial ports found.");
        return Ok(());
    }

    if detailed {
        println!("Available Serial Ports:");
        println!("{:-<60}", "");
        for port in &ports {
            println!("  {} [{:?}]", port.port_name, port.port_type);
        }
    } else {
        for port in &ports {
            println!("{}", port.port_name);
        }
    }
    Ok(())
}
