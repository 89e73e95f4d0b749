// homegate CLI
// Field diagnostics: ping a device, issue a raw request or watch an event stream

use bytes::Bytes;
use clap::{Args, Parser, Subcommand};
use homegate::codec::Endian;
use homegate::device::packet::{self, RequestFrame};
use homegate::property::{Event, Raw};
use homegate::transport::{
    MemoryPeer, MemoryTransport, TcpTransport, TcpTransportConfig, UdpTransport,
    UdpTransportConfig,
};
use homegate::{Device, DeviceConfig, DeviceError, RequestError, Transport, TransportConfig, TransportError};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "homegate", version, about = "Gateway device link diagnostics")]
struct Cli {
    #[command(flatten)]
    link: LinkArgs,

    /// Tracing filter directive (falls back to RUST_LOG, then "info")
    #[arg(long, global = true)]
    log_filter: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct LinkSelect {
    /// Connect over TCP to HOST:PORT
    #[arg(long, value_name = "HOST:PORT")]
    tcp: Option<String>,

    /// Talk over UDP to HOST:PORT
    #[arg(long, value_name = "HOST:PORT")]
    udp: Option<String>,

    /// Use an in-process simulated peer
    #[arg(long)]
    loopback: bool,
}

#[derive(Args)]
struct LinkArgs {
    #[command(flatten)]
    select: LinkSelect,

    /// Device identifier (hex) on identified links
    #[arg(long, global = true)]
    identifier: Option<String>,

    /// Keepalive window in milliseconds
    #[arg(long, global = true, default_value_t = 5_000)]
    keepalive_ms: u64,

    /// TCP length preamble width in bytes
    #[arg(long, global = true, default_value_t = 1)]
    preamble_width: usize,

    /// TCP length preamble is little-endian
    #[arg(long, global = true)]
    little_endian: bool,

    /// UDP: prefix frames with a sequence number
    #[arg(long, global = true)]
    sequence_mode: bool,

    /// UDP: copies of each frame in sequence mode
    #[arg(long, global = true, default_value_t = 5)]
    redundancy: u8,

    /// UDP: local port to bind
    #[arg(long, global = true, default_value_t = 0)]
    bind_port: u16,

    /// How long to wait for the device to come online
    #[arg(long, global = true, default_value_t = 5_000)]
    wait_ms: u64,
}

#[derive(Subcommand)]
enum Command {
    /// Wait for the device to answer keepalives
    Ping,

    /// Send one request and print the response payload
    Request {
        /// Service identifier (hex)
        service: String,

        /// Request payload (hex)
        #[arg(default_value = "")]
        payload: String,

        /// Request timeout in milliseconds (0 waits forever)
        #[arg(long, default_value_t = 1_000)]
        timeout_ms: u64,
    },

    /// Print event payloads as they arrive
    Watch {
        /// Event identifier (hex)
        event: String,

        /// Stop after this many milliseconds (0 runs until interrupted)
        #[arg(long, default_value_t = 0)]
        duration_ms: u64,
    },
}

#[derive(Debug, Error)]
enum CliError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Request(#[from] RequestError),

    #[error("device did not come online within {0} ms")]
    NotOnline(u64),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.log_filter.as_deref());

    if let Err(e) = run(cli).await {
        eprintln!("homegate: {e}");
        std::process::exit(1);
    }
}

fn init_tracing(directive: Option<&str>) {
    let filter = directive
        .and_then(|d| EnvFilter::try_new(d).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let link = &cli.link;
    let identifier = link
        .identifier
        .as_deref()
        .map(hex::decode)
        .transpose()?;

    let base = TransportConfig::new()
        .with_keepalive_interval_ms(link.keepalive_ms)
        .with_identifier_length(identifier.as_ref().map(Vec::len));
    let (transport, _simulator) = open_transport(link, base)?;

    let mut config = DeviceConfig::new("cli").with_keepalive_window_ms(link.keepalive_ms);
    if let Some(id) = &identifier {
        config = config.with_identifier(id);
    }
    let device = Device::new(config, transport.clone())?;
    transport.connect();

    let result = match cli.command {
        Command::Ping => ping(&device, link.wait_ms).await,
        Command::Request {
            service,
            payload,
            timeout_ms,
        } => {
            let service = hex::decode(service)?;
            let payload = hex::decode(payload)?;
            request(&device, link.wait_ms, &service, &payload, timeout_ms).await
        }
        Command::Watch { event, duration_ms } => {
            watch(&device, &hex::decode(event)?, duration_ms).await
        }
    };

    transport.disconnect();
    result
}

fn open_transport(
    link: &LinkArgs,
    base: TransportConfig,
) -> Result<(Arc<dyn Transport>, Option<tokio::task::JoinHandle<()>>), CliError> {
    let select = &link.select;

    if let Some(address) = &select.tcp {
        let (host, port) = split_address(address)?;
        let endian = if link.little_endian {
            Endian::Little
        } else {
            Endian::Big
        };
        let config = TcpTransportConfig::new(&host, port)
            .with_base_config(base.with_name("tcp"))
            .with_preamble(link.preamble_width, endian);
        let transport: Arc<dyn Transport> = Arc::new(TcpTransport::new(config)?);
        return Ok((transport, None));
    }

    if let Some(address) = &select.udp {
        let (host, port) = split_address(address)?;
        let config = UdpTransportConfig::new(&host, port)
            .with_base_config(base.with_name("udp"))
            .with_bind_port(link.bind_port)
            .with_sequence_mode(link.sequence_mode)
            .with_redundancy(link.redundancy);
        let transport: Arc<dyn Transport> = Arc::new(UdpTransport::new(config)?);
        return Ok((transport, None));
    }

    if link.identifier.is_some() {
        return Err(CliError::InvalidArgument(
            "--identifier is not supported with --loopback".to_string(),
        ));
    }
    let (loopback, peer) = MemoryTransport::pair(base.with_name("loopback"));
    let simulator = tokio::spawn(simulate_peer(peer));
    let transport: Arc<dyn Transport> = loopback;
    Ok((transport, Some(simulator)))
}

fn split_address(address: &str) -> Result<(String, u16), CliError> {
    let (host, port) = address
        .rsplit_once(':')
        .ok_or_else(|| CliError::InvalidArgument(format!("expected HOST:PORT, got {address}")))?;
    let port = port
        .parse::<u16>()
        .map_err(|_| CliError::InvalidArgument(format!("bad port in {address}")))?;
    Ok((host.to_string(), port))
}

async fn wait_online(device: &Device, wait_ms: u64) -> Result<(), CliError> {
    let mut online = device.online();
    let wait = Duration::from_millis(wait_ms);
    let result = match tokio::time::timeout(wait, online.wait_for(|up| *up)).await {
        Ok(Ok(_)) => Ok(()),
        _ => Err(CliError::NotOnline(wait_ms)),
    };
    result
}

async fn ping(device: &Device, wait_ms: u64) -> Result<(), CliError> {
    wait_online(device, wait_ms).await?;
    let seen = device
        .last_seen()
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| "never".to_string());
    println!("{} is online (last seen {})", device.name(), seen);
    Ok(())
}

async fn request(
    device: &Device,
    wait_ms: u64,
    service: &[u8],
    payload: &[u8],
    timeout_ms: u64,
) -> Result<(), CliError> {
    wait_online(device, wait_ms).await?;
    let response = device
        .request(service, payload, Duration::from_millis(timeout_ms))
        .await?;
    println!("{}", hex::encode(&response));
    Ok(())
}

async fn watch(device: &Device, identifier: &[u8], duration_ms: u64) -> Result<(), CliError> {
    let event = Event::new(identifier, Raw);
    device.add_event(&event)?;
    let mut values = event.subscribe();

    let deadline = (duration_ms > 0)
        .then(|| tokio::time::Instant::now() + Duration::from_millis(duration_ms));
    let expired = async {
        match deadline {
            Some(at) => tokio::time::sleep_until(at).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(expired);

    loop {
        tokio::select! {
            changed = values.changed() => {
                if changed.is_err() {
                    break;
                }
                if let Some(payload) = values.borrow_and_update().clone() {
                    println!("{}", hex::encode(&payload));
                }
            }
            _ = &mut expired => break,
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    info!(stats = ?device.stats(), "watch finished");
    Ok(())
}

/// Answers keepalives, echoes requests and emits a counter event on 0x01
async fn simulate_peer(mut peer: MemoryPeer) {
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    let mut counter: u8 = 0;

    loop {
        tokio::select! {
            frame = peer.recv() => {
                let Some(frame) = frame else { break };
                if packet::is_keepalive(&frame) {
                    peer.inject(Bytes::from_static(&[packet::KEEPALIVE_ID]));
                } else if let Some(request) = RequestFrame::parse(&frame) {
                    debug!(request_id = request.request_id, "echoing request");
                    peer.inject(packet::encode_response(request.request_id, &request.body));
                }
            }
            _ = ticker.tick() => {
                counter = counter.wrapping_add(1);
                peer.inject(packet::encode_event(&[0x01], &[counter]));
            }
        }
    }
}
