use anyhow::Result;
use clap::Parser;
use rtp::header::Header as RtpHeader;
use rtq_core::default::{
    DEFAULT_BIND_V4_ADDR, DEFAULT_MTU, DEFAULT_SERVER_NAME, LOCALHOST_SERVER_V4_ADDR,
};
use rtq_mux::Session;
use rtq_net::{tls::ServerVerification, Endpoint, TransportConfig};
use std::{fs::File, net::SocketAddr, sync::Mutex, time::Duration};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Command line arguments for the RTP sender.
#[derive(Parser, Debug)]
struct Args {
    /// Receiver address to connect to.
    #[arg(short = 'a', long = "addr", default_value_t = LOCALHOST_SERVER_V4_ADDR)]
    addr: SocketAddr,
    /// TLS server name of the receiver.
    #[arg(long = "server-name", default_value = DEFAULT_SERVER_NAME)]
    server_name: String,
    /// Flow to write RTP packets to.
    #[arg(short = 'f', long = "flow", default_value_t = 0)]
    flow: u64,
    /// Number of packets to send.
    #[arg(short = 'c', long = "count", default_value_t = 100)]
    count: u32,
    /// Delay between packets.
    #[arg(short = 'i', long = "interval-ms", default_value_t = 20)]
    interval_ms: u64,
    /// Payload bytes per packet.
    #[arg(short = 's', long = "size", default_value_t = 1000)]
    size: usize,
    /// Write logs to this file instead of stdout.
    #[arg(long = "log-file", env = "LOG_FILE")]
    log_file: Option<String>,
}

fn init_logging(log_file: Option<&str>) -> Result<()> {
    let builder = FmtSubscriber::builder().with_max_level(Level::DEBUG);
    match log_file {
        Some(path) => {
            let file = File::create(path)?;
            let subscriber = builder.with_ansi(false).with_writer(Mutex::new(file)).finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
        None => tracing::subscriber::set_global_default(builder.finish())?,
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.log_file.as_deref())?;

    // The receiver presents a fresh self-signed certificate.
    let config = TransportConfig::new()?.with_server_verification(ServerVerification::Insecure);
    let endpoint = Endpoint::client(DEFAULT_BIND_V4_ADDR, &config)?;
    let connection = endpoint.connect(args.addr, &args.server_name).await?;

    let session = Session::new(connection)?;
    let writer = session.open_write_flow(rtq_core::FlowId::try_from(args.flow)?);
    let payload = vec![0xab; args.size.min(DEFAULT_MTU)];
    let mut interval = tokio::time::interval(Duration::from_millis(args.interval_ms.max(1)));

    let mut header = RtpHeader {
        version: 2,
        payload_type: 96,
        ssrc: 0x1234_5678,
        ..Default::default()
    };
    for i in 0..args.count {
        interval.tick().await;
        header.sequence_number = i as u16;
        header.timestamp = i.wrapping_mul(3000);
        header.marker = i + 1 == args.count;
        let n = writer.write_rtp(&header, &payload).await?;
        tracing::debug!("Sent RTP seq={} ({} bytes)", header.sequence_number, n);
    }
    tracing::info!("Sent {} packets on flow {}", args.count, writer.flow_id());

    session.close()?;
    session.stopped().await?;
    endpoint.wait_idle().await;
    Ok(())
}
