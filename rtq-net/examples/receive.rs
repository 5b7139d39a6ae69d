use anyhow::Result;
use clap::Parser;
use rtq_core::default::DEFAULT_SERVER_V4_ADDR;
use rtq_mux::{FlowError, Session};
use rtq_net::{Endpoint, TransportConfig};
use std::{fs::File, net::SocketAddr, sync::Mutex};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Command line arguments for the RTP receiver.
#[derive(Parser, Debug)]
struct Args {
    /// Address to listen on.
    #[arg(short = 'a', long = "addr", default_value_t = DEFAULT_SERVER_V4_ADDR)]
    addr: SocketAddr,
    /// Flow to read RTP packets from.
    #[arg(short = 'f', long = "flow", default_value_t = 0)]
    flow: u64,
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

    let config = TransportConfig::new()?;
    let endpoint = Endpoint::server(args.addr, &config)?;

    let Some(connection) = endpoint.accept().await? else {
        return Ok(());
    };
    tracing::info!("Accepted connection from {}", connection.remote_addr());

    let session = Session::new(connection)?;
    let flow = session.accept_flow(rtq_core::FlowId::try_from(args.flow)?)?;
    tracing::info!("Reading RTP packets on flow {}", flow.flow_id());

    let mut buf = vec![0u8; 65536];
    let mut packets = 0u64;
    loop {
        match flow.read_rtp(&mut buf).await {
            Ok((len, header)) => {
                packets += 1;
                tracing::info!(
                    "RTP seq={} ts={} ssrc={:#010x} pt={} marker={} len={}",
                    header.sequence_number,
                    header.timestamp,
                    header.ssrc,
                    header.payload_type,
                    header.marker,
                    len
                );
            }
            Err(FlowError::EndOfStream) => break,
            Err(FlowError::Rtp(e)) => tracing::warn!("Skipping invalid RTP packet: {}", e),
            Err(e) => return Err(e.into()),
        }
    }
    tracing::info!("End of stream after {} packets", packets);

    session.stopped().await?;
    endpoint.wait_idle().await;
    Ok(())
}
