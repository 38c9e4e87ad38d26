//! Entry point for `multistream-udp`.
//!
//! Parses CLI arguments and dispatches into either **server** or **client** mode.
//! All actual protocol work is delegated to library modules; `main.rs` owns only
//! process setup (logging, signal handling, argument parsing) and report output.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use multistream_udp::config::DEFAULT_MAX_IN_FLIGHT;
use multistream_udp::input;
use multistream_udp::packet::MAX_DATAGRAM_PAYLOAD;
use multistream_udp::{RecvWait, SizePolicy, SocketError, TransportConfig, TransportSession};

/// Multi-stream datagram transfer over UDP with throughput statistics.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Receive streams until the peer closes, then write the report.
    Server {
        /// Local address to bind.
        #[arg(short, long, default_value = "127.0.0.1:5060")]
        bind: SocketAddr,
        /// Text report destination.
        #[arg(short, long, default_value = "statistics.txt")]
        report: PathBuf,
        /// Also write the snapshot as JSON.
        #[arg(long)]
        json: Option<PathBuf>,
        /// Give up after this many seconds without a datagram.
        #[arg(long)]
        idle_timeout: Option<u64>,
        #[command(flatten)]
        sizes: SizeArgs,
    },
    /// Split a file across streams and send it.
    Client {
        /// Remote server address.
        #[arg(short, long, default_value = "127.0.0.1:5060")]
        server: SocketAddr,
        /// File to send.
        #[arg(short, long)]
        file: PathBuf,
        /// Number of streams to split the file across.
        #[arg(short = 'n', long, default_value_t = 10)]
        streams: usize,
        /// Maximum concurrent chunk sends per stream.
        #[arg(long, default_value_t = DEFAULT_MAX_IN_FLIGHT)]
        max_in_flight: usize,
        /// Close with the bare `close` literal.
        #[arg(long)]
        legacy_close: bool,
        #[command(flatten)]
        sizes: SizeArgs,
    },
}

#[derive(Args)]
struct SizeArgs {
    /// Use this packet size for every stream instead of a random one.
    #[arg(long, value_parser = parse_packet_size)]
    packet_size: Option<usize>,
    /// Smallest random packet size.
    #[arg(long, default_value_t = 1000, value_parser = parse_packet_size)]
    min_packet: usize,
    /// Largest random packet size.
    #[arg(long, default_value_t = 2000, value_parser = parse_packet_size)]
    max_packet: usize,
}

/// Packet sizes must leave a chunk that fits one UDP datagram.
fn parse_packet_size(s: &str) -> Result<usize, String> {
    let n: usize = s.parse().map_err(|e| format!("{e}"))?;
    if (1..=MAX_DATAGRAM_PAYLOAD).contains(&n) {
        Ok(n)
    } else {
        Err(format!("packet size must be in 1..={MAX_DATAGRAM_PAYLOAD}"))
    }
}

impl SizeArgs {
    fn policy(&self) -> SizePolicy {
        match self.packet_size {
            Some(n) => SizePolicy::Fixed(n),
            None => SizePolicy::Random {
                min: self.min_packet,
                max: self.max_packet,
            },
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::init();

    let cli = Cli::parse();

    match cli.mode {
        Mode::Server {
            bind,
            report,
            json,
            idle_timeout,
            sizes,
        } => {
            let config = TransportConfig {
                addr: bind,
                packet_size: sizes.policy(),
                ..TransportConfig::default()
            };
            let wait = idle_timeout.map_or(RecvWait::Forever, |s| {
                RecvWait::Timeout(Duration::from_secs(s))
            });
            run_server(config, wait, report, json).await
        }
        Mode::Client {
            server,
            file,
            streams,
            max_in_flight,
            legacy_close,
            sizes,
        } => {
            let config = TransportConfig {
                addr: server,
                packet_size: sizes.policy(),
                max_in_flight,
                legacy_close,
                ..TransportConfig::default()
            };
            run_client(config, file, streams).await
        }
    }
}

async fn run_server(
    config: TransportConfig,
    wait: RecvWait,
    report: PathBuf,
    json: Option<PathBuf>,
) -> anyhow::Result<()> {
    let session = TransportSession::new(config);
    let token = CancellationToken::new();
    let mut receiver = session
        .receiver()
        .await
        .context("binding server socket")?
        .with_cancellation(token.clone());

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });

    log::info!("Server listening on {}", receiver.local_addr());
    match receiver.run_until_close(wait).await {
        Ok(summary) => log::info!(
            "Peer closed after {} frames ({} invalid)",
            summary.frames,
            summary.invalid
        ),
        Err(SocketError::Cancelled) => log::info!("Interrupted; reporting what arrived"),
        Err(e) => log::error!("Error receiving packet: {e}"),
    }

    let snapshot = session.generate_report();
    snapshot
        .write_text(&report)
        .with_context(|| format!("writing report to {}", report.display()))?;
    if let Some(path) = json {
        let body = snapshot.to_json().context("serialising snapshot")?;
        std::fs::write(&path, body)
            .with_context(|| format!("writing JSON snapshot to {}", path.display()))?;
    }

    println!();
    print!("{snapshot}");
    Ok(())
}

async fn run_client(config: TransportConfig, file: PathBuf, streams: usize) -> anyhow::Result<()> {
    // Read everything first: a missing file must abort before any traffic.
    let payloads = input::load_streams(&file, streams)?;

    let session = TransportSession::new(config);
    let mut sender = session.sender().await.context("binding client socket")?;

    for (stream_id, data) in payloads {
        let summary = sender.send(&data, stream_id).await?;
        if summary.failed > 0 {
            log::warn!(
                "stream {stream_id}: {} of {} chunks failed",
                summary.failed,
                summary.chunks
            );
        }
    }
    sender.close().await;

    log::debug!("sender-side statistics:\n{}", session.generate_report());
    Ok(())
}
