mod display;
mod writer;

use std::io::stderr;
use std::net::TcpListener;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use lrpt::pipeline::{DecodeOpts, Pipeline, TelemetrySink, MIN_CORRELATION_BITS};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Meteor-M LRPT decoder.
///
/// Listens for a single client delivering QPSK soft symbols and decodes
/// transfer frames into per-virtual-channel files, with live link telemetry.
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// TCP port to listen on for the soft-symbol stream.
    #[arg(short, long, default_value_t = 5000)]
    port: u16,

    /// Directory for per-channel output and corrupted-frame dumps.
    #[arg(short, long, default_value = "channels")]
    output: PathBuf,

    /// Lock threshold in agreeing sync bits, out of 64.
    #[arg(long, default_value_t = MIN_CORRELATION_BITS)]
    min_correlation: u32,

    /// Source stall timeout, in seconds.
    #[arg(long, default_value_t = 2)]
    timeout: u64,

    /// Emit one JSON telemetry record per frame instead of the status panel.
    #[arg(long, action)]
    json: bool,

    /// Also dump the intermediate streams (resynced, phase-fixed, decoded).
    #[arg(long, action)]
    dump_streams: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(stderr)
        .with_ansi(false)
        .without_time()
        .with_env_filter(EnvFilter::try_from_env("LRPT_LOG").unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let listener = TcpListener::bind(("0.0.0.0", cli.port))
        .with_context(|| format!("binding port {}", cli.port))?;
    info!("waiting for a client connection on port {}", cli.port);

    let (client, peer) = listener.accept().context("accepting client")?;
    info!(%peer, "client connected");
    // Short poll interval; the pipeline enforces the real stall timeout
    client
        .set_read_timeout(Some(Duration::from_millis(50)))
        .context("setting client read timeout")?;

    let opts = DecodeOpts::new()
        .with_min_correlation(cli.min_correlation)
        .with_stall_timeout(Duration::from_secs(cli.timeout));
    let mut pipeline = Pipeline::new(opts);
    if cli.dump_streams {
        pipeline = pipeline.with_stream_tap(Box::new(writer::StreamDumper::new(&cli.output)?));
    }

    let mut channels = writer::FileChannelWriter::new(&cli.output)?;
    let mut telemetry: Box<dyn TelemetrySink> = if cli.json {
        Box::new(display::JsonTelemetry)
    } else {
        Box::new(display::TerminalDisplay::new())
    };

    let result = pipeline.run(client, &mut channels, telemetry.as_mut());

    let stats = pipeline.stats();
    info!(
        frames = stats.frames_total,
        dropped = stats.dropped,
        lost = stats.total_lost,
        "session ended"
    );

    result.context("decoding stream")?;
    Ok(())
}
