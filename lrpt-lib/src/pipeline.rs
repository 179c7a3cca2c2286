//! The synchronous decode pipeline.
//!
//! One iteration advances one transfer frame: acquire a coded window,
//! correlate, resync, fix the phase ambiguity, Viterbi-decode, strip the
//! ASM and derandomize, Reed-Solomon correct, then parse and account the
//! frame. Every buffer is owned by [Pipeline] and reused, so the hot path
//! performs no allocation.
//!
//! Payloads, corrupted-frame dumps, and telemetry leave through the sink
//! traits; transports stay outside the library and only need to implement
//! [std::io::Read].

use std::io::{ErrorKind, Read};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::framing::correlator::Correlator;
use crate::framing::phase::fix_symbols;
use crate::framing::pn::Derandomizer;
use crate::framing::rs::ReedSolomon;
use crate::framing::viterbi::Viterbi;
use crate::framing::{
    FrameOutcome, VcduHeader, ASM, CADU_SIZE, CODED_FRAME_SIZE, FRAME_BITS, FRAME_SIZE,
    PAYLOAD_SIZE, RS_BLOCKS,
};
use crate::stats::{signal_quality, LinkStats, Telemetry};
use crate::{Error, Result};

/// Default lock threshold in agreeing sync bits, out of 64.
pub const MIN_CORRELATION_BITS: u32 = 46;

/// Default source stall timeout.
pub const STALL_TIMEOUT: Duration = Duration::from_secs(2);

/// Which intermediate buffer a corrupted-frame dump carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DumpStage {
    /// Soft symbols post resync and phase correction.
    Coded,
    /// Viterbi output before correction.
    Decoded,
    /// The Reed-Solomon buffer, uncorrected where columns failed.
    RsInterleaved,
}

impl DumpStage {
    /// Stable numeric code, used by file sinks to name dumps.
    #[must_use]
    pub fn code(&self) -> u8 {
        match self {
            DumpStage::Coded => 0,
            DumpStage::Decoded => 1,
            DumpStage::RsInterleaved => 2,
        }
    }
}

/// Receives per-channel payloads and corrupted-frame dumps.
pub trait ChannelSink {
    fn write_channel(&mut self, payload: &[u8], vcid: u8) -> Result<()>;
    fn dump_corrupted(&mut self, buf: &[u8], stage: DumpStage) -> Result<()>;
    fn dump_corrupted_stats(&mut self, viterbi_ber: u32, correlation: u32) -> Result<()>;
}

/// Receives one telemetry record per processed frame.
pub trait TelemetrySink {
    fn update(&mut self, telemetry: &Telemetry);
    fn show(&mut self);
}

/// Optional observer for the intermediate streams, for offline analysis.
pub trait StreamTap {
    /// The resynced soft window, before phase correction.
    fn synced(&mut self, window: &[u8]) -> Result<()>;
    /// The soft window in canonical phase.
    fn fixed(&mut self, window: &[u8]) -> Result<()>;
    /// The Viterbi output frame.
    fn decoded(&mut self, frame: &[u8]) -> Result<()>;
}

/// A [ChannelSink] that swallows everything.
pub struct DiscardSink;

impl ChannelSink for DiscardSink {
    fn write_channel(&mut self, _payload: &[u8], _vcid: u8) -> Result<()> {
        Ok(())
    }
    fn dump_corrupted(&mut self, _buf: &[u8], _stage: DumpStage) -> Result<()> {
        Ok(())
    }
    fn dump_corrupted_stats(&mut self, _viterbi_ber: u32, _correlation: u32) -> Result<()> {
        Ok(())
    }
}

/// A [TelemetrySink] that ignores every record.
pub struct NullTelemetry;

impl TelemetrySink for NullTelemetry {
    fn update(&mut self, _telemetry: &Telemetry) {}
    fn show(&mut self) {}
}

/// Pipeline tunables.
#[derive(Clone, Debug)]
pub struct DecodeOpts {
    min_correlation: u32,
    stall_timeout: Duration,
}

impl Default for DecodeOpts {
    fn default() -> Self {
        Self::new()
    }
}

impl DecodeOpts {
    pub fn new() -> Self {
        DecodeOpts {
            min_correlation: MIN_CORRELATION_BITS,
            stall_timeout: STALL_TIMEOUT,
        }
    }

    /// Lock threshold in agreeing sync bits, out of 64.
    pub fn with_min_correlation(mut self, bits: u32) -> Self {
        self.min_correlation = bits;
        self
    }

    /// How long the acquirer waits on a quiet source before giving up.
    pub fn with_stall_timeout(mut self, timeout: Duration) -> Self {
        self.stall_timeout = timeout;
        self
    }
}

/// The decoder: all per-session state and working buffers.
pub struct Pipeline {
    opts: DecodeOpts,
    correlator: Correlator,
    viterbi: Viterbi,
    derandomizer: Derandomizer,
    reed_solomon: ReedSolomon,
    stats: LinkStats,
    tap: Option<Box<dyn StreamTap>>,
    coded: Vec<u8>,
    decoded: [u8; FRAME_SIZE],
    corrected: [u8; FRAME_SIZE],
}

impl Pipeline {
    pub fn new(opts: DecodeOpts) -> Self {
        Pipeline {
            opts,
            correlator: Correlator::new(),
            viterbi: Viterbi::new(FRAME_BITS),
            derandomizer: Derandomizer::new(),
            reed_solomon: ReedSolomon::new(),
            stats: LinkStats::new(),
            tap: None,
            coded: vec![0u8; CODED_FRAME_SIZE],
            decoded: [0u8; FRAME_SIZE],
            corrected: [0u8; FRAME_SIZE],
        }
    }

    /// Copy the intermediate streams into `tap` as frames pass through.
    pub fn with_stream_tap(mut self, tap: Box<dyn StreamTap>) -> Self {
        self.tap = Some(tap);
        self
    }

    #[must_use]
    pub fn stats(&self) -> &LinkStats {
        &self.stats
    }

    /// Decode frames until the source closes or stalls.
    ///
    /// Source exhaustion is the normal way a session ends and returns
    /// `Ok(())`; only transport failures are errors.
    ///
    /// # Errors
    /// [Error::Io] on sink or source I/O failures other than end of stream.
    pub fn run<R, C, T>(&mut self, mut source: R, channels: &mut C, telemetry: &mut T) -> Result<()>
    where
        R: Read,
        C: ChannelSink + ?Sized,
        T: TelemetrySink + ?Sized,
    {
        loop {
            match self.process_frame(&mut source, channels, telemetry) {
                Ok(outcome) => debug!(?outcome, "frame processed"),
                Err(Error::SourceClosed) => {
                    info!("source closed, shutting down");
                    return Ok(());
                }
                Err(Error::SourceStalled) => {
                    info!("source stalled, shutting down");
                    return Ok(());
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Advance the pipeline by one frame.
    ///
    /// # Errors
    /// [Error::SourceClosed] / [Error::SourceStalled] when the source ends,
    /// [Error::Io] on sink failures.
    pub fn process_frame<R, C, T>(
        &mut self,
        source: &mut R,
        channels: &mut C,
        telemetry: &mut T,
    ) -> Result<FrameOutcome>
    where
        R: Read,
        C: ChannelSink + ?Sized,
        T: TelemetrySink + ?Sized,
    {
        acquire(source, &mut self.coded, self.opts.stall_timeout)?;

        let sync = self.correlator.correlate(&self.coded);
        if sync.correlation < self.opts.min_correlation {
            debug!(
                correlation = sync.correlation,
                threshold = self.opts.min_correlation,
                "no lock, skipping window"
            );
            return Ok(FrameOutcome::NoLock {
                correlation: sync.correlation,
            });
        }

        // Re-align so the next window starts on a frame boundary
        let pos = sync.offset;
        if pos != 0 {
            self.coded.copy_within(pos.., 0);
            acquire(
                source,
                &mut self.coded[CODED_FRAME_SIZE - pos..],
                self.opts.stall_timeout,
            )?;
        }
        if let Some(tap) = self.tap.as_mut() {
            tap.synced(&self.coded)?;
        }

        let ambiguity = sync.ambiguity();
        fix_symbols(&mut self.coded, ambiguity);
        if let Some(tap) = self.tap.as_mut() {
            tap.fixed(&self.coded)?;
        }

        self.viterbi.decode(&self.coded, &mut self.decoded);
        if let Some(tap) = self.tap.as_mut() {
            tap.decoded(&self.decoded)?;
        }
        let viterbi_ber = self.viterbi.ber();
        let quality = signal_quality(self.viterbi.percent_ber());

        // The ASM carries no data; shift it out and derandomize what remains
        self.decoded.copy_within(ASM.len().., 0);
        self.derandomizer.derandomize(&mut self.decoded[..CADU_SIZE]);

        self.stats.record_frame(viterbi_ber);

        let derrors = self
            .reed_solomon
            .correct_block(&self.decoded[..CADU_SIZE], &mut self.corrected[..CADU_SIZE]);

        if derrors.iter().all(|&d| d == -1) {
            self.stats.record_drop();
            warn!(viterbi_ber, "all reed-solomon columns failed, dropping");
            channels.dump_corrupted(&self.coded[..FRAME_SIZE], DumpStage::Coded)?;
            channels.dump_corrupted(&self.decoded[..FRAME_SIZE], DumpStage::Decoded)?;
            channels.dump_corrupted(&self.corrected[..FRAME_SIZE], DumpStage::RsInterleaved)?;
            channels.dump_corrupted_stats(viterbi_ber, sync.correlation)?;

            let record = self.make_telemetry(
                None,
                viterbi_ber,
                derrors,
                quality,
                sync.correlation,
                ambiguity.display_code(),
                pos,
            );
            telemetry.update(&record);
            telemetry.show();
            return Ok(FrameOutcome::Dropped);
        }
        self.stats.record_rs(&derrors);

        let header = VcduHeader::decode(&self.corrected)
            .expect("corrected frame always holds a full header");
        channels.write_channel(&self.corrected[..PAYLOAD_SIZE], header.vcid)?;
        self.stats.account(&header);

        let record = self.make_telemetry(
            Some(header),
            viterbi_ber,
            derrors,
            quality,
            sync.correlation,
            ambiguity.display_code(),
            pos,
        );
        telemetry.update(&record);
        telemetry.show();

        Ok(FrameOutcome::Accepted { header })
    }

    #[allow(clippy::too_many_arguments)]
    fn make_telemetry(
        &self,
        header: Option<VcduHeader>,
        viterbi_ber: u32,
        rs_errors: [i32; RS_BLOCKS],
        signal_quality: u8,
        correlation: u32,
        phase_corr: u16,
        pos: usize,
    ) -> Telemetry<'_> {
        Telemetry {
            scid: header.map_or(0, |h| h.scid),
            vcid: header.map_or(0, |h| h.vcid),
            counter: header.map_or(0, |h| h.counter),
            viterbi_ber,
            frame_bits: FRAME_BITS,
            rs_errors,
            signal_quality,
            correlation,
            phase_corr,
            total_lost: self.stats.total_lost,
            avg_viterbi_ber: self.stats.avg_viterbi_ber(),
            avg_rs_corrections: self.stats.avg_rs_corrections(),
            dropped: self.stats.dropped,
            received_per_vc: self.stats.received_per_vc(),
            lost_per_vc: self.stats.lost_per_vc(),
            frames_total: self.stats.frames_total,
            pos,
        }
    }
}

/// Read exactly `buf.len()` bytes, failing with [Error::SourceStalled] if
/// the whole buffer cannot be filled within `timeout`.
fn acquire<R: Read>(source: &mut R, buf: &mut [u8], timeout: Duration) -> Result<()> {
    let deadline = Instant::now() + timeout;
    let mut filled = 0;
    while filled < buf.len() {
        match source.read(&mut buf[filled..]) {
            Ok(0) => return Err(Error::SourceClosed),
            Ok(n) => filled += n,
            Err(err)
                if matches!(
                    err.kind(),
                    ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
                ) =>
            {
                if Instant::now() >= deadline {
                    return Err(Error::SourceStalled);
                }
            }
            Err(err) => return Err(Error::Io(err)),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    struct StalledReader;

    impl Read for StalledReader {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::Error::from(ErrorKind::WouldBlock))
        }
    }

    #[test]
    fn acquire_fills_whole_buffer() {
        let data: Vec<u8> = (0..100).collect();
        let mut source = Cursor::new(data.clone());
        let mut buf = vec![0u8; 100];

        acquire(&mut source, &mut buf, STALL_TIMEOUT).unwrap();
        assert_eq!(buf, data);
    }

    #[test]
    fn acquire_short_read_is_source_closed() {
        let mut source = Cursor::new(vec![0u8; 10]);
        let mut buf = vec![0u8; 100];

        let err = acquire(&mut source, &mut buf, STALL_TIMEOUT).unwrap_err();
        assert!(matches!(err, Error::SourceClosed));
    }

    #[test]
    fn acquire_quiet_source_is_source_stalled() {
        let mut buf = vec![0u8; 16];

        let err = acquire(
            &mut StalledReader,
            &mut buf,
            Duration::from_millis(5),
        )
        .unwrap_err();
        assert!(matches!(err, Error::SourceStalled));
    }
}
