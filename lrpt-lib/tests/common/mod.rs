//! Synthesis of complete LRPT soft-symbol streams: the transmit chain run
//! in reverse order of the decoder, plus recording sinks.

use lrpt::framing::{pn::Derandomizer, rs, viterbi, ASM, CADU_SIZE, PAYLOAD_SIZE};
use lrpt::pipeline::{ChannelSink, DumpStage, TelemetrySink};
use lrpt::stats::Telemetry;
use lrpt::Result;

/// Frame payload bytes (header included) for the given identifiers, with a
/// deterministic body so tests can compare decoded output byte for byte.
pub fn build_payload(scid: u8, vcid: u8, counter: u32) -> Vec<u8> {
    let mut data = vec![0u8; PAYLOAD_SIZE];
    data[0] = (1 << 6) | (scid >> 2);
    data[1] = ((scid & 0x3) << 6) | (vcid & 0x3f);
    data[2] = (counter >> 16) as u8;
    data[3] = (counter >> 8) as u8;
    data[4] = counter as u8;
    data[5] = 0;
    for (i, b) in data.iter_mut().enumerate().skip(6) {
        *b = ((i as u32 * 31 + counter * 7 + u32::from(vcid) * 3) % 256) as u8;
    }
    data
}

/// Stripe the payload across four Reed-Solomon code words, parity at the
/// column tails, giving the full 1020-byte code block.
pub fn interleave_rs(data: &[u8]) -> Vec<u8> {
    assert_eq!(data.len(), PAYLOAD_SIZE);
    let mut block = vec![0u8; CADU_SIZE];
    for col in 0..4 {
        let mut msg = [0u8; 223];
        for (j, m) in msg.iter_mut().enumerate() {
            *m = data[col + 4 * j];
        }
        let code_word = rs::encode_message(&msg);
        for (j, &c) in code_word.iter().enumerate() {
            block[col + 4 * j] = c;
        }
    }
    block
}

/// Randomize, attach the ASM, convolutionally encode, and spread to strong
/// soft bytes: one clean coded frame as the demodulator would deliver it.
pub fn frame_to_soft(block: &[u8]) -> Vec<u8> {
    assert_eq!(block.len(), CADU_SIZE);
    let mut cadu = ASM.to_vec();
    let mut randomized = block.to_vec();
    Derandomizer::new().derandomize(&mut randomized);
    cadu.extend_from_slice(&randomized);

    let mut symbols = vec![0u8; cadu.len() * 16];
    viterbi::encode(&cadu, &mut symbols);
    symbols.iter().map(|&b| if b == 1 { 255 } else { 0 }).collect()
}

/// One clean coded frame for the given identifiers.
pub fn soft_frame(scid: u8, vcid: u8, counter: u32) -> Vec<u8> {
    frame_to_soft(&interleave_rs(&build_payload(scid, vcid, counter)))
}

/// Channel impairment: rotate every symbol by 90 degrees.
pub fn rotate_90(soft: &mut [u8]) {
    for pair in soft.chunks_exact_mut(2) {
        let (i, q) = (pair[0], pair[1]);
        pair[0] = !q;
        pair[1] = i;
    }
}

/// Channel impairment: swap I and Q of every symbol.
pub fn swap_iq(soft: &mut [u8]) {
    for pair in soft.chunks_exact_mut(2) {
        pair.swap(0, 1);
    }
}

/// Channel impairment: full constellation inversion.
pub fn invert(soft: &mut [u8]) {
    for b in soft.iter_mut() {
        *b = !*b;
    }
}

/// Deterministic junk bytes for misalignment prefixes.
pub fn junk_bytes(n: usize) -> Vec<u8> {
    let mut state: u32 = 1;
    (0..n)
        .map(|_| {
            state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345) & 0x7fff_ffff;
            (state >> 16) as u8
        })
        .collect()
}

/// Records every sink call for later assertions.
#[derive(Default)]
pub struct RecordingSink {
    pub channels: Vec<(u8, Vec<u8>)>,
    pub dumps: Vec<(u8, usize)>,
    pub dump_stats: Vec<(u32, u32)>,
}

impl ChannelSink for RecordingSink {
    fn write_channel(&mut self, payload: &[u8], vcid: u8) -> Result<()> {
        self.channels.push((vcid, payload.to_vec()));
        Ok(())
    }

    fn dump_corrupted(&mut self, buf: &[u8], stage: DumpStage) -> Result<()> {
        self.dumps.push((stage.code(), buf.len()));
        Ok(())
    }

    fn dump_corrupted_stats(&mut self, viterbi_ber: u32, correlation: u32) -> Result<()> {
        self.dump_stats.push((viterbi_ber, correlation));
        Ok(())
    }
}

/// Owned copy of the interesting parts of one telemetry record.
#[derive(Clone, Debug)]
pub struct Snapshot {
    pub scid: u8,
    pub vcid: u8,
    pub counter: u32,
    pub viterbi_ber: u32,
    pub signal_quality: u8,
    pub correlation: u32,
    pub phase_corr: u16,
    pub total_lost: u64,
    pub dropped: u64,
    pub frames_total: u64,
    pub pos: usize,
    pub received_per_vc: Vec<i64>,
    pub lost_per_vc: Vec<i64>,
}

#[derive(Default)]
pub struct RecordingTelemetry {
    pub records: Vec<Snapshot>,
    pub shows: usize,
}

impl TelemetrySink for RecordingTelemetry {
    fn update(&mut self, telemetry: &Telemetry) {
        self.records.push(Snapshot {
            scid: telemetry.scid,
            vcid: telemetry.vcid,
            counter: telemetry.counter,
            viterbi_ber: telemetry.viterbi_ber,
            signal_quality: telemetry.signal_quality,
            correlation: telemetry.correlation,
            phase_corr: telemetry.phase_corr,
            total_lost: telemetry.total_lost,
            dropped: telemetry.dropped,
            frames_total: telemetry.frames_total,
            pos: telemetry.pos,
            received_per_vc: telemetry.received_per_vc.to_vec(),
            lost_per_vc: telemetry.lost_per_vc.to_vec(),
        });
    }

    fn show(&mut self) {
        self.shows += 1;
    }
}
