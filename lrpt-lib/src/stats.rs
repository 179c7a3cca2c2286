//! Link statistics: per-virtual-channel accounting and the per-frame
//! telemetry snapshot pushed to the display.

use serde::Serialize;

use crate::framing::{VcduHeader, RS_BLOCKS};

/// Gaps larger than this are treated as a counter resync rather than loss.
const RESYNC_GAP: u32 = 1 << 20;

/// Running link state across a session.
///
/// Virtual channel tables are indexed directly by VCID. `last_counter` and
/// `received` use `-1` as the never-seen marker, so the first frame on a
/// channel sets the received count to one and attributes no loss.
pub struct LinkStats {
    last_counter: [i64; 256],
    received: [i64; 256],
    lost: [i64; 256],
    pub frames_total: u64,
    pub dropped: u64,
    pub total_lost: u64,
    sum_viterbi_ber: u64,
    sum_rs_corrections: u64,
}

impl Default for LinkStats {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkStats {
    pub fn new() -> Self {
        LinkStats {
            last_counter: [-1i64; 256],
            received: [-1i64; 256],
            lost: [0i64; 256],
            frames_total: 0,
            dropped: 0,
            total_lost: 0,
            sum_viterbi_ber: 0,
            sum_rs_corrections: 0,
        }
    }

    /// Record a frame that made it through the Viterbi stage, dropped by
    /// Reed-Solomon or not. Windows without lock are never recorded, so the
    /// BER average stays meaningful.
    pub fn record_frame(&mut self, viterbi_ber: u32) {
        self.frames_total += 1;
        self.sum_viterbi_ber += u64::from(viterbi_ber);
    }

    /// Add the corrected-symbol counts of an accepted frame. Failed columns
    /// report `-1` and contribute nothing.
    pub fn record_rs(&mut self, derrors: &[i32; RS_BLOCKS]) {
        for &d in derrors {
            if d > 0 {
                self.sum_rs_corrections += d as u64;
            }
        }
    }

    pub fn record_drop(&mut self) {
        self.dropped += 1;
    }

    /// Account an accepted frame against its virtual channel and return the
    /// number of frames lost since the last one seen on that channel.
    ///
    /// The 24-bit counter wraps; gaps are computed in that modulus. A gap
    /// beyond `RESYNC_GAP` (which covers every backward step) is treated as
    /// a counter resync and attributes no loss.
    pub fn account(&mut self, header: &VcduHeader) -> u32 {
        let vcid = header.vcid as usize;
        let counter = i64::from(header.counter);

        let last = self.last_counter[vcid];
        self.last_counter[vcid] = counter;
        self.received[vcid] = if self.received[vcid] == -1 {
            1
        } else {
            self.received[vcid] + 1
        };

        if last == -1 {
            return 0;
        }

        let gap = (counter - last - 1).rem_euclid(i64::from(VcduHeader::COUNTER_MODULUS)) as u32;
        if gap == 0 || gap > RESYNC_GAP {
            return 0;
        }
        self.total_lost += u64::from(gap);
        self.lost[vcid] += i64::from(gap);
        gap
    }

    /// Whole-session Viterbi BER average, in bits per frame.
    #[must_use]
    pub fn avg_viterbi_ber(&self) -> u16 {
        if self.frames_total == 0 {
            return 0;
        }
        (self.sum_viterbi_ber / self.frames_total) as u16
    }

    /// Whole-session Reed-Solomon corrections average, in symbols per frame.
    #[must_use]
    pub fn avg_rs_corrections(&self) -> u8 {
        if self.frames_total == 0 {
            return 0;
        }
        (self.sum_rs_corrections / self.frames_total) as u8
    }

    #[must_use]
    pub fn received_per_vc(&self) -> &[i64; 256] {
        &self.received
    }

    #[must_use]
    pub fn lost_per_vc(&self) -> &[i64; 256] {
        &self.lost
    }
}

/// One display record, pushed after every processed frame.
#[derive(Clone, Debug, Serialize)]
pub struct Telemetry<'a> {
    pub scid: u8,
    pub vcid: u8,
    pub counter: u32,
    pub viterbi_ber: u32,
    pub frame_bits: usize,
    pub rs_errors: [i32; RS_BLOCKS],
    /// 0..=100, derived from the Viterbi BER.
    pub signal_quality: u8,
    pub correlation: u32,
    /// Phase correction in degrees with the I/Q flag in the low bit.
    pub phase_corr: u16,
    pub total_lost: u64,
    pub avg_viterbi_ber: u16,
    pub avg_rs_corrections: u8,
    pub dropped: u64,
    pub received_per_vc: &'a [i64],
    pub lost_per_vc: &'a [i64],
    pub frames_total: u64,
    /// Sync offset of this frame in the window, in soft bytes.
    pub pos: usize,
}

/// Signal quality shown to the user: `100 - 10 * percent_ber`, clamped.
#[must_use]
pub fn signal_quality(percent_ber: f32) -> u8 {
    (100.0 - percent_ber * 10.0).clamp(0.0, 100.0) as u8
}
