//! Sync-word correlation over the soft-symbol stream.
//!
//! The coded stream carries one channel bit per soft byte, so a bit offset
//! into the frame is a byte offset into the buffer. The correlator slides a
//! 64-bit hard-decision window across the buffer and scores it against the
//! encoded sync marker under every phase rotation and both I/Q senses. The
//! index of the winning word therefore encodes how the constellation is
//! rotated; see [Ambiguity](super::phase::Ambiguity).

use super::phase::Ambiguity;

/// The encoded ASM under phase rotations 0/90/180/270.
pub const UW: [u64; 4] = [
    0xfca2_b63d_b00d_9794,
    0x56fb_d394_daa4_c1c2,
    0x035d_49c2_4ff2_686b,
    0xa904_2c6b_255b_3e3d,
];

/// The same four words with I and Q swapped.
pub const IQ_UW: [u64; 4] = [
    0xfc51_793e_700e_6b68,
    0xa9f7_e368_e558_c2c1,
    0x03ae_86c1_8ff1_9497,
    0x5608_1c97_1aa7_3d3e,
];

/// Result of one correlation pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SyncMatch {
    /// Bit-agreement score, 0..=64.
    pub correlation: u32,
    /// Offset of the match in soft bytes (equivalently, channel bits).
    pub offset: usize,
    /// Index of the winning reference word.
    word: usize,
}

impl SyncMatch {
    /// The phase/IQ ambiguity the winning word implies.
    #[must_use]
    pub fn ambiguity(&self) -> Ambiguity {
        Ambiguity::from_word(self.word)
    }
}

/// Scores windows of the soft stream against a fixed reference set.
pub struct Correlator {
    words: [u64; 8],
}

impl Default for Correlator {
    fn default() -> Self {
        Self::new()
    }
}

impl Correlator {
    /// A correlator loaded with the Meteor LRPT word set, `UW` then `IQ_UW`.
    /// The order is significant: a word's index encodes its ambiguity.
    pub fn new() -> Self {
        let mut words = [0u64; 8];
        words[..4].copy_from_slice(&UW);
        words[4..].copy_from_slice(&IQ_UW);
        Correlator { words }
    }

    /// Find the best-matching word over every offset of `window`.
    ///
    /// Ties go to the lower offset, then to the lower word index.
    ///
    /// # Panics
    /// If the window holds fewer than 64 soft bytes.
    #[must_use]
    pub fn correlate(&self, window: &[u8]) -> SyncMatch {
        assert!(window.len() >= 64, "window too short to correlate");

        let mut best = SyncMatch {
            correlation: 0,
            offset: 0,
            word: 0,
        };

        let mut bits: u64 = 0;
        for (i, &soft) in window.iter().enumerate() {
            bits = (bits << 1) | u64::from(soft >= 128);
            if i < 63 {
                continue;
            }
            let offset = i - 63;
            for (word, &reference) in self.words.iter().enumerate() {
                let agreement = 64 - (bits ^ reference).count_ones();
                if agreement > best.correlation {
                    best = SyncMatch {
                        correlation: agreement,
                        offset,
                        word,
                    };
                }
            }
        }
        best
    }
}
