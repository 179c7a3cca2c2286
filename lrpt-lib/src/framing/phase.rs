//! QPSK phase and I/Q ambiguity recovery.
//!
//! A locked demodulator can settle on any of the four constellation
//! rotations and may have I and Q swapped. The correlator detects which
//! combination is present from the winning sync word; the fixer applies the
//! inverse to every soft-symbol pair so the rest of the chain always sees
//! the canonical orientation.

/// Constellation rotation detected at the correlator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Phase {
    #[must_use]
    pub fn degrees(&self) -> u16 {
        match self {
            Phase::Deg0 => 0,
            Phase::Deg90 => 90,
            Phase::Deg180 => 180,
            Phase::Deg270 => 270,
        }
    }
}

/// The full receive-side ambiguity: rotation plus optional I/Q swap.
///
/// Correlation word `w` encodes the rotation in `w % 4` and the swap in
/// `w / 4`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ambiguity {
    pub phase: Phase,
    pub iq_inverted: bool,
}

impl Ambiguity {
    #[must_use]
    pub fn from_word(word: usize) -> Self {
        let phase = match word % 4 {
            0 => Phase::Deg0,
            1 => Phase::Deg90,
            2 => Phase::Deg180,
            _ => Phase::Deg270,
        };
        Ambiguity {
            phase,
            iq_inverted: word >= 4,
        }
    }

    /// The display encoding of the correction: degrees with the I/Q flag
    /// folded into the low bit.
    #[must_use]
    pub fn display_code(&self) -> u16 {
        self.phase.degrees() + u16::from(self.iq_inverted)
    }
}

/// Undo the detected ambiguity over a buffer of `(i, q)` soft pairs,
/// in place.
///
/// Soft negation is bitwise complement: bytes are offset-128 values, so
/// `!s` mirrors around the hard-decision boundary.
pub fn fix_symbols(buf: &mut [u8], ambiguity: Ambiguity) {
    debug_assert_eq!(buf.len() % 2, 0, "soft symbols come in pairs");

    if ambiguity.iq_inverted {
        for pair in buf.chunks_exact_mut(2) {
            pair.swap(0, 1);
        }
    }

    match ambiguity.phase {
        Phase::Deg0 => {}
        // transmitted (i, q) arrived as (!q, i)
        Phase::Deg90 => {
            for pair in buf.chunks_exact_mut(2) {
                let (i, q) = (pair[0], pair[1]);
                pair[0] = q;
                pair[1] = !i;
            }
        }
        Phase::Deg180 => {
            for soft in buf.iter_mut() {
                *soft = !*soft;
            }
        }
        // transmitted (i, q) arrived as (q, !i)
        Phase::Deg270 => {
            for pair in buf.chunks_exact_mut(2) {
                let (i, q) = (pair[0], pair[1]);
                pair[0] = !q;
                pair[1] = i;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Forward channel rotation by 90 degrees: `(i, q) -> (!q, i)`.
    fn rotate_90(buf: &mut [u8]) {
        for pair in buf.chunks_exact_mut(2) {
            let (i, q) = (pair[0], pair[1]);
            pair[0] = !q;
            pair[1] = i;
        }
    }

    fn swap_iq(buf: &mut [u8]) {
        for pair in buf.chunks_exact_mut(2) {
            pair.swap(0, 1);
        }
    }

    #[test]
    fn word_index_decodes_to_phase_and_iq() {
        let a = Ambiguity::from_word(0);
        assert_eq!((a.phase, a.iq_inverted), (Phase::Deg0, false));
        let a = Ambiguity::from_word(3);
        assert_eq!((a.phase, a.iq_inverted), (Phase::Deg270, false));
        let a = Ambiguity::from_word(6);
        assert_eq!((a.phase, a.iq_inverted), (Phase::Deg180, true));
    }

    #[test]
    fn display_code_folds_iq_into_degrees() {
        assert_eq!(Ambiguity::from_word(2).display_code(), 180);
        assert_eq!(Ambiguity::from_word(6).display_code(), 181);
        assert_eq!(Ambiguity::from_word(4).display_code(), 1);
    }

    #[test]
    fn fix_undoes_every_rotation() {
        let original: Vec<u8> = (0..64u16).map(|v| (v * 4) as u8).collect();

        for word in 0..4 {
            let mut buf = original.clone();
            for _ in 0..word {
                rotate_90(&mut buf);
            }
            fix_symbols(&mut buf, Ambiguity::from_word(word));
            assert_eq!(buf, original, "rotation {}", word * 90);
        }
    }

    #[test]
    fn fix_undoes_iq_swap_with_rotation() {
        let original: Vec<u8> = (0..64u16).map(|v| (255 - v * 3) as u8).collect();

        for word in 4..8 {
            let mut buf = original.clone();
            for _ in 0..(word - 4) {
                rotate_90(&mut buf);
            }
            swap_iq(&mut buf);
            fix_symbols(&mut buf, Ambiguity::from_word(word));
            assert_eq!(buf, original, "word {word}");
        }
    }

    #[test]
    fn deg180_is_soft_complement() {
        let mut buf = vec![0u8, 255, 128, 127];
        fix_symbols(
            &mut buf,
            Ambiguity {
                phase: Phase::Deg180,
                iq_inverted: false,
            },
        );
        assert_eq!(buf, vec![255, 0, 127, 128]);
    }
}
