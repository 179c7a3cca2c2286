//! Soft-decision Viterbi decoding of the k=7, rate-1/2 convolutional code.
//!
//! Generators are G1 = 0x4F and G2 = 0x6D with both encoder outputs
//! inverted, the convention the Meteor downlink uses; the published sync
//! words fall out of exactly this encoder (see the tests). Each received
//! soft byte is one channel bit, 128 neutral, values at or above 128 read
//! as a hard one.

const G1: u8 = 0x4f;
const G2: u8 = 0x6d;

/// Trellis states: 2^(k-1).
const STATES: usize = 64;

const fn parity(mut v: u8) -> u8 {
    v ^= v >> 4;
    v ^= v >> 2;
    v ^= v >> 1;
    v & 1
}

const fn build_symbols() -> [u8; 2 * STATES] {
    let mut syms = [0u8; 2 * STATES];
    let mut r = 0;
    while r < 2 * STATES {
        let c1 = parity(r as u8 & G1) ^ 1;
        let c2 = parity(r as u8 & G2) ^ 1;
        syms[r] = (c1 << 1) | c2;
        r += 1;
    }
    syms
}

/// Output bit pair for each 7-bit register value, G1 bit high.
const SYMBOLS: [u8; 2 * STATES] = build_symbols();

/// Convolutionally encode `data` MSB-first from a zeroed register.
///
/// Two output bits are produced per input bit, one per byte of `symbols`
/// (each 0 or 1), G1 first.
pub fn encode(data: &[u8], symbols: &mut [u8]) {
    debug_assert_eq!(symbols.len(), data.len() * 16);

    let mut sr: usize = 0;
    let mut idx = 0;
    for &byte in data {
        for bit in (0..8).rev() {
            sr = ((sr << 1) | ((byte >> bit) & 1) as usize) & 0x7f;
            let sym = SYMBOLS[sr];
            symbols[idx] = sym >> 1;
            symbols[idx + 1] = sym & 1;
            idx += 2;
        }
    }
}

/// Soft-decision decoder with full-frame traceback.
///
/// The decision history is allocated once and reused; decoding a frame does
/// not touch the heap after construction.
pub struct Viterbi {
    decisions: Vec<u64>,
    metrics: [i32; STATES],
    next_metrics: [i32; STATES],
    ber: u32,
    steps: usize,
}

impl Viterbi {
    /// A decoder with history capacity for `frame_bits` decoded bits.
    pub fn new(frame_bits: usize) -> Self {
        Viterbi {
            decisions: vec![0u64; frame_bits],
            metrics: [0i32; STATES],
            next_metrics: [0i32; STATES],
            ber: 0,
            steps: 0,
        }
    }

    /// Decode `soft` (two soft bits per data bit) into `out`.
    ///
    /// The encoder runs across frame boundaries, so no start or end state is
    /// assumed: all states start with equal metrics and traceback begins at
    /// the best final metric.
    ///
    /// # Panics
    /// If `soft` is not exactly `16 * out.len()` bytes.
    pub fn decode(&mut self, soft: &[u8], out: &mut [u8]) {
        assert_eq!(soft.len(), out.len() * 16, "soft/output length mismatch");
        let steps = soft.len() / 2;
        self.steps = steps;
        if self.decisions.len() < steps {
            self.decisions.resize(steps, 0);
        }

        self.metrics = [0i32; STATES];
        for t in 0..steps {
            let m1 = [i32::from(!soft[2 * t]), i32::from(soft[2 * t])];
            let m2 = [i32::from(!soft[2 * t + 1]), i32::from(soft[2 * t + 1])];
            let branch = [
                m1[0] + m2[0],
                m1[0] + m2[1],
                m1[1] + m2[0],
                m1[1] + m2[1],
            ];

            let mut decision: u64 = 0;
            for s in 0..STATES {
                // predecessors s>>1 and 32|(s>>1); register values s and 64|s
                let v0 = self.metrics[s >> 1] + branch[SYMBOLS[s] as usize];
                let v1 = self.metrics[(STATES >> 1) | (s >> 1)]
                    + branch[SYMBOLS[STATES + s] as usize];
                if v1 > v0 {
                    decision |= 1 << s;
                    self.next_metrics[s] = v1;
                } else {
                    self.next_metrics[s] = v0;
                }
            }
            self.decisions[t] = decision;
            std::mem::swap(&mut self.metrics, &mut self.next_metrics);
        }

        // Traceback from the best surviving path
        let mut state = (0..STATES)
            .max_by_key(|&s| self.metrics[s])
            .unwrap_or_default();
        out.fill(0);
        for t in (0..steps).rev() {
            out[t >> 3] |= ((state & 1) as u8) << (7 - (t & 7));
            let diverged = (self.decisions[t] >> state) & 1 == 1;
            state = if diverged {
                (STATES >> 1) | (state >> 1)
            } else {
                state >> 1
            };
        }

        // Re-encode the winning path from its own start state and count
        // disagreements with the received hard decisions
        let mut sr = state;
        let mut ber = 0u32;
        for t in 0..steps {
            let bit = (out[t >> 3] >> (7 - (t & 7))) & 1;
            sr = ((sr << 1) | bit as usize) & 0x7f;
            let sym = SYMBOLS[sr];
            ber += u32::from(sym >> 1 != soft[2 * t] >> 7);
            ber += u32::from(sym & 1 != soft[2 * t + 1] >> 7);
        }
        self.ber = ber;
    }

    /// Disagreements between the received hard decisions and the re-encoded
    /// winning path, in bits.
    #[must_use]
    pub fn ber(&self) -> u32 {
        self.ber
    }

    /// [Self::ber] scaled into the 0..16 range the signal-quality readout
    /// expects: 0 for a clean frame, 16 when every coded bit disagrees.
    #[must_use]
    pub fn percent_ber(&self) -> f32 {
        if self.steps == 0 {
            return 0.0;
        }
        8.0 * self.ber as f32 / self.steps as f32
    }
}
