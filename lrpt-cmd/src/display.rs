//! Telemetry presentation: a live terminal panel and a JSON-lines mode.

use std::io::{stdout, Write};

use lrpt::pipeline::TelemetrySink;
use lrpt::stats::Telemetry;

/// Owned copy of the latest record, refreshed every frame.
#[derive(Clone, Default)]
struct Record {
    scid: u8,
    vcid: u8,
    counter: u32,
    viterbi_ber: u32,
    frame_bits: usize,
    rs_errors: [i32; 4],
    signal_quality: u8,
    correlation: u32,
    phase_corr: u16,
    total_lost: u64,
    avg_viterbi_ber: u16,
    avg_rs_corrections: u8,
    dropped: u64,
    frames_total: u64,
    pos: usize,
    per_vc: Vec<(u8, i64, i64)>,
}

/// Fixed-layout status panel redrawn in place once per frame.
pub struct TerminalDisplay {
    current: Record,
    cleared: bool,
}

impl Default for TerminalDisplay {
    fn default() -> Self {
        Self::new()
    }
}

impl TerminalDisplay {
    pub fn new() -> Self {
        TerminalDisplay {
            current: Record::default(),
            cleared: false,
        }
    }

    fn render(&self, out: &mut impl Write) -> std::io::Result<()> {
        let r = &self.current;
        // phase field carries the I/Q flag in its low bit
        let iq = r.phase_corr % 2 == 1;
        let degrees = r.phase_corr - u16::from(iq);

        writeln!(out, "Meteor LRPT Decoder")?;
        writeln!(out, "-------------------------------------------------------------")?;
        writeln!(
            out,
            " SCID {:<5} VCID {:<5} Counter {:<10}",
            r.scid, r.vcid, r.counter
        )?;
        writeln!(
            out,
            " Viterbi BER {:>6} / {} bits      Signal quality {:>3}%",
            r.viterbi_ber, r.frame_bits, r.signal_quality
        )?;
        writeln!(
            out,
            " RS corrections {:?}            Correlation {:>2}/64",
            r.rs_errors, r.correlation
        )?;
        writeln!(
            out,
            " Phase correction {:>3} deg  IQ {:<5}  Sync offset {:<6}",
            degrees,
            if iq { "yes" } else { "no" },
            r.pos
        )?;
        writeln!(
            out,
            " Frames {:<8} Dropped {:<6} Lost packets {:<8}",
            r.frames_total, r.dropped, r.total_lost
        )?;
        writeln!(
            out,
            " Averages: Viterbi BER {:<6} RS corrections {:<4}",
            r.avg_viterbi_ber, r.avg_rs_corrections
        )?;
        writeln!(out, " VCID   received       lost")?;
        for (vcid, received, lost) in &r.per_vc {
            writeln!(out, " {vcid:>4} {received:>10} {lost:>10}")?;
        }
        Ok(())
    }
}

impl TelemetrySink for TerminalDisplay {
    fn update(&mut self, telemetry: &Telemetry) {
        let per_vc = (0..telemetry.received_per_vc.len())
            .filter(|&v| telemetry.received_per_vc[v] >= 0)
            .map(|v| {
                (
                    v as u8,
                    telemetry.received_per_vc[v],
                    telemetry.lost_per_vc[v],
                )
            })
            .collect();

        self.current = Record {
            scid: telemetry.scid,
            vcid: telemetry.vcid,
            counter: telemetry.counter,
            viterbi_ber: telemetry.viterbi_ber,
            frame_bits: telemetry.frame_bits,
            rs_errors: telemetry.rs_errors,
            signal_quality: telemetry.signal_quality,
            correlation: telemetry.correlation,
            phase_corr: telemetry.phase_corr,
            total_lost: telemetry.total_lost,
            avg_viterbi_ber: telemetry.avg_viterbi_ber,
            avg_rs_corrections: telemetry.avg_rs_corrections,
            dropped: telemetry.dropped,
            frames_total: telemetry.frames_total,
            pos: telemetry.pos,
            per_vc,
        };
    }

    fn show(&mut self) {
        let mut out = stdout();
        // clear once, then repaint from home so the panel does not scroll
        if !self.cleared {
            let _ = write!(out, "\x1b[2J");
            self.cleared = true;
        }
        let _ = write!(out, "\x1b[H");
        let _ = self.render(&mut out);
        let _ = out.flush();
    }
}

/// One JSON object per frame on stdout, for piping into other tools.
pub struct JsonTelemetry;

impl TelemetrySink for JsonTelemetry {
    fn update(&mut self, telemetry: &Telemetry) {
        match serde_json::to_string(telemetry) {
            Ok(line) => println!("{line}"),
            Err(err) => tracing::warn!("failed to serialize telemetry: {err}"),
        }
    }

    fn show(&mut self) {
        let _ = stdout().flush();
    }
}
