//! Per-flip diagnostics and end-of-run totals.
//!
//! Every injected upset produces a [`FlipRecord`].  The engine hands
//! records to a [`FlipSink`] when verbose diagnostics are on.  The
//! canonical text form is one line per flip:
//!
//! ```text
//! BF: <description> <type_code> <row> <col> <original> <mask> <flipped>
//! ```
//!
//! with the three words in zero-padded hex sized to the element width.

use crate::region::RegionId;
use bitflips_protocol::ElementType;
use log::info;
use std::fmt;
use std::io::Write;

/// Prefix of every diagnostic line.
pub const LINE_PREFIX: &str = "BF:";

/// One injected upset.
#[derive(Debug, Clone, PartialEq)]
pub struct FlipRecord {
    /// Tick on which the flip happened (1-based).
    pub tick: u64,
    pub region: RegionId,
    pub description: String,
    pub type_code: u32,
    pub element_type: Option<ElementType>,
    pub address: u64,
    pub row: u64,
    pub col: u64,
    /// Element width in bytes.
    pub width: u32,
    pub original: u64,
    pub mask: u64,
    pub flipped: u64,
}

impl FlipRecord {
    /// Number of bits toggled.
    pub fn bits_flipped(&self) -> u32 {
        self.mask.count_ones()
    }

    /// Original and flipped values reinterpreted as IEEE-754, for float
    /// and double regions.
    pub fn float_values(&self) -> Option<(f64, f64)> {
        match self.element_type {
            Some(t) if t.is_float() => Some((
                word_as_float(self.original, self.width)?,
                word_as_float(self.flipped, self.width)?,
            )),
            _ => None,
        }
    }
}

impl fmt::Display for FlipRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = (self.width as usize * 2).max(2);
        write!(
            f,
            "{LINE_PREFIX} {} {} {} {} {:0w$x} {:0w$x} {:0w$x}",
            self.description,
            self.type_code,
            self.row,
            self.col,
            self.original,
            self.mask,
            self.flipped,
            w = digits,
        )
    }
}

/// Reinterpret a 4- or 8-byte word as a float.
pub fn word_as_float(word: u64, width: u32) -> Option<f64> {
    match width {
        4 => Some(f64::from(f32::from_bits(word as u32))),
        8 => Some(f64::from_bits(word)),
        _ => None,
    }
}

/// Receiver of flip records.
pub trait FlipSink {
    fn record(&mut self, record: &FlipRecord);
}

/// Discards every record.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl FlipSink for NullSink {
    fn record(&mut self, _record: &FlipRecord) {}
}

/// Emits each record through `log::info!`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl FlipSink for LogSink {
    fn record(&mut self, record: &FlipRecord) {
        info!("{record}");
    }
}

/// Keeps every record in memory.
#[derive(Debug, Default, Clone)]
pub struct CollectSink {
    pub records: Vec<FlipRecord>,
}

impl CollectSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FlipSink for CollectSink {
    fn record(&mut self, record: &FlipRecord) {
        self.records.push(record.clone());
    }
}

/// Writes each record as a text line.
///
/// Write errors are counted, not propagated: a broken diagnostics pipe must
/// not stop injection.
#[derive(Debug)]
pub struct WriterSink<W: Write> {
    writer: W,
    errors: u64,
}

impl<W: Write> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, errors: 0 }
    }

    /// Number of records that failed to write.
    pub fn errors(&self) -> u64 {
        self.errors
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> FlipSink for WriterSink<W> {
    fn record(&mut self, record: &FlipRecord) {
        if writeln!(self.writer, "{record}").is_err() {
            self.errors += 1;
        }
    }
}

impl<S: FlipSink + ?Sized> FlipSink for &mut S {
    fn record(&mut self, record: &FlipRecord) {
        (**self).record(record);
    }
}

/// Totals reported at the end of a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunSummary {
    pub total_flips: u64,
    pub total_ticks: u64,
    pub failed_flips: u64,
    pub kilobyte_flux: f64,
}

impl RunSummary {
    /// Observed flips per KB per tick (`total_flips / kilobyte_flux`).
    ///
    /// 0 when no monitored memory was ever ticked.
    pub fn empirical_rate(&self) -> f64 {
        if self.kilobyte_flux > 0.0 {
            self.total_flips as f64 / self.kilobyte_flux
        } else {
            0.0
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "-".repeat(57);
        writeln!(f, "{rule}")?;
        writeln!(f, "Total Bit Flips: {}", self.total_flips)?;
        writeln!(f, "Total Instructions: {}", self.total_ticks)?;
        if self.failed_flips > 0 {
            writeln!(f, "Failed Flips: {}", self.failed_flips)?;
        }
        writeln!(f, "Fault Rate: {}", self.empirical_rate())?;
        write!(f, "{rule}")
    }
}
