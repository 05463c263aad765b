//! Float rendering for diagnostic lines.
//!
//! Flip records print words in hex.  For `float` and `double` regions
//! [`decode_line`] rewrites the original and flipped words as decimal
//! floats (8 hex digits as `f32`, 16 as `f64`), leaving the mask in hex.
//! All other lines pass through unchanged.

use bitflips_fault::report::LINE_PREFIX;
use bitflips_protocol::ElementType;
use log::warn;
use snafu::{ResultExt, Snafu};
use std::io::{BufRead, Write};

/// Errors from decoding diagnostic lines.
#[derive(Debug, Snafu)]
pub enum DecodeError {
    #[snafu(display("I/O error"), context(false))]
    Io { source: std::io::Error },

    #[snafu(display("truncated diagnostic line {line:?}"))]
    Truncated { line: String },

    #[snafu(display("bad hex word {word:?}"))]
    Hex {
        word: String,
        source: std::num::ParseIntError,
    },

    #[snafu(display("no float is {digits} hex digits wide"))]
    Width { digits: usize },
}

/// Line counts from [`decode_stream`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeStats {
    pub lines: u64,
    pub rewritten: u64,
    pub malformed: u64,
}

/// Reinterpret a hex word as a float and render it.
pub fn hex_to_float(word: &str) -> Result<String, DecodeError> {
    match word.len() {
        8 => {
            let bits = u32::from_str_radix(word, 16).context(HexSnafu { word })?;
            Ok(f32::from_bits(bits).to_string())
        }
        16 => {
            let bits = u64::from_str_radix(word, 16).context(HexSnafu { word })?;
            Ok(f64::from_bits(bits).to_string())
        }
        digits => WidthSnafu { digits }.fail(),
    }
}

/// Rewrite one line.  Lines without the diagnostic prefix, and diagnostic
/// lines for non-float regions, come back unchanged.
pub fn decode_line(line: &str) -> Result<String, DecodeError> {
    if !line.contains(LINE_PREFIX) {
        return Ok(line.to_string());
    }

    // The description may contain spaces, so fields are taken from the end:
    // <head...> <type> <row> <col> <original> <mask> <flipped>
    let truncated = || TruncatedSnafu { line }.build();
    let mut tail = line.trim_end().rsplitn(4, ' ');
    let flipped = tail.next().ok_or_else(truncated)?;
    let mask = tail.next().ok_or_else(truncated)?;
    let original = tail.next().ok_or_else(truncated)?;
    let head = tail.next().ok_or_else(truncated)?;

    let type_code = head
        .rsplitn(4, ' ')
        .nth(2)
        .and_then(|t| t.parse::<u32>().ok())
        .ok_or_else(truncated)?;

    match ElementType::from_code(type_code) {
        Some(element) if element.is_float() => Ok(format!(
            "{head} {} {mask} {}",
            hex_to_float(original)?,
            hex_to_float(flipped)?
        )),
        _ => Ok(line.to_string()),
    }
}

/// Rewrite every line of `input` into `output`.
///
/// A malformed diagnostic line is logged and copied through as-is.
pub fn decode_stream<R: BufRead, W: Write>(
    input: R,
    mut output: W,
) -> Result<DecodeStats, DecodeError> {
    let mut stats = DecodeStats::default();
    for line in input.lines() {
        let line = line?;
        stats.lines += 1;
        let rendered = match decode_line(&line) {
            Ok(rendered) => {
                if rendered != line {
                    stats.rewritten += 1;
                }
                rendered
            }
            Err(err) => {
                warn!("{err}: {line}");
                stats.malformed += 1;
                line
            }
        };
        writeln!(output, "{rendered}")?;
    }
    output.flush()?;
    Ok(stats)
}
