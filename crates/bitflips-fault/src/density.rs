//! How many bits a single upset flips.
//!
//! Empirically most SEUs flip one bit, about a third flip two, and a thin
//! tail reaches seven.  [`BIT_FLIP_DENSITY`] encodes that as inclusive
//! percentile ranges over `0..=99`; [`sample_bit_count`] maps a roll to a
//! bit count by first match in table order.

use rand::Rng;

/// One row of the density table: `bits` flips for rolls in `lo..=hi`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DensityBand {
    pub bits: u32,
    pub lo: u32,
    pub hi: u32,
}

impl DensityBand {
    const fn new(bits: u32, lo: u32, hi: u32) -> Self {
        Self { bits, lo, hi }
    }

    /// Whether `roll` falls in this band.
    pub const fn contains(&self, roll: u32) -> bool {
        roll >= self.lo && roll <= self.hi
    }
}

/// Percentile bands, scanned in order.
///
/// The 4-bit and 5-bit bands both claim 97; first match wins, so 5 bits
/// is never selected.
pub const BIT_FLIP_DENSITY: [DensityBand; 7] = [
    DensityBand::new(1, 0, 60),
    DensityBand::new(2, 61, 90),
    DensityBand::new(3, 91, 95),
    DensityBand::new(4, 96, 97),
    DensityBand::new(5, 97, 97),
    DensityBand::new(6, 98, 98),
    DensityBand::new(7, 99, 99),
];

/// Largest bit count the table can return.
pub const MAX_BITS_PER_UPSET: u32 = 7;

/// Map a percentile roll in `0..=99` to a bit count in `1..=7`.
///
/// Returns 0 only for a roll outside every band, which the table above
/// never allows for valid input.
pub fn sample_bit_count(roll: u32) -> u32 {
    BIT_FLIP_DENSITY
        .iter()
        .find(|band| band.contains(roll))
        .map_or(0, |band| band.bits)
}

/// Draw a fresh roll from `rng` and map it through the table.
pub fn draw_bit_count<R: Rng + ?Sized>(rng: &mut R) -> u32 {
    sample_bit_count(rng.gen_range(0..100))
}
