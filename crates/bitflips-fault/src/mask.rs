//! Flip-mask construction.
//!
//! [`build_mask`] returns a word with exactly `flip_count` of its low
//! `width_bits` bits set, every position equally likely.  A single flip is
//! one uniform shift; more flips start from the low `flip_count` bits and
//! run a descending Fisher–Yates pass over bit positions, swapping bits in
//! place so the whole permutation lives in one `u64`.

use rand::Rng;

/// Bit widths the engine flips (one per element byte width).
pub const SUPPORTED_WIDTHS: [u32; 4] = [8, 16, 32, 64];

/// Swap the bits at positions `a` and `b` of `word`.
#[inline]
pub const fn swap_bits(word: u64, a: u32, b: u32) -> u64 {
    let diff = ((word >> a) ^ (word >> b)) & 1;
    word ^ ((diff << a) | (diff << b))
}

/// A word with the low `count` bits set.
#[inline]
pub const fn low_bits(count: u32) -> u64 {
    if count >= 64 {
        u64::MAX
    } else {
        (1u64 << count) - 1
    }
}

/// Build a `width_bits`-wide mask with exactly `flip_count` bits set.
///
/// `flip_count` is clamped to `width_bits`; a count of 0 yields an empty
/// mask and consumes no randomness.
pub fn build_mask<R: Rng + ?Sized>(rng: &mut R, width_bits: u32, flip_count: u32) -> u64 {
    debug_assert!(
        SUPPORTED_WIDTHS.contains(&width_bits),
        "unsupported flip width {width_bits}"
    );
    let flip_count = flip_count.min(width_bits);

    match flip_count {
        0 => 0,
        1 => 1u64 << rng.gen_range(0..width_bits),
        _ => {
            let mut mask = low_bits(flip_count);
            for i in (1..width_bits).rev() {
                let j = rng.gen_range(0..=i);
                mask = swap_bits(mask, i, j);
            }
            debug_assert_eq!(mask.count_ones(), flip_count);
            debug_assert_eq!(mask & !low_bits(width_bits), 0);
            mask
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn swap_bits_exchanges_values() {
        assert_eq!(swap_bits(0b0001, 0, 3), 0b1000);
        assert_eq!(swap_bits(0b1001, 0, 3), 0b1001);
        assert_eq!(swap_bits(0b0110, 1, 1), 0b0110);
        assert_eq!(swap_bits(1, 0, 63), 1 << 63);
    }

    #[test]
    fn low_bits_saturates_at_word_size() {
        assert_eq!(low_bits(0), 0);
        assert_eq!(low_bits(3), 0b111);
        assert_eq!(low_bits(64), u64::MAX);
    }

    #[test]
    fn popcount_matches_flip_count_for_every_width() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        for width in SUPPORTED_WIDTHS {
            for flips in 1..=width {
                for _ in 0..8 {
                    let mask = build_mask(&mut rng, width, flips);
                    assert_eq!(mask.count_ones(), flips, "width={width} flips={flips}");
                    assert_eq!(mask & !low_bits(width), 0, "mask escapes width {width}");
                }
            }
        }
    }

    #[test]
    fn zero_flips_is_empty_mask() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        assert_eq!(build_mask(&mut rng, 32, 0), 0);
    }

    #[test]
    fn flip_count_above_width_is_clamped() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        assert_eq!(build_mask(&mut rng, 8, 12), 0xFF);
    }

    #[test]
    fn single_flip_covers_every_position() {
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let mut seen = 0u64;
        for _ in 0..5_000 {
            seen |= build_mask(&mut rng, 64, 1);
        }
        assert_eq!(seen, u64::MAX);
    }

    #[test]
    fn three_flips_are_uniform_over_64_positions() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let draws = 100_000u32;
        let mut hits = [0u32; 64];
        for _ in 0..draws {
            let mask = build_mask(&mut rng, 64, 3);
            for (pos, hit) in hits.iter_mut().enumerate() {
                *hit += ((mask >> pos) & 1) as u32;
            }
        }
        let expected = 3.0 / 64.0;
        for (pos, &hit) in hits.iter().enumerate() {
            let freq = f64::from(hit) / f64::from(draws);
            // sigma is about 0.00067 at this sample size
            assert!(
                (freq - expected).abs() < 0.004,
                "bit {pos}: {freq} vs {expected}"
            );
        }
    }

    #[test]
    fn xor_with_mask_has_hamming_distance_flip_count() {
        let mut rng = ChaCha8Rng::seed_from_u64(6);
        let original: u64 = 0xDEAD_BEEF;
        for flips in 1..=7 {
            let mask = build_mask(&mut rng, 32, flips);
            let flipped = original ^ mask;
            assert_eq!((original ^ flipped).count_ones(), flips);
        }
    }
}
