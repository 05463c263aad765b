//! Poisson-distributed event counts.
//!
//! Used by [`FaultCountModel::Poisson`](crate::engine::FaultCountModel) as
//! an alternative to carrying fractional faults between ticks.  Small rates
//! use the multiplication method; rates of 10 and above use Hörmann's
//! transformed rejection with squeeze (PTRS), "The transformed rejection
//! method for generating Poisson random variables", 1993.
//!
//! The uniform source is any `FnMut() -> f64` yielding values in `[0, 1)`.

use std::f64::consts::PI;

/// Rate at which the sampler switches to transformed rejection.
pub const PTRS_THRESHOLD: f64 = 10.0;

/// Coefficients of the Stirling series used by [`log_gamma`].
const LOG_GAMMA_COEFFS: [f64; 10] = [
    8.333333333333333e-02,
    -2.777777777777778e-03,
    7.936507936507937e-04,
    -5.952380952380952e-04,
    8.417508417508418e-04,
    -1.917526917526918e-03,
    6.410256410256410e-03,
    -2.955065359477124e-02,
    1.796443723688307e-01,
    -1.39243221690590e+00,
];

/// `ln Γ(x)` for `x > 0` (Zhang & Jin, *Computation of Special Functions*).
pub fn log_gamma(x: f64) -> f64 {
    if x == 1.0 || x == 2.0 {
        return 0.0;
    }

    // Shift small arguments up to 7 where the series converges, then
    // step back down with the recurrence.
    let shift = if x <= 7.0 { (7.0 - x) as i32 } else { 0 };
    let mut x0 = x + f64::from(shift);

    let x2 = 1.0 / (x0 * x0);
    let series = LOG_GAMMA_COEFFS
        .iter()
        .rev()
        .skip(1)
        .fold(LOG_GAMMA_COEFFS[9], |acc, &c| acc * x2 + c);

    let mut gl = series / x0 + 0.5 * (2.0 * PI).ln() + (x0 - 0.5) * x0.ln() - x0;
    for _ in 0..shift {
        gl -= (x0 - 1.0).ln();
        x0 -= 1.0;
    }
    gl
}

/// Draw a Poisson variate with mean `lambda`.
///
/// Returns 0 for `lambda <= 0` or a non-finite `lambda`.
pub fn poisson<F: FnMut() -> f64>(lambda: f64, mut next_double: F) -> u64 {
    if !lambda.is_finite() || lambda <= 0.0 {
        0
    } else if lambda >= PTRS_THRESHOLD {
        poisson_ptrs(lambda, &mut next_double)
    } else {
        poisson_mult(lambda, &mut next_double)
    }
}

fn poisson_mult<F: FnMut() -> f64>(lambda: f64, next_double: &mut F) -> u64 {
    let enlam = (-lambda).exp();
    let mut count = 0;
    let mut prod = 1.0;
    loop {
        prod *= next_double();
        if prod > enlam {
            count += 1;
        } else {
            return count;
        }
    }
}

fn poisson_ptrs<F: FnMut() -> f64>(lambda: f64, next_double: &mut F) -> u64 {
    let slam = lambda.sqrt();
    let loglam = lambda.ln();
    let b = 0.931 + 2.53 * slam;
    let a = -0.059 + 0.02483 * b;
    let invalpha = 1.1239 + 1.1328 / (b - 3.4);
    let vr = 0.9277 - 3.6224 / (b - 2.0);

    loop {
        let u = next_double() - 0.5;
        let v = next_double();
        let us = 0.5 - u.abs();
        let k = ((2.0 * a / us + b) * u + lambda + 0.43).floor();

        if us >= 0.07 && v <= vr {
            return k as u64;
        }
        if k < 0.0 || (us < 0.013 && v > us) {
            continue;
        }
        // ln(0) = -inf is fine here: the comparison then accepts.
        if v.ln() + invalpha.ln() - (a / (us * us) + b).ln()
            <= -lambda + k * loglam - log_gamma(k + 1.0)
        {
            return k as u64;
        }
    }
}
