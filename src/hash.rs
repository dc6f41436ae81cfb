//! Deterministic scalar hash used as the tree's only noise source.
//!
//! `hash(x) = fract(sin(127.1·x) · 43758.5453)`.  It is cheap, pure and
//! reproducible across runs on the same platform, which is all the branch
//! generator needs: identical seeds must yield identical topology.  It is
//! not a quality noise function; nearby inputs are correlated and the
//! output clusters.
//!
//! Evaluated in `f64` because the large multiplier discards most of the
//! mantissa of an `f32` sine.

/// Frequency applied to the input before taking the sine.
const HASH_FREQ: f64 = 127.1;

/// Amplification that pushes the informative sine digits into the fraction.
const HASH_GAIN: f64 = 43_758.545_3;

/// Map `x` to a pseudo-random value in `[0, 1)`.
#[inline]
pub fn hash(x: f64) -> f64 {
    let s = (x * HASH_FREQ).sin() * HASH_GAIN;
    let f = s - s.floor();
    // fract can round up to exactly 1.0 for tiny negative `s`, and a
    // non-finite `x` makes the sine NaN.
    if (0.0..1.0).contains(&f) { f } else { 0.0 }
}

/// Hash centred on zero: a value in `[-0.5, 0.5)`.
#[inline]
pub fn hash_centered(x: f64) -> f64 {
    hash(x) - 0.5
}
