//! Utility functions.

/// Divisor prepared for Lemire's fast modulo reduction of 64-bit integers.
///
/// See: D. Lemire, O. Kaser, N. Kurz, *Faster Remainder by Direct Computation: Applications to Compilers and Software Libraries*,
/// Software: Practice and Experience 49 (6), 2019.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FastMod {
    m: u128,
    d: u64,
}

impl FastMod {
    /// Prepares reduction modulo `d`, which must be positive.
    #[inline]
    pub fn new(d: u64) -> Self {
        debug_assert!(d > 0, "FastMod: divisor must be positive");
        Self { m: (u128::MAX / d as u128).wrapping_add(1), d }
    }

    /// Returns the divisor.
    #[inline(always)] pub fn divisor(&self) -> u64 { self.d }

    /// Returns `a % self.divisor()`.
    #[inline(always)]
    pub fn reduce(&self, a: u64) -> u64 {
        let lowbits = self.m.wrapping_mul(a as u128);
        let bottom_half = ((lowbits as u64 as u128) * self.d as u128) >> 64;
        let top_half = (lowbits >> 64) * self.d as u128;
        ((bottom_half + top_half) >> 64) as u64
    }
}

/// Mixes `value` with `seed` into a well distributed 64-bit hash.
///
/// For a fixed `seed`, the function is a bijection of `value`.
#[inline]
pub fn hash64(value: u64, seed: u64) -> u64 {
    mix64(value.wrapping_mul(0x9E37_79B9_7F4A_7C15) ^ seed)
}

/// SplitMix64 finalizer. Each bit of the result depends on all bits of `x`.
#[inline(always)]
pub fn mix64(mut x: u64) -> u64 {
    x = (x ^ (x >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    x ^ (x >> 31)
}

/// Replaces each element of `values` by the sum of the preceding ones. Returns the total.
#[inline]
pub(crate) fn accumulative_sum<'a>(values: impl IntoIterator<Item = &'a mut usize>) -> usize {
    let mut sum = 0;
    for v in values {
        let inc = *v; *v = sum; sum += inc;
    }
    sum
}

/// Runs `f` in a thread pool with given number of `threads`.
///
/// `0` means the global [rayon] pool. If a dedicated pool cannot be created, the global one is used.
pub(crate) fn with_threads<R: Send>(threads: usize, f: impl FnOnce() -> R + Send) -> R {
    if threads == 0 { return f(); }
    match rayon::ThreadPoolBuilder::new().num_threads(threads).build() {
        Ok(pool) => pool.install(f),
        Err(e) => {
            tracing::warn!("cannot create a pool of {threads} threads ({e}), the global pool is used instead");
            f()
        }
    }
}
