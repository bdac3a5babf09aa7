//! Functions that map 64-bit hashes to buckets.

use std::{io, marker::PhantomData};
use binout::{AsIs, Serializer};
use dyn_size_of::GetSize;

use crate::encoding::{invalid_data, Persist};
use crate::utils::FastMod;

/// Maps 64-bit hashes to buckets in the range `[0, num_buckets)`.
pub trait Bucketer: Persist + GetSize + Send + Sync {
    /// Constructs the bucketer for `num_buckets` buckets (at least 1) that are filled
    /// with `lambda` keys on average and placed in a table of `table_size` slots with load factor `alpha`.
    fn new(num_buckets: u64, lambda: f64, table_size: u64, alpha: f64) -> Self;

    /// Returns the bucket of the given `hash`.
    fn bucket(&self, hash: u64) -> u64;

    /// Returns the number of buckets.
    fn num_buckets(&self) -> u64;

    /// Returns number of bits of the serialized bucketer.
    #[inline] fn num_bits(&self) -> usize { 8 * self.write_bytes() }
}

/// Reads the number of buckets and checks that it is positive.
fn read_num_buckets(input: &mut dyn io::Read) -> io::Result<u64> {
    let num_buckets: u64 = AsIs::read(input)?;
    if num_buckets == 0 { return Err(invalid_data("bucketer: the number of buckets must be positive")); }
    Ok(num_buckets)
}

/// Returns `hash` normalized to `[0, 1)`.
#[inline(always)] fn normalized(hash: u64) -> f64 { hash as f64 / 18446744073709551616.0 }

/// Bucketer that spreads the hashes evenly. Used also to select partitions.
#[derive(Clone, Copy, Debug)]
pub struct UniformBucketer {
    num_buckets: FastMod,
}

impl GetSize for UniformBucketer {}

impl Bucketer for UniformBucketer {
    #[inline] fn new(num_buckets: u64, _lambda: f64, _table_size: u64, _alpha: f64) -> Self {
        Self { num_buckets: FastMod::new(num_buckets) }
    }

    #[inline(always)] fn bucket(&self, hash: u64) -> u64 { self.num_buckets.reduce(hash) }

    #[inline(always)] fn num_buckets(&self) -> u64 { self.num_buckets.divisor() }
}

impl Persist for UniformBucketer {
    fn write_bytes(&self) -> usize { AsIs::size(self.num_buckets()) }
    fn write(&self, output: &mut dyn io::Write) -> io::Result<()> { AsIs::write(output, self.num_buckets()) }
    fn read(input: &mut dyn io::Read) -> io::Result<Self> {
        Ok(Self { num_buckets: FastMod::new(read_num_buckets(input)?) })
    }
}

/// Bucketer that assigns 60% of the hashes to the first (dense) 30% of the buckets,
/// and the rest to the remaining (sparse) buckets.
#[derive(Clone, Copy, Debug)]
pub struct SkewBucketer {
    num_dense: FastMod,
    num_sparse: FastMod,
    has_sparse: bool,
}

impl SkewBucketer {
    /// Hashes below the threshold go to the dense buckets.
    const THRESHOLD: u64 = u64::MAX / 5 * 3;

    fn with_split(num_dense: u64, num_sparse: u64) -> Self {
        Self {
            num_dense: FastMod::new(num_dense.max(1)),
            num_sparse: FastMod::new(num_sparse.max(1)),
            has_sparse: num_sparse != 0,
        }
    }

    #[inline] fn num_sparse(&self) -> u64 { if self.has_sparse { self.num_sparse.divisor() } else { 0 } }
}

impl GetSize for SkewBucketer {}

impl Bucketer for SkewBucketer {
    fn new(num_buckets: u64, _lambda: f64, _table_size: u64, _alpha: f64) -> Self {
        let num_dense = if num_buckets <= 1 { num_buckets } else { (num_buckets * 3 / 10).clamp(1, num_buckets - 1) };
        Self::with_split(num_dense, num_buckets - num_dense)
    }

    #[inline(always)]
    fn bucket(&self, hash: u64) -> u64 {
        if hash < Self::THRESHOLD || !self.has_sparse {
            self.num_dense.reduce(hash)
        } else {
            self.num_dense.divisor() + self.num_sparse.reduce(hash)
        }
    }

    #[inline] fn num_buckets(&self) -> u64 { self.num_dense.divisor() + self.num_sparse() }
}

impl Persist for SkewBucketer {
    fn write_bytes(&self) -> usize { 2 * AsIs::size(0u64) }

    fn write(&self, output: &mut dyn io::Write) -> io::Result<()> {
        AsIs::write(output, self.num_dense.divisor())?;
        AsIs::write(output, self.num_sparse())
    }

    fn read(input: &mut dyn io::Read) -> io::Result<Self> {
        let num_dense = read_num_buckets(input)?;
        let num_sparse: u64 = AsIs::read(input)?;
        if num_dense.checked_add(num_sparse).is_none() {
            return Err(invalid_data("SkewBucketer: too many buckets"));
        }
        Ok(Self::with_split(num_dense, num_sparse))
    }
}

/// Bucketer whose position depends only on the normalized hash, via a non-decreasing function
/// from `[0, 1)` to `[0, 1]`, that is scaled by the number of buckets.
pub trait RelativeBucketer {
    /// Returns the relative position of the bucket of the hash normalized to `x`.
    fn relative(x: f64) -> f64;
}

/// Bucketer that makes the early buckets very large and the late ones small,
/// which reduces the number of trials needed by pilot search.
///
/// It uses the function *c·x + (1-c)·(x + (1-x)·ln(1-x))* with *c = 0.3*.
#[derive(Clone, Copy, Debug)]
pub struct OptBucketer {
    num_buckets: u64,
}

impl OptBucketer {
    /// Weight of the linear component.
    const C: f64 = 0.3;
}

impl RelativeBucketer for OptBucketer {
    #[inline]
    fn relative(x: f64) -> f64 {
        if x >= 1.0 { return 1.0; }
        let optimal = x + (1.0 - x) * (1.0 - x).ln();
        Self::C * x + (1.0 - Self::C) * optimal
    }
}

impl GetSize for OptBucketer {}

impl Bucketer for OptBucketer {
    #[inline] fn new(num_buckets: u64, _lambda: f64, _table_size: u64, _alpha: f64) -> Self {
        Self { num_buckets }
    }

    #[inline]
    fn bucket(&self, hash: u64) -> u64 {
        ((Self::relative(normalized(hash)) * self.num_buckets as f64) as u64).min(self.num_buckets - 1)
    }

    #[inline(always)] fn num_buckets(&self) -> u64 { self.num_buckets }
}

impl Persist for OptBucketer {
    fn write_bytes(&self) -> usize { AsIs::size(self.num_buckets) }
    fn write(&self, output: &mut dyn io::Write) -> io::Result<()> { AsIs::write(output, self.num_buckets) }
    fn read(input: &mut dyn io::Read) -> io::Result<Self> {
        Ok(Self { num_buckets: read_num_buckets(input)? })
    }
}

/// Bucketer that approximates the function of `B` by linear interpolation
/// between its values at [`TableBucketer::FULCRUMS`] evenly spaced points.
///
/// It is faster than `B` as it does not use floating point arithmetic,
/// but it must store the table.
pub struct TableBucketer<B = OptBucketer> {
    num_buckets: u64,
    fulcrums: Box<[u64]>,   // scaled by 2^16
    base: PhantomData<B>,
}

impl<B> TableBucketer<B> {
    /// Number of interpolated intervals.
    pub const FULCRUMS: usize = 2048;
}

impl<B> GetSize for TableBucketer<B> {
    fn size_bytes_dyn(&self) -> usize { self.fulcrums.size_bytes_dyn() }
    fn size_bytes_content_dyn(&self) -> usize { self.fulcrums.size_bytes_content_dyn() }
    const USES_DYN_MEM: bool = true;
}

impl<B: RelativeBucketer + Send + Sync> Bucketer for TableBucketer<B> {
    fn new(num_buckets: u64, _lambda: f64, _table_size: u64, _alpha: f64) -> Self {
        let scaled = (num_buckets as f64) * 65536.0;
        let fulcrums = (0..=Self::FULCRUMS)
            .map(|i| if i == Self::FULCRUMS {
                num_buckets << 16
            } else {
                ((B::relative(i as f64 / Self::FULCRUMS as f64) * scaled) as u64).min(num_buckets << 16)
            })
            .collect();
        Self { num_buckets, fulcrums, base: PhantomData }
    }

    #[inline]
    fn bucket(&self, hash: u64) -> u64 {
        let z = (hash >> 32) * Self::FULCRUMS as u64;
        let index = (z >> 32) as usize;
        let part = (z & 0xFFFF_FFFF) as u128;
        let interpolated = (self.fulcrums[index] as u128 * ((1u128 << 32) - part) +
                            self.fulcrums[index + 1] as u128 * part) >> 32;
        ((interpolated >> 16) as u64).min(self.num_buckets - 1)
    }

    #[inline(always)] fn num_buckets(&self) -> u64 { self.num_buckets }
}

impl<B> Persist for TableBucketer<B> {
    fn write_bytes(&self) -> usize { AsIs::size(self.num_buckets) + AsIs::array_content_size(&self.fulcrums) }

    fn write(&self, output: &mut dyn io::Write) -> io::Result<()> {
        AsIs::write(output, self.num_buckets)?;
        AsIs::write_all(output, self.fulcrums.iter())
    }

    fn read(input: &mut dyn io::Read) -> io::Result<Self> {
        let num_buckets = read_num_buckets(input)?;
        let fulcrums: Box<[u64]> = AsIs::read_n(input, Self::FULCRUMS + 1)?;
        if fulcrums.windows(2).any(|w| w[0] > w[1]) {
            return Err(invalid_data("TableBucketer: fulcrums must be non-decreasing"));
        }
        Ok(Self { num_buckets, fulcrums, base: PhantomData })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::tests::distinct_keys;

    fn check_range<B: Bucketer>(num_buckets: u64) -> B {
        let b = B::new(num_buckets, 5.0, num_buckets * 5, 0.99);
        assert_eq!(b.num_buckets(), num_buckets);
        for h in [0, 1, u64::MAX / 2, SkewBucketer::THRESHOLD - 1, SkewBucketer::THRESHOLD, u64::MAX - 1, u64::MAX] {
            assert!(b.bucket(h) < num_buckets, "hash {h}");
        }
        for h in distinct_keys(1000, num_buckets) {
            assert!(b.bucket(h) < num_buckets, "hash {h}");
        }
        let mut buff = Vec::new();
        b.write(&mut buff).unwrap();
        assert_eq!(buff.len(), b.write_bytes());
        let read = B::read(&mut &buff[..]).unwrap();
        assert_eq!(read.num_buckets(), num_buckets);
        for h in distinct_keys(100, 1) { assert_eq!(read.bucket(h), b.bucket(h)); }
        b
    }

    fn check_all<B: Bucketer>() {
        for num_buckets in [1, 2, 3, 10, 1000, 123457] { check_range::<B>(num_buckets); }
    }

    #[test] fn uniform() { check_all::<UniformBucketer>(); }
    #[test] fn skew() { check_all::<SkewBucketer>(); }
    #[test] fn opt() { check_all::<OptBucketer>(); }
    #[test] fn table() { check_all::<TableBucketer>(); }

    #[test]
    fn skew_fills_dense_buckets() {
        let b = SkewBucketer::new(1000, 5.0, 5000, 1.0);
        let in_dense = distinct_keys(100_000, 3).into_iter().filter(|h| b.bucket(*h) < 300).count();
        assert!((57_000..63_000).contains(&in_dense), "{in_dense}");
    }

    #[test]
    fn opt_and_table_are_monotone_and_agree() {
        let opt = OptBucketer::new(5000, 5.0, 25000, 1.0);
        let table = TableBucketer::<OptBucketer>::new(5000, 5.0, 25000, 1.0);
        let mut hashes = distinct_keys(10_000, 7);
        hashes.sort_unstable();
        for w in hashes.windows(2) {
            assert!(opt.bucket(w[0]) <= opt.bucket(w[1]));
            assert!(table.bucket(w[0]) <= table.bucket(w[1]));
        }
        for h in hashes {
            assert!(opt.bucket(h).abs_diff(table.bucket(h)) <= 2, "hash {h}");
        }
        assert!(table.num_bits() > opt.num_bits());
    }

    #[test]
    fn zero_buckets_are_rejected_on_read() {
        let buff = [0u8; 8];
        assert!(UniformBucketer::read(&mut &buff[..]).is_err());
        assert!(OptBucketer::read(&mut &buff[..]).is_err());
    }
}
