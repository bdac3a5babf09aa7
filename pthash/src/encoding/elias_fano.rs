use std::io;
use binout::{AsIs, Serializer, VByte};
use bitm::{ceiling_div, n_lowest_bits, BitAccess, BitVec, CombinedSampling, RankSelect101111, Select};
use dyn_size_of::GetSize;

use super::{invalid_data, Encoder, Persist};

/// Elias-Fano encoding of a non-decreasing sequence.
pub struct EliasFano {
    hi: RankSelect101111<CombinedSampling>,  // most significant bits of each element, unary coded
    lo: Box<[u64]>, // least significant bits of each element, vector of `bits_per_lo` bit elements
    bits_per_lo: u8,
    len: usize,
}

impl EliasFano {
    #[inline] fn lo_words(len: usize, bits_per_lo: u8) -> Option<usize> {
        len.checked_mul(bits_per_lo as usize).map(|bits| ceiling_div(bits, 64).max(1))
    }
}

impl GetSize for EliasFano {
    fn size_bytes_dyn(&self) -> usize { self.lo.size_bytes_dyn() + self.hi.size_bytes_dyn() }
    const USES_DYN_MEM: bool = true;
}

impl Encoder for EliasFano {
    /// Constructs the encoding of `values`, which must be sorted in non-decreasing order.
    fn encode(values: &[u64]) -> Self {
        debug_assert!(values.windows(2).all(|w| w[0] <= w[1]), "EliasFano: values must be non-decreasing");
        let len = values.len();
        let universe = values.last().map_or(0, |last| last + 1);
        let bits_per_lo = if len == 0 { 0 } else { (universe / len as u64).checked_ilog2().unwrap_or(0) as u8 };
        // adding the last element, with value universe-1, sets bit (len-1) + ((universe-1) >> bits_per_lo)
        let hi_len = if len == 0 { 0 } else { len + ((universe - 1) >> bits_per_lo) as usize };
        let mut hi = Box::<[u64]>::with_zeroed_bits(hi_len);
        let mut lo = Box::<[u64]>::with_zeroed_bits(ceiling_div(len * bits_per_lo as usize, 64).max(1) * 64);
        let lo_mask = n_lowest_bits(bits_per_lo);
        for (index, value) in values.iter().enumerate() {
            hi.set_bit((value >> bits_per_lo) as usize + index);
            if bits_per_lo != 0 { lo.init_fragment(index, value & lo_mask, bits_per_lo); }
        }
        Self { hi: hi.into(), lo, bits_per_lo, len }
    }

    #[inline]
    fn access(&self, index: usize) -> u64 {
        (((self.hi.select(index) - index) as u64) << self.bits_per_lo) |
            self.lo.get_fragment(index, self.bits_per_lo)
    }

    #[inline] fn len(&self) -> usize { self.len }
}

impl Persist for EliasFano {
    fn write_bytes(&self) -> usize {
        VByte::size(self.len as u64) + AsIs::size(self.bits_per_lo) +
            AsIs::array_content_size(&self.lo) +
            VByte::size(self.hi.content.len() as u64) + AsIs::array_content_size(&self.hi.content)
    }

    fn write(&self, output: &mut dyn io::Write) -> io::Result<()> {
        VByte::write(output, self.len as u64)?;
        AsIs::write(output, self.bits_per_lo)?;
        AsIs::write_all(output, self.lo.iter())?;
        VByte::write(output, self.hi.content.len() as u64)?;
        AsIs::write_all(output, self.hi.content.iter())
    }

    fn read(input: &mut dyn io::Read) -> io::Result<Self> {
        let len: u64 = VByte::read(input)?;
        let bits_per_lo: u8 = AsIs::read(input)?;
        if bits_per_lo >= 64 { return Err(invalid_data("EliasFano: lower bits must be fewer than 64")); }
        let len = usize::try_from(len).map_err(|_| invalid_data("EliasFano: too many items"))?;
        let lo_words = Self::lo_words(len, bits_per_lo).ok_or_else(|| invalid_data("EliasFano: too many items"))?;
        let lo = AsIs::read_n_iter(input, lo_words).collect::<io::Result<Box<[u64]>>>()?;
        let hi_words: u64 = VByte::read(input)?;
        let hi_words = usize::try_from(hi_words).map_err(|_| invalid_data("EliasFano: too many upper bits"))?;
        let hi = AsIs::read_n_iter(input, hi_words).collect::<io::Result<Box<[u64]>>>()?;
        if hi.iter().map(|w| w.count_ones() as usize).sum::<usize>() != len {
            return Err(invalid_data("EliasFano: the number of upper bits differs from the length"));
        }
        Ok(Self { hi: hi.into(), lo, bits_per_lo, len })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(values: &[u64]) -> EliasFano {
        let ef = EliasFano::encode(values);
        assert_eq!(ef.len(), values.len());
        for (i, v) in values.iter().enumerate() { assert_eq!(ef.access(i), *v, "index {i}"); }
        let mut buff = Vec::new();
        ef.write(&mut buff).unwrap();
        assert_eq!(buff.len(), ef.write_bytes());
        let read = EliasFano::read(&mut &buff[..]).unwrap();
        for (i, v) in values.iter().enumerate() { assert_eq!(read.access(i), *v, "index {i} after reading"); }
        ef
    }

    #[test]
    fn small_sparse() {
        check(&[0, 1, 801, 920, 999]);
    }

    #[test]
    fn small_dense_with_repetitions() {
        check(&[0, 1, 1, 3, 3, 3, 4, 5]);
        check(&[0, 0, 0]);
        check(&[7]);
    }

    #[test]
    fn empty() {
        assert!(check(&[]).is_empty());
    }

    #[test]
    fn huge_length_is_rejected() {
        let mut buff = Vec::new();
        VByte::write(&mut buff, 1u64 << 62).unwrap();
        AsIs::write(&mut buff, 60u8).unwrap();
        let err = EliasFano::read(&mut &buff[..]).err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        let mut buff = Vec::new();
        VByte::write(&mut buff, 3u64).unwrap();
        AsIs::write(&mut buff, 0u8).unwrap();
        AsIs::write(&mut buff, 0u64).unwrap();
        VByte::write(&mut buff, 1u64 << 50).unwrap();
        assert!(EliasFano::read(&mut &buff[..]).is_err());
    }

    #[test]
    fn large() {
        let values: Vec<u64> = (0..20_000u64).map(|i| i * 13 + i % 7).collect();
        let ef = check(&values);
        assert!(ef.num_bits() < 64 * values.len() / 4);
    }
}
