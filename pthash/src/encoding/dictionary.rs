use std::{cmp::Reverse, collections::HashMap, io};
use dyn_size_of::GetSize;

use super::{invalid_data, Compact, Encoder, Persist};

/// Encoding that stores the distinct values, ordered from the most frequent,
/// and the compactly stored rank of each value among them.
///
/// It is small when a few values dominate the sequence, as is the case for pilots.
#[derive(Clone, Debug)]
pub struct Dictionary {
    ranks: Compact,
    dict: Compact,
}

impl Dictionary {
    /// Returns number of distinct values.
    #[inline] pub fn distinct(&self) -> usize { self.dict.len() }
}

impl GetSize for Dictionary {
    fn size_bytes_dyn(&self) -> usize { self.ranks.size_bytes_dyn() + self.dict.size_bytes_dyn() }
    fn size_bytes_content_dyn(&self) -> usize { self.ranks.size_bytes_content_dyn() + self.dict.size_bytes_content_dyn() }
    const USES_DYN_MEM: bool = true;
}

impl Encoder for Dictionary {
    fn encode(values: &[u64]) -> Self {
        let mut frequency = HashMap::<u64, u64>::new();
        for v in values { *frequency.entry(*v).or_default() += 1; }
        let mut dict: Vec<(u64, u64)> = frequency.into_iter().collect();
        dict.sort_unstable_by_key(|&(value, count)| (Reverse(count), value));
        let rank_of: HashMap<u64, u64> = dict.iter().enumerate().map(|(rank, (value, _))| (*value, rank as u64)).collect();
        let ranks: Vec<u64> = values.iter().map(|v| rank_of[v]).collect();
        let dict: Vec<u64> = dict.into_iter().map(|(value, _)| value).collect();
        Self { ranks: Compact::encode(&ranks), dict: Compact::encode(&dict) }
    }

    #[inline(always)]
    fn access(&self, index: usize) -> u64 {
        self.dict.access(self.ranks.access(index) as usize)
    }

    #[inline(always)] fn len(&self) -> usize { self.ranks.len() }
}

impl Persist for Dictionary {
    fn write_bytes(&self) -> usize { self.ranks.write_bytes() + self.dict.write_bytes() }

    fn write(&self, output: &mut dyn io::Write) -> io::Result<()> {
        self.ranks.write(output)?;
        self.dict.write(output)
    }

    fn read(input: &mut dyn io::Read) -> io::Result<Self> {
        let ranks = Compact::read(input)?;
        let dict = Compact::read(input)?;
        if (0..ranks.len()).any(|i| ranks.access(i) >= dict.len() as u64) {
            return Err(invalid_data("Dictionary: rank beyond the dictionary"));
        }
        Ok(Self { ranks, dict })
    }
}

/// Encoding that stores the front part (30%) of the sequence with `F`, and the rest with `B`.
///
/// The statistics of the front and the back usually differ,
/// as the front holds the pilots of the largest buckets.
#[derive(Clone, Debug)]
pub struct Dual<F = Dictionary, B = Dictionary> {
    front: F,
    back: B,
}

/// [`Dual`] encoding that uses [`Dictionary`] for both parts.
pub type DictionaryDictionary = Dual<Dictionary, Dictionary>;

impl<F, B> Dual<F, B> {
    /// Percentage of values stored in the front part.
    pub const FRONT_PERCENT: usize = 30;

    /// Returns the length of the front part of a sequence of given `len`.
    #[inline] pub fn front_len(len: usize) -> usize { len * Self::FRONT_PERCENT / 100 }
}

impl<F: GetSize, B: GetSize> GetSize for Dual<F, B> {
    fn size_bytes_dyn(&self) -> usize { self.front.size_bytes_dyn() + self.back.size_bytes_dyn() }
    fn size_bytes_content_dyn(&self) -> usize { self.front.size_bytes_content_dyn() + self.back.size_bytes_content_dyn() }
    const USES_DYN_MEM: bool = F::USES_DYN_MEM || B::USES_DYN_MEM;
}

impl<F: Encoder, B: Encoder> Encoder for Dual<F, B> {
    fn encode(values: &[u64]) -> Self {
        let (front, back) = values.split_at(Self::front_len(values.len()));
        Self { front: F::encode(front), back: B::encode(back) }
    }

    #[inline(always)]
    fn access(&self, index: usize) -> u64 {
        let front_len = self.front.len();
        if index < front_len { self.front.access(index) } else { self.back.access(index - front_len) }
    }

    #[inline(always)] fn len(&self) -> usize { self.front.len() + self.back.len() }
}

impl<F: Persist, B: Persist> Persist for Dual<F, B> {
    fn write_bytes(&self) -> usize { self.front.write_bytes() + self.back.write_bytes() }

    fn write(&self, output: &mut dyn io::Write) -> io::Result<()> {
        self.front.write(output)?;
        self.back.write(output)
    }

    fn read(input: &mut dyn io::Read) -> io::Result<Self> {
        Ok(Self { front: F::read(input)?, back: B::read(input)? })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check<E: Encoder>(values: &[u64]) -> E {
        let e = E::encode(values);
        assert_eq!(e.len(), values.len());
        for (i, v) in values.iter().enumerate() { assert_eq!(e.access(i), *v, "index {i}"); }
        let mut buff = Vec::new();
        e.write(&mut buff).unwrap();
        assert_eq!(buff.len(), e.write_bytes());
        let read = E::read(&mut &buff[..]).unwrap();
        for (i, v) in values.iter().enumerate() { assert_eq!(read.access(i), *v, "index {i} after reading"); }
        e
    }

    #[test]
    fn dictionary_orders_by_frequency() {
        let values = [1000, 5, 5, 5, 7, 7, 1000, 5, 123456];
        let d = check::<Dictionary>(&values);
        assert_eq!(d.distinct(), 4);
        assert_eq!(d.dict.access(0), 5);
        assert_eq!(d.dict.access(1), 7);
        assert_eq!(d.dict.access(2), 1000);
    }

    #[test]
    fn rank_beyond_dictionary_is_rejected() {
        let d = Dictionary::encode(&[9, 9, 4]);
        let mut buff = Vec::new();
        d.ranks.write(&mut buff).unwrap();
        Compact::encode(&[9]).write(&mut buff).unwrap();
        let err = Dictionary::read(&mut &buff[..]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn dictionary_is_smaller_than_compact_for_skewed_data() {
        let values: Vec<u64> = (0..10_000u64).map(|i| if i % 100 == 0 { 1 << 40 } else { i % 3 }).collect();
        let d = check::<Dictionary>(&values);
        assert!(d.num_bits() < Compact::encode(&values).num_bits());
    }

    #[test]
    fn dual() {
        check::<DictionaryDictionary>(&[]);
        check::<DictionaryDictionary>(&[42]);
        let values: Vec<u64> = (0..1000u64).map(|i| if i < 300 { i * 31 } else { i % 4 }).collect();
        let d = check::<DictionaryDictionary>(&values);
        assert_eq!(d.front.len(), 300);
        check::<Dual<Compact, Dictionary>>(&values);
    }
}
