use std::io;
use dyn_size_of::GetSize;

use super::{Compact, Encoder, Persist};

/// Encoding of a sequence that grows roughly linearly, such as partition offsets.
///
/// The `i`-th value is stored as the zig-zag coded difference from `i·increment`,
/// where `increment` is the slope between the first and the last value.
#[derive(Clone, Debug)]
pub struct DiffCompact {
    increment: u64,
    diffs: Compact,
}

#[inline(always)] fn zigzag(v: i64) -> u64 { ((v << 1) ^ (v >> 63)) as u64 }
#[inline(always)] fn unzigzag(v: u64) -> i64 { ((v >> 1) as i64) ^ -((v & 1) as i64) }

impl DiffCompact {
    /// Returns the expected difference between consecutive values.
    #[inline] pub fn increment(&self) -> u64 { self.increment }
}

impl GetSize for DiffCompact {
    fn size_bytes_dyn(&self) -> usize { self.diffs.size_bytes_dyn() }
    fn size_bytes_content_dyn(&self) -> usize { self.diffs.size_bytes_content_dyn() }
    const USES_DYN_MEM: bool = true;
}

impl Encoder for DiffCompact {
    fn encode(values: &[u64]) -> Self {
        let increment = match values {
            [first, .., last] => last.saturating_sub(*first) / (values.len() as u64 - 1),
            _ => 0
        };
        let diffs: Vec<u64> = values.iter().enumerate()
            .map(|(i, v)| zigzag(v.wrapping_sub(i as u64 * increment) as i64))
            .collect();
        Self { increment, diffs: Compact::encode(&diffs) }
    }

    #[inline(always)]
    fn access(&self, index: usize) -> u64 {
        (index as u64).wrapping_mul(self.increment).wrapping_add(unzigzag(self.diffs.access(index)) as u64)
    }

    #[inline(always)] fn len(&self) -> usize { self.diffs.len() }
}

impl Persist for DiffCompact {
    fn write_bytes(&self) -> usize { self.increment.write_bytes() + self.diffs.write_bytes() }

    fn write(&self, output: &mut dyn io::Write) -> io::Result<()> {
        self.increment.write(output)?;
        self.diffs.write(output)
    }

    fn read(input: &mut dyn io::Read) -> io::Result<Self> {
        Ok(Self { increment: u64::read(input)?, diffs: Compact::read(input)? })
    }
}
