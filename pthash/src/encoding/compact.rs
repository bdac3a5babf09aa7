use std::io;
use binout::{AsIs, Serializer, VByte};
use bitm::{bits_to_store, ceiling_div, BitAccess, BitVec};
use dyn_size_of::GetSize;

use super::{invalid_data, Encoder, Persist};

/// Encoding that stores each value with the same number of bits required to store the largest one.
#[derive(Clone, Debug)]
pub struct Compact {
    items: Box<[u64]>,
    item_size: u8,
    len: usize,
}

impl Compact {
    /// Returns number of bits used by each value.
    #[inline] pub fn item_size(&self) -> u8 { self.item_size }

    /// Returns the number of 64-bit words needed by `len` values of `item_size` bits, or [`None`] on overflow.
    #[inline] fn words(len: usize, item_size: u8) -> Option<usize> {
        len.checked_mul(item_size as usize).map(|bits| ceiling_div(bits, 64).max(1))
    }
}

impl GetSize for Compact {
    fn size_bytes_dyn(&self) -> usize { self.items.size_bytes_dyn() }
    fn size_bytes_content_dyn(&self) -> usize { self.items.size_bytes_content_dyn() }
    const USES_DYN_MEM: bool = true;
}

impl Encoder for Compact {
    fn encode(values: &[u64]) -> Self {
        let item_size = bits_to_store(values.iter().copied().max().unwrap_or(0));
        let mut items = Box::<[u64]>::with_zeroed_bits(ceiling_div(values.len() * item_size as usize, 64).max(1) * 64);
        if item_size == 64 {
            items[..values.len()].copy_from_slice(values);
        } else if item_size != 0 {
            for (index, value) in values.iter().enumerate() {
                items.init_fragment(index, *value, item_size);
            }
        }
        Self { items, item_size, len: values.len() }
    }

    #[inline(always)]
    fn access(&self, index: usize) -> u64 {
        if self.item_size == 64 { return self.items[index]; }
        self.items.get_fragment(index, self.item_size)
    }

    #[inline(always)] fn len(&self) -> usize { self.len }
}

impl Persist for Compact {
    fn write_bytes(&self) -> usize {
        VByte::size(self.len as u64) + AsIs::size(self.item_size) + AsIs::array_content_size(&self.items)
    }

    fn write(&self, output: &mut dyn io::Write) -> io::Result<()> {
        VByte::write(output, self.len as u64)?;
        AsIs::write(output, self.item_size)?;
        AsIs::write_all(output, self.items.iter())
    }

    fn read(input: &mut dyn io::Read) -> io::Result<Self> {
        let len: u64 = VByte::read(input)?;
        let item_size: u8 = AsIs::read(input)?;
        if item_size > 64 { return Err(invalid_data("Compact: item size must not exceed 64 bits")); }
        let words = usize::try_from(len).ok().and_then(|len| Self::words(len, item_size))
            .ok_or_else(|| invalid_data("Compact: too many items"))?;
        let items = AsIs::read_n_iter(input, words).collect::<io::Result<Box<[u64]>>>()?;
        let len = len as usize;
        Ok(Self { items, item_size, len })
    }
}
