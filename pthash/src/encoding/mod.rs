//! Succinct random-access encodings of integer sequences.

mod compact;
pub use compact::Compact;

mod dictionary;
pub use dictionary::{Dictionary, Dual, DictionaryDictionary};

mod elias_fano;
pub use elias_fano::EliasFano;

mod diff;
pub use diff::DiffCompact;

mod pilots;
pub use pilots::{PilotTable, Flat, Interleaved};

use std::io;
use binout::{AsIs, Serializer};
use dyn_size_of::GetSize;

/// Types that can be written to and read from binary streams.
pub trait Persist: Sized {
    /// Returns number of bytes which `write` will write.
    fn write_bytes(&self) -> usize;

    /// Writes `self` to the `output`.
    fn write(&self, output: &mut dyn io::Write) -> io::Result<()>;

    /// Reads `Self` from the `input`.
    fn read(input: &mut dyn io::Read) -> io::Result<Self>;
}

impl Persist for u64 {
    #[inline] fn write_bytes(&self) -> usize { AsIs::size(*self) }
    #[inline] fn write(&self, output: &mut dyn io::Write) -> io::Result<()> { AsIs::write(output, *self) }
    #[inline] fn read(input: &mut dyn io::Read) -> io::Result<Self> { AsIs::read(input) }
}

/// Returns [`io::ErrorKind::InvalidData`] error with given `message`.
pub(crate) fn invalid_data(message: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message.to_owned())
}

/// Sequence of integers with constant-time random access.
pub trait Encoder: Persist + GetSize + Send + Sync {
    /// Constructs the encoding of `values`.
    fn encode(values: &[u64]) -> Self;

    /// Returns `index`-th encoded value. `index` must be less than `self.len()`.
    fn access(&self, index: usize) -> u64;

    /// Returns number of encoded values.
    fn len(&self) -> usize;

    /// Returns whether there are no encoded values.
    #[inline] fn is_empty(&self) -> bool { self.len() == 0 }

    /// Returns number of bits of the serialized encoding.
    #[inline] fn num_bits(&self) -> usize { 8 * self.write_bytes() }
}
