use std::io;
use binout::{Serializer, VByte};
use dyn_size_of::GetSize;

use super::{invalid_data, Dictionary, DictionaryDictionary, Encoder, Persist};

/// Two-dimensional table of pilots, indexed by partition and bucket within the partition.
pub trait PilotTable: Persist + GetSize + Send + Sync {
    /// Constructs the table from `pilots` of `num_partitions` partitions,
    /// stored partition after partition, `buckets_per_partition` pilots each.
    fn encode(pilots: &[u64], num_partitions: u64, buckets_per_partition: u64) -> Self;

    /// Returns the pilot of the given `bucket` of the given `partition`.
    fn pilot(&self, partition: u64, bucket: u64) -> u64;

    /// Returns the number of buckets in each partition.
    fn buckets_per_partition(&self) -> u64;

    /// Returns the number of pilots in all partitions.
    fn len(&self) -> usize;

    /// Returns number of bits of the serialized table.
    #[inline] fn num_bits(&self) -> usize { 8 * self.write_bytes() }
}

/// [`PilotTable`] that stores all pilots, partition after partition, in a single encoder `E`.
#[derive(Clone, Debug)]
pub struct Flat<E = DictionaryDictionary> {
    buckets_per_partition: u64,
    pilots: E,
}

impl<E: GetSize> GetSize for Flat<E> {
    fn size_bytes_dyn(&self) -> usize { self.pilots.size_bytes_dyn() }
    fn size_bytes_content_dyn(&self) -> usize { self.pilots.size_bytes_content_dyn() }
    const USES_DYN_MEM: bool = E::USES_DYN_MEM;
}

impl<E: Encoder> PilotTable for Flat<E> {
    fn encode(pilots: &[u64], _num_partitions: u64, buckets_per_partition: u64) -> Self {
        Self { buckets_per_partition, pilots: E::encode(pilots) }
    }

    #[inline(always)]
    fn pilot(&self, partition: u64, bucket: u64) -> u64 {
        self.pilots.access((partition * self.buckets_per_partition + bucket) as usize)
    }

    #[inline] fn buckets_per_partition(&self) -> u64 { self.buckets_per_partition }

    #[inline] fn len(&self) -> usize { self.pilots.len() }
}

impl<E: Persist> Persist for Flat<E> {
    fn write_bytes(&self) -> usize { VByte::size(self.buckets_per_partition) + self.pilots.write_bytes() }

    fn write(&self, output: &mut dyn io::Write) -> io::Result<()> {
        VByte::write(output, self.buckets_per_partition)?;
        self.pilots.write(output)
    }

    fn read(input: &mut dyn io::Read) -> io::Result<Self> {
        let buckets_per_partition = VByte::read(input)?;
        if buckets_per_partition == 0 { return Err(invalid_data("Flat: no buckets in partitions")); }
        Ok(Self { buckets_per_partition, pilots: E::read(input)? })
    }
}

/// [`PilotTable`] that uses a separate encoder `E` for each bucket index,
/// which stores the pilots of the bucket with this index in all partitions.
///
/// Buckets with the same index have similar sizes in all partitions,
/// so their pilots have similar distributions.
#[derive(Clone, Debug)]
pub struct Interleaved<E = Dictionary> {
    num_partitions: u64,
    buckets: Box<[E]>,
}

impl<E: GetSize> GetSize for Interleaved<E> {
    fn size_bytes_dyn(&self) -> usize { self.buckets.size_bytes_dyn() }
    fn size_bytes_content_dyn(&self) -> usize { self.buckets.size_bytes_content_dyn() }
    const USES_DYN_MEM: bool = true;
}

impl<E: Encoder> PilotTable for Interleaved<E> {
    fn encode(pilots: &[u64], num_partitions: u64, buckets_per_partition: u64) -> Self {
        let bpp = buckets_per_partition as usize;
        let buckets = (0..bpp)
            .map(|bucket| E::encode(&pilots.iter().skip(bucket).step_by(bpp).copied().collect::<Vec<_>>()))
            .collect();
        Self { num_partitions, buckets }
    }

    #[inline(always)]
    fn pilot(&self, partition: u64, bucket: u64) -> u64 {
        self.buckets[bucket as usize].access(partition as usize)
    }

    #[inline] fn buckets_per_partition(&self) -> u64 { self.buckets.len() as u64 }

    #[inline] fn len(&self) -> usize { self.buckets.iter().map(|e| e.len()).sum() }
}

impl<E: Encoder> Persist for Interleaved<E> {
    fn write_bytes(&self) -> usize {
        VByte::size(self.num_partitions) + VByte::size(self.buckets.len() as u64) +
            self.buckets.iter().map(|e| e.write_bytes()).sum::<usize>()
    }

    fn write(&self, output: &mut dyn io::Write) -> io::Result<()> {
        VByte::write(output, self.num_partitions)?;
        VByte::write(output, self.buckets.len() as u64)?;
        for e in self.buckets.iter() { e.write(output)?; }
        Ok(())
    }

    fn read(input: &mut dyn io::Read) -> io::Result<Self> {
        let num_partitions = VByte::read(input)?;
        let len: u64 = VByte::read(input)?;
        if len == 0 { return Err(invalid_data("Interleaved: no buckets in partitions")); }
        let buckets: Box<[E]> = (0..len).map(|_| E::read(input)).collect::<io::Result<_>>()?;
        if buckets.iter().any(|e| e.len() as u64 != num_partitions) {
            return Err(invalid_data("Interleaved: each bucket must have a pilot in every partition"));
        }
        Ok(Self { num_partitions, buckets })
    }
}
