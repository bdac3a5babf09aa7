use std::{hash::Hash, io, marker::PhantomData, time::Instant};
use dyn_size_of::GetSize;

use crate::builder::PartitionedBuilder;
use crate::bucketer::{Bucketer, SkewBucketer, UniformBucketer};
use crate::conf::{BuildConf, BuildTimings};
use crate::encoding::{DiffCompact, EliasFano, Encoder, Flat, Persist, PilotTable};
use crate::error::{Error, ValidationError};
use crate::hash::{DefaultKeyHasher, KeyHasher};
use crate::search::{Additive, Displacement};
use crate::utils::{hash64, FastMod};

/// Generates serialization methods that process the listed fields in order.
macro_rules! persisted {
    ($($field:ident),+) => {
        /// Returns number of bytes which `write` will write.
        pub fn write_bytes(&self) -> usize {
            0 $(+ self.$field.write_bytes())+
        }

        /// Writes `self` to the `output`.
        pub fn write(&self, output: &mut dyn io::Write) -> io::Result<()> {
            $(self.$field.write(output)?;)+
            Ok(())
        }

        /// Reads `Self` from the `input`. Hasher must be the same as the one used to write.
        ///
        /// Reports [`Error::Decode`] if the input is truncated, corrupted, or written by a function of different type.
        pub fn read_with_hasher(input: &mut dyn io::Read, hasher: H) -> Result<Self, Error> {
            $(
                let $field = Persist::read(input)
                    .map_err(|source| Error::Decode { field: stringify!($field), source })?;
            )+
            let result = Self { $($field,)+ hasher, displacement: PhantomData };
            result.check()?;
            Ok(result)
        }
    };
}

/// Partitioned perfect hash function, built by searching a pilot for each bucket of keys.
///
/// Each key is fingerprinted by `H`, and the fingerprint selects (uniformly) a partition
/// and (by the bucketer `B`) a bucket in that partition.
/// The slot of the key in the partition is calculated by the displacement `D`
/// from the fingerprint and the pilot of the bucket, read from the table `P`.
/// If `MINIMAL` is `true`, slots beyond the number of keys are remapped to free slots below it,
/// so the function maps the keys to `[0, number of keys)`.
/// Otherwise, the keys are mapped to distinct values in `[0, table size)`.
///
/// Type parameters must agree with [`BuildConf::minimal`] and [`BuildConf::search`].
///
/// See:
/// - G. E. Pibiri, R. Trani, *PTHash: Revisiting FCH Minimal Perfect Hashing*, SIGIR 2021
/// - G. E. Pibiri, R. Trani, *Parallel and External-Memory Construction of Minimal Perfect Hash Functions with PTHash*, TKDE 2023
pub struct Function<H = DefaultKeyHasher, B = SkewBucketer, P = Flat, D = Additive, const MINIMAL: bool = true> {
    seed: u64,
    num_keys: u64,
    table_size: u64,
    partitioner: UniformBucketer,
    bucketer: B,
    pilots: P,
    offsets: DiffCompact,
    free_slots: EliasFano,
    hasher: H,
    displacement: PhantomData<D>,
}

impl<H, B: Bucketer, P: PilotTable, D, const MINIMAL: bool> GetSize for Function<H, B, P, D, MINIMAL> {
    fn size_bytes_dyn(&self) -> usize {
        self.bucketer.size_bytes_dyn() + self.pilots.size_bytes_dyn() +
            self.offsets.size_bytes_dyn() + self.free_slots.size_bytes_dyn()
    }
    fn size_bytes_content_dyn(&self) -> usize {
        self.bucketer.size_bytes_content_dyn() + self.pilots.size_bytes_content_dyn() +
            self.offsets.size_bytes_content_dyn() + self.free_slots.size_bytes_content_dyn()
    }
    const USES_DYN_MEM: bool = true;
}

impl<H: KeyHasher, B: Bucketer, P: PilotTable, D: Displacement, const MINIMAL: bool> Function<H, B, P, D, MINIMAL> {
    /// Gets the value associated with the given `key`.
    ///
    /// The returned value is in the range from `0` (inclusive) to the number of keys
    /// (or [`table_size`](Function::table_size) if the function is not minimal) (exclusive).
    /// If the `key` was not in the input key collection given during construction,
    /// an undetermined value from that range is returned.
    #[inline]
    pub fn get<K: Hash + ?Sized>(&self, key: &K) -> u64 {
        let hash = self.hasher.hash(key, self.seed);
        let partition = self.partitioner.bucket(hash.mix());
        let offset = self.offsets.access(partition as usize);
        let size = FastMod::new(self.offsets.access(partition as usize + 1) - offset);
        let pilot = self.pilots.pilot(partition, self.bucketer.bucket(hash.first()));
        let p = offset + D::position(hash.second(), pilot, &size, |v| hash64(v, self.seed));
        if MINIMAL && p >= self.num_keys {
            self.free_slots.access((p - self.num_keys) as usize)
        } else {
            p
        }
    }
}

impl<H, B: Bucketer, P: PilotTable, D: Displacement, const MINIMAL: bool> Function<H, B, P, D, MINIMAL> {
    persisted!(seed, num_keys, table_size, partitioner, bucketer, pilots, offsets, free_slots);

    /// Checks whether the structures read are consistent with each other.
    fn check(&self) -> Result<(), Error> {
        let num_partitions = self.partitioner.num_buckets() as usize;
        if self.offsets.len() != num_partitions + 1 {
            return Err(Error::malformed("offsets", "number of offsets does not match number of partitions"));
        }
        if self.offsets.access(0) != 0 || self.offsets.access(num_partitions) != self.table_size {
            return Err(Error::malformed("offsets", "offsets do not cover the table"));
        }
        if (0..num_partitions).any(|i| self.offsets.access(i) >= self.offsets.access(i + 1)) {
            return Err(Error::malformed("offsets", "partition without slots"));
        }
        let buckets_per_partition = self.pilots.buckets_per_partition();
        if self.bucketer.num_buckets() != buckets_per_partition {
            return Err(Error::malformed("bucketer", "number of buckets does not match the pilot table"));
        }
        if (num_partitions as u64).checked_mul(buckets_per_partition) != Some(self.pilots.len() as u64) {
            return Err(Error::malformed("pilots", "pilot table does not cover all buckets of all partitions"));
        }
        if self.num_keys == 0 || self.num_keys > self.table_size {
            return Err(Error::malformed("num_keys", "number of keys does not fit the table"));
        }
        let expected_free_slots = if MINIMAL { self.table_size - self.num_keys } else { 0 };
        if self.free_slots.len() as u64 != expected_free_slots {
            return Err(Error::malformed("free_slots", "number of free slots does not match the table"));
        }
        if !self.free_slots.is_empty() && self.free_slots.access(self.free_slots.len() - 1) >= self.num_keys {
            return Err(Error::malformed("free_slots", "free slot out of range"));
        }
        Ok(())
    }

    /// Returns the number of keys in the input collection given during construction.
    #[inline] pub fn num_keys(&self) -> u64 { self.num_keys }

    /// Returns the total number of slots in all partitions.
    #[inline] pub fn table_size(&self) -> u64 { self.table_size }

    /// Returns the number of partitions.
    #[inline] pub fn num_partitions(&self) -> u64 { self.partitioner.num_buckets() }

    /// Returns the seed of the key fingerprints.
    #[inline] pub fn seed(&self) -> u64 { self.seed }

    /// Returns the number of bits of the serialized function.
    #[inline] pub fn num_bits(&self) -> usize { 8 * self.write_bytes() }

    /// Returns the number of bits occupied by the pilots and the header (seed, number of keys and table size).
    pub fn num_bits_for_pilots(&self) -> usize {
        8 * (self.seed.write_bytes() + self.num_keys.write_bytes() + self.table_size.write_bytes()) +
            self.pilots.num_bits()
    }

    /// Returns the number of bits occupied by the structures mapping fingerprints to slots:
    /// the partitioner, the bucketer, the partition offsets and the free slots.
    pub fn num_bits_for_mapper(&self) -> usize {
        self.partitioner.num_bits() + self.bucketer.num_bits() + self.offsets.num_bits() + self.free_slots.num_bits()
    }

    /// Returns the number of bits of the serialized function per key.
    #[inline] pub fn bits_per_key(&self) -> f64 { self.num_bits() as f64 / self.num_keys as f64 }
}

impl<H: KeyHasher + Sync, B: Bucketer, P: PilotTable, D: Displacement, const MINIMAL: bool> Function<H, B, P, D, MINIMAL> {
    /// Constructs [`Function`] for given distinct `keys`, using the build configuration `conf`.
    /// Returns the function and the durations of construction phases.
    ///
    /// Fails with:
    /// - [`Error::Validation`] if `keys` is empty or has duplicates,
    ///   `conf` is invalid or does not agree with the type of the function;
    /// - [`Error::Construction`] if no pilot is found for some bucket within [`BuildConf::max_pilot_trials`] trials.
    pub fn build<K: Hash + Sync>(keys: &[K], conf: BuildConf<H>) -> Result<(Self, BuildTimings), Error> {
        if conf.minimal != MINIMAL { return Err(ValidationError::TypeMismatch("minimal").into()); }
        let mut timings = BuildTimings::default();
        let builder = PartitionedBuilder::<B>::build::<K, H, D>(keys, &conf, &mut timings)?;
        let start = Instant::now();
        let function = Self::encode(builder, conf.hasher)?;
        timings.encoding_us = start.elapsed().as_micros() as u64;
        if conf.verbose {
            tracing::info!("encoding took {} us: {:.3} bits/key ({:.3} for pilots, {:.3} for mapper)",
                timings.encoding_us, function.bits_per_key(),
                function.num_bits_for_pilots() as f64 / function.num_keys as f64,
                function.num_bits_for_mapper() as f64 / function.num_keys as f64);
        }
        Ok((function, timings))
    }

    /// Constructs [`Function`] for given distinct `keys`, using the build configuration `conf`.
    #[inline] pub fn try_with_conf<K: Hash + Sync>(keys: &[K], conf: BuildConf<H>) -> Result<Self, Error> {
        Self::build(keys, conf).map(|(function, _)| function)
    }

    /// Constructs [`Function`] for given distinct `keys`, using the build configuration `conf`.
    ///
    /// Panics if the construction fails.
    pub fn with_conf<K: Hash + Sync>(keys: &[K], conf: BuildConf<H>) -> Self {
        match Self::try_with_conf(keys, conf) {
            Ok(function) => function,
            Err(e) => panic!("constructing pthash::Function failed: {e}")
        }
    }

    /// Encodes the result of construction, which must have been built for `MINIMAL` and `D`, into [`Function`].
    /// `hasher` must be the one used by the construction.
    pub fn encode(builder: PartitionedBuilder<B>, hasher: H) -> Result<Self, Error> {
        if builder.minimal != MINIMAL { return Err(ValidationError::TypeMismatch("minimal").into()); }
        if builder.search != D::KIND { return Err(ValidationError::TypeMismatch("search").into()); }
        let num_partitions = builder.partitioner.num_buckets();
        Ok(Self {
            pilots: P::encode(&builder.pilots, num_partitions, builder.buckets_per_partition),
            offsets: DiffCompact::encode(&builder.offsets),
            free_slots: EliasFano::encode(&builder.free_slots),
            seed: builder.seed,
            num_keys: builder.num_keys,
            table_size: builder.table_size,
            partitioner: builder.partitioner,
            bucketer: builder.bucketer,
            hasher,
            displacement: PhantomData,
        })
    }
}

impl<B: Bucketer, P: PilotTable, D: Displacement, const MINIMAL: bool> Function<DefaultKeyHasher, B, P, D, MINIMAL> {
    /// Reads `Self` from the `input`.
    /// Only [`Function`]s that use the default hasher can be read by this method.
    pub fn read(input: &mut dyn io::Read) -> Result<Self, Error> {
        Self::read_with_hasher(input, Default::default())
    }

    /// Constructs [`Function`] for given distinct `keys`, using the default configuration
    /// adjusted to the type of the function.
    pub fn try_new<K: Hash + Sync>(keys: &[K]) -> Result<Self, Error> {
        Self::try_with_conf(keys, BuildConf { minimal: MINIMAL, search: D::KIND, ..Default::default() })
    }

    /// Constructs [`Function`] for given distinct `keys`, using the default configuration
    /// adjusted to the type of the function.
    ///
    /// Panics if the construction fails.
    /// Then it is almost certain that the input contains duplicate keys.
    pub fn new<K: Hash + Sync>(keys: &[K]) -> Self {
        Self::with_conf(keys, BuildConf { minimal: MINIMAL, search: D::KIND, ..Default::default() })
    }
}

impl<K: Hash + Sync> From<&[K]> for Function {
    fn from(keys: &[K]) -> Self {
        Self::new(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucketer::{OptBucketer, TableBucketer};
    use crate::conf::Search;
    use crate::encoding::{Compact, Dictionary, Dual, Interleaved};
    use crate::search::Xor;
    use crate::utils::tests::{distinct_keys, test_mphf, test_phf};

    type Mphf<B = SkewBucketer, P = Flat, D = Additive> = Function<DefaultKeyHasher, B, P, D, true>;
    type Phf<B = SkewBucketer, P = Flat, D = Additive> = Function<DefaultKeyHasher, B, P, D, false>;

    fn test_read_write<B: Bucketer, P: PilotTable, D: Displacement, const MINIMAL: bool>(
        f: &Function<DefaultKeyHasher, B, P, D, MINIMAL>, keys: &[u64]
    ) {
        let mut buff = Vec::new();
        f.write(&mut buff).unwrap();
        assert_eq!(buff.len(), f.write_bytes());
        assert_eq!(f.num_bits(), 8 * buff.len());
        assert_eq!(f.num_bits(), f.num_bits_for_pilots() + f.num_bits_for_mapper());
        let read = Function::<DefaultKeyHasher, B, P, D, MINIMAL>::read(&mut &buff[..]).unwrap();
        assert_eq!(read.num_keys(), f.num_keys());
        assert_eq!(read.table_size(), f.table_size());
        assert_eq!(read.num_partitions(), f.num_partitions());
        assert_eq!(read.seed(), f.seed());
        assert_eq!(read.num_bits(), f.num_bits());
        assert_eq!(read.num_bits_for_pilots(), f.num_bits_for_pilots());
        assert_eq!(read.num_bits_for_mapper(), f.num_bits_for_mapper());
        for key in keys { assert_eq!(read.get(key), f.get(key)); }
    }

    #[test]
    fn five_keys_minimal() {
        let keys = [11u64, 23, 47, 91, 103];
        let conf = BuildConf { seed: 9, alpha: 1.0, lambda: 4.0, ..Default::default() };
        let (f, _) = <Mphf>::build(&keys, conf).unwrap();
        assert_eq!(f.num_keys(), 5);
        assert_eq!(f.table_size(), 5);
        assert_eq!(f.num_partitions(), 1);
        assert!(f.free_slots.is_empty());
        test_mphf(&keys, |key| f.get(key));
        assert!(f.get(&1000u64) < 5);
        test_read_write(&f, &keys);
    }

    #[test]
    fn five_keys_not_minimal() {
        let keys = [11u64, 23, 47, 91, 103];
        let conf = BuildConf { seed: 9, alpha: 0.5, lambda: 4.0, minimal: false, ..Default::default() };
        let (f, _) = <Phf>::build(&keys, conf).unwrap();
        assert_eq!(f.table_size(), 10);
        assert!(f.free_slots.is_empty());
        test_phf(10, keys, |key| f.get(key));
        test_read_write(&f, &keys);
    }

    #[test]
    fn many_keys_in_partitions() {
        let keys = distinct_keys(100_000, 11);
        let (f, timings) = <Mphf>::build(&keys, BuildConf::default()).unwrap();
        assert_eq!(f.num_partitions(), 34);
        assert!(f.table_size() >= 101_000);
        assert_eq!(f.free_slots.len() as u64, f.table_size() - f.num_keys());
        assert!(timings.total_us() >= timings.search_us);
        test_mphf(&keys, |key| f.get(key));
        assert!(f.bits_per_key() < 6.0, "{} bits/key", f.bits_per_key());
        assert!(f.size_bytes() * 8 < 6 * keys.len());
    }

    fn check_variant<B: Bucketer, P: PilotTable, D: Displacement>() {
        let keys = distinct_keys(5000, 3);
        let conf = BuildConf { search: D::KIND, avg_partition_size: 1000, threads: 1, ..Default::default() };
        let f = Mphf::<B, P, D>::try_with_conf(&keys, conf.clone()).unwrap();
        test_mphf(&keys, |key| f.get(key));
        test_read_write(&f, &keys);
        let f = Phf::<B, P, D>::try_with_conf(&keys, BuildConf { minimal: false, alpha: 0.9, ..conf }).unwrap();
        test_phf(f.table_size(), keys.iter().copied(), |key| f.get(key));
        test_read_write(&f, &keys);
    }

    fn check_bucketer<B: Bucketer>() {
        check_variant::<B, Flat, Additive>();
        check_variant::<B, Flat, Xor>();
        check_variant::<B, Interleaved, Additive>();
        check_variant::<B, Interleaved<Compact>, Xor>();
        check_variant::<B, Flat<Dual<Compact, Dictionary>>, Additive>();
    }

    #[test] fn uniform_bucketer() { check_bucketer::<UniformBucketer>(); }
    #[test] fn skew_bucketer() { check_bucketer::<SkewBucketer>(); }
    #[test] fn opt_bucketer() { check_bucketer::<OptBucketer>(); }
    #[test] fn table_bucketer() { check_bucketer::<TableBucketer>(); }

    #[test]
    fn string_keys() {
        let keys: Vec<String> = (0..3000).map(|i| format!("key-{i}")).collect();
        let f: Function = Function::from(&keys[..]);
        test_mphf(&keys, |key| f.get(key));
        assert_eq!(f.get("key-17"), f.get(&keys[17]));
    }

    #[test]
    fn partition_sizes_match_key_counts() {
        let keys = distinct_keys(20_000, 5);
        let conf = BuildConf { alpha: 1.0, avg_partition_size: 1000, ..Default::default() };
        let f = <Mphf>::try_with_conf(&keys, conf).unwrap();
        assert_eq!(f.num_partitions(), 20);
        assert_eq!(f.table_size(), 20_000);
        let mut counts = vec![0u64; 20];
        for key in &keys {
            counts[f.partitioner.bucket(f.hasher.hash(key, f.seed).mix()) as usize] += 1;
        }
        for (partition, count) in counts.into_iter().enumerate() {
            assert_eq!(f.offsets.access(partition + 1) - f.offsets.access(partition), count);
        }
        test_mphf(&keys, |key| f.get(key));
    }

    #[test]
    fn deterministic_and_independent_of_threads() {
        let keys = distinct_keys(20_000, 6);
        let serialized = |threads| {
            let f = <Mphf>::try_with_conf(&keys, BuildConf::mt(threads)).unwrap();
            let mut buff = Vec::new();
            f.write(&mut buff).unwrap();
            buff
        };
        let single = serialized(1);
        assert_eq!(single, serialized(1));
        assert_eq!(single, serialized(3));
        assert_eq!(single, serialized(0));
    }

    #[test]
    fn seed_changes_function() {
        let keys = distinct_keys(2000, 7);
        let f1 = <Mphf>::try_with_conf(&keys, BuildConf::seed(1)).unwrap();
        let f2 = <Mphf>::try_with_conf(&keys, BuildConf::seed(2)).unwrap();
        assert_eq!(f2.seed(), 2);
        assert!(keys.iter().any(|k| f1.get(k) != f2.get(k)));
    }

    #[test]
    fn duplicates() {
        assert!(matches!(<Mphf>::try_new(&[1, 2, 3, 1, 4]),
            Err(Error::Validation(ValidationError::DuplicateKeys { .. }))));
        assert!(matches!(<Mphf>::try_new(&["a", "a"]),
            Err(Error::Validation(ValidationError::DuplicateKeys { partition: 0 }))));
    }

    #[test]
    fn invalid_input() {
        assert!(matches!(<Mphf>::try_new::<u64>(&[]), Err(Error::Validation(ValidationError::NoKeys))));
        assert!(matches!(<Mphf>::try_with_conf(&[1, 2, 3], BuildConf::lambda_alpha(5.0, 1.5)),
            Err(Error::Validation(ValidationError::InvalidAlpha(_)))));
        assert!(matches!(<Mphf>::try_with_conf(&[1, 2, 3], BuildConf::lambda_alpha(0.0, 0.9)),
            Err(Error::Validation(ValidationError::InvalidLambda(_)))));
    }

    #[test]
    fn type_mismatch() {
        let keys = [1, 2, 3];
        assert!(matches!(<Mphf>::try_with_conf(&keys, BuildConf { minimal: false, ..Default::default() }),
            Err(Error::Validation(ValidationError::TypeMismatch("minimal")))));
        assert!(matches!(<Mphf>::try_with_conf(&keys, BuildConf { search: Search::Xor, ..Default::default() }),
            Err(Error::Validation(ValidationError::TypeMismatch("search")))));
        assert!(Mphf::<SkewBucketer, Flat, Xor>::try_new(&keys).is_ok());
        assert!(<Phf>::try_new(&keys).is_ok());
    }

    #[test]
    fn trial_limit_exceeded() {
        let keys = distinct_keys(10_000, 8);
        let conf = BuildConf { max_pilot_trials: 1, dense_partitioning: false, ..Default::default() };
        assert!(matches!(<Mphf>::try_with_conf(&keys, conf), Err(Error::Construction { trials: 1, .. })));
    }

    #[test]
    fn truncated_input() {
        let keys = distinct_keys(3000, 9);
        let f = <Mphf>::new(&keys);
        let mut buff = Vec::new();
        f.write(&mut buff).unwrap();
        for len in [0, 7, 8, 30, buff.len() / 2, buff.len() - 1] {
            assert!(matches!(<Mphf>::read(&mut &buff[..len]), Err(Error::Decode { .. })), "prefix of {len} bytes");
        }
    }

    #[test]
    fn corrupted_input() {
        let keys = distinct_keys(3000, 10);
        let mut buff = Vec::new();
        <Mphf>::new(&keys).write(&mut buff).unwrap();
        // number of partitions follows seed, number of keys and table size
        buff[24..32].fill(0);
        assert!(matches!(<Mphf>::read(&mut &buff[..]), Err(Error::Decode { field: "partitioner", .. })));
    }

    #[test]
    fn damaged_bucketer_is_rejected() {
        let keys = [11u64, 23, 47, 91, 103];
        let conf = BuildConf { seed: 9, alpha: 1.0, lambda: 4.0, ..Default::default() };
        let mut buff = Vec::new();
        <Mphf>::try_with_conf(&keys, conf).unwrap().write(&mut buff).unwrap();
        // number of dense buckets follows the number of partitions
        buff[32..40].copy_from_slice(&1000u64.to_le_bytes());
        assert!(matches!(<Mphf>::read(&mut &buff[..]), Err(Error::Decode { field: "bucketer", .. })));
    }

    #[test]
    fn minimality_is_checked_on_read() {
        let keys = distinct_keys(3000, 12);
        let conf = BuildConf { minimal: false, alpha: 0.8, ..Default::default() };
        let mut buff = Vec::new();
        <Phf>::try_with_conf(&keys, conf).unwrap().write(&mut buff).unwrap();
        assert!(matches!(<Mphf>::read(&mut &buff[..]), Err(Error::Decode { field: "free_slots", .. })));
        assert!(<Phf>::read(&mut &buff[..]).is_ok());
    }
}
