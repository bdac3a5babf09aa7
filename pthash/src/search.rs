//! Displacement of keys by pilots and the greedy pilot search within a partition.

use std::cmp::Reverse;
use bitm::{BitAccess, BitVec};

use crate::conf::Search;
use crate::error::Error;
use crate::utils::{accumulative_sum, mix64, hash64, FastMod};

/// Method of calculating the slot of a key from its fingerprint and the pilot of its bucket.
///
/// The same method is used by pilot search and by queries.
pub trait Displacement: Send + Sync + 'static {
    /// Corresponding configuration value.
    const KIND: Search;

    /// Returns the slot, in range `[0, size.divisor())`, of the key whose fingerprint has the given `second` view.
    /// `pilot_hash` must return `hash64(value, seed)`.
    fn position<PH: Fn(u64) -> u64>(second: u64, pilot: u64, size: &FastMod, pilot_hash: PH) -> u64;
}

/// Additive displacement. See [`Search::Additive`].
#[derive(Clone, Copy, Debug, Default)]
pub struct Additive;

impl Displacement for Additive {
    const KIND: Search = Search::Additive;

    #[inline(always)]
    fn position<PH: Fn(u64) -> u64>(second: u64, pilot: u64, size: &FastMod, pilot_hash: PH) -> u64 {
        let s = pilot / size.divisor();
        let d = pilot % size.divisor();
        size.reduce(mix64(second ^ pilot_hash(s)).wrapping_add(d))
    }
}

/// Xor displacement. See [`Search::Xor`].
#[derive(Clone, Copy, Debug, Default)]
pub struct Xor;

impl Displacement for Xor {
    const KIND: Search = Search::Xor;

    #[inline(always)]
    fn position<PH: Fn(u64) -> u64>(second: u64, pilot: u64, size: &FastMod, pilot_hash: PH) -> u64 {
        size.reduce(mix64(second ^ pilot_hash(pilot)))
    }
}

/// Cache of `hash64(value, seed)` for small values, shared read-only by all partitions.
pub(crate) struct PilotHashes {
    seed: u64,
    cache: Box<[u64]>,
}

impl PilotHashes {
    /// Number of cached values.
    pub(crate) const CACHED: u64 = 4096;

    pub(crate) fn new(seed: u64) -> Self {
        Self { seed, cache: (0..Self::CACHED).map(|v| hash64(v, seed)).collect() }
    }

    #[inline(always)]
    pub(crate) fn get(&self, value: u64) -> u64 {
        match self.cache.get(value as usize) {
            Some(h) => *h,
            None => hash64(value, self.seed)
        }
    }
}

/// Parameters of the search, common to all partitions.
pub(crate) struct SearchConf<'h> {
    pub(crate) pilot_hashes: &'h PilotHashes,
    pub(crate) buckets_per_partition: u64,
    pub(crate) secondary_sort: bool,
    pub(crate) max_pilot_trials: u64,
}

/// Result of a successful search in a single partition.
pub(crate) struct PartitionSearch {
    /// Bitmap of the slots occupied by the keys.
    pub(crate) taken: Box<[u64]>,
    /// Number of pilots tried for all buckets.
    pub(crate) total_trials: u64,
    /// The largest number of pilots tried for a single bucket.
    pub(crate) max_trials: u64,
}

/// Finds pilots for the buckets of the partition with the given index, `partition`,
/// and stores them in `pilots` (whose length is the number of buckets).
///
/// `pairs` must be sorted and contain, for each key of the partition, its bucket in the high
/// and the second fingerprint view in the low 64 bits.
pub(crate) fn search_partition<D: Displacement>(
    partition: u64, pairs: &[u128], table_size: u64, conf: &SearchConf, pilots: &mut [u64]
) -> Result<PartitionSearch, Error> {
    let mut bucket_begin = vec![0usize; conf.buckets_per_partition as usize + 1];
    for pair in pairs { bucket_begin[(pair >> 64) as usize] += 1; }
    accumulative_sum(bucket_begin.iter_mut());
    let bucket_size = |bucket: u64| bucket_begin[bucket as usize + 1] - bucket_begin[bucket as usize];

    let mut order: Vec<u64> = (0..conf.buckets_per_partition).filter(|b| bucket_size(*b) != 0).collect();
    if conf.secondary_sort {
        order.sort_by_key(|b| Reverse(bucket_size(*b)));
    } else {
        order.sort_unstable_by_key(|b| Reverse(bucket_size(*b)));
    }

    let size = FastMod::new(table_size);
    let mut taken = Box::<[u64]>::with_zeroed_bits(table_size as usize);
    let mut positions = Vec::new();
    let (mut total_trials, mut max_trials) = (0, 0);
    for bucket in order {
        let keys = &pairs[bucket_begin[bucket as usize]..bucket_begin[bucket as usize + 1]];
        let mut pilot = 0;
        'pilots: loop {
            if pilot == conf.max_pilot_trials {
                return Err(Error::Construction { partition, bucket, trials: pilot });
            }
            positions.clear();
            for pair in keys {
                let p = D::position(*pair as u64, pilot, &size, |v| conf.pilot_hashes.get(v));
                if taken.get_bit(p as usize) { pilot += 1; continue 'pilots; }
                positions.push(p);
            }
            positions.sort_unstable();
            if positions.windows(2).any(|w| w[0] == w[1]) { pilot += 1; continue; }
            break;
        }
        for p in &positions { taken.set_bit(*p as usize); }
        pilots[bucket as usize] = pilot;
        total_trials += pilot + 1;
        max_trials = max_trials.max(pilot + 1);
    }
    Ok(PartitionSearch { taken, total_trials, max_trials })
}
