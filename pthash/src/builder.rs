//! Construction of pilots, partition offsets and free slots.

use std::{hash::Hash, time::Instant};
use bitm::{BitAccess, BitVec};
use rayon::prelude::*;
use voracious_radix_sort::RadixSort;

use crate::bucketer::{Bucketer, UniformBucketer};
use crate::conf::{BuildConf, BuildTimings, Search};
use crate::error::{Error, ValidationError};
use crate::hash::{Hash128, KeyHasher};
use crate::search::{search_partition, Displacement, PartitionSearch, PilotHashes, SearchConf};
use crate::utils::{accumulative_sum, with_threads};

/// Mutable result of construction, before encoding.
///
/// It is consumed by [`Function::encode`](crate::Function::encode).
pub struct PartitionedBuilder<B> {
    pub(crate) seed: u64,
    pub(crate) num_keys: u64,
    pub(crate) table_size: u64,
    pub(crate) partitioner: UniformBucketer,
    pub(crate) bucketer: B,
    pub(crate) buckets_per_partition: u64,
    /// pilots of all buckets, partition after partition
    pub(crate) pilots: Box<[u64]>,
    pub(crate) offsets: Box<[u64]>,
    pub(crate) free_slots: Box<[u64]>,
    pub(crate) minimal: bool,
    pub(crate) search: Search,
}

/// Splits `data` into consecutive slices, the `i`-th one of length `begin[i+1]-begin[i]`.
fn split_at_begins<'a, T>(mut data: &'a mut [T], begin: &[usize]) -> Vec<&'a mut [T]> {
    let mut result = Vec::with_capacity(begin.len().saturating_sub(1));
    for w in begin.windows(2) {
        let (head, tail) = std::mem::take(&mut data).split_at_mut(w[1] - w[0]);
        result.push(head);
        data = tail;
    }
    result
}

/// Returns, for each slot `p` in `[num_keys, table_size)`, at index `p-num_keys`,
/// a slot in `[0, num_keys)` that is not `taken`.
///
/// Successive taken slots beyond `num_keys` get successive free slots, so the result is non-decreasing.
pub(crate) fn fill_free_slots(taken: &[u64], num_keys: u64, table_size: u64) -> Box<[u64]> {
    let mut free_slots = Vec::with_capacity((table_size - num_keys) as usize);
    let mut next_used_slot = num_keys;
    let mut last_free_slot = 0;
    let mut last_valid_free_slot = 0;
    loop {
        while last_free_slot < num_keys && taken.get_bit(last_free_slot as usize) { last_free_slot += 1; }
        if last_free_slot == num_keys { break; }
        // the number of free slots below num_keys equals the number of taken slots above
        while !taken.get_bit(next_used_slot as usize) {
            free_slots.push(last_free_slot);
            next_used_slot += 1;
        }
        free_slots.push(last_free_slot);
        last_valid_free_slot = last_free_slot;
        next_used_slot += 1;
        last_free_slot += 1;
    }
    while next_used_slot < table_size {
        free_slots.push(last_valid_free_slot);
        next_used_slot += 1;
    }
    free_slots.into_boxed_slice()
}

#[inline(always)]
fn pair(bucket: u64, hash: &Hash128) -> u128 {
    ((bucket as u128) << 64) | hash.second() as u128
}

impl<B: Bucketer> PartitionedBuilder<B> {
    /// Maps `keys` to partitions and buckets, and finds pilots of all buckets,
    /// using displacement `D` and build configuration `conf`.
    /// Durations of the phases are stored in `timings`.
    pub fn build<K, H, D>(keys: &[K], conf: &BuildConf<H>, timings: &mut BuildTimings) -> Result<Self, Error>
        where K: Hash + Sync, H: KeyHasher + Sync, D: Displacement
    {
        conf.validate()?;
        if keys.is_empty() { return Err(ValidationError::NoKeys.into()); }
        if conf.search != D::KIND { return Err(ValidationError::TypeMismatch("search").into()); }
        if conf.verbose { conf.print(); }
        with_threads(conf.threads, || Self::build_in_pool::<K, H, D>(keys, conf, timings))
    }

    fn build_in_pool<K, H, D>(keys: &[K], conf: &BuildConf<H>, timings: &mut BuildTimings) -> Result<Self, Error>
        where K: Hash + Sync, H: KeyHasher + Sync, D: Displacement
    {
        let num_keys = keys.len() as u64;
        let num_partitions = conf.num_partitions(num_keys);
        let buckets_per_partition = conf.buckets_per_partition(num_keys, num_partitions);
        let partitioner = UniformBucketer::new(num_partitions, conf.lambda, num_partitions, conf.alpha);
        let bucketer = B::new(buckets_per_partition, conf.lambda,
            conf.partition_table_size(num_keys.div_ceil(num_partitions)), conf.alpha);
        let sequential = conf.threads == 1;

        let start = Instant::now();
        // partition of each key and its (bucket, second) pair
        let locate = |key: &K| {
            let h = conf.hasher.hash(key, conf.seed);
            (partitioner.bucket(h.mix()) as usize, pair(bucketer.bucket(h.first()), &h))
        };
        let located: Vec<(usize, u128)> = if keys.len() > 4*2048 && !sequential {
            keys.par_iter().with_min_len(256).map(locate).collect()
        } else {
            keys.iter().map(locate).collect()
        };
        let mut partition_begin = vec![0usize; num_partitions as usize + 1];
        for (partition, _) in &located { partition_begin[*partition] += 1; }
        accumulative_sum(partition_begin.iter_mut());
        let mut pairs = vec![0u128; located.len()];
        let mut next = partition_begin.clone();
        for (partition, bucket_and_second) in located {
            pairs[next[partition]] = bucket_and_second;
            next[partition] += 1;
        }
        if num_partitions == 1 {
            if sequential { pairs.voracious_sort(); } else { pairs.voracious_mt_sort(rayon::current_num_threads()); }
        }
        let mut partitions = split_at_begins(&mut pairs, &partition_begin);
        partitions.par_iter_mut().enumerate().try_for_each(|(partition, pairs)| {
            if num_partitions != 1 { pairs.voracious_sort(); }
            if pairs.windows(2).any(|w| w[0] == w[1]) {
                Err(ValidationError::DuplicateKeys { partition: partition as u64 })
            } else {
                Ok(())
            }
        })?;
        let mut table_size = 0;
        let mut offsets = Vec::with_capacity(num_partitions as usize + 1);
        offsets.push(0);
        for w in partition_begin.windows(2) {
            table_size += conf.partition_table_size((w[1] - w[0]) as u64);
            offsets.push(table_size);
        }
        timings.mapping_us = start.elapsed().as_micros() as u64;
        if conf.verbose {
            tracing::info!("mapping took {} us: {} keys, {} partitions, {} buckets per partition, table size {}",
                timings.mapping_us, num_keys, num_partitions, buckets_per_partition, table_size);
        }

        let start = Instant::now();
        let pilot_hashes = PilotHashes::new(conf.seed);
        let search_conf = SearchConf {
            pilot_hashes: &pilot_hashes,
            buckets_per_partition,
            secondary_sort: conf.secondary_sort,
            max_pilot_trials: conf.max_pilot_trials,
        };
        let mut pilots = vec![0u64; (num_partitions * buckets_per_partition) as usize].into_boxed_slice();
        let searched: Vec<PartitionSearch> = partitions.into_par_iter()
            .zip(pilots.par_chunks_mut(buckets_per_partition as usize))
            .enumerate()
            .map(|(partition, (pairs, pilots))| search_partition::<D>(
                partition as u64, pairs, offsets[partition + 1] - offsets[partition], &search_conf, pilots))
            .collect::<Result<_, _>>()?;
        if conf.verbose {
            let total_trials: u64 = searched.iter().map(|s| s.total_trials).sum();
            let max_trials = searched.iter().map(|s| s.max_trials).max().unwrap_or(0);
            tracing::debug!("pilot search tried {} pilots in total and at most {} for a single bucket", total_trials, max_trials);
        }
        let free_slots = if conf.minimal && table_size > num_keys {
            let mut taken = Box::<[u64]>::with_zeroed_bits(table_size as usize);
            for (s, range) in searched.iter().zip(offsets.windows(2)) {
                for slot in range[0]..range[1] {
                    if s.taken.get_bit((slot - range[0]) as usize) { taken.set_bit(slot as usize); }
                }
            }
            fill_free_slots(&taken, num_keys, table_size)
        } else {
            Box::default()
        };
        timings.search_us = start.elapsed().as_micros() as u64;
        if conf.verbose {
            tracing::info!("search took {} us, {} free slots", timings.search_us, free_slots.len());
        }

        Ok(Self {
            seed: conf.seed,
            num_keys,
            table_size,
            partitioner,
            bucketer,
            buckets_per_partition,
            pilots,
            offsets: offsets.into_boxed_slice(),
            free_slots,
            minimal: conf.minimal,
            search: conf.search,
        })
    }

    /// Returns the number of keys.
    #[inline] pub fn num_keys(&self) -> u64 { self.num_keys }

    /// Returns the total number of slots in all partitions.
    #[inline] pub fn table_size(&self) -> u64 { self.table_size }

    /// Returns the number of partitions.
    #[inline] pub fn num_partitions(&self) -> u64 { self.partitioner.num_buckets() }

    /// Returns the number of buckets in each partition.
    #[inline] pub fn buckets_per_partition(&self) -> u64 { self.buckets_per_partition }

    /// Returns the pilots of all buckets, partition after partition.
    #[inline] pub fn pilots(&self) -> &[u64] { &self.pilots }

    /// Returns the offsets of partitions; the last one equals the table size.
    #[inline] pub fn offsets(&self) -> &[u64] { &self.offsets }

    /// Returns the free slots (empty if the function is not minimal).
    #[inline] pub fn free_slots(&self) -> &[u64] { &self.free_slots }
}
