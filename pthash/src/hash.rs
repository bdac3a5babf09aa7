//! 128-bit key fingerprints.

use std::hash::{Hash, Hasher};
use seedable_hash::{BuildDefaultSeededHasher, BuildSeededHasher};

/// 128-bit fingerprint of a key, seen through three 64-bit views.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Hash128 {
    first: u64,
    second: u64,
}

impl Hash128 {
    #[inline(always)] pub const fn new(first: u64, second: u64) -> Self { Self { first, second } }

    /// View used to select the bucket.
    #[inline(always)] pub const fn first(&self) -> u64 { self.first }

    /// View used as the base of displacement.
    #[inline(always)] pub const fn second(&self) -> u64 { self.second }

    /// View used to select the partition.
    #[inline(always)] pub const fn mix(&self) -> u64 { self.first ^ self.second }
}

/// Family of functions that calculate seeded [`Hash128`] fingerprints of keys.
///
/// The fingerprint must depend only on the key and the seed,
/// as it is computed again by each query.
pub trait KeyHasher {
    fn hash<K: Hash + ?Sized>(&self, key: &K, seed: u64) -> Hash128;
}

/// [`KeyHasher`] that uses 128-bit XXH3 from the `xxhash-rust` crate.
#[cfg(feature = "xxhash-rust")]
#[derive(Default, Copy, Clone, Debug)]
pub struct Xxh128;

#[cfg(feature = "xxhash-rust")]
impl KeyHasher for Xxh128 {
    #[inline]
    fn hash<K: Hash + ?Sized>(&self, key: &K, seed: u64) -> Hash128 {
        let mut h = xxhash_rust::xxh3::Xxh3::with_seed(seed);
        key.hash(&mut h);
        let digest = h.digest128();
        Hash128::new((digest >> 64) as u64, digest as u64)
    }
}

/// [`KeyHasher`] that combines two independent 64-bit hashes calculated by any [`BuildSeededHasher`].
#[derive(Default, Copy, Clone)]
pub struct SeededPair<S = BuildDefaultSeededHasher>(pub S);

impl<S: BuildSeededHasher> SeededPair<S> {
    #[inline(always)]
    fn half<K: Hash + ?Sized>(&self, key: &K, seed: u64, lane: u64) -> u64 {
        let mut h = self.0.build_hasher(lane);
        h.write_u64(seed);
        key.hash(&mut h);
        h.finish()
    }
}

impl<S: BuildSeededHasher> KeyHasher for SeededPair<S> {
    #[inline]
    fn hash<K: Hash + ?Sized>(&self, key: &K, seed: u64) -> Hash128 {
        Hash128::new(self.half(key, seed, 0), self.half(key, seed, 1))
    }
}

/// The default [`KeyHasher`].
#[cfg(feature = "xxhash-rust")]
pub type DefaultKeyHasher = Xxh128;

/// The default [`KeyHasher`].
#[cfg(not(feature = "xxhash-rust"))]
pub type DefaultKeyHasher = SeededPair;
