//! Build configuration.

use crate::error::ValidationError;
use crate::hash::DefaultKeyHasher;

/// Method of displacing keys of a bucket by its pilot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Search {
    /// Slot is `(mix(second ^ hash(pilot / size)) + pilot % size) mod size`;
    /// pilots are tried in order, so consecutive ones shift the bucket by one slot
    #[default]
    Additive,
    /// Slot is `mix(second ^ hash(pilot)) mod size`
    Xor,
}

/// Build configuration that is accepted by [`Function`](crate::Function) constructors.
///
/// See field descriptions for details.
#[derive(Clone)]
pub struct BuildConf<S = DefaultKeyHasher> {
    /// The function used to fingerprint keys. (default: [`DefaultKeyHasher`])
    pub hasher: S,

    /// Seed of the key fingerprints and of the pilot hashes. (default: [`BuildConf::DEFAULT_SEED`])
    pub seed: u64,

    /// Average number of keys per bucket. (default: `5.0`)
    ///
    /// Larger values give smaller functions at the expense of slower construction.
    pub lambda: f64,

    /// Load factor, i.e. number of keys divided by table size, in the range `(0, 1]`. (default: `0.99`)
    ///
    /// Smaller values speed up construction, but
    /// minimal functions need more space to remap keys placed beyond `[0, number of keys)`.
    pub alpha: f64,

    /// Method of displacing keys by pilots. (default: [`Search::Additive`])
    pub search: Search,

    /// Whether the function maps keys to `[0, number of keys)`. (default: `true`)
    pub minimal: bool,

    /// Whether to split keys into partitions of about [`avg_partition_size`](BuildConf::avg_partition_size) keys,
    /// which are built independently (and in parallel). (default: `true`)
    pub dense_partitioning: bool,

    /// Average number of keys in each partition. (default: `3000`)
    pub avg_partition_size: u64,

    /// Whether buckets of equal size are processed in order of their indices. (default: `true`)
    ///
    /// Either way, the order is deterministic.
    pub secondary_sort: bool,

    /// Number of threads used for construction. (default: `0`)
    ///
    /// `0` means the default [rayon] thread pool, `1` disables parallelism.
    pub threads: usize,

    /// Whether to log the configuration and construction progress with `tracing`. (default: `false`)
    pub verbose: bool,

    /// The maximum number of pilots tried for a single bucket. (default: [`BuildConf::DEFAULT_MAX_PILOT_TRIALS`])
    ///
    /// Construction fails with [`Error::Construction`](crate::Error::Construction) when it is exceeded.
    pub max_pilot_trials: u64,
}

impl Default for BuildConf {
    fn default() -> Self {
        Self::hash(Default::default())
    }
}

impl BuildConf {
    /// Returns configuration that uses custom [`seed`](BuildConf::seed).
    pub fn seed(seed: u64) -> Self {
        Self { seed, ..Default::default() }
    }

    /// Returns configuration that uses custom [`lambda`](BuildConf::lambda) and [`alpha`](BuildConf::alpha).
    pub fn lambda_alpha(lambda: f64, alpha: f64) -> Self {
        Self { lambda, alpha, ..Default::default() }
    }

    /// Returns configuration that uses given number of [`threads`](BuildConf::threads).
    pub fn mt(threads: usize) -> Self {
        Self { threads, ..Default::default() }
    }
}

impl<S> BuildConf<S> {
    /// The default value for [`seed`](BuildConf::seed).
    pub const DEFAULT_SEED: u64 = 0x123456789;

    /// The default value for [`max_pilot_trials`](BuildConf::max_pilot_trials).
    pub const DEFAULT_MAX_PILOT_TRIALS: u64 = 1 << 30;

    /// Returns configuration that uses custom [`hasher`](BuildConf::hasher).
    pub fn hash(hasher: S) -> Self {
        Self {
            hasher,
            seed: Self::DEFAULT_SEED,
            lambda: 5.0,
            alpha: 0.99,
            search: Search::Additive,
            minimal: true,
            dense_partitioning: true,
            avg_partition_size: 3000,
            secondary_sort: true,
            threads: 0,
            verbose: false,
            max_pilot_trials: Self::DEFAULT_MAX_PILOT_TRIALS,
        }
    }

    /// Checks whether the parameters are valid.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(self.alpha > 0.0 && self.alpha <= 1.0) {
            return Err(ValidationError::InvalidAlpha(self.alpha));
        }
        if !(self.lambda > 0.0 && self.lambda.is_finite()) {
            return Err(ValidationError::InvalidLambda(self.lambda));
        }
        if self.dense_partitioning && self.avg_partition_size == 0 {
            return Err(ValidationError::InvalidPartitionSize);
        }
        if self.max_pilot_trials == 0 {
            return Err(ValidationError::InvalidTrialLimit);
        }
        Ok(())
    }

    /// Returns the number of partitions for `num_keys` keys.
    pub fn num_partitions(&self, num_keys: u64) -> u64 {
        if self.dense_partitioning {
            num_keys.div_ceil(self.avg_partition_size).max(1)
        } else {
            1
        }
    }

    /// Returns the number of buckets in each partition for `num_keys` keys split into `num_partitions` partitions.
    pub fn buckets_per_partition(&self, num_keys: u64, num_partitions: u64) -> u64 {
        ((num_keys as f64 / num_partitions as f64) / self.lambda).ceil().max(1.0) as u64
    }

    /// Returns the number of slots of a partition with `num_keys` keys.
    pub fn partition_table_size(&self, num_keys: u64) -> u64 {
        ((num_keys as f64 / self.alpha).ceil() as u64).max(num_keys).max(1)
    }

    /// Logs configuration parameters via tracing.
    pub fn print(&self) {
        tracing::info!("Build Configuration:");
        tracing::info!("  seed = {}", self.seed);
        tracing::info!("  lambda = {}", self.lambda);
        tracing::info!("  alpha = {}", self.alpha);
        tracing::info!("  search = {:?}", self.search);
        tracing::info!("  minimal = {}", self.minimal);
        if self.dense_partitioning {
            tracing::info!("  avg_partition_size = {}", self.avg_partition_size);
        } else {
            tracing::info!("  single partition");
        }
        if self.threads == 0 {
            tracing::info!("  threads = all available cores");
        } else {
            tracing::info!("  threads = {}", self.threads);
        }
        tracing::debug!("  secondary_sort = {}", self.secondary_sort);
        tracing::debug!("  max_pilot_trials = {}", self.max_pilot_trials);
    }
}

/// Durations of construction phases, in microseconds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BuildTimings {
    /// Fingerprinting keys, assigning them to partitions and buckets, checking for duplicates
    pub mapping_us: u64,
    /// Searching for pilots and assembling free slots
    pub search_us: u64,
    /// Encoding pilots, offsets and free slots
    pub encoding_us: u64,
}

impl BuildTimings {
    /// Returns the total construction time.
    pub fn total_us(&self) -> u64 { self.mapping_us + self.search_us + self.encoding_us }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let conf = BuildConf::default();
        assert!(conf.validate().is_ok());
        assert_eq!(conf.search, Search::Additive);
        assert!(conf.minimal);
    }

    #[test]
    fn invalid_alpha() {
        for alpha in [0.0, -0.5, 1.01, f64::NAN] {
            let conf = BuildConf::lambda_alpha(5.0, alpha);
            assert!(matches!(conf.validate(), Err(ValidationError::InvalidAlpha(_))), "alpha {alpha}");
        }
        assert!(BuildConf::lambda_alpha(5.0, 1.0).validate().is_ok());
    }

    #[test]
    fn invalid_lambda() {
        for lambda in [0.0, -1.0, f64::INFINITY, f64::NAN] {
            let conf = BuildConf::lambda_alpha(lambda, 0.9);
            assert!(matches!(conf.validate(), Err(ValidationError::InvalidLambda(_))), "lambda {lambda}");
        }
    }

    #[test]
    fn invalid_partition_size_and_trials() {
        let conf = BuildConf { avg_partition_size: 0, ..Default::default() };
        assert_eq!(conf.validate(), Err(ValidationError::InvalidPartitionSize));
        let conf = BuildConf { avg_partition_size: 0, dense_partitioning: false, ..Default::default() };
        assert!(conf.validate().is_ok());
        let conf = BuildConf { max_pilot_trials: 0, ..Default::default() };
        assert_eq!(conf.validate(), Err(ValidationError::InvalidTrialLimit));
    }

    #[test]
    fn sizes() {
        let conf = BuildConf { avg_partition_size: 2000, lambda: 4.0, alpha: 1.0, ..Default::default() };
        assert_eq!(conf.num_partitions(70000), 35);
        assert_eq!(conf.num_partitions(70001), 36);
        assert_eq!(conf.num_partitions(5), 1);
        assert_eq!(conf.buckets_per_partition(70000, 35), 500);
        assert_eq!(conf.buckets_per_partition(5, 1), 2);
        assert_eq!(conf.partition_table_size(0), 1);
        assert_eq!(conf.partition_table_size(2000), 2000);
        let conf = BuildConf { dense_partitioning: false, alpha: 0.5, ..Default::default() };
        assert_eq!(conf.num_partitions(70000), 1);
        assert_eq!(conf.partition_table_size(5), 10);
    }
}
