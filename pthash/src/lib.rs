#![doc = include_str!("../README.md")]

pub mod utils;
pub mod hash;
pub use hash::{Hash128, KeyHasher, DefaultKeyHasher, SeededPair};
#[cfg(feature = "xxhash-rust")] pub use hash::Xxh128;

pub mod encoding;
pub mod bucketer;
pub use bucketer::{Bucketer, UniformBucketer, SkewBucketer, OptBucketer, TableBucketer};

mod error;
pub use error::{Error, ValidationError};

mod conf;
pub use conf::{BuildConf, BuildTimings, Search};

pub mod search;
pub use search::{Displacement, Additive, Xor};

pub mod builder;
pub use builder::PartitionedBuilder;

mod function;
pub use function::Function;

pub use seedable_hash::{BuildSeededHasher, BuildDefaultSeededHasher};
pub use dyn_size_of::GetSize;
