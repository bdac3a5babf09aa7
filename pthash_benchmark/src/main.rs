#![doc = include_str!("../README.md")]

use std::{error::Error, fs::File, hint::black_box, io::{BufReader, BufWriter, Write}, path::PathBuf, time::Instant};

use bitm::{BitAccess, BitVec};
use butils::XorShift64;
use clap::{Parser, ValueEnum};
use dyn_size_of::GetSize;
use pthash::{Additive, Bucketer, BuildConf, DefaultKeyHasher, Displacement, Function, OptBucketer, SkewBucketer, TableBucketer, UniformBucketer, Xor};
use pthash::encoding::{Compact, Dictionary, DictionaryDictionary, Flat, Interleaved, PilotTable};
use rayon::current_num_threads;

#[allow(non_camel_case_types)]
#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum BucketerKind {
    /// Uniform distribution of keys among buckets
    uniform,
    /// 60% of keys in 30% of buckets
    skew,
    /// Bucket sizes optimized for fast search
    opt,
    /// Bucket sizes optimized for fast search, evaluated by table interpolation
    table,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum PilotsKind {
    /// All pilots in a single dictionary-dictionary encoding (different dictionaries for front and back)
    DictionaryDictionary,
    /// All pilots in a single compact encoding
    Compact,
    /// Pilots interleaved by bucket index, each group in its own dictionary encoding
    Interleaved,
}

#[allow(non_camel_case_types)]
#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum SearchKind {
    /// Additive displacement
    additive,
    /// Xor displacement
    xor,
}

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
/// Benchmark of partitioned perfect hash functions built by pilot search.
pub struct Conf {
    /// The number of random keys to use
    #[arg(short='n', long, default_value_t = 1_000_000)]
    pub keys_num: usize,

    /// Average number of keys per bucket
    #[arg(short='l', long, default_value_t = 5.0)]
    pub lambda: f64,

    /// Load factor, in range (0, 1]
    #[arg(short='a', long, default_value_t = 0.99)]
    pub alpha: f64,

    /// Distribution of keys among buckets
    #[arg(long, value_enum, default_value_t = BucketerKind::skew)]
    pub bucketer: BucketerKind,

    /// Encoding of pilots
    #[arg(short='p', long, value_enum, default_value_t = PilotsKind::DictionaryDictionary)]
    pub pilots: PilotsKind,

    /// Displacement of keys by pilots
    #[arg(long, value_enum, default_value_t = SearchKind::additive)]
    pub search: SearchKind,

    /// Build function that is perfect but not minimal
    #[arg(long, default_value_t = false)]
    pub non_minimal: bool,

    /// Average number of keys per partition
    #[arg(long, default_value_t = 3000)]
    pub avg_partition_size: u64,

    /// Build a single partition
    #[arg(long, default_value_t = false)]
    pub single_partition: bool,

    /// Number of threads used for construction, 0 for all available
    #[arg(short='t', long, default_value_t = 0)]
    pub threads: usize,

    /// Seed of the key fingerprints
    #[arg(short='s', long, default_value_t = <BuildConf>::DEFAULT_SEED)]
    pub seed: u64,

    /// Number of times to perform the lookup test
    #[arg(short='q', long, default_value_t = 1)]
    pub lookup_runs: u32,

    /// Whether to check the validity of built function
    #[arg(short='v', long, default_value_t = false)]
    pub verify: bool,

    /// Write the function to the given file and check that it is read back correctly
    #[arg(short='o', long)]
    pub output: Option<PathBuf>,

    /// Log construction progress
    #[arg(long, default_value_t = false)]
    pub verbose: bool,
}

impl Conf {
    fn build_conf<D: Displacement>(&self, minimal: bool) -> BuildConf {
        BuildConf {
            seed: self.seed,
            lambda: self.lambda,
            alpha: self.alpha,
            search: D::KIND,
            minimal,
            dense_partitioning: !self.single_partition,
            avg_partition_size: self.avg_partition_size,
            threads: self.threads,
            verbose: self.verbose,
            ..Default::default()
        }
    }
}

type Result<T> = std::result::Result<T, Box<dyn Error>>;

/// Checks that `f` maps `keys` to distinct values below `range`.
fn verify<G: Fn(&u64) -> u64>(keys: &[u64], range: u64, f: G) -> Result<()> {
    let mut seen = Box::<[u64]>::with_zeroed_bits(range as usize);
    for key in keys {
        let value = f(key);
        if value >= range { return Err(format!("key {key} is mapped to {value}, out of range {range}").into()); }
        if seen.get_bit(value as usize) { return Err(format!("value {value} is assigned to more than one key").into()); }
        seen.set_bit(value as usize);
    }
    Ok(())
}

fn run<B: Bucketer, P: PilotTable, D: Displacement, const MINIMAL: bool>(conf: &Conf, keys: &[u64]) -> Result<()> {
    let (f, timings) = Function::<DefaultKeyHasher, B, P, D, MINIMAL>::build(keys, conf.build_conf::<D>(MINIMAL))?;
    let per_key = |bits: usize| bits as f64 / keys.len() as f64;
    println!("partitions: {}, table size: {}", f.num_partitions(), f.table_size());
    println!("construction [us]: mapping {}, search {}, encoding {}, total {}",
        timings.mapping_us, timings.search_us, timings.encoding_us, timings.total_us());
    println!("size [bits/key]: {:.4} (pilots {:.4}, mapper {:.4}); {} bytes in memory",
        f.bits_per_key(), per_key(f.num_bits_for_pilots()), per_key(f.num_bits_for_mapper()), f.size_bytes());

    let start = Instant::now();
    for _ in 0..conf.lookup_runs {
        for key in keys { black_box(f.get(key)); }
    }
    let lookups = conf.lookup_runs as u128 * keys.len() as u128;
    if lookups != 0 {
        println!("lookup [ns/key]: {:.2}", start.elapsed().as_nanos() as f64 / lookups as f64);
    }

    let range = if MINIMAL { f.num_keys() } else { f.table_size() };
    if conf.verify {
        verify(keys, range, |k| f.get(k))?;
        println!("verification: OK");
    }

    if let Some(path) = &conf.output {
        let mut output = BufWriter::new(File::create(path)?);
        f.write(&mut output)?;
        output.flush()?;
        drop(output);
        let read = Function::<DefaultKeyHasher, B, P, D, MINIMAL>::read(&mut BufReader::new(File::open(path)?))?;
        if keys.iter().any(|k| read.get(k) != f.get(k)) {
            return Err(format!("function read from {} differs from the one written", path.display()).into());
        }
        println!("written to {} ({} bytes) and read back", path.display(), f.write_bytes());
    }
    Ok(())
}

fn with_search<B: Bucketer, P: PilotTable>(conf: &Conf, keys: &[u64]) -> Result<()> {
    match (conf.search, conf.non_minimal) {
        (SearchKind::additive, false) => run::<B, P, Additive, true>(conf, keys),
        (SearchKind::additive, true) => run::<B, P, Additive, false>(conf, keys),
        (SearchKind::xor, false) => run::<B, P, Xor, true>(conf, keys),
        (SearchKind::xor, true) => run::<B, P, Xor, false>(conf, keys),
    }
}

fn with_pilots<B: Bucketer>(conf: &Conf, keys: &[u64]) -> Result<()> {
    match conf.pilots {
        PilotsKind::DictionaryDictionary => with_search::<B, Flat<DictionaryDictionary>>(conf, keys),
        PilotsKind::Compact => with_search::<B, Flat<Compact>>(conf, keys),
        PilotsKind::Interleaved => with_search::<B, Interleaved<Dictionary>>(conf, keys),
    }
}

fn with_bucketer(conf: &Conf, keys: &[u64]) -> Result<()> {
    match conf.bucketer {
        BucketerKind::uniform => with_pilots::<UniformBucketer>(conf, keys),
        BucketerKind::skew => with_pilots::<SkewBucketer>(conf, keys),
        BucketerKind::opt => with_pilots::<OptBucketer>(conf, keys),
        BucketerKind::table => with_pilots::<TableBucketer>(conf, keys),
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let conf: Conf = Conf::parse();
    if conf.threads == 0 {
        println!("multi-threaded construction uses {} threads (to set by the RAYON_NUM_THREADS environment variable)", current_num_threads());
    }
    let keys: Vec<u64> = XorShift64(1234).take(conf.keys_num).collect();
    if let Err(e) = with_bucketer(&conf, &keys) {
        tracing::error!("{e}");
        std::process::exit(1);
    }
}
