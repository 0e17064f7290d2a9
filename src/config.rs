use crate::types::Region;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Default number of open file handles per source.
pub const DEFAULT_POOL_SIZE: usize = 20;

/// Default number of records pulled per chunk.
pub const DEFAULT_BATCH_SIZE: usize = 2;

/// Default number of chunks buffered between a fetch task and its reader.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 2;

/// What a query does when its reference sequence name cannot be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum UnknownContigPolicy {
    /// Log a warning and return an empty stream.
    #[default]
    Empty,
    /// Fail the query with [`Error::UnknownContig`](crate::Error::UnknownContig).
    Error,
}

/// Tuning knobs for an [`IndexedSource`](crate::IndexedSource).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceOptions {
    pub pool_size: usize,
    pub batch_size: usize,
    pub channel_capacity: usize,
    pub unknown_contig: UnknownContigPolicy,
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
            batch_size: DEFAULT_BATCH_SIZE,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            unknown_contig: UnknownContigPolicy::default(),
        }
    }
}

impl SourceOptions {
    pub fn pool_size(mut self, n: usize) -> Self {
        self.pool_size = n.max(1);
        self
    }

    pub fn batch_size(mut self, n: usize) -> Self {
        self.batch_size = n.max(1);
        self
    }

    pub fn channel_capacity(mut self, n: usize) -> Self {
        self.channel_capacity = n.max(1);
        self
    }

    pub fn unknown_contig(mut self, policy: UnknownContigPolicy) -> Self {
        self.unknown_contig = policy;
        self
    }

    /// Clamp every size to at least one.
    pub(crate) fn normalized(self) -> Self {
        let (pool_size, batch_size, channel_capacity) =
            (self.pool_size, self.batch_size, self.channel_capacity);
        self.pool_size(pool_size)
            .batch_size(batch_size)
            .channel_capacity(channel_capacity)
    }

    /// Number of scratch buffers backing a source: one batch per handle.
    pub fn scratch_pool_size(&self) -> usize {
        self.pool_size.max(1) * self.batch_size.max(1)
    }
}

#[derive(Debug, Clone, Parser)]
#[command(name = "tbxpool")]
#[command(about = "Region queries over a tabix-indexed file")]
pub struct Config {
    /// BGZF-compressed, tabix-indexed data file
    #[arg(env = "TBXPOOL_PATH")]
    pub path: PathBuf,

    /// Regions to print (e.g. chr1:50000-90000, 0-based half-open). Without
    /// any, every record of the file is queried back and timed.
    #[arg(short = 'R', long = "region")]
    pub regions: Vec<Region>,

    /// Number of open file handles shared by all queries
    #[arg(long, env = "TBXPOOL_POOL_SIZE", default_value_t = DEFAULT_POOL_SIZE)]
    pub pool_size: usize,

    /// Records pulled per chunk
    #[arg(long, env = "TBXPOOL_BATCH_SIZE", default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,

    /// Chunks buffered between a fetch task and its reader
    #[arg(long, env = "TBXPOOL_CHANNEL_CAPACITY", default_value_t = DEFAULT_CHANNEL_CAPACITY)]
    pub channel_capacity: usize,

    /// Behavior for reference names missing from the index
    #[arg(long, env = "TBXPOOL_UNKNOWN_CONTIG", value_enum, default_value = "empty")]
    pub unknown_contig: UnknownContigPolicy,

    /// Maximum number of queries in flight
    #[arg(short, long, env = "TBXPOOL_CONCURRENCY", default_value = "8")]
    pub concurrency: usize,

    /// Number of passes over the input records
    #[arg(short, long, env = "TBXPOOL_ROUNDS", default_value = "1")]
    pub rounds: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,
}

impl From<&Config> for SourceOptions {
    fn from(config: &Config) -> Self {
        SourceOptions::default()
            .pool_size(config.pool_size)
            .batch_size(config.batch_size)
            .channel_capacity(config.channel_capacity)
            .unknown_contig(config.unknown_contig)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = SourceOptions::default();
        assert_eq!(options.pool_size, 20);
        assert_eq!(options.batch_size, 2);
        assert_eq!(options.scratch_pool_size(), 40);
        assert_eq!(options.unknown_contig, UnknownContigPolicy::Empty);
    }

    #[test]
    fn test_zero_sizes_are_clamped() {
        let options = SourceOptions::default()
            .pool_size(0)
            .batch_size(0)
            .channel_capacity(0);
        assert_eq!(options.pool_size, 1);
        assert_eq!(options.batch_size, 1);
        assert_eq!(options.channel_capacity, 1);
    }

    #[test]
    fn test_config_defaults() {
        let config = Config::try_parse_from(["tbxpool", "sample.vcf.gz"]).unwrap();
        assert_eq!(config.path, PathBuf::from("sample.vcf.gz"));
        assert_eq!(config.concurrency, 8);
        assert!(config.regions.is_empty());
        assert_eq!(SourceOptions::from(&config), SourceOptions::default());
    }

    #[test]
    fn test_config_overrides() {
        let config = Config::try_parse_from([
            "tbxpool",
            "sample.vcf.gz",
            "--pool-size",
            "4",
            "--batch-size",
            "5",
            "--unknown-contig",
            "error",
            "-R",
            "chr1:100-200",
            "--region",
            "2",
        ])
        .unwrap();
        assert_eq!(
            config.regions,
            vec![Region::new("chr1", 100, 200), Region::whole("2")]
        );
        let options = SourceOptions::from(&config);
        assert_eq!(options.pool_size, 4);
        assert_eq!(options.scratch_pool_size(), 20);
        assert_eq!(options.unknown_contig, UnknownContigPolicy::Error);
    }
}
