//! Configuration for the `sciplane` command-line driver.
//!
//! Options come from command-line arguments, with a `SCIPLANE_` environment
//! variable for every tunable and a default for each.
//!
//! # Environment Variables
//!
//! - `SCIPLANE_CACHE_PLANES` - Decoded planes kept per source (default: 16)
//! - `SCIPLANE_BLOCK_SIZE` - Read cache block size in bytes (default: 65536)
//! - `SCIPLANE_CACHE_BLOCKS` - Read cache capacity in blocks (default: 64)
//! - `SCIPLANE_RESYNC_LIMIT` - LZO marker scan limit in bytes (default: 65536)

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::engine::{EngineOptions, DEFAULT_PLANE_CACHE_CAPACITY, DEFAULT_RESYNC_LIMIT};
use crate::format::Region;
use crate::io::{DEFAULT_BLOCK_CACHE_CAPACITY, DEFAULT_BLOCK_SIZE};

// =============================================================================
// Default Values
// =============================================================================

/// Smallest accepted block size (1 KiB).
pub const MIN_BLOCK_SIZE: usize = 1024;

/// Largest accepted block size (16 MiB).
pub const MAX_BLOCK_SIZE: usize = 16 * 1024 * 1024;

// =============================================================================
// CLI Arguments
// =============================================================================

/// sciplane - detect and decode scientific image planes.
#[derive(Parser, Debug, Clone)]
#[command(name = "sciplane")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub options: GlobalOptions,

    #[command(subcommand)]
    pub command: Command,
}

/// Options shared by every subcommand.
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct GlobalOptions {
    /// Enable verbose logging (debug level).
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,

    /// Decoded planes kept in memory for compressed formats.
    #[arg(
        long,
        global = true,
        default_value_t = DEFAULT_PLANE_CACHE_CAPACITY,
        env = "SCIPLANE_CACHE_PLANES"
    )]
    pub cache_planes: usize,

    /// Block size in bytes for the read cache.
    #[arg(
        long,
        global = true,
        default_value_t = DEFAULT_BLOCK_SIZE,
        env = "SCIPLANE_BLOCK_SIZE"
    )]
    pub block_size: usize,

    /// Number of blocks kept by the read cache.
    #[arg(
        long,
        global = true,
        default_value_t = DEFAULT_BLOCK_CACHE_CAPACITY,
        env = "SCIPLANE_CACHE_BLOCKS"
    )]
    pub cache_blocks: usize,

    /// Bytes scanned for the next block marker after a corrupt LZO block.
    #[arg(
        long,
        global = true,
        default_value_t = DEFAULT_RESYNC_LIMIT,
        env = "SCIPLANE_RESYNC_LIMIT"
    )]
    pub resync_limit: usize,
}

/// Subcommands.
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Print the detected format name.
    Detect {
        /// Source file
        file: PathBuf,
    },

    /// Print descriptors, decoder, metadata and calibration as JSON.
    Info {
        /// Source file
        file: PathBuf,
    },

    /// Decode one plane to PNG or raw little-endian samples.
    Extract(ExtractConfig),
}

/// Arguments of `extract`.
#[derive(Args, Debug, Clone, PartialEq)]
pub struct ExtractConfig {
    /// Source file
    pub file: PathBuf,

    /// Series index.
    #[arg(long, default_value_t = 0)]
    pub series: usize,

    /// Linear plane index within the series.
    #[arg(long, default_value_t = 0)]
    pub plane: usize,

    /// Sub-rectangle as x,y,width,height. Defaults to the whole plane.
    #[arg(long)]
    pub region: Option<Region>,

    /// Output path. A `.raw` extension forces raw sample output.
    #[arg(short, long)]
    pub output: PathBuf,
}

impl ExtractConfig {
    /// Whether the output path asks for raw samples.
    pub fn wants_raw(&self) -> bool {
        self.output
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("raw"))
    }
}

impl GlobalOptions {
    /// Validate the options and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.block_size < MIN_BLOCK_SIZE || self.block_size > MAX_BLOCK_SIZE {
            return Err(format!(
                "block_size must be between {} and {} bytes",
                MIN_BLOCK_SIZE, MAX_BLOCK_SIZE
            ));
        }
        if self.cache_blocks == 0 {
            return Err("cache_blocks must be greater than 0".to_string());
        }
        if self.resync_limit == 0 {
            return Err("resync_limit must be greater than 0".to_string());
        }
        Ok(())
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            cache_planes: self.cache_planes,
            block_size: self.block_size,
            cache_blocks: self.cache_blocks,
            resync_limit: self.resync_limit,
        }
    }
}

impl Default for GlobalOptions {
    fn default() -> Self {
        Self {
            verbose: false,
            cache_planes: DEFAULT_PLANE_CACHE_CAPACITY,
            block_size: DEFAULT_BLOCK_SIZE,
            cache_blocks: DEFAULT_BLOCK_CACHE_CAPACITY,
            resync_limit: DEFAULT_RESYNC_LIMIT,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
