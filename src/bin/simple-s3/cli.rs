// CLI argument definitions using clap

use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "simple-s3")]
#[command(version)]
#[command(about = "Simple bucket and object operations for S3 compatible storage", long_about = None)]
pub struct Cli {
    /// Path to config file (default: ~/.simple-s3/config.yaml)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Timeout for the whole command, e.g. 30s, 1m30s
    #[arg(long, global = true, value_parser = simple_s3::config::parse_duration)]
    pub timeout: Option<Duration>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Make a bucket
    Mb(BucketArgs),
    /// Remove a bucket and every object in it
    Rb(BucketArgs),
    /// List buckets
    Lsb(LsbArgs),
    /// List object keys in a bucket
    Ls(LsArgs),
    /// Upload a local file
    Put(PutArgs),
    /// Download an object
    Get(GetArgs),
    /// Remove an object
    Rm(ObjectArgs),
}

#[derive(Args, Debug)]
pub struct BucketArgs {
    pub bucket: String,
}

#[derive(Args, Debug)]
pub struct LsbArgs {
    /// Only list buckets starting with this prefix
    #[arg(long)]
    pub prefix: Option<String>,
}

#[derive(Args, Debug)]
pub struct LsArgs {
    pub bucket: String,

    /// Only list keys starting with this prefix
    #[arg(long)]
    pub prefix: Option<String>,
}

#[derive(Args, Debug)]
pub struct PutArgs {
    /// Local file to upload
    pub file: PathBuf,
    pub bucket: String,
    pub key: String,
}

#[derive(Args, Debug)]
pub struct GetArgs {
    pub bucket: String,
    pub key: String,

    /// Write to file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ObjectArgs {
    pub bucket: String,
    pub key: String,
}
