use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Define CLI arguments
#[derive(Parser, Debug)]
#[command(
    version,
    about = "Fetch files through a local CDN response cache",
    long_about = "Downloads files from a CDN through a local disk cache.\n\
                  \n\
                  Responses carrying Content-MD5 or a digest-shaped ETag are stored under\n\
                  their digest and re-verified on every hit. Responses with an Expires\n\
                  header (or any response in aggressive mode) are stored under a hash of\n\
                  the URL until they expire. Prefix --cache-dir with 'nogc://' to skip the\n\
                  start-up garbage collection."
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,

    /// Cache directory
    #[arg(
        long,
        global = true,
        help = "Directory for cached responses (prefix 'nogc://' to skip garbage collection)"
    )]
    pub cache_dir: Option<String>,

    /// Disable the cache
    #[arg(long, global = true, help = "Bypass the cache and always stream from the network")]
    pub no_cache: bool,

    /// Aggressive mode
    #[arg(
        long,
        global = true,
        help = "Cache every response by URL, even without validators, and serve fresh entries without a request"
    )]
    pub aggressive: bool,

    /// Maximum age of time-based entries, with optional unit (s, m, h)
    #[arg(
        long,
        global = true,
        default_value = "10m",
        help = "Upper bound on how long entries stay fresh. Examples: \"90s\", \"10m\", \"1h\""
    )]
    pub max_expire: String,

    /// Overall timeout in seconds
    #[arg(
        long,
        global = true,
        default_value = "0",
        help = "Overall timeout in seconds for HTTP requests (0 for none)"
    )]
    pub timeout: u64,

    /// Connection timeout in seconds
    #[arg(
        long,
        global = true,
        default_value = "10",
        help = "Connection timeout in seconds (time to establish initial connection)"
    )]
    pub connect_timeout: u64,

    /// Custom HTTP headers
    #[arg(
        long = "header",
        short = 'H',
        global = true,
        help = "Add custom HTTP header to requests (can be used multiple times). Format: 'Name: Value'",
        value_name = "HEADER"
    )]
    pub headers: Vec<String>,

    /// User agent override
    #[arg(long, global = true, help = "User-Agent sent with every request")]
    pub user_agent: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true, help = "Enable detailed debug logging")]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Download URLs through the cache
    Fetch {
        #[arg(required = true, help = "URL(s) to download")]
        urls: Vec<String>,

        #[arg(
            short,
            long,
            help = "Directory where downloaded files will be saved (a single URL without one goes to stdout)"
        )]
        output_dir: Option<PathBuf>,

        #[arg(long, default_value = "4", help = "Maximum number of concurrent downloads")]
        concurrency: usize,
    },

    /// Probe URLs with HEAD requests, reusing cached results
    Probe {
        #[arg(required = true, help = "URL(s) to probe")]
        urls: Vec<String>,
    },

    /// Garbage-collect the cache directory
    Gc {
        #[arg(long, help = "Delete every cached file, not only expired ones")]
        all: bool,
    },
}
