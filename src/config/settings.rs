//! Configuration settings for hopsync
//!
//! Defines the CLI surface and the run-time options derived from it: the
//! `ClientOpts` bootstrapped into a spawned puller over stdin, and the
//! `ServerOpts` a pusher is started with.

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// hopsync - one-shot directory-tree synchronizer over a tunneled HTTP transport
#[derive(Parser, Debug, Clone)]
#[command(name = "hopsync")]
#[command(author = "hopsync contributors")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Push a local directory tree to a remote host over SSH")]
#[command(long_about = r#"
hopsync walks a local directory tree and reproduces it on a remote host,
tunneling the comparison and the file transfers through SSH-forwarded HTTP
ports. It creates missing directories and files, updates files whose size,
mode, or mtime differ, and leaves everything else untouched. It never deletes
extraneous destination entries and never follows symlinks.

Examples:
  hopsync /local/project myhost:/remote/project
  hopsync --copy-threads 8 --transfer-channels 4 /src myhost:/dst
  hopsync serve --path /srv/export --port 9999       # run just the pusher API
"#)]
pub struct CliArgs {
    /// Local source directory to push from
    #[arg(value_name = "LOCAL_SOURCE_PATH", required_unless_present = "command")]
    pub source: Option<PathBuf>,

    /// Remote target as host:path
    #[arg(value_name = "REMOTE_HOST:REMOTE_DEST_PATH", required_unless_present = "command")]
    pub destination: Option<String>,

    /// Starting port for the tunneled HTTP transport
    #[arg(long, default_value_t = 9594)]
    pub port: u16,

    /// Number of worker threads draining the action queue
    #[arg(long)]
    pub copy_threads: Option<usize>,

    /// Number of distinct SSH-forwarded HTTP channels to open
    #[arg(long)]
    pub transfer_channels: Option<usize>,

    /// Files at or above this size are split across multiple concurrent range requests
    #[arg(long, default_value = "10Gb")]
    pub split_threshold: String,

    /// Number of concurrent range requests used to fetch one large file
    #[arg(long, default_value_t = 4)]
    pub split_concurrency: u64,

    /// Remote binary to invoke over SSH (must support --spawn-client)
    #[arg(long, default_value = "hopsync")]
    pub remote_command: String,

    /// Internal: run as the spawned puller, reading ClientOpts as one JSON line on stdin
    #[arg(long, hide = true)]
    pub spawn_client: bool,

    /// Suppress the periodic progress line
    #[arg(short = 'q', long)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Ambient operational subcommands that sit alongside the default push workflow.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run only the pusher HTTP API in the foreground, without driving a sync
    Serve {
        /// Directory to serve
        #[arg(long)]
        path: PathBuf,

        /// Port to listen on
        #[arg(long, default_value_t = 9594)]
        port: u16,
    },
}

impl CliArgs {
    /// Resolve `--copy-threads`, defaulting to half the available parallelism
    /// (matching the original's `GOMAXPROCS(0)/2`), floored at 1.
    pub fn resolved_copy_threads(&self) -> usize {
        self.copy_threads.unwrap_or_else(|| (num_cpus::get() / 2).max(1))
    }

    /// Resolve `--transfer-channels`, same default rule as copy-threads.
    pub fn resolved_transfer_channels(&self) -> usize {
        self.transfer_channels.unwrap_or_else(|| (num_cpus::get() / 2).max(1))
    }

    /// Validate and split `host:path` into its two components.
    pub fn split_remote_target(target: &str) -> Result<(&str, &str), String> {
        match target.split_once(':') {
            Some((host, path)) => Ok((host, path)),
            None => Err(format!(
                "remote target '{target}' must be of the form host:path"
            )),
        }
    }
}

/// Options bootstrapped into a spawned puller process as a single line of JSON
/// on stdin. Field names are plain `serde` defaults (snake_case) since, unlike
/// the `DirEntry` wire format, this value is produced and consumed entirely
/// by this binary and never crosses an external wire contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientOpts {
    /// Local destination root to reproduce the remote tree under
    pub path: PathBuf,
    /// Base URL of the pusher, e.g. "http://localhost"
    pub base_url: String,
    /// First port the pusher is reachable on
    pub base_port: u16,
    /// Number of distinct tunneled HTTP channels
    pub transfer_channels: usize,
    /// Number of worker threads draining the action queue
    pub copy_threads: usize,
    /// Size threshold above which a fetch is split across concurrent ranges
    pub split_threshold_bytes: u64,
    /// Number of concurrent range requests per split fetch
    pub split_concurrency: u64,
}

impl ClientOpts {
    /// Validate cross-field invariants: `copy_threads` must be a positive
    /// multiple of `transfer_channels`.
    pub fn validate(&self) -> Result<(), String> {
        if self.transfer_channels == 0 {
            return Err("transfer_channels must be at least 1".to_string());
        }
        if self.copy_threads == 0 {
            return Err("copy_threads must be at least 1".to_string());
        }
        if self.copy_threads % self.transfer_channels != 0 {
            return Err("--copy-threads should be divisible by --transfer-channels".to_string());
        }
        Ok(())
    }
}

/// Options a pusher process is configured with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerOpts {
    /// Root directory served by the pusher's HTTP API
    pub path: PathBuf,
}

/// Parse a human-readable byte size such as "10Gb", "512M", "128" (bytes).
///
/// Accepts TB/GB/MB/KB/B suffixes (case-insensitive, trailing "B" optional
/// except for the bare-byte case), matching the original CLI's
/// `humanize.ParseBytes`-style `--split-threshold` flag.
pub fn parse_size(size: &str) -> Result<u64, String> {
    let size = size.trim().to_uppercase();

    if size.is_empty() {
        return Err("empty size string".to_string());
    }

    let (num_str, multiplier) = if size.ends_with("TB") || size.ends_with('T') {
        let num = size.trim_end_matches(|c| c == 'T' || c == 'B');
        (num, 1024u64 * 1024 * 1024 * 1024)
    } else if size.ends_with("GB") || size.ends_with('G') {
        let num = size.trim_end_matches(|c| c == 'G' || c == 'B');
        (num, 1024u64 * 1024 * 1024)
    } else if size.ends_with("MB") || size.ends_with('M') {
        let num = size.trim_end_matches(|c| c == 'M' || c == 'B');
        (num, 1024u64 * 1024)
    } else if size.ends_with("KB") || size.ends_with('K') {
        let num = size.trim_end_matches(|c| c == 'K' || c == 'B');
        (num, 1024u64)
    } else if size.ends_with('B') {
        let num = size.trim_end_matches('B');
        (num, 1u64)
    } else {
        (size.as_str(), 1u64)
    };

    let num: f64 = num_str
        .trim()
        .parse()
        .map_err(|_| format!("invalid number: {num_str}"))?;

    Ok((num * multiplier as f64) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("128").unwrap(), 128);
        assert_eq!(parse_size("1K").unwrap(), 1024);
        assert_eq!(parse_size("1KB").unwrap(), 1024);
        assert_eq!(parse_size("10Gb").unwrap(), 10 * 1024 * 1024 * 1024);
        assert_eq!(parse_size("1.5M").unwrap(), (1.5 * 1024.0 * 1024.0) as u64);
        assert!(parse_size("").is_err());
    }

    #[test]
    fn test_split_remote_target() {
        let (host, path) = CliArgs::split_remote_target("myhost:/remote/path").unwrap();
        assert_eq!(host, "myhost");
        assert_eq!(path, "/remote/path");

        // Only the first ':' splits, so ports embedded in host are preserved
        // in the path portion, matching strings.SplitN(remote, ":", 2).
        let (host, path) = CliArgs::split_remote_target("myhost:C:/weird").unwrap();
        assert_eq!(host, "myhost");
        assert_eq!(path, "C:/weird");

        assert!(CliArgs::split_remote_target("no-colon-here").is_err());
    }

    #[test]
    fn test_client_opts_validate() {
        let mut opts = ClientOpts {
            path: PathBuf::from("/tmp"),
            base_url: "http://localhost".into(),
            base_port: 9594,
            transfer_channels: 4,
            copy_threads: 8,
            split_threshold_bytes: 1024,
            split_concurrency: 4,
        };
        assert!(opts.validate().is_ok());

        opts.copy_threads = 5;
        assert!(opts.validate().is_err());
    }
}
