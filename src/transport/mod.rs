//! Directory transport: client-side `list`/`fetch` plus the server-side
//! pusher HTTP API they talk to.

mod client;
mod server;

pub use client::*;
pub use server::*;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::Result;

/// A snapshot of one remote filesystem entry, as returned by `/ls`.
///
/// Field names follow the wire format's PascalCase casing rather than Rust
/// `serde` defaults, since this value crosses an external, already-fixed
/// wire contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirEntry {
    #[serde(rename = "IsDir")]
    pub is_dir: bool,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Mode")]
    pub mode: u32,
    #[serde(rename = "Size")]
    pub size: u64,
    #[serde(rename = "ModTime", with = "time::serde::rfc3339")]
    pub mod_time: OffsetDateTime,
}

/// Body of a successful `/ls` response.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ListDirectoryResponse {
    #[serde(rename = "Entries")]
    pub entries: Vec<DirEntry>,
}

/// The operations an Action Generator and Executor need from the remote
/// pusher. Implemented by [`SimpleHttpTransport`] and
/// [`ConcurrentHttpTransport`]; kept generic (not `dyn`-dispatched) since
/// each executor worker owns exactly one concrete transport for its whole
/// lifetime.
pub trait Transport: Send + Sync {
    /// List the entries directly under `path` (relative to the remote root;
    /// `""`/`"."` denote the root).
    fn list(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<DirEntry>>> + Send;

    /// Fetch the full contents of the file at `path` into `dst`, an already
    /// open, writable file positioned at offset 0. Returns the number of
    /// bytes written.
    fn fetch(
        &self,
        path: &str,
        expected_size: u64,
        dst: &tokio::fs::File,
    ) -> impl std::future::Future<Output = Result<u64>> + Send;
}
