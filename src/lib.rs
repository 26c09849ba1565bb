//! # hopsync
//!
//! hopsync pushes a local directory tree to a remote host over a tunneled
//! HTTP transport. A pusher process exposes a small read-only HTTP API onto
//! its local filesystem (directory listing plus ranged file fetch); a puller
//! process, typically spawned over SSH on the remote host, walks that API
//! and reproduces the tree locally: creating missing directories and files,
//! and updating entries whose size, mode, or mtime differ.
//!
//! ## What it does not do
//!
//! No checksum verification, no deletion of extraneous destination entries,
//! no symlink/device/xattr handling, no resumption of partial transfers, no
//! HTTP authentication. Identity is decided purely from size, mode, and
//! mtime.
//!
//! ## Quick start
//!
//! ```no_run
//! use hopsync::config::ClientOpts;
//! use hopsync::core::{ActionGenerator, ExecutorPool};
//! use hopsync::progress::Counters;
//! use hopsync::transport::{ConcurrentHttpTransport, ConcurrentTransferOpts, SimpleHttpTransport};
//! use std::sync::Arc;
//!
//! # async fn run(opts: ClientOpts) -> hopsync::error::Result<()> {
//! let list_transport = SimpleHttpTransport::new(format!("{}:{}", opts.base_url, opts.base_port));
//! let mut generator = ActionGenerator::new(list_transport, opts.path.clone());
//! let actions = generator.take_actions();
//!
//! let pool = ExecutorPool::new(opts.path.clone(), opts.copy_threads);
//! let counters = Counters::new();
//! let cancel = Arc::new(tokio::sync::Notify::new());
//!
//! let base_url = opts.base_url.clone();
//! let base_port = opts.base_port;
//! let transfer_channels = opts.transfer_channels;
//! let concurrent_opts = ConcurrentTransferOpts {
//!     threshold: opts.split_threshold_bytes,
//!     concurrency: opts.split_concurrency,
//! };
//!
//! // The pool runs in its own task so it can drain the queue while the
//! // generator walks. The generator is dropped once it returns so its queue
//! // sender goes away and the pool's receiver sees the stream end; `cancel`
//! // is then notified as the pool's done signal too.
//! let pool_cancel = cancel.clone();
//! let pool_handle = tokio::spawn(async move {
//!     pool.run(
//!         actions,
//!         move |w| {
//!             let port = base_port + (w % transfer_channels) as u16;
//!             ConcurrentHttpTransport::new(format!("{base_url}:{port}"), concurrent_opts)
//!         },
//!         counters,
//!         pool_cancel,
//!     )
//!     .await
//! });
//!
//! let result = generator.generate(".".to_string()).await;
//! drop(generator);
//! cancel.notify_waiters();
//! let _ = pool_handle.await;
//! result?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod core;
pub mod error;
pub mod progress;
pub mod remote;
pub mod transport;

pub use error::{HopsyncError, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    //! Convenient re-exports for common usage
    //!
    //! ```no_run
    //! use hopsync::prelude::*;
    //! ```

    pub use crate::config::{CliArgs, ClientOpts, ServerOpts};
    pub use crate::core::{Action, ActionGenerator, ActionKind, ExecutorPool};
    pub use crate::error::{HopsyncError, Result};
    pub use crate::progress::{Counters, Sampler};
    pub use crate::transport::{ConcurrentHttpTransport, DirEntry, SimpleHttpTransport, Transport};
}
