//! Worker pool draining the Action queue and applying mutations to the
//! destination filesystem.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use filetime::FileTime;
use tokio::sync::{mpsc, Notify};

use crate::core::{Action, ActionKind};
use crate::error::{HopsyncError, Result};
use crate::progress::Counters;
use crate::transport::Transport;

/// Drains the Action queue produced by an `ActionGenerator`, applying each
/// mutation to `dest_root`. Each of `copy_threads` workers is bound to
/// transport channel `w % transfer_channels`.
pub struct ExecutorPool {
    dest_root: PathBuf,
    copy_threads: usize,
}

impl ExecutorPool {
    pub fn new(dest_root: impl Into<PathBuf>, copy_threads: usize) -> Self {
        Self {
            dest_root: dest_root.into(),
            copy_threads,
        }
    }

    /// Spawn `copy_threads` workers, each constructing its own transport via
    /// `make_transport(channel_index)`, and run them until `actions` is
    /// exhausted or `cancel` is notified.
    pub async fn run<T, F>(
        &self,
        actions: mpsc::Receiver<Action>,
        make_transport: F,
        counters: Arc<Counters>,
        cancel: Arc<Notify>,
    ) where
        T: Transport + 'static,
        F: Fn(usize) -> T,
    {
        let actions = Arc::new(tokio::sync::Mutex::new(actions));
        let mut workers = Vec::with_capacity(self.copy_threads);

        for w in 0..self.copy_threads {
            let transport = make_transport(w);
            let actions = actions.clone();
            let counters = counters.clone();
            let cancel = cancel.clone();
            let dest_root = self.dest_root.clone();

            workers.push(tokio::spawn(async move {
                loop {
                    let next = {
                        let mut rx = actions.lock().await;
                        tokio::select! {
                            biased;
                            _ = cancel.notified() => None,
                            action = rx.recv() => action,
                        }
                    };

                    let Some(action) = next else { break };
                    if let Err(e) = apply(&dest_root, &transport, &action, &counters).await {
                        tracing::error!(path = %action.path, kind = ?action.kind, error = %e, "action failed");
                    }
                }
            }));
        }

        for w in workers {
            let _ = w.await;
        }
    }
}

async fn apply<T: Transport>(dest_root: &Path, transport: &T, action: &Action, counters: &Counters) -> Result<()> {
    // The latch must fire on every control-flow exit, success or failure, so
    // waiting sub-generators never hang.
    let result = apply_inner(dest_root, transport, action, counters).await;
    action.done();
    result
}

async fn apply_inner<T: Transport>(dest_root: &Path, transport: &T, action: &Action, counters: &Counters) -> Result<()> {
    let local_path = dest_root.join(&action.path);
    let mtime = FileTime::from_unix_time(action.mtime.unix_timestamp(), 0);

    match action.kind {
        ActionKind::Mkdir => {
            tokio::fs::create_dir(&local_path)
                .await
                .map_err(|e| HopsyncError::io(&local_path, e))?;
            set_permissions(&local_path, action.mode)?;
            filetime::set_file_times(&local_path, FileTime::now(), mtime)
                .map_err(|e| HopsyncError::io(&local_path, e))?;
            counters.record_mkdir();
        }
        ActionKind::UpdateMeta => {
            set_permissions(&local_path, action.mode)?;
            filetime::set_file_times(&local_path, FileTime::now(), mtime)
                .map_err(|e| HopsyncError::io(&local_path, e))?;
            counters.record_update();
        }
        ActionKind::Copy => {
            let start = Instant::now();
            let file = tokio::fs::File::create(&local_path)
                .await
                .map_err(|e| HopsyncError::io(&local_path, e))?;

            // Mode/mtime are set before the fetch completes, matching the
            // original: a crash mid-fetch leaves a zero-length file whose
            // size mismatch will force a re-copy on the next run.
            set_permissions(&local_path, action.mode)?;
            filetime::set_file_times(&local_path, FileTime::now(), mtime)
                .map_err(|e| HopsyncError::io(&local_path, e))?;

            let bytes = transport.fetch(&action.path, action.size, &file).await?;
            let elapsed_ms = start.elapsed().as_millis() as u64;
            counters.record_copy(bytes, elapsed_ms);
        }
    }

    Ok(())
}

fn set_permissions(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).map_err(|e| HopsyncError::io(path, e))
}
