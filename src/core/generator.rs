//! Recursive remote/local tree differ producing the Action stream.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use time::OffsetDateTime;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::core::{Action, ActionKind};
use crate::error::{HopsyncError, Result};
use crate::transport::{DirEntry, Transport};

/// Queue capacity: the sole backpressure mechanism between the generator and
/// the executor pool.
const ACTION_QUEUE_CAPACITY: usize = 64;

struct Inner<T: Transport> {
    transport: T,
    local_root: PathBuf,
    sender: mpsc::Sender<Action>,
}

impl<T: Transport + Send + Sync + 'static> Inner<T> {
    async fn enqueue(&self, kind: ActionKind, path: String, mode: u32, mtime: OffsetDateTime, size: u64) -> Action {
        let action = Action::new(kind, path, mode, mtime, size);
        // Backpressure: this await suspends the walk when the queue is full.
        let _ = self.sender.send(action.clone()).await;
        action
    }
}

/// Walks the remote tree depth-first, diffs it against the local tree, and
/// emits a parent-before-child ordered stream of [`Action`]s.
pub struct ActionGenerator<T: Transport> {
    inner: Arc<Inner<T>>,
    receiver: Option<mpsc::Receiver<Action>>,
}

impl<T: Transport + Send + Sync + 'static> ActionGenerator<T> {
    pub fn new(transport: T, local_root: impl Into<PathBuf>) -> Self {
        let (sender, receiver) = mpsc::channel(ACTION_QUEUE_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                transport,
                local_root: local_root.into(),
                sender,
            }),
            receiver: Some(receiver),
        }
    }

    /// Take the receiving end of the action queue. Panics if called more
    /// than once; the queue is single-producer/single-consumer-pool.
    pub fn take_actions(&mut self) -> mpsc::Receiver<Action> {
        self.receiver.take().expect("actions() called more than once")
    }

    /// Diff the remote directory at `path` (relative to the root; `"."` for
    /// the root) against its local counterpart, recursing into
    /// subdirectories and enqueueing Actions as it goes. Returns the first
    /// directly-observed error; errors from spawned sub-walks are logged
    /// only.
    pub async fn generate(&self, path: String) -> Result<()> {
        generate_inner(self.inner.clone(), path).await
    }
}

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

fn generate_inner<T: Transport + Send + Sync + 'static>(inner: Arc<Inner<T>>, path: String) -> BoxFuture<'static, Result<()>> {
    Box::pin(async move {
        let source_items = inner.transport.list(&path).await?;

        let local_dir = if path == "." || path.is_empty() {
            inner.local_root.clone()
        } else {
            inner.local_root.join(&path)
        };
        let dest_items = read_local_dir(&local_dir)?;

        let mut dest_map: HashMap<String, LocalEntry> = HashMap::new();
        for item in dest_items {
            dest_map.insert(item.name.clone(), item);
        }

        let mut pending_parent: Option<Action> = None;
        let mut join_set: JoinSet<()> = JoinSet::new();

        for src_item in &source_items {
            let child_path = join_relative(&path, &src_item.name);
            let dest_item = dest_map.get(&src_item.name);

            match dest_item {
                None => {
                    if src_item.is_dir {
                        let action = inner
                            .enqueue(ActionKind::Mkdir, child_path.clone(), src_item.mode, src_item.mod_time, src_item.size)
                            .await;
                        pending_parent = Some(action);
                    } else {
                        inner
                            .enqueue(ActionKind::Copy, child_path.clone(), src_item.mode, src_item.mod_time, src_item.size)
                            .await;
                    }
                }
                Some(dest) => {
                    if src_item.is_dir != dest.is_dir {
                        tracing::warn!(
                            path = %child_path,
                            src_is_dir = src_item.is_dir,
                            dest_is_dir = dest.is_dir,
                            "skipping path: type mismatch between source and destination"
                        );
                        continue;
                    }

                    let changed = dest.mtime != src_item.mod_time || dest.mode != src_item.mode;
                    if !src_item.is_dir {
                        if dest.size != src_item.size || changed {
                            inner
                                .enqueue(ActionKind::Copy, child_path.clone(), src_item.mode, src_item.mod_time, src_item.size)
                                .await;
                        }
                    } else if changed {
                        inner
                            .enqueue(ActionKind::UpdateMeta, child_path.clone(), src_item.mode, src_item.mod_time, src_item.size)
                            .await;
                    }
                }
            }

            if src_item.is_dir {
                let dep = pending_parent.clone();
                let inner = inner.clone();
                let child_path = child_path.clone();
                join_set.spawn(async move {
                    if let Some(dep) = dep {
                        dep.wait().await;
                    }
                    if let Err(e) = generate_inner(inner, child_path.clone()).await {
                        tracing::warn!(path = %child_path, error = %e, "generate sub-error");
                    }
                });
            }
        }

        while join_set.join_next().await.is_some() {}

        Ok(())
    })
}

fn join_relative(parent: &str, name: &str) -> String {
    if parent == "." || parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}/{name}")
    }
}

struct LocalEntry {
    name: String,
    is_dir: bool,
    mode: u32,
    mtime: OffsetDateTime,
    size: u64,
}

fn read_local_dir(dir: &Path) -> Result<Vec<LocalEntry>> {
    use std::os::unix::fs::PermissionsExt;

    let mut out = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(|e| HopsyncError::io(dir, e))? {
        let entry = entry.map_err(|e| HopsyncError::io(dir, e))?;
        let metadata = entry.metadata().map_err(|e| HopsyncError::io(entry.path(), e))?;
        let mtime = metadata
            .modified()
            .map(OffsetDateTime::from)
            .unwrap_or(OffsetDateTime::UNIX_EPOCH);

        out.push(LocalEntry {
            name: entry.file_name().to_string_lossy().into_owned(),
            is_dir: metadata.is_dir(),
            mode: metadata.permissions().mode(),
            mtime,
            size: metadata.len(),
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use tempfile::tempdir;

    #[derive(Clone)]
    struct FakeTransport {
        entries: Arc<HashMap<String, Vec<DirEntry>>>,
        fetched: Arc<StdMutex<Vec<String>>>,
    }

    impl Transport for FakeTransport {
        async fn list(&self, path: &str) -> Result<Vec<DirEntry>> {
            Ok(self.entries.get(path).cloned().unwrap_or_default())
        }

        async fn fetch(&self, path: &str, _size: u64, _dst: &tokio::fs::File) -> Result<u64> {
            self.fetched.lock().unwrap().push(path.to_string());
            Ok(0)
        }
    }

    fn entry(name: &str, is_dir: bool, size: u64) -> DirEntry {
        DirEntry {
            is_dir,
            name: name.to_string(),
            mode: if is_dir { 0o755 } else { 0o644 },
            size,
            mod_time: OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap(),
        }
    }

    #[tokio::test]
    async fn fresh_tree_emits_mkdir_before_child_copy() {
        let local = tempdir().unwrap();

        let mut entries = HashMap::new();
        entries.insert(".".to_string(), vec![entry("a", true, 0)]);
        entries.insert("a".to_string(), vec![entry("f", false, 5)]);

        let transport = FakeTransport {
            entries: Arc::new(entries),
            fetched: Arc::new(StdMutex::new(Vec::new())),
        };

        let mut generator = ActionGenerator::new(transport, local.path());
        let mut actions = generator.take_actions();

        let handle = tokio::spawn(async move { generator.generate(".".to_string()).await });

        let first = actions.recv().await.unwrap();
        assert_eq!(first.kind, ActionKind::Mkdir);
        assert_eq!(first.path, "a");

        // The sub-walk of "a" is blocked on this Mkdir's completion (it
        // reads the now-missing local "a" directory), so no second action
        // should appear until we fire the latch.
        let premature = tokio::time::timeout(std::time::Duration::from_millis(100), actions.recv()).await;
        assert!(premature.is_err());

        // Create the directory locally (what the executor would do) and
        // release the dependency.
        std::fs::create_dir(local.path().join("a")).unwrap();
        first.done();

        let second = actions.recv().await.unwrap();
        assert_eq!(second.kind, ActionKind::Copy);
        assert_eq!(second.path, "a/f");

        let _ = handle.await;
    }

    #[tokio::test]
    async fn identical_trees_emit_zero_actions() {
        let local = tempdir().unwrap();
        std::fs::create_dir(local.path().join("a")).unwrap();
        let meta = std::fs::metadata(local.path().join("a")).unwrap();
        let mtime = OffsetDateTime::from(meta.modified().unwrap());
        let mode = {
            use std::os::unix::fs::PermissionsExt;
            meta.permissions().mode()
        };

        let mut entries = HashMap::new();
        entries.insert(
            ".".to_string(),
            vec![DirEntry {
                is_dir: true,
                name: "a".to_string(),
                mode,
                size: 0,
                mod_time: mtime,
            }],
        );
        entries.insert("a".to_string(), vec![]);

        let transport = FakeTransport {
            entries: Arc::new(entries),
            fetched: Arc::new(StdMutex::new(Vec::new())),
        };

        let mut generator = ActionGenerator::new(transport, local.path());
        let mut actions = generator.take_actions();

        let handle = tokio::spawn(async move { generator.generate(".".to_string()).await });

        let timed_out = tokio::time::timeout(std::time::Duration::from_millis(200), actions.recv()).await;
        assert!(timed_out.is_err() || timed_out.unwrap().is_none());

        handle.abort();
    }

    #[tokio::test]
    async fn type_conflict_is_skipped_without_action_or_recursion() {
        let local = tempdir().unwrap();
        // "x" exists locally as a file
        std::fs::write(local.path().join("x"), b"content").unwrap();

        let mut entries = HashMap::new();
        // "x" is a directory remotely
        entries.insert(".".to_string(), vec![entry("x", true, 0)]);

        let transport = FakeTransport {
            entries: Arc::new(entries),
            fetched: Arc::new(StdMutex::new(Vec::new())),
        };

        let mut generator = ActionGenerator::new(transport, local.path());
        let mut actions = generator.take_actions();

        let handle = tokio::spawn(async move { generator.generate(".".to_string()).await });

        let timed_out = tokio::time::timeout(std::time::Duration::from_millis(200), actions.recv()).await;
        assert!(timed_out.is_err() || timed_out.unwrap().is_none());

        handle.abort();
    }
}
