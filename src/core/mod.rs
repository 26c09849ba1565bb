//! Core synchronization engine
//!
//! Provides the Action type and its completion latch, the tree-diffing
//! generator, and the worker-pool executor that drains the resulting
//! Action stream against the destination filesystem.

mod action;
mod executor;
mod generator;

pub use action::*;
pub use executor::*;
pub use generator::*;

#[cfg(test)]
mod e2e_tests {
    use std::sync::Arc;

    use tempfile::tempdir;
    use tokio::net::TcpListener;

    use crate::core::{ActionGenerator, ExecutorPool};
    use crate::progress::Counters;
    use crate::transport::{router, SimpleHttpTransport};

    /// Serves a real source tree over `axum::serve` on an ephemeral port and
    /// drives the generator + executor pool against it, end to end.
    #[tokio::test]
    async fn pull_over_real_http_reproduces_the_source_tree() {
        let source = tempdir().unwrap();
        std::fs::write(source.path().join("root.txt"), b"top level").unwrap();
        std::fs::create_dir(source.path().join("sub")).unwrap();
        std::fs::write(source.path().join("sub").join("nested.txt"), b"nested contents").unwrap();

        let dest = tempdir().unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let source_root = source.path().to_path_buf();
        let server = tokio::spawn(async move {
            let _ = axum::serve(listener, router(source_root)).await;
        });

        let transport = SimpleHttpTransport::new(format!("http://{addr}"));
        let mut generator = ActionGenerator::new(transport, dest.path());
        let actions = generator.take_actions();

        let pool = ExecutorPool::new(dest.path(), 2);
        let counters = Counters::new();
        let cancel = Arc::new(tokio::sync::Notify::new());
        let pool_cancel = cancel.clone();

        let pool_handle = tokio::spawn(async move {
            pool.run(actions, |_w| SimpleHttpTransport::new(format!("http://{addr}")), counters, pool_cancel)
                .await
        });

        generator.generate(".".to_string()).await.unwrap();
        drop(generator);
        cancel.notify_waiters();
        pool_handle.await.unwrap();
        server.abort();

        let root_contents = std::fs::read(dest.path().join("root.txt")).unwrap();
        assert_eq!(root_contents, b"top level");

        let nested_contents = std::fs::read(dest.path().join("sub").join("nested.txt")).unwrap();
        assert_eq!(nested_contents, b"nested contents");
    }
}
