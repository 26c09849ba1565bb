//! Client-side directory transport: a simple whole-body fetch and a
//! concurrent, ranged fetch for large files.

use std::os::unix::fs::FileExt;
use std::time::Duration;

use reqwest::{Client, StatusCode};

use crate::error::{HopsyncError, Result};
use crate::transport::{DirEntry, ListDirectoryResponse, Transport};

fn build_client() -> Client {
    Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .build()
        .expect("reqwest client configuration is valid")
}

async fn list(client: &Client, target: &str, path: &str) -> Result<Vec<DirEntry>> {
    let url = format!("{target}/ls?path={}", urlencoding::encode(path));
    let resp = client.get(&url).send().await?;

    if resp.status() != StatusCode::OK {
        if resp.status() == StatusCode::NOT_FOUND {
            return Err(HopsyncError::NotFound(path.into()));
        }
        return Err(HopsyncError::BadStatus {
            status: resp.status().as_u16(),
            url,
        });
    }

    let body: ListDirectoryResponse = resp
        .json()
        .await
        .map_err(|e| HopsyncError::MalformedResponse {
            url: url.clone(),
            message: e.to_string(),
        })?;

    Ok(body.entries)
}

/// Streams the whole response body into `dst` sequentially.
pub struct SimpleHttpTransport {
    target: String,
    client: Client,
}

impl SimpleHttpTransport {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            client: build_client(),
        }
    }
}

impl Transport for SimpleHttpTransport {
    async fn list(&self, path: &str) -> Result<Vec<DirEntry>> {
        list(&self.client, &self.target, path).await
    }

    async fn fetch(&self, path: &str, _expected_size: u64, dst: &tokio::fs::File) -> Result<u64> {
        let url = format!("{}/fetch?path={}", self.target, urlencoding::encode(path));
        let resp = self.client.get(&url).send().await?;

        if resp.status() != StatusCode::OK {
            return Err(HopsyncError::BadStatus {
                status: resp.status().as_u16(),
                url,
            });
        }

        let mut body = tokio_util::io::StreamReader::new(
            resp.bytes_stream()
                .map(|r| r.map_err(std::io::Error::other)),
        );
        let mut dst = dst.try_clone().await?;
        let written = tokio::io::copy(&mut body, &mut dst).await?;
        Ok(written)
    }
}

use futures::TryStreamExt as _;

/// Tuning knobs for the concurrent fetch path.
#[derive(Debug, Clone, Copy)]
pub struct ConcurrentTransferOpts {
    /// Files at or above this size are split across `concurrency` ranges.
    pub threshold: u64,
    /// Number of parallel range requests used above the threshold.
    pub concurrency: u64,
}

/// Splits large fetches into `concurrency` parallel HTTP range requests,
/// each writing to a disjoint byte range of `dst` via positional writes.
pub struct ConcurrentHttpTransport {
    target: String,
    opts: ConcurrentTransferOpts,
    client: Client,
}

impl ConcurrentHttpTransport {
    pub fn new(target: impl Into<String>, opts: ConcurrentTransferOpts) -> Self {
        Self {
            target: target.into(),
            opts,
            client: build_client(),
        }
    }

    async fn fetch_range(&self, url: &str, std_file: std::fs::File, start: u64, end_inclusive: u64) -> Result<()> {
        let resp = self
            .client
            .get(url)
            .header("Range", format!("bytes={start}-{end_inclusive}"))
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(HopsyncError::BadStatus {
                status: resp.status().as_u16(),
                url: url.to_string(),
            });
        }

        let expected = end_inclusive - start + 1;
        let bytes = resp.bytes().await?;
        if bytes.len() as u64 != expected {
            return Err(HopsyncError::ShortRead {
                path: url.to_string(),
                expected,
                actual: bytes.len() as u64,
            });
        }

        tokio::task::spawn_blocking(move || std_file.write_at(&bytes, start))
            .await
            .map_err(|e| HopsyncError::Fatal(format!("blocking write task panicked: {e}")))??;

        Ok(())
    }
}

impl Transport for ConcurrentHttpTransport {
    async fn list(&self, path: &str) -> Result<Vec<DirEntry>> {
        list(&self.client, &self.target, path).await
    }

    async fn fetch(&self, path: &str, expected_size: u64, dst: &tokio::fs::File) -> Result<u64> {
        let url = format!("{}/fetch?path={}", self.target, urlencoding::encode(path));

        if expected_size <= self.opts.threshold {
            return SimpleHttpTransport {
                target: self.target.clone(),
                client: self.client.clone(),
            }
            .fetch(path, expected_size, dst)
            .await;
        }

        let chunk_size = expected_size / self.opts.concurrency;
        let mut handles = Vec::with_capacity(self.opts.concurrency as usize);

        for i in 0..self.opts.concurrency {
            let start = chunk_size * i;
            let mut end_exclusive = chunk_size * (i + 1);
            if i == self.opts.concurrency - 1 {
                end_exclusive = expected_size;
            }
            if end_exclusive <= start {
                continue;
            }
            let std_file = dst.try_clone().await?.into_std().await;
            let url = url.clone();
            let this = self;
            handles.push(async move { this.fetch_range(&url, std_file, start, end_exclusive - 1).await });
        }

        // join_all runs every chunk to completion even if one fails; siblings
        // are not cancelled on a sibling's error, but the first error still
        // fails the whole fetch.
        let results = futures::future::join_all(handles).await;
        for r in results {
            r?;
        }

        Ok(expected_size)
    }
}
