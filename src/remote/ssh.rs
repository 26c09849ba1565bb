//! Thin subprocess-based SSH launcher: reverse port forwards plus remote
//! process spawn, fed the bootstrap `ClientOpts` over stdin.

use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};

use crate::config::ClientOpts;
use crate::error::{HopsyncError, Result};

/// Brings up `transfer_channels` reverse port forwards from `base_port` and
/// spawns `<remote_command> --spawn-client` on `host`, writing `opts` as one
/// JSON line to its stdin.
pub struct Launcher {
    host: String,
    remote_command: String,
    base_port: u16,
    transfer_channels: usize,
}

impl Launcher {
    pub fn new(host: impl Into<String>, remote_command: impl Into<String>, base_port: u16, transfer_channels: usize) -> Self {
        Self {
            host: host.into(),
            remote_command: remote_command.into(),
            base_port,
            transfer_channels,
        }
    }

    /// Spawn the remote puller, relay its stdout/stderr to the local
    /// terminal, and block until it exits. Returns an error if the remote
    /// process exits non-zero.
    pub async fn run(&self, opts: &ClientOpts) -> Result<()> {
        let mut cmd = Command::new("ssh");
        cmd.arg(&self.host);

        for i in 0..self.transfer_channels as u16 {
            let port = self.base_port + i;
            cmd.arg("-R").arg(format!("{port}:127.0.0.1:{port}"));
        }

        cmd.arg(format!("{} --spawn-client", self.remote_command))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child: Child = cmd
            .spawn()
            .map_err(|e| HopsyncError::transport(&self.host, format!("failed to spawn ssh: {e}")))?;

        let opts_json = serde_json::to_string(opts)?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(opts_json.as_bytes())
                .await
                .map_err(|e| HopsyncError::io("<ssh stdin>", e))?;
            stdin
                .write_all(b"\n")
                .await
                .map_err(|e| HopsyncError::io("<ssh stdin>", e))?;
            // Drop closes stdin so the remote scanner sees EOF after the line.
        }

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(relay_lines(stdout, "\r"));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(relay_lines(stderr, ""));
        }

        let status = child
            .wait()
            .await
            .map_err(|e| HopsyncError::transport(&self.host, format!("ssh session failed: {e}")))?;

        if !status.success() {
            return Err(HopsyncError::transport(
                &self.host,
                format!("remote puller exited with status {status}"),
            ));
        }

        Ok(())
    }
}

async fn relay_lines(pipe: impl tokio::io::AsyncRead + Unpin, prefix: &str) {
    let mut lines = BufReader::new(pipe).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        print!("{prefix}{line}\n");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reverse_forward_ports_are_contiguous_from_base_port() {
        let launcher = Launcher::new("host", "hopsync", 9594, 4);
        let ports: Vec<u16> = (0..launcher.transfer_channels as u16).map(|i| launcher.base_port + i).collect();
        assert_eq!(ports, vec![9594, 9595, 9596, 9597]);
    }
}
