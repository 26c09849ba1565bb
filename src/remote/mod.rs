//! The remote-launcher collaborator: SSH tunnel bring-up and remote process
//! spawning.
//!
//! A thin, working wrapper around the system `ssh` binary, not a
//! from-scratch SSH protocol implementation.

mod ssh;

pub use ssh::*;
