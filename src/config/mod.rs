//! Configuration module for hopsync
//!
//! Provides the CLI surface, the wire-level `ClientOpts`/`ServerOpts`, and the
//! human-readable size parser shared by both.

mod settings;

pub use settings::*;
