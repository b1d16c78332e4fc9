//! concord library crate: the pieces behind the `concord` binary.
//!
//! The consolidation engines live in `concord-core`. This crate adds
//! scenario replay, report formatting and telemetry setup, exposed here so
//! integration tests can drive them without going through the CLI.

pub mod format;
pub mod scenario;
pub mod telemetry;
