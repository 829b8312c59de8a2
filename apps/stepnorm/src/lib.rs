//! # stepnorm - THE BINARY
//!
//! Command-line front end for the stepnorm-core normalization engine.
//! The library target exists so the integration tests can drive the CLI
//! command implementations directly.

pub mod cli;
