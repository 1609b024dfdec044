//! Command implementations for the `conduct` binary.

pub mod run;
pub mod validate;
