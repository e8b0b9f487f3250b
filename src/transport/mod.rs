//! Transport layer for the command-line entry points

pub mod cli;

pub use cli::{run_cleanup, run_diagnose, run_init};
