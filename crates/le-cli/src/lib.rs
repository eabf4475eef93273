//! Lecture engagement analytics CLI library.
//!
//! Configuration loading, argument definitions and subcommands for the `le`
//! binary.

mod cli;
pub mod commands;
mod config;

pub use cli::{Cli, Commands};
pub use config::Config;
