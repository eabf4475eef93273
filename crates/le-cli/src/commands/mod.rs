//! CLI subcommand implementations.

pub mod infer;
pub mod replay;
pub mod serve;
pub mod stats;
pub mod status;
mod util;
