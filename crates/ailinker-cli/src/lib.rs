//! `ailinker` command-line adapter.
//!
//! Parses arguments, loads configuration, and wires nodes onto an
//! in-process bus. [`bootstrap`] is the composition root; [`handlers`]
//! implement the subcommands.

pub mod bootstrap;
pub mod commands;
pub mod handlers;
pub mod parser;

pub use bootstrap::{CliContext, bootstrap};
pub use handlers::console::Feed;
pub use commands::Commands;
pub use parser::Cli;
