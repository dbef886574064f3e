//! Command handlers.
//!
//! Handlers follow one pattern:
//! - Signature: `pub async fn execute(ctx: &CliContext, ...) -> Result<()>`
//! - Wire nodes through [`CliContext`](crate::CliContext), drive them, and
//!   format output for the terminal.

pub mod config;
pub mod console;
pub mod session;
