//! User interface module.
//!
//! This module contains all UI-related functionality, including:
//! - CLI argument parsing (cli module)
//! - Console summaries and file exports (output module)

pub mod cli;
pub mod output;
