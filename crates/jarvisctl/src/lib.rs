//! jarvisctl library.
//!
//! Command-line definition and handlers for operating a Jarvis deployment.
//! The binary in `main.rs` only parses arguments, sets up logging and maps
//! the outcome to an exit code.

pub mod cli;
pub mod commands;
