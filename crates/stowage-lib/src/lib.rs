//! Shared library for stowage.
//! Includes result types, backup/setup options, agent configuration and errors.

pub mod config;
pub mod error;
pub mod options;
pub mod paths;
pub mod types;
