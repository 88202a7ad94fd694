//! # Theorist application library
//!
//! Command implementations and configuration loading, exposed for the
//! binary and its integration tests.

pub mod cli;
pub mod config;
