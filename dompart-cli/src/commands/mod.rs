//! Command implementations for the dompart CLI

pub mod config;
pub mod partition;
