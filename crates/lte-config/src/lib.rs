//! Configuration management for the LTEstation eNodeB stack
//!
//! This crate provides configuration loading and parsing:
//! - TOML configuration file parsing
//! - Stack configuration structures with validation

pub mod stack_config;
pub mod toml_config;

pub use stack_config::*;
