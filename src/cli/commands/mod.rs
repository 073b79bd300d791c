//! CLI command implementations.

pub mod print_config;
pub mod run;
pub mod strategies;
pub mod validate;
