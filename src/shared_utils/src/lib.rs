//! Small helpers shared by the workspace crates (environment access, config errors).

pub mod config;
pub mod env;
