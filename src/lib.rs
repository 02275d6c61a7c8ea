// Library crate exposing modules for the binary, integration tests and benches

pub mod build;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod model;
pub mod query;
pub mod repository;
pub mod util;
