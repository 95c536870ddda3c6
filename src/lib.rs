//! daytona-smoke library
//!
//! Provision a Daytona sandbox, run a smoke-test battery in it, and tear it
//! down again.

pub mod client;
pub mod config;
pub mod credential;
pub mod execution;
pub mod orchestrator;
pub mod server;
pub mod suite;
pub mod tool;
