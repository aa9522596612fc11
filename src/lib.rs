//! ptsp-build library exports.
//!
//! The binary is a thin CLI over [`build::build_image`]; everything else is
//! exposed here so the workflow can be driven from integration tests with a
//! recording command runner.

pub mod build;
pub mod config;
pub mod interrupt;
pub mod preflight;
pub mod process;
pub mod profile;
pub mod timing;
