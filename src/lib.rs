//! Task desk library
//!
//! This module exports the core components for testing and integration.

pub mod api;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod input;
pub mod lifecycle;
pub mod logging;
pub mod policy;
pub mod types;
