//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the playback engine:
//! - Logging and tracing infrastructure
//! - Configuration management and bridge injection
//! - Event bus system
//!
//! ## Overview
//!
//! This crate contains the runtime utilities that the playback and service
//! crates depend on. It establishes the logging conventions, the fail-fast
//! configuration builder, and the event broadcasting mechanism used
//! throughout the system.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
