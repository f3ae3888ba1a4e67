//! # tier-engine
//!
//! Blue/green deployment of conda environments across named infrastructure
//! tiers.
//!
//! ## Usage
//!
//! ```bash
//! tier-engine deploy TARGET TIER [--offline] [--dry-run] [--keep | --force]
//! IAC_TIER_DIR=TARGET/infrastructure/blue tier-engine promote
//! tier-engine bootstrap HOME --conda PATH --engine-def PATH [--offline]
//! ```
//!
//! ## Modules
//!
//! - `config` - Resolved engine paths and the optional configuration file
//! - `deploy` - Tier deployment: environments, resource trees, metadata
//! - `engine` - Rotation of the engine's own environment
//! - `error` - Unified error type and stable exit codes
//! - `filesystem` - Filesystem capability with real and in-memory backends
//! - `logging` - Tracing subscriber setup
//! - `promote` - Blue/green symlink promotion
//! - `subprocess` - Process execution capability for testing
//! - `tier` - Tier names and tier directory resolution
//! - `validators` - Definition, disk-space, and symlink preflight checks
pub mod config;
pub mod deploy;
pub mod engine;
pub mod error;
pub mod filesystem;
pub mod logging;
pub mod promote;
pub mod subprocess;
pub mod tier;
pub mod validators;

pub use error::{EngineError, ExitCode, Result};
