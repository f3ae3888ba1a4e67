use std::path::PathBuf;
use thiserror::Error;

pub mod codes;

pub use codes::{describe_exit_code, ExitCode};

use crate::subprocess::ProcessError;
use crate::validators::{DiskSpaceError, SymlinkValidationError};

/// The unified error type for every fatal tier-engine failure.
///
/// Each variant maps to a stable process exit code so callers can branch on
/// the failure class. Per-environment failures are not represented here; they
/// are recorded in the deploy report instead.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("bad target: {message}")]
    BadTarget { message: String },

    #[error("tier path {path} escapes target directory {target}")]
    PathTraversal { path: PathBuf, target: PathBuf },

    #[error("mamba is missing: {}", path.display())]
    MambaMissing { path: PathBuf },

    #[error("tier {tier:?} resolves to production ({}); refusing to deploy", path.display())]
    ProductionCollision { tier: String, path: PathBuf },

    #[error(transparent)]
    InsufficientDiskSpace(#[from] DiskSpaceError),

    #[error(transparent)]
    InvalidSymlink(#[from] SymlinkValidationError),

    #[error("invalid color {0:?}: expected \"blue\" or \"green\"")]
    InvalidColor(String),

    #[error("staging and production both point to the same color: {color}")]
    SameColor { color: String },

    #[error("missing environment variable {name}")]
    MissingEnvVar { name: String },

    #[error("configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl EngineError {
    pub fn bad_target(message: impl Into<String>) -> Self {
        Self::BadTarget {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    /// Wrap an I/O failure with a short description of what was attempted
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Add a source error to a configuration error
    pub fn with_source(
        mut self,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        if let Self::Config { source: src, .. } = &mut self {
            *src = Some(source.into());
        }
        self
    }

    /// Get the process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::BadTarget { .. } => ExitCode::BAD_TARGET,
            Self::PathTraversal { .. } => ExitCode::PATH_TRAVERSAL,
            Self::MambaMissing { .. } => ExitCode::MAMBA_MISSING,
            Self::ProductionCollision { .. } => ExitCode::PRODUCTION_COLLISION,
            Self::InsufficientDiskSpace(_) => ExitCode::INSUFFICIENT_DISK_SPACE,
            Self::InvalidSymlink(_) | Self::InvalidColor(_) => ExitCode::INVALID_SYMLINK,
            Self::SameColor { .. } => ExitCode::SAME_COLOR,
            Self::MissingEnvVar { .. } => ExitCode::MISSING_ENV_VAR,
            Self::Config { .. } => ExitCode::INVALID_CONFIG,
            Self::Process(_) | Self::Io { .. } => ExitCode::GENERIC,
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
