//! Blue/green promotion
//!
//! `staging` and `production` are symlinks inside `infrastructure/`, each
//! pointing at `blue` or `green` and never at the same one. Promotion points
//! production at the current staging color, then flips staging to the color
//! production just left.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{info, warn};

use crate::error::{EngineError, Result};
use crate::filesystem::{resolve_path, FileSystem};
use crate::tier::{PRODUCTION, STAGING};
use crate::validators::validate_symlink_target;

/// Names the staging directory being promoted
pub const TIER_DIR_ENV: &str = "IAC_TIER_DIR";

const COLORS: &[&str] = &["blue", "green"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Color {
    Blue,
    Green,
}

impl Color {
    pub fn as_str(self) -> &'static str {
        match self {
            Color::Blue => "blue",
            Color::Green => "green",
        }
    }

    pub fn opposite(self) -> Color {
        match self {
            Color::Blue => Color::Green,
            Color::Green => Color::Blue,
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Color {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "blue" => Ok(Color::Blue),
            "green" => Ok(Color::Green),
            other => Err(EngineError::InvalidColor(other.to_string())),
        }
    }
}

/// Whether `name` is exactly one of the two colors
pub fn validate_color(name: &str) -> bool {
    name.parse::<Color>().is_ok()
}

/// The other color; anything but `blue` or `green` is an error
pub fn get_opposite_color(color: &str) -> Result<Color> {
    Ok(color.parse::<Color>()?.opposite())
}

/// Read the color a staging/production link points at.
///
/// `root` is the infrastructure directory holding the color directories.
pub fn validate_and_get_color(fs: &dyn FileSystem, link: &Path, root: &Path) -> Result<Color> {
    let target = validate_symlink_target(fs, link, COLORS, true)?;
    let color = target
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or_default()
        .parse::<Color>()?;

    if !fs.is_dir(&root.join(color.as_str())) {
        warn!(
            "{} points at {color} but {} is missing",
            link.display(),
            root.join(color.as_str()).display()
        );
    }
    Ok(color)
}

/// Symlink colors after a promotion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Promotion {
    pub previous_production: Option<Color>,
    pub production: Color,
    pub staging: Color,
}

/// Promote the tier at `staging_dir` to production.
///
/// `staging_dir` is the deployed staging directory, either the physical
/// color directory or the `staging` link itself.
pub fn promote(fs: &dyn FileSystem, staging_dir: &Path) -> Result<Promotion> {
    let resolved = resolve_path(fs, staging_dir);
    let infrastructure = resolved
        .parent()
        .map(Path::to_path_buf)
        .ok_or_else(|| EngineError::bad_target(format!("no parent directory: {}", resolved.display())))?;
    let staging_link = infrastructure.join(STAGING);
    let production_link = infrastructure.join(PRODUCTION);

    let staging_color = validate_and_get_color(fs, &staging_link, &infrastructure)?;
    let deployed = resolved
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or_default();
    if deployed != staging_color.as_str() {
        warn!(
            "{} resolves to {deployed:?} but {} points at {staging_color}",
            staging_dir.display(),
            staging_link.display()
        );
    }
    info!("Staging color: {staging_color}");

    let previous_production = if fs.is_symlink(&production_link) || fs.exists(&production_link) {
        let production_color = validate_and_get_color(fs, &production_link, &infrastructure)?;
        info!("Production color: {production_color}");
        if production_color == staging_color {
            return Err(EngineError::SameColor {
                color: staging_color.to_string(),
            });
        }
        Some(production_color)
    } else {
        info!("No production symlink yet; creating one");
        None
    };

    // Production first: a failure after this point still leaves it advanced.
    repoint(fs, &production_link, staging_color)?;
    let next_staging = staging_color.opposite();
    repoint(fs, &staging_link, next_staging)?;

    info!("Promoted {staging_color} to production; staging now {next_staging}");
    Ok(Promotion {
        previous_production,
        production: staging_color,
        staging: next_staging,
    })
}

/// Promote the staging directory named by `IAC_TIER_DIR`
pub fn promote_from_env<F>(fs: &dyn FileSystem, env: F) -> Result<Promotion>
where
    F: Fn(&str) -> Option<String>,
{
    let staging_dir = env(TIER_DIR_ENV)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .ok_or_else(|| EngineError::MissingEnvVar {
            name: TIER_DIR_ENV.to_string(),
        })?;
    info!("{TIER_DIR_ENV}={}", staging_dir.display());
    promote(fs, &staging_dir)
}

fn repoint(fs: &dyn FileSystem, link: &Path, color: Color) -> Result<()> {
    info!("{} -> {color}", link.display());
    fs.replace_symlink(Path::new(color.as_str()), link)
        .map_err(|e| EngineError::io(format!("repoint {}", link.display()), e))
}
