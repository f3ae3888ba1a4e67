//! Environment-definition sanity checks
//!
//! A fast, permissive check of the `channels`/`dependencies` shape of a
//! conda environment file. It rejects obviously broken input and leaves
//! anything subtler for the package manager to report.

use serde_yaml::{Mapping, Value};
use std::path::Path;

use super::ValidationError;
use crate::filesystem::FileSystem;

const KNOWN_CHANNELS: &[&str] = &[
    "conda-forge",
    "bioconda",
    "defaults",
    "anaconda",
    "r",
    "pytorch",
    "nvidia",
];

const URL_SCHEMES: &[&str] = &["http://", "https://", "file://"];

/// Validate a conda environment YAML file
pub fn validate_env_yaml(fs: &dyn FileSystem, path: &Path) -> Result<(), ValidationError> {
    let shown = path.display();

    if !fs.exists(path) {
        return Err(ValidationError::new(format!("File does not exist: {shown}")));
    }
    if !fs.is_file(path) {
        return Err(ValidationError::new(format!("Path is not a file: {shown}")));
    }

    let content = fs
        .read_to_string(path)
        .map_err(|e| ValidationError::new(format!("Cannot read file {shown}: {e}")))?;
    let data: Value = serde_yaml::from_str(&content)
        .map_err(|e| ValidationError::new(format!("Invalid YAML syntax in {shown}: {e}")))?;

    let root = match data {
        Value::Mapping(root) => root,
        other => {
            return Err(ValidationError::new(format!(
                "Expected YAML to contain a dictionary, got {}",
                kind_name(&other)
            )))
        }
    };

    validate_required_keys(&root, path)?;
    validate_channels(root.get("channels").unwrap_or(&Value::Null), path)?;
    validate_dependencies(root.get("dependencies").unwrap_or(&Value::Null), path)
}

/// Number of packages a definition would install: top-level dependency
/// entries plus every package nested under a `pip` entry.
///
/// Returns `None` when the document is not readable YAML.
pub fn count_packages(content: &str) -> Option<usize> {
    let data: Value = serde_yaml::from_str(content).ok()?;
    let Some(Value::Sequence(dependencies)) = data.get("dependencies") else {
        return Some(0);
    };

    let nested: usize = dependencies
        .iter()
        .filter_map(|dep| match dep.get("pip") {
            Some(Value::Sequence(pip)) => Some(pip.len()),
            _ => None,
        })
        .sum();
    Some(dependencies.len() + nested)
}

fn validate_required_keys(root: &Mapping, path: &Path) -> Result<(), ValidationError> {
    let missing: Vec<&str> = ["channels", "dependencies"]
        .into_iter()
        .filter(|key| !root.contains_key(*key))
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::new(format!(
            "Missing required keys in {}: {}",
            path.display(),
            missing.join(", ")
        )))
    }
}

fn validate_channels(channels: &Value, path: &Path) -> Result<(), ValidationError> {
    let shown = path.display();
    let Value::Sequence(channels) = channels else {
        return Err(ValidationError::new(format!(
            "'channels' must be a list in {shown}, got {}",
            kind_name(channels)
        )));
    };
    if channels.is_empty() {
        return Err(ValidationError::new(format!(
            "'channels' list cannot be empty in {shown}"
        )));
    }

    for (i, channel) in channels.iter().enumerate() {
        let Value::String(channel) = channel else {
            return Err(ValidationError::new(format!(
                "Channel at index {i} must be a string in {shown}, got {}",
                kind_name(channel)
            )));
        };
        if channel.trim().is_empty() {
            return Err(ValidationError::new(format!(
                "Channel at index {i} cannot be empty in {shown}"
            )));
        }
        validate_channel_name(channel, i, path)?;
    }
    Ok(())
}

fn validate_channel_name(channel: &str, index: usize, path: &Path) -> Result<(), ValidationError> {
    if KNOWN_CHANNELS.contains(&channel) {
        return Ok(());
    }
    if URL_SCHEMES.iter().any(|scheme| channel.starts_with(scheme)) {
        return Ok(());
    }
    // Namespaced forms such as `conda-forge/label/main`.
    if channel.contains('/') && channel.split('/').all(|part| !part.trim().is_empty()) {
        return Ok(());
    }

    if channel.contains([' ', '\n', '\t', '\r']) {
        return Err(ValidationError::new(format!(
            "Channel at index {index} contains invalid whitespace in {}: {channel:?}",
            path.display()
        )));
    }
    Ok(())
}

fn validate_dependencies(dependencies: &Value, path: &Path) -> Result<(), ValidationError> {
    let shown = path.display();
    let Value::Sequence(dependencies) = dependencies else {
        return Err(ValidationError::new(format!(
            "'dependencies' must be a list in {shown}, got {}",
            kind_name(dependencies)
        )));
    };
    if dependencies.is_empty() {
        return Err(ValidationError::new(format!(
            "'dependencies' list cannot be empty in {shown}"
        )));
    }

    for (i, dep) in dependencies.iter().enumerate() {
        match dep {
            Value::String(spec) => validate_string_dependency(spec, i, path)?,
            Value::Mapping(map) => validate_mapping_dependency(map, i, path)?,
            other => {
                return Err(ValidationError::new(format!(
                    "Dependency at index {i} must be a string or dict in {shown}, got {}",
                    kind_name(other)
                )))
            }
        }
    }
    Ok(())
}

fn validate_string_dependency(spec: &str, index: usize, path: &Path) -> Result<(), ValidationError> {
    if spec.trim().is_empty() {
        return Err(ValidationError::new(format!(
            "Dependency at index {index} cannot be empty in {}",
            path.display()
        )));
    }

    if let Some(bad) = ['\n', '\r', '\t'].into_iter().find(|c| spec.contains(*c)) {
        return Err(ValidationError::new(format!(
            "Dependency at index {index} contains invalid character {bad:?} in {}: {spec:?}",
            path.display()
        )));
    }
    Ok(())
}

fn validate_mapping_dependency(
    map: &Mapping,
    index: usize,
    path: &Path,
) -> Result<(), ValidationError> {
    let shown = path.display();
    // Other mapping shapes are left for the package manager to judge.
    let Some(pip) = map.get("pip") else {
        return Ok(());
    };

    let Value::Sequence(pip) = pip else {
        return Err(ValidationError::new(format!(
            "Dependency at index {index}: 'pip' value must be a list in {shown}, got {}",
            kind_name(pip)
        )));
    };
    if pip.is_empty() {
        return Err(ValidationError::new(format!(
            "Dependency at index {index}: 'pip' list cannot be empty in {shown}"
        )));
    }

    for (j, pip_dep) in pip.iter().enumerate() {
        let Value::String(spec) = pip_dep else {
            return Err(ValidationError::new(format!(
                "Dependency at index {index}: pip dependency at index {j} must be a string in {shown}, got {}",
                kind_name(pip_dep)
            )));
        };
        if spec.trim().is_empty() {
            return Err(ValidationError::new(format!(
                "Dependency at index {index}: pip dependency at index {j} cannot be empty in {shown}"
            )));
        }
    }
    Ok(())
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Sequence(_) => "list",
        Value::Mapping(_) => "dict",
        Value::Tagged(_) => "tagged value",
    }
}
