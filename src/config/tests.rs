use super::*;
use std::collections::HashMap;
use tempfile::TempDir;

fn env_of(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| map.get(key).cloned()
}

const EXE: &str = "/opt/engine/bin/tier-engine";

#[test]
fn test_defaults_derive_from_executable() {
    let paths = EnginePaths::resolve(
        &PathOverrides::default(),
        &EngineConfig::default(),
        env_of(&[]),
        Path::new(EXE),
    );

    assert_eq!(paths.mamba, PathBuf::from("/opt/engine/bin/mamba"));
    assert_eq!(paths.resource_root, PathBuf::from("/opt/engine/resources"));
    assert_eq!(paths.defs_dir, PathBuf::from("/opt/engine/resources/defs"));
    assert_eq!(paths.source_repo, paths.resource_root);
    assert_eq!(paths.resource("bin"), PathBuf::from("/opt/engine/resources/bin"));
}

#[test]
fn test_resolution_order() {
    let config = EngineConfig {
        mamba: Some(PathBuf::from("/config/mamba")),
        resources: Some(PathBuf::from("/config/resources")),
        ..EngineConfig::default()
    };
    let env = env_of(&[(MAMBA_ENV, "/env/mamba")]);
    let overrides = PathOverrides {
        mamba: None,
        resources: Some(PathBuf::from("/cli/resources")),
    };

    let paths = EnginePaths::resolve(&overrides, &config, env, Path::new(EXE));

    assert_eq!(paths.mamba, PathBuf::from("/env/mamba"));
    assert_eq!(paths.resource_root, PathBuf::from("/cli/resources"));

    let paths = EnginePaths::resolve(&PathOverrides::default(), &config, env_of(&[]), Path::new(EXE));
    assert_eq!(paths.mamba, PathBuf::from("/config/mamba"));
    assert_eq!(paths.defs_dir, PathBuf::from("/config/resources/defs"));
}

#[test]
fn test_empty_env_values_are_ignored() {
    let paths = EnginePaths::resolve(
        &PathOverrides::default(),
        &EngineConfig::default(),
        env_of(&[(MAMBA_ENV, "")]),
        Path::new(EXE),
    );
    assert_eq!(paths.mamba, PathBuf::from("/opt/engine/bin/mamba"));
}

#[test]
fn test_config_yaml_defaults_and_overrides() {
    let config = EngineConfig::from_yaml(
        "resources: /srv/resources\ndisk_space:\n  package_size_mb: 80\n",
    )
    .unwrap();

    assert_eq!(config.resources, Some(PathBuf::from("/srv/resources")));
    assert_eq!(config.default_channel, "conda-forge");
    assert_eq!(config.disk_space.package_size_mb, 80.0);
    assert_eq!(config.disk_space.buffer_factor, 1.5);
}

#[test]
fn test_invalid_config_is_config_error() {
    let err = EngineConfig::from_yaml("disk_space: [not, a, mapping]\n").unwrap_err();
    assert_eq!(err.exit_code(), crate::error::ExitCode::INVALID_CONFIG);
}

#[test]
fn test_discover_reads_file_from_env() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("engine.yaml");
    std::fs::write(&path, "default_channel: bioconda\n").unwrap();

    let config =
        EngineConfig::discover(None, env_of(&[(CONFIG_ENV, path.to_str().unwrap())])).unwrap();
    assert_eq!(config.default_channel, "bioconda");

    let config = EngineConfig::discover(None, env_of(&[])).unwrap();
    assert_eq!(config, EngineConfig::default());
}

#[test]
fn test_discover_missing_file_fails() {
    let err = EngineConfig::discover(Some(Path::new("/nonexistent/engine.yaml")), env_of(&[]))
        .unwrap_err();
    assert_eq!(err.exit_code(), crate::error::ExitCode::INVALID_CONFIG);
}

#[test]
fn test_deploy_mode_flags() {
    assert!(DeployMode::Keep.is_keep());
    assert!(DeployMode::Force.is_force());
    assert!(!DeployMode::default().is_keep());
    assert!(!DeployMode::default().is_force());
}
