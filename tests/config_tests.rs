use sidecar_sync::config::{self, ConfigLoad};

#[test]
fn absent_config_file_bootstraps_stub_with_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested/config.json");

    let loaded = config::load_or_bootstrap(&path).unwrap();
    assert!(matches!(loaded, ConfigLoad::Bootstrapped(_)));
    assert!(path.exists());

    let reloaded = config::load_or_bootstrap(&path).unwrap();
    match reloaded {
        ConfigLoad::Loaded(cfg) => {
            assert_eq!(cfg.threads, 8);
            assert_eq!(cfg.max_concurrent_requests, 2);
            assert!(cfg.always_apply_nfo);
            assert!(cfg.delete_nfo_after_apply);
        }
        ConfigLoad::Bootstrapped(_) => panic!("second load should read the stub, not bootstrap again"),
    }
}

#[test]
fn malformed_config_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, "{not json").unwrap();

    let result = config::load_or_bootstrap(&path);
    assert!(result.is_err());
}

#[test]
fn validate_flags_missing_required_fields() {
    let cfg = sidecar_sync::config::Config::default();
    let warnings = cfg.validate();
    assert!(warnings.iter().any(|w| w.contains("server_base_url")));
    assert!(warnings.iter().any(|w| w.contains("server_token")));
    assert!(warnings.iter().any(|w| w.contains("library_ids")));
}
