use nova_config::{ConfigError, ConfigValidationError, ConfigWarning, NovaConfig};
use tempfile::tempdir;

#[test]
fn reports_unknown_keys_with_full_paths() {
    let text = r#"
typo = 1

[sync]
projct_name = "acme"

[sync.default_load]
mode = "non_test"
max_target = 5
"#;

    let (config, diagnostics) =
        NovaConfig::load_from_str_with_diagnostics(text).expect("config should parse");

    assert_eq!(
        diagnostics.unknown_keys,
        vec!["sync.default_load.max_target", "sync.projct_name", "typo"]
    );
    assert_eq!(config.sync.default_load.max_targets, None);
    assert!(diagnostics.is_ok());
}

#[test]
fn reports_semantic_errors_and_warnings_together() {
    let text = r#"
[sync]
project_name = ""
language_priority = ["rust"]

[sync.default_load]
max_targets = 0

[logging]
level = "nova.sync=loud"
"#;

    let (_config, diagnostics) =
        NovaConfig::load_from_str_with_diagnostics(text).expect("config should parse");

    assert!(diagnostics.unknown_keys.is_empty());
    assert!(!diagnostics.is_ok());
    assert_eq!(
        diagnostics.errors,
        vec![
            ConfigValidationError::InvalidValue {
                toml_path: "sync.project_name".to_string(),
                message: "must not be empty".to_string(),
            },
            ConfigValidationError::InvalidValue {
                toml_path: "sync.default_load.max_targets".to_string(),
                message: "must be >= 1".to_string(),
            },
        ]
    );
    assert!(diagnostics.warnings.contains(&ConfigWarning::SyncUnknownLanguage {
        toml_path: "sync.language_priority[0]".to_string(),
        language: "rust".to_string(),
    }));
    assert!(diagnostics
        .warnings
        .iter()
        .any(|warning| matches!(warning, ConfigWarning::LoggingLevelInvalid { .. })));
}

#[test]
fn empty_language_priority_is_a_warning() {
    let (config, diagnostics) =
        NovaConfig::load_from_str_with_diagnostics("[sync]\nlanguage_priority = []\n")
            .expect("config should parse");

    assert!(config.sync.language_priority.is_empty());
    assert!(diagnostics.is_ok());
    assert_eq!(diagnostics.warnings.len(), 1);
    assert_eq!(
        diagnostics.warnings[0].to_string(),
        "sync.language_priority: is empty; every module will be classified as GENERIC_MODULE"
    );
}

#[test]
fn invalid_mode_is_a_parse_error() {
    let err = NovaConfig::load_from_str_with_diagnostics(
        "[sync.default_load]\nmode = \"sometimes\"\n",
    )
    .expect_err("unknown mode should fail");
    assert!(matches!(err, ConfigError::Toml(_)), "{err:?}");
}

#[test]
fn load_from_path_reports_missing_files() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("missing.toml");

    let err = NovaConfig::load_from_path(&missing).expect_err("missing file should fail");
    match err {
        ConfigError::Io { path, .. } => assert_eq!(path, missing.display().to_string()),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn load_from_path_with_diagnostics_resolves_relative_log_file_from_config_dir() {
    let dir = tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("logs")).unwrap();
    let path = dir.path().join("nova.toml");
    std::fs::write(&path, "[logging]\nfile = \"logs/sync.log\"\njson = true\n").unwrap();

    let (config, diagnostics) = NovaConfig::load_from_path_with_diagnostics(&path).unwrap();
    assert!(config.logging.json);
    assert!(diagnostics.is_empty(), "{diagnostics:?}");
}
