use std::ffi::OsString;

use nova_config::{
    discover_config_path, load_for_workspace, load_for_workspace_with_diagnostics, ConfigWarning,
    DefaultLoadMode, NovaConfig, NOVA_CONFIG_ENV_VAR,
};
use tempfile::tempdir;

struct EnvVarGuard {
    key: &'static str,
    prev: Option<OsString>,
}

impl EnvVarGuard {
    fn set(key: &'static str, value: impl Into<OsString>) -> Self {
        let prev = std::env::var_os(key);
        std::env::set_var(key, value.into());
        Self { key, prev }
    }

    fn unset(key: &'static str) -> Self {
        let prev = std::env::var_os(key);
        std::env::remove_var(key);
        Self { key, prev }
    }
}

impl Drop for EnvVarGuard {
    fn drop(&mut self) {
        match &self.prev {
            Some(v) => std::env::set_var(self.key, v),
            None => std::env::remove_var(self.key),
        }
    }
}

/// Run `f` with `NOVA_CONFIG_PATH` set to `value` (or unset), holding the config env lock so
/// discovery on other threads never observes the override.
fn with_config_env(value: Option<OsString>, f: impl FnOnce()) {
    nova_config::with_config_env_lock(|| {
        let _env = match value {
            Some(value) => EnvVarGuard::set(NOVA_CONFIG_ENV_VAR, value),
            None => EnvVarGuard::unset(NOVA_CONFIG_ENV_VAR),
        };
        f()
    })
}

#[test]
fn discovers_nova_toml_in_workspace_root() {
    with_config_env(None, || {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("nova.toml");
        std::fs::write(&config_path, "[sync]\nproject_name = \"acme\"\n").unwrap();

        let discovered = discover_config_path(dir.path())
            .expect("nova.toml should be discovered when present in workspace root");
        assert_eq!(
            discovered,
            config_path.canonicalize().unwrap_or(config_path),
            "expected config discovery to return the workspace-root nova.toml path"
        );
    });
}

#[test]
fn nova_toml_wins_over_hidden_candidates() {
    with_config_env(None, || {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".nova")).unwrap();
        std::fs::write(dir.path().join(".nova/config.toml"), "").unwrap();
        std::fs::write(dir.path().join(".nova.toml"), "").unwrap();

        let hidden = dir.path().join(".nova.toml");
        assert_eq!(
            discover_config_path(dir.path()),
            Some(hidden.canonicalize().unwrap_or(hidden))
        );

        let visible = dir.path().join("nova.toml");
        std::fs::write(&visible, "").unwrap();
        assert_eq!(
            discover_config_path(dir.path()),
            Some(visible.canonicalize().unwrap_or(visible))
        );
    });
}

#[test]
fn env_override_wins_over_workspace_file() {
    with_config_env(Some("override.toml".into()), || {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("nova.toml"),
            "[sync.default_load]\nmode = \"all\"\n",
        )
        .unwrap();

        let override_path = dir.path().join("override.toml");
        std::fs::write(
            &override_path,
            "[sync.default_load]\nmode = \"none\"\n[logging]\nlevel = \"debug\"\n",
        )
        .unwrap();

        let (config, path) = load_for_workspace(dir.path()).unwrap();
        assert_eq!(config.sync.default_load.mode, DefaultLoadMode::None);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(
            path.expect("load_for_workspace should return the resolved config path"),
            override_path.canonicalize().unwrap_or(override_path)
        );
    });
}

#[test]
fn env_override_accepts_absolute_path() {
    with_config_env(None, || {
        let dir = tempdir().unwrap();
        let override_path = dir.path().join("elsewhere.toml");
        std::fs::write(&override_path, "[sync]\nproject_name = \"other\"\n").unwrap();
        let _env = EnvVarGuard::set(NOVA_CONFIG_ENV_VAR, override_path.as_os_str());

        let (config, path) = load_for_workspace(dir.path()).unwrap();
        assert_eq!(config.sync.project_name.as_deref(), Some("other"));
        assert_eq!(
            path.expect("load_for_workspace should return the resolved config path"),
            override_path.canonicalize().unwrap_or(override_path)
        );
    });
}

#[test]
fn missing_config_returns_defaults() {
    with_config_env(None, || {
        let dir = tempdir().unwrap();
        let (config, path) = load_for_workspace(dir.path()).unwrap();
        assert_eq!(path, None);
        assert_eq!(config, NovaConfig::default());
    });
}

#[test]
fn load_for_workspace_with_diagnostics_resolves_log_file_from_workspace_root() {
    with_config_env(None, || {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".nova")).unwrap();

        let config_path = dir.path().join(".nova/config.toml");
        std::fs::write(
            &config_path,
            r#"
[logging]
file = "logs/nova-sync.log"
"#,
        )
        .unwrap();

        let (_config, path, diagnostics) = load_for_workspace_with_diagnostics(dir.path()).unwrap();

        assert_eq!(
            path.expect("expected discovered config path"),
            config_path.canonicalize().unwrap_or(config_path.clone())
        );
        assert!(diagnostics.unknown_keys.is_empty());
        assert!(diagnostics.errors.is_empty());
        assert_eq!(
            diagnostics.warnings,
            vec![ConfigWarning::LoggingFileDirMissing {
                toml_path: "logging.file".to_string(),
                resolved: dir.path().join("logs"),
            }]
        );
    });
}
