use std::collections::BTreeSet;
use std::path::Path;

use crate::diagnostics::{ConfigValidationError, ConfigWarning, ValidationDiagnostics};
use crate::{LoggingConfig, NovaConfig, KNOWN_LANGUAGE_IDS};

/// Context for semantic config validation.
///
/// Relative paths in the config resolve against the workspace root when known, otherwise against
/// the directory containing the config file.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfigValidationContext<'a> {
    /// Workspace root used to resolve relative paths in the config.
    pub workspace_root: Option<&'a Path>,
    /// Directory containing the loaded config file, used as a fallback base directory.
    pub config_dir: Option<&'a Path>,
}

impl<'a> ConfigValidationContext<'a> {
    fn base_dir(self) -> Option<&'a Path> {
        self.workspace_root.or(self.config_dir)
    }
}

impl NovaConfig {
    /// Validate semantic invariants for a configuration.
    ///
    /// Validation is best-effort: it attempts to report as many problems as possible in one pass.
    #[must_use]
    pub fn validate(&self) -> ValidationDiagnostics {
        self.validate_with_context(ConfigValidationContext::default())
    }

    /// Like [`NovaConfig::validate`] but with access to additional context such as the workspace root.
    #[must_use]
    pub fn validate_with_context(&self, ctx: ConfigValidationContext<'_>) -> ValidationDiagnostics {
        let mut out = ValidationDiagnostics::default();

        validate_sync(self, &mut out);
        validate_logging(self, ctx, &mut out);

        out
    }
}

fn validate_sync(config: &NovaConfig, out: &mut ValidationDiagnostics) {
    let sync = &config.sync;

    if matches!(&sync.project_name, Some(name) if name.trim().is_empty()) {
        out.errors.push(ConfigValidationError::InvalidValue {
            toml_path: "sync.project_name".to_string(),
            message: "must not be empty".to_string(),
        });
    }

    if sync.language_priority.is_empty() {
        out.warnings.push(ConfigWarning::InvalidValue {
            toml_path: "sync.language_priority".to_string(),
            message: "is empty; every module will be classified as GENERIC_MODULE".to_string(),
        });
    }

    let mut seen = BTreeSet::new();
    for (idx, language) in sync.language_priority.iter().enumerate() {
        let toml_path = format!("sync.language_priority[{idx}]");
        if !seen.insert(language.as_str()) {
            out.warnings.push(ConfigWarning::SyncDuplicateLanguage {
                toml_path,
                language: language.clone(),
            });
            continue;
        }
        if !KNOWN_LANGUAGE_IDS.contains(&language.as_str()) {
            out.warnings.push(ConfigWarning::SyncUnknownLanguage {
                toml_path,
                language: language.clone(),
            });
        }
    }

    if matches!(sync.default_load.max_targets, Some(0)) {
        out.errors.push(ConfigValidationError::InvalidValue {
            toml_path: "sync.default_load.max_targets".to_string(),
            message: "must be >= 1".to_string(),
        });
    }
}

fn validate_logging(
    config: &NovaConfig,
    ctx: ConfigValidationContext<'_>,
    out: &mut ValidationDiagnostics,
) {
    let normalized = LoggingConfig::normalize_level_directives(&config.logging.level);
    if !config.logging.level.trim().is_empty()
        && tracing_subscriber::EnvFilter::try_new(normalized.clone()).is_err()
    {
        out.warnings.push(ConfigWarning::LoggingLevelInvalid {
            value: config.logging.level.clone(),
            normalized,
        });
    }

    let Some(file) = &config.logging.file else {
        return;
    };
    let resolved = if file.is_absolute() {
        file.clone()
    } else if let Some(base_dir) = ctx.base_dir() {
        base_dir.join(file)
    } else {
        return;
    };
    let Some(parent) = resolved.parent().filter(|parent| !parent.as_os_str().is_empty()) else {
        return;
    };
    if !parent.is_dir() {
        out.warnings.push(ConfigWarning::LoggingFileDirMissing {
            toml_path: "logging.file".to_string(),
            resolved: parent.to_path_buf(),
        });
    }
}
