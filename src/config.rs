use std::path::{Path, PathBuf};

use clap::ValueEnum;
use facet::Facet;

use crate::error::ProvisionError;
use crate::manifest::CorruptPolicy;
use crate::paths;

// ── TOML schema ───────────────────────────────────────────

#[derive(Debug, Clone, Default, Facet)]
#[facet(default)]
pub struct ManifestConfig {
    pub path: Option<String>,
    pub on_corrupt: Option<String>,
}

#[derive(Debug, Clone, Default, Facet)]
#[facet(default)]
pub struct ProvisionConfig {
    pub script: Option<String>,
    /// `""` runs the script directly instead of through an interpreter.
    pub interpreter: Option<String>,
    pub mode: Option<String>,
}

#[derive(Debug, Clone, Default, Facet)]
#[facet(default)]
pub struct LoggingConfig {
    pub dir: Option<String>,
}

#[derive(Debug, Clone, Default, Facet)]
#[facet(default)]
pub struct Config {
    #[facet(default)]
    pub manifest: ManifestConfig,
    #[facet(default)]
    pub provision: ProvisionConfig,
    #[facet(default)]
    pub logging: LoggingConfig,
}

// ── resolved settings ─────────────────────────────────────

/// Which manifest entries a run hands to the provisioning script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ProvisionMode {
    /// Every entry, every run.
    #[default]
    All,
    /// Only entries without `provisioned_at`; successes get stamped.
    Pending,
}

/// Command-line values that take precedence over the config file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub manifest: Option<PathBuf>,
    pub script: Option<PathBuf>,
    pub interpreter: Option<String>,
    pub logs_dir: Option<PathBuf>,
    pub on_corrupt: Option<CorruptPolicy>,
    pub mode: Option<ProvisionMode>,
}

/// Fully resolved runtime settings, passed explicitly to the session.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub manifest_path: PathBuf,
    pub script_path: PathBuf,
    pub interpreter: Option<String>,
    pub logs_dir: PathBuf,
    pub on_corrupt: CorruptPolicy,
    pub mode: ProvisionMode,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            manifest_path: paths::manifest_path(),
            script_path: paths::script_path(),
            interpreter: Some(DEFAULT_INTERPRETER.into()),
            logs_dir: paths::logs_dir(),
            on_corrupt: CorruptPolicy::default(),
            mode: ProvisionMode::default(),
        }
    }
}

const DEFAULT_INTERPRETER: &str = "bash";

// ── validation ────────────────────────────────────────────

fn parse_choice<T: ValueEnum>(key: &str, value: &str) -> Result<T, ProvisionError> {
    T::from_str(value.trim(), true).map_err(|_| {
        let allowed: Vec<String> = T::value_variants()
            .iter()
            .filter_map(|v| v.to_possible_value())
            .map(|v| v.get_name().to_string())
            .collect();
        ProvisionError::Validation {
            message: format!("unknown {key} '{value}' (use {})", allowed.join(", ")),
        }
    })
}

/// Resolve a path from the config file against the file's own directory.
fn resolve_path(key: &str, value: &str, base_dir: &Path) -> Result<PathBuf, ProvisionError> {
    if value.trim().is_empty() {
        return Err(ProvisionError::Validation {
            message: format!("{key} must not be empty"),
        });
    }
    let path = PathBuf::from(value);
    if path.is_absolute() {
        Ok(path)
    } else {
        Ok(base_dir.join(path))
    }
}

fn normalize_interpreter(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

// ── public API ────────────────────────────────────────────

pub fn load_config(path: &Path) -> Result<Config, ProvisionError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ProvisionError::ConfigLoad {
        path: path.display().to_string(),
        source,
    })?;

    facet_toml::from_str(&contents).map_err(|e| ProvisionError::ConfigParse {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

/// Merge defaults, the config file (if any), and command-line overrides.
///
/// An explicit `config_path` must exist; the default location is optional.
pub fn resolve_settings(
    config_path: Option<&Path>,
    overrides: Overrides,
) -> Result<Settings, ProvisionError> {
    let (config, base_dir) = match config_path {
        Some(path) => (load_config(path)?, parent_dir(path)),
        None => {
            let default_path = paths::config_file();
            if default_path.exists() {
                (load_config(&default_path)?, parent_dir(&default_path))
            } else {
                (Config::default(), PathBuf::from("."))
            }
        }
    };

    let mut settings = apply_config(Settings::default(), &config, &base_dir)?;
    apply_overrides(&mut settings, overrides);

    tracing::debug!(?settings, "resolved settings");
    Ok(settings)
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn apply_config(
    mut settings: Settings,
    config: &Config,
    base_dir: &Path,
) -> Result<Settings, ProvisionError> {
    if let Some(ref path) = config.manifest.path {
        settings.manifest_path = resolve_path("manifest.path", path, base_dir)?;
    }
    if let Some(ref policy) = config.manifest.on_corrupt {
        settings.on_corrupt = parse_choice("manifest.on_corrupt", policy)?;
    }
    if let Some(ref script) = config.provision.script {
        settings.script_path = resolve_path("provision.script", script, base_dir)?;
    }
    if let Some(ref interpreter) = config.provision.interpreter {
        settings.interpreter = normalize_interpreter(interpreter.clone());
    }
    if let Some(ref mode) = config.provision.mode {
        settings.mode = parse_choice("provision.mode", mode)?;
    }
    if let Some(ref dir) = config.logging.dir {
        settings.logs_dir = resolve_path("logging.dir", dir, base_dir)?;
    }
    Ok(settings)
}

fn apply_overrides(settings: &mut Settings, overrides: Overrides) {
    if let Some(path) = overrides.manifest {
        settings.manifest_path = path;
    }
    if let Some(path) = overrides.script {
        settings.script_path = path;
    }
    if let Some(interpreter) = overrides.interpreter {
        settings.interpreter = normalize_interpreter(interpreter);
    }
    if let Some(dir) = overrides.logs_dir {
        settings.logs_dir = dir;
    }
    if let Some(policy) = overrides.on_corrupt {
        settings.on_corrupt = policy;
    }
    if let Some(mode) = overrides.mode {
        settings.mode = mode;
    }
}
