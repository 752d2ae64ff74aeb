//! Layered configuration loader.
//!
//! Discovers configuration layers (system/user/cwd/runtime), validates each
//! against the schema, merges them over the built-in defaults and produces a
//! final `MoneyDeskConfig`.

mod layer_io;
mod merge;
mod schema;
mod utils;


use crate::{ConfigError, MoneyDeskConfig};
use log::{debug, info};
use moneydesk_rs_protocol::Tier;
use serde_json::Value;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Default config filename in local layers.
const DEFAULT_CONFIG_FILE: &str = "moneydesk.json5";
/// Default config directory under the user home.
const DEFAULT_CONFIG_DIR: &str = ".moneydesk";
/// Default SQLite filename under the user config directory.
const DEFAULT_DATABASE_FILE: &str = "moneydesk.db";

#[cfg(unix)]
/// Default system config path on Unix.
const SYSTEM_CONFIG_PATH: &str = "/etc/moneydesk/moneydesk.json5";
#[cfg(windows)]
/// Default system config path on Windows.
const SYSTEM_CONFIG_PATH: &str = "C:\\ProgramData\\moneydesk\\moneydesk.json5";

/// Upper bound for the replayed history window.
const MAX_HISTORY_WINDOW: usize = 20;

/// Effective config plus metadata about which layers were loaded.
#[derive(Debug, Clone)]
pub struct LayeredConfig {
    /// The merged, validated config.
    pub config: MoneyDeskConfig,
    /// Metadata for each layer that contributed to the config.
    pub layers: Vec<ConfigLayer>,
}

/// Origin for a single config layer in the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigLayerSource {
    /// System-wide configuration.
    System,
    /// User-specific configuration.
    User,
    /// Current working directory configuration.
    Cwd,
    /// Runtime overrides (highest precedence).
    Runtime,
}

/// Metadata about a loaded config layer.
#[derive(Debug, Clone)]
pub struct ConfigLayer {
    /// Layer origin (system, user, runtime, etc).
    pub source: ConfigLayerSource,
    /// Location on disk.
    pub path: Option<PathBuf>,
}

/// Schema validation mode for layered configs.
#[derive(Debug, Clone, Copy)]
enum SchemaMode {
    /// Partial validation for non-final layers.
    Partial,
    /// Full validation for the effective config.
    Full,
}

/// Options controlling layered config discovery and overrides.
#[derive(Debug, Clone)]
pub struct LayeredConfigOptions {
    /// Working directory used to find the cwd layer.
    pub cwd: PathBuf,
    /// Optional system config path (defaults to `/etc/moneydesk/moneydesk.json5` on Unix).
    pub system_config_path: Option<PathBuf>,
    /// Optional user config path (defaults to `~/.moneydesk/moneydesk.json5`).
    pub user_config_path: Option<PathBuf>,
    /// Runtime override config paths applied last.
    pub runtime_paths: Vec<PathBuf>,
}

impl LayeredConfigOptions {
    /// Create options with default layer locations for the provided cwd.
    pub fn new(cwd: impl AsRef<Path>) -> Self {
        Self {
            cwd: cwd.as_ref().to_path_buf(),
            system_config_path: layer_io::default_system_config_path(),
            user_config_path: layer_io::default_user_config_path(),
            runtime_paths: Vec::new(),
        }
    }

    /// Add a runtime override config path that is applied last.
    pub fn with_runtime_path(mut self, path: impl AsRef<Path>) -> Self {
        self.runtime_paths.push(path.as_ref().to_path_buf());
        self
    }
}

impl MoneyDeskConfig {
    /// Load a single config from a path (no layering).
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        info!("loading config from path: {}", path.as_ref().display());
        let contents = fs::read_to_string(path)?;
        Self::load_from_str(&contents)
    }

    /// Load a single config from JSON5 contents (no layering).
    pub fn load_from_str(contents: &str) -> Result<Self, ConfigError> {
        debug!("loading config from raw contents (len={})", contents.len());
        let value: Value = json5::from_str(contents)?;
        schema::validate_layer_schema(&value, SchemaMode::Partial, "config")?;
        let mut merged = defaults_value()?;
        merge::merge_json_values(&mut merged, &value);
        config_from_value(merged, "config")
    }

    /// Load a layered config stack using the default layer locations.
    pub fn load_layered(cwd: impl AsRef<Path>) -> Result<LayeredConfig, ConfigError> {
        info!(
            "loading layered config with defaults (cwd={})",
            cwd.as_ref().display()
        );
        Self::load_layered_with_options(LayeredConfigOptions::new(cwd))
    }

    /// Load a layered config stack using explicit layer locations and overrides.
    ///
    /// Layer precedence (low -> high): built-in defaults, system, user, cwd,
    /// runtime overrides.
    pub fn load_layered_with_options(
        options: LayeredConfigOptions,
    ) -> Result<LayeredConfig, ConfigError> {
        let cwd = utils::normalize_path(&options.cwd)?;
        debug!("normalized cwd for config load: {}", cwd.display());
        let mut layers = Vec::new();
        let mut merged = defaults_value()?;
        let mut seen_paths = HashSet::new();

        let cwd_path = cwd.join(DEFAULT_CONFIG_FILE);
        let discovered = [
            (
                ConfigLayerSource::System,
                options.system_config_path.as_deref(),
            ),
            (ConfigLayerSource::User, options.user_config_path.as_deref()),
            (ConfigLayerSource::Cwd, Some(cwd_path.as_path())),
        ];
        for (source, path) in discovered {
            let Some(path) = path else {
                continue;
            };
            if !seen_paths.insert(utils::unique_path(path)) {
                debug!(
                    "skipping duplicate layer (source={:?}, path={})",
                    source,
                    path.display()
                );
                continue;
            }
            if let Some(layer) = layer_io::load_optional_layer(source, Some(path))? {
                debug!("loaded {:?} layer", source);
                merge::merge_json_values(&mut merged, &layer.value);
                layers.push(layer.meta);
            }
        }

        for runtime_path in &options.runtime_paths {
            let layer = layer_io::load_required_layer(ConfigLayerSource::Runtime, runtime_path)?;
            debug!("loaded runtime layer (path={})", runtime_path.display());
            merge::merge_json_values(&mut merged, &layer.value);
            layers.push(layer.meta);
        }

        let config = config_from_value(merged, "effective")?;
        info!("layered config loaded (layers={})", layers.len());
        Ok(LayeredConfig { config, layers })
    }

    /// Validate configuration invariants that cannot be expressed in serde.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let router = &self.router;
        if router.max_message_chars == 0 {
            return Err(invalid("router.max_message_chars", "must be positive"));
        }
        if router.history_window > MAX_HISTORY_WINDOW {
            return Err(invalid(
                "router.history_window",
                &format!("must be at most {MAX_HISTORY_WINDOW}"),
            ));
        }
        if !(0.0..=1.0).contains(&router.canned_min_confidence) {
            return Err(invalid(
                "router.canned_min_confidence",
                "must be within [0, 1]",
            ));
        }

        let kb = &self.kb;
        for (path, value) in [
            ("kb.exact_threshold", kb.exact_threshold),
            ("kb.good_threshold", kb.good_threshold),
            ("kb.partial_threshold", kb.partial_threshold),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(invalid(path, "must be within (0, 1]"));
            }
        }
        if kb.exact_threshold < kb.good_threshold || kb.good_threshold < kb.partial_threshold {
            return Err(ConfigError::Invalid(
                "kb thresholds must satisfy exact >= good >= partial".to_string(),
            ));
        }

        for (feature, quota) in &self.quota.features {
            for (tier, limit) in &quota.limits {
                let path = format!("quota.features.{feature}.limits.{tier}");
                if Tier::parse(tier).is_none() {
                    return Err(invalid(&path, "unknown tier"));
                }
                if *limit < -1 {
                    return Err(invalid(&path, "must be -1, 0 or a positive count"));
                }
            }
        }
        for (path, feature) in [
            ("quota.chat_feature", &self.quota.chat_feature),
            ("quota.token_feature", &self.quota.token_feature),
        ] {
            if !self.quota.features.contains_key(feature) {
                return Err(invalid(path, "names a feature missing from quota.features"));
            }
        }

        if self.ai.timeout_secs == 0 {
            return Err(invalid("ai.timeout_secs", "must be positive"));
        }
        if !(0.0..=2.0).contains(&self.ai.temperature) {
            return Err(invalid("ai.temperature", "must be within [0, 2]"));
        }

        Ok(())
    }

    /// SQLite path from config, falling back to `~/.moneydesk/moneydesk.db`.
    pub fn database_path(&self) -> Option<PathBuf> {
        match &self.storage.path {
            Some(path) => Some(PathBuf::from(path)),
            None => layer_io::default_user_dir().map(|dir| dir.join(DEFAULT_DATABASE_FILE)),
        }
    }
}

/// Internal representation of a loaded config layer.
#[derive(Debug, Clone)]
struct LoadedLayer {
    meta: ConfigLayer,
    value: Value,
}

fn defaults_value() -> Result<Value, ConfigError> {
    Ok(serde_json::to_value(MoneyDeskConfig::default())?)
}

fn config_from_value(value: Value, label: &str) -> Result<MoneyDeskConfig, ConfigError> {
    schema::validate_layer_schema(&value, SchemaMode::Full, label)?;
    let config: MoneyDeskConfig = serde_json::from_value(value)?;
    config.validate()?;
    Ok(config)
}

fn invalid(path: &str, message: &str) -> ConfigError {
    ConfigError::InvalidField {
        path: path.to_string(),
        message: message.to_string(),
    }
}
