//! Layered configuration loading with figment.
//!
//! Layers, lowest first:
//!
//! 1. Built-in defaults, or a base set with [`ConfigLoader::defaults`]
//! 2. The profile file, `courier.{profile}.toml`
//! 3. The main file, `courier.toml` or `config.toml`
//! 4. `COURIER_*` environment variables, `__` separating nested keys
//!    (`COURIER_POLLING__LIMIT=50` sets `polling.limit`)
//! 5. Single values set with [`ConfigLoader::set`]
//!
//! Files are looked up in the search paths (the working directory and
//! `<user config dir>/courier` unless paths are given); the first directory
//! holding a main or profile file wins. YAML files (`.yaml`, `.yml`) are read
//! with the `yaml-config` feature.

use std::path::{Path, PathBuf};

use figment::Figment;
#[cfg(any(feature = "toml-config", feature = "yaml-config"))]
use figment::providers::Format;
#[cfg(feature = "toml-config")]
use figment::providers::Toml;
#[cfg(feature = "yaml-config")]
use figment::providers::Yaml;
use figment::providers::{Env, Serialized};
use serde::Serialize;
use tracing::{debug, info};

use super::error::{ConfigError, ConfigResult};
use super::schema::CourierConfig;

const ENV_PREFIX: &str = "COURIER_";
/// Selects the profile file. Not itself a setting.
const PROFILE_VAR: &str = "COURIER_PROFILE";
const FILE_STEMS: [&str; 2] = ["courier", "config"];
const EXTENSIONS: [&str; 3] = ["toml", "yaml", "yml"];

/// The files picked for one load.
#[derive(Debug, Default, PartialEq, Eq)]
struct ConfigFiles {
    profile: Option<PathBuf>,
    main: Option<PathBuf>,
}

/// Loads a [`CourierConfig`] from defaults, files and the environment.
pub struct ConfigLoader {
    base: CourierConfig,
    profile: Option<String>,
    search_paths: Vec<PathBuf>,
    file: Option<PathBuf>,
    env: bool,
    overrides: Vec<Figment>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// A loader reading the profile from `COURIER_PROFILE`.
    pub fn new() -> Self {
        Self {
            base: CourierConfig::default(),
            profile: std::env::var(PROFILE_VAR)
                .ok()
                .filter(|p| !p.trim().is_empty()),
            search_paths: Vec::new(),
            file: None,
            env: true,
            overrides: Vec::new(),
        }
    }

    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into().to_lowercase());
        self
    }

    /// Adds a directory to look for config files in.
    pub fn search_path(mut self, path: impl AsRef<Path>) -> Self {
        self.search_paths.push(path.as_ref().to_path_buf());
        self
    }

    /// Loads exactly this file instead of searching. It must exist.
    pub fn file(mut self, path: impl AsRef<Path>) -> Self {
        self.file = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn without_env(mut self) -> Self {
        self.env = false;
        self
    }

    /// Replaces the built-in defaults. Files and the environment still apply
    /// on top.
    pub fn defaults(mut self, config: CourierConfig) -> Self {
        self.base = config;
        self
    }

    /// Sets one dotted key, e.g. `set("polling.limit", 10)`, above every
    /// other layer.
    pub fn set<T: Serialize>(mut self, key: &str, value: T) -> Self {
        self.overrides
            .push(Figment::from(Serialized::default(key, value)));
        self
    }

    pub fn load(self) -> ConfigResult<CourierConfig> {
        let mut figment = Figment::from(Serialized::defaults(&self.base));

        let files = match &self.file {
            Some(path) if !path.exists() => return Err(ConfigError::FileNotFound(path.clone())),
            Some(path) => ConfigFiles {
                profile: None,
                main: Some(path.clone()),
            },
            None => self.locate(),
        };
        for path in [&files.profile, &files.main].into_iter().flatten() {
            info!(path = %path.display(), "Loading configuration file");
            figment = merge_file(figment, path)?;
        }

        if self.env {
            figment = figment.merge(
                Env::prefixed(ENV_PREFIX)
                    .ignore(&["profile"])
                    .split("__"),
            );
        }
        for layer in self.overrides {
            figment = figment.merge(layer);
        }

        let config: CourierConfig = figment.extract()?;
        debug!(
            profile = self.profile.as_deref().unwrap_or("-"),
            use_create_task = config.dispatcher.use_create_task,
            polling_limit = config.polling.limit,
            "Configuration loaded"
        );
        Ok(config)
    }

    fn directories(&self) -> Vec<PathBuf> {
        if !self.search_paths.is_empty() {
            return self.search_paths.clone();
        }
        std::env::current_dir()
            .ok()
            .into_iter()
            .chain(dirs::config_dir().map(|dir| dir.join("courier")))
            .collect()
    }

    fn locate(&self) -> ConfigFiles {
        let extensions = EXTENSIONS.into_iter().filter(|ext| supported(ext));
        for dir in self.directories() {
            for stem in FILE_STEMS {
                for ext in extensions.clone() {
                    let files = ConfigFiles {
                        profile: self
                            .profile
                            .as_ref()
                            .map(|profile| dir.join(format!("{stem}.{profile}.{ext}")))
                            .filter(|path| path.exists()),
                        main: Some(dir.join(format!("{stem}.{ext}"))).filter(|path| path.exists()),
                    };
                    if files != ConfigFiles::default() {
                        return files;
                    }
                }
            }
        }
        debug!("No configuration file found, using defaults");
        ConfigFiles::default()
    }
}

fn supported(ext: &str) -> bool {
    match ext {
        #[cfg(feature = "toml-config")]
        "toml" => true,
        #[cfg(feature = "yaml-config")]
        "yaml" | "yml" => true,
        _ => false,
    }
}

#[allow(unused_variables)]
fn merge_file(figment: Figment, path: &Path) -> ConfigResult<Figment> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    match ext {
        #[cfg(feature = "toml-config")]
        "toml" => Ok(figment.merge(Toml::file(path))),
        #[cfg(feature = "yaml-config")]
        "yaml" | "yml" => Ok(figment.merge(Yaml::file(path))),
        _ => Err(ConfigError::ParseError(format!(
            "Unsupported or disabled configuration file format: .{ext}"
        ))),
    }
}
