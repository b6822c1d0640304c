use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use toml::Value;

use crate::command::DEFAULT_ENGINE;
use crate::container::ContainerOptions;
use crate::error::{Error, Result};
use crate::ports::VERSIONED_PORT;

/// Settings file looked up in the MicroPython root when `--config` is not given.
pub const SETTINGS_FILE: &str = "mpbuild.toml";
pub const ENGINE_ENV: &str = "MPBUILD_CONTAINER_ENGINE";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub container_engine: String,
    /// esp32 toolchain tag used when none is given on the command line.
    pub idf_version: Option<String>,
    pub log_format: LogFormat,
    /// Port name -> default build image.
    pub images: BTreeMap<String, String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            container_engine: DEFAULT_ENGINE.to_string(),
            idf_version: None,
            log_format: LogFormat::Text,
            images: BTreeMap::new(),
        }
    }
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self> {
        let value = load_value(path)?;
        value.try_into().map_err(|e| Error::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Explicit file, else `<root>/mpbuild.toml` when present, else defaults.
    /// Environment overrides are applied last.
    pub fn discover(explicit: Option<&Path>, root: &Path) -> Result<Self> {
        let mut settings = match explicit {
            Some(p) => Self::load(p)?,
            None => {
                let candidate = root.join(SETTINGS_FILE);
                if candidate.is_file() {
                    tracing::debug!(path = %candidate.display(), "loading settings");
                    Self::load(&candidate)?
                } else {
                    Self::default()
                }
            }
        };
        settings.apply_env();
        Ok(settings)
    }

    pub fn apply_env(&mut self) {
        if let Ok(engine) = std::env::var(ENGINE_ENV) {
            let engine = engine.trim();
            if !engine.is_empty() {
                self.container_engine = engine.to_string();
            }
        }
    }

    /// Container options for a build on `port`. A version given on the command
    /// line always wins; the configured esp32 tag only applies to esp32.
    pub fn container_options(
        &self,
        port: &str,
        override_image: Option<String>,
        cli_version: Option<String>,
    ) -> ContainerOptions {
        let toolchain_version = cli_version.or_else(|| {
            (port == VERSIONED_PORT)
                .then(|| self.idf_version.clone())
                .flatten()
        });
        ContainerOptions {
            override_image,
            toolchain_version,
            port_images: self.images.clone(),
        }
    }
}

/// Load `.env` from the current directory, if any.
pub fn load_dotenv() {
    if let Ok(path) = dotenv::dotenv() {
        tracing::debug!(path = %path.display(), "loaded .env");
    }
}

fn merge_values(base: &mut Value, child: Value) {
    match (base, child) {
        (Value::Table(base_tbl), Value::Table(child_tbl)) => {
            for (k, v) in child_tbl {
                match base_tbl.get_mut(&k) {
                    Some(existing) => merge_values(existing, v),
                    None => {
                        base_tbl.insert(k, v);
                    }
                }
            }
        }
        (base_slot, child_val) => {
            *base_slot = child_val;
        }
    }
}

fn resolve_ref_path(from_file: &Path, reference: &str) -> PathBuf {
    let p = PathBuf::from(reference);
    if p.is_absolute() {
        p
    } else {
        from_file.parent().unwrap_or_else(|| Path::new(".")).join(p)
    }
}

fn load_value_inner(path: &Path, stack: &mut HashSet<PathBuf>) -> Result<Value> {
    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    if !stack.insert(canonical.clone()) {
        return Err(Error::Config {
            path: path.to_path_buf(),
            reason: "extends cycle".into(),
        });
    }

    let data = fs::read_to_string(path).map_err(|e| Error::Config {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let mut value: Value = toml::from_str(&data).map_err(|e| Error::Config {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let mut out = Value::Table(Default::default());
    if let Some(ext) = value.get("extends") {
        let Some(ext) = ext.as_str() else {
            return Err(Error::Config {
                path: path.to_path_buf(),
                reason: "'extends' must be a string".into(),
            });
        };
        out = load_value_inner(&resolve_ref_path(path, ext), stack)?;
    }
    if let Some(tbl) = value.as_table_mut() {
        tbl.remove("extends");
    }
    merge_values(&mut out, value);

    stack.remove(&canonical);
    Ok(out)
}

/// Parse a settings file with its `extends` parents merged underneath.
pub fn load_value(path: &Path) -> Result<Value> {
    let mut stack = HashSet::new();
    load_value_inner(path, &mut stack)
}
