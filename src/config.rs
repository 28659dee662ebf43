//! Host-level settings, distinct from the per-collection `colConfig` embedded
//! in [`crate::store::entities::Collection`].
//!
//! This is a convenience for embedding hosts that don't want to hardcode
//! paths; nothing in the functional contract of the store, scheduler or
//! templating depends on it.

use crate::Error;
use etcetera::{AppStrategy, AppStrategyArgs, choose_app_strategy};
use serde::{Deserialize, Serialize};
use std::fs::{create_dir_all, read_to_string, write};
use std::path::PathBuf;
use toml_edit::DocumentMut;

#[allow(clippy::missing_panics_doc)]
pub fn get_config_dir() -> PathBuf {
    let crate_name = env!("CARGO_PKG_NAME");
    if cfg!(feature = "testing") {
        let mut tmp_dir = PathBuf::from("/tmp");
        tmp_dir.push(crate_name);
        tmp_dir.push("config");
        create_dir_all(&tmp_dir).ok();
        return tmp_dir;
    }
    let strategy: etcetera::app_strategy::Xdg = choose_app_strategy(AppStrategyArgs {
        top_level_domain: "org".to_string(),
        author: crate_name.to_string(),
        app_name: crate_name.to_string(),
    })
    .expect("home directory must be resolvable");
    create_dir_all(strategy.config_dir()).ok();
    strategy.config_dir()
}

#[allow(clippy::missing_panics_doc)]
pub fn get_data_dir() -> PathBuf {
    let crate_name = env!("CARGO_PKG_NAME");
    if cfg!(feature = "testing") {
        let mut tmp_dir = PathBuf::from("/tmp");
        tmp_dir.push(crate_name);
        tmp_dir.push("data");
        create_dir_all(&tmp_dir).ok();
        return tmp_dir;
    }
    let strategy: etcetera::app_strategy::Xdg = choose_app_strategy(AppStrategyArgs {
        top_level_domain: "org".to_string(),
        author: crate_name.to_string(),
        app_name: crate_name.to_string(),
    })
    .expect("home directory must be resolvable");
    create_dir_all(strategy.data_dir()).ok();
    strategy.data_dir()
}

/// Host settings file: `data_dir`, `default_media_dir`, `default_snapshot_path`.
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct HostConfig {
    pub data_dir: PathBuf,
    pub default_media_dir: PathBuf,
    pub default_snapshot_path: PathBuf,
}

impl Default for HostConfig {
    fn default() -> Self {
        let data_dir = get_data_dir();
        Self {
            default_media_dir: data_dir.join("media"),
            default_snapshot_path: data_dir.join("collection.json"),
            data_dir,
        }
    }
}

fn get_host_config_file() -> PathBuf {
    let mut path = get_config_dir();
    path.push("config.toml");
    path
}

/// Reads the host config, writing a default file on first read if absent.
pub fn read_host_config() -> crate::Result<HostConfig> {
    let path = get_host_config_file();
    if !path.exists() {
        let config = HostConfig::default();
        write_host_config(&config)?;
        return Ok(config);
    }
    let contents = read_to_string(&path).map_err(|e| Error::IoFailure {
        description: format!("failed to read {}", path.display()),
        source: e,
    })?;
    let doc = contents
        .parse::<DocumentMut>()
        .map_err(|e| Error::Validation(e.to_string()))?;
    let config: HostConfig =
        toml_edit::de::from_document(doc).map_err(|e| Error::Validation(e.to_string()))?;
    Ok(config)
}

pub fn write_host_config(config: &HostConfig) -> crate::Result<()> {
    let path = get_host_config_file();
    let body = toml_edit::ser::to_string_pretty(config)
        .map_err(|e| Error::Validation(format!("failed to serialize host config: {e}")))?;
    write(&path, body).map_err(|e| Error::IoFailure {
        description: format!("failed to write {}", path.display()),
        source: e,
    })?;
    Ok(())
}
