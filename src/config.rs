// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::errors::{Error, Result};
use directories::BaseDirs;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const DEFAULT_CASHFLOW_LIMIT: usize = 200;
const CONFIG_SUBDIR: &str = "github.pacificbrian/go-bookkeeper";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DbConfig {
    pub db: String,
    pub user: String,
    pub password: String,
    pub host: String,
    pub port: u16,
    pub name: String,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            db: "sqlite".to_string(),
            user: String::new(),
            password: String::new(),
            host: "localhost".to_string(),
            port: 3306,
            name: "db/gobook_test.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    pub sessions: bool,
    pub cashflow_limit: usize,
    pub enable_auto_taxes: bool,
    pub enable_import_trade_fixups: bool,
    pub enable_security_filings: bool,
    pub enable_security_charts: bool,
    pub quote_timeout_secs: u64,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            sessions: false,
            cashflow_limit: DEFAULT_CASHFLOW_LIMIT,
            enable_auto_taxes: true,
            enable_import_trade_fixups: false,
            enable_security_filings: false,
            enable_security_charts: false,
            quote_timeout_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub db: DbConfig,
    pub global: GlobalConfig,
    #[serde(skip)]
    pub home: PathBuf,
}

impl Config {
    /// Path of the SQLite file, relative names resolved under the home dir.
    pub fn database_path(&self) -> PathBuf {
        let name = Path::new(&self.db.name);
        if name.is_absolute() {
            name.to_path_buf()
        } else {
            self.home.join(name)
        }
    }
}

/// Resolves the config/data root: `GOBOOK_HOME`, else the platform config dir.
pub fn home_dir(env: &HashMap<String, String>) -> Result<PathBuf> {
    if let Some(home) = env.get("GOBOOK_HOME").filter(|h| !h.trim().is_empty()) {
        return Ok(PathBuf::from(home.trim()));
    }
    let base = BaseDirs::new()
        .ok_or_else(|| Error::Config("Could not determine platform config dir".into()))?;
    Ok(base.config_dir().join(CONFIG_SUBDIR))
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path_ref = path.as_ref();
    debug!("Attempting to load configuration from: {:?}", path_ref);
    let contents = fs::read_to_string(path_ref)
        .map_err(|e| Error::Config(format!("Failed to read config file {:?}: {}", path_ref, e)))?;
    toml::from_str(&contents).map_err(|e| {
        Error::Config(format!(
            "Failed to parse TOML from config file {:?}: {}",
            path_ref, e
        ))
    })
}

/// Loads `config.toml` from the home dir (defaults when absent) and applies
/// `GOBOOK_DB*` overrides.
pub fn load_with_env(env: &HashMap<String, String>) -> Result<Config> {
    let home = home_dir(env)?;
    let path = home.join("config.toml");
    let mut cfg = if path.exists() {
        load_config(&path)?
    } else {
        info!("No config at {}, using defaults", path.display());
        Config::default()
    };
    cfg.home = home;
    apply_env(&mut cfg, env)?;
    Ok(cfg)
}

pub fn load_app_configuration() -> Result<Config> {
    let env: HashMap<String, String> = std::env::vars()
        .filter(|(k, _)| k.starts_with("GOBOOK_"))
        .collect();
    load_with_env(&env)
}

fn apply_env(cfg: &mut Config, env: &HashMap<String, String>) -> Result<()> {
    if let Some(v) = env.get("GOBOOK_DB") {
        cfg.db.db = v.trim().to_lowercase();
    }
    if let Some(v) = env.get("GOBOOK_DB_USER") {
        cfg.db.user = v.clone();
    }
    if let Some(v) = env.get("GOBOOK_DB_PASSWORD") {
        cfg.db.password = v.clone();
    }
    if let Some(v) = env.get("GOBOOK_DB_HOST") {
        cfg.db.host = v.clone();
    }
    if let Some(v) = env.get("GOBOOK_DB_PORT") {
        cfg.db.port = v
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("Invalid GOBOOK_DB_PORT '{}'", v)))?;
    }
    if let Some(v) = env.get("GOBOOK_DB_NAME") {
        cfg.db.name = v.clone();
    }
    Ok(())
}
