use anyhow::{Context, Result};
use payqr_core::time::DEFAULT_TIMEZONE;
use payqr_gateway::GatewayConfig;
use payqr_gateway::vietqr::DEFAULT_BASE_URL;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::state::ensure_payqr_home;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiSection,
    #[serde(default)]
    pub account: AccountSection,
    #[serde(default)]
    pub storage: StorageSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSection {
    pub base_url: String,
    pub client_id: String,
    pub api_key: String,
    pub timeout_secs: u64,
}

/// Receiving account printed into generated QR codes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountSection {
    pub account_no: String,
    pub account_name: String,
    /// BIN of the receiving bank.
    pub acq_id: String,
    pub template: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    /// Defaults to `<home>/transactions`.
    pub transactions_dir: Option<PathBuf>,
    /// Defaults to `<home>/bank_list.json`.
    pub bank_list: Option<PathBuf>,
    pub timezone: String,
}

impl Default for ApiSection {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            client_id: String::new(),
            api_key: String::new(),
            timeout_secs: 10,
        }
    }
}

impl Default for AccountSection {
    fn default() -> Self {
        Self {
            account_no: String::new(),
            account_name: String::new(),
            acq_id: String::new(),
            template: "compact".to_string(),
        }
    }
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            transactions_dir: None,
            bank_list: None,
            timezone: DEFAULT_TIMEZONE.to_string(),
        }
    }
}

impl Config {
    /// Environment overrides, using the variable names of existing deployments.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let fields: [(&str, &mut String); 5] = [
            ("VIETQR_KEY", &mut self.api.client_id),
            ("VIETQR_SECRET", &mut self.api.api_key),
            ("ACQID", &mut self.account.acq_id),
            ("ACCOUNTNO", &mut self.account.account_no),
            ("ACCOUNTNAME", &mut self.account.account_name),
        ];
        for (var, slot) in fields {
            if let Some(v) = lookup(var).filter(|v| !v.is_empty()) {
                *slot = v;
            }
        }
    }

    pub fn gateway(&self) -> GatewayConfig {
        GatewayConfig {
            base_url: self.api.base_url.clone(),
            client_id: self.api.client_id.clone(),
            api_key: self.api.api_key.clone(),
            timeout_secs: self.api.timeout_secs,
        }
    }

    pub fn transactions_dir(&self, home: &Path) -> PathBuf {
        self.storage
            .transactions_dir
            .clone()
            .unwrap_or_else(|| home.join("transactions"))
    }

    pub fn bank_list_path(&self, home: &Path) -> PathBuf {
        self.storage
            .bank_list
            .clone()
            .unwrap_or_else(|| home.join("bank_list.json"))
    }
}

pub fn config_path() -> Result<PathBuf> {
    Ok(ensure_payqr_home()?.join("config.toml"))
}

pub fn load_config_from(p: &Path) -> Result<Config> {
    if !p.exists() {
        return Ok(Config::default());
    }
    let s = fs::read_to_string(p).with_context(|| format!("read {}", p.display()))?;
    toml::from_str(&s).with_context(|| format!("parse {}", p.display()))
}

/// Config file merged with environment overrides.
pub fn load_config() -> Result<Config> {
    let mut cfg = load_config_from(&config_path()?)?;
    cfg.apply_env(|k| std::env::var(k).ok());
    Ok(cfg)
}

pub fn save_config(cfg: &Config) -> Result<()> {
    let p = config_path()?;
    let s = toml::to_string_pretty(cfg).context("serialize config")?;
    fs::write(&p, s).with_context(|| format!("write {}", p.display()))?;
    Ok(())
}

pub fn init_config() -> Result<()> {
    let p = config_path()?;
    if p.exists() {
        println!("Config already exists: {}", p.display());
        return Ok(());
    }
    save_config(&Config::default())?;
    println!("Wrote {}", p.display());
    Ok(())
}
