use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;

/// `$PAYQR_HOME`, or `~/.payqr`.
pub fn payqr_home() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("PAYQR_HOME") {
        if !dir.is_empty() {
            return Ok(PathBuf::from(dir));
        }
    }
    let home = std::env::var("HOME").context("HOME is not set")?;
    Ok(PathBuf::from(home).join(".payqr"))
}

pub fn ensure_payqr_home() -> Result<PathBuf> {
    let dir = payqr_home()?;
    fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
    Ok(dir)
}
