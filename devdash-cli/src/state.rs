use anyhow::{Context, Result};
use devdash_core::FileStore;
use std::fs;
use std::path::PathBuf;

/// `$DEVDASH_HOME`, or `~/.devdash`.
pub fn devdash_home() -> Result<PathBuf> {
    if let Some(dir) = std::env::var_os("DEVDASH_HOME").filter(|d| !d.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    let home = std::env::var("HOME").context("HOME is not set (or set DEVDASH_HOME)")?;
    Ok(PathBuf::from(home).join(".devdash"))
}

pub fn ensure_devdash_home() -> Result<PathBuf> {
    let dir = devdash_home()?;
    fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
    Ok(dir)
}

pub fn store_dir() -> Result<PathBuf> {
    Ok(ensure_devdash_home()?.join("store"))
}

/// The durable store holding quests, progress, toolkit and cache entries.
pub fn open_store() -> Result<FileStore> {
    let dir = store_dir()?;
    FileStore::open(&dir).with_context(|| format!("open store at {}", dir.display()))
}
