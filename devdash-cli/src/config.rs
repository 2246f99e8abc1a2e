use anyhow::{Context, Result};
use chrono::Duration;
use chrono_tz::Tz;
use devdash_core::{CacheDomain, CachePolicy, parse_timezone};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::state::ensure_devdash_home;

/// Ten years. Larger TTLs are clamped.
const MAX_TTL_SECS: u64 = 10 * 365 * 24 * 3600;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralSection,
    pub cache: CacheSection,
    pub sources: SourcesSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSection {
    /// IANA zone used to decide which calendar day a completion falls on.
    pub timezone: String,
}

impl Default for GeneralSection {
    fn default() -> Self {
        Self {
            timezone: "UTC".to_string(),
        }
    }
}

/// TTLs in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    pub github_ttl_secs: u64,
    pub leetcode_ttl_secs: u64,
    pub contests_ttl_secs: u64,
    pub dashboard_ttl_secs: u64,
}

impl Default for CacheSection {
    fn default() -> Self {
        let policy = CachePolicy::default();
        Self {
            github_ttl_secs: policy.github.num_seconds() as u64,
            leetcode_ttl_secs: policy.leetcode.num_seconds() as u64,
            contests_ttl_secs: policy.contests.num_seconds() as u64,
            dashboard_ttl_secs: policy.dashboard.num_seconds() as u64,
        }
    }
}

/// Command templates for each data source. `{username}` is substituted.
/// An empty or missing entry means the source is not configured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesSection {
    pub github: Option<String>,
    pub leetcode: Option<String>,
    pub contests: Option<String>,
}

impl Default for SourcesSection {
    fn default() -> Self {
        Self {
            github: Some("gh api users/{username}".to_string()),
            leetcode: None,
            contests: None,
        }
    }
}

impl SourcesSection {
    pub fn template(&self, domain: CacheDomain) -> Option<&str> {
        let t = match domain {
            CacheDomain::Github => self.github.as_deref(),
            CacheDomain::Leetcode => self.leetcode.as_deref(),
            CacheDomain::Contests => self.contests.as_deref(),
            CacheDomain::Dashboard => None,
        };
        t.map(str::trim).filter(|t| !t.is_empty())
    }
}

impl Config {
    pub fn timezone(&self) -> Result<Tz> {
        parse_timezone(&self.general.timezone).context("general.timezone in config.toml")
    }

    pub fn cache_policy(&self) -> CachePolicy {
        let secs = |s: u64| Duration::seconds(s.min(MAX_TTL_SECS) as i64);
        CachePolicy::default()
            .with_ttl(CacheDomain::Github, secs(self.cache.github_ttl_secs))
            .with_ttl(CacheDomain::Leetcode, secs(self.cache.leetcode_ttl_secs))
            .with_ttl(CacheDomain::Contests, secs(self.cache.contests_ttl_secs))
            .with_ttl(CacheDomain::Dashboard, secs(self.cache.dashboard_ttl_secs))
    }
}

pub fn config_path() -> Result<PathBuf> {
    Ok(ensure_devdash_home()?.join("config.toml"))
}

pub fn load_config() -> Result<Config> {
    let p = config_path()?;
    if !p.exists() {
        return Ok(Config::default());
    }
    let s = fs::read_to_string(&p).with_context(|| format!("read {}", p.display()))?;
    parse_config(&s).with_context(|| format!("parse {}", p.display()))
}

pub fn parse_config(s: &str) -> Result<Config> {
    Ok(toml::from_str(s)?)
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

pub fn show_config() -> Result<()> {
    let cfg = load_config()?;
    println!("# {}", config_path()?.display());
    print!("{}", toml::to_string_pretty(&cfg).context("serialize config")?);
    Ok(())
}
