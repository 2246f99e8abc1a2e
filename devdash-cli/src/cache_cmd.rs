use anyhow::{Context, Result};
use chrono::Utc;
use clap::Subcommand;
use devdash_core::{CacheDomain, CacheEntry, CachePolicy, ResponseCache, SystemClock};

use crate::config::load_config;
use crate::dashboard::human_age;
use crate::state::open_store;

#[derive(Subcommand, Debug)]
pub enum CacheCommand {
    /// Show cached entries with their age
    List,

    /// Delete cached entries
    Clear {
        /// Only this domain: github | leetcode | contests | dashboard
        #[arg(long)]
        domain: Option<CacheDomain>,
    },
}

pub fn run(cmd: CacheCommand) -> Result<()> {
    let policy = load_config()?.cache_policy();
    let mut cache = ResponseCache::new(open_store()?, SystemClock, policy);
    match cmd {
        CacheCommand::List => {
            let entries = cache.entries().context("read cache entries")?;
            if entries.is_empty() {
                println!("Cache is empty.");
            }
            let now = cache.now();
            for e in &entries {
                println!("{}", entry_line(e, &policy, now));
            }
        }
        CacheCommand::Clear { domain } => {
            let removed = cache.clear(domain).context("clear cache")?;
            match domain {
                Some(d) => println!("Removed {removed} {d} entr{}", plural(removed)),
                None => println!("Removed {removed} entr{}", plural(removed)),
            }
        }
    }
    Ok(())
}

fn plural(n: usize) -> &'static str {
    if n == 1 { "y" } else { "ies" }
}

pub fn entry_line(e: &CacheEntry, policy: &CachePolicy, now: chrono::DateTime<Utc>) -> String {
    let domain = e.key.split(':').next().and_then(|d| d.parse::<CacheDomain>().ok());
    let status = match domain {
        Some(d) if e.is_fresh(now, policy.ttl(d)) => "fresh",
        Some(_) => "stale",
        None => "unknown",
    };
    format!("{:<32} {:>5} old  {status}", e.key, human_age(e.age(now)))
}
