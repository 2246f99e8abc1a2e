//! `devdash dashboard`: assemble GitHub, LeetCode and contest data through the
//! response cache, then print a compact summary.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use devdash_core::{
    CacheDomain, CacheEntry, CacheKey, Clock, FetchError, Freshness, KeyValueStore, Lookup,
    RequestId, RequestTracker, ResponseCache, SystemClock,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::task::JoinSet;

use crate::config::load_config;
use crate::sources::{CommandSource, DataSource, validate_username};
use crate::state::open_store;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DashboardRequest {
    pub github: Option<String>,
    pub leetcode: Option<String>,
    /// Skip fresh cache entries and fetch everything again.
    pub refresh: bool,
}

impl DashboardRequest {
    /// Key of the aggregated snapshot for this combination of users.
    pub fn snapshot_key(&self) -> CacheKey {
        let gh = self.github.as_deref().unwrap_or("-");
        let lc = self.leetcode.as_deref().unwrap_or("-");
        CacheKey::for_user(CacheDomain::Dashboard, format!("{gh}+{lc}"))
    }

    /// Per-domain keys in display order. Contests are always included.
    pub fn section_keys(&self) -> Vec<CacheKey> {
        let mut keys = Vec::new();
        if let Some(u) = &self.github {
            keys.push(CacheKey::for_user(CacheDomain::Github, u));
        }
        if let Some(u) = &self.leetcode {
            keys.push(CacheKey::for_user(CacheDomain::Leetcode, u));
        }
        keys.push(CacheKey::global(CacheDomain::Contests));
        keys
    }
}

#[derive(Debug, Clone)]
pub struct Sources<S> {
    pub github: S,
    pub leetcode: S,
    pub contests: S,
}

impl<S: DataSource> Sources<S> {
    fn for_domain(&self, domain: CacheDomain) -> &S {
        match domain {
            CacheDomain::Github => &self.github,
            CacheDomain::Leetcode => &self.leetcode,
            _ => &self.contests,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub key: CacheKey,
    /// Current data, or the last known data when `error` is set.
    pub data: Option<Value>,
    pub fetched_at: Option<DateTime<Utc>>,
    pub freshness: Option<Freshness>,
    pub error: Option<FetchError>,
}

impl Section {
    fn from_entry(key: CacheKey, entry: CacheEntry) -> Self {
        Self {
            key,
            data: Some(entry.data),
            fetched_at: Some(entry.timestamp),
            freshness: Some(Freshness::Cached),
            error: None,
        }
    }

    fn failed(key: CacheKey, error: FetchError, stale: Option<CacheEntry>) -> Self {
        let (data, fetched_at) = match stale {
            Some(e) => (Some(e.data), Some(e.timestamp)),
            None => (None, None),
        };
        Self {
            key,
            data,
            fetched_at,
            freshness: None,
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Dashboard {
    pub sections: Vec<Section>,
    /// Set when the whole dashboard was served from, or written to, the snapshot cache.
    pub snapshot_at: Option<DateTime<Utc>>,
    pub from_snapshot: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    sections: Vec<SnapshotSection>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotSection {
    domain: CacheDomain,
    #[serde(default)]
    username: Option<String>,
    data: Value,
    fetched_at: DateTime<Utc>,
}

/// In-flight fetches: each task reports its key, its request id and the result.
pub type FetchTasks = JoinSet<(CacheKey, RequestId, Result<Value, FetchError>)>;

/// Start a fetch for each key on `tasks`, registering it with `tracker`.
/// A key started again later supersedes this request.
pub fn spawn_fetches<S>(
    tracker: &mut RequestTracker,
    sources: &Sources<S>,
    keys: Vec<CacheKey>,
    tasks: &mut FetchTasks,
) -> Vec<(CacheKey, RequestId)>
where
    S: DataSource + Clone + 'static,
{
    let mut started = Vec::with_capacity(keys.len());
    for key in keys {
        let id = tracker.begin(key.composite());
        let source = sources.for_domain(key.domain).clone();
        tracing::debug!(domain = %source.domain(), key = %key, id, "fetching");
        let task_key = key.clone();
        tasks.spawn(async move {
            let result = source.fetch(task_key.username.as_deref()).await;
            (task_key, id, result)
        });
        started.push((key, id));
    }
    started
}

/// Drain `tasks` and commit each result whose request is still the newest for
/// its key. Superseded results are dropped and get no section.
pub async fn commit_fetches<St, C>(
    cache: &mut ResponseCache<St, C>,
    tracker: &mut RequestTracker,
    tasks: &mut FetchTasks,
    started: Vec<(CacheKey, RequestId)>,
) -> Vec<Section>
where
    St: KeyValueStore,
    C: Clock,
{
    let mut sections = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        let (key, id, result) = match joined {
            Ok(done) => done,
            Err(e) => {
                tracing::warn!(error = %e, "fetch task failed");
                continue;
            }
        };
        if !tracker.finish(&key.composite(), id) {
            continue;
        }
        let section = match cache.commit(&key, result) {
            Ok(got) => Section {
                key,
                data: Some(got.data),
                fetched_at: Some(got.fetched_at),
                freshness: Some(got.freshness),
                error: None,
            },
            Err(e) => {
                let stale = cache.stale(&key);
                Section::failed(key, e, stale)
            }
        };
        sections.push(section);
    }

    // A task that panicked never reported back, so its request is still current.
    for (key, id) in started {
        let slot = key.composite();
        if !tracker.is_current(&slot, id) {
            continue;
        }
        tracker.abandon(&slot);
        let stale = cache.stale(&key);
        sections.push(Section::failed(key, FetchError::upstream("fetch task failed"), stale));
    }
    sections
}

/// Fetch whatever is missing or expired and commit it to the cache.
///
/// Fetches for different domains run concurrently; results are committed one
/// at a time on the calling task. `tracker` is owned by the caller: a request
/// it has since restarted for the same key wins, and the older result is
/// dropped.
pub async fn assemble<S, St, C>(
    cache: &mut ResponseCache<St, C>,
    tracker: &mut RequestTracker,
    sources: &Sources<S>,
    req: &DashboardRequest,
) -> Dashboard
where
    S: DataSource + Clone + 'static,
    St: KeyValueStore,
    C: Clock,
{
    let snapshot_key = req.snapshot_key();
    if !req.refresh {
        if let Some(dashboard) = from_snapshot(cache, &snapshot_key) {
            return dashboard;
        }
    }

    let mut sections = Vec::new();
    let mut to_fetch = Vec::new();
    for key in req.section_keys() {
        if !req.refresh {
            if let Lookup::Fresh(entry) = cache.lookup(&key) {
                tracing::debug!(key = %key, "section served from cache");
                sections.push(Section::from_entry(key, entry));
                continue;
            }
        }
        to_fetch.push(key);
    }

    let mut tasks = FetchTasks::new();
    let started = spawn_fetches(tracker, sources, to_fetch, &mut tasks);
    sections.extend(commit_fetches(cache, tracker, &mut tasks, started).await);

    sections.sort_by_key(|s| {
        CacheDomain::ALL
            .iter()
            .position(|d| *d == s.key.domain)
            .unwrap_or(usize::MAX)
    });

    let snapshot_at = write_snapshot(cache, &snapshot_key, &sections);
    Dashboard {
        sections,
        snapshot_at,
        from_snapshot: false,
    }
}

fn from_snapshot<St: KeyValueStore, C: Clock>(
    cache: &mut ResponseCache<St, C>,
    key: &CacheKey,
) -> Option<Dashboard> {
    let Lookup::Fresh(entry) = cache.lookup(key) else {
        return None;
    };
    let snapshot: Snapshot = match serde_json::from_value(entry.data) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(key = %key, error = %e, "ignoring malformed dashboard snapshot");
            return None;
        }
    };
    let sections: Vec<Section> = snapshot
        .sections
        .into_iter()
        .map(|s| Section {
            key: CacheKey {
                domain: s.domain,
                username: s.username,
            },
            data: Some(s.data),
            fetched_at: Some(s.fetched_at),
            freshness: Some(Freshness::Cached),
            error: None,
        })
        .collect();
    // the snapshot is only as fresh as its oldest section
    let now = cache.now();
    if let Some(expired) = sections.iter().find(|s: &&Section| {
        s.fetched_at
            .is_none_or(|at| now - at >= cache.policy().ttl(s.key.domain))
    }) {
        tracing::debug!(key = %key, section = %expired.key, "snapshot holds an expired section");
        return None;
    }
    tracing::debug!(key = %key, "dashboard served from snapshot");
    Some(Dashboard {
        sections,
        snapshot_at: Some(entry.timestamp),
        from_snapshot: true,
    })
}

/// Only complete dashboards are snapshotted.
fn write_snapshot<St: KeyValueStore, C: Clock>(
    cache: &mut ResponseCache<St, C>,
    key: &CacheKey,
    sections: &[Section],
) -> Option<DateTime<Utc>> {
    let mut out = Vec::with_capacity(sections.len());
    for s in sections {
        if s.error.is_some() {
            return None;
        }
        out.push(SnapshotSection {
            domain: s.key.domain,
            username: s.key.username.clone(),
            data: s.data.clone()?,
            fetched_at: s.fetched_at?,
        });
    }
    let value = match serde_json::to_value(Snapshot { sections: out }) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, "could not encode dashboard snapshot");
            return None;
        }
    };
    match cache.store(key, value) {
        Ok(entry) => Some(entry.timestamp),
        Err(e) => {
            tracing::warn!(key = %key, error = %e, "could not write dashboard snapshot");
            None
        }
    }
}

pub async fn run(github: Option<String>, leetcode: Option<String>, refresh: bool) -> Result<()> {
    let cfg = load_config()?;
    let req = DashboardRequest {
        github: github.as_deref().map(validate_username).transpose()?,
        leetcode: leetcode.as_deref().map(validate_username).transpose()?,
        refresh,
    };
    let sources = Sources {
        github: CommandSource::from_config(&cfg.sources, CacheDomain::Github),
        leetcode: CommandSource::from_config(&cfg.sources, CacheDomain::Leetcode),
        contests: CommandSource::from_config(&cfg.sources, CacheDomain::Contests),
    };

    let mut cache = ResponseCache::new(open_store()?, SystemClock, cfg.cache_policy());
    let mut tracker = RequestTracker::new();
    let dashboard = assemble(&mut cache, &mut tracker, &sources, &req).await;
    print!("{}", render(&dashboard, cache.now()));
    Ok(())
}

pub fn render(dashboard: &Dashboard, now: DateTime<Utc>) -> String {
    let mut out = String::new();
    if dashboard.from_snapshot {
        if let Some(at) = dashboard.snapshot_at {
            out.push_str(&format!("(cached dashboard, {} old)\n\n", human_age(now - at)));
        }
    }
    for section in &dashboard.sections {
        out.push_str(&format!("== {} ==", section_title(&section.key)));
        match (section.freshness, section.fetched_at) {
            (Some(Freshness::Fetched), _) => out.push_str(" [fetched]"),
            (Some(Freshness::Cached), Some(at)) => {
                out.push_str(&format!(" [cached {} ago]", human_age(now - at)))
            }
            (None, Some(at)) => out.push_str(&format!(" [stale, {} old]", human_age(now - at))),
            _ => {}
        }
        out.push('\n');

        if let Some(err) = &section.error {
            out.push_str(&format!("warning: {}\n", describe_error(err)));
        }
        match &section.data {
            Some(data) => {
                for line in summarize(section.key.domain, data) {
                    out.push_str("  ");
                    out.push_str(&line);
                    out.push('\n');
                }
            }
            None if section.error.is_some() => out.push_str("  (no cached data)\n"),
            None => {}
        }
        out.push('\n');
    }
    out
}

fn section_title(key: &CacheKey) -> String {
    let name = match key.domain {
        CacheDomain::Github => "GitHub",
        CacheDomain::Leetcode => "LeetCode",
        CacheDomain::Contests => "Upcoming contests",
        CacheDomain::Dashboard => "Dashboard",
    };
    match &key.username {
        Some(u) => format!("{name} ({u})"),
        None => name.to_string(),
    }
}

fn describe_error(err: &FetchError) -> String {
    match err {
        FetchError::NotFound(subject) => format!("{subject}: user not found"),
        FetchError::MissingCredential(why) => {
            format!("{why} (see [sources] in config.toml)")
        }
        FetchError::Upstream { .. } => format!("{err}; showing last known data if any"),
    }
}

/// "45s", "12m", "3h", "2d".
pub fn human_age(age: Duration) -> String {
    let secs = age.num_seconds().max(0);
    match secs {
        s if s < 60 => format!("{s}s"),
        s if s < 3600 => format!("{}m", s / 60),
        s if s < 86_400 => format!("{}h", s / 3600),
        s => format!("{}d", s / 86_400),
    }
}

fn scalar(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn field(label: &str, v: Option<&Value>) -> Option<String> {
    v.and_then(scalar).map(|s| format!("{label}: {s}"))
}

pub fn summarize(domain: CacheDomain, data: &Value) -> Vec<String> {
    match domain {
        CacheDomain::Github => summarize_github(data),
        CacheDomain::Leetcode => summarize_leetcode(data),
        CacheDomain::Contests => summarize_contests(data),
        CacheDomain::Dashboard => generic(data),
    }
}

fn summarize_github(data: &Value) -> Vec<String> {
    // `gh api users/<name>` prints the bare profile
    let profile = data.get("profile").unwrap_or(data);
    let mut lines: Vec<String> = [
        field("login", profile.get("login")),
        field("name", profile.get("name")),
        field("public repos", profile.get("public_repos")),
        field("followers", profile.get("followers")),
        field("stars", data.get("stars")),
        field("forks", data.get("forks")),
    ]
    .into_iter()
    .flatten()
    .collect();

    if let Some(langs) = data.get("languages").and_then(Value::as_object) {
        let mut ranked: Vec<(&String, f64)> = langs
            .iter()
            .filter_map(|(name, v)| v.as_f64().map(|n| (name, n)))
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        let top: Vec<&str> = ranked.iter().take(3).map(|(n, _)| n.as_str()).collect();
        if !top.is_empty() {
            lines.push(format!("top languages: {}", top.join(", ")));
        }
    }
    if lines.is_empty() {
        return generic(data);
    }
    lines
}

fn summarize_leetcode(data: &Value) -> Vec<String> {
    let mut lines = Vec::new();
    let profile = data.get("profile").unwrap_or(data);
    lines.extend(field("user", profile.get("username")));
    lines.extend(field("ranking", profile.get("ranking").or_else(|| data.pointer("/profile/profile/ranking"))));

    // [{difficulty, count}, ...]
    if let Some(solved) = data
        .pointer("/submissions/acSubmissionNum")
        .or_else(|| data.get("submissions"))
        .and_then(Value::as_array)
    {
        let parts: Vec<String> = solved
            .iter()
            .filter_map(|s| Some(format!("{} {}", scalar(s.get("difficulty")?)?, scalar(s.get("count")?)?)))
            .collect();
        if !parts.is_empty() {
            lines.push(format!("solved: {}", parts.join(" / ")));
        }
    }
    lines.extend(field("contest rating", data.pointer("/contest/rating")));
    if let Some(badges) = data.get("badges").and_then(Value::as_array) {
        lines.push(format!("badges: {}", badges.len()));
    }
    if let Some(recent) = data.get("recent").and_then(Value::as_array) {
        for r in recent.iter().take(3) {
            lines.extend(field("recent", r.get("title")));
        }
    }
    if lines.is_empty() {
        return generic(data);
    }
    lines
}

fn summarize_contests(data: &Value) -> Vec<String> {
    let Some(list) = data.as_array() else {
        return generic(data);
    };
    if list.is_empty() {
        return vec!["no upcoming contests".to_string()];
    }
    let mut lines: Vec<String> = list
        .iter()
        .take(5)
        .map(|c| {
            let title = c.get("title").and_then(scalar).unwrap_or_else(|| "(untitled)".to_string());
            let host = c.get("host").and_then(scalar);
            let start = c.get("startTime").and_then(scalar);
            match (host, start) {
                (Some(h), Some(s)) => format!("{title} [{h}] starts {s}"),
                (Some(h), None) => format!("{title} [{h}]"),
                (None, Some(s)) => format!("{title} starts {s}"),
                (None, None) => title,
            }
        })
        .collect();
    if list.len() > 5 {
        lines.push(format!("... and {} more", list.len() - 5));
    }
    lines
}

fn generic(data: &Value) -> Vec<String> {
    match data {
        Value::Object(map) => map
            .iter()
            .filter_map(|(k, v)| scalar(v).map(|s| format!("{k}: {s}")))
            .take(8)
            .collect(),
        Value::Array(items) => vec![format!("{} items", items.len())],
        other => scalar(other).into_iter().collect(),
    }
}
