//! Dev toolkit: saved links and code snippets.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::new_id;
use crate::store::{KeyValueStore, StoreResult, load_json, save_json};

pub const TOOLKIT_KEY: &str = "toolkit";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolkitKind {
    Link,
    Snippet,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolkitItem {
    pub id: String,
    pub kind: ToolkitKind,
    pub title: String,
    /// URL for links, body for snippets.
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl ToolkitItem {
    fn matches(&self, needle: &str) -> bool {
        self.title.to_lowercase().contains(needle)
            || self.content.to_lowercase().contains(needle)
            || self.tags.iter().any(|t| t.contains(needle))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolkitDraft {
    pub kind: ToolkitKind,
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
}

impl ToolkitDraft {
    pub fn link(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            kind: ToolkitKind::Link,
            title: title.into(),
            content: url.into(),
            tags: Vec::new(),
        }
    }

    pub fn snippet(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            kind: ToolkitKind::Snippet,
            title: title.into(),
            content: body.into(),
            tags: Vec::new(),
        }
    }

    pub fn with_tags<I, T>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }
}

/// Lower-case, trim, drop empties and duplicates, keep first-seen order.
fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for t in tags {
        let t = t.trim().to_lowercase();
        if !t.is_empty() && !out.contains(&t) {
            out.push(t);
        }
    }
    out
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Toolkit {
    items: Vec<ToolkitItem>,
}

impl Toolkit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from `store`; a malformed document yields an empty toolkit.
    pub fn load(store: &impl KeyValueStore) -> Self {
        Self {
            items: load_json(store, TOOLKIT_KEY).unwrap_or_default(),
        }
    }

    pub fn save(&self, store: &mut impl KeyValueStore) -> StoreResult<()> {
        save_json(store, TOOLKIT_KEY, &self.items)
    }

    pub fn items(&self) -> &[ToolkitItem] {
        &self.items
    }

    pub fn add(&mut self, draft: ToolkitDraft, now: DateTime<Utc>) -> &ToolkitItem {
        let mut id = new_id(now);
        while self.items.iter().any(|i| i.id == id) {
            id = new_id(now);
        }
        self.items.push(ToolkitItem {
            id,
            kind: draft.kind,
            title: draft.title.trim().to_string(),
            content: draft.content,
            tags: normalize_tags(draft.tags),
            created_at: now,
        });
        &self.items[self.items.len() - 1]
    }

    pub fn remove(&mut self, id: &str) -> Option<ToolkitItem> {
        let idx = self.items.iter().position(|i| i.id == id)?;
        Some(self.items.remove(idx))
    }

    /// Unique id or id-prefix match, case-insensitive.
    pub fn resolve(&self, prefix: &str) -> Option<&ToolkitItem> {
        let needle = prefix.trim().to_uppercase();
        if needle.is_empty() {
            return None;
        }
        let mut hits = self.items.iter().filter(|i| i.id.to_uppercase().starts_with(&needle));
        let first = hits.next()?;
        if first.id.to_uppercase() == needle || hits.next().is_none() {
            Some(first)
        } else {
            None
        }
    }

    /// Case-insensitive match on title, content or tag. An empty query returns everything.
    pub fn search(&self, query: &str) -> Vec<&ToolkitItem> {
        let needle = query.trim().to_lowercase();
        self.items
            .iter()
            .filter(|i| needle.is_empty() || i.matches(&needle))
            .collect()
    }

    pub fn by_tag(&self, tag: &str) -> Vec<&ToolkitItem> {
        let tag = tag.trim().to_lowercase();
        self.items.iter().filter(|i| i.tags.contains(&tag)).collect()
    }
}
