//! Quest engine: the quest list plus the player record, persisted after every mutation.
//!
//! `QuestBoard` holds the state and the transitions. `QuestEngine` wraps a
//! board together with a store and a clock and writes both documents back
//! before each mutating call returns.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde_json::Value;
use std::time::SystemTime;
use thiserror::Error;
use ulid::Ulid;

use crate::achievements::Achievement;
use crate::progress::{PlayerProgress, ProgressDelta};
use crate::quest::{Quest, QuestDraft, quests_from_rows};
use crate::store::{KeyValueStore, StoreResult, load_json, save_json};
use crate::time::{Clock, local_day};

pub const QUESTS_KEY: &str = "quests";
pub const PROGRESS_KEY: &str = "player_progress";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionOutcome {
    Completed {
        quest_id: String,
        xp_gained: u32,
        levels_gained: u32,
        unlocked: Vec<Achievement>,
        progress: PlayerProgress,
    },
    /// Completing twice is a no-op.
    AlreadyCompleted,
    UnknownQuest,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LookupError {
    #[error("no quest matches {0:?}")]
    NotFound(String),
    #[error("{prefix:?} is ambiguous ({count} matches)")]
    Ambiguous { prefix: String, count: usize },
}

/// Counts for the stats screen.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoardSummary {
    pub total: usize,
    pub pending: usize,
    pub completed: usize,
    pub pending_xp: u64,
    pub pending_minutes: u64,
    pub completion_rate: f64,
}

pub fn new_id(now: DateTime<Utc>) -> String {
    Ulid::from_datetime(SystemTime::from(now)).to_string()
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuestBoard {
    quests: Vec<Quest>,
    progress: PlayerProgress,
}

impl QuestBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from persisted parts, repairing what can be repaired.
    /// The flag is true when any quest row changed and should be written back.
    pub fn from_parts(mut quests: Vec<Quest>, progress: PlayerProgress, now: DateTime<Utc>) -> (Self, bool) {
        let mut repaired = false;
        for i in 0..quests.len() {
            let id = quests[i].id.trim();
            if id.is_empty() || quests[..i].iter().any(|q| q.id == id) {
                let mut fresh = new_id(quests[i].created_at.min(now));
                while quests.iter().any(|q| q.id == fresh) {
                    fresh = new_id(now);
                }
                tracing::debug!(id = %fresh, title = %quests[i].title, "assigned id to quest row");
                quests[i].id = fresh;
                repaired = true;
            }
            repaired |= quests[i].normalize();
        }
        let board = Self {
            quests,
            progress: progress.normalized(),
        };
        (board, repaired)
    }

    pub fn quests(&self) -> &[Quest] {
        &self.quests
    }

    pub fn progress(&self) -> &PlayerProgress {
        &self.progress
    }

    pub fn get(&self, id: &str) -> Option<&Quest> {
        self.quests.iter().find(|q| q.id == id)
    }

    pub fn pending(&self) -> impl Iterator<Item = &Quest> {
        self.quests.iter().filter(|q| !q.is_completed)
    }

    pub fn completed(&self) -> impl Iterator<Item = &Quest> {
        self.quests.iter().filter(|q| q.is_completed)
    }

    /// Resolve a full id or a unique id prefix (case-insensitive).
    pub fn find_by_prefix(&self, prefix: &str) -> Result<&Quest, LookupError> {
        let needle = prefix.trim().to_uppercase();
        if needle.is_empty() {
            return Err(LookupError::NotFound(prefix.to_string()));
        }
        if let Some(q) = self.quests.iter().find(|q| q.id.to_uppercase() == needle) {
            return Ok(q);
        }
        let matches: Vec<&Quest> = self
            .quests
            .iter()
            .filter(|q| q.id.to_uppercase().starts_with(&needle))
            .collect();
        match matches.as_slice() {
            [] => Err(LookupError::NotFound(prefix.to_string())),
            [one] => Ok(one),
            many => Err(LookupError::Ambiguous {
                prefix: prefix.to_string(),
                count: many.len(),
            }),
        }
    }

    pub fn summary(&self) -> BoardSummary {
        let total = self.quests.len();
        let completed = self.completed().count();
        BoardSummary {
            total,
            pending: total - completed,
            completed,
            pending_xp: self.pending().map(|q| u64::from(q.xp_reward)).sum(),
            pending_minutes: self.pending().map(|q| u64::from(q.estimated_minutes)).sum(),
            completion_rate: if total == 0 { 0.0 } else { completed as f64 / total as f64 },
        }
    }

    pub fn add_quest(&mut self, draft: QuestDraft, now: DateTime<Utc>) -> &Quest {
        let mut id = new_id(now);
        while self.get(&id).is_some() {
            id = new_id(now);
        }
        self.quests.push(Quest::new(id, draft, now));
        &self.quests[self.quests.len() - 1]
    }

    pub fn complete_quest(&mut self, id: &str, now: DateTime<Utc>, tz: Tz) -> CompletionOutcome {
        let Some(quest) = self.quests.iter_mut().find(|q| q.id == id) else {
            return CompletionOutcome::UnknownQuest;
        };
        if quest.is_completed {
            return CompletionOutcome::AlreadyCompleted;
        }

        // Compute the next record before touching anything so the update lands as one.
        let ProgressDelta {
            progress,
            xp_gained,
            levels_gained,
            unlocked,
        } = self.progress.apply_completion(quest.xp_reward, local_day(now, tz), now);

        quest.mark_completed(now);
        let quest_id = quest.id.clone();
        self.progress = progress.clone();

        CompletionOutcome::Completed {
            quest_id,
            xp_gained,
            levels_gained,
            unlocked,
            progress,
        }
    }

    /// Remove by id. Progress already earned stays.
    pub fn remove_quest(&mut self, id: &str) -> Option<Quest> {
        let idx = self.quests.iter().position(|q| q.id == id)?;
        Some(self.quests.remove(idx))
    }
}

/// A board bound to its store. Every mutating call persists before returning.
pub struct QuestEngine<S: KeyValueStore, C: Clock> {
    board: QuestBoard,
    store: S,
    clock: C,
    tz: Tz,
}

impl<S: KeyValueStore, C: Clock> QuestEngine<S, C> {
    /// Load quests and progress from `store`. Malformed documents are replaced
    /// with defaults and unreadable quest rows are skipped. Rows that had to be
    /// repaired (new id, missing reward) are written back at once so ids stay
    /// stable across loads.
    pub fn load(store: S, clock: C, tz: Tz) -> Self {
        let rows: Vec<Value> = load_json(&store, QUESTS_KEY).unwrap_or_default();
        let (quests, _dropped) = quests_from_rows(rows);
        let progress: PlayerProgress = load_json(&store, PROGRESS_KEY).unwrap_or_default();
        let (board, repaired) = QuestBoard::from_parts(quests, progress, clock.now());

        let mut engine = Self { board, store, clock, tz };
        if repaired {
            match engine.persist_quests() {
                Ok(()) => tracing::info!("wrote back repaired quest rows"),
                Err(e) => tracing::warn!(error = %e, "could not write back repaired quest rows"),
            }
        }
        engine
    }

    pub fn board(&self) -> &QuestBoard {
        &self.board
    }

    pub fn progress(&self) -> &PlayerProgress {
        self.board.progress()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    pub fn add_quest(&mut self, draft: QuestDraft) -> StoreResult<Quest> {
        let now = self.clock.now();
        let quest = self.board.add_quest(draft, now).clone();
        tracing::info!(id = %quest.id, priority = %quest.priority, xp = quest.xp_reward, "quest added");
        self.persist_quests()?;
        Ok(quest)
    }

    pub fn complete_quest(&mut self, id: &str) -> StoreResult<CompletionOutcome> {
        let now = self.clock.now();
        let outcome = self.board.complete_quest(id, now, self.tz);
        match &outcome {
            CompletionOutcome::Completed {
                quest_id,
                xp_gained,
                levels_gained,
                progress,
                ..
            } => {
                tracing::info!(
                    id = %quest_id,
                    xp = xp_gained,
                    level = progress.level,
                    levels_gained,
                    streak = progress.streak,
                    "quest completed"
                );
                self.persist()?;
            }
            CompletionOutcome::AlreadyCompleted => tracing::debug!(id, "quest already completed"),
            CompletionOutcome::UnknownQuest => tracing::debug!(id, "unknown quest id"),
        }
        Ok(outcome)
    }

    pub fn remove_quest(&mut self, id: &str) -> StoreResult<Option<Quest>> {
        let removed = self.board.remove_quest(id);
        if removed.is_some() {
            tracing::info!(id, "quest removed");
            self.persist_quests()?;
        }
        Ok(removed)
    }

    /// Write both documents.
    pub fn persist(&mut self) -> StoreResult<()> {
        self.persist_quests()?;
        save_json(&mut self.store, PROGRESS_KEY, self.board.progress())
    }

    fn persist_quests(&mut self) -> StoreResult<()> {
        save_json(&mut self.store, QUESTS_KEY, self.board.quests())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quest::Priority;
    use crate::store::MemoryStore;
    use crate::time::FixedClock;
    use crate::AchievementId;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn test_add_assigns_unique_ids() {
        let mut board = QuestBoard::new();
        let a = board.add_quest(QuestDraft::new("a"), t0()).id.clone();
        let b = board.add_quest(QuestDraft::new("b"), t0()).id.clone();
        assert_ne!(a, b);
        assert_eq!(a.len(), 26);
    }

    #[test]
    fn test_engine_stores_blank_title_as_given() {
        let mut board = QuestBoard::new();
        let q = board.add_quest(QuestDraft::new(""), t0());
        assert_eq!(q.title, "");
    }

    #[test]
    fn test_complete_unknown_and_twice() {
        let mut board = QuestBoard::new();
        let id = board.add_quest(QuestDraft::new("a"), t0()).id.clone();

        assert_eq!(board.complete_quest("nope", t0(), Tz::UTC), CompletionOutcome::UnknownQuest);
        assert!(matches!(board.complete_quest(&id, t0(), Tz::UTC), CompletionOutcome::Completed { .. }));

        let after_first = board.progress().clone();
        let later = t0() + chrono::Duration::days(1);
        assert_eq!(board.complete_quest(&id, later, Tz::UTC), CompletionOutcome::AlreadyCompleted);
        assert_eq!(board.progress(), &after_first);
        assert_eq!(board.get(&id).unwrap().completed_at, Some(t0()));
    }

    #[test]
    fn test_remove_keeps_progress() {
        let mut board = QuestBoard::new();
        let id = board
            .add_quest(QuestDraft::new("a").with_priority(Priority::Urgent), t0())
            .id
            .clone();
        board.complete_quest(&id, t0(), Tz::UTC);
        let removed = board.remove_quest(&id).unwrap();
        assert!(removed.is_completed);
        assert!(board.quests().is_empty());
        assert_eq!(board.progress().total_xp_earned, 100);
        assert_eq!(board.progress().total_completed, 1);
        assert!(board.remove_quest(&id).is_none());
    }

    #[test]
    fn test_find_by_prefix() {
        let mut board = QuestBoard::new();
        let a = board.add_quest(QuestDraft::new("a"), t0()).id.clone();
        board.add_quest(QuestDraft::new("b"), t0());

        assert_eq!(board.find_by_prefix(&a.to_lowercase()).unwrap().title, "a");
        // same timestamp means the leading time component is shared
        assert!(matches!(board.find_by_prefix(&a[..6]), Err(LookupError::Ambiguous { count: 2, .. })));
        assert!(matches!(board.find_by_prefix("ZZZZ"), Err(LookupError::NotFound(_))));
        assert!(matches!(board.find_by_prefix(""), Err(LookupError::NotFound(_))));
    }

    #[test]
    fn test_summary() {
        let mut board = QuestBoard::new();
        let id = board.add_quest(QuestDraft::new("a").with_priority(Priority::High), t0()).id.clone();
        board.add_quest(QuestDraft::new("b").with_priority(Priority::Low).with_minutes(45), t0());
        board.complete_quest(&id, t0(), Tz::UTC);

        let s = board.summary();
        assert_eq!(s.total, 2);
        assert_eq!(s.completed, 1);
        assert_eq!(s.pending, 1);
        assert_eq!(s.pending_xp, 10);
        assert_eq!(s.pending_minutes, 45);
        assert!((s.completion_rate - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_from_parts_repairs_legacy_rows() {
        let raw = r#"[{"title":"legacy","priority":"high","xp_reward":50}]"#;
        let quests: Vec<Quest> = serde_json::from_str(raw).unwrap();
        let (board, repaired) = QuestBoard::from_parts(quests, PlayerProgress::default(), t0());
        assert!(repaired);
        assert_eq!(board.quests()[0].id.len(), 26);
        assert_eq!(board.quests()[0].xp_reward, 50);

        let (again, repaired) = QuestBoard::from_parts(board.quests().to_vec(), PlayerProgress::default(), t0());
        assert!(!repaired);
        assert_eq!(again.quests(), board.quests());
    }

    #[test]
    fn test_from_parts_reassigns_duplicate_ids() {
        let raw = r#"[{"id":"A","title":"one","xp_reward":25},{"id":"A","title":"two","xp_reward":25}]"#;
        let quests: Vec<Quest> = serde_json::from_str(raw).unwrap();
        let (board, repaired) = QuestBoard::from_parts(quests, PlayerProgress::default(), t0());
        assert!(repaired);
        assert_eq!(board.quests()[0].id, "A");
        assert_ne!(board.quests()[1].id, "A");
    }

    #[test]
    fn test_load_keeps_rows_around_bad_fields() {
        let mut store = MemoryStore::new();
        store
            .set(
                QUESTS_KEY,
                r#"[{"id":"A","title":"keep me","priority":"urgent"},{"id":"B","title":"other","priority":null}]"#,
            )
            .unwrap();
        let mut engine = QuestEngine::load(store, FixedClock(t0()), Tz::UTC);
        let quests = engine.board().quests();
        assert_eq!(quests.len(), 2);
        assert_eq!(quests[0].xp_reward, 100);
        assert_eq!(quests[1].priority, Priority::Medium);
        assert_eq!(quests[1].xp_reward, 25);

        // the repaired rewards were written back
        let stored = engine.store().get(QUESTS_KEY).unwrap().unwrap();
        assert!(stored.contains("\"xp_reward\": 100"), "{stored}");

        engine.add_quest(QuestDraft::new("new")).unwrap();
        assert_eq!(engine.board().quests().len(), 3);
    }

    #[test]
    fn test_engine_persists_each_mutation() {
        let clock = FixedClock(t0());
        let mut engine = QuestEngine::load(MemoryStore::new(), clock, Tz::UTC);

        let q = engine.add_quest(QuestDraft::new("Write tests").with_priority(Priority::High)).unwrap();
        assert!(engine.store().get(QUESTS_KEY).unwrap().unwrap().contains("Write tests"));
        assert_eq!(engine.store().get(PROGRESS_KEY).unwrap(), None);

        engine.complete_quest(&q.id).unwrap();
        let stored: PlayerProgress =
            serde_json::from_str(&engine.store().get(PROGRESS_KEY).unwrap().unwrap()).unwrap();
        assert_eq!(stored.xp, 50);
        assert!(stored.has_achievement(AchievementId::FirstComplete));

        let store = engine.into_store();
        let reloaded = QuestEngine::load(store, clock, Tz::UTC);
        assert_eq!(reloaded.board().quests().len(), 1);
        assert!(reloaded.board().quests()[0].is_completed);
        assert_eq!(reloaded.progress().total_completed, 1);
    }

    #[test]
    fn test_engine_load_fails_open_on_garbage() {
        let mut store = MemoryStore::new();
        store.set(QUESTS_KEY, "{{{").unwrap();
        store.set(PROGRESS_KEY, "[1,2]").unwrap();
        let engine = QuestEngine::load(store, FixedClock(t0()), Tz::UTC);
        assert!(engine.board().quests().is_empty());
        assert_eq!(engine.progress(), &PlayerProgress::default());
    }

    #[test]
    fn test_streak_uses_configured_timezone() {
        // 23:30 and 00:30 local on consecutive Chicago days are the same UTC date.
        let tz: Tz = "America/Chicago".parse().unwrap();
        let first = Utc.with_ymd_and_hms(2026, 3, 3, 5, 30, 0).unwrap(); // Mar 2 23:30 CST
        let second = Utc.with_ymd_and_hms(2026, 3, 3, 6, 30, 0).unwrap(); // Mar 3 00:30 CST

        let mut board = QuestBoard::new();
        let a = board.add_quest(QuestDraft::new("a"), first).id.clone();
        let b = board.add_quest(QuestDraft::new("b"), first).id.clone();
        board.complete_quest(&a, first, tz);
        board.complete_quest(&b, second, tz);
        assert_eq!(board.progress().streak, 2);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn priority() -> impl Strategy<Value = Priority> {
            prop_oneof![
                Just(Priority::Low),
                Just(Priority::Medium),
                Just(Priority::High),
                Just(Priority::Urgent),
            ]
        }

        proptest! {
            #[test]
            fn total_xp_matches_completed_rewards(
                priorities in proptest::collection::vec(priority(), 1..60),
                picks in proptest::collection::vec(any::<prop::sample::Index>(), 1..120),
            ) {
                let mut board = QuestBoard::new();
                let mut now = t0();
                let ids: Vec<String> = priorities
                    .iter()
                    .map(|p| board.add_quest(QuestDraft::new("q").with_priority(*p), now).id.clone())
                    .collect();

                for pick in picks {
                    now += chrono::Duration::hours(7);
                    let id = &ids[pick.index(ids.len())];
                    let before = board.progress().clone();
                    match board.complete_quest(id, now, Tz::UTC) {
                        CompletionOutcome::AlreadyCompleted => prop_assert_eq!(board.progress(), &before),
                        CompletionOutcome::Completed { .. } => {
                            prop_assert!(board.progress().total_xp_earned > before.total_xp_earned)
                        }
                        CompletionOutcome::UnknownQuest => prop_assert!(false, "ids come from the board"),
                    }
                }

                let expected: u64 = board.completed().map(|q| u64::from(q.xp_reward)).sum();
                prop_assert_eq!(board.progress().total_xp_earned, expected);
                prop_assert_eq!(board.progress().total_completed, board.completed().count() as u64);
            }
        }
    }
}
