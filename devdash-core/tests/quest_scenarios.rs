use chrono::{DateTime, Duration, TimeZone, Utc};
use chrono_tz::Tz;
use devdash_core::{
    AchievementId, CompletionOutcome, FileStore, FixedClock, KeyValueStore, MemoryStore,
    PlayerProgress, Priority, QuestDraft, QuestEngine,
    engine::{PROGRESS_KEY, QUESTS_KEY},
    store::save_json,
};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 6, 1, 10, 0, 0).unwrap()
}

/// High-priority quest completed from empty stats.
#[test]
fn test_first_high_priority_completion() {
    let mut engine = QuestEngine::load(MemoryStore::new(), FixedClock(t0()), Tz::UTC);

    let quest = engine
        .add_quest(QuestDraft::new("Write tests").with_priority(Priority::High))
        .unwrap();
    assert_eq!(quest.xp_reward, 50);

    let outcome = engine.complete_quest(&quest.id).unwrap();
    let CompletionOutcome::Completed { xp_gained, levels_gained, unlocked, progress, .. } = outcome else {
        panic!("expected a completion, got {outcome:?}");
    };
    assert_eq!(xp_gained, 50);
    assert_eq!(levels_gained, 0);
    assert_eq!(progress.level, 1);
    assert_eq!(progress.xp, 50);
    assert_eq!(progress.total_completed, 1);
    assert_eq!(progress.streak, 1);
    let ids: Vec<_> = progress.achievements.iter().map(|a| a.id).collect();
    assert_eq!(ids, vec![AchievementId::FirstComplete]);
    assert_eq!(unlocked.len(), 1);
}

/// Level 1 at 90 XP plus a 25 XP quest lands on level 2 with 115 XP.
#[test]
fn test_level_up_from_ninety() {
    let mut store = MemoryStore::new();
    let seeded = PlayerProgress { xp: 90, ..PlayerProgress::default() };
    save_json(&mut store, PROGRESS_KEY, &seeded).unwrap();

    let mut engine = QuestEngine::load(store, FixedClock(t0()), Tz::UTC);
    let quest = engine.add_quest(QuestDraft::new("Review PR")).unwrap();
    engine.complete_quest(&quest.id).unwrap();

    let p = engine.progress();
    assert_eq!(p.level, 2);
    assert_eq!(p.xp, 115);
    assert_eq!(p.xp_to_next_level, 200);
}

#[test]
fn test_streak_resets_after_two_day_gap() {
    let mut clock = FixedClock(t0());
    let mut engine = QuestEngine::load(MemoryStore::new(), &clock, Tz::UTC);
    let mut ids = Vec::new();
    for i in 0..5 {
        ids.push(engine.add_quest(QuestDraft::new(format!("q{i}"))).unwrap().id);
    }
    for id in &ids[..3] {
        engine.complete_quest(id).unwrap();
    }
    let store = engine.into_store();

    // three consecutive days
    let mut streak = 1;
    let mut engine = QuestEngine::load(store, &clock, Tz::UTC);
    assert_eq!(engine.progress().streak, streak);
    for id in &ids[3..] {
        let store = engine.into_store();
        clock.advance(Duration::days(1));
        engine = QuestEngine::load(store, &clock, Tz::UTC);
        engine.complete_quest(id).unwrap();
        streak += 1;
        assert_eq!(engine.progress().streak, streak);
    }
    assert_eq!(engine.progress().longest_streak, 3);

    // skip a day
    let extra = engine.add_quest(QuestDraft::new("after break")).unwrap();
    let store = engine.into_store();
    clock.advance(Duration::days(2));
    let mut engine = QuestEngine::load(store, &clock, Tz::UTC);
    engine.complete_quest(&extra.id).unwrap();
    assert_eq!(engine.progress().streak, 1);
    assert_eq!(engine.progress().longest_streak, 3);
}

#[test]
fn test_state_survives_reload_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let clock = FixedClock(t0());

    let quest_id = {
        let store = FileStore::open(dir.path()).unwrap();
        let mut engine = QuestEngine::load(store, clock, Tz::UTC);
        let keep = engine.add_quest(QuestDraft::new("keep").with_priority(Priority::Urgent)).unwrap();
        let gone = engine.add_quest(QuestDraft::new("gone").with_priority(Priority::Low)).unwrap();
        engine.complete_quest(&keep.id).unwrap();
        engine.complete_quest(&gone.id).unwrap();
        engine.remove_quest(&gone.id).unwrap();
        keep.id
    };

    let store = FileStore::open(dir.path()).unwrap();
    let engine = QuestEngine::load(store, clock, Tz::UTC);
    assert_eq!(engine.board().quests().len(), 1);
    assert_eq!(engine.board().quests()[0].id, quest_id);
    // removing a completed quest never takes XP back
    assert_eq!(engine.progress().total_xp_earned, 110);
    assert_eq!(engine.progress().total_completed, 2);
    assert_eq!(engine.progress().level, 2);
}

#[test]
fn test_repeat_completion_is_idempotent_across_reloads() {
    let dir = tempfile::tempdir().unwrap();
    let mut clock = FixedClock(t0());

    let store = FileStore::open(dir.path()).unwrap();
    let mut engine = QuestEngine::load(store, &clock, Tz::UTC);
    let q = engine.add_quest(QuestDraft::new("once")).unwrap();
    engine.complete_quest(&q.id).unwrap();
    let after_first = engine.progress().clone();
    drop(engine);

    clock.advance(Duration::days(1));
    let store = FileStore::open(dir.path()).unwrap();
    let mut engine = QuestEngine::load(store, &clock, Tz::UTC);
    assert_eq!(engine.complete_quest(&q.id).unwrap(), CompletionOutcome::AlreadyCompleted);
    assert_eq!(engine.progress(), &after_first);
}

#[test]
fn test_fifty_completions_unlock_milestones() {
    let mut engine = QuestEngine::load(MemoryStore::new(), FixedClock(t0()), Tz::UTC);
    for i in 0..50 {
        let q = engine
            .add_quest(QuestDraft::new(format!("grind {i}")).with_priority(Priority::Urgent))
            .unwrap();
        engine.complete_quest(&q.id).unwrap();
    }
    let p = engine.progress();
    assert_eq!(p.total_xp_earned, 5000);
    for id in [
        AchievementId::FirstComplete,
        AchievementId::Level5,
        AchievementId::Complete50,
        AchievementId::Xp1000,
    ] {
        assert!(p.has_achievement(id), "missing {}", id.as_str());
    }
    assert!(!p.has_achievement(AchievementId::Complete100));
    assert!(!p.has_achievement(AchievementId::Streak7));
}

/// A row saved without an id keeps the id it is given on first load, so an id
/// printed by one command still resolves in the next.
#[test]
fn test_legacy_row_id_is_stable_across_loads() {
    let dir = tempfile::tempdir().unwrap();
    let clock = FixedClock(t0());
    let mut store = FileStore::open(dir.path()).unwrap();
    store
        .set(
            QUESTS_KEY,
            r#"[{"title":"legacy","priority":"high","created_at":"2026-05-30T08:00:00Z"}]"#,
        )
        .unwrap();

    let listed = {
        let engine = QuestEngine::load(FileStore::open(dir.path()).unwrap(), clock, Tz::UTC);
        let q = &engine.board().quests()[0];
        assert_eq!(q.xp_reward, 50);
        q.id.clone()
    };

    let mut engine = QuestEngine::load(FileStore::open(dir.path()).unwrap(), clock, Tz::UTC);
    assert_eq!(engine.board().quests()[0].id, listed);
    let outcome = engine.complete_quest(&listed).unwrap();
    assert!(matches!(outcome, CompletionOutcome::Completed { xp_gained: 50, .. }), "{outcome:?}");
}

#[test]
fn test_null_priority_row_does_not_erase_the_list() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = FileStore::open(dir.path()).unwrap();
    store
        .set(
            QUESTS_KEY,
            r#"[{"id":"A","title":"keep me","priority":"urgent"},{"id":"B","title":"other","priority":null}]"#,
        )
        .unwrap();

    let mut engine = QuestEngine::load(store, FixedClock(t0()), Tz::UTC);
    engine.add_quest(QuestDraft::new("fresh")).unwrap();
    drop(engine);

    let engine = QuestEngine::load(FileStore::open(dir.path()).unwrap(), FixedClock(t0()), Tz::UTC);
    let titles: Vec<&str> = engine.board().quests().iter().map(|q| q.title.as_str()).collect();
    assert_eq!(titles, vec!["keep me", "other", "fresh"]);
    assert_eq!(engine.board().get("A").unwrap().xp_reward, 100);
}
