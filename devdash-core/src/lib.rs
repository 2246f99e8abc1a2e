//! devdash-core: quest engine, player progress and the response cache behind the dashboard

pub mod achievements;
pub mod cache;
pub mod engine;
pub mod error;
pub mod progress;
pub mod quest;
pub mod requests;
pub mod store;
pub mod time;
pub mod toolkit;

pub use achievements::{Achievement, AchievementId, AchievementStats, newly_unlocked};
pub use cache::{
    CacheDomain, CacheEntry, CacheKey, CachePolicy, Cached, Freshness, Lookup, ResponseCache,
};
pub use engine::{BoardSummary, CompletionOutcome, LookupError, QuestBoard, QuestEngine};
pub use error::FetchError;
pub use progress::{MAX_LEVEL, PlayerProgress, ProgressDelta, XP_PER_LEVEL, xp_threshold};
pub use quest::{Priority, Quest, QuestDraft};
pub use requests::{RequestId, RequestTracker};
pub use store::{FileStore, KeyValueStore, MemoryStore, StoreError, StoreResult};
pub use time::{Clock, FixedClock, SystemClock, local_day, parse_timezone};
pub use toolkit::{Toolkit, ToolkitDraft, ToolkitItem, ToolkitKind};
