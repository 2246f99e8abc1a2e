//! Player progress: XP, levels, streaks and unlocked achievements.
//!
//! All transitions are pure: `apply_completion` takes the current record and
//! returns the next one, so a completion commits as a single value.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::achievements::{Achievement, AchievementStats, newly_unlocked};

pub const MAX_LEVEL: u32 = 100;
pub const XP_PER_LEVEL: u32 = 100;

/// XP needed to clear `level`.
pub fn xp_threshold(level: u32) -> u32 {
    level * XP_PER_LEVEL
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerProgress {
    pub level: u32,
    /// XP inside the current level, always below `xp_to_next_level`.
    pub xp: u32,
    pub xp_to_next_level: u32,
    pub total_completed: u64,
    pub total_xp_earned: u64,
    pub streak: u32,
    pub longest_streak: u32,
    pub last_completed_date: Option<NaiveDate>,
    pub achievements: Vec<Achievement>,
}

impl Default for PlayerProgress {
    fn default() -> Self {
        Self {
            level: 1,
            xp: 0,
            xp_to_next_level: xp_threshold(1),
            total_completed: 0,
            total_xp_earned: 0,
            streak: 0,
            longest_streak: 0,
            last_completed_date: None,
            achievements: Vec::new(),
        }
    }
}

/// What one completion changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressDelta {
    pub progress: PlayerProgress,
    pub xp_gained: u32,
    pub levels_gained: u32,
    pub unlocked: Vec<Achievement>,
}

impl PlayerProgress {
    pub fn stats(&self) -> AchievementStats {
        AchievementStats {
            level: self.level,
            streak: self.streak,
            total_completed: self.total_completed,
            total_xp_earned: self.total_xp_earned,
        }
    }

    /// Fraction of the current level bar that is filled, 0.0..1.0.
    pub fn level_fraction(&self) -> f64 {
        if self.xp_to_next_level == 0 {
            return 0.0;
        }
        f64::from(self.xp) / f64::from(self.xp_to_next_level)
    }

    pub fn has_achievement(&self, id: crate::AchievementId) -> bool {
        self.achievements.iter().any(|a| a.id == id)
    }

    /// Compute the record after completing a quest worth `xp_gained` on `today`.
    pub fn apply_completion(&self, xp_gained: u32, today: NaiveDate, now: DateTime<Utc>) -> ProgressDelta {
        let mut next = self.clone();

        // The remainder wraps against the final threshold.
        let mut new_xp = u64::from(self.xp) + u64::from(xp_gained);
        next.total_xp_earned = self.total_xp_earned + u64::from(xp_gained);
        while new_xp >= u64::from(next.xp_to_next_level) && next.level < MAX_LEVEL {
            next.level += 1;
            next.xp_to_next_level = xp_threshold(next.level);
        }
        new_xp %= u64::from(next.xp_to_next_level);
        next.xp = new_xp as u32;

        // streak counts calendar days, not 24h windows
        next.streak = next_streak(self.streak, self.last_completed_date, today);
        next.longest_streak = self.longest_streak.max(next.streak);
        next.last_completed_date = Some(today);

        next.total_completed = self.total_completed + 1;

        // rules see the proposed stats
        let unlocked = newly_unlocked(&next.stats(), &self.achievements, now);
        next.achievements.extend(unlocked.iter().cloned());

        ProgressDelta {
            levels_gained: next.level - self.level,
            progress: next,
            xp_gained,
            unlocked,
        }
    }

    /// Restore the level/streak invariants on a record read from disk.
    pub fn normalized(mut self) -> Self {
        self.level = self.level.clamp(1, MAX_LEVEL);
        self.xp_to_next_level = xp_threshold(self.level);
        self.xp %= self.xp_to_next_level;
        self.longest_streak = self.longest_streak.max(self.streak);

        let mut seen = Vec::with_capacity(self.achievements.len());
        self.achievements.retain(|a| {
            if seen.contains(&a.id) {
                false
            } else {
                seen.push(a.id);
                true
            }
        });
        self
    }
}

fn next_streak(current: u32, last: Option<NaiveDate>, today: NaiveDate) -> u32 {
    match last {
        Some(day) if day == today => current,
        Some(day) if day.succ_opt() == Some(today) => current + 1,
        _ => 1,
    }
}
