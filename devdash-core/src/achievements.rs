//! Achievement table and unlock check.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AchievementId {
    #[serde(rename = "first_complete")]
    FirstComplete,
    #[serde(rename = "level_5")]
    Level5,
    #[serde(rename = "level_10")]
    Level10,
    #[serde(rename = "streak_7")]
    Streak7,
    #[serde(rename = "streak_30")]
    Streak30,
    #[serde(rename = "complete_50")]
    Complete50,
    #[serde(rename = "complete_100")]
    Complete100,
    #[serde(rename = "xp_1000")]
    Xp1000,
}

impl AchievementId {
    pub const ALL: [AchievementId; 8] = [
        AchievementId::FirstComplete,
        AchievementId::Level5,
        AchievementId::Level10,
        AchievementId::Streak7,
        AchievementId::Streak30,
        AchievementId::Complete50,
        AchievementId::Complete100,
        AchievementId::Xp1000,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AchievementId::FirstComplete => "first_complete",
            AchievementId::Level5 => "level_5",
            AchievementId::Level10 => "level_10",
            AchievementId::Streak7 => "streak_7",
            AchievementId::Streak30 => "streak_30",
            AchievementId::Complete50 => "complete_50",
            AchievementId::Complete100 => "complete_100",
            AchievementId::Xp1000 => "xp_1000",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            AchievementId::FirstComplete => "First Blood",
            AchievementId::Level5 => "Apprentice",
            AchievementId::Level10 => "Journeyman",
            AchievementId::Streak7 => "Week Warrior",
            AchievementId::Streak30 => "Unstoppable",
            AchievementId::Complete50 => "Half Century",
            AchievementId::Complete100 => "Centurion",
            AchievementId::Xp1000 => "XP Hoarder",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            AchievementId::FirstComplete => "Complete your first quest",
            AchievementId::Level5 => "Reach level 5",
            AchievementId::Level10 => "Reach level 10",
            AchievementId::Streak7 => "Keep a 7-day streak",
            AchievementId::Streak30 => "Keep a 30-day streak",
            AchievementId::Complete50 => "Complete 50 quests",
            AchievementId::Complete100 => "Complete 100 quests",
            AchievementId::Xp1000 => "Earn 1000 XP in total",
        }
    }

    /// Whether `stats` satisfies this achievement's threshold.
    pub fn is_met(self, stats: &AchievementStats) -> bool {
        match self {
            AchievementId::FirstComplete => stats.total_completed == 1,
            AchievementId::Level5 => stats.level >= 5,
            AchievementId::Level10 => stats.level >= 10,
            AchievementId::Streak7 => stats.streak >= 7,
            AchievementId::Streak30 => stats.streak >= 30,
            AchievementId::Complete50 => stats.total_completed >= 50,
            AchievementId::Complete100 => stats.total_completed >= 100,
            AchievementId::Xp1000 => stats.total_xp_earned >= 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Achievement {
    pub id: AchievementId,
    pub unlocked_at: DateTime<Utc>,
}

/// The subset of player stats the rules look at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AchievementStats {
    pub level: u32,
    pub streak: u32,
    pub total_completed: u64,
    pub total_xp_earned: u64,
}

/// Achievements whose condition holds for `stats` and that are not in `unlocked` yet.
pub fn newly_unlocked(
    stats: &AchievementStats,
    unlocked: &[Achievement],
    now: DateTime<Utc>,
) -> Vec<Achievement> {
    AchievementId::ALL
        .iter()
        .copied()
        .filter(|id| id.is_met(stats))
        .filter(|id| !unlocked.iter().any(|a| a.id == *id))
        .map(|id| Achievement { id, unlocked_at: now })
        .collect()
}
