use anyhow::{Result, bail};
use chrono_tz::Tz;
use clap::Subcommand;
use devdash_core::{
    AchievementId, CompletionOutcome, FileStore, PlayerProgress, Priority, Quest, QuestDraft,
    QuestEngine, SystemClock,
};

use crate::config::load_config;
use crate::state::open_store;

#[derive(Subcommand, Debug)]
pub enum QuestCommand {
    /// Add a quest
    Add {
        /// Quest title (words are joined with spaces)
        #[arg(required = true, num_args = 1..)]
        title: Vec<String>,

        /// low | medium | high | urgent
        #[arg(long, short, default_value = "medium")]
        priority: Priority,

        #[arg(long, short)]
        category: Option<String>,

        /// Estimated minutes (default: 30)
        #[arg(long, short)]
        minutes: Option<u32>,
    },

    /// Complete a quest by id or unique id prefix
    Done { id: String },

    /// Remove a quest. XP already earned is kept.
    Rm { id: String },

    /// List pending quests
    List {
        /// Include completed quests
        #[arg(long, default_value_t = false)]
        all: bool,
    },
}

pub fn run(cmd: QuestCommand) -> Result<()> {
    match cmd {
        QuestCommand::Add {
            title,
            priority,
            category,
            minutes,
        } => add(&title, priority, category, minutes),
        QuestCommand::Done { id } => done(&id),
        QuestCommand::Rm { id } => remove(&id),
        QuestCommand::List { all } => list(all),
    }
}

fn open_engine() -> Result<(QuestEngine<FileStore, SystemClock>, Tz)> {
    let tz = load_config()?.timezone()?;
    Ok((QuestEngine::load(open_store()?, SystemClock, tz), tz))
}

/// Join the title words and reject blank titles.
pub fn quest_title(words: &[String]) -> Result<String> {
    let title = words.join(" ").trim().to_string();
    if title.is_empty() {
        bail!("quest title must not be blank");
    }
    Ok(title)
}

fn add(words: &[String], priority: Priority, category: Option<String>, minutes: Option<u32>) -> Result<()> {
    let mut draft = QuestDraft::new(quest_title(words)?).with_priority(priority);
    if let Some(c) = category {
        draft = draft.with_category(c);
    }
    if let Some(m) = minutes {
        draft = draft.with_minutes(m);
    }

    let (mut engine, _) = open_engine()?;
    let quest = engine.add_quest(draft)?;
    println!("Added {}", quest_line(&quest));
    Ok(())
}

fn done(prefix: &str) -> Result<()> {
    let (mut engine, _) = open_engine()?;
    let quest = engine.board().find_by_prefix(prefix)?.clone();

    match engine.complete_quest(&quest.id)? {
        CompletionOutcome::Completed {
            xp_gained,
            levels_gained,
            unlocked,
            progress,
            ..
        } => {
            println!("Completed \"{}\" (+{xp_gained} XP)", quest.title);
            if levels_gained > 0 {
                println!("Level up! You are now level {}.", progress.level);
            }
            for a in &unlocked {
                println!("Achievement unlocked: {} ({})", a.id.title(), a.id.description());
            }
            println!("{}", level_bar(&progress, 20));
            if progress.streak > 1 {
                println!("Streak: {} days", progress.streak);
            }
        }
        CompletionOutcome::AlreadyCompleted => {
            println!("\"{}\" is already completed.", quest.title);
        }
        CompletionOutcome::UnknownQuest => bail!("no quest with id {}", quest.id),
    }
    Ok(())
}

fn remove(prefix: &str) -> Result<()> {
    let (mut engine, _) = open_engine()?;
    let id = engine.board().find_by_prefix(prefix)?.id.clone();
    match engine.remove_quest(&id)? {
        Some(q) => println!("Removed \"{}\"", q.title),
        None => bail!("no quest with id {id}"),
    }
    Ok(())
}

fn list(all: bool) -> Result<()> {
    let (engine, _) = open_engine()?;
    let board = engine.board();

    let mut pending: Vec<&Quest> = board.pending().collect();
    pending.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.created_at.cmp(&b.created_at)));

    if pending.is_empty() {
        println!("No pending quests. Add one with `devdash quest add <title>`.");
    }
    for q in &pending {
        println!("{}", quest_line(q));
    }
    if all {
        let done: Vec<&Quest> = board.completed().collect();
        if !done.is_empty() {
            println!();
        }
        for q in done {
            println!("{}", quest_line(q));
        }
    }
    Ok(())
}

pub fn quest_line(q: &Quest) -> String {
    let mark = if q.is_completed { "x" } else { " " };
    format!(
        "[{mark}] {} [{}] {} ({}, {}m, +{} XP)",
        q.id, q.priority, q.title, q.category, q.estimated_minutes, q.xp_reward
    )
}

/// `Level 3 [#####---------------] 120/300 XP`
pub fn level_bar(p: &PlayerProgress, width: usize) -> String {
    let filled = ((p.level_fraction() * width as f64).floor() as usize).min(width);
    format!(
        "Level {} [{}{}] {}/{} XP",
        p.level,
        "#".repeat(filled),
        "-".repeat(width - filled),
        p.xp,
        p.xp_to_next_level
    )
}

pub fn stats() -> Result<()> {
    let (engine, _) = open_engine()?;
    let p = engine.progress();
    let s = engine.board().summary();

    println!("{}", level_bar(p, 20));
    println!(
        "Total XP earned: {}   Quests completed: {}",
        p.total_xp_earned, p.total_completed
    );
    println!("Streak: {} day(s) (best {})", p.streak, p.longest_streak);
    println!(
        "Board: {} pending (~{} min, {} XP available), {} completed, {:.0}% done",
        s.pending,
        s.pending_minutes,
        s.pending_xp,
        s.completed,
        s.completion_rate * 100.0
    );
    println!("Achievements: {}/{}", p.achievements.len(), AchievementId::ALL.len());
    Ok(())
}

pub fn achievements() -> Result<()> {
    let (engine, tz) = open_engine()?;
    for line in achievement_lines(engine.progress(), tz) {
        println!("{line}");
    }
    Ok(())
}

pub fn achievement_lines(p: &PlayerProgress, tz: Tz) -> Vec<String> {
    AchievementId::ALL
        .iter()
        .map(|id| match p.achievements.iter().find(|a| a.id == *id) {
            Some(a) => format!(
                "[x] {} - {} (unlocked {})",
                id.title(),
                id.description(),
                a.unlocked_at.with_timezone(&tz).format("%Y-%m-%d")
            ),
            None => format!("[ ] {} - {}", id.title(), id.description()),
        })
        .collect()
}
