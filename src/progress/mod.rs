mod file;
mod memory;

use async_trait::async_trait;
use log::info;
use serde::{ Deserialize, Serialize };
use std::collections::{ BTreeMap, BTreeSet };
use std::sync::Arc;
use thiserror::Error;

use crate::cli::Args;

pub use file::FileProgressLedger;
pub use memory::MemoryProgressLedger;

pub const BOSS_PATIENT: &str = "boss-patient";
pub const EMPATHY_MASTER: &str = "empathy-master";
pub const FIRST_SESSION: &str = "first-session";

const SKILL_PER_LEVEL: u32 = 1000;

fn achievement_target(id: &str) -> u32 {
    match id {
        EMPATHY_MASTER => 5,
        _ => 1,
    }
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Progress file IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Progress file JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Unsupported progress store type: {0}")]
    UnsupportedType(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Achievement {
    pub progress: u32,
    pub target: u32,
    pub unlocked: bool,
}

impl Achievement {
    fn for_id(id: &str) -> Self {
        Self {
            progress: 0,
            target: achievement_target(id),
            unlocked: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProgress {
    pub skill_rating: u32,
    pub completed_scenarios: BTreeSet<String>,
    pub achievements: BTreeMap<String, Achievement>,
}

impl Default for UserProgress {
    fn default() -> Self {
        let achievements = [BOSS_PATIENT, EMPATHY_MASTER, FIRST_SESSION]
            .into_iter()
            .map(|id| (id.to_string(), Achievement::for_id(id)))
            .collect();
        Self {
            skill_rating: 0,
            completed_scenarios: BTreeSet::new(),
            achievements,
        }
    }
}

impl UserProgress {
    pub fn level(&self) -> u32 {
        self.skill_rating / SKILL_PER_LEVEL + 1
    }

    pub fn is_unlocked(&self, achievement_id: &str) -> bool {
        self.achievements.get(achievement_id).map_or(false, |a| a.unlocked)
    }

    fn add_skill(&mut self, delta: i32) -> u32 {
        self.skill_rating = self.skill_rating.saturating_add_signed(delta);
        self.skill_rating
    }

    fn mark_completed(&mut self, scenario_id: &str) {
        self.completed_scenarios.insert(scenario_id.to_string());
    }

    /// Returns true only when this call flipped the achievement to unlocked.
    fn unlock(&mut self, achievement_id: &str) -> bool {
        let entry = self.achievements
            .entry(achievement_id.to_string())
            .or_insert_with(|| Achievement::for_id(achievement_id));
        if entry.unlocked {
            return false;
        }
        entry.progress = entry.target;
        entry.unlocked = true;
        true
    }

    fn add_progress(&mut self, achievement_id: &str, amount: u32) -> bool {
        let entry = self.achievements
            .entry(achievement_id.to_string())
            .or_insert_with(|| Achievement::for_id(achievement_id));
        if entry.unlocked {
            return false;
        }
        entry.progress = entry.progress.saturating_add(amount).min(entry.target);
        if entry.progress >= entry.target {
            entry.unlocked = true;
            return true;
        }
        false
    }
}

/// Everything one completed session credits to the ledger.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompletionAward {
    pub scenario_id: String,
    pub skill_reward: u32,
    pub boss: bool,
    pub high_empathy: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompletionReceipt {
    pub skill_rating: u32,
    pub unlocked: Vec<String>,
}

impl UserProgress {
    fn apply_completion(&mut self, award: &CompletionAward) -> CompletionReceipt {
        let delta = i32::try_from(award.skill_reward).unwrap_or(i32::MAX);
        let skill_rating = self.add_skill(delta);
        self.mark_completed(&award.scenario_id);

        let mut unlocked = Vec::new();
        if self.unlock(FIRST_SESSION) {
            unlocked.push(FIRST_SESSION.to_string());
        }
        if award.boss && self.unlock(BOSS_PATIENT) {
            unlocked.push(BOSS_PATIENT.to_string());
        }
        if award.high_empathy && self.add_progress(EMPATHY_MASTER, 1) {
            unlocked.push(EMPATHY_MASTER.to_string());
        }
        CompletionReceipt { skill_rating, unlocked }
    }
}

/// Cumulative skill rating and achievements for the trainee.
#[async_trait]
pub trait ProgressLedger: Send + Sync {
    async fn update_skill_rating(&self, delta: i32) -> Result<u32, LedgerError>;

    async fn mark_scenario_completed(&self, scenario_id: &str) -> Result<(), LedgerError>;

    async fn unlock_achievement(&self, achievement_id: &str) -> Result<bool, LedgerError>;

    async fn update_achievement_progress(
        &self,
        achievement_id: &str,
        amount: u32
    ) -> Result<bool, LedgerError>;

    /// Applies a whole completion or nothing at all.
    async fn record_completion(
        &self,
        award: &CompletionAward
    ) -> Result<CompletionReceipt, LedgerError>;

    async fn snapshot(&self) -> Result<UserProgress, LedgerError>;
}

pub async fn create_progress_ledger(
    args: &Args
) -> Result<Arc<dyn ProgressLedger>, LedgerError> {
    match args.progress_type.to_lowercase().as_str() {
        "memory" => {
            info!("Progress will be kept in memory for this process only");
            Ok(Arc::new(MemoryProgressLedger::new()))
        }
        "file" => {
            info!("Progress will be stored in: {}", args.progress_path);
            let ledger = FileProgressLedger::open(&args.progress_path).await?;
            Ok(Arc::new(ledger))
        }
        other => Err(LedgerError::UnsupportedType(other.to_string())),
    }
}
