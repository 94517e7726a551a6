use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{ CompletionAward, CompletionReceipt, LedgerError, ProgressLedger, UserProgress };

pub struct MemoryProgressLedger {
    state: Mutex<UserProgress>,
}

impl MemoryProgressLedger {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(UserProgress::default()),
        }
    }
}

impl Default for MemoryProgressLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProgressLedger for MemoryProgressLedger {
    async fn update_skill_rating(&self, delta: i32) -> Result<u32, LedgerError> {
        Ok(self.state.lock().await.add_skill(delta))
    }

    async fn mark_scenario_completed(&self, scenario_id: &str) -> Result<(), LedgerError> {
        self.state.lock().await.mark_completed(scenario_id);
        Ok(())
    }

    async fn unlock_achievement(&self, achievement_id: &str) -> Result<bool, LedgerError> {
        Ok(self.state.lock().await.unlock(achievement_id))
    }

    async fn update_achievement_progress(
        &self,
        achievement_id: &str,
        amount: u32
    ) -> Result<bool, LedgerError> {
        Ok(self.state.lock().await.add_progress(achievement_id, amount))
    }

    async fn record_completion(
        &self,
        award: &CompletionAward
    ) -> Result<CompletionReceipt, LedgerError> {
        Ok(self.state.lock().await.apply_completion(award))
    }

    async fn snapshot(&self) -> Result<UserProgress, LedgerError> {
        Ok(self.state.lock().await.clone())
    }
}
