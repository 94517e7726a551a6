use async_trait::async_trait;
use log::{ info, warn };
use std::path::{ Path, PathBuf };
use tokio::fs;
use tokio::sync::Mutex;

use super::{ CompletionAward, CompletionReceipt, LedgerError, ProgressLedger, UserProgress };

/// JSON-backed ledger. The whole document is rewritten after every update.
pub struct FileProgressLedger {
    path: PathBuf,
    state: Mutex<UserProgress>,
}

impl FileProgressLedger {
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self, LedgerError> {
        let path = path.as_ref().to_path_buf();
        let state = match fs::read_to_string(&path).await {
            Ok(text) => {
                let progress: UserProgress = serde_json::from_str(&text)?;
                info!(
                    "Loaded progress from {} (skill rating {})",
                    path.display(),
                    progress.skill_rating
                );
                progress
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("No progress file at {}, starting fresh", path.display());
                UserProgress::default()
            }
            Err(e) => {
                return Err(e.into());
            }
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    async fn update<T, F>(&self, apply: F) -> Result<T, LedgerError>
        where F: FnOnce(&mut UserProgress) -> T + Send
    {
        let mut guard = self.state.lock().await;
        let mut next = guard.clone();
        let result = apply(&mut next);
        // memory only moves forward once the file has been written
        self.persist(&next).await?;
        *guard = next;
        Ok(result)
    }

    async fn persist(&self, progress: &UserProgress) -> Result<(), LedgerError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        let json = serde_json::to_string_pretty(progress)?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, json).await?;
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl ProgressLedger for FileProgressLedger {
    async fn update_skill_rating(&self, delta: i32) -> Result<u32, LedgerError> {
        self.update(|p| p.add_skill(delta)).await
    }

    async fn mark_scenario_completed(&self, scenario_id: &str) -> Result<(), LedgerError> {
        self.update(|p| p.mark_completed(scenario_id)).await
    }

    async fn unlock_achievement(&self, achievement_id: &str) -> Result<bool, LedgerError> {
        self.update(|p| p.unlock(achievement_id)).await
    }

    async fn update_achievement_progress(
        &self,
        achievement_id: &str,
        amount: u32
    ) -> Result<bool, LedgerError> {
        self.update(|p| p.add_progress(achievement_id, amount)).await
    }

    async fn record_completion(
        &self,
        award: &CompletionAward
    ) -> Result<CompletionReceipt, LedgerError> {
        self.update(|p| p.apply_completion(award)).await
    }

    async fn snapshot(&self) -> Result<UserProgress, LedgerError> {
        Ok(self.state.lock().await.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::{ EMPATHY_MASTER, FIRST_SESSION };

    #[tokio::test]
    async fn progress_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("progress.json");

        {
            let ledger = FileProgressLedger::open(&path).await.unwrap();
            ledger.update_skill_rating(150).await.unwrap();
            ledger.mark_scenario_completed("depression").await.unwrap();
            ledger.unlock_achievement(FIRST_SESSION).await.unwrap();
            ledger.update_achievement_progress(EMPATHY_MASTER, 2).await.unwrap();
        }

        let reopened = FileProgressLedger::open(&path).await.unwrap();
        let progress = reopened.snapshot().await.unwrap();
        assert_eq!(progress.skill_rating, 150);
        assert!(progress.completed_scenarios.contains("depression"));
        assert!(progress.is_unlocked(FIRST_SESSION));
        assert_eq!(progress.achievements[EMPATHY_MASTER].progress, 2);
    }

    #[tokio::test]
    async fn failed_write_leaves_progress_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        let path = blocker.join("progress.json");

        let ledger = FileProgressLedger::open(&path).await.unwrap();
        std::fs::write(&blocker, "in the way").unwrap();

        let err = ledger.update_skill_rating(400).await.unwrap_err();
        assert!(matches!(err, LedgerError::Io(_)));
        assert_eq!(ledger.snapshot().await.unwrap().skill_rating, 0);

        std::fs::remove_file(&blocker).unwrap();
        assert_eq!(ledger.update_skill_rating(400).await.unwrap(), 400);

        let reopened = FileProgressLedger::open(&path).await.unwrap();
        assert_eq!(reopened.snapshot().await.unwrap().skill_rating, 400);
    }

    #[tokio::test]
    async fn corrupt_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress.json");
        std::fs::write(&path, "not json").unwrap();

        let err = FileProgressLedger::open(&path).await.err().unwrap();
        assert!(matches!(err, LedgerError::Json(_)));
    }
}
