//! Task progress, user stats and their persistence.
//!
//! The whole record is stored as one JSON blob under [`PROGRESS_KEY`] and is
//! rewritten every time a task is completed. Loading replaces in-memory
//! state wholesale; a missing or unreadable blob means the built-in sample
//! data.

use crate::notify::Notifications;
use crate::storage::{StorageError, StoragePort};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

pub const PROGRESS_KEY: &str = "solanaRewardsProgress";

const STARTED_PROGRESS: u8 = 10;
const COMPLETED_PROGRESS: u8 = 100;
const STARTING_THRESHOLD: u32 = 100;

#[derive(Debug, Error)]
pub enum ProgressError {
    #[error("Please connect your wallet first")]
    NotConnected,

    #[error("Unknown task '{0}'")]
    UnknownTask(String),

    #[error("Task '{0}' has not been started")]
    NotStarted(String),

    #[error("Another task completion is in progress")]
    Busy,

    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn experience(&self) -> u32 {
        match self {
            Difficulty::Easy => 10,
            Difficulty::Medium => 25,
            Difficulty::Hard => 50,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    NotStarted,
    InProgress,
    Completed,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub title: String,
    pub description: String,
    pub reward: f64,
    pub difficulty: Difficulty,
    pub category: String,
    pub time_estimate: String,
    pub completed: bool,
    pub progress: u8,
    pub requirements: Vec<String>,
}

impl Task {
    pub fn state(&self) -> TaskState {
        if self.completed {
            TaskState::Completed
        } else if self.progress == 0 {
            TaskState::NotStarted
        } else {
            TaskState::InProgress
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub total_earned: f64,
    pub tasks_completed: u32,
    pub current_streak: u32,
    pub level: u32,
    pub experience: u32,
    pub next_level_exp: u32,
}

impl Default for UserStats {
    fn default() -> Self {
        Self {
            total_earned: 0.0,
            tasks_completed: 0,
            current_streak: 0,
            level: 1,
            experience: 0,
            next_level_exp: STARTING_THRESHOLD,
        }
    }
}

impl UserStats {
    /// Add experience, levelling up once per threshold crossed.
    /// Each level-up grows the threshold by half. Returns the levels gained.
    pub fn gain_experience(&mut self, amount: u32) -> u32 {
        self.experience = self.experience.saturating_add(amount);
        let mut levels = 0;
        while self.next_level_exp > 0 && self.experience >= self.next_level_exp {
            self.experience -= self.next_level_exp;
            self.level = self.level.saturating_add(1);
            self.next_level_exp = self.next_level_exp.saturating_add(self.next_level_exp / 2);
            levels += 1;
        }
        levels
    }

    /// Reject stats that levelling could never have produced.
    fn check(&self) -> Result<(), String> {
        if self.level == 0 {
            return Err("level must be at least 1".to_string());
        }
        if self.next_level_exp < STARTING_THRESHOLD {
            return Err(format!("level threshold {} is too low", self.next_level_exp));
        }
        if self.experience >= self.next_level_exp {
            return Err("experience is past the level threshold".to_string());
        }
        if !self.total_earned.is_finite() || self.total_earned < 0.0 {
            return Err(format!("total earned {} is not a valid amount", self.total_earned));
        }
        Ok(())
    }
}

/// The persisted blob.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct UserProgress {
    pub tasks: Vec<Task>,
    pub stats: UserStats,
    /// Milliseconds since the epoch at save time.
    pub timestamp: i64,
}

impl UserProgress {
    fn check(&self) -> Result<(), String> {
        self.stats.check()?;
        match self.tasks.iter().find(|t| t.progress > COMPLETED_PROGRESS) {
            Some(t) => Err(format!("task '{}' has progress {}", t.id, t.progress)),
            None => Ok(()),
        }
    }
}

impl Default for UserProgress {
    fn default() -> Self {
        Self {
            tasks: sample_tasks(),
            stats: UserStats::default(),
            timestamp: 0,
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn task(
    id: &str,
    title: &str,
    description: &str,
    reward: f64,
    difficulty: Difficulty,
    category: &str,
    time_estimate: &str,
    requirements: &[&str],
) -> Task {
    Task {
        id: id.to_string(),
        title: title.to_string(),
        description: description.to_string(),
        reward,
        difficulty,
        category: category.to_string(),
        time_estimate: time_estimate.to_string(),
        completed: false,
        progress: 0,
        requirements: requirements.iter().map(|r| r.to_string()).collect(),
    }
}

/// The built-in task catalog.
pub fn sample_tasks() -> Vec<Task> {
    vec![
        task(
            "1",
            "Complete Daily Check-in",
            "Log in to the platform and check your daily rewards",
            0.1,
            Difficulty::Easy,
            "Daily",
            "1 min",
            &["Connect wallet", "Visit platform"],
        ),
        task(
            "2",
            "Share on Social Media",
            "Share your experience with Solana Rewards on Twitter or Discord",
            0.25,
            Difficulty::Easy,
            "Social",
            "3 min",
            &["Post on social media", "Include #SolanaRewards"],
        ),
        task(
            "3",
            "Complete Survey",
            "Fill out a quick survey about your blockchain experience",
            0.5,
            Difficulty::Medium,
            "Research",
            "5 min",
            &["Answer all questions", "Provide honest feedback"],
        ),
        task(
            "4",
            "Refer a Friend",
            "Invite a friend to join Solana Rewards platform",
            1.0,
            Difficulty::Hard,
            "Referral",
            "10 min",
            &["Friend signs up", "Friend completes first task"],
        ),
        task(
            "5",
            "Write a Review",
            "Write a detailed review of the platform on a review site",
            0.75,
            Difficulty::Medium,
            "Content",
            "8 min",
            &["Minimum 100 words", "Include platform features"],
        ),
        task(
            "6",
            "Join Community Call",
            "Participate in our weekly community Discord call",
            0.3,
            Difficulty::Easy,
            "Community",
            "15 min",
            &["Join Discord", "Attend call", "Participate in discussion"],
        ),
    ]
}

/// Reads and writes the progress blob through a [`StoragePort`].
pub struct ProgressStore {
    storage: Box<dyn StoragePort>,
    key: String,
}

impl ProgressStore {
    pub fn new(storage: Box<dyn StoragePort>) -> Self {
        Self::with_key(storage, PROGRESS_KEY)
    }

    pub fn with_key(storage: Box<dyn StoragePort>, key: impl Into<String>) -> Self {
        Self {
            storage,
            key: key.into(),
        }
    }

    pub fn save(&mut self, progress: &UserProgress) -> Result<(), StorageError> {
        let data = serde_json::to_string(progress)?;
        self.storage.set(&self.key, &data)?;
        debug!("Progress saved under '{}'", self.key);
        Ok(())
    }

    /// Stored progress, or `None` when absent, unreadable or implausible.
    pub fn load(&self) -> Option<UserProgress> {
        let data = match self.storage.get(&self.key) {
            Ok(Some(data)) => data,
            Ok(None) => return None,
            Err(e) => {
                warn!("Could not read stored progress: {}", e);
                return None;
            }
        };
        let progress: UserProgress = match serde_json::from_str(&data) {
            Ok(progress) => progress,
            Err(e) => {
                warn!("Ignoring malformed progress under '{}': {}", self.key, e);
                return None;
            }
        };
        match progress.check() {
            Ok(()) => Some(progress),
            Err(reason) => {
                warn!("Ignoring malformed progress under '{}': {}", self.key, reason);
                None
            }
        }
    }

    pub fn clear(&mut self) -> Result<(), StorageError> {
        self.storage.remove(&self.key)
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct CompletionSummary {
    pub task_id: String,
    pub reward: f64,
    pub experience_gained: u32,
    pub levels_gained: u32,
    pub level: u32,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CompletionOutcome {
    Completed(CompletionSummary),
    AlreadyCompleted,
}

/// A completion that passed its checks and is waiting out the delay.
#[derive(Debug, Clone)]
pub struct PendingCompletion {
    task_id: String,
    delay: Duration,
}

impl PendingCompletion {
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub async fn wait(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

pub struct ProgressService {
    store: ProgressStore,
    progress: UserProgress,
    completion_delay: Duration,
    processing: bool,
}

impl ProgressService {
    pub fn new(store: ProgressStore, completion_delay: Duration) -> Self {
        Self {
            store,
            progress: UserProgress::default(),
            completion_delay,
            processing: false,
        }
    }

    /// True between [`begin_completion`](Self::begin_completion) and
    /// [`finish_completion`](Self::finish_completion).
    pub fn is_processing(&self) -> bool {
        self.processing
    }

    pub fn tasks(&self) -> &[Task] {
        &self.progress.tasks
    }

    pub fn stats(&self) -> &UserStats {
        &self.progress.stats
    }

    pub fn progress(&self) -> &UserProgress {
        &self.progress
    }

    pub fn task(&self, id: &str) -> Option<&Task> {
        self.progress.tasks.iter().find(|t| t.id == id)
    }

    fn task_mut(&mut self, id: &str) -> Result<&mut Task, ProgressError> {
        self.progress
            .tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| ProgressError::UnknownTask(id.to_string()))
    }

    /// Reset to the sample data, then load stored progress when connected.
    pub fn restore(&mut self, connected: bool) {
        self.progress = UserProgress::default();
        if !connected {
            return;
        }
        if let Some(saved) = self.store.load() {
            info!(
                "📂 Restored progress: {} tasks, level {}",
                saved.tasks.len(),
                saved.stats.level
            );
            self.progress = saved;
        }
    }

    /// Mark a task as started. Already started or completed tasks are left alone.
    pub fn start_task(
        &mut self,
        id: &str,
        notes: &mut Notifications,
    ) -> Result<TaskState, ProgressError> {
        let task = self.task_mut(id)?;
        if task.state() == TaskState::NotStarted {
            task.progress = STARTED_PROGRESS;
            notes.success("Task started! Complete the requirements to earn rewards.");
        }
        Ok(task.state())
    }

    /// Set the progress of an open task, kept below completion.
    pub fn update_task_progress(&mut self, id: &str, progress: u8) -> Result<u8, ProgressError> {
        let task = self.task_mut(id)?;
        if !task.completed {
            task.progress = progress.clamp(1, COMPLETED_PROGRESS - 1);
        }
        Ok(task.progress)
    }

    /// The task if it can be completed now, `None` if it already is.
    fn completable(&self, id: &str) -> Result<Option<Task>, ProgressError> {
        let task = self
            .task(id)
            .ok_or_else(|| ProgressError::UnknownTask(id.to_string()))?;
        match task.state() {
            TaskState::Completed => Ok(None),
            TaskState::NotStarted => Err(ProgressError::NotStarted(id.to_string())),
            TaskState::InProgress => Ok(Some(task.clone())),
        }
    }

    /// Check a completion and mark the service as processing.
    ///
    /// Returns `None` for a task that is already completed. Only one
    /// completion may be pending at a time.
    pub fn begin_completion(
        &mut self,
        connected: bool,
        id: &str,
        notes: &mut Notifications,
    ) -> Result<Option<PendingCompletion>, ProgressError> {
        if self.processing {
            return Err(ProgressError::Busy);
        }
        if !connected {
            notes.error(ProgressError::NotConnected.to_string());
            return Err(ProgressError::NotConnected);
        }
        if self.completable(id)?.is_none() {
            return Ok(None);
        }
        self.processing = true;
        Ok(Some(PendingCompletion {
            task_id: id.to_string(),
            delay: self.completion_delay,
        }))
    }

    /// Credit a pending completion and persist it.
    ///
    /// The task is checked again since progress may have been reset or
    /// reloaded during the wait. Nothing is committed unless the save
    /// succeeds.
    pub fn finish_completion(
        &mut self,
        connected: bool,
        pending: PendingCompletion,
        notes: &mut Notifications,
    ) -> Result<CompletionOutcome, ProgressError> {
        self.processing = false;
        if !connected {
            notes.error(ProgressError::NotConnected.to_string());
            return Err(ProgressError::NotConnected);
        }
        let id = pending.task_id.as_str();
        let Some(task) = self.completable(id)? else {
            return Ok(CompletionOutcome::AlreadyCompleted);
        };

        let mut next = self.progress.clone();
        for t in next.tasks.iter_mut().filter(|t| t.id == id) {
            t.completed = true;
            t.progress = COMPLETED_PROGRESS;
        }
        let experience = task.difficulty.experience();
        next.stats.total_earned += task.reward;
        next.stats.tasks_completed = next.stats.tasks_completed.saturating_add(1);
        next.stats.current_streak = next.stats.current_streak.saturating_add(1);
        let levels = next.stats.gain_experience(experience);
        next.timestamp = Utc::now().timestamp_millis();

        if let Err(e) = self.store.save(&next) {
            warn!("Error completing task {}: {}", id, e);
            notes.error("Failed to complete task. Please try again.");
            return Err(e.into());
        }

        self.progress = next;
        let level = self.progress.stats.level;
        if levels > 0 {
            notes.success(format!("🎉 Level Up! You're now level {}", level));
        }
        notes.success(format!("🎉 Task completed! You earned {} SOL", task.reward));
        notes.success(format!(
            "💰 {} SOL has been added to your wallet balance!",
            task.reward
        ));

        Ok(CompletionOutcome::Completed(CompletionSummary {
            task_id: task.id,
            reward: task.reward,
            experience_gained: experience,
            levels_gained: levels,
            level,
        }))
    }

    /// Complete a started task and credit its reward and experience.
    ///
    /// Completion is asserted by the client; the only gate is a connected
    /// wallet. Completing a completed task changes nothing.
    pub async fn complete_task(
        &mut self,
        connected: bool,
        id: &str,
        notes: &mut Notifications,
    ) -> Result<CompletionOutcome, ProgressError> {
        let Some(pending) = self.begin_completion(connected, id, notes)? else {
            return Ok(CompletionOutcome::AlreadyCompleted);
        };
        pending.wait().await;
        self.finish_completion(connected, pending, notes)
    }

    /// Forget stored progress and go back to the sample data.
    pub fn reset(&mut self) -> Result<(), ProgressError> {
        self.store.clear()?;
        self.progress = UserProgress::default();
        info!("Progress reset to defaults");
        Ok(())
    }
}
