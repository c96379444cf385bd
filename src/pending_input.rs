use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// how long an admin prompt waits for its answer
pub const INPUT_TIMEOUT: Duration = Duration::from_secs(60);

/// what the next text message of an admin is expected to contain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    ShortenerCredentials,
    TutorialLink,
    TokenValidity,
}

impl InputKind {
    /// callback data of the panel the prompt returns to
    pub fn back_target(&self) -> &'static str {
        match self {
            InputKind::ShortenerCredentials | InputKind::TutorialLink => "shortener",
            InputKind::TokenValidity => "access_token",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingInput {
    pub kind: InputKind,
    pub chat_id: i64,
    pub prompt_message_id: i32,
    pub generation: u64,
    deadline: Instant,
}

/// per-admin prompts awaiting a text reply
#[derive(Clone)]
pub struct PendingInputs {
    entries: Arc<Mutex<HashMap<i64, PendingInput>>>,
    next_generation: Arc<AtomicU64>,
    timeout: Duration,
}

impl PendingInputs {
    pub fn new(timeout: Duration) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            next_generation: Arc::new(AtomicU64::new(1)),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// registers a prompt, replacing any earlier one from the same admin
    pub async fn begin(
        &self,
        user_id: i64,
        kind: InputKind,
        chat_id: i64,
        prompt_message_id: i32,
    ) -> PendingInput {
        let pending = PendingInput {
            kind,
            chat_id,
            prompt_message_id,
            generation: self.next_generation.fetch_add(1, Ordering::Relaxed),
            deadline: Instant::now() + self.timeout,
        };
        self.entries.lock().await.insert(user_id, pending.clone());
        pending
    }

    /// removes and returns the admin's prompt if it has not timed out
    pub async fn take(&self, user_id: i64) -> Option<PendingInput> {
        let pending = self.entries.lock().await.remove(&user_id)?;
        (Instant::now() < pending.deadline).then_some(pending)
    }

    /// drops the prompt if it is still the one identified by `generation`
    pub async fn expire(&self, user_id: i64, generation: u64) -> Option<PendingInput> {
        let mut entries = self.entries.lock().await;
        let is_current = entries
            .get(&user_id)
            .is_some_and(|pending| pending.generation == generation);
        if is_current {
            entries.remove(&user_id)
        } else {
            None
        }
    }
}
