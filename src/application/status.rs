use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex};

const MAX_TTL_SECONDS: u64 = 86_400;

type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StatusLevel {
    Success,
    Info,
    Error,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StatusMessage {
    pub level: StatusLevel,
    pub text: String,
    pub posted_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Holds the latest user-facing status line. A message disappears on its own
/// once its ttl has passed; a newer message replaces an older one.
pub struct StatusBoard {
    ttl: Duration,
    current: Mutex<Option<StatusMessage>>,
    now_provider: NowProvider,
}

impl StatusBoard {
    pub fn new(ttl_seconds: u64) -> Self {
        Self {
            ttl: Duration::seconds(ttl_seconds.min(MAX_TTL_SECONDS) as i64),
            current: Mutex::new(None),
            now_provider: Arc::new(Utc::now),
        }
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub fn post(&self, level: StatusLevel, text: impl Into<String>) {
        let posted_at = (self.now_provider)();
        let message = StatusMessage {
            level,
            text: text.into(),
            posted_at,
            expires_at: posted_at + self.ttl,
        };
        let mut current = self.current.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *current = Some(message);
    }

    pub fn current(&self) -> Option<StatusMessage> {
        let now = (self.now_provider)();
        let mut current = self.current.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if current.as_ref().is_some_and(|message| message.expires_at <= now) {
            *current = None;
        }
        current.clone()
    }

    pub fn clear(&self) {
        let mut current = self.current.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *current = None;
    }
}
