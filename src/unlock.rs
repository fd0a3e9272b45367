//! Lock state of a question and the auto-unlock sweep.
use crate::{actions, auth};
use crate::db::Store;
use crate::models::Question;
use chrono::{DateTime, Utc};
use log::{debug, error, info};
use std::time::{Duration, Instant};

/// Default interval of the auto-unlock check.
pub const POLL_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LockState {
    Unlocked,
    Locked { unlock_at: Option<DateTime<Utc>> },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LockStatus {
    pub locked: bool,
    pub unlock_at: Option<DateTime<Utc>>,
}

impl LockStatus {
    pub fn of(question: &Question) -> Self {
        LockStatus {
            locked: question.is_locked,
            unlock_at: question.auto_unlock_at,
        }
    }

    pub fn state(&self) -> LockState {
        if self.locked {
            LockState::Locked {
                unlock_at: self.unlock_at,
            }
        } else {
            LockState::Unlocked
        }
    }

    /// Faculty toggle. The schedule is left alone.
    pub fn toggled(self) -> Self {
        LockStatus {
            locked: !self.locked,
            ..self
        }
    }

    pub fn scheduled(self, at: DateTime<Utc>) -> Self {
        LockStatus {
            unlock_at: Some(at),
            ..self
        }
    }

    pub fn unscheduled(self) -> Self {
        LockStatus {
            unlock_at: None,
            ..self
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.locked && self.unlock_at.map_or(false, |at| at <= now)
    }

    /// State after a sweep at `now`, or `None` when the sweep leaves it alone.
    pub fn swept(self, now: DateTime<Utc>) -> Option<Self> {
        if self.is_due(now) {
            Some(LockStatus {
                locked: false,
                unlock_at: None,
            })
        } else {
            None
        }
    }
}

/// Questions a sweep at `now` would unlock.
pub fn due<'a>(questions: &'a [Question], now: DateTime<Utc>) -> Vec<&'a Question> {
    questions
        .iter()
        .filter(|q| LockStatus::of(q).is_due(now))
        .collect()
}

/// Fixed-interval poll clock, as run by every open faculty dashboard.
#[derive(Debug)]
pub struct PollTimer {
    interval: Duration,
    last: Option<Instant>,
}

impl PollTimer {
    pub fn new(interval: Duration) -> Self {
        PollTimer {
            interval,
            last: None,
        }
    }

    /// True on the first call and then once per elapsed interval.
    pub fn due(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now.saturating_duration_since(last) < self.interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}

/// Server-side sweep loop, also purging expired sessions. Runs until the
/// runtime shuts down.
pub async fn run_sweeper(store: Store, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        match store
            .run(|conn| actions::sweep_auto_unlock(conn, Utc::now()))
            .await
        {
            Ok(report) if report.unlocked_count > 0 || report.failed_count > 0 => info!(
                "Auto-unlock sweep: {} unlocked, {} failed",
                report.unlocked_count, report.failed_count
            ),
            Ok(_) => debug!("Auto-unlock sweep: nothing due"),
            Err(e) => error!("Auto-unlock sweep failed: {}", e),
        }
        match store
            .run(|conn| auth::purge_expired_sessions(conn, Utc::now()))
            .await
        {
            Ok(0) => {}
            Ok(n) => debug!("Purged {} expired sessions", n),
            Err(e) => error!("Session purge failed: {}", e),
        }
    }
}
