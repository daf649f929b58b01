//! Daily ceiling for external completion calls.
//!
//! Shared by every request of one engine; the counter is atomic and the
//! period / history live behind their own mutexes.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{info, warn};

pub const DEFAULT_DAILY_LIMIT: u32 = 1000;
const MAX_HISTORY: usize = 100;
const RECENT_CALLS: usize = 10;

#[derive(Debug, Clone, Serialize)]
pub struct CallRecord {
    pub timestamp: DateTime<Utc>,
    pub duration_ms: u64,
    pub call_number: u32,
    pub succeeded: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct UsageStatistics {
    pub total_calls: u32,
    pub daily_limit: u32,
    pub remaining_calls: u32,
    pub recent_calls: Vec<CallRecord>,
}

#[derive(Debug)]
pub struct DailyCallLimiter {
    daily_limit: u32,
    calls: AtomicU32,
    period: Mutex<NaiveDate>,
    history: Mutex<VecDeque<CallRecord>>,
}

impl Default for DailyCallLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_DAILY_LIMIT)
    }
}

impl DailyCallLimiter {
    pub fn new(daily_limit: u32) -> Self {
        Self {
            daily_limit,
            calls: AtomicU32::new(0),
            period: Mutex::new(Utc::now().date_naive()),
            history: Mutex::new(VecDeque::new()),
        }
    }

    pub fn daily_limit(&self) -> u32 {
        self.daily_limit
    }

    pub fn calls_today(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn is_exhausted(&self) -> bool {
        self.is_exhausted_at(Utc::now())
    }

    pub fn is_exhausted_at(&self, now: DateTime<Utc>) -> bool {
        self.roll_over(now);
        self.calls_today() >= self.daily_limit
    }

    /// Reserves one call. Returns the call number, or `None` once the
    /// ceiling for the current day is reached.
    pub fn try_acquire(&self) -> Option<u32> {
        self.try_acquire_at(Utc::now())
    }

    pub fn try_acquire_at(&self, now: DateTime<Utc>) -> Option<u32> {
        self.roll_over(now);
        let limit = self.daily_limit;
        match self
            .calls
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| (n < limit).then_some(n + 1))
        {
            Ok(previous) => Some(previous + 1),
            Err(_) => {
                warn!("Daily external call limit reached ({})", limit);
                None
            }
        }
    }

    pub fn record(&self, started: DateTime<Utc>, duration: Duration, call_number: u32, succeeded: bool) {
        let record = CallRecord {
            timestamp: started,
            duration_ms: duration.as_millis() as u64,
            call_number,
            succeeded,
        };
        info!(
            "📊 External call #{} took {:.2}s ({})",
            call_number,
            duration.as_secs_f64(),
            if succeeded { "ok" } else { "failed" }
        );
        let mut history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        history.push_back(record);
        while history.len() > MAX_HISTORY {
            history.pop_front();
        }
    }

    /// Clears the counter and history for a new period.
    pub fn reset(&self) {
        self.calls.store(0, Ordering::SeqCst);
        self.history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    pub fn statistics(&self) -> UsageStatistics {
        let total_calls = self.calls_today();
        let history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        let skip = history.len().saturating_sub(RECENT_CALLS);
        UsageStatistics {
            total_calls,
            daily_limit: self.daily_limit,
            remaining_calls: self.daily_limit.saturating_sub(total_calls),
            recent_calls: history.iter().skip(skip).cloned().collect(),
        }
    }

    fn roll_over(&self, now: DateTime<Utc>) {
        let today = now.date_naive();
        let mut period = self.period.lock().unwrap_or_else(|e| e.into_inner());
        if *period != today {
            info!("New call period {} (was {}), resetting counter", today, *period);
            *period = today;
            self.reset();
        }
    }
}
