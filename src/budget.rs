//! Daily request budget.
//!
//! The count resets the first time it is touched on a new local calendar day.
//! There is no sliding window: 80 requests at 23:59 and 80 more at 00:01 is
//! allowed.

use anyhow::{Context, Result};
use chrono::{DateTime, Local, NaiveDate};
use tokio::sync::Mutex;

use crate::storage::PreferenceStore;

pub const COUNT_KEY: &str = "budget.daily_count";
pub const LAST_REQUEST_KEY: &str = "budget.last_request";

/// Persisted budget state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BudgetState {
    pub count: u32,
    /// `None` means no request was ever recorded
    pub last_request: Option<DateTime<Local>>,
}

impl BudgetState {
    /// Zero the count if `now` falls on a different calendar day than the
    /// last recorded request. Returns whether a rollover happened.
    pub fn roll_over(&mut self, now: DateTime<Local>) -> bool {
        let same_day = self
            .last_request
            .is_some_and(|last| last.date_naive() == now.date_naive());
        if same_day {
            return false;
        }
        self.count = 0;
        self.last_request = Some(now);
        true
    }

    pub fn remaining(&self, max_daily: u32) -> u32 {
        max_daily.saturating_sub(self.count)
    }

    pub fn last_request_day(&self) -> Option<NaiveDate> {
        self.last_request.map(|t| t.date_naive())
    }
}

/// Tracks requests made today against a fixed daily cap.
///
/// Every operation applies the day rollover before doing anything else.
/// Read-modify-write cycles are serialized by an internal lock, so a tracker
/// shared between tasks never loses an increment.
pub struct BudgetTracker<P> {
    store: P,
    max_daily: u32,
    lock: Mutex<()>,
}

impl<P: PreferenceStore> BudgetTracker<P> {
    pub fn new(store: P, max_daily: u32) -> Self {
        Self {
            store,
            max_daily,
            lock: Mutex::new(()),
        }
    }

    pub fn max_daily(&self) -> u32 {
        self.max_daily
    }

    /// True iff today's count is below the daily maximum.
    pub async fn can_make_request(&self) -> Result<bool> {
        let _guard = self.lock.lock().await;
        let state = self.current_state().await?;
        Ok(state.count < self.max_daily)
    }

    pub async fn is_rate_limited(&self) -> Result<bool> {
        Ok(!self.can_make_request().await?)
    }

    /// Count one successful remote call against today's budget.
    pub async fn record_request(&self) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut state = self.current_state().await?;
        state.count = state.count.saturating_add(1);
        state.last_request = Some(Local::now());
        self.save(&state).await?;

        tracing::debug!(
            count = state.count,
            remaining = state.remaining(self.max_daily),
            "Recorded API request"
        );
        Ok(())
    }

    pub async fn remaining_requests(&self) -> Result<u32> {
        let _guard = self.lock.lock().await;
        let state = self.current_state().await?;
        Ok(state.remaining(self.max_daily))
    }

    /// Force the count to zero and stamp today as the last request day.
    pub async fn reset_daily_count(&self) -> Result<()> {
        let _guard = self.lock.lock().await;
        let state = BudgetState {
            count: 0,
            last_request: Some(Local::now()),
        };
        self.save(&state).await?;
        tracing::info!(max_daily = self.max_daily, "Request budget reset");
        Ok(())
    }

    /// Snapshot of the persisted state after rollover.
    pub async fn state(&self) -> Result<BudgetState> {
        let _guard = self.lock.lock().await;
        self.current_state().await
    }

    /// Load, roll over if needed, and persist the rollover. Caller holds the lock.
    async fn current_state(&self) -> Result<BudgetState> {
        let mut state = self.load().await?;
        let previous_day = state.last_request_day();
        if state.roll_over(Local::now()) {
            tracing::debug!(
                previous_day = ?previous_day,
                "New day, request count reset"
            );
            self.save(&state).await?;
        }
        Ok(state)
    }

    async fn load(&self) -> Result<BudgetState> {
        let count = match self.store.get_preference(COUNT_KEY).await? {
            Some(raw) => raw
                .parse::<u32>()
                .with_context(|| format!("Invalid stored request count: {raw:?}"))?,
            None => 0,
        };
        let last_request = match self.store.get_preference(LAST_REQUEST_KEY).await? {
            Some(raw) => match DateTime::parse_from_rfc3339(&raw) {
                Ok(t) => Some(t.with_timezone(&Local)),
                Err(e) => {
                    // Unreadable timestamp: treat as never, which forces a rollover
                    tracing::warn!(value = %raw, error = %e, "Ignoring invalid last request timestamp");
                    None
                }
            },
            None => None,
        };
        Ok(BudgetState {
            count,
            last_request,
        })
    }

    async fn save(&self, state: &BudgetState) -> Result<()> {
        let mut entries = vec![(COUNT_KEY, state.count.to_string())];
        if let Some(last) = state.last_request {
            entries.push((LAST_REQUEST_KEY, last.to_rfc3339()));
        }
        self.store
            .set_preferences(&entries)
            .await
            .context("Failed to persist request budget")
    }
}
