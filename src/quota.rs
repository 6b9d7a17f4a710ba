//! API call budgeting
//!
//! Tracks consumption against two independent ceilings: a monthly cap and a
//! short rolling rate window. Both are used only up to a safety margin so the
//! platform's real limits are never touched.
//!
//! Counters live in the [`StateStore`]. When the store cannot be read the
//! budget fails closed and reports nothing available. Check-then-record is
//! best effort: under concurrent execution a brief overshoot is possible and
//! simply shows up as less headroom on the next check.

use crate::config::QuotaConfig;
use crate::error::Result;
use crate::storage::StateStore;
use crate::types::{month_tag, QuotaState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Monthly consumption band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuotaHealth {
    /// Under 70% of the monthly ceiling
    Healthy,
    /// 70% to 90%
    Warning,
    /// Over 90%
    Critical,
}

impl std::fmt::Display for QuotaHealth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QuotaHealth::Healthy => write!(f, "healthy"),
            QuotaHealth::Warning => write!(f, "warning"),
            QuotaHealth::Critical => write!(f, "critical"),
        }
    }
}

/// Outcome of an availability check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaCheck {
    pub ok: bool,

    /// Calls still usable under both ceilings
    pub available: u64,

    pub reason: String,
}

/// Snapshot of quota consumption
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaStats {
    pub month: String,
    pub monthly_used: u64,
    pub monthly_limit: u64,
    pub monthly_effective_limit: u64,
    pub monthly_remaining: u64,
    pub window_used: u64,
    pub window_effective_limit: u64,
    pub window_remaining: u64,
    pub window_resets_at: DateTime<Utc>,

    /// Share of the nominal monthly ceiling consumed, in percent
    pub usage_percent: f64,
    pub health: QuotaHealth,

    /// Calls recorded by this process
    pub calls_recorded: u64,

    /// Calls recorded as failed by this process
    pub failed_calls: u64,
}

/// Monthly and windowed call budget
pub struct QuotaBudget {
    config: QuotaConfig,
    store: Arc<dyn StateStore>,
    update_lock: Mutex<()>,
    calls_recorded: AtomicU64,
    failed_calls: AtomicU64,
}

impl QuotaBudget {
    pub fn new(config: QuotaConfig, store: Arc<dyn StateStore>) -> Self {
        Self {
            config,
            store,
            update_lock: Mutex::new(()),
            calls_recorded: AtomicU64::new(0),
            failed_calls: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &QuotaConfig {
        &self.config
    }

    /// Whether `required_calls` more calls fit under both ceilings
    pub async fn check_available(&self, required_calls: u64) -> QuotaCheck {
        self.check_available_at(required_calls, Utc::now()).await
    }

    pub async fn check_available_at(&self, required_calls: u64, now: DateTime<Utc>) -> QuotaCheck {
        let state = match self.current_state(now).await {
            Ok(state) => state,
            Err(e) => {
                warn!("Quota store unreachable, failing closed: {}", e);
                return QuotaCheck {
                    ok: false,
                    available: 0,
                    reason: format!("quota store unavailable: {}", e),
                };
            }
        };

        let monthly_remaining = self.monthly_remaining(&state);
        let window_remaining = self.window_remaining(&state);
        let available = monthly_remaining.min(window_remaining);

        if required_calls <= available {
            debug!(
                required_calls,
                available, "Quota check passed"
            );
            return QuotaCheck {
                ok: true,
                available,
                reason: format!("{} of {} available calls", required_calls, available),
            };
        }

        let reason = if monthly_remaining < required_calls {
            format!(
                "monthly budget exhausted: {} calls required, {} remaining of {} usable",
                required_calls,
                monthly_remaining,
                self.config.effective_monthly_limit()
            )
        } else {
            format!(
                "rate window exhausted: {} calls required, {} remaining until {}",
                required_calls,
                window_remaining,
                self.window_resets_at(&state).to_rfc3339()
            )
        };
        info!("Quota check failed: {}", reason);

        QuotaCheck {
            ok: false,
            available,
            reason,
        }
    }

    /// Calls usable right now, 0 if the store is unreachable
    pub async fn remaining_calls(&self) -> u64 {
        self.check_available_at(0, Utc::now()).await.available
    }

    /// Record calls made against the platform
    ///
    /// Failed calls still consume quota. Store failures are logged and
    /// swallowed; the next successful check corrects any drift.
    pub async fn record(&self, calls: u64, success: bool) {
        self.record_at(calls, success, Utc::now()).await
    }

    pub async fn record_at(&self, calls: u64, success: bool, now: DateTime<Utc>) {
        self.calls_recorded.fetch_add(calls, Ordering::Relaxed);
        if !success {
            self.failed_calls.fetch_add(calls, Ordering::Relaxed);
        }

        let _guard = self.update_lock.lock().await;
        let mut state = match self.current_state(now).await {
            Ok(state) => state,
            Err(e) => {
                warn!("Could not record {} call(s), quota store unreachable: {}", calls, e);
                return;
            }
        };

        state.monthly_used = state.monthly_used.saturating_add(calls);
        state.window_used = state.window_used.saturating_add(calls);

        if let Err(e) = self.store.save_quota(&state).await {
            warn!("Failed to persist quota usage: {}", e);
            return;
        }

        debug!(
            calls,
            success,
            monthly_used = state.monthly_used,
            window_used = state.window_used,
            "Recorded API calls"
        );
    }

    /// Current consumption snapshot
    pub async fn stats(&self) -> Result<QuotaStats> {
        self.stats_at(Utc::now()).await
    }

    pub async fn stats_at(&self, now: DateTime<Utc>) -> Result<QuotaStats> {
        let state = self.current_state(now).await?;
        let usage = self.usage_ratio(&state);

        Ok(QuotaStats {
            month: state.last_reset_month.clone(),
            monthly_used: state.monthly_used,
            monthly_limit: self.config.monthly_limit,
            monthly_effective_limit: self.config.effective_monthly_limit(),
            monthly_remaining: self.monthly_remaining(&state),
            window_used: state.window_used,
            window_effective_limit: self.config.effective_window_limit(),
            window_remaining: self.window_remaining(&state),
            window_resets_at: self.window_resets_at(&state),
            usage_percent: usage * 100.0,
            health: health_for(usage),
            calls_recorded: self.calls_recorded.load(Ordering::Relaxed),
            failed_calls: self.failed_calls.load(Ordering::Relaxed),
        })
    }

    /// Health band of monthly consumption, critical if the store is unreachable
    pub async fn health(&self) -> QuotaHealth {
        self.health_at(Utc::now()).await
    }

    pub async fn health_at(&self, now: DateTime<Utc>) -> QuotaHealth {
        match self.current_state(now).await {
            Ok(state) => health_for(self.usage_ratio(&state)),
            Err(e) => {
                warn!("Quota store unreachable, reporting critical: {}", e);
                QuotaHealth::Critical
            }
        }
    }

    /// Stored counters with month and window rollover applied
    async fn current_state(&self, now: DateTime<Utc>) -> Result<QuotaState> {
        let stored = self.store.load_quota().await?;
        let state = stored.unwrap_or_else(|| QuotaState::new(now));
        Ok(self.roll_over(state, now))
    }

    /// Reset counters whose period has ended
    ///
    /// The monthly reset keys off the stored month tag, so applying it twice
    /// in the same month is a no-op.
    fn roll_over(&self, mut state: QuotaState, now: DateTime<Utc>) -> QuotaState {
        let current_month = month_tag(now);
        if state.last_reset_month != current_month {
            info!(
                "Monthly quota reset: {} -> {} ({} calls used last period)",
                state.last_reset_month, current_month, state.monthly_used
            );
            state.monthly_used = 0;
            state.last_reset_month = current_month;
        }

        if now >= self.window_resets_at(&state) || now < state.window_started_at {
            state.window_used = 0;
            state.window_started_at = now;
        }

        state
    }

    fn window_resets_at(&self, state: &QuotaState) -> DateTime<Utc> {
        state.window_started_at + self.config.window()
    }

    fn monthly_remaining(&self, state: &QuotaState) -> u64 {
        self.config
            .effective_monthly_limit()
            .saturating_sub(state.monthly_used)
    }

    fn window_remaining(&self, state: &QuotaState) -> u64 {
        self.config
            .effective_window_limit()
            .saturating_sub(state.window_used)
    }

    fn usage_ratio(&self, state: &QuotaState) -> f64 {
        state.monthly_used as f64 / self.config.monthly_limit.max(1) as f64
    }
}

fn health_for(usage: f64) -> QuotaHealth {
    if usage < 0.7 {
        QuotaHealth::Healthy
    } else if usage <= 0.9 {
        QuotaHealth::Warning
    } else {
        QuotaHealth::Critical
    }
}
