//! Token quota enforcement (Configuration, `QuotaConfig`). In-memory,
//! lock-protected, UTC-day-rollover reset, keyed by session. Token-only
//! (no cost tracking, since PageForge doesn't price provider calls), split
//! into two independent counters per session: one that resets at UTC
//! midnight (`max_tokens_per_day`) and one that never resets for the life
//! of the session (`max_tokens_per_session`).

use std::collections::HashMap;

use chrono::{NaiveDate, Utc};
use parking_lot::RwLock;

use pf_domain::config::QuotaConfig;

pub struct QuotaExceeded {
    /// `"day"` or `"session"`.
    pub kind: &'static str,
    pub used: u64,
    pub limit: u64,
}

struct SessionUsage {
    day: NaiveDate,
    tokens_today: u64,
    tokens_total: u64,
}

/// In-memory token quota tracker, one instance shared across the app via
/// `AppState`. A no-op when `config.enabled` is `false` (the default).
pub struct QuotaTracker {
    config: QuotaConfig,
    usage: RwLock<HashMap<String, SessionUsage>>,
}

impl QuotaTracker {
    pub fn new(config: QuotaConfig) -> Self {
        Self { config, usage: RwLock::new(HashMap::new()) }
    }

    /// Check whether `session_id` is still within its quotas. `Ok(())` when
    /// disabled, unconfigured, or within limits.
    pub fn check_quota(&self, session_id: &str) -> Result<(), QuotaExceeded> {
        if !self.config.enabled {
            return Ok(());
        }
        let today = Utc::now().date_naive();
        let usage = self.usage.read();
        let Some(entry) = usage.get(session_id) else {
            return Ok(());
        };

        let tokens_today = if entry.day == today { entry.tokens_today } else { 0 };
        if let Some(limit) = self.config.max_tokens_per_day {
            if tokens_today >= limit {
                return Err(QuotaExceeded { kind: "day", used: tokens_today, limit });
            }
        }
        if let Some(limit) = self.config.max_tokens_per_session {
            if entry.tokens_total >= limit {
                return Err(QuotaExceeded { kind: "session", used: entry.tokens_total, limit });
            }
        }
        Ok(())
    }

    /// Record `tokens` spent by `session_id`. A no-op when disabled.
    pub fn record_usage(&self, session_id: &str, tokens: u64) {
        if !self.config.enabled {
            return;
        }
        let today = Utc::now().date_naive();
        let mut usage = self.usage.write();
        let entry = usage
            .entry(session_id.to_string())
            .or_insert(SessionUsage { day: today, tokens_today: 0, tokens_total: 0 });

        if entry.day != today {
            entry.day = today;
            entry.tokens_today = 0;
        }
        entry.tokens_today += tokens;
        entry.tokens_total += tokens;
    }
}
