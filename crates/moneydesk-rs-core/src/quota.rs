//! Tiered usage ledger backed by per-period counters.
//!
//! `check` and `increment` are separate calls: metered work runs
//! between them, so concurrent requests from one user may overshoot a limit by
//! the number of requests in flight.

use chrono::{DateTime, Datelike, Utc};
use log::{debug, warn};
use moneydesk_rs_config::QuotaConfig;
use moneydesk_rs_protocol::{Clock, QuotaPeriod, Tier, UsageKey, UsageStore};
use std::sync::Arc;

/// Outcome of a quota check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaDecision {
    pub allowed: bool,
    /// Uses left after the pending call; `-1` when unbounded.
    pub remaining: i64,
    /// `0` locked, `-1` unbounded.
    pub limit: i64,
    pub period: QuotaPeriod,
    /// Counter value read for this decision; `0` when storage was not consulted.
    pub used: i64,
    /// User-facing explanation when not allowed.
    pub message: Option<String>,
}

impl QuotaDecision {
    fn unbounded(period: QuotaPeriod) -> Self {
        Self {
            allowed: true,
            remaining: -1,
            limit: -1,
            period,
            used: 0,
            message: None,
        }
    }

    fn denied(limit: i64, period: QuotaPeriod, used: i64, message: String) -> Self {
        Self {
            allowed: false,
            remaining: 0,
            limit,
            period,
            used,
            message: Some(message),
        }
    }

    pub fn is_unbounded(&self) -> bool {
        self.limit < 0
    }
}

/// Counter bucket for a period at the given instant.
pub fn period_key(period: QuotaPeriod, now: DateTime<Utc>) -> String {
    match period {
        QuotaPeriod::Daily => format!("daily:{}", now.format("%Y-%m-%d")),
        QuotaPeriod::Weekly => {
            let week = now.iso_week();
            format!("weekly:{}-W{:02}", week.year(), week.week())
        }
        QuotaPeriod::Monthly => format!("monthly:{}", now.format("%Y-%m")),
    }
}

/// Enforces the static limit table against persisted counters.
pub struct QuotaLedger {
    limits: QuotaConfig,
    store: Arc<dyn UsageStore>,
    clock: Arc<dyn Clock>,
}

impl QuotaLedger {
    pub fn new(limits: QuotaConfig, store: Arc<dyn UsageStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            limits,
            store,
            clock,
        }
    }

    pub fn limits(&self) -> &QuotaConfig {
        &self.limits
    }

    /// Decide whether one more use of `feature` is allowed.
    ///
    /// Locked and unbounded limits are answered from the table alone. Storage
    /// failures deny the request.
    pub async fn check(&self, user_id: &str, tier: Tier, feature: &str) -> QuotaDecision {
        let Some(entry) = self.limits.limit(tier, feature) else {
            warn!("quota check for unknown feature (feature={feature})");
            return QuotaDecision::denied(
                0,
                QuotaPeriod::Daily,
                0,
                format!("{} isn't available.", feature_label(feature)),
            );
        };
        let period = entry.period;
        if entry.limit == 0 {
            debug!("quota locked (user_id={user_id}, tier={tier}, feature={feature})");
            return QuotaDecision::denied(
                0,
                period,
                0,
                format!(
                    "{} isn't included in the {tier} plan. Upgrade your plan to unlock it.",
                    feature_label(feature)
                ),
            );
        }
        if entry.limit < 0 {
            return QuotaDecision::unbounded(period);
        }

        let key = UsageKey::new(user_id, feature, period_key(period, self.clock.now()));
        let used = match self.store.usage_count(&key).await {
            Ok(used) => used,
            Err(err) => {
                warn!(
                    "quota read failed; denying (user_id={user_id}, feature={feature}, error={err})"
                );
                return QuotaDecision::denied(
                    entry.limit,
                    period,
                    0,
                    "We couldn't verify your usage right now. Please try again shortly."
                        .to_string(),
                );
            }
        };

        if used < entry.limit {
            QuotaDecision {
                allowed: true,
                remaining: (entry.limit - used - 1).max(0),
                limit: entry.limit,
                period,
                used,
                message: None,
            }
        } else {
            debug!(
                "quota exhausted (user_id={user_id}, feature={feature}, used={used}, limit={})",
                entry.limit
            );
            QuotaDecision::denied(
                entry.limit,
                period,
                used,
                format!(
                    "You've used all {} of your {} {}. Upgrade your plan for a higher limit.",
                    entry.limit,
                    feature_label(feature),
                    period.remaining_wording()
                ),
            )
        }
    }

    /// Record one use of `feature` in the current period.
    pub async fn increment(&self, user_id: &str, feature: &str) {
        self.increment_by(user_id, feature, 1).await;
    }

    /// Record `amount` uses of `feature`. Failures are logged, never returned.
    pub async fn increment_by(&self, user_id: &str, feature: &str, amount: i64) {
        let Some(period) = self.limits.period(feature) else {
            warn!("quota increment for unknown feature skipped (feature={feature})");
            return;
        };
        if amount <= 0 {
            return;
        }
        let key = UsageKey::new(user_id, feature, period_key(period, self.clock.now()));
        match self.store.increment_usage(&key, amount).await {
            Ok(count) => debug!(
                "quota incremented (user_id={user_id}, feature={feature}, period_key={}, count={count})",
                key.period_key
            ),
            Err(err) => warn!(
                "quota increment failed (user_id={user_id}, feature={feature}, error={err})"
            ),
        }
    }
}

fn feature_label(feature: &str) -> String {
    feature.replace('_', " ")
}
