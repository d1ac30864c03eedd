use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use quill_types::UserId;

use crate::error::LedgerError;

/// How stacked guardrail reductions combine.
///
/// Multiplicative is the conservative default — stacked abuse signals
/// compound. MostSevere applies only the single strongest reduction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReductionComposition {
    Multiplicative,
    MostSevere,
}

/// Deterministic anti-gaming configuration.
///
/// Thresholds are explicit configuration, threaded through the engine
/// instance. The interval tiers, cap and anomaly reduction are rule-based
/// and free of probabilistic side effects: the same state and clock always
/// yield the same reductions.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GuardrailConfig {
    /// Earns inside this window are fully blocked.
    pub full_block_secs: i64,
    /// Earns inside this window keep 25% of the amount.
    pub heavy_reduction_secs: i64,
    /// Earns inside this window keep 50% of the amount.
    pub light_reduction_secs: i64,
    /// Maximum points issued per user per UTC day.
    pub daily_cap: i64,
    /// Earn count in the trailing hour at which the anomaly reduction kicks in.
    pub hourly_earn_threshold: usize,
    /// Flat percentage removed by the anomaly reduction.
    pub anomaly_reduction_pct: i64,
    pub composition: ReductionComposition,
}

impl Default for GuardrailConfig {
    fn default() -> Self {
        Self {
            full_block_secs: 60,
            heavy_reduction_secs: 180,
            light_reduction_secs: 300,
            daily_cap: 500,
            hourly_earn_threshold: 10,
            anomaly_reduction_pct: 30,
            composition: ReductionComposition::Multiplicative,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardrailRule {
    MinInterval,
    DailyCap,
    Anomaly,
}

/// One reduction actually applied to an attempt.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GuardrailApplication {
    pub rule: GuardrailRule,
    pub detail: String,
    pub amount_before: i64,
    pub amount_after: i64,
}

/// Explained outcome of guardrail evaluation. A full block is not an
/// error — it is a zero issuance with its reductions attached.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GuardrailOutcome {
    pub base_amount: i64,
    pub issued_amount: i64,
    pub applied: Vec<GuardrailApplication>,
}

impl GuardrailOutcome {
    pub fn is_blocked(&self) -> bool {
        self.issued_amount == 0 && self.base_amount > 0
    }
}

/// Per-user guardrail counters.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GuardrailState {
    pub user_id: UserId,
    pub daily_count: u32,
    pub daily_total: i64,
    pub last_earn_at: Option<DateTime<Utc>>,
    pub reset_at: DateTime<Utc>,
    /// Timestamps of earns in the trailing hour, for the anomaly rule.
    pub recent_earns: Vec<DateTime<Utc>>,
}

impl GuardrailState {
    fn fresh(user_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            daily_count: 0,
            daily_total: 0,
            last_earn_at: None,
            reset_at: next_utc_midnight(now),
            recent_earns: Vec::new(),
        }
    }

    fn roll_daily_window(&mut self, now: DateTime<Utc>) {
        self.daily_count = 0;
        self.daily_total = 0;
        self.reset_at = next_utc_midnight(now);
    }
}

fn next_utc_midnight(now: DateTime<Utc>) -> DateTime<Utc> {
    let next_day = now.date_naive() + Duration::days(1);
    match next_day.and_hms_opt(0, 0, 0) {
        Some(naive) => naive.and_utc(),
        // Unreachable for valid dates; fall back to a plain 24h window.
        None => now + Duration::days(1),
    }
}

/// Deterministic anti-gaming reductions applied before any EARN append.
///
/// All state lives behind one mutex; each evaluation is a single atomic
/// read-modify-write per user — the daily reset, the reductions and the
/// counter update happen in one critical section, so two concurrent
/// attempts for the same user never interleave or double-reset.
pub struct GuardrailEngine {
    config: GuardrailConfig,
    states: Mutex<HashMap<UserId, GuardrailState>>,
}

impl GuardrailEngine {
    pub fn new(config: GuardrailConfig) -> Self {
        Self {
            config,
            states: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &GuardrailConfig {
        &self.config
    }

    /// Snapshot of a user's current state, if any.
    pub fn state(&self, user: &UserId) -> Result<Option<GuardrailState>, LedgerError> {
        let states = self.states.lock().map_err(|_| LedgerError::Lock)?;
        Ok(states.get(user).cloned())
    }

    pub fn evaluate(&self, user: &UserId, base_amount: i64) -> Result<GuardrailOutcome, LedgerError> {
        self.evaluate_at(user, base_amount, Utc::now())
    }

    /// Apply all reductions to `base_amount` and update the user's state
    /// exactly once for this attempt, blocked or not.
    pub fn evaluate_at(
        &self,
        user: &UserId,
        base_amount: i64,
        now: DateTime<Utc>,
    ) -> Result<GuardrailOutcome, LedgerError> {
        let mut states = self.states.lock().map_err(|_| LedgerError::Lock)?;
        let state = states
            .entry(user.clone())
            .or_insert_with(|| GuardrailState::fresh(user.clone(), now));

        if now >= state.reset_at {
            state.roll_daily_window(now);
        }
        let hour_ago = now - Duration::hours(1);
        state.recent_earns.retain(|t| *t > hour_ago);

        let (issued, applied) = match self.config.composition {
            ReductionComposition::Multiplicative => self.reduce_stacked(state, base_amount, now),
            ReductionComposition::MostSevere => self.reduce_most_severe(state, base_amount, now),
        };

        state.daily_count += 1;
        state.daily_total += issued;
        if issued > 0 {
            state.last_earn_at = Some(now);
            state.recent_earns.push(now);
        }

        debug!(
            user = %user,
            base_amount,
            issued,
            reductions = applied.len(),
            "guardrails evaluated"
        );
        Ok(GuardrailOutcome {
            base_amount,
            issued_amount: issued,
            applied,
        })
    }

    /// Reductions in order — interval, cap, anomaly — each applied to the
    /// previous result.
    fn reduce_stacked(
        &self,
        state: &GuardrailState,
        base: i64,
        now: DateTime<Utc>,
    ) -> (i64, Vec<GuardrailApplication>) {
        let mut applied = Vec::new();
        let mut amount = base;

        if let Some(app) = self.interval_reduction(state, amount, now) {
            amount = app.amount_after;
            applied.push(app);
        }
        if let Some(app) = self.cap_reduction(state, amount) {
            amount = app.amount_after;
            applied.push(app);
        }
        if let Some(app) = self.anomaly_reduction(state, amount) {
            amount = app.amount_after;
            applied.push(app);
        }

        (amount, applied)
    }

    /// Alternative composition: each rule is evaluated from the base amount
    /// and only the strongest reduction applies.
    fn reduce_most_severe(
        &self,
        state: &GuardrailState,
        base: i64,
        now: DateTime<Utc>,
    ) -> (i64, Vec<GuardrailApplication>) {
        let candidates = [
            self.interval_reduction(state, base, now),
            self.cap_reduction(state, base),
            self.anomaly_reduction(state, base),
        ];
        let severest = candidates
            .into_iter()
            .flatten()
            .min_by_key(|app| app.amount_after);

        match severest {
            Some(app) => (app.amount_after, vec![app]),
            None => (base, Vec::new()),
        }
    }

    fn interval_reduction(
        &self,
        state: &GuardrailState,
        amount: i64,
        now: DateTime<Utc>,
    ) -> Option<GuardrailApplication> {
        let last = state.last_earn_at?;
        let elapsed = (now - last).num_seconds();

        let (kept_pct, detail) = if elapsed < self.config.full_block_secs {
            (0, format!("{}s since last earn: fully blocked", elapsed))
        } else if elapsed < self.config.heavy_reduction_secs {
            (25, format!("{}s since last earn: 75% reduction", elapsed))
        } else if elapsed < self.config.light_reduction_secs {
            (50, format!("{}s since last earn: 50% reduction", elapsed))
        } else {
            return None;
        };

        Some(GuardrailApplication {
            rule: GuardrailRule::MinInterval,
            detail,
            amount_before: amount,
            amount_after: amount * kept_pct / 100,
        })
    }

    fn cap_reduction(&self, state: &GuardrailState, amount: i64) -> Option<GuardrailApplication> {
        let headroom = (self.config.daily_cap - state.daily_total).max(0);
        if amount <= headroom {
            return None;
        }
        Some(GuardrailApplication {
            rule: GuardrailRule::DailyCap,
            detail: format!(
                "daily cap {} reached ({} issued today): clamped to headroom {}",
                self.config.daily_cap, state.daily_total, headroom
            ),
            amount_before: amount,
            amount_after: headroom,
        })
    }

    fn anomaly_reduction(
        &self,
        state: &GuardrailState,
        amount: i64,
    ) -> Option<GuardrailApplication> {
        if amount == 0 || state.recent_earns.len() < self.config.hourly_earn_threshold {
            return None;
        }
        let kept = 100 - self.config.anomaly_reduction_pct;
        Some(GuardrailApplication {
            rule: GuardrailRule::Anomaly,
            detail: format!(
                "{} earns in the trailing hour: {}% reduction",
                state.recent_earns.len(),
                self.config.anomaly_reduction_pct
            ),
            amount_before: amount,
            amount_after: amount * kept / 100,
        })
    }
}
