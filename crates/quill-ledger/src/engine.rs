use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use quill_types::{EntryId, LedgerEntry, LedgerEventType, LedgerMode, PendingEntry, UserId};

use crate::balance::CachedBalanceStore;
use crate::error::LedgerError;
use crate::storage::PostgresLedgerStore;

/// One append request.
#[derive(Clone, Debug)]
pub struct AppendRequest {
    pub user_id: UserId,
    pub event_type: LedgerEventType,
    pub reason_code: String,
    pub amount: i64,
    pub metadata: Value,
    /// Composed from the request and receipt ids on the issuance path. A
    /// repeated key returns the original result instead of a second entry.
    pub idempotency_key: String,
}

/// Result of an append.
#[derive(Clone, Debug)]
pub enum LedgerResult {
    /// The ledger is off; nothing was recorded.
    Disabled,
    /// Live mode: the entry exists with its balance applied.
    Applied { entry: LedgerEntry, replayed: bool },
    /// Shadow mode: the intended effect was recorded; no balance changed.
    Shadowed { entry: PendingEntry, replayed: bool },
}

impl LedgerResult {
    fn replay(&self) -> Self {
        match self {
            LedgerResult::Disabled => LedgerResult::Disabled,
            LedgerResult::Applied { entry, .. } => LedgerResult::Applied {
                entry: entry.clone(),
                replayed: true,
            },
            LedgerResult::Shadowed { entry, .. } => LedgerResult::Shadowed {
                entry: entry.clone(),
                replayed: true,
            },
        }
    }
}

#[derive(Default)]
struct EngineState {
    entries: Vec<LedgerEntry>,
    pending: Vec<PendingEntry>,
    idempotency: HashMap<String, LedgerResult>,
}

/// Append-only, idempotent token ledger.
///
/// Design choice: no in-place mutation APIs are exposed. Every balance
/// change is an additional entry with its `balance_after` computed and
/// committed in the same critical section as the cached balance update, so
/// an entry either fully exists or does not exist at all.
///
/// The in-memory chain is authoritative; an optional Postgres mirror is
/// written before each in-memory commit and hydrated on startup.
pub struct TokenLedgerEngine {
    mode: LedgerMode,
    state: Mutex<EngineState>,
    balances: Arc<dyn CachedBalanceStore>,
    mirror: Option<PostgresLedgerStore>,
}

impl TokenLedgerEngine {
    pub fn new(mode: LedgerMode, balances: Arc<dyn CachedBalanceStore>) -> Self {
        Self {
            mode,
            state: Mutex::new(EngineState::default()),
            balances,
            mirror: None,
        }
    }

    /// Mirror every committed entry to durable storage. The schema must
    /// already exist (see [`PostgresLedgerStore::migrate`]); nothing is
    /// created on the request path.
    pub fn with_mirror(
        mode: LedgerMode,
        balances: Arc<dyn CachedBalanceStore>,
        mirror: PostgresLedgerStore,
    ) -> Self {
        Self {
            mode,
            state: Mutex::new(EngineState::default()),
            balances,
            mirror: Some(mirror),
        }
    }

    pub fn mode(&self) -> LedgerMode {
        self.mode
    }

    pub fn balances(&self) -> &Arc<dyn CachedBalanceStore> {
        &self.balances
    }

    /// Load previously mirrored entries into the in-memory chain and verify
    /// per-user arithmetic. Returns the number of entries hydrated.
    pub async fn hydrate(&self) -> Result<usize, LedgerError> {
        let mirror = match &self.mirror {
            Some(mirror) => mirror,
            None => return Ok(0),
        };
        let entries = mirror.load_entries().await?;
        let mut state = self.state.lock().await;
        if !state.entries.is_empty() {
            return Err(LedgerError::Storage(
                "hydrate called on a non-empty ledger".to_string(),
            ));
        }
        state.entries = entries;
        let count = state.entries.len();
        drop(state);

        for user in self.users().await {
            self.verify_user(&user).await?;
        }
        info!(entries = count, "ledger hydrated from mirror");
        Ok(count)
    }

    /// Append one balance-changing entry.
    ///
    /// Off mode is a no-op; shadow mode records a pending entry only; live
    /// mode appends the entry and updates the cached balance atomically. A
    /// repeated idempotency key returns the original result.
    pub async fn append(&self, request: AppendRequest) -> Result<LedgerResult, LedgerError> {
        if self.mode == LedgerMode::Off {
            debug!(user = %request.user_id, "ledger disabled; append skipped");
            return Ok(LedgerResult::Disabled);
        }
        validate_amount(&request)?;

        let mut state = self.state.lock().await;
        if let Some(prior) = state.idempotency.get(&request.idempotency_key) {
            debug!(
                key = %request.idempotency_key,
                "duplicate idempotency key; replaying original result"
            );
            return Ok(prior.replay());
        }

        let result = match self.mode {
            LedgerMode::Off => LedgerResult::Disabled,
            LedgerMode::Shadow => {
                let entry = PendingEntry {
                    id: EntryId::new(),
                    user_id: request.user_id.clone(),
                    event_type: request.event_type,
                    reason_code: request.reason_code.clone(),
                    amount: request.amount,
                    metadata: request.metadata.clone(),
                    created_at: Utc::now(),
                };
                if let Some(mirror) = &self.mirror {
                    mirror.insert_pending(&entry).await?;
                }
                state.pending.push(entry.clone());
                info!(
                    user = %entry.user_id,
                    amount = entry.amount,
                    event = %entry.event_type,
                    "pending entry recorded (shadow mode)"
                );
                LedgerResult::Shadowed {
                    entry,
                    replayed: false,
                }
            }
            LedgerMode::Live => {
                let previous = last_balance(&state.entries, &request.user_id);
                let entry = LedgerEntry {
                    id: EntryId::new(),
                    user_id: request.user_id.clone(),
                    event_type: request.event_type,
                    reason_code: request.reason_code.clone(),
                    amount: request.amount,
                    balance_after: previous + request.amount,
                    metadata: request.metadata.clone(),
                    created_at: Utc::now(),
                };

                // Durability and the cached balance both settle before the
                // in-memory commit; any failure here leaves no entry behind.
                if let Some(mirror) = &self.mirror {
                    mirror.insert_entry(&entry).await?;
                }
                if let Err(err) = self.balances.set(&request.user_id, entry.balance_after) {
                    warn!(
                        user = %request.user_id,
                        error = %err,
                        "cached balance write failed; entry rolled back"
                    );
                    return Err(LedgerError::Balance(err));
                }

                state.entries.push(entry.clone());
                info!(
                    user = %entry.user_id,
                    amount = entry.amount,
                    balance_after = entry.balance_after,
                    event = %entry.event_type,
                    reason = %entry.reason_code,
                    "ledger entry appended"
                );
                LedgerResult::Applied {
                    entry,
                    replayed: false,
                }
            }
        };

        state
            .idempotency
            .insert(request.idempotency_key.clone(), result.clone());
        Ok(result)
    }

    /// Ledger-derived balance: the sum of all entry amounts for a user.
    pub async fn balance(&self, user: &UserId) -> i64 {
        let state = self.state.lock().await;
        state
            .entries
            .iter()
            .filter(|e| e.user_id == *user)
            .map(|e| e.amount)
            .sum()
    }

    pub async fn entries_for(&self, user: &UserId) -> Vec<LedgerEntry> {
        let state = self.state.lock().await;
        state
            .entries
            .iter()
            .filter(|e| e.user_id == *user)
            .cloned()
            .collect()
    }

    pub async fn pending_for(&self, user: &UserId) -> Vec<PendingEntry> {
        let state = self.state.lock().await;
        state
            .pending
            .iter()
            .filter(|e| e.user_id == *user)
            .cloned()
            .collect()
    }

    /// Users with at least one ledger entry.
    pub async fn users(&self) -> Vec<UserId> {
        let state = self.state.lock().await;
        let mut users: Vec<UserId> = Vec::new();
        for entry in &state.entries {
            if !users.contains(&entry.user_id) {
                users.push(entry.user_id.clone());
            }
        }
        users
    }

    /// Verify the arithmetic chain for one user: every entry's
    /// `balance_after` must equal the running sum of amounts.
    pub async fn verify_user(&self, user: &UserId) -> Result<(), LedgerError> {
        let state = self.state.lock().await;
        let mut running = 0i64;
        for entry in state.entries.iter().filter(|e| e.user_id == *user) {
            running += entry.amount;
            if entry.balance_after != running {
                return Err(LedgerError::IntegrityViolation {
                    user: user.clone(),
                    detail: format!(
                        "entry {} has balance_after {} but running sum is {}",
                        entry.id, entry.balance_after, running
                    ),
                });
            }
        }
        Ok(())
    }
}

fn last_balance(entries: &[LedgerEntry], user: &UserId) -> i64 {
    entries
        .iter()
        .rev()
        .find(|e| e.user_id == *user)
        .map(|e| e.balance_after)
        .unwrap_or(0)
}

/// EARN increases a balance; SPEND and PENALTY decrease it. The sign must
/// match the event kind — a mismatch is rejected, never coerced.
fn validate_amount(request: &AppendRequest) -> Result<(), LedgerError> {
    let valid = match request.event_type {
        LedgerEventType::Earn => request.amount > 0,
        LedgerEventType::Spend | LedgerEventType::Penalty => request.amount < 0,
        LedgerEventType::Adjustment => request.amount != 0,
    };
    if valid {
        Ok(())
    } else {
        Err(LedgerError::InvalidAmount {
            event_type: request.event_type,
            amount: request.amount,
        })
    }
}
