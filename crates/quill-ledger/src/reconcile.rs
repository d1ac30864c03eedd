use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use quill_types::{LedgerEventType, LedgerMode, UserId};

use crate::engine::{AppendRequest, TokenLedgerEngine};
use crate::error::LedgerError;

/// Ledger reason code attached to reconciliation adjustments.
pub const RECONCILIATION: &str = "reconciliation";

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub users_checked: usize,
    pub mismatches_found: usize,
    pub adjustments_made: usize,
}

/// Detects and corrects drift between the ledger-derived balance and the
/// cached balance.
///
/// For each user, drift is `cached − Σ entry amounts`. A nonzero drift
/// always produces an ADJUSTMENT of `−drift`; in live mode the append
/// itself rewrites the cached balance to the post-adjustment chain value,
/// so an immediate second run finds zero drift. In shadow mode the
/// adjustment lands in the pending store and the drift is only logged; off
/// mode reports without correcting.
pub struct Reconciler {
    engine: Arc<TokenLedgerEngine>,
}

impl Reconciler {
    pub fn new(engine: Arc<TokenLedgerEngine>) -> Self {
        Self { engine }
    }

    /// One reconciliation pass over every known user. Callable on demand
    /// or from a scheduler.
    pub async fn run(&self) -> Result<ReconciliationReport, LedgerError> {
        let mut users = self.engine.users().await;
        for user in self.engine.balances().users()? {
            if !users.contains(&user) {
                users.push(user);
            }
        }

        let mut report = ReconciliationReport {
            users_checked: users.len(),
            ..ReconciliationReport::default()
        };

        for user in users {
            self.engine.verify_user(&user).await?;

            let ledger_balance = self.engine.balance(&user).await;
            let cached = self.engine.balances().get(&user)?;
            let drift = cached - ledger_balance;
            if drift == 0 {
                continue;
            }
            report.mismatches_found += 1;

            match self.engine.mode() {
                LedgerMode::Off => {
                    warn!(
                        user = %user,
                        cached,
                        ledger_balance,
                        drift,
                        "balance drift detected; ledger off, reporting only"
                    );
                }
                LedgerMode::Shadow => {
                    warn!(
                        user = %user,
                        cached,
                        ledger_balance,
                        drift,
                        "balance drift detected; recording pending adjustment (shadow mode)"
                    );
                    self.append_adjustment(&user, drift, cached, ledger_balance)
                        .await?;
                    report.adjustments_made += 1;
                }
                LedgerMode::Live => {
                    warn!(
                        user = %user,
                        cached,
                        ledger_balance,
                        drift,
                        "balance drift detected; appending correction"
                    );
                    self.append_adjustment(&user, drift, cached, ledger_balance)
                        .await?;
                    report.adjustments_made += 1;
                }
            }
        }

        info!(
            users_checked = report.users_checked,
            mismatches = report.mismatches_found,
            adjustments = report.adjustments_made,
            "reconciliation pass finished"
        );
        Ok(report)
    }

    async fn append_adjustment(
        &self,
        user: &UserId,
        drift: i64,
        cached: i64,
        ledger_balance: i64,
    ) -> Result<(), LedgerError> {
        let metadata = serde_json::json!({
            "cached_balance": cached,
            "ledger_balance": ledger_balance,
            "drift": drift,
        });
        // In live mode the append rewrites the cached balance to the new
        // chain value as part of the same atomic commit.
        self.engine
            .append(AppendRequest {
                user_id: user.clone(),
                event_type: LedgerEventType::Adjustment,
                reason_code: RECONCILIATION.to_string(),
                amount: -drift,
                metadata,
                idempotency_key: format!("reconcile:{}:{}", user.0, uuid::Uuid::new_v4()),
            })
            .await?;
        Ok(())
    }
}
