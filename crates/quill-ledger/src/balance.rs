use std::collections::HashMap;
use std::sync::RwLock;

use quill_types::UserId;

use crate::error::BalanceError;

/// Read/write primitive for the cached balance on a user record.
///
/// The cached balance is owned by the surrounding product (a column on the
/// user row); this seam is how the ledger engine mutates it. Only the
/// engine writes here, and only in live mode.
pub trait CachedBalanceStore: Send + Sync {
    /// Current cached balance; 0 for a user with no record yet.
    fn get(&self, user: &UserId) -> Result<i64, BalanceError>;

    fn set(&self, user: &UserId, balance: i64) -> Result<(), BalanceError>;

    /// Users with a cached balance record.
    fn users(&self) -> Result<Vec<UserId>, BalanceError>;
}

/// In-memory cached balance store.
#[derive(Default)]
pub struct InMemoryBalanceStore {
    balances: RwLock<HashMap<UserId, i64>>,
}

impl InMemoryBalanceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CachedBalanceStore for InMemoryBalanceStore {
    fn get(&self, user: &UserId) -> Result<i64, BalanceError> {
        let balances = self.balances.read().map_err(|_| BalanceError::Lock)?;
        Ok(balances.get(user).copied().unwrap_or(0))
    }

    fn set(&self, user: &UserId, balance: i64) -> Result<(), BalanceError> {
        let mut balances = self.balances.write().map_err(|_| BalanceError::Lock)?;
        balances.insert(user.clone(), balance);
        Ok(())
    }

    fn users(&self) -> Result<Vec<UserId>, BalanceError> {
        let balances = self.balances.read().map_err(|_| BalanceError::Lock)?;
        Ok(balances.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_user_reads_zero() {
        let store = InMemoryBalanceStore::new();
        assert_eq!(store.get(&UserId::new("creator-1")).unwrap(), 0);
    }

    #[test]
    fn set_then_get_round_trips() {
        let store = InMemoryBalanceStore::new();
        let user = UserId::new("creator-1");
        store.set(&user, 120).unwrap();
        assert_eq!(store.get(&user).unwrap(), 120);
        assert_eq!(store.users().unwrap(), vec![user]);
    }
}
