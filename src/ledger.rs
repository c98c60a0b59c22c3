//! Coin ledger with per-user serialization
//!
//! Every balance mutation for a user happens while holding that user's
//! lock. Locks are tokio mutexes, so waiters queue in FIFO order, and
//! acquisition is bounded by a timeout. Different users never share a lock.
//! A slot nobody holds or waits on is evicted when its guard drops; the next
//! lock reloads the account from the store.

use crate::{
    errors::{CasinoError, CasinoResult, InternalError},
    games::types::{RoundRecord, UserId},
    storage::CasinoStore,
};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

/// Balance floor restored by a top-up
pub const MINIMUM_GRANT: u64 = 100;

/// Durable per-user account state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRecord {
    pub balance: u64,
    #[serde(default)]
    pub games_played: u64,
    #[serde(default)]
    pub total_winnings: u64,
}

#[derive(Debug, Clone)]
pub struct LedgerConfig {
    pub initial_balance: u64,
    pub minimum_grant: u64,
    pub lock_timeout: Duration,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            initial_balance: 100,
            minimum_grant: MINIMUM_GRANT,
            lock_timeout: Duration::from_secs(5),
        }
    }
}

type AccountSlot = Arc<Mutex<Option<AccountRecord>>>;
type AccountSlots = Arc<DashMap<UserId, AccountSlot>>;

/// Authoritative balance store
pub struct Ledger {
    accounts: AccountSlots,
    store: Arc<dyn CasinoStore>,
    config: LedgerConfig,
}

impl Ledger {
    pub fn new(store: Arc<dyn CasinoStore>, config: LedgerConfig) -> Self {
        Self {
            accounts: Arc::new(DashMap::new()),
            store,
            config,
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Accounts currently held or waited on
    pub fn cached_accounts(&self) -> usize {
        self.accounts.len()
    }

    /// Acquire exclusive access to one user's account.
    ///
    /// The account is loaded from the store on first use; a user unknown to
    /// the store opens with `initial_balance`.
    pub async fn lock(&self, user: &UserId) -> CasinoResult<AccountGuard> {
        let slot = self
            .accounts
            .entry(user.clone())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone();

        let held = tokio::time::timeout(self.config.lock_timeout, slot.lock_owned())
            .await
            .map_err(|_| {
                warn!(%user, timeout_ms = self.config.lock_timeout.as_millis() as u64, "Account lock timed out");
                CasinoError::Internal(InternalError::AccountBusy(user.to_string()))
            })?;

        let mut guard = AccountGuard {
            user: user.clone(),
            account: Some(held),
            accounts: self.accounts.clone(),
            store: self.store.clone(),
            minimum_grant: self.config.minimum_grant,
        };

        if let Some(held) = guard.account.as_deref_mut() {
            if held.is_none() {
                let loaded = self.store.load_account(user)?;
                let account = loaded.unwrap_or(AccountRecord {
                    balance: self.config.initial_balance,
                    ..Default::default()
                });
                debug!(%user, balance = account.balance, new = loaded.is_none(), "Loaded account");
                *held = Some(account);
            }
        }
        Ok(guard)
    }

    pub async fn account(&self, user: &UserId) -> CasinoResult<AccountRecord> {
        Ok(self.lock(user).await?.account())
    }

    pub async fn balance(&self, user: &UserId) -> CasinoResult<u64> {
        Ok(self.lock(user).await?.balance())
    }

    pub async fn debit(&self, user: &UserId, amount: u64) -> CasinoResult<u64> {
        self.lock(user).await?.debit(amount)
    }

    pub async fn credit(&self, user: &UserId, amount: u64) -> CasinoResult<u64> {
        self.lock(user).await?.credit(amount)
    }

    pub async fn top_up(&self, user: &UserId) -> CasinoResult<u64> {
        self.lock(user).await?.top_up()
    }
}

/// What else goes to the store in the same write as the account
enum Commit<'a> {
    Account,
    OpenRound(&'a RoundRecord),
    CloseRound(&'a RoundRecord),
}

/// Exclusive handle on one account. Dropping it releases the user's lock.
pub struct AccountGuard {
    user: UserId,
    account: Option<OwnedMutexGuard<Option<AccountRecord>>>,
    accounts: AccountSlots,
    store: Arc<dyn CasinoStore>,
    minimum_grant: u64,
}

impl AccountGuard {
    pub fn user(&self) -> &UserId {
        &self.user
    }

    pub fn account(&self) -> AccountRecord {
        // Populated by Ledger::lock before the guard is handed out
        self.account
            .as_deref()
            .copied()
            .flatten()
            .unwrap_or_default()
    }

    pub fn balance(&self) -> u64 {
        self.account().balance
    }

    /// Persist first, publish second: a failed write leaves the account untouched
    fn commit(&mut self, next: AccountRecord, write: Commit<'_>) -> CasinoResult<()> {
        match write {
            Commit::Account => self.store.save_account(&self.user, &next)?,
            Commit::OpenRound(round) => self.store.open_round(&self.user, &next, round)?,
            Commit::CloseRound(record) => self.store.close_round(&self.user, &next, record)?,
        }
        if let Some(slot) = self.account.as_deref_mut() {
            *slot = Some(next);
        }
        Ok(())
    }

    fn checked_debit(&self, amount: u64) -> CasinoResult<AccountRecord> {
        let current = self.account();
        if current.balance < amount {
            warn!(user = %self.user, balance = current.balance, amount, "Debit rejected");
            return Err(CasinoError::InsufficientFunds {
                balance: current.balance,
                requested: amount,
            });
        }
        Ok(AccountRecord {
            balance: current.balance - amount,
            ..current
        })
    }

    /// Subtract `amount`, rejecting rather than clamping an overdraft
    pub fn debit(&mut self, amount: u64) -> CasinoResult<u64> {
        let next = self.checked_debit(amount)?;
        self.commit(next, Commit::Account)?;
        debug!(user = %self.user, amount, balance = next.balance, "Debited");
        Ok(next.balance)
    }

    /// Take the stake for `round` and persist the round in the same write
    pub fn debit_for_round(&mut self, round: &RoundRecord) -> CasinoResult<u64> {
        let next = self.checked_debit(round.bet)?;
        self.commit(next, Commit::OpenRound(round))?;
        debug!(user = %self.user, round_id = %round.round_id, amount = round.bet, balance = next.balance, "Debited stake");
        Ok(next.balance)
    }

    pub fn credit(&mut self, amount: u64) -> CasinoResult<u64> {
        let current = self.account();
        let balance = current.balance.checked_add(amount).ok_or_else(|| {
            CasinoError::Internal(InternalError::Overflow(format!(
                "crediting {} to {}",
                amount, self.user
            )))
        })?;
        let next = AccountRecord { balance, ..current };
        self.commit(next, Commit::Account)?;
        debug!(user = %self.user, amount, balance, "Credited");
        Ok(balance)
    }

    /// Raise the balance to the minimum grant. Never lowers it.
    pub fn top_up(&mut self) -> CasinoResult<u64> {
        let current = self.account();
        if current.balance >= self.minimum_grant {
            return Ok(current.balance);
        }
        let next = AccountRecord {
            balance: self.minimum_grant,
            ..current
        };
        self.commit(next, Commit::Account)?;
        debug!(user = %self.user, balance = next.balance, "Topped up");
        Ok(next.balance)
    }

    /// Credit the prize of a cashed-out round, bump the profile counters and
    /// archive the round, all in one write
    pub fn settle_win(&mut self, record: &RoundRecord) -> CasinoResult<u64> {
        let prize = record.prize_paid;
        let current = self.account();
        let overflow = || {
            CasinoError::Internal(InternalError::Overflow(format!(
                "settling {} for {}",
                prize, self.user
            )))
        };
        let next = AccountRecord {
            balance: current.balance.checked_add(prize).ok_or_else(overflow)?,
            games_played: current.games_played.saturating_add(1),
            total_winnings: current.total_winnings.saturating_add(prize),
        };
        self.commit(next, Commit::CloseRound(record))?;
        debug!(user = %self.user, prize, balance = next.balance, "Settled win");
        Ok(next.balance)
    }

    /// Record and archive a lost round. No coins move.
    pub fn settle_loss(&mut self, record: &RoundRecord) -> CasinoResult<()> {
        let current = self.account();
        let next = AccountRecord {
            games_played: current.games_played.saturating_add(1),
            ..current
        };
        self.commit(next, Commit::CloseRound(record))
    }
}

impl Drop for AccountGuard {
    fn drop(&mut self) {
        // Release first so the slot's only remaining owner is the map itself
        drop(self.account.take());
        self.accounts
            .remove_if(&self.user, |_, slot| Arc::strong_count(slot) == 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        games::types::{RoundId, RoundStatus},
        storage::MemoryStore,
    };

    fn ledger_with(store: Arc<MemoryStore>) -> Ledger {
        Ledger::new(store, LedgerConfig::default())
    }

    #[tokio::test]
    async fn test_new_account_gets_initial_balance() {
        let ledger = ledger_with(Arc::new(MemoryStore::new()));
        assert_eq!(ledger.balance(&UserId::new("alice")).await.unwrap(), 100);
    }

    #[tokio::test]
    async fn test_debit_and_credit() {
        let store = Arc::new(MemoryStore::new());
        let ledger = ledger_with(store.clone());
        let alice = UserId::new("alice");

        assert_eq!(ledger.debit(&alice, 30).await.unwrap(), 70);
        assert_eq!(ledger.credit(&alice, 5).await.unwrap(), 75);
        assert_eq!(ledger.debit(&alice, 0).await.unwrap(), 75);
        assert_eq!(store.load_account(&alice).unwrap().unwrap().balance, 75);
    }

    #[tokio::test]
    async fn test_overdraft_rejected_without_mutation() {
        let ledger = ledger_with(Arc::new(MemoryStore::new()));
        let alice = UserId::new("alice");

        match ledger.debit(&alice, 101).await {
            Err(CasinoError::InsufficientFunds { balance, requested }) => {
                assert_eq!(balance, 100);
                assert_eq!(requested, 101);
            }
            other => panic!("expected insufficient funds, got {:?}", other),
        }
        assert_eq!(ledger.balance(&alice).await.unwrap(), 100);
    }

    #[tokio::test]
    async fn test_top_up_is_floor_raise() {
        let ledger = ledger_with(Arc::new(MemoryStore::new()));
        let alice = UserId::new("alice");

        ledger.debit(&alice, 95).await.unwrap();
        assert_eq!(ledger.top_up(&alice).await.unwrap(), 100);
        assert_eq!(ledger.top_up(&alice).await.unwrap(), 100);

        ledger.credit(&alice, 50).await.unwrap();
        assert_eq!(ledger.top_up(&alice).await.unwrap(), 150);
    }

    #[tokio::test]
    async fn test_store_failure_leaves_balance_unchanged() {
        let store = Arc::new(MemoryStore::new());
        let ledger = ledger_with(store.clone());
        let alice = UserId::new("alice");
        ledger.debit(&alice, 10).await.unwrap();

        store.set_fail_writes(true);
        assert!(matches!(
            ledger.debit(&alice, 10).await,
            Err(CasinoError::Internal(_))
        ));
        assert!(ledger.credit(&alice, 10).await.is_err());

        store.set_fail_writes(false);
        assert_eq!(ledger.balance(&alice).await.unwrap(), 90);
    }

    fn round(id: &str, status: RoundStatus, prize_paid: u64) -> RoundRecord {
        RoundRecord {
            round_id: RoundId::from(id),
            owner: UserId::new("alice"),
            status,
            bet: 10,
            mine_count: 3,
            mine_positions: vec![0, 1, 2],
            reveal_order: Vec::new(),
            revealed_safe: 0,
            prize_paid,
            started_at: 0,
            finished_at: status.is_terminal().then_some(1),
        }
    }

    #[tokio::test]
    async fn test_settlement_counters() {
        let store = Arc::new(MemoryStore::new());
        let ledger = ledger_with(store.clone());
        let alice = UserId::new("alice");
        {
            let mut guard = ledger.lock(&alice).await.unwrap();
            guard.debit_for_round(&round("r-1", RoundStatus::Playing, 0)).unwrap();
            guard.settle_win(&round("r-1", RoundStatus::CashedOut, 12)).unwrap();
            guard.debit_for_round(&round("r-2", RoundStatus::Playing, 0)).unwrap();
            guard.settle_loss(&round("r-2", RoundStatus::Lost, 0)).unwrap();
        }
        let account = ledger.account(&alice).await.unwrap();
        assert_eq!(account.balance, 92);
        assert_eq!(account.games_played, 2);
        assert_eq!(account.total_winnings, 12);

        assert!(store.load_active_rounds().unwrap().is_empty());
        assert_eq!(store.recent_rounds(&alice, 10).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_stake_and_round_written_together() {
        let store = Arc::new(MemoryStore::new());
        let ledger = ledger_with(store.clone());
        let alice = UserId::new("alice");
        let mut guard = ledger.lock(&alice).await.unwrap();

        store.set_fail_writes(true);
        assert!(guard.debit_for_round(&round("r-1", RoundStatus::Playing, 0)).is_err());
        assert_eq!(guard.balance(), 100);

        store.set_fail_writes(false);
        assert_eq!(
            guard.debit_for_round(&round("r-1", RoundStatus::Playing, 0)).unwrap(),
            90
        );
        assert_eq!(store.load_account(&alice).unwrap().unwrap().balance, 90);
        assert_eq!(store.load_active_rounds().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_idle_slots_are_evicted() {
        let ledger = Arc::new(ledger_with(Arc::new(MemoryStore::new())));

        for n in 0..20 {
            ledger.debit(&UserId::new(format!("user-{}", n)), 1).await.unwrap();
        }
        assert_eq!(ledger.cached_accounts(), 0);
        assert_eq!(ledger.balance(&UserId::new("user-3")).await.unwrap(), 99);

        // A slot with a waiter outlives its holder's release
        let alice = UserId::new("alice");
        let held = ledger.lock(&alice).await.unwrap();
        let waiter = {
            let ledger = ledger.clone();
            let alice = alice.clone();
            tokio::spawn(async move { ledger.lock(&alice).await.map(|guard| guard.balance()) })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(held);
        assert_eq!(ledger.cached_accounts(), 1);

        assert_eq!(waiter.await.unwrap().unwrap(), 100);
        assert_eq!(ledger.cached_accounts(), 0);
    }

    #[tokio::test]
    async fn test_lock_timeout() {
        let ledger = Ledger::new(
            Arc::new(MemoryStore::new()),
            LedgerConfig {
                lock_timeout: Duration::from_millis(20),
                ..Default::default()
            },
        );
        let alice = UserId::new("alice");
        let _held = ledger.lock(&alice).await.unwrap();

        assert!(matches!(
            ledger.lock(&alice).await,
            Err(CasinoError::Internal(InternalError::AccountBusy(_)))
        ));
        // Other users are not blocked
        assert!(ledger.lock(&UserId::new("bob")).await.is_ok());
    }

    #[tokio::test]
    async fn test_concurrent_debits_never_overdraw() {
        let ledger = Arc::new(ledger_with(Arc::new(MemoryStore::new())));
        let alice = UserId::new("alice");

        let tasks: Vec<_> = (0..50)
            .map(|_| {
                let ledger = ledger.clone();
                let alice = alice.clone();
                tokio::spawn(async move { ledger.debit(&alice, 3).await.is_ok() })
            })
            .collect();

        let mut succeeded = 0;
        for task in tasks {
            if task.await.unwrap() {
                succeeded += 1;
            }
        }
        assert_eq!(succeeded, 33);
        assert_eq!(ledger.balance(&alice).await.unwrap(), 1);
    }
}
