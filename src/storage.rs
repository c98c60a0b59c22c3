//! Persistence for balances and rounds
//!
//! Rounds in play are stored alongside the account that paid for them, so a
//! restart never loses a debited stake. Opening and closing a round each
//! commit the account and the round together in one write. Per-user
//! ordering is provided by the ledger lock, not by the store.

use crate::{
    errors::{CasinoError, CasinoResult, InternalError},
    games::types::{RoundId, RoundRecord, UserId},
    ledger::AccountRecord,
};
use dashmap::DashMap;
use rocksdb::{Direction, IteratorMode, Options, WriteBatch, DB};
use std::{
    path::Path,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

const ACCOUNT_PREFIX: &str = "account:";
const ACTIVE_ROUND_PREFIX: &str = "round:active:";
const ROUND_PREFIX: &str = "round:record:";
const ROUND_INDEX_PREFIX: &str = "round:index:";

/// Storage backend used by the ledger and the round registry
pub trait CasinoStore: Send + Sync {
    fn load_account(&self, user: &UserId) -> CasinoResult<Option<AccountRecord>>;

    fn save_account(&self, user: &UserId, account: &AccountRecord) -> CasinoResult<()>;

    /// Debited account and the new round in play, atomically
    fn open_round(
        &self,
        user: &UserId,
        account: &AccountRecord,
        round: &RoundRecord,
    ) -> CasinoResult<()>;

    /// Overwrite the stored state of a round in play
    fn save_active_round(&self, round: &RoundRecord) -> CasinoResult<()>;

    /// Settled account plus the archived round, dropping it from the active set
    fn close_round(
        &self,
        user: &UserId,
        account: &AccountRecord,
        record: &RoundRecord,
    ) -> CasinoResult<()>;

    /// Every round that was not closed, for all users
    fn load_active_rounds(&self) -> CasinoResult<Vec<RoundRecord>>;

    /// Archived round
    fn load_round(&self, round_id: &RoundId) -> CasinoResult<Option<RoundRecord>>;

    /// Newest first
    fn recent_rounds(&self, user: &UserId, limit: usize) -> CasinoResult<Vec<RoundRecord>>;
}

/// In-process store. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryStore {
    accounts: DashMap<UserId, AccountRecord>,
    active: DashMap<RoundId, RoundRecord>,
    rounds: DashMap<RoundId, RoundRecord>,
    history: DashMap<UserId, Vec<RoundId>>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail, to exercise fault paths
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> CasinoResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(InternalError::WriteFailed("store unavailable".to_string()).into());
        }
        Ok(())
    }
}

impl CasinoStore for MemoryStore {
    fn load_account(&self, user: &UserId) -> CasinoResult<Option<AccountRecord>> {
        Ok(self.accounts.get(user).map(|a| *a))
    }

    fn save_account(&self, user: &UserId, account: &AccountRecord) -> CasinoResult<()> {
        self.check_writable()?;
        self.accounts.insert(user.clone(), *account);
        Ok(())
    }

    fn open_round(
        &self,
        user: &UserId,
        account: &AccountRecord,
        round: &RoundRecord,
    ) -> CasinoResult<()> {
        self.check_writable()?;
        self.accounts.insert(user.clone(), *account);
        self.active.insert(round.round_id.clone(), round.clone());
        Ok(())
    }

    fn save_active_round(&self, round: &RoundRecord) -> CasinoResult<()> {
        self.check_writable()?;
        self.active.insert(round.round_id.clone(), round.clone());
        Ok(())
    }

    fn close_round(
        &self,
        user: &UserId,
        account: &AccountRecord,
        record: &RoundRecord,
    ) -> CasinoResult<()> {
        self.check_writable()?;
        self.accounts.insert(user.clone(), *account);
        self.active.remove(&record.round_id);
        if self
            .rounds
            .insert(record.round_id.clone(), record.clone())
            .is_none()
        {
            self.history
                .entry(record.owner.clone())
                .or_default()
                .push(record.round_id.clone());
        }
        Ok(())
    }

    fn load_active_rounds(&self) -> CasinoResult<Vec<RoundRecord>> {
        Ok(self.active.iter().map(|r| r.value().clone()).collect())
    }

    fn load_round(&self, round_id: &RoundId) -> CasinoResult<Option<RoundRecord>> {
        Ok(self.rounds.get(round_id).map(|r| r.clone()))
    }

    fn recent_rounds(&self, user: &UserId, limit: usize) -> CasinoResult<Vec<RoundRecord>> {
        let Some(ids) = self.history.get(user) else {
            return Ok(Vec::new());
        };
        Ok(ids
            .iter()
            .rev()
            .filter_map(|id| self.rounds.get(id).map(|r| r.clone()))
            .take(limit)
            .collect())
    }
}

fn account_key(user: &UserId) -> Vec<u8> {
    format!("{}{}", ACCOUNT_PREFIX, user).into_bytes()
}

fn active_round_key(round_id: &RoundId) -> Vec<u8> {
    format!("{}{}", ACTIVE_ROUND_PREFIX, round_id).into_bytes()
}

fn round_key(round_id: &RoundId) -> Vec<u8> {
    format!("{}{}", ROUND_PREFIX, round_id).into_bytes()
}

fn round_index_prefix(user: &UserId) -> Vec<u8> {
    // Hex keeps user ids containing ':' from colliding with another user's prefix
    format!("{}{}:", ROUND_INDEX_PREFIX, hex::encode(user.as_str())).into_bytes()
}

fn round_index_key(user: &UserId, finished_at: i64, round_id: &RoundId) -> Vec<u8> {
    // Newest first: inverted timestamp as the primary sort key.
    // Key layout: prefix | inv_ts(be) | round_id
    let inv_ts = u64::MAX - finished_at.max(0) as u64;
    let mut key = round_index_prefix(user);
    key.extend_from_slice(&inv_ts.to_be_bytes());
    key.extend_from_slice(round_id.as_str().as_bytes());
    key
}

fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8], what: &str) -> CasinoResult<T> {
    serde_json::from_slice(bytes).map_err(|e| {
        CasinoError::Internal(InternalError::CorruptedData(format!(
            "Failed to decode {}: {}",
            what, e
        )))
    })
}

fn encode<T: serde::Serialize>(value: &T, what: &str) -> CasinoResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| {
        CasinoError::Internal(InternalError::WriteFailed(format!(
            "Failed to encode {}: {}",
            what, e
        )))
    })
}

/// RocksDB-backed store
#[derive(Clone)]
pub struct RocksStore {
    db: Arc<DB>,
}

impl RocksStore {
    pub fn open<P: AsRef<Path>>(path: P) -> CasinoResult<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);

        let db = DB::open(&opts, path)?;
        Ok(Self { db: Arc::new(db) })
    }

    fn get(&self, key: &[u8]) -> CasinoResult<Option<Vec<u8>>> {
        self.db
            .get(key)
            .map_err(|e| CasinoError::Internal(InternalError::ReadFailed(e.to_string())))
    }

    fn scan_prefix(&self, prefix: &[u8], limit: usize) -> CasinoResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut entries = Vec::new();
        for item in self.db.iterator(IteratorMode::From(prefix, Direction::Forward)) {
            let (key, value) =
                item.map_err(|e| CasinoError::Internal(InternalError::ReadFailed(e.to_string())))?;
            if !key.starts_with(prefix) || entries.len() >= limit {
                break;
            }
            entries.push((key.to_vec(), value.to_vec()));
        }
        Ok(entries)
    }
}

impl CasinoStore for RocksStore {
    fn load_account(&self, user: &UserId) -> CasinoResult<Option<AccountRecord>> {
        match self.get(&account_key(user))? {
            Some(bytes) => Ok(Some(decode(&bytes, &format!("account {}", user))?)),
            None => Ok(None),
        }
    }

    fn save_account(&self, user: &UserId, account: &AccountRecord) -> CasinoResult<()> {
        let bytes = encode(account, &format!("account {}", user))?;
        self.db.put(account_key(user), bytes)?;
        Ok(())
    }

    fn open_round(
        &self,
        user: &UserId,
        account: &AccountRecord,
        round: &RoundRecord,
    ) -> CasinoResult<()> {
        let mut batch = WriteBatch::default();
        batch.put(account_key(user), encode(account, &format!("account {}", user))?);
        batch.put(
            active_round_key(&round.round_id),
            encode(round, &format!("round {}", round.round_id))?,
        );
        self.db.write(batch)?;

        tracing::debug!(round_id = %round.round_id, %user, "Opened round");
        Ok(())
    }

    fn save_active_round(&self, round: &RoundRecord) -> CasinoResult<()> {
        let bytes = encode(round, &format!("round {}", round.round_id))?;
        self.db.put(active_round_key(&round.round_id), bytes)?;
        Ok(())
    }

    fn close_round(
        &self,
        user: &UserId,
        account: &AccountRecord,
        record: &RoundRecord,
    ) -> CasinoResult<()> {
        let finished_at = record.finished_at.unwrap_or(record.started_at);

        let mut batch = WriteBatch::default();
        batch.put(account_key(user), encode(account, &format!("account {}", user))?);
        batch.put(
            round_key(&record.round_id),
            encode(record, &format!("round {}", record.round_id))?,
        );
        batch.put(
            round_index_key(&record.owner, finished_at, &record.round_id),
            record.round_id.as_str().as_bytes(),
        );
        batch.delete(active_round_key(&record.round_id));
        self.db.write(batch)?;

        tracing::debug!(round_id = %record.round_id, owner = %record.owner, "Archived round");
        Ok(())
    }

    fn load_active_rounds(&self) -> CasinoResult<Vec<RoundRecord>> {
        self.scan_prefix(ACTIVE_ROUND_PREFIX.as_bytes(), usize::MAX)?
            .into_iter()
            .map(|(key, value)| decode(&value, &String::from_utf8_lossy(&key)))
            .collect()
    }

    fn load_round(&self, round_id: &RoundId) -> CasinoResult<Option<RoundRecord>> {
        match self.get(&round_key(round_id))? {
            Some(bytes) => Ok(Some(decode(&bytes, &format!("round {}", round_id))?)),
            None => Ok(None),
        }
    }

    fn recent_rounds(&self, user: &UserId, limit: usize) -> CasinoResult<Vec<RoundRecord>> {
        let prefix = round_index_prefix(user);
        let entries = self.scan_prefix(&prefix, limit)?;

        let mut records = Vec::with_capacity(entries.len());
        for (key, _) in entries {
            // round id follows the 8-byte inverted timestamp
            let Some(id_bytes) = key.get(prefix.len() + 8..) else {
                continue;
            };
            let round_id = RoundId(String::from_utf8_lossy(id_bytes).into_owned());
            match self.load_round(&round_id)? {
                Some(record) => records.push(record),
                None => tracing::warn!(%round_id, "Round index entry without record"),
            }
        }
        Ok(records)
    }
}
