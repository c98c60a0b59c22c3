//! Mines Casino - server-authoritative Mines game with a coin ledger
//!
//! The round engine owns mine layouts, reveal outcomes and prizes; the
//! client only ever sees an opaque round id and the cells it has uncovered.
//! Balances move through the [`ledger::Ledger`], which serializes every
//! mutation per user.

pub mod api;
pub mod config;
pub mod errors;
pub mod games;
pub mod ledger;
pub mod metrics;
pub mod service;
pub mod storage;

pub use config::{CasinoConfig, ConfigLoader, StorageBackend};
pub use errors::{CasinoError, CasinoResult};
pub use games::{RoundId, RoundSnapshot, RoundStatus, UserId};
pub use ledger::{Ledger, LedgerConfig};
pub use service::{MinesService, PlayerProfile};
pub use storage::{CasinoStore, MemoryStore, RocksStore};

use std::sync::Arc;

/// Open the configured store
pub fn open_store(config: &CasinoConfig) -> CasinoResult<Arc<dyn CasinoStore>> {
    Ok(match config.storage.backend {
        StorageBackend::Memory => Arc::new(MemoryStore::new()),
        StorageBackend::RocksDb => {
            std::fs::create_dir_all(&config.storage.data_directory)?;
            Arc::new(RocksStore::open(&config.storage.data_directory)?)
        }
    })
}

/// Wire a service from configuration with the production mine placer.
/// Rounds left in play by a previous run are restored from the store.
pub fn build_service(config: &CasinoConfig, store: Arc<dyn CasinoStore>) -> CasinoResult<MinesService> {
    MinesService::new(
        store,
        Arc::new(games::RandomMinePlacer::new()),
        config.game.clone(),
        config.ledger_config(),
        metrics::CasinoMetrics::new()?,
    )
}
