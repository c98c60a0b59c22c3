//! Server-authoritative Mines service
//!
//! Every state transition for a user runs while that user's ledger lock is
//! held, so start, reveal, cash-out and top-up for one account are strictly
//! ordered. Rounds of different users never contend.
//!
//! Transitions work on a copy of the round taken out of the registry. The
//! copy is persisted first and only then published back, so no registry
//! shard stays locked while the store is written.

use crate::{
    config::GameConfig,
    errors::{CasinoResult, RoundStateError, ValidationError},
    games::{
        payout::{self, PayoutStep},
        MinePlacer, RevealOutcome, Round, RoundId, RoundParams, RoundRecord, RoundSnapshot,
        RoundStatus, UserId,
    },
    ledger::{AccountGuard, Ledger, LedgerConfig},
    metrics::CasinoMetrics,
    storage::CasinoStore,
};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Balance and statistics shown to the player
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerProfile {
    pub user_id: UserId,
    pub balance: u64,
    pub games_played: u64,
    pub total_winnings: u64,
    pub active_rounds: usize,
}

pub struct MinesService {
    ledger: Ledger,
    /// Rounds in play, plus lost rounds whose bookkeeping is still pending
    rounds: DashMap<RoundId, Round>,
    by_user: DashMap<UserId, Vec<RoundId>>,
    store: Arc<dyn CasinoStore>,
    placer: Arc<dyn MinePlacer>,
    metrics: CasinoMetrics,
    game: GameConfig,
}

impl MinesService {
    /// Build the service and bring back every round the store still holds in play
    pub fn new(
        store: Arc<dyn CasinoStore>,
        placer: Arc<dyn MinePlacer>,
        game: GameConfig,
        ledger: LedgerConfig,
        metrics: CasinoMetrics,
    ) -> CasinoResult<Self> {
        let service = Self {
            ledger: Ledger::new(store.clone(), ledger),
            rounds: DashMap::new(),
            by_user: DashMap::new(),
            store,
            placer,
            metrics,
            game,
        };
        service.restore_rounds()?;
        Ok(service)
    }

    fn restore_rounds(&self) -> CasinoResult<()> {
        let records = self.store.load_active_rounds()?;
        let restored = records.len();
        for record in records {
            let round = Round::restore(record)?;
            if round.status() == RoundStatus::Playing {
                self.metrics.active_rounds.inc();
            }
            debug!(round_id = %round.id(), owner = %round.owner(), status = %round.status(), "Restored round");
            self.register(round);
        }
        if restored > 0 {
            info!(restored, "Restored rounds from the store");
        }
        Ok(())
    }

    pub fn metrics(&self) -> &CasinoMetrics {
        &self.metrics
    }

    pub fn game_config(&self) -> &GameConfig {
        &self.game
    }

    fn observe<T>(&self, result: CasinoResult<T>) -> CasinoResult<T> {
        if let Err(ref e) = result {
            self.metrics.record_rejection(e);
            debug!(kind = e.kind(), "Request rejected: {}", e);
        }
        result
    }

    fn register(&self, round: Round) {
        self.by_user
            .entry(round.owner().clone())
            .or_default()
            .push(round.id().clone());
        self.rounds.insert(round.id().clone(), round);
    }

    fn unregister(&self, owner: &UserId, round_id: &RoundId) {
        self.rounds.remove(round_id);
        if let Some(mut ids) = self.by_user.get_mut(owner) {
            ids.retain(|id| id != round_id);
        }
        self.by_user.remove_if(owner, |_, ids| ids.is_empty());
    }

    fn user_round_ids(&self, user: &UserId) -> Vec<RoundId> {
        self.by_user
            .get(user)
            .map(|ids| ids.value().clone())
            .unwrap_or_default()
    }

    fn user_rounds(&self, user: &UserId) -> Vec<Round> {
        self.user_round_ids(user)
            .iter()
            .filter_map(|id| self.rounds.get(id).map(|r| r.value().clone()))
            .collect()
    }

    fn playing_count(&self, user: &UserId) -> usize {
        self.user_rounds(user)
            .iter()
            .filter(|r| r.status() == RoundStatus::Playing)
            .count()
    }

    /// Copy of a registered round. A round owned by someone else is reported
    /// exactly like a missing one.
    fn owned_round(&self, user: &UserId, round_id: &RoundId) -> CasinoResult<Round> {
        let registered = self.rounds.get(round_id).map(|r| r.value().clone());
        match registered {
            Some(round) if round.owner() == user => return Ok(round),
            Some(_) => return Err(RoundStateError::NotFound(round_id.to_string()).into()),
            None => {}
        }
        match self.store.load_round(round_id)? {
            Some(record) if &record.owner == user => {
                Err(RoundStateError::AlreadyFinished(round_id.to_string()).into())
            }
            _ => Err(RoundStateError::NotFound(round_id.to_string()).into()),
        }
    }

    /// Retry the bookkeeping of lost rounds whose first write failed
    fn flush_pending(&self, account: &mut AccountGuard) {
        for round in self.user_rounds(account.user()) {
            if round.status() != RoundStatus::Lost {
                continue;
            }
            let record = round.to_record();
            match account.settle_loss(&record) {
                Ok(()) => {
                    self.unregister(&record.owner, &record.round_id);
                    info!(user = %record.owner, round_id = %record.round_id, "Recorded pending lost round");
                }
                Err(e) => {
                    warn!(user = %record.owner, round_id = %record.round_id, "Lost round still pending: {}", e);
                    return;
                }
            }
        }
    }

    /// Debit the bet and put a fresh board in play
    pub async fn start_round(
        &self,
        user: &UserId,
        bet: u64,
        mine_count: usize,
    ) -> CasinoResult<RoundSnapshot> {
        let result = self.start_round_locked(user, bet, mine_count).await;
        self.observe(result)
    }

    async fn start_round_locked(
        &self,
        user: &UserId,
        bet: u64,
        mine_count: usize,
    ) -> CasinoResult<RoundSnapshot> {
        let params = RoundParams::new(bet, mine_count, self.game.min_bet, self.game.max_bet)?;
        let mut account = self.ledger.lock(user).await?;
        self.flush_pending(&mut account);

        if self.playing_count(user) >= self.game.max_active_rounds_per_user {
            return Err(
                ValidationError::TooManyActiveRounds(self.game.max_active_rounds_per_user).into(),
            );
        }

        // The board is drawn first but only registered once the stake and
        // the round are both stored
        let round = Round::start(RoundId::generate(), user.clone(), params, self.placer.as_ref())?;
        let balance = account.debit_for_round(&round.to_record())?;

        let snapshot = round.snapshot();
        let round_id = round.id().clone();
        self.register(round);

        self.metrics.rounds_started.inc();
        self.metrics.active_rounds.inc();
        self.metrics.coins_wagered.inc_by(bet);
        info!(%user, %round_id, bet, mine_count, balance, "Round started");
        Ok(snapshot)
    }

    /// Uncover one cell of a round in play
    pub async fn reveal(
        &self,
        user: &UserId,
        round_id: &RoundId,
        index: usize,
    ) -> CasinoResult<RoundSnapshot> {
        let result = self.reveal_locked(user, round_id, index).await;
        self.observe(result)
    }

    async fn reveal_locked(
        &self,
        user: &UserId,
        round_id: &RoundId,
        index: usize,
    ) -> CasinoResult<RoundSnapshot> {
        let mut account = self.ledger.lock(user).await?;
        self.flush_pending(&mut account);
        let mut round = self.owned_round(user, round_id)?;

        match round.reveal(index)? {
            RevealOutcome::Mine => {
                info!(%user, %round_id, index, bet = round.bet(), "Mine hit, round lost");
                self.metrics.rounds_finished.with_label_values(&["lost"]).inc();
                self.metrics.active_rounds.dec();
                let snapshot = round.snapshot();
                self.finish_loss(&mut account, round);
                Ok(snapshot)
            }
            RevealOutcome::Safe { prize, cleared } => {
                // Nothing is published unless the reveal is stored
                self.store.save_active_round(&round.to_record())?;
                debug!(%user, %round_id, index, prize, revealed = round.revealed_safe(), "Safe reveal");
                let snapshot = round.snapshot();
                self.rounds.insert(round_id.clone(), round.clone());

                if !(cleared && self.game.auto_cash_out_on_clear) {
                    return Ok(snapshot);
                }
                info!(%user, %round_id, "Board cleared, settling automatically");
                match self.settle_cash_out(&mut account, round) {
                    Ok(done) => Ok(done),
                    Err(e) => {
                        // The reveal already stands; the player can cash out again
                        warn!(%user, %round_id, "Automatic cash-out failed, round left in play: {}", e);
                        Ok(snapshot)
                    }
                }
            }
        }
    }

    /// The loss stands even if bookkeeping fails: undoing it would tell the
    /// client where a mine is. A failed write is retried by the user's next
    /// operation.
    fn finish_loss(&self, account: &mut AccountGuard, round: Round) {
        let record = round.to_record();
        match account.settle_loss(&record) {
            Ok(()) => self.unregister(&record.owner, &record.round_id),
            Err(e) => {
                error!(user = %record.owner, round_id = %record.round_id, "Failed to record lost round: {}", e);
                if let Err(e) = self.store.save_active_round(&record) {
                    error!(round_id = %record.round_id, "Failed to store lost round: {}", e);
                }
                self.rounds.insert(record.round_id.clone(), round);
            }
        }
    }

    /// Lock in the current prize
    pub async fn cash_out(&self, user: &UserId, round_id: &RoundId) -> CasinoResult<RoundSnapshot> {
        let result = self.cash_out_locked(user, round_id).await;
        self.observe(result)
    }

    async fn cash_out_locked(
        &self,
        user: &UserId,
        round_id: &RoundId,
    ) -> CasinoResult<RoundSnapshot> {
        let mut account = self.ledger.lock(user).await?;
        self.flush_pending(&mut account);
        let round = self.owned_round(user, round_id)?;
        self.settle_cash_out(&mut account, round)
    }

    /// Credit and archive in one write. A failed write leaves the registered
    /// round in play.
    fn settle_cash_out(&self, account: &mut AccountGuard, mut round: Round) -> CasinoResult<RoundSnapshot> {
        let prize = round.cash_out()?;
        let record = round.to_record();
        let balance = account.settle_win(&record)?;
        self.unregister(&record.owner, &record.round_id);

        self.metrics.rounds_finished.with_label_values(&["cashed_out"]).inc();
        self.metrics.active_rounds.dec();
        self.metrics.coins_paid_out.inc_by(prize);
        info!(
            user = %account.user(),
            round_id = %round.id(),
            prize,
            balance,
            revealed = round.revealed_safe(),
            "Round cashed out"
        );
        Ok(round.snapshot())
    }

    /// Current view of a round, in play or archived
    pub async fn round(&self, user: &UserId, round_id: &RoundId) -> CasinoResult<RoundSnapshot> {
        let result = self.round_inner(user, round_id);
        self.observe(result)
    }

    fn round_inner(&self, user: &UserId, round_id: &RoundId) -> CasinoResult<RoundSnapshot> {
        let registered = self
            .rounds
            .get(round_id)
            .map(|r| (r.owner() == user, r.snapshot()));
        match registered {
            Some((true, snapshot)) => return Ok(snapshot),
            Some((false, _)) => return Err(RoundStateError::NotFound(round_id.to_string()).into()),
            None => {}
        }
        match self.store.load_round(round_id)? {
            Some(record) if &record.owner == user => Ok(record.snapshot()),
            _ => Err(RoundStateError::NotFound(round_id.to_string()).into()),
        }
    }

    /// Rounds still in play, so an interrupted client can resume
    pub fn active_rounds(&self, user: &UserId) -> Vec<RoundSnapshot> {
        self.user_rounds(user)
            .iter()
            .filter(|r| r.status() == RoundStatus::Playing)
            .map(Round::snapshot)
            .collect()
    }

    /// Finished rounds, newest first
    pub fn history(&self, user: &UserId, limit: Option<usize>) -> CasinoResult<Vec<RoundRecord>> {
        let limit = limit
            .unwrap_or(self.game.history_limit)
            .min(self.game.history_limit);
        let result = self.store.recent_rounds(user, limit);
        self.observe(result)
    }

    pub async fn profile(&self, user: &UserId) -> CasinoResult<PlayerProfile> {
        let result = self.ledger.lock(user).await;
        let mut account = self.observe(result)?;
        self.flush_pending(&mut account);
        Ok(self.profile_of(&account))
    }

    fn profile_of(&self, guard: &AccountGuard) -> PlayerProfile {
        let account = guard.account();
        PlayerProfile {
            user_id: guard.user().clone(),
            balance: account.balance,
            games_played: account.games_played,
            total_winnings: account.total_winnings,
            active_rounds: self.playing_count(guard.user()),
        }
    }

    /// Raise the balance to the minimum grant
    pub async fn top_up(&self, user: &UserId) -> CasinoResult<PlayerProfile> {
        let result = self.top_up_locked(user).await;
        self.observe(result)
    }

    async fn top_up_locked(&self, user: &UserId) -> CasinoResult<PlayerProfile> {
        let mut account = self.ledger.lock(user).await?;
        self.flush_pending(&mut account);
        let balance = account.top_up()?;
        info!(%user, balance, "Top up");
        Ok(self.profile_of(&account))
    }

    /// Prize for every reachable reveal count
    pub fn odds(&self, bet: u64, mine_count: usize) -> CasinoResult<Vec<PayoutStep>> {
        let result = RoundParams::new(bet, mine_count, self.game.min_bet, self.game.max_bet)
            .and_then(|params| payout::payout_table(params.bet, params.mine_count));
        self.observe(result)
    }
}

impl std::fmt::Debug for MinesService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MinesService")
            .field("registered_rounds", &self.rounds.len())
            .field("game", &self.game)
            .finish()
    }
}
