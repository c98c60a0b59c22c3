//! Round state machine
//!
//! A [`Round`] is created only after its bet has been debited. It owns the
//! board and the reveal count; the prize is always recomputed from the
//! reveal count, never stored. Balance changes are left to the caller.

use crate::errors::{CasinoError, CasinoResult, InternalError, RoundStateError, ValidationError};
use crate::games::payout;
use crate::games::placer::MinePlacer;
use crate::games::types::{
    validate_mine_count, CellView, Grid, RoundId, RoundParams, RoundRecord, RoundSnapshot,
    RoundStatus, UserId, GRID_SIZE,
};
use chrono::Utc;

/// Result of uncovering one cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevealOutcome {
    /// Safe cell. `cleared` is set once no safe cell remains hidden.
    Safe { prize: u64, cleared: bool },
    /// Mine hit, the round is lost
    Mine,
}

#[derive(Debug, Clone)]
pub struct Round {
    id: RoundId,
    owner: UserId,
    params: RoundParams,
    grid: Grid,
    revealed_safe: usize,
    reveal_order: Vec<usize>,
    status: RoundStatus,
    prize_paid: u64,
    started_at: i64,
    finished_at: Option<i64>,
}

impl Round {
    /// Set up a board and move it straight to Playing
    pub fn start(
        id: RoundId,
        owner: UserId,
        params: RoundParams,
        placer: &dyn MinePlacer,
    ) -> CasinoResult<Self> {
        let mut round = Self {
            id,
            owner,
            params,
            grid: Grid::empty(),
            revealed_safe: 0,
            reveal_order: Vec::new(),
            status: RoundStatus::Setup,
            prize_paid: 0,
            started_at: Utc::now().timestamp_millis(),
            finished_at: None,
        };

        let positions = placer.place(params.mine_count)?;
        round.grid = Grid::with_mines(&positions)?;
        if round.grid.mine_count() != params.mine_count {
            return Err(ValidationError::MineLayout(format!(
                "placer returned {} mines, {} requested",
                round.grid.mine_count(),
                params.mine_count
            ))
            .into());
        }
        round.status = RoundStatus::Playing;
        Ok(round)
    }

    pub fn id(&self) -> &RoundId {
        &self.id
    }

    pub fn owner(&self) -> &UserId {
        &self.owner
    }

    pub fn bet(&self) -> u64 {
        self.params.bet
    }

    pub fn mine_count(&self) -> usize {
        self.params.mine_count
    }

    pub fn status(&self) -> RoundStatus {
        self.status
    }

    pub fn revealed_safe(&self) -> usize {
        self.revealed_safe
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn is_cleared(&self) -> bool {
        self.revealed_safe == self.params.safe_cells()
    }

    /// Prize for the current reveal count. Zero once lost.
    pub fn current_prize(&self) -> CasinoResult<u64> {
        match self.status {
            RoundStatus::Lost => Ok(0),
            RoundStatus::CashedOut => Ok(self.prize_paid),
            _ => payout::prize(self.params.bet, self.params.mine_count, self.revealed_safe),
        }
    }

    fn ensure_playing(&self) -> CasinoResult<()> {
        match self.status {
            RoundStatus::Playing => Ok(()),
            RoundStatus::Lost | RoundStatus::CashedOut => {
                Err(RoundStateError::AlreadyFinished(self.id.to_string()).into())
            }
            RoundStatus::Setup => Err(RoundStateError::NotPlaying(self.id.to_string()).into()),
        }
    }

    /// Uncover one cell
    pub fn reveal(&mut self, index: usize) -> CasinoResult<RevealOutcome> {
        self.ensure_playing()?;
        let cell = *self.grid.cell(index).ok_or(ValidationError::CellIndex {
            size: GRID_SIZE,
            actual: index,
        })?;
        if cell.is_revealed {
            return Err(ValidationError::CellAlreadyRevealed(index).into());
        }

        if cell.is_mine {
            self.grid.mark_revealed(index);
            self.reveal_order.push(index);
            self.grid.reveal_all();
            self.status = RoundStatus::Lost;
            self.prize_paid = 0;
            self.finished_at = Some(Utc::now().timestamp_millis());
            return Ok(RevealOutcome::Mine);
        }

        let prize = payout::prize(self.params.bet, self.params.mine_count, self.revealed_safe + 1)?;
        self.grid.mark_revealed(index);
        self.reveal_order.push(index);
        self.revealed_safe += 1;

        Ok(RevealOutcome::Safe {
            prize,
            cleared: self.is_cleared(),
        })
    }

    /// Amount a cash-out would credit right now, without finishing the round
    pub fn payout_due(&self) -> CasinoResult<u64> {
        self.ensure_playing()?;
        payout::prize(self.params.bet, self.params.mine_count, self.revealed_safe)
    }

    /// Finish the round and return the prize to credit
    pub fn cash_out(&mut self) -> CasinoResult<u64> {
        let prize = self.payout_due()?;
        self.grid.reveal_all();
        self.status = RoundStatus::CashedOut;
        self.prize_paid = prize;
        self.finished_at = Some(Utc::now().timestamp_millis());
        Ok(prize)
    }

    /// Client view. Hidden cells never leak their contents while playing.
    pub fn snapshot(&self) -> RoundSnapshot {
        let finished = self.status.is_terminal();
        let cells = self
            .grid
            .cells()
            .iter()
            .map(|cell| match (cell.is_revealed || finished, cell.is_mine) {
                (false, _) => CellView::Hidden,
                (true, true) => CellView::Mine,
                (true, false) => CellView::Gem,
            })
            .collect();

        let current_prize = self.current_prize().unwrap_or(0);
        let multiplier = match self.status {
            RoundStatus::Lost => 0.0,
            _ => payout::multiplier(self.params.mine_count, self.revealed_safe).unwrap_or(1.0),
        };
        let next_prize = if self.status == RoundStatus::Playing && !self.is_cleared() {
            payout::prize(self.params.bet, self.params.mine_count, self.revealed_safe + 1).ok()
        } else {
            None
        };

        RoundSnapshot {
            round_id: self.id.clone(),
            status: self.status,
            bet: self.params.bet,
            mine_count: self.params.mine_count,
            revealed_safe: self.revealed_safe,
            current_prize,
            multiplier,
            next_prize,
            cells,
        }
    }

    pub fn to_record(&self) -> RoundRecord {
        RoundRecord {
            round_id: self.id.clone(),
            owner: self.owner.clone(),
            status: self.status,
            bet: self.params.bet,
            mine_count: self.params.mine_count,
            mine_positions: self.grid.mine_positions(),
            reveal_order: self.reveal_order.clone(),
            revealed_safe: self.revealed_safe,
            prize_paid: self.prize_paid,
            started_at: self.started_at,
            finished_at: self.finished_at,
        }
    }

    /// Rebuild a round from its persisted record after a restart
    pub fn restore(record: RoundRecord) -> CasinoResult<Self> {
        validate_mine_count(record.mine_count)?;
        let mut grid = Grid::with_mines(&record.mine_positions)?;
        if grid.mine_count() != record.mine_count {
            return Err(corrupted(&record, "mine layout does not match mine count"));
        }

        let mut revealed_safe = 0;
        for &index in &record.reveal_order {
            let cell = *grid
                .cell(index)
                .ok_or_else(|| corrupted(&record, "reveal outside the board"))?;
            if cell.is_revealed {
                return Err(corrupted(&record, "cell revealed twice"));
            }
            grid.mark_revealed(index);
            if !cell.is_mine {
                revealed_safe += 1;
            }
        }
        if revealed_safe != record.revealed_safe {
            return Err(corrupted(&record, "reveal count does not match reveal order"));
        }
        if record.status.is_terminal() {
            grid.reveal_all();
        }

        Ok(Self {
            id: record.round_id,
            owner: record.owner,
            params: RoundParams {
                bet: record.bet,
                mine_count: record.mine_count,
            },
            grid,
            revealed_safe,
            reveal_order: record.reveal_order,
            status: record.status,
            prize_paid: record.prize_paid,
            started_at: record.started_at,
            finished_at: record.finished_at,
        })
    }
}

fn corrupted(record: &RoundRecord, what: &str) -> CasinoError {
    InternalError::CorruptedData(format!("round {}: {}", record.round_id, what)).into()
}

impl RoundRecord {
    /// Rebuild the client view of an archived round
    pub fn snapshot(&self) -> RoundSnapshot {
        let mut cells = vec![CellView::Gem; GRID_SIZE];
        for &pos in &self.mine_positions {
            if let Some(cell) = cells.get_mut(pos) {
                *cell = CellView::Mine;
            }
        }
        let multiplier = match self.status {
            RoundStatus::Lost => 0.0,
            _ => payout::multiplier(self.mine_count, self.revealed_safe).unwrap_or(1.0),
        };

        RoundSnapshot {
            round_id: self.round_id.clone(),
            status: self.status,
            bet: self.bet,
            mine_count: self.mine_count,
            revealed_safe: self.revealed_safe,
            current_prize: self.prize_paid,
            multiplier,
            next_prize: None,
            cells,
        }
    }
}
