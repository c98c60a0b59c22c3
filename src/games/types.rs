use crate::errors::{CasinoResult, ValidationError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of cells on the board (5x5)
pub const GRID_SIZE: usize = 25;

/// A board needs at least one mine
pub const MIN_MINES: usize = 1;

/// A board needs at least one safe cell
pub const MAX_MINES: usize = GRID_SIZE - 1;

/// Opaque identity handed over by the auth collaborator
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque round identifier handed to the client
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoundId(pub String);

impl RoundId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoundId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Round lifecycle. Setup -> Playing -> {Lost | CashedOut}
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RoundStatus {
    Setup,
    Playing,
    Lost,
    CashedOut,
}

impl RoundStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, RoundStatus::Lost | RoundStatus::CashedOut)
    }
}

impl fmt::Display for RoundStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoundStatus::Setup => write!(f, "setup"),
            RoundStatus::Playing => write!(f, "playing"),
            RoundStatus::Lost => write!(f, "lost"),
            RoundStatus::CashedOut => write!(f, "cashed_out"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    pub is_mine: bool,
    pub is_revealed: bool,
}

/// Fixed 25-cell board. Mine flags are written once at round start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grid {
    cells: Vec<Cell>,
}

impl Grid {
    /// All cells unrevealed and safe
    pub fn empty() -> Self {
        Self {
            cells: vec![Cell::default(); GRID_SIZE],
        }
    }

    /// Board with mines at the given positions
    pub fn with_mines(positions: &[usize]) -> CasinoResult<Self> {
        validate_layout(positions)?;
        let mut grid = Self::empty();
        for &pos in positions {
            grid.cells[pos].is_mine = true;
        }
        Ok(grid)
    }

    pub fn cell(&self, index: usize) -> Option<&Cell> {
        self.cells.get(index)
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn mine_count(&self) -> usize {
        self.cells.iter().filter(|c| c.is_mine).count()
    }

    pub fn mine_positions(&self) -> Vec<usize> {
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_mine)
            .map(|(i, _)| i)
            .collect()
    }

    pub(crate) fn mark_revealed(&mut self, index: usize) {
        if let Some(cell) = self.cells.get_mut(index) {
            cell.is_revealed = true;
        }
    }

    pub(crate) fn reveal_all(&mut self) {
        for cell in &mut self.cells {
            cell.is_revealed = true;
        }
    }
}

/// Check that a layout is a set of in-range, distinct indices of legal size
pub fn validate_layout(positions: &[usize]) -> CasinoResult<()> {
    validate_mine_count(positions.len())?;

    let mut seen = [false; GRID_SIZE];
    for &pos in positions {
        if pos >= GRID_SIZE {
            return Err(ValidationError::MineLayout(format!("position {} out of range", pos)).into());
        }
        if seen[pos] {
            return Err(ValidationError::MineLayout(format!("position {} repeated", pos)).into());
        }
        seen[pos] = true;
    }
    Ok(())
}

pub fn validate_mine_count(mine_count: usize) -> CasinoResult<()> {
    if !(MIN_MINES..=MAX_MINES).contains(&mine_count) {
        return Err(ValidationError::MineCount {
            min: MIN_MINES,
            max: MAX_MINES,
            actual: mine_count,
        }
        .into());
    }
    Ok(())
}

/// Validated parameters of a new round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundParams {
    pub bet: u64,
    pub mine_count: usize,
}

impl RoundParams {
    /// Validate bet and mine count against the configured bet bounds
    pub fn new(bet: u64, mine_count: usize, min_bet: u64, max_bet: u64) -> CasinoResult<Self> {
        if bet < min_bet.max(1) {
            return Err(ValidationError::BetTooSmall {
                min: min_bet.max(1),
                actual: bet,
            }
            .into());
        }
        if bet > max_bet {
            return Err(ValidationError::BetTooLarge { max: max_bet, actual: bet }.into());
        }
        validate_mine_count(mine_count)?;
        Ok(Self { bet, mine_count })
    }

    pub fn safe_cells(&self) -> usize {
        GRID_SIZE - self.mine_count
    }
}

/// What the client is allowed to see of one cell
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CellView {
    Hidden,
    Gem,
    Mine,
}

/// Client-facing round state after an action
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoundSnapshot {
    pub round_id: RoundId,
    pub status: RoundStatus,
    pub bet: u64,
    pub mine_count: usize,
    pub revealed_safe: usize,
    pub current_prize: u64,
    pub multiplier: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_prize: Option<u64>,
    pub cells: Vec<CellView>,
}

/// Persisted form of a round: the live state while in play, then the audit
/// record once finished
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoundRecord {
    pub round_id: RoundId,
    pub owner: UserId,
    pub status: RoundStatus,
    pub bet: u64,
    pub mine_count: usize,
    pub mine_positions: Vec<usize>,
    /// Cell indices in the order the player uncovered them
    pub reveal_order: Vec<usize>,
    pub revealed_safe: usize,
    pub prize_paid: u64,
    pub started_at: i64,
    pub finished_at: Option<i64>,
}
