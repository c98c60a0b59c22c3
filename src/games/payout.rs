//! Fair-odds payout calculation
//!
//! The multiplier after `n` safe reveals is the reciprocal of the probability
//! of surviving those `n` reveals. The mine count used at every step is the
//! original one: mines are only uncovered when the round is lost, so the
//! number of live mines among hidden cells never changes while playing.

use crate::errors::{CasinoResult, ValidationError};
use crate::games::types::{validate_mine_count, GRID_SIZE};
use serde::{Deserialize, Serialize};

fn check_bounds(mine_count: usize, revealed_safe: usize) -> CasinoResult<()> {
    validate_mine_count(mine_count)?;
    let safe = GRID_SIZE - mine_count;
    if revealed_safe > safe {
        return Err(ValidationError::RevealCount {
            revealed: revealed_safe,
            safe,
        }
        .into());
    }
    Ok(())
}

/// Accumulated `start * Π 1/p_i`. Never floored here.
fn accumulate(start: f64, mine_count: usize, revealed_safe: usize) -> f64 {
    let mut value = start;
    for i in 0..revealed_safe {
        let cells_remaining = (GRID_SIZE - i) as f64;
        let survival = 1.0 - mine_count as f64 / cells_remaining;
        value *= 1.0 / survival;
    }
    value
}

/// Un-floored fair multiplier after `revealed_safe` safe reveals
pub fn multiplier(mine_count: usize, revealed_safe: usize) -> CasinoResult<f64> {
    check_bounds(mine_count, revealed_safe)?;
    Ok(accumulate(1.0, mine_count, revealed_safe))
}

/// Prize a cash-out would pay after `revealed_safe` safe reveals.
///
/// The product is floored once at the end, never per step.
pub fn prize(bet: u64, mine_count: usize, revealed_safe: usize) -> CasinoResult<u64> {
    check_bounds(mine_count, revealed_safe)?;
    if revealed_safe == 0 {
        return Ok(bet);
    }
    let value = accumulate(bet as f64, mine_count, revealed_safe).floor();
    if !value.is_finite() || value >= u64::MAX as f64 {
        return Err(crate::errors::InternalError::Overflow(format!(
            "prize for bet {} with {} mines after {} reveals",
            bet, mine_count, revealed_safe
        ))
        .into());
    }
    Ok(value as u64)
}

/// One row of the odds table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PayoutStep {
    pub revealed_safe: usize,
    pub multiplier: f64,
    pub prize: u64,
}

/// Prize for every reachable reveal count of a board, starting at zero reveals
pub fn payout_table(bet: u64, mine_count: usize) -> CasinoResult<Vec<PayoutStep>> {
    validate_mine_count(mine_count)?;
    (0..=GRID_SIZE - mine_count)
        .map(|revealed_safe| {
            Ok(PayoutStep {
                revealed_safe,
                multiplier: multiplier(mine_count, revealed_safe)?,
                prize: prize(bet, mine_count, revealed_safe)?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_reveals_returns_bet() {
        for k in 1..=24 {
            assert_eq!(prize(10, k, 0).unwrap(), 10);
            assert_eq!(prize(1, k, 0).unwrap(), 1);
        }
    }

    #[test]
    fn test_single_mine_single_reveal() {
        // 10 / 0.96 = 10.41..
        assert_eq!(prize(10, 1, 1).unwrap(), 10);
    }

    #[test]
    fn test_three_mines_two_reveals() {
        // 10 / (0.88 * 0.875) = 12.98..
        assert_eq!(prize(10, 3, 2).unwrap(), 12);
    }

    #[test]
    fn test_floor_applied_once() {
        // 10 * 25/22 * 24/21 * 23/20 = 14.93..
        // Flooring per step would give 11 -> 12 -> 13.
        assert_eq!(prize(10, 3, 3).unwrap(), 14);
        // Per-step flooring would keep a 1 coin bet at 1 for the first reveals
        assert_eq!(prize(1, 1, 12).unwrap(), 1);
        assert_eq!(prize(1, 3, 5).unwrap(), 2);
    }

    #[test]
    fn test_monotonic_in_reveals() {
        for k in 1..=24 {
            for bet in [1u64, 7, 10, 250, 1_000_000] {
                let mut last = 0;
                for n in 0..=(GRID_SIZE - k) {
                    let p = prize(bet, k, n).unwrap();
                    assert!(p >= last, "bet {} mines {} reveals {}", bet, k, n);
                    last = p;
                }
            }
        }
    }

    #[test]
    fn test_full_clear_multiplier_is_inverse_of_layout_count() {
        // Surviving every safe cell of a 24-mine board: 25 to 1
        assert!((multiplier(24, 1).unwrap() - 25.0).abs() < 1e-9);
        // 1 mine, all 24 safe cells: 25 to 1 as well
        assert!((multiplier(1, 24).unwrap() - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_deterministic() {
        assert_eq!(prize(37, 5, 7).unwrap(), prize(37, 5, 7).unwrap());
    }

    #[test]
    fn test_out_of_bounds_is_error() {
        assert!(prize(10, 0, 0).is_err());
        assert!(prize(10, 25, 0).is_err());
        assert!(prize(10, 3, 23).is_err());
        assert!(prize(10, 3, 22).is_ok());
    }

    #[test]
    fn test_payout_table_shape() {
        let table = payout_table(10, 3).unwrap();
        assert_eq!(table.len(), 23);
        assert_eq!(table[0].prize, 10);
        assert_eq!(table[2].prize, 12);
        assert_eq!(table.last().unwrap().revealed_safe, 22);
    }
}
