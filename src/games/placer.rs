//! Mine layout generation

use crate::errors::CasinoResult;
use crate::games::types::{validate_layout, validate_mine_count, GRID_SIZE};
use rand::rngs::OsRng;
use rand::seq::SliceRandom;
use rand::Rng;

/// Upper bound on single draws before switching to a shuffle
const MAX_REJECTION_DRAWS: usize = 4 * GRID_SIZE;

/// Source of mine layouts for new rounds
pub trait MinePlacer: Send + Sync {
    /// Exactly `mine_count` distinct indices in `0..GRID_SIZE`, sorted ascending
    fn place(&self, mine_count: usize) -> CasinoResult<Vec<usize>>;
}

/// Uniform layout drawn from the operating system CSPRNG.
///
/// Rejection sampling is used first since it is cheap for sparse boards.
/// Dense boards can take many draws, so after a fixed budget the remaining
/// mines come from a partial Fisher-Yates shuffle over the free cells.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomMinePlacer;

impl RandomMinePlacer {
    pub fn new() -> Self {
        Self
    }

    fn place_with<R: Rng + ?Sized>(rng: &mut R, mine_count: usize) -> Vec<usize> {
        let mut taken = [false; GRID_SIZE];
        let mut placed = 0;
        let mut draws = 0;

        while placed < mine_count && draws < MAX_REJECTION_DRAWS {
            let pos = rng.gen_range(0..GRID_SIZE);
            draws += 1;
            if !taken[pos] {
                taken[pos] = true;
                placed += 1;
            }
        }

        if placed < mine_count {
            tracing::debug!(
                mine_count,
                placed,
                draws,
                "Rejection budget exhausted, shuffling remaining cells"
            );
            let mut free: Vec<usize> = (0..GRID_SIZE).filter(|&i| !taken[i]).collect();
            let (chosen, _) = free.partial_shuffle(rng, mine_count - placed);
            for &pos in chosen.iter() {
                taken[pos] = true;
            }
        }

        (0..GRID_SIZE).filter(|&i| taken[i]).collect()
    }
}

impl MinePlacer for RandomMinePlacer {
    fn place(&self, mine_count: usize) -> CasinoResult<Vec<usize>> {
        validate_mine_count(mine_count)?;
        Ok(Self::place_with(&mut OsRng, mine_count))
    }
}

/// Always returns the same layout. Used for replays and tests.
#[derive(Debug, Clone)]
pub struct FixedMinePlacer {
    positions: Vec<usize>,
}

impl FixedMinePlacer {
    pub fn new(mut positions: Vec<usize>) -> CasinoResult<Self> {
        validate_layout(&positions)?;
        positions.sort_unstable();
        Ok(Self { positions })
    }
}

impl MinePlacer for FixedMinePlacer {
    fn place(&self, mine_count: usize) -> CasinoResult<Vec<usize>> {
        validate_mine_count(mine_count)?;
        if mine_count != self.positions.len() {
            return Err(crate::errors::ValidationError::MineLayout(format!(
                "fixed layout holds {} mines, {} requested",
                self.positions.len(),
                mine_count
            ))
            .into());
        }
        Ok(self.positions.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn assert_valid(layout: &[usize], k: usize) {
        assert_eq!(layout.len(), k);
        assert!(layout.iter().all(|&i| i < GRID_SIZE));
        assert!(layout.windows(2).all(|w| w[0] < w[1]), "sorted and distinct");
    }

    #[test]
    fn test_every_mine_count_yields_distinct_indices() {
        let placer = RandomMinePlacer::new();
        for k in 1..=24 {
            for _ in 0..20 {
                let layout = placer.place(k).expect("valid count");
                assert_valid(&layout, k);
            }
        }
    }

    #[test]
    fn test_rejects_out_of_range_counts() {
        let placer = RandomMinePlacer::new();
        assert!(placer.place(0).is_err());
        assert!(placer.place(25).is_err());
    }

    #[test]
    fn test_shuffle_fallback_completes_dense_board() {
        // A constant source never yields a second distinct cell, so only the
        // shuffle can finish the layout.
        let mut rng = rand::rngs::mock::StepRng::new(0, 0);
        let layout = RandomMinePlacer::place_with(&mut rng, 24);
        assert_valid(&layout, 24);
    }

    #[test]
    fn test_roughly_uniform() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut hits = [0usize; GRID_SIZE];
        let rounds = 10_000;
        for _ in 0..rounds {
            for pos in RandomMinePlacer::place_with(&mut rng, 5) {
                hits[pos] += 1;
            }
        }
        // Expected 2000 per cell
        for (cell, &count) in hits.iter().enumerate() {
            assert!((1700..2300).contains(&count), "cell {} hit {} times", cell, count);
        }
    }

    #[test]
    fn test_fixed_placer() {
        let placer = FixedMinePlacer::new(vec![9, 2, 4]).unwrap();
        assert_eq!(placer.place(3).unwrap(), vec![2, 4, 9]);
        assert!(placer.place(2).is_err());
        assert!(FixedMinePlacer::new(vec![1, 1]).is_err());
    }
}
