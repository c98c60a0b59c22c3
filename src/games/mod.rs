pub mod types;
pub mod placer;
pub mod payout;
pub mod round;

pub use types::*;
pub use placer::{FixedMinePlacer, MinePlacer, RandomMinePlacer};
pub use round::{RevealOutcome, Round};
