//! Print a player's account, rounds in play and archived rounds from a
//! RocksDB data directory.
//! Run it while the server is stopped; RocksDB allows one writer.

use clap::Parser;
use mines_casino::{CasinoStore, RocksStore, UserId};

#[derive(Parser, Debug)]
#[command(name = "inspect_rounds")]
struct Args {
    /// Database directory
    #[arg(long, default_value = "./DB/mines_data")]
    db_path: String,

    /// Player to inspect
    #[arg(long)]
    user: String,

    #[arg(long, default_value = "20")]
    limit: usize,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let store = RocksStore::open(&args.db_path)?;
    let user = UserId::new(args.user);

    match store.load_account(&user)? {
        Some(account) => println!(
            "{}: balance={} games_played={} total_winnings={}",
            user, account.balance, account.games_played, account.total_winnings
        ),
        None => println!("{}: no stored account", user),
    }

    let active: Vec<_> = store
        .load_active_rounds()?
        .into_iter()
        .filter(|r| r.owner == user)
        .collect();
    println!("{} rounds in play:", active.len());
    for r in active {
        println!(
            "  {} {:<10} bet={:<6} mines={:<2} revealed={:?}",
            r.round_id, r.status, r.bet, r.mine_count, r.reveal_order
        );
    }

    let rounds = store.recent_rounds(&user, args.limit)?;
    println!("{} archived rounds (newest first):", rounds.len());
    for r in rounds {
        println!(
            "  {} {:<10} bet={:<6} mines={:<2} revealed={:<2} paid={:<8} mines_at={:?}",
            r.round_id, r.status, r.bet, r.mine_count, r.revealed_safe, r.prize_paid, r.mine_positions
        );
    }
    Ok(())
}
