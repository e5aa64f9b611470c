//! Offline ledger audit: replays every player's transaction log against the
//! stored balance. Exits non-zero when any account disagrees.

use clap::Parser;
use rgs_core::{
    ledger::{store::load_all_balances, verify_player},
    storage::OptimizedStorage,
};
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "verify-ledger", about = "Verify ledger balances against transaction logs")]
struct Args {
    /// RocksDB data directory
    #[arg(default_value = "./rgs_data")]
    data_dir: String,

    /// Maximum number of accounts to check
    #[arg(long, default_value_t = 100_000)]
    max_accounts: usize,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let storage = match OptimizedStorage::open_read_only(&args.data_dir) {
        Ok(storage) => storage,
        Err(e) => {
            eprintln!("Cannot open {}: {}", args.data_dir, e);
            return ExitCode::FAILURE;
        }
    };
    let balances = match load_all_balances(&storage, args.max_accounts) {
        Ok(balances) => balances,
        Err(e) => {
            eprintln!("Cannot read balances: {}", e);
            return ExitCode::FAILURE;
        }
    };

    println!("Ledger Verification");
    println!("===================");
    println!("Accounts: {}\n", balances.len());

    let mut transactions_checked = 0usize;
    let mut inconsistent = 0usize;
    for balance in &balances {
        match verify_player(&storage, &balance.player_id) {
            Ok(report) => {
                transactions_checked += report.transactions_checked;
                if report.is_consistent() {
                    println!(
                        "   OK   {} ({} transactions)",
                        report.player_id, report.transactions_checked
                    );
                } else {
                    inconsistent += 1;
                    println!("   FAIL {}", report.player_id);
                    for problem in &report.problems {
                        println!("        {}", problem);
                    }
                }
            }
            Err(e) => {
                inconsistent += 1;
                println!("   FAIL {}: {}", balance.player_id, e);
            }
        }
    }

    println!("\nSummary:");
    println!("   Accounts checked:     {}", balances.len());
    println!("   Transactions checked: {}", transactions_checked);
    println!("   Inconsistent:         {}", inconsistent);

    if inconsistent == 0 {
        println!("\nLEDGER INTEGRITY VERIFIED");
        ExitCode::SUCCESS
    } else {
        println!("\nLEDGER INTEGRITY FAILED");
        ExitCode::FAILURE
    }
}
