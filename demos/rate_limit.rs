//! Example: Quota governors on their own.
//!
//! Uses a manual clock and no ledger, so nothing touches the network or disk.
//!
//! Run with: cargo run --example rate_limit

use std::sync::Arc;

use ldb_api_client::rate_limit::{GovernorRegistry, ManualClock, QuotaPeriod, QuotaTable};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    // Two calls per second, five per 15 minutes; registered callers get more.
    let table = QuotaTable::new()
        .with(QuotaPeriod::Second, 2u32)
        .with(QuotaPeriod::FifteenMinutes, (5u32, 10u32));
    let clock = Arc::new(ManualClock::new(0.0));
    let registry = GovernorRegistry::with_clock(&table, false, None, clock.clone())?;
    let governor = registry.sync_governor();

    for second in 0..4 {
        for call in 0..3 {
            match governor.acquire() {
                Ok(()) => println!("t={second}s call #{call}: admitted"),
                Err(e) => println!(
                    "t={second}s call #{call}: {} (retry in {:?})",
                    e,
                    e.retry_after().unwrap_or_default()
                ),
            }
        }
        clock.advance(1.0);
    }

    println!("\nRemaining:");
    for (period, remaining) in governor.remaining() {
        println!("  {}: {}", period, remaining);
    }

    Ok(())
}
