//! # Report Commands
//!
//! Reads products and ledger, hands them to the pure projections in
//! [`kardex_core::reports`].

use chrono::{DateTime, Duration, Utc};
use clap::Subcommand;

use kardex_core::reports::{self, LedgerDiscrepancy};

use super::emit;
use crate::error::{ApiError, ErrorCode};
use crate::state::{AppState, MAX_WINDOW_DAYS};

#[derive(Debug, Subcommand)]
pub enum ReportCommand {
    /// Stock value per product and in total
    Valuation,
    /// ABC classification by outbound consumption value
    Abc {
        /// Trailing window in days (default from config)
        #[arg(long)]
        days: Option<i64>,
    },
    /// Stock with no outbound movement in the window
    DeadStock {
        /// Trailing window in days (default from config)
        #[arg(long)]
        days: Option<i64>,
    },
    /// Replay the ledger and compare with stored quantities
    Verify,
}

pub async fn run(state: &AppState, cmd: ReportCommand) -> Result<(), ApiError> {
    let products = state.db.products().list().await?;
    let now = Utc::now();

    match cmd {
        ReportCommand::Valuation => {
            let report = reports::valuation(&products);
            emit(state, &report, |r| {
                for line in &r.lines {
                    println!(
                        "{:<32} {:>8} x {:>10} = {:>12}",
                        line.product_name, line.total_quantity, line.unit_cost, line.value
                    );
                }
                println!("Total: {} units, value {}", r.total_quantity, r.total_value);
            })
        }
        ReportCommand::Abc { days } => {
            let days = window_days(days, state.config.reports.abc_window_days)?;
            let window = window_duration(days)?;
            let since = now.checked_sub_signed(window).unwrap_or(DateTime::<Utc>::MIN_UTC);
            let entries = state.db.ledger().list_since(since).await?;
            let lines = reports::abc_classification(&products, &entries, now, window);
            emit(state, &lines, |list| {
                if list.is_empty() {
                    println!("No consumption in the last {} days", days);
                }
                for l in list {
                    println!(
                        "{:?}  {:<32} {:>8} {:>12} {:>6.2}% {:>7.2}%",
                        l.class,
                        l.product_name,
                        l.consumed_quantity,
                        l.consumption_value,
                        l.share_bps as f64 / 100.0,
                        l.cumulative_share_bps as f64 / 100.0
                    );
                }
            })
        }
        ReportCommand::DeadStock { days } => {
            let days = window_days(days, state.config.reports.dead_stock_days)?;
            let entries = state.db.ledger().list_all().await?;
            let lines = reports::dead_stock(&products, &entries, now, window_duration(days)?);
            emit(state, &lines, |list| {
                for l in list {
                    let idle = l
                        .idle_days
                        .map(|d| format!("{} days idle", d))
                        .unwrap_or_else(|| "never moved".to_string());
                    println!(
                        "{:<32} {:>8} {:>12}  {}",
                        l.product_name, l.total_quantity, l.dead_value, idle
                    );
                }
            })
        }
        ReportCommand::Verify => {
            let entries = state.db.ledger().list_all().await?;
            let issues = reports::verify_ledger(&products, &entries);
            emit(state, &issues, |list| {
                if list.is_empty() {
                    println!(
                        "Ledger consistent: {} entries explain {} products",
                        entries.len(),
                        products.len()
                    );
                }
                for issue in list {
                    print_discrepancy(issue);
                }
            })?;

            if issues.is_empty() {
                Ok(())
            } else {
                Err(ApiError::new(
                    ErrorCode::Internal,
                    format!("ledger does not match stock: {} discrepancies", issues.len()),
                ))
            }
        }
    }
}

fn window_days(requested: Option<i64>, default: i64) -> Result<i64, ApiError> {
    match requested {
        Some(days) if days <= 0 => Err(ApiError::validation("--days must be at least 1")),
        Some(days) if days > MAX_WINDOW_DAYS => Err(ApiError::validation(format!(
            "--days must be at most {}",
            MAX_WINDOW_DAYS
        ))),
        Some(days) => Ok(days),
        None => Ok(default),
    }
}

fn window_duration(days: i64) -> Result<Duration, ApiError> {
    Duration::try_days(days)
        .ok_or_else(|| ApiError::validation(format!("report window of {} days is out of range", days)))
}

fn print_discrepancy(issue: &LedgerDiscrepancy) {
    match issue {
        LedgerDiscrepancy::BrokenEntry {
            entry_id,
            product_id,
            location_id,
            expected_before,
            actual_before,
        } => println!(
            "broken entry {} ({} at {}): before {} but history gives {}",
            entry_id, product_id, location_id, actual_before, expected_before
        ),
        LedgerDiscrepancy::QuantityMismatch {
            product_id,
            location_id,
            stored,
            replayed,
        } => println!(
            "mismatch {} at {}: stored {} but ledger gives {}",
            product_id, location_id, stored, replayed
        ),
    }
}
