//! # Count Commands
//!
//! ```text
//! kardex count start                      → session id, one line per product
//! kardex count record <session> <product> <qty>
//! kardex count finalize <session> [--confirm-defaults]
//! kardex count show <session>             → lines and variances
//! kardex count apply <session>            → adjustments, session applied
//! ```

use clap::Subcommand;
use serde::Serialize;

use kardex_core::count::CountVariance;
use kardex_core::{CountSession, CountStatus};

use super::emit;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Subcommand)]
pub enum CountCommand {
    /// Open a session over every product
    Start,
    /// Record the quantity found for a product
    Record {
        session: String,
        /// Product id or SKU
        product: String,
        quantity: i64,
    },
    /// Close counting; uncounted products need --confirm-defaults (counted as 0)
    Finalize {
        session: String,
        #[arg(long)]
        confirm_defaults: bool,
    },
    /// Apply the variances of a completed session to stock
    Apply { session: String },
    /// Show a session's lines and variances
    Show { session: String },
    /// List sessions, newest first
    List {
        #[arg(long, value_parser = parse_status)]
        status: Option<CountStatus>,
    },
}

#[derive(Debug, Serialize)]
struct SessionView<'a> {
    #[serde(flatten)]
    session: &'a CountSession,
    uncounted: usize,
    variances: Vec<CountVariance>,
}

impl<'a> SessionView<'a> {
    fn new(session: &'a CountSession) -> Self {
        SessionView {
            session,
            uncounted: session.uncounted(),
            variances: session.variances(),
        }
    }
}

pub async fn run(state: &AppState, cmd: CountCommand) -> Result<(), ApiError> {
    let reconciler = state.reconciler();

    match cmd {
        CountCommand::Start => {
            let session = reconciler.start_count(&state.actor).await?;
            emit(state, &SessionView::new(&session), |v| {
                println!(
                    "Started count {} over {} products",
                    v.session.id,
                    v.session.lines.len()
                )
            })
        }
        CountCommand::Record {
            session,
            product,
            quantity,
        } => {
            let product = state.db.products().resolve(&product).await?;
            let session = reconciler
                .record_count(&session, &product.id, quantity)
                .await?;
            emit(state, &SessionView::new(&session), |v| {
                println!(
                    "Recorded {} for {} ({} still uncounted)",
                    quantity, product.name, v.uncounted
                )
            })
        }
        CountCommand::Finalize {
            session,
            confirm_defaults,
        } => {
            let session = reconciler.finalize_count(&session, confirm_defaults).await?;
            emit(state, &SessionView::new(&session), |v| {
                println!(
                    "Count {} completed, {} product(s) with variance",
                    v.session.id,
                    v.variances.len()
                );
                print_variances(&v.variances);
            })
        }
        CountCommand::Apply { session } => {
            let outcome = reconciler.apply_adjustments(&session, &state.actor).await?;
            emit(state, &outcome, |o| {
                println!(
                    "Count {} applied: {} product(s) adjusted, {} ledger entries",
                    o.session.id,
                    o.products.len(),
                    o.entries.len()
                )
            })
        }
        CountCommand::Show { session } => {
            let session = state
                .db
                .counts()
                .get(&session)
                .await?
                .ok_or_else(|| ApiError::not_found("CountSession", &session))?;
            emit(state, &SessionView::new(&session), print_session)
        }
        CountCommand::List { status } => {
            let counts = state.db.counts();
            let sessions = match status {
                Some(status) => counts.list_by_status(status).await?,
                None => counts.list().await?,
            };
            emit(state, &sessions, |list| {
                for s in list {
                    println!(
                        "{:<38} {:<12} {}  {} lines  by {}",
                        s.id,
                        s.status.to_string(),
                        s.created_at.format("%Y-%m-%d %H:%M"),
                        s.lines.len(),
                        s.created_by_name
                    );
                }
            })
        }
    }
}

fn print_session(view: &SessionView<'_>) {
    let s = view.session;
    println!("Count {} ({})", s.id, s.status);
    println!("  Started {} by {}", s.created_at.format("%Y-%m-%d %H:%M"), s.created_by_name);
    for line in &s.lines {
        let counted = line
            .counted_quantity
            .map(|c| c.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "    {:<32} expected {:>6}  counted {:>6}",
            line.product_name, line.expected_quantity, counted
        );
    }
    if view.uncounted > 0 {
        println!("  {} product(s) not counted yet", view.uncounted);
    }
    print_variances(&view.variances);
}

fn print_variances(variances: &[CountVariance]) {
    for v in variances {
        let label = if v.difference > 0 { "surplus" } else { "loss" };
        println!(
            "    {:<32} {:>6} -> {:<6} {:>+6} {}",
            v.product_name, v.expected_quantity, v.counted_quantity, v.difference, label
        );
    }
}

fn parse_status(raw: &str) -> Result<CountStatus, String> {
    match raw {
        "in_progress" | "in-progress" => Ok(CountStatus::InProgress),
        "completed" => Ok(CountStatus::Completed),
        "applied" => Ok(CountStatus::Applied),
        other => Err(format!(
            "unknown status '{}', expected in_progress, completed or applied",
            other
        )),
    }
}
