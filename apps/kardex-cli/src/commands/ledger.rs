//! # Ledger Command
//!
//! Prints a product's kardex in commit order. Entries of deleted products
//! stay readable by product id.

use clap::Args;

use kardex_core::LedgerEntry;

use super::emit;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Args)]
pub struct LedgerArgs {
    /// Product id or SKU
    pub product: String,

    /// Only the most recent N entries
    #[arg(long)]
    pub last: Option<usize>,
}

pub async fn run(state: &AppState, args: LedgerArgs) -> Result<(), ApiError> {
    let (product_id, exists) = match state.db.products().resolve(&args.product).await {
        Ok(product) => (product.id, true),
        // Deleted products: history is still there under the raw id.
        Err(kardex_db::DbError::NotFound { .. }) => (args.product.clone(), false),
        Err(e) => return Err(e.into()),
    };

    let mut entries = state.db.ledger().list_for_product(&product_id).await?;
    if entries.is_empty() && !exists {
        return Err(ApiError::not_found("Product", &args.product));
    }
    if let Some(last) = args.last {
        let skip = entries.len().saturating_sub(last);
        entries = entries.split_off(skip);
    }

    emit(state, &entries, |list| print_entries(list))
}

fn print_entries(entries: &[LedgerEntry]) {
    if let Some(first) = entries.first() {
        println!("Kardex: {} ({})", first.product_name, first.product_id);
    }
    for e in entries {
        println!(
            "{}  {:<17} {:<20} {:>+6} {:>6} -> {:<6} {:<12} {}",
            e.created_at.format("%Y-%m-%d %H:%M"),
            e.kind.as_str(),
            e.location_name,
            e.delta,
            e.quantity_before,
            e.quantity_after,
            e.user_name,
            e.reason.as_deref().unwrap_or("")
        );
    }
}
