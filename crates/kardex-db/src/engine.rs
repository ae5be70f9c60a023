//! # Stock Engine
//!
//! The only code path that changes a product's location quantities.
//!
//! ## One Mutation, One Transaction
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  apply_exit(p1, L1, 6)                                                  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  BEGIN                                                                  │
//! │  ├── SELECT product p1 (version 7) + location rows                     │
//! │  ├── SELECT location names                                             │
//! │  ├── plan(product, Exit{L1, 6})          ← kardex-core, pure           │
//! │  │      └── InsufficientStock? → ROLLBACK, return error                │
//! │  ├── UPDATE products SET version = 8 WHERE id = p1 AND version = 7     │
//! │  │      └── 0 rows? → StaleVersion → ROLLBACK, back off, start over    │
//! │  ├── UPSERT product_locations (L1 → 4)                                 │
//! │  ├── INSERT ledger_entries (exit, -6, 10 → 4)                          │
//! │  COMMIT                                                                 │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  StockEvent::ProductChanged → broadcast subscribers                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Dropping the returned future before it completes drops the open
//! transaction, which rolls it back.

use std::collections::{BTreeMap, HashMap};

use chrono::Utc;
use serde::Serialize;
use sqlx::sqlite::SqliteConnection;
use sqlx::SqlitePool;
use tokio::sync::broadcast;
use tracing::{debug, info};
use uuid::Uuid;

use kardex_core::mutation::{self, EntryContext, MutationPlan};
use kardex_core::validation::{validate_new_product, validate_product_details};
use kardex_core::{
    Actor, LedgerEntry, MutationPlanner, NewProduct, Product, ProductDetails, StockMutation,
    DEFAULT_UNIT,
};

use crate::error::{DbError, DbResult};
use crate::repository::{ledger, product, registry};
use crate::retry::RetryPolicy;

// =============================================================================
// Outcomes and Events
// =============================================================================

/// Result of a committed mutation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MutationOutcome {
    /// The product as committed.
    pub product: Product,

    /// Entries written, in order. Empty for a zero-delta adjustment.
    pub entries: Vec<LedgerEntry>,
}

/// Published on the change feed after every commit.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StockEvent {
    ProductChanged {
        product: Product,
        entries: Vec<LedgerEntry>,
    },
    ProductDeleted {
        product_id: String,
    },
    CountApplied {
        session_id: String,
        products: Vec<Product>,
        entries: Vec<LedgerEntry>,
    },
}

// =============================================================================
// Engine
// =============================================================================

/// Transactional executor for stock mutations.
///
/// ## Usage
/// ```rust,ignore
/// let engine = db.engine();
/// let outcome = engine.apply_exit(&product_id, &location_id, 3, Some("venda balcão"), &actor).await?;
/// assert_eq!(outcome.entries.len(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct StockEngine {
    pool: SqlitePool,
    tenant_id: String,
    retry: RetryPolicy,
    events: broadcast::Sender<StockEvent>,
}

impl StockEngine {
    pub(crate) fn new(
        pool: SqlitePool,
        tenant_id: String,
        retry: RetryPolicy,
        events: broadcast::Sender<StockEvent>,
    ) -> Self {
        StockEngine {
            pool,
            tenant_id,
            retry,
            events,
        }
    }

    /// Receives every event committed from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<StockEvent> {
        self.events.subscribe()
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub(crate) fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub(crate) fn publish(&self, event: StockEvent) {
        // No subscribers is not an error.
        let _ = self.events.send(event);
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Adds stock at a location.
    ///
    /// Writes `initial_entry` the first time the product is stocked at that
    /// location, `manual_adjustment` afterwards.
    pub async fn apply_entry(
        &self,
        product_id: &str,
        location_id: &str,
        quantity: i64,
        reason: Option<&str>,
        actor: &Actor,
    ) -> DbResult<MutationOutcome> {
        let mutation = StockMutation::Entry {
            location_id: location_id.to_string(),
            quantity,
        };
        self.apply(product_id, &mutation, reason, actor).await
    }

    /// Removes stock from a location. Fails with `InsufficientStock` when the
    /// location holds less than `quantity`.
    pub async fn apply_exit(
        &self,
        product_id: &str,
        location_id: &str,
        quantity: i64,
        reason: Option<&str>,
        actor: &Actor,
    ) -> DbResult<MutationOutcome> {
        let mutation = StockMutation::Exit {
            location_id: location_id.to_string(),
            quantity,
        };
        self.apply(product_id, &mutation, reason, actor).await
    }

    /// Moves stock between two locations of the same product.
    /// Writes exactly two entries: `transfer_out` then `transfer_in`.
    pub async fn apply_transfer(
        &self,
        product_id: &str,
        from: &str,
        to: &str,
        quantity: i64,
        actor: &Actor,
    ) -> DbResult<MutationOutcome> {
        let mutation = StockMutation::Transfer {
            from: from.to_string(),
            to: to.to_string(),
            quantity,
        };
        self.apply(product_id, &mutation, None, actor).await
    }

    /// Sets a location to an absolute quantity.
    /// Nothing is written when the quantity is already `new_quantity`.
    pub async fn apply_adjustment(
        &self,
        product_id: &str,
        location_id: &str,
        new_quantity: i64,
        reason: Option<&str>,
        actor: &Actor,
    ) -> DbResult<MutationOutcome> {
        let mutation = StockMutation::Adjustment {
            location_id: location_id.to_string(),
            new_quantity,
        };
        self.apply(product_id, &mutation, reason, actor).await
    }

    /// Applies any mutation, retrying the whole transaction on conflicts.
    pub async fn apply(
        &self,
        product_id: &str,
        mutation: &StockMutation,
        reason: Option<&str>,
        actor: &Actor,
    ) -> DbResult<MutationOutcome> {
        let outcome = self
            .retry
            .run("apply_mutation", move || async move {
                self.try_apply(product_id, mutation, reason, actor).await
            })
            .await?;

        if outcome.entries.is_empty() {
            debug!(product = %product_id, "Mutation was a no-op");
        } else {
            info!(
                product = %product_id,
                entries = outcome.entries.len(),
                version = outcome.product.version,
                user = %actor.user_id,
                "Stock mutation committed"
            );
            self.publish(StockEvent::ProductChanged {
                product: outcome.product.clone(),
                entries: outcome.entries.clone(),
            });
        }

        Ok(outcome)
    }

    async fn try_apply(
        &self,
        product_id: &str,
        mutation: &StockMutation,
        reason: Option<&str>,
        actor: &Actor,
    ) -> DbResult<MutationOutcome> {
        let mut tx = self.pool.begin().await?;

        let current = product::fetch_product(&mut tx, &self.tenant_id, product_id)
            .await?
            .ok_or_else(|| DbError::not_found("Product", product_id))?;
        let ids = mutation.locations();
        let names = registry::location_names(&mut tx, &self.tenant_id, &ids).await?;

        let plan = mutation::plan_named(&current, mutation, &names)?;
        if plan.is_noop() {
            tx.rollback().await?;
            return Ok(MutationOutcome {
                product: current,
                entries: Vec::new(),
            });
        }

        let ctx = EntryContext {
            product: &current,
            actor,
            reason,
            count_session_id: None,
            at: Utc::now(),
        };
        let outcome = write_plan(&mut tx, &ctx, &plan, &names).await?;

        tx.commit().await?;
        Ok(outcome)
    }

    // =========================================================================
    // Product Lifecycle
    // =========================================================================

    /// Creates a product. Seeded quantities are recorded as `initial_entry`
    /// entries in the same transaction; zero seeds are ignored.
    pub async fn create_product(&self, new: NewProduct, actor: &Actor) -> DbResult<MutationOutcome> {
        validate_new_product(&new)?;

        let now = Utc::now();
        let mut created = Product {
            id: Uuid::new_v4().to_string(),
            tenant_id: self.tenant_id.clone(),
            sku: new.sku.map(|s| s.trim().to_string()),
            name: new.name.trim().to_string(),
            category_id: new.category_id,
            supplier_id: new.supplier_id,
            unit: new.unit.unwrap_or_else(|| DEFAULT_UNIT.to_string()),
            unit_cost_cents: new.unit_cost_cents,
            min_stock: new.min_stock,
            locations: BTreeMap::new(),
            version: 1,
            created_at: now,
            updated_at: now,
        };

        let mut planner = MutationPlanner::new(&created);
        for (location_id, quantity) in new.initial_stock.iter().filter(|(_, q)| **q > 0) {
            planner.apply(&StockMutation::Entry {
                location_id: location_id.clone(),
                quantity: *quantity,
            })?;
        }
        let plan = planner.finish();
        created.locations = plan.locations.clone();

        let mut tx = self.pool.begin().await?;
        let names =
            registry::location_names(&mut tx, &self.tenant_id, &plan.location_ids()).await?;

        product::insert_product(&mut tx, &created).await?;

        let ctx = EntryContext {
            product: &created,
            actor,
            reason: None,
            count_session_id: None,
            at: now,
        };
        let entries = insert_entries(&mut tx, &ctx, &plan, &names).await?;

        tx.commit().await?;

        info!(
            id = %created.id,
            name = %created.name,
            seeded_locations = entries.len(),
            "Product created"
        );
        self.publish(StockEvent::ProductChanged {
            product: created.clone(),
            entries: entries.clone(),
        });

        Ok(MutationOutcome {
            product: created,
            entries,
        })
    }

    /// Edits descriptive fields. Quantities only change through mutations.
    pub async fn update_product_details(
        &self,
        product_id: &str,
        details: &ProductDetails,
    ) -> DbResult<Product> {
        validate_product_details(details)?;

        let updated = self
            .retry
            .run("update_product_details", move || async move {
                self.try_update_details(product_id, details).await
            })
            .await?;

        info!(id = %product_id, version = updated.version, "Product details updated");
        self.publish(StockEvent::ProductChanged {
            product: updated.clone(),
            entries: Vec::new(),
        });
        Ok(updated)
    }

    async fn try_update_details(
        &self,
        product_id: &str,
        details: &ProductDetails,
    ) -> DbResult<Product> {
        let mut tx = self.pool.begin().await?;
        let current = product::fetch_product(&mut tx, &self.tenant_id, product_id)
            .await?
            .ok_or_else(|| DbError::not_found("Product", product_id))?;

        let now = Utc::now();
        product::update_details(&mut tx, &current, details, now).await?;
        tx.commit().await?;

        Ok(Product {
            sku: details.sku.clone(),
            name: details.name.clone(),
            category_id: details.category_id.clone(),
            supplier_id: details.supplier_id.clone(),
            unit: details.unit.clone(),
            unit_cost_cents: details.unit_cost_cents,
            min_stock: details.min_stock,
            version: current.version + 1,
            updated_at: now,
            ..current
        })
    }

    /// Deletes a product and its location rows. Its ledger history stays.
    pub async fn delete_product(&self, product_id: &str) -> DbResult<()> {
        let mut conn = self.pool.acquire().await?;
        product::delete_product(&mut conn, &self.tenant_id, product_id).await?;

        info!(id = %product_id, "Product deleted");
        self.publish(StockEvent::ProductDeleted {
            product_id: product_id.to_string(),
        });
        Ok(())
    }
}

// =============================================================================
// Shared Write Path
// =============================================================================

/// Claims the next product version, writes touched locations and appends
/// the plan's entries. Must run inside a transaction.
pub(crate) async fn write_plan(
    conn: &mut SqliteConnection,
    ctx: &EntryContext<'_>,
    plan: &MutationPlan,
    names: &HashMap<String, String>,
) -> DbResult<MutationOutcome> {
    let version = product::bump_version(conn, ctx.product, ctx.at).await?;
    product::write_locations(conn, &ctx.product.id, &plan.touched_locations()).await?;
    let entries = insert_entries(conn, ctx, plan, names).await?;

    Ok(MutationOutcome {
        product: Product {
            locations: plan.locations.clone(),
            version,
            updated_at: ctx.at,
            ..ctx.product.clone()
        },
        entries,
    })
}

async fn insert_entries(
    conn: &mut SqliteConnection,
    ctx: &EntryContext<'_>,
    plan: &MutationPlan,
    names: &HashMap<String, String>,
) -> DbResult<Vec<LedgerEntry>> {
    let mut entries = Vec::with_capacity(plan.movements.len());

    for movement in &plan.movements {
        let location_name = names
            .get(&movement.location_id)
            .map(String::as_str)
            .unwrap_or(movement.location_id.as_str());
        let entry = movement.to_entry(ctx, location_name);

        debug!(
            product = %entry.product_id,
            location = %entry.location_id,
            kind = %entry.kind,
            delta = entry.delta,
            "Appending ledger entry"
        );
        ledger::insert_entry(conn, &entry).await?;
        entries.push(entry);
    }

    Ok(entries)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use kardex_core::reports::verify_ledger;
    use kardex_core::{CoreError, MovementKind};

    struct Fixture {
        db: Database,
        engine: StockEngine,
        l1: String,
        l2: String,
        actor: Actor,
    }

    async fn fixture() -> Fixture {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let l1 = db.registry().create_location("Loja", None).await.unwrap().id;
        let l2 = db.registry().create_location("Depósito", None).await.unwrap().id;
        Fixture {
            engine: db.engine(),
            db,
            l1,
            l2,
            actor: Actor::new("u1", "Ana"),
        }
    }

    impl Fixture {
        async fn product(&self, stock: &[(&str, i64)]) -> Product {
            self.engine
                .create_product(
                    NewProduct {
                        name: "Parafuso M6".into(),
                        unit_cost_cents: 25,
                        initial_stock: stock
                            .iter()
                            .map(|(l, q)| (l.to_string(), *q))
                            .collect(),
                        ..Default::default()
                    },
                    &self.actor,
                )
                .await
                .unwrap()
                .product
        }

        async fn reload(&self, id: &str) -> Product {
            self.db.products().get_by_id(id).await.unwrap().unwrap()
        }
    }

    #[tokio::test]
    async fn test_entry_then_exit() {
        let f = fixture().await;
        let p = f.product(&[]).await;

        let entry = f
            .engine
            .apply_entry(&p.id, &f.l1, 10, Some("compra"), &f.actor)
            .await
            .unwrap();
        assert_eq!(entry.entries.len(), 1);
        assert_eq!(entry.entries[0].kind, MovementKind::InitialEntry);
        assert_eq!(entry.entries[0].location_name, "Loja");

        let exit = f.engine.apply_exit(&p.id, &f.l1, 3, None, &f.actor).await.unwrap();
        assert_eq!(exit.entries[0].kind, MovementKind::Exit);
        assert_eq!(exit.entries[0].delta, -3);
        assert_eq!(exit.entries[0].quantity_before, 10);
        assert_eq!(exit.entries[0].quantity_after, 7);

        let stored = f.reload(&p.id).await;
        assert_eq!(stored.locations.get(&f.l1), Some(&7));
        assert_eq!(stored.version, exit.product.version);
        assert_eq!(f.db.ledger().list_for_product(&p.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_second_entry_is_manual_adjustment() {
        let f = fixture().await;
        let p = f.product(&[(f.l1.as_str(), 1)]).await;

        f.engine.apply_exit(&p.id, &f.l1, 1, None, &f.actor).await.unwrap();
        let again = f.engine.apply_entry(&p.id, &f.l1, 2, None, &f.actor).await.unwrap();

        // Stocked there before, even though it reached zero.
        assert_eq!(again.entries[0].kind, MovementKind::ManualAdjustment);
    }

    #[tokio::test]
    async fn test_transfer_conserves_total() {
        let f = fixture().await;
        let p = f.product(&[(f.l1.as_str(), 10)]).await;

        let outcome = f
            .engine
            .apply_transfer(&p.id, &f.l1, &f.l2, 4, &f.actor)
            .await
            .unwrap();

        let [out, inn] = outcome.entries.as_slice() else {
            panic!("expected two entries, got {}", outcome.entries.len());
        };
        assert_eq!(out.kind, MovementKind::TransferOut);
        assert_eq!(out.delta, -4);
        assert_eq!(out.counterpart_location_id.as_deref(), Some(f.l2.as_str()));
        assert_eq!(inn.kind, MovementKind::TransferIn);
        assert_eq!(inn.delta, 4);
        assert_eq!(inn.counterpart_location_id.as_deref(), Some(f.l1.as_str()));

        let stored = f.reload(&p.id).await;
        assert_eq!(stored.locations.get(&f.l1), Some(&6));
        assert_eq!(stored.locations.get(&f.l2), Some(&4));
        assert_eq!(stored.total_quantity(), 10);
    }

    #[tokio::test]
    async fn test_insufficient_stock_changes_nothing() {
        let f = fixture().await;
        let p = f.product(&[(f.l1.as_str(), 2)]).await;
        let entries_before = f.db.ledger().count().await.unwrap();

        let err = f
            .engine
            .apply_exit(&p.id, &f.l1, 5, None, &f.actor)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DbError::Domain(CoreError::InsufficientStock {
                available: 2,
                requested: 5,
                ..
            })
        ));
        let stored = f.reload(&p.id).await;
        assert_eq!(stored.locations.get(&f.l1), Some(&2));
        assert_eq!(stored.version, p.version);
        assert_eq!(f.db.ledger().count().await.unwrap(), entries_before);
    }

    #[tokio::test]
    async fn test_transfer_shortfall_changes_nothing() {
        let f = fixture().await;
        let p = f.product(&[(f.l1.as_str(), 3)]).await;

        let err = f
            .engine
            .apply_transfer(&p.id, &f.l1, &f.l2, 4, &f.actor)
            .await
            .unwrap_err();

        assert!(matches!(err, DbError::Domain(CoreError::InsufficientStock { .. })));
        let stored = f.reload(&p.id).await;
        assert_eq!(stored.locations.get(&f.l1), Some(&3));
        assert_eq!(stored.locations.get(&f.l2), None);
    }

    #[tokio::test]
    async fn test_adjustment_sets_quantity_and_zero_delta_writes_nothing() {
        let f = fixture().await;
        let p = f.product(&[(f.l1.as_str(), 10)]).await;

        let adjusted = f
            .engine
            .apply_adjustment(&p.id, &f.l1, 4, Some("quebra"), &f.actor)
            .await
            .unwrap();
        assert_eq!(adjusted.entries[0].kind, MovementKind::ManualAdjustment);
        assert_eq!(adjusted.entries[0].delta, -6);

        let noop = f
            .engine
            .apply_adjustment(&p.id, &f.l1, 4, None, &f.actor)
            .await
            .unwrap();
        assert!(noop.entries.is_empty());
        assert_eq!(noop.product.version, adjusted.product.version);
        assert_eq!(f.db.ledger().list_for_product(&p.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_rejected_inputs() {
        let f = fixture().await;
        let p = f.product(&[(f.l1.as_str(), 5)]).await;

        assert!(matches!(
            f.engine.apply_entry(&p.id, &f.l1, 0, None, &f.actor).await,
            Err(DbError::Domain(CoreError::InvalidQuantity { .. }))
        ));
        assert!(matches!(
            f.engine.apply_adjustment(&p.id, &f.l1, -1, None, &f.actor).await,
            Err(DbError::Domain(CoreError::InvalidQuantity { .. }))
        ));
        assert!(matches!(
            f.engine.apply_transfer(&p.id, &f.l1, &f.l1, 1, &f.actor).await,
            Err(DbError::Domain(CoreError::InvalidTransfer { .. }))
        ));
        assert!(matches!(
            f.engine.apply_entry(&p.id, "nowhere", 1, None, &f.actor).await,
            Err(DbError::NotFound { .. })
        ));
        assert!(matches!(
            f.engine.apply_entry("missing", &f.l1, 1, None, &f.actor).await,
            Err(DbError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_change_feed_sees_commits_only() {
        let f = fixture().await;
        let p = f.product(&[(f.l1.as_str(), 5)]).await;
        let mut feed = f.engine.subscribe();

        f.engine.apply_exit(&p.id, &f.l1, 9, None, &f.actor).await.unwrap_err();
        f.engine.apply_exit(&p.id, &f.l1, 2, None, &f.actor).await.unwrap();

        match feed.recv().await.unwrap() {
            StockEvent::ProductChanged { product, entries } => {
                assert_eq!(product.locations.get(&f.l1), Some(&3));
                assert_eq!(entries.len(), 1);
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(feed.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_update_details_keeps_quantities() {
        let f = fixture().await;
        let p = f.product(&[(f.l1.as_str(), 5)]).await;

        let mut details = ProductDetails::from(&p);
        details.name = "Parafuso M6 inox".into();
        details.min_stock = 3;

        let updated = f.engine.update_product_details(&p.id, &details).await.unwrap();
        assert_eq!(updated.version, p.version + 1);

        let stored = f.reload(&p.id).await;
        assert_eq!(stored.name, "Parafuso M6 inox");
        assert_eq!(stored.min_stock, 3);
        assert_eq!(stored.locations, p.locations);
        assert_eq!(stored.version, updated.version);
    }

    #[tokio::test]
    async fn test_delete_keeps_history() {
        let f = fixture().await;
        let p = f.product(&[(f.l1.as_str(), 5)]).await;

        f.engine.delete_product(&p.id).await.unwrap();

        assert!(f.db.products().get_by_id(&p.id).await.unwrap().is_none());
        assert_eq!(f.db.ledger().list_for_product(&p.id).await.unwrap().len(), 1);
        assert!(matches!(
            f.engine.delete_product(&p.id).await,
            Err(DbError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_ledger_replays_to_current_state() {
        let f = fixture().await;
        let a = f.product(&[(f.l1.as_str(), 10), (f.l2.as_str(), 3)]).await;
        let b = f.product(&[]).await;

        f.engine.apply_transfer(&a.id, &f.l1, &f.l2, 4, &f.actor).await.unwrap();
        f.engine.apply_exit(&a.id, &f.l2, 7, None, &f.actor).await.unwrap();
        f.engine.apply_entry(&b.id, &f.l2, 8, None, &f.actor).await.unwrap();
        f.engine.apply_adjustment(&b.id, &f.l2, 5, None, &f.actor).await.unwrap();
        f.engine.apply_transfer(&b.id, &f.l2, &f.l1, 5, &f.actor).await.unwrap();

        let products = f.db.products().list().await.unwrap();
        let entries = f.db.ledger().list_all().await.unwrap();
        assert!(verify_ledger(&products, &entries).is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_exits_never_oversell() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(DbConfig::new(dir.path().join("kardex.db")).max_connections(4))
            .await
            .unwrap();
        let loc = db.registry().create_location("Loja", None).await.unwrap().id;
        let engine = db.engine();
        let p = engine
            .create_product(
                NewProduct {
                    name: "Caneta".into(),
                    initial_stock: [(loc.clone(), 10)].into(),
                    ..Default::default()
                },
                &Actor::system(),
            )
            .await
            .unwrap()
            .product;

        let handles: Vec<_> = (0..2)
            .map(|i| {
                let engine = engine.clone();
                let product_id = p.id.clone();
                let loc = loc.clone();
                tokio::spawn(async move {
                    let actor = Actor::new(format!("u{}", i), format!("Caixa {}", i));
                    engine.apply_exit(&product_id, &loc, 6, None, &actor).await
                })
            })
            .collect();

        let mut ok = 0;
        let mut insufficient = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => ok += 1,
                Err(DbError::Domain(CoreError::InsufficientStock { available: 4, .. })) => {
                    insufficient += 1
                }
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!((ok, insufficient), (1, 1));
        let stored = db.products().get_by_id(&p.id).await.unwrap().unwrap();
        assert_eq!(stored.locations.get(&loc), Some(&4));

        let exits = db
            .ledger()
            .list_for_product(&p.id)
            .await
            .unwrap()
            .into_iter()
            .filter(|e| e.kind == MovementKind::Exit)
            .count();
        assert_eq!(exits, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_products_can_be_created_from_spawned_tasks() {
        let f = fixture().await;

        let handles: Vec<_> = (0..3)
            .map(|i| {
                let engine = f.engine.clone();
                let actor = f.actor.clone();
                let loc = f.l1.clone();
                tokio::spawn(async move {
                    let new = NewProduct {
                        name: format!("Broca {}mm", i + 4),
                        initial_stock: [(loc, 5)].into(),
                        ..Default::default()
                    };
                    engine.create_product(new, &actor).await
                })
            })
            .collect();

        for handle in handles {
            let outcome = handle.await.unwrap().unwrap();
            assert_eq!(outcome.entries.len(), 1);
            assert_eq!(outcome.entries[0].location_name, "Loja");
        }
        assert_eq!(f.db.products().count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_insufficient_stock_names_the_location() {
        let f = fixture().await;
        let p = f.product(&[]).await;
        f.engine.apply_entry(&p.id, &f.l2, 2, None, &f.actor).await.unwrap();

        let err = f.engine.apply_exit(&p.id, &f.l2, 5, None, &f.actor).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "insufficient stock for Parafuso M6 at Depósito: 2 available, 5 requested"
        );
    }
}
