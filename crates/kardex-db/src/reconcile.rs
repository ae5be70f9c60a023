//! # Count Reconciliation
//!
//! Persists the count session workflow and applies a finished count to
//! stock in a single transaction.
//!
//! ## Session Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  start_count ──► in_progress ──finalize──► completed ──apply──► applied│
//! │                     │  ▲                                     (terminal) │
//! │        record_count │  │                                                │
//! │                     └──┘                                                │
//! │                                                                         │
//! │  apply_adjustments(session):                                           │
//! │    BEGIN                                                               │
//! │    ├── for each line with counted ≠ expected:                          │
//! │    │     read product now, difference = counted − current total        │
//! │    │     surplus  → main location (or the default location)            │
//! │    │     shortage → fullest locations first                            │
//! │    │     manual_adjustment entries tagged with the session id          │
//! │    ├── UPDATE count_sessions SET status = 'applied'                    │
//! │    │     WHERE status = 'completed'    ← loser of a race sees 0 rows   │
//! │    COMMIT   (any failure: nothing applied, session stays completed)    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use kardex_core::count::plan_count_adjustment;
use kardex_core::mutation::EntryContext;
use kardex_core::{
    Actor, CountSession, CountStatus, LedgerEntry, MutationPlanner, Product,
    COUNT_ADJUSTMENT_REASON,
};

use crate::engine::{write_plan, StockEngine, StockEvent};
use crate::error::{DbError, DbResult};
use crate::repository::{count, product, registry};

/// Result of applying a count.
#[derive(Debug, Clone, Serialize)]
pub struct CountApplyOutcome {
    /// The session, now `applied`.
    pub session: CountSession,

    /// Products whose quantities changed, as committed.
    pub products: Vec<Product>,

    /// Every adjustment entry written.
    pub entries: Vec<LedgerEntry>,
}

/// Count session workflow over the stock engine.
#[derive(Debug, Clone)]
pub struct Reconciler {
    engine: StockEngine,
    default_location: Option<String>,
}

impl Reconciler {
    pub fn new(engine: StockEngine, default_location: Option<String>) -> Self {
        Reconciler {
            engine,
            default_location,
        }
    }

    /// Opens a session over every product, expecting each one's current total.
    pub async fn start_count(&self, actor: &Actor) -> DbResult<CountSession> {
        let tenant_id = self.engine.tenant_id();
        let mut tx = self.engine.pool().begin().await?;

        let products = product::fetch_products(&mut tx, tenant_id).await?;
        let session = CountSession::start(tenant_id, &products, actor, Utc::now());
        count::insert_session(&mut tx, &session).await?;

        tx.commit().await?;

        info!(
            session = %session.id,
            lines = session.lines.len(),
            user = %actor.user_id,
            "Count session started"
        );
        Ok(session)
    }

    /// Records the quantity found for one product.
    pub async fn record_count(
        &self,
        session_id: &str,
        product_id: &str,
        quantity: i64,
    ) -> DbResult<CountSession> {
        self.engine
            .retry_policy()
            .run("record_count", move || async move {
                self.try_record(session_id, product_id, quantity).await
            })
            .await
    }

    async fn try_record(
        &self,
        session_id: &str,
        product_id: &str,
        quantity: i64,
    ) -> DbResult<CountSession> {
        let mut tx = self.engine.pool().begin().await?;
        let mut session = count::require_session(&mut tx, self.engine.tenant_id(), session_id).await?;

        session.record_counted_quantity(product_id, quantity)?;
        count::save_lines(&mut tx, &session).await?;

        tx.commit().await?;
        Ok(session)
    }

    /// Locks the session's lines. Uncounted lines need `confirm_defaults`
    /// and are then recorded as 0.
    pub async fn finalize_count(
        &self,
        session_id: &str,
        confirm_defaults: bool,
    ) -> DbResult<CountSession> {
        let session = self
            .engine
            .retry_policy()
            .run("finalize_count", move || async move {
                self.try_finalize(session_id, confirm_defaults).await
            })
            .await?;

        info!(
            session = %session.id,
            variances = session.variances().len(),
            "Count session completed"
        );
        Ok(session)
    }

    async fn try_finalize(&self, session_id: &str, confirm_defaults: bool) -> DbResult<CountSession> {
        let mut tx = self.engine.pool().begin().await?;
        let mut session = count::require_session(&mut tx, self.engine.tenant_id(), session_id).await?;

        session.finalize(confirm_defaults, Utc::now())?;
        count::save_lines(&mut tx, &session).await?;
        if !count::save_status(&mut tx, &session, CountStatus::InProgress).await? {
            return Err(stale_session(session_id));
        }

        tx.commit().await?;
        Ok(session)
    }

    /// Brings every product with a variance to its counted total and marks
    /// the session applied, all in one transaction.
    ///
    /// A session can be applied once; later calls fail with `AlreadyApplied`.
    pub async fn apply_adjustments(
        &self,
        session_id: &str,
        actor: &Actor,
    ) -> DbResult<CountApplyOutcome> {
        let outcome = self
            .engine
            .retry_policy()
            .run("apply_count", move || async move {
                self.try_apply(session_id, actor).await
            })
            .await?;

        info!(
            session = %session_id,
            products = outcome.products.len(),
            entries = outcome.entries.len(),
            user = %actor.user_id,
            "Count adjustments applied"
        );
        self.engine.publish(StockEvent::CountApplied {
            session_id: session_id.to_string(),
            products: outcome.products.clone(),
            entries: outcome.entries.clone(),
        });

        Ok(outcome)
    }

    async fn try_apply(&self, session_id: &str, actor: &Actor) -> DbResult<CountApplyOutcome> {
        let tenant_id = self.engine.tenant_id();
        let mut tx = self.engine.pool().begin().await?;

        let mut session = count::require_session(&mut tx, tenant_id, session_id).await?;
        session.ensure_can_apply()?;

        let at = Utc::now();
        let counted: Vec<(String, i64)> = session
            .lines_to_adjust()
            .filter_map(|l| l.counted_quantity.map(|c| (l.product_id.clone(), c)))
            .collect();

        let mut products = Vec::new();
        let mut entries = Vec::new();

        for (product_id, counted) in &counted {
            let Some(current) = product::fetch_product(&mut tx, tenant_id, product_id).await? else {
                warn!(session = %session_id, product = %product_id, "Counted product was deleted, skipping");
                continue;
            };

            let mutations =
                plan_count_adjustment(&current, *counted, self.default_location.as_deref())?;
            let mut planner = MutationPlanner::new(&current);
            for mutation in &mutations {
                planner.apply(mutation)?;
            }
            let plan = planner.finish();
            if plan.is_noop() {
                continue;
            }

            let names = registry::location_names(&mut tx, tenant_id, &plan.location_ids()).await?;
            let ctx = EntryContext {
                product: &current,
                actor,
                reason: Some(COUNT_ADJUSTMENT_REASON),
                count_session_id: Some(session_id),
                at,
            };
            let outcome = write_plan(&mut tx, &ctx, &plan, &names).await?;

            products.push(outcome.product);
            entries.extend(outcome.entries);
        }

        session.mark_applied(actor, at)?;
        if !count::save_status(&mut tx, &session, CountStatus::Completed).await? {
            return Err(stale_session(session_id));
        }

        tx.commit().await?;

        Ok(CountApplyOutcome {
            session,
            products,
            entries,
        })
    }
}

fn stale_session(session_id: &str) -> DbError {
    DbError::StaleVersion {
        entity: "CountSession".to_string(),
        id: session_id.to_string(),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use kardex_core::reports::verify_ledger;
    use kardex_core::{CoreError, MovementKind, NewProduct};

    struct Fixture {
        db: Database,
        l1: String,
        l2: String,
        actor: Actor,
    }

    async fn fixture() -> Fixture {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let l1 = db.registry().create_location("Loja", None).await.unwrap().id;
        let l2 = db.registry().create_location("Depósito", None).await.unwrap().id;
        Fixture {
            db,
            l1,
            l2,
            actor: Actor::new("u1", "Ana"),
        }
    }

    impl Fixture {
        async fn product(&self, name: &str, stock: &[(&str, i64)]) -> Product {
            self.db
                .engine()
                .create_product(
                    NewProduct {
                        name: name.into(),
                        initial_stock: stock.iter().map(|(l, q)| (l.to_string(), *q)).collect(),
                        ..Default::default()
                    },
                    &self.actor,
                )
                .await
                .unwrap()
                .product
        }

        async fn total(&self, id: &str) -> i64 {
            self.db
                .products()
                .get_by_id(id)
                .await
                .unwrap()
                .unwrap()
                .total_quantity()
        }
    }

    #[tokio::test]
    async fn test_count_shortage_is_reconciled() {
        let f = fixture().await;
        let rec = f.db.reconciler(None);
        let p = f.product("Cabo HDMI", &[(f.l1.as_str(), 50)]).await;

        let session = rec.start_count(&f.actor).await.unwrap();
        assert_eq!(session.lines[0].expected_quantity, 50);

        rec.record_count(&session.id, &p.id, 47).await.unwrap();
        rec.finalize_count(&session.id, false).await.unwrap();
        let outcome = rec.apply_adjustments(&session.id, &f.actor).await.unwrap();

        assert_eq!(outcome.session.status, CountStatus::Applied);
        assert_eq!(outcome.entries.len(), 1);
        let entry = &outcome.entries[0];
        assert_eq!(entry.kind, MovementKind::ManualAdjustment);
        assert_eq!(entry.delta, -3);
        assert_eq!(entry.reason.as_deref(), Some(COUNT_ADJUSTMENT_REASON));
        assert_eq!(entry.count_session_id.as_deref(), Some(session.id.as_str()));
        assert_eq!(f.total(&p.id).await, 47);

        let stored = f.db.counts().get(&session.id).await.unwrap().unwrap();
        assert_eq!(stored.status, CountStatus::Applied);
        assert_eq!(stored.applied_by.as_deref(), Some("u1"));
        assert_eq!(f.db.ledger().list_for_session(&session.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_second_apply_is_rejected() {
        let f = fixture().await;
        let rec = f.db.reconciler(None);
        let p = f.product("Cabo", &[(f.l1.as_str(), 5)]).await;

        let session = rec.start_count(&f.actor).await.unwrap();
        rec.record_count(&session.id, &p.id, 2).await.unwrap();
        rec.finalize_count(&session.id, false).await.unwrap();
        rec.apply_adjustments(&session.id, &f.actor).await.unwrap();
        let entries = f.db.ledger().count().await.unwrap();

        let err = rec.apply_adjustments(&session.id, &f.actor).await.unwrap_err();
        assert!(matches!(err, DbError::Domain(CoreError::AlreadyApplied { .. })));
        assert_eq!(f.db.ledger().count().await.unwrap(), entries);
        assert_eq!(f.total(&p.id).await, 2);

        assert!(matches!(
            rec.record_count(&session.id, &p.id, 9).await,
            Err(DbError::Domain(CoreError::AlreadyApplied { .. }))
        ));
    }

    #[tokio::test]
    async fn test_state_machine_cannot_skip() {
        let f = fixture().await;
        let rec = f.db.reconciler(None);
        let p = f.product("Cabo", &[(f.l1.as_str(), 5)]).await;
        let session = rec.start_count(&f.actor).await.unwrap();

        assert!(matches!(
            rec.apply_adjustments(&session.id, &f.actor).await,
            Err(DbError::Domain(CoreError::InvalidCountState { .. }))
        ));
        assert!(matches!(
            rec.finalize_count(&session.id, false).await,
            Err(DbError::Domain(CoreError::UncountedLines { count: 1 }))
        ));
        assert!(matches!(
            rec.record_count(&session.id, "unknown", 1).await,
            Err(DbError::Domain(CoreError::NotFound { .. }))
        ));
        assert!(matches!(
            rec.record_count(&session.id, &p.id, -1).await,
            Err(DbError::Domain(CoreError::InvalidQuantity { .. }))
        ));

        rec.finalize_count(&session.id, true).await.unwrap();
        assert!(matches!(
            rec.record_count(&session.id, &p.id, 3).await,
            Err(DbError::Domain(CoreError::InvalidCountState { .. }))
        ));
        rec.start_count(&f.actor).await.unwrap();
        assert!(matches!(
            rec.apply_adjustments("missing", &f.actor).await,
            Err(DbError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_confirmed_defaults_empty_every_location() {
        let f = fixture().await;
        let rec = f.db.reconciler(None);
        let p = f
            .product("Fita", &[(f.l1.as_str(), 3), (f.l2.as_str(), 7)])
            .await;

        let session = rec.start_count(&f.actor).await.unwrap();
        rec.finalize_count(&session.id, true).await.unwrap();
        let outcome = rec.apply_adjustments(&session.id, &f.actor).await.unwrap();

        // Fullest location first.
        let deltas: Vec<_> = outcome
            .entries
            .iter()
            .map(|e| (e.location_id.clone(), e.delta))
            .collect();
        assert_eq!(deltas, vec![(f.l2.clone(), -7), (f.l1.clone(), -3)]);
        assert_eq!(f.total(&p.id).await, 0);
    }

    #[tokio::test]
    async fn test_surplus_goes_to_main_location() {
        let f = fixture().await;
        let rec = f.db.reconciler(None);
        let p = f
            .product("Fita", &[(f.l1.as_str(), 2), (f.l2.as_str(), 6)])
            .await;

        let session = rec.start_count(&f.actor).await.unwrap();
        rec.record_count(&session.id, &p.id, 11).await.unwrap();
        rec.finalize_count(&session.id, false).await.unwrap();
        let outcome = rec.apply_adjustments(&session.id, &f.actor).await.unwrap();

        assert_eq!(outcome.entries.len(), 1);
        assert_eq!(outcome.entries[0].location_id, f.l2);
        assert_eq!(outcome.entries[0].delta, 3);
        assert_eq!(f.total(&p.id).await, 11);
    }

    #[tokio::test]
    async fn test_surplus_without_locations_needs_default() {
        let f = fixture().await;
        let p = f.product("Novo", &[]).await;

        let rec = f.db.reconciler(None);
        let session = rec.start_count(&f.actor).await.unwrap();
        rec.record_count(&session.id, &p.id, 4).await.unwrap();
        rec.finalize_count(&session.id, false).await.unwrap();

        assert!(matches!(
            rec.apply_adjustments(&session.id, &f.actor).await,
            Err(DbError::Domain(CoreError::NoReceivingLocation { quantity: 4, .. }))
        ));
        let stored = f.db.counts().get(&session.id).await.unwrap().unwrap();
        assert_eq!(stored.status, CountStatus::Completed);

        let with_default = f.db.reconciler(Some(f.l1.clone()));
        with_default.apply_adjustments(&session.id, &f.actor).await.unwrap();
        let product = f.db.products().get_by_id(&p.id).await.unwrap().unwrap();
        assert_eq!(product.locations.get(&f.l1), Some(&4));
    }

    #[tokio::test]
    async fn test_difference_uses_quantity_at_apply_time() {
        let f = fixture().await;
        let rec = f.db.reconciler(None);
        let p = f.product("Caneta", &[(f.l1.as_str(), 10)]).await;

        let session = rec.start_count(&f.actor).await.unwrap();
        rec.record_count(&session.id, &p.id, 8).await.unwrap();
        rec.finalize_count(&session.id, false).await.unwrap();

        // Sold between the count and its approval.
        f.db.engine()
            .apply_exit(&p.id, &f.l1, 4, None, &f.actor)
            .await
            .unwrap();

        let outcome = rec.apply_adjustments(&session.id, &f.actor).await.unwrap();
        assert_eq!(outcome.entries[0].delta, 2);
        assert_eq!(f.total(&p.id).await, 8);

        let products = f.db.products().list().await.unwrap();
        let entries = f.db.ledger().list_all().await.unwrap();
        assert!(verify_ledger(&products, &entries).is_empty());
    }

    #[tokio::test]
    async fn test_failure_rolls_back_every_product() {
        let f = fixture().await;
        let rec = f.db.reconciler(None);
        let a = f.product("A", &[(f.l1.as_str(), 5)]).await;
        let b = f.product("B", &[]).await;

        let session = rec.start_count(&f.actor).await.unwrap();
        rec.record_count(&session.id, &a.id, 1).await.unwrap();
        rec.record_count(&session.id, &b.id, 2).await.unwrap();
        rec.finalize_count(&session.id, false).await.unwrap();

        // B has nowhere to receive its surplus.
        assert!(rec.apply_adjustments(&session.id, &f.actor).await.is_err());
        assert_eq!(f.total(&a.id).await, 5);
        assert!(f.db.ledger().list_for_session(&session.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sessions_are_listed_newest_first() {
        let f = fixture().await;
        let rec = f.db.reconciler(None);
        f.product("A", &[(f.l1.as_str(), 1)]).await;

        let first = rec.start_count(&f.actor).await.unwrap();
        let second = rec.start_count(&f.actor).await.unwrap();
        rec.finalize_count(&first.id, true).await.unwrap();

        let all = f.db.counts().list().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, second.id);

        let completed = f.db.counts().list_by_status(CountStatus::Completed).await.unwrap();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].id, first.id);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_apply_happens_once() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(DbConfig::new(dir.path().join("kardex.db")).max_connections(4))
            .await
            .unwrap();
        let loc = db.registry().create_location("Loja", None).await.unwrap().id;
        let actor = Actor::new("u1", "Ana");
        let p = db
            .engine()
            .create_product(
                NewProduct {
                    name: "Caneta".into(),
                    initial_stock: [(loc, 10)].into(),
                    ..Default::default()
                },
                &actor,
            )
            .await
            .unwrap()
            .product;

        let rec = db.reconciler(None);
        let session = rec.start_count(&actor).await.unwrap();
        rec.record_count(&session.id, &p.id, 7).await.unwrap();
        rec.finalize_count(&session.id, false).await.unwrap();

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let rec = rec.clone();
                let session_id = session.id.clone();
                let actor = actor.clone();
                tokio::spawn(async move { rec.apply_adjustments(&session_id, &actor).await })
            })
            .collect();

        let mut applied = 0;
        let mut rejected = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => applied += 1,
                Err(DbError::Domain(CoreError::AlreadyApplied { .. })) => rejected += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!((applied, rejected), (1, 1));
        let stored = db.products().get_by_id(&p.id).await.unwrap().unwrap();
        assert_eq!(stored.total_quantity(), 7);
        assert_eq!(db.ledger().list_for_session(&session.id).await.unwrap().len(), 1);
    }
}
