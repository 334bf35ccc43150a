//! End-to-end engine tests over the in-memory doubles.
//!
//! Covers the canonical allocation scenarios: checkout-code reuse, per-user
//! and per-sale caps, contended items, idempotent purchase, expiry, and the
//! exclusion key, plus the counter/cleanup side effects of a commit.

#![allow(clippy::unwrap_used)]

use chrono::{DateTime, Duration, Utc};

use flashsale_core::{Cache, CheckoutStore, Item, Limits, Sale, SaleError};
use flashsale_engine::{CheckoutFlow, PurchaseEngine};
use flashsale_testing::{MemoryCache, MemoryStore, TestClock};

const SALE_ID: &str = "S-00aa00aa00";

struct World {
    clock: TestClock,
    store: MemoryStore,
    cache: MemoryCache,
    checkout: CheckoutFlow<MemoryStore, MemoryStore, MemoryCache, TestClock>,
    purchase: PurchaseEngine<MemoryStore, MemoryStore, MemoryCache, TestClock>,
}

/// Build a world with an active sale of `total_items` items named `I1..In`.
fn world(total_items: i32, limits: Limits) -> World {
    let start: DateTime<Utc> = "2026-07-01T10:00:00Z".parse().unwrap();
    let clock = TestClock::new(start + Duration::minutes(10));
    let store = MemoryStore::new(clock.clone());
    let cache = MemoryCache::new();

    let sale = Sale::new(SALE_ID, start, start + Duration::hours(1), total_items, start).unwrap();
    let items = (1..=total_items)
        .map(|i| {
            Item::new(
                format!("I{i}"),
                SALE_ID,
                format!("Item {i}"),
                "https://picsum.photos/300/300",
                start + Duration::seconds(i64::from(i)),
            )
        })
        .collect();
    store.seed_sale(sale, items);

    let checkout = CheckoutFlow::new(
        store.clone(),
        store.clone(),
        cache.clone(),
        clock.clone(),
        limits,
    );
    let purchase = PurchaseEngine::new(
        store.clone(),
        store.clone(),
        cache.clone(),
        clock.clone(),
        limits,
    );

    World {
        clock,
        store,
        cache,
        checkout,
        purchase,
    }
}

fn default_world() -> World {
    world(10, Limits::default())
}

#[tokio::test]
async fn checkout_reuses_code_and_purchase_commits_all_items() {
    let w = default_world();

    let first = w.checkout.checkout("u1", "I1").await.unwrap();
    let second = w.checkout.checkout("u1", "I2").await.unwrap();

    assert_eq!(first.code, second.code);
    assert_eq!(first.items_count, 1);
    assert_eq!(second.items_count, 2);
    assert_eq!(second.sale_ends_at, w.store.sale_snapshot(SALE_ID).unwrap().ended_at);

    let result = w.purchase.purchase(&first.code).await.unwrap();
    assert!(result.success);
    assert_eq!(result.total_purchased, 2);
    assert_eq!(result.failed_count, 0);
    assert!(result.items.iter().all(|item| item.sold));

    // Durable truths.
    for id in ["I1", "I2"] {
        let item = w.store.item_snapshot(id).unwrap();
        assert!(item.sold);
        assert_eq!(item.sold_to_user_id.as_deref(), Some("u1"));
        assert!(item.sold_at.is_some());
    }
    assert_eq!(w.store.sale_snapshot(SALE_ID).unwrap().items_sold, 2);
    assert_eq!(
        w.store.purchase_result_snapshot(&first.code).unwrap(),
        result
    );

    // Derived counters reconciled, coordination state cleaned up.
    assert_eq!(w.cache.sale_items_sold(SALE_ID).await.unwrap(), 2);
    assert_eq!(w.cache.user_item_count(SALE_ID, "u1").await.unwrap(), 2);
    assert_eq!(
        w.cache.user_checkout_code(SALE_ID, "u1").await.unwrap(),
        None
    );
    assert!(!w.cache.checkout_code_exists(&first.code).await.unwrap());
    assert!(matches!(
        w.store.checkout_by_code(&first.code).await,
        Err(SaleError::CheckoutNotFound)
    ));
}

#[tokio::test]
async fn checkout_rejects_item_beyond_user_cap() {
    let w = world(
        10,
        Limits {
            max_items_per_user: 2,
            max_items_per_sale: 10,
        },
    );

    w.checkout.checkout("u1", "I1").await.unwrap();
    w.checkout.checkout("u1", "I2").await.unwrap();
    assert_eq!(
        w.checkout.checkout("u1", "I3").await.unwrap_err(),
        SaleError::UserLimitExceeded
    );
}

#[tokio::test]
async fn checkout_rejects_duplicate_item_for_user() {
    let w = default_world();

    w.checkout.checkout("u1", "I1").await.unwrap();
    assert_eq!(
        w.checkout.checkout("u1", "I1").await.unwrap_err(),
        SaleError::UserAlreadyCheckedOutItem
    );
}

#[tokio::test]
async fn contended_item_has_exactly_one_winner() {
    let w = default_world();

    let code_u1 = w.checkout.checkout("u1", "I1").await.unwrap().code;
    let code_u2 = w.checkout.checkout("u2", "I1").await.unwrap().code;
    assert_ne!(code_u1, code_u2);

    let (r1, r2) = tokio::join!(w.purchase.purchase(&code_u1), w.purchase.purchase(&code_u2));

    let winners = [&r1, &r2].iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1, "exactly one purchase must win: {r1:?} / {r2:?}");
    let loser = if r1.is_ok() { r2 } else { r1 };
    assert_eq!(loser.unwrap_err(), SaleError::AllItemsSold);

    let item = w.store.item_snapshot("I1").unwrap();
    assert!(item.sold);
    let buyer = item.sold_to_user_id.unwrap();
    assert!(buyer == "u1" || buyer == "u2");
    assert_eq!(w.store.sale_snapshot(SALE_ID).unwrap().items_sold, 1);
}

#[tokio::test]
async fn losing_purchase_reports_partial_failure() {
    let w = default_world();

    let code_u1 = w.checkout.checkout("u1", "I1").await.unwrap().code;
    w.checkout.checkout("u2", "I1").await.unwrap();
    let code_u2 = w.checkout.checkout("u2", "I2").await.unwrap().code;

    w.purchase.purchase(&code_u1).await.unwrap();

    let result = w.purchase.purchase(&code_u2).await.unwrap();
    assert_eq!(result.total_purchased, 1);
    assert_eq!(result.failed_count, 1);
    let by_id = |id: &str| result.items.iter().find(|i| i.id == id).unwrap();
    assert!(!by_id("I1").sold);
    assert!(by_id("I2").sold);

    assert_eq!(
        w.store.item_snapshot("I1").unwrap().sold_to_user_id.as_deref(),
        Some("u1")
    );
    assert_eq!(
        w.store.item_snapshot("I2").unwrap().sold_to_user_id.as_deref(),
        Some("u2")
    );
}

#[tokio::test]
async fn repeated_purchase_is_rejected_without_state_change() {
    let w = default_world();

    let code = w.checkout.checkout("u1", "I1").await.unwrap().code;
    w.purchase.purchase(&code).await.unwrap();

    let snapshot_sale = w.store.sale_snapshot(SALE_ID).unwrap();
    let snapshot_result = w.store.purchase_result_snapshot(&code).unwrap();

    assert_eq!(
        w.purchase.purchase(&code).await.unwrap_err(),
        SaleError::CheckoutAlreadyProcessed
    );

    assert_eq!(w.store.sale_snapshot(SALE_ID).unwrap(), snapshot_sale);
    assert_eq!(
        w.store.purchase_result_snapshot(&code).unwrap(),
        snapshot_result
    );
    assert_eq!(w.cache.sale_items_sold(SALE_ID).await.unwrap(), 1);
}

#[tokio::test]
async fn concurrent_same_code_purchases_commit_once() {
    let w = default_world();

    let code = w.checkout.checkout("u1", "I1").await.unwrap().code;
    let (r1, r2) = tokio::join!(w.purchase.purchase(&code), w.purchase.purchase(&code));

    let winners = [&r1, &r2].iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1, "one call commits: {r1:?} / {r2:?}");
    let loser = if r1.is_ok() { r2 } else { r1 };
    assert!(matches!(
        loser.unwrap_err(),
        SaleError::PurchaseInProgress | SaleError::CheckoutAlreadyProcessed
    ));

    assert_eq!(w.store.sale_snapshot(SALE_ID).unwrap().items_sold, 1);
    assert_eq!(w.cache.sale_items_sold(SALE_ID).await.unwrap(), 1);
}

#[tokio::test]
async fn checkout_after_sale_end_is_rejected() {
    let w = default_world();

    w.clock.advance(Duration::hours(2));
    assert_eq!(
        w.checkout.checkout("u1", "I1").await.unwrap_err(),
        SaleError::SaleNotActive
    );
}

#[tokio::test]
async fn purchase_after_sale_end_is_rejected_as_expired() {
    let w = default_world();

    let code = w.checkout.checkout("u1", "I1").await.unwrap().code;
    w.clock.advance(Duration::hours(2));

    assert_eq!(
        w.purchase.purchase(&code).await.unwrap_err(),
        SaleError::CheckoutExpired
    );
    assert!(!w.store.item_snapshot("I1").unwrap().sold);
}

#[tokio::test]
async fn purchase_of_unknown_code_is_not_found() {
    let w = default_world();
    assert_eq!(
        w.purchase
            .purchase("CHK-S-00aa00aa00-deadbeefdeadbeef")
            .await
            .unwrap_err(),
        SaleError::CheckoutNotFound
    );
}

#[tokio::test]
async fn purchase_behind_held_lock_is_denied() {
    let w = default_world();

    let code = w.checkout.checkout("u1", "I1").await.unwrap().code;
    assert!(w
        .cache
        .acquire_lock(&format!("purchase:{code}"), Duration::seconds(3))
        .await
        .unwrap());

    assert_eq!(
        w.purchase.purchase(&code).await.unwrap_err(),
        SaleError::PurchaseInProgress
    );

    // Nothing committed while the exclusion key was held elsewhere.
    assert!(!w.store.item_snapshot("I1").unwrap().sold);
}

#[tokio::test]
async fn lock_is_released_after_purchase() {
    let w = default_world();

    let code = w.checkout.checkout("u1", "I1").await.unwrap().code;
    w.purchase.purchase(&code).await.unwrap();
    assert!(!w.cache.lock_held(&format!("purchase:{code}")));

    // Business failures release it too.
    let code2 = w.checkout.checkout("u2", "I2").await.unwrap().code;
    w.purchase.purchase(&code2).await.unwrap();
    assert_eq!(
        w.purchase.purchase(&code2).await.unwrap_err(),
        SaleError::CheckoutAlreadyProcessed
    );
    assert!(!w.cache.lock_held(&format!("purchase:{code2}")));
}

#[tokio::test]
async fn advisory_sale_counter_rejects_exhausted_sale() {
    let w = default_world();

    let code = w.checkout.checkout("u1", "I1").await.unwrap().code;
    // Derived counter says the sale is fully committed.
    w.cache
        .set_sale_items_sold(SALE_ID, Limits::default().max_items_per_sale)
        .await
        .unwrap();

    assert_eq!(
        w.purchase.purchase(&code).await.unwrap_err(),
        SaleError::SaleLimitExceeded
    );
}

#[tokio::test]
async fn user_counter_at_cap_blocks_further_checkout() {
    let w = default_world();

    // User already owns the per-sale maximum (e.g. from earlier purchases).
    w.cache
        .increment_counters(SALE_ID, "u1", Limits::default().max_items_per_user)
        .await
        .unwrap();

    assert_eq!(
        w.checkout.checkout("u1", "I1").await.unwrap_err(),
        SaleError::UserLimitExceeded
    );
}

#[tokio::test]
async fn exhausted_inventory_blocks_checkout_of_sold_items() {
    let w = world(3, Limits::default());

    for item in ["I1", "I2", "I3"] {
        w.checkout.checkout("u1", item).await.unwrap();
    }
    let code = w.cache.user_checkout_code(SALE_ID, "u1").await.unwrap().unwrap();
    let result = w.purchase.purchase(&code).await.unwrap();
    assert_eq!(result.total_purchased, 3);

    // Every item is sold now; any further checkout hits a guard.
    assert_eq!(
        w.checkout.checkout("u2", "I2").await.unwrap_err(),
        SaleError::ItemAlreadySold
    );
}

#[tokio::test]
async fn sold_item_is_rejected_at_checkout_via_authoritative_check() {
    let w = default_world();

    let code = w.checkout.checkout("u1", "I1").await.unwrap().code;
    w.purchase.purchase(&code).await.unwrap();

    // u2 never saw I1 before; filter and durable store agree it is gone.
    assert_eq!(
        w.checkout.checkout("u2", "I1").await.unwrap_err(),
        SaleError::ItemAlreadySold
    );
}

#[tokio::test]
async fn checkout_validates_inputs() {
    let w = default_world();
    assert!(matches!(
        w.checkout.checkout("", "I1").await.unwrap_err(),
        SaleError::Validation(_)
    ));
    assert!(matches!(
        w.checkout.checkout("u1", "").await.unwrap_err(),
        SaleError::Validation(_)
    ));
    assert_eq!(
        w.checkout.checkout("u1", "nope").await.unwrap_err(),
        SaleError::ItemNotFound
    );
}

#[tokio::test]
async fn purchase_logs_audit_attempts() {
    let w = default_world();

    let code = w.checkout.checkout("u1", "I1").await.unwrap().code;
    w.checkout.checkout("u1", "I2").await.unwrap();
    w.purchase.purchase(&code).await.unwrap();

    assert_eq!(w.store.logged_attempts(&code), 2);
}

#[tokio::test]
async fn many_users_cannot_oversell_inventory() {
    let w = world(3, Limits::default());

    // Five users all want the same three items.
    let mut codes = Vec::new();
    for user in ["u1", "u2", "u3", "u4", "u5"] {
        for item in ["I1", "I2", "I3"] {
            let _ = w.checkout.checkout(user, item).await;
        }
        if let Some(code) = w.cache.user_checkout_code(SALE_ID, user).await.unwrap() {
            codes.push(code);
        }
    }

    let results = purchase_all(&w, codes).await;

    let total_sold: i64 = results
        .iter()
        .filter_map(|r| r.as_ref().ok())
        .map(|r| r.total_purchased)
        .sum();
    assert_eq!(total_sold, 3, "inventory of 3 must sell exactly 3");

    let sale = w.store.sale_snapshot(SALE_ID).unwrap();
    assert_eq!(sale.items_sold, 3);
    for item in ["I1", "I2", "I3"] {
        assert!(w.store.item_snapshot(item).unwrap().sold);
    }
}

async fn purchase_all(
    w: &World,
    codes: Vec<String>,
) -> Vec<Result<flashsale_core::PurchaseResult, SaleError>> {
    let mut results = Vec::new();
    for code in codes {
        results.push(w.purchase.purchase(&code).await);
    }
    results
}
