//! Live feed reconciliation across the full application.
//!
//! Each test boots the whole `ShopApp` against in-process fakes, fills the
//! cart through the real storefront flow, publishes admin events on the bus,
//! and asserts what the cart does about them.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use cyclery_core::event_bus::EventBus;
use cyclery_storefront::app::AddToCartOutcome;
use cyclery_storefront::config::{ApiConfig, CartConfig, FeedConfig, ObservabilityConfig};
use cyclery_storefront::storage::MemoryCartStorage;
use cyclery_storefront::{
    CartItem, CartLineId, InMemoryShopApi, Money, NavigationTarget, Notice, Part, PartId, Product,
    ProductId, ShopApi, ShopApp, ShopConfig, ShopEvent,
};
use cyclery_testing::{InMemoryEventBus, feed_event};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Fixtures
// ============================================================================

fn test_config() -> ShopConfig {
    ShopConfig {
        api: ApiConfig {
            base_url: "http://localhost:0/api".to_string(),
            timeout_secs: 5,
        },
        feed: FeedConfig {
            brokers: "localhost:9092".to_string(),
            topic: "shop-events".to_string(),
            consumer_group: "storefront-tests".to_string(),
        },
        cart: CartConfig {
            path: "unused.json".to_string(),
        },
        observability: ObservabilityConfig {
            metrics_addr: "127.0.0.1:0".to_string(),
            log_filter: "warn".to_string(),
        },
    }
}

fn product(id: &str, name: &str) -> Product {
    Product {
        id: ProductId::new(id.to_string()),
        name: name.to_string(),
        type_product: "bicycle".to_string(),
        base_price: Money::from_cents(80_000),
        is_available: true,
        restrictions: HashMap::new(),
    }
}

fn part(id: &str, category: &str, value: &str, quantity: u32) -> Part {
    Part {
        id: PartId::new(id.to_string()),
        type_product: "bicycle".to_string(),
        category: category.to_string(),
        value: value.to_string(),
        price: Money::from_cents(8_000),
        quantity,
        is_available: true,
    }
}

async fn boot(
    products: Vec<Product>,
    parts: Vec<Part>,
) -> (ShopApp, Arc<InMemoryShopApi>, Arc<InMemoryEventBus>) {
    let api = Arc::new(InMemoryShopApi::with_catalog(products, parts));
    let bus = Arc::new(InMemoryEventBus::new());
    let app = ShopApp::with_collaborators(
        test_config(),
        Arc::clone(&api) as Arc<dyn ShopApi>,
        Arc::clone(&bus) as Arc<dyn EventBus>,
        Arc::new(MemoryCartStorage::new()),
    )
    .await;
    app.start().await.unwrap();
    (app, api, bus)
}

/// Fills the cart with `lines` copies of road wheels + full-suspension on
/// the given product, through the real selection flow.
async fn fill_cart(app: &ShopApp, product_id: &str, lines: usize) {
    app.refresh_catalog().await.unwrap();
    app.open_product(&ProductId::new(product_id.to_string()))
        .await
        .unwrap();
    app.choose("Wheels", &PartId::new("w1".to_string()))
        .await
        .unwrap();
    app.choose("Frame Type", &PartId::new("f1".to_string()))
        .await
        .unwrap();
    for _ in 0..lines {
        let outcome = app.add_to_cart().await.unwrap();
        assert!(
            matches!(outcome, AddToCartOutcome::Added { .. }),
            "seeding the cart failed: {outcome:?}"
        );
    }
}

async fn publish(bus: &InMemoryEventBus, event: &ShopEvent) {
    bus.publish("shop-events", &feed_event(event)).await.unwrap();
}

/// Polls the cart until `accept` passes or two seconds elapse, returning the
/// last observed items either way.
async fn cart_settles<P>(app: &ShopApp, accept: P) -> Vec<CartItem>
where
    P: Fn(&[CartItem]) -> bool,
{
    let mut items = app.cart_items().await;
    for _ in 0..40 {
        if accept(&items) {
            return items;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        items = app.cart_items().await;
    }
    items
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn quantity_shrink_evicts_only_the_newest_line() {
    let (app, _api, bus) = boot(
        vec![product("bike-1", "Trail Bike")],
        vec![
            part("w1", "Wheels", "road wheels", 3),
            part("f1", "Frame Type", "full-suspension", 9),
        ],
    )
    .await;
    fill_cart(&app, "bike-1", 2).await;
    assert_eq!(app.cart_items().await.len(), 2);

    // Two lines hold road wheels; stock drops to one unit.
    publish(&bus, &ShopEvent::PartUpdated {
        part: part("w1", "Wheels", "road wheels", 1),
    })
    .await;

    let items = cart_settles(&app, |items| items.len() == 1).await;
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].line_id, CartLineId::new(1));

    let notices = app.cart_notices().await;
    assert_eq!(
        notices,
        vec![Notice::InsufficientStock {
            product_name: "Trail Bike".to_string(),
            part_value: "road wheels".to_string(),
        }]
    );
    let redirect = app.cart.state(|s| s.redirect.clone()).await;
    assert_eq!(
        redirect,
        Some(NavigationTarget::ProductDetail(ProductId::new(
            "bike-1".to_string()
        )))
    );
}

#[tokio::test]
async fn part_delete_evicts_every_containing_line() {
    let (app, _api, bus) = boot(
        vec![product("bike-1", "Trail Bike")],
        vec![
            part("w1", "Wheels", "road wheels", 5),
            part("f1", "Frame Type", "full-suspension", 9),
        ],
    )
    .await;
    fill_cart(&app, "bike-1", 2).await;

    publish(&bus, &ShopEvent::PartDeleted {
        part_id: PartId::new("w1".to_string()),
    })
    .await;

    let items = cart_settles(&app, <[CartItem]>::is_empty).await;
    assert!(items.is_empty());

    // One notice per evicted line, catalog redirect for a multi-line sweep.
    let notices = app.cart_notices().await;
    assert_eq!(notices.len(), 2);
    assert!(notices.iter().all(|n| matches!(
        n,
        Notice::PartUnavailable { part_value, .. } if part_value == "road wheels"
    )));
    let redirect = app.cart.state(|s| s.redirect.clone()).await;
    assert_eq!(redirect, Some(NavigationTarget::CatalogRoot));
}

#[tokio::test]
async fn withdrawn_product_clears_its_lines() {
    let (app, _api, bus) = boot(
        vec![product("bike-1", "Trail Bike")],
        vec![
            part("w1", "Wheels", "road wheels", 5),
            part("f1", "Frame Type", "full-suspension", 9),
        ],
    )
    .await;
    fill_cart(&app, "bike-1", 2).await;

    let mut withdrawn = product("bike-1", "Trail Bike");
    withdrawn.is_available = false;
    publish(&bus, &ShopEvent::ProductUpdated { product: withdrawn }).await;

    let items = cart_settles(&app, <[CartItem]>::is_empty).await;
    assert!(items.is_empty());

    // One notice for the product, not one per line.
    let notices = app.cart_notices().await;
    assert_eq!(
        notices,
        vec![Notice::ProductUnavailable {
            product_name: "Trail Bike".to_string(),
        }]
    );
    let redirect = app.cart.state(|s| s.redirect.clone()).await;
    assert_eq!(redirect, Some(NavigationTarget::CatalogRoot));
}

#[tokio::test]
async fn product_rename_refreshes_snapshots_in_place() {
    let (app, _api, bus) = boot(
        vec![product("bike-1", "Trail Bike")],
        vec![
            part("w1", "Wheels", "road wheels", 5),
            part("f1", "Frame Type", "full-suspension", 9),
        ],
    )
    .await;
    fill_cart(&app, "bike-1", 2).await;

    let mut renamed = product("bike-1", "Trail Bike XL");
    renamed.base_price = Money::from_cents(90_000);
    publish(&bus, &ShopEvent::ProductUpdated { product: renamed }).await;

    let items = cart_settles(&app, |items| {
        items.iter().all(|i| i.product_name == "Trail Bike XL")
    })
    .await;
    assert_eq!(items.len(), 2);
    assert!(items
        .iter()
        .all(|i| i.base_price == Money::from_cents(90_000)));

    let notices = app.cart_notices().await;
    assert_eq!(
        notices,
        vec![Notice::ProductChanged {
            product_name: "Trail Bike XL".to_string(),
        }]
    );
}

#[tokio::test]
async fn duplicate_delivery_changes_nothing_the_second_time() {
    let (app, _api, bus) = boot(
        vec![product("bike-1", "Trail Bike")],
        vec![
            part("w1", "Wheels", "road wheels", 3),
            part("f1", "Frame Type", "full-suspension", 9),
        ],
    )
    .await;
    fill_cart(&app, "bike-1", 2).await;

    let shrink = ShopEvent::PartUpdated {
        part: part("w1", "Wheels", "road wheels", 1),
    };
    publish(&bus, &shrink).await;
    let items = cart_settles(&app, |items| items.len() == 1).await;
    assert_eq!(items.len(), 1);
    assert_eq!(app.cart_notices().await.len(), 1);

    // The broker redelivers the same event.
    publish(&bus, &shrink).await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(app.cart_items().await.len(), 1);
    assert_eq!(app.cart_notices().await.len(), 1);
}
