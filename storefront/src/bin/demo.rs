//! Scripted storefront walkthrough against in-process fakes.
//!
//! Runs the full flow without a backend or brokers: browse the catalog,
//! customize a bicycle, take a live inventory hit that evicts a cart line,
//! and check out. Useful for eyeballing the log output of every store.

use cyclery_core::event_bus::EventBus;
use cyclery_storefront::app::AddToCartOutcome;
use cyclery_storefront::storage::MemoryCartStorage;
use cyclery_storefront::stores::catalog::ProductSort;
use cyclery_storefront::stores::checkout::CheckoutResolution;
use cyclery_storefront::{
    InMemoryShopApi, Money, Part, PartId, Product, ProductId, ShopApi, ShopApp, ShopConfig,
    ShopEvent,
};
use cyclery_testing::{InMemoryEventBus, feed_event};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn product(id: &str, name: &str, base_cents: i64, banned_wheels: &[&str]) -> Product {
    let mut restrictions = HashMap::new();
    if !banned_wheels.is_empty() {
        restrictions.insert(
            "Wheels".to_string(),
            banned_wheels.iter().map(|v| (*v).to_string()).collect(),
        );
    }
    Product {
        id: ProductId::new(id.to_string()),
        name: name.to_string(),
        type_product: "bicycle".to_string(),
        base_price: Money::from_cents(base_cents),
        is_available: true,
        restrictions,
    }
}

fn part(id: &str, category: &str, value: &str, price_cents: i64, quantity: u32) -> Part {
    Part {
        id: PartId::new(id.to_string()),
        type_product: "bicycle".to_string(),
        category: category.to_string(),
        value: value.to_string(),
        price: Money::from_cents(price_cents),
        quantity,
        is_available: true,
    }
}

fn seeded_catalog() -> (Vec<Product>, Vec<Part>) {
    let products = vec![
        product("bike-trail", "Trail Bike", 80_000, &[]),
        product("bike-city", "City Cruiser", 45_000, &["mountain wheels"]),
    ];
    let parts = vec![
        part("w-road", "Wheels", "road wheels", 8_000, 9),
        part("w-mountain", "Wheels", "mountain wheels", 12_000, 4),
        part("w-fat", "Wheels", "fat bike wheels", 14_000, 5),
        part("f-susp", "Frame Type", "full-suspension", 15_000, 10),
        part("f-diamond", "Frame Type", "diamond", 9_000, 7),
        part("r-red", "Rim Color", "red", 2_000, 12),
        part("r-black", "Rim Color", "black", 2_000, 12),
    ];
    (products, parts)
}

#[tokio::main]
#[allow(clippy::too_many_lines)] // Linear walkthrough, one step per scene
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "demo=info,cyclery_storefront=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Cyclery storefront walkthrough");

    let config = ShopConfig::from_env();
    let topic = config.feed.topic.clone();

    let (products, parts) = seeded_catalog();
    let api = Arc::new(InMemoryShopApi::with_catalog(products, parts));
    let bus = Arc::new(InMemoryEventBus::new());
    let storage = Arc::new(MemoryCartStorage::new());

    let app = ShopApp::with_collaborators(
        config,
        Arc::clone(&api) as Arc<dyn ShopApi>,
        Arc::clone(&bus) as Arc<dyn EventBus>,
        storage,
    )
    .await;
    app.start().await?;

    // Scene 1: browse the catalog.
    app.refresh_catalog().await?;
    for p in app.visible_products(None, ProductSort::CatalogOrder).await {
        info!(id = %p.id, name = %p.name, base = %p.base_price, "Product on offer");
    }

    // Scene 2: customize the trail bike. Mountain wheels lock the frame to
    // full-suspension; the matrix shows the conflict before anyone clicks it.
    app.open_product(&ProductId::new("bike-trail".to_string()))
        .await?;
    app.choose("Wheels", &PartId::new("w-mountain".to_string()))
        .await?;
    for group in app.selection_options().await {
        for option in &group.options {
            if let Some(reason) = option.blocked {
                info!(
                    category = %group.category,
                    value = %option.part.value,
                    ?reason,
                    "Option blocked"
                );
            }
        }
    }
    // This pick bounces off the combination rule and changes nothing.
    app.choose("Frame Type", &PartId::new("f-diamond".to_string()))
        .await?;
    app.choose("Frame Type", &PartId::new("f-susp".to_string()))
        .await?;
    app.choose("Rim Color", &PartId::new("r-red".to_string()))
        .await?;
    if let Some(total) = app.selection_total().await {
        info!(%total, "Trail bike configured");
    }

    match app.add_to_cart().await? {
        AddToCartOutcome::Added { notices } => {
            for notice in notices {
                info!(%notice, "Heads up");
            }
        }
        AddToCartOutcome::Blocked(reason) => info!(?reason, "Add blocked"),
    }

    // Scene 3: a second build on the city cruiser.
    app.open_product(&ProductId::new("bike-city".to_string()))
        .await?;
    app.choose("Wheels", &PartId::new("w-road".to_string()))
        .await?;
    app.choose("Frame Type", &PartId::new("f-diamond".to_string()))
        .await?;
    app.choose("Rim Color", &PartId::new("r-black".to_string()))
        .await?;
    match app.add_to_cart().await? {
        AddToCartOutcome::Added { .. } => {}
        AddToCartOutcome::Blocked(reason) => info!(?reason, "Add blocked"),
    }

    let (subtotal, vat, total) = app.cart_totals().await;
    info!(%subtotal, %vat, %total, lines = app.cart_items().await.len(), "Cart ready");

    // Scene 4: the shop floor sells out of road wheels while we shop. The
    // feed event evicts the city cruiser line.
    let sold_out = part("w-road", "Wheels", "road wheels", 8_000, 0);
    bus.publish(&topic, &feed_event(&ShopEvent::PartUpdated { part: sold_out }))
        .await?;

    let mut lines = app.cart_items().await;
    for _ in 0..100 {
        if lines.len() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        lines = app.cart_items().await;
    }
    anyhow::ensure!(lines.len() == 1, "expected the road-wheel line to be evicted");

    for notice in app.cart_notices().await {
        info!(%notice, "Cart notice");
    }
    app.acknowledge_cart_notices().await?;

    // Scene 5: check out what survived.
    match app.checkout().await? {
        CheckoutResolution::Completed(outcome) => {
            for sold in &outcome.sold {
                info!(name = %sold.name, price = %sold.price, "Sold");
            }
        }
        CheckoutResolution::Aborted(outcome) => {
            for notice in &outcome.notices {
                info!(%notice, "Checkout stopped");
            }
        }
    }
    info!(
        mountain_wheels_left = ?api.part_quantity(&PartId::new("w-mountain".to_string())),
        "Inventory decremented"
    );

    // The sale announcement flows back through the feed into the admin view.
    let mut history = app.sales_history().await;
    for _ in 0..100 {
        if !history.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        history = app.sales_history().await;
    }
    info!(sales = history.len(), "Admin sales history populated");

    let report = app.health().await;
    info!(status = ?report.status, components = report.checks.len(), "Health");

    app.shutdown(Duration::from_secs(5)).await?;
    info!("Walkthrough done");
    Ok(())
}
