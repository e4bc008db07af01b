mod common;

use common::{ScriptedMarket, at, order, part, store_lot};

use lotsync_core::{LotId, Marketplace};
use lotsync_fetch::{FetchError, QueryCode, Response, TransportFailure};
use lotsync_inventory::{Inventory, ItemType, Price, PriceGuide, diff, merge};
use lotsync_orders::OrderStatus;
use lotsync_sync::{
    EndpointConfig, IdResolver, JsonMarketplaceApi, MarketplaceClient, OrderQuery,
    SnapshotConfig, SnapshotError, SyncConfig, SyncError, TranslationCache, capture_snapshot,
    order_decrements,
};

fn client(market: &ScriptedMarket, marketplace: Marketplace) -> MarketplaceClient {
    client_with(market, marketplace, &EndpointConfig::default())
}

fn client_with(
    market: &ScriptedMarket,
    marketplace: Marketplace,
    config: &EndpointConfig,
) -> MarketplaceClient {
    MarketplaceClient::new(JsonMarketplaceApi::new(marketplace), market.transport(), config)
        .unwrap()
}

#[tokio::test]
async fn snapshot_retries_until_no_order_lands_mid_capture() {
    lotsync_observability::init_for_tests();

    let market = ScriptedMarket::new()
        .with_orders(vec![order(1, 10, OrderStatus::Paid)])
        .with_inventory(vec![store_lot("3001", 1, 4)])
        .arriving(order(2, 11, OrderStatus::Pending))
        // Same second as order 2: only the count moves.
        .arriving(order(3, 11, OrderStatus::Pending));

    let mut primary = client(&market, Marketplace::Primary);
    let snapshot = capture_snapshot(&mut primary, &SnapshotConfig::immediate(5))
        .await
        .unwrap();

    assert_eq!(snapshot.attempts, 3);
    assert_eq!(snapshot.orders.len(), 3);
    assert_eq!(snapshot.orders.top_date(), Some(at(11)));
    assert_eq!(snapshot.orders.top_date_count(), 2);
    assert_eq!(market.requests_to("/inventories"), 3);
}

#[tokio::test]
async fn snapshot_fails_once_the_attempt_budget_is_spent() {
    let mut market = ScriptedMarket::new().with_inventory(vec![store_lot("3001", 1, 4)]);
    for id in 0..5 {
        market = market.arriving(order(id + 1, 20 + id as i64, OrderStatus::Pending));
    }

    let mut primary = client(&market, Marketplace::Primary);
    let err = capture_snapshot(&mut primary, &SnapshotConfig::immediate(5))
        .await
        .unwrap_err();
    assert_eq!(err, SnapshotError::Inconsistent { attempts: 5 });
    assert_eq!(market.requests_to("/inventories"), 5);
}

#[tokio::test]
async fn empty_store_is_returned_not_rejected() {
    let market = ScriptedMarket::new().with_orders(vec![order(1, 1, OrderStatus::Completed)]);
    let mut primary = client(&market, Marketplace::Primary);
    let snapshot = capture_snapshot(&mut primary, &SnapshotConfig::immediate(5))
        .await
        .unwrap();
    assert!(snapshot.inventory.is_empty());
    assert_eq!(snapshot.orders.len(), 1);
}

#[tokio::test]
async fn snapshot_transport_failure_is_not_retried_by_the_fence() {
    let market = ScriptedMarket::new()
        .with_inventory(vec![store_lot("3001", 1, 4)])
        .failing("/inventories", Ok(Response::ok("<html>")));
    let mut primary = client(&market, Marketplace::Primary);
    let err = capture_snapshot(&mut primary, &SnapshotConfig::immediate(5))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        SnapshotError::Fetch(FetchError::Aborted {
            index: 0,
            code: QueryCode::ParseError
        })
    );
    assert_eq!(market.requests_to("/inventories"), 1);
}

#[tokio::test]
async fn order_list_merges_listings_and_survives_transient_errors() {
    let market = ScriptedMarket::new()
        .with_orders(vec![
            order(1, 5, OrderStatus::Paid),
            order(2, 7, OrderStatus::Completed),
            order(3, 7, OrderStatus::Shipped),
        ])
        .failing("/orders", Err(QueryCode::Transport(TransportFailure::Timeout)))
        .failing("/orders", Ok(Response::with_status(503)));

    let mut primary = client(&market, Marketplace::Primary);
    let list = primary
        .fetch_order_list(&[OrderQuery::Received, OrderQuery::Filed])
        .await
        .unwrap();
    assert_eq!(list.len(), 3);
    assert_eq!(list.top_date_count(), 2);
    assert_eq!(market.requests_to("/orders"), 4);
}

#[tokio::test]
async fn sold_lots_are_decremented_from_the_store() {
    let market = ScriptedMarket::new()
        .with_inventory(vec![
            store_lot("3001", 1, 10),
            store_lot("3002", 2, 3),
            store_lot("3003", 3, 1),
        ])
        .with_order_items(1, vec![store_lot("3001", 1, 4), store_lot("3002", 2, 3)])
        .with_order_items(2, vec![store_lot("3001", 1, 2)])
        .with_order_items(3, vec![store_lot("3003", 3, 1)])
        .failing("/orders/2/items", Ok(Response::with_status(502)));

    let orders = vec![
        order(1, 1, OrderStatus::Paid),
        order(2, 2, OrderStatus::Packed),
        order(3, 3, OrderStatus::Cancelled),
    ];

    let mut primary = client(&market, Marketplace::Primary);
    let mut store = primary.fetch_inventory().await.unwrap();
    let lots = primary.fetch_order_inventories(&orders).await.unwrap();
    assert_eq!(lots.len(), 3);
    assert_eq!(market.requests_to("/orders/2/items"), 2);

    let delta = order_decrements(&orders, &lots).unwrap();
    assert_eq!(delta.total_quantity(), -9);

    let report = merge(&mut store, &delta).unwrap();
    assert_eq!(report.removed, 1);
    assert_eq!(store.total_quantity(), 4 + 1);
    let qty = |lot| store.find_by_lot_id(LotId::new(lot)).map(|i| store.items()[i].quantity());
    assert_eq!(qty(1), Some(4));
    assert_eq!(qty(2), None);
    assert_eq!(qty(3), Some(1));
}

#[tokio::test]
async fn corrupt_order_reply_yields_no_partial_result() {
    let market = ScriptedMarket::new()
        .with_order_items(1, vec![store_lot("3001", 1, 1)])
        .with_order_items(2, vec![store_lot("3002", 2, 1)])
        .with_order_items(3, vec![store_lot("3003", 3, 1)])
        .failing("/orders/2/items", Err(QueryCode::HttpError(500)))
        .failing("/orders/3/items", Ok(Response::ok("{\"truncated\":")));

    let orders = vec![
        order(1, 1, OrderStatus::Paid),
        order(2, 1, OrderStatus::Paid),
        order(3, 1, OrderStatus::Paid),
    ];
    let mut primary = client(&market, Marketplace::Primary);
    let err = primary.fetch_order_inventories(&orders).await.unwrap_err();
    assert_eq!(
        err,
        FetchError::Aborted {
            index: 2,
            code: QueryCode::ParseError
        }
    );
}

#[tokio::test]
async fn price_guides_are_attached_to_live_lots() {
    let guide = PriceGuide {
        min: Price::from_millis(100),
        avg: Price::from_millis(180),
        max: Price::from_millis(400),
        qty_sold: 77,
    };
    let market = ScriptedMarket::new()
        .with_price_guide("3001", guide)
        .with_price_guide("3002", guide)
        .failing("/items/P/3002/price", Ok(Response::with_status(429)));

    let mut inventory: Inventory = vec![part("3001", 1, 2), part("3002", 1, 1), part("3003", 1, 1)].into();
    inventory.tombstone(2).unwrap();

    let config = EndpointConfig {
        pipeline_queue_size: 1,
        ..EndpointConfig::default()
    };
    let mut secondary = client_with(&market, Marketplace::Secondary, &config);
    let stats = secondary.fetch_price_guides(&mut inventory).await.unwrap();

    assert_eq!(stats.succeeded, 2);
    assert_eq!(stats.retried, 1);
    assert_eq!(inventory.items()[0].price_guide(), Some(&guide));
    assert_eq!(inventory.items()[1].price_guide(), Some(&guide));
    assert_eq!(inventory.items()[2].price_guide(), None);
}

#[tokio::test]
async fn missing_price_guide_exhausts_a_bounded_budget() {
    let market = ScriptedMarket::new();
    let config = EndpointConfig {
        max_item_attempts: Some(3),
        ..EndpointConfig::default()
    };
    let mut secondary = client_with(&market, Marketplace::Secondary, &config);
    let mut inventory: Inventory = vec![part("9999", 1, 1)].into();

    let err = secondary.fetch_price_guides(&mut inventory).await.unwrap_err();
    assert!(matches!(
        err,
        SyncError::Fetch(FetchError::RetriesExhausted { index: 0, attempts: 3 })
    ));
    assert!(inventory.items()[0].price_guide().is_none());
}

#[tokio::test]
async fn ids_resolve_through_cache_lookup_and_fallback_type() {
    let market = ScriptedMarket::new()
        .with_catalog(ItemType::Part, "3001", "3001")
        // Filed as a minifig on the other side.
        .with_catalog(ItemType::Minifig, "col001", "col-001");

    let mut cache = TranslationCache::new();
    cache.learn(ItemType::Part, "3002", "3002a");

    let mut inventory: Inventory = vec![
        part("3001", 1, 1),
        part("3002", 1, 1),
        part("col001", 0, 1),
        part("nope", 0, 1),
    ]
    .into();

    let mut secondary = client(&market, Marketplace::Secondary);
    let mut resolver = IdResolver::new(cache);
    let report = resolver.resolve(&mut secondary, &mut inventory).await.unwrap();

    assert_eq!(report.from_cache, 1);
    assert_eq!(report.resolved, 2);
    assert_eq!(report.unresolved.len(), 1);
    assert_eq!(report.unresolved[0].item_id, "nope");

    let foreign: Vec<_> = inventory.items().iter().map(|i| i.foreign_id()).collect();
    assert_eq!(foreign, vec![Some("3001"), Some("3002a"), Some("col-001"), None]);

    let mut lookups = market.lookups();
    lookups.sort();
    assert_eq!(
        lookups,
        vec![
            "/catalog/M/col001/mapping",
            "/catalog/M/nope/mapping",
            "/catalog/P/3001/mapping",
            "/catalog/P/col001/mapping",
            "/catalog/P/nope/mapping",
        ]
    );

    // The learned mappings answer the next pass without any lookup.
    let cache = resolver.into_cache();
    assert_eq!(cache.get(ItemType::Part, "col001"), Some("col-001"));
    let mut fresh: Inventory = vec![part("3001", 2, 1), part("col001", 0, 5)].into();
    let mut resolver = IdResolver::new(cache);
    let report = resolver.resolve(&mut secondary, &mut fresh).await.unwrap();
    assert_eq!(report.from_cache, 2);
    assert_eq!(report.resolved, 0);
    assert_eq!(market.lookups().len(), 5);
}

#[tokio::test]
async fn two_marketplaces_reconcile_through_diff_and_merge() {
    let config: SyncConfig = serde_json::from_str(
        r#"{"primary":{"pipeline_queue_size":4},"secondary":{"pipeline_queue_size":2}}"#,
    )
    .unwrap();
    config.validate().unwrap();

    let primary_market = ScriptedMarket::new().with_inventory(vec![
        part("3001", 1, 10),
        part("3002", 1, 3),
        part("3004", 5, 8),
    ]);
    let secondary_market = ScriptedMarket::new().with_inventory(vec![
        part("3001", 1, 7),
        part("3003", 1, 2),
        part("3004", 5, 8),
    ]);

    let mut primary = client_with(&primary_market, Marketplace::Primary, config.endpoint(Marketplace::Primary));
    let mut secondary =
        client_with(&secondary_market, Marketplace::Secondary, config.endpoint(Marketplace::Secondary));

    let a = primary.fetch_inventory().await.unwrap();
    let b = secondary.fetch_inventory().await.unwrap();

    let delta = diff(&a, &b);
    assert_eq!(delta.live_len(), 3);
    assert_eq!(delta.total_quantity(), a.total_quantity() - b.total_quantity());

    let mut pushed = b.clone();
    merge(&mut pushed, &delta).unwrap();
    pushed.compact();
    let mut got: Vec<_> = pushed.live().map(|(_, i)| (i.key().clone(), i.quantity())).collect();
    let mut want: Vec<_> = a.live().map(|(_, i)| (i.key().clone(), i.quantity())).collect();
    got.sort();
    want.sort();
    assert_eq!(got, want);
}
