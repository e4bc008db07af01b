//! Per-marketplace client.
//!
//! A [`MarketplaceClient`] pairs one endpoint's [`PipelinedFetch`] with the
//! [`MarketplaceApi`] that knows how to phrase requests and decode replies
//! for that marketplace. Each batch below runs through the fetch loop, so
//! retries and the pipeline budget apply uniformly.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Deserialize;
use tracing::info;

use lotsync_core::{DomainError, DomainResult, Marketplace, OrderId};
use lotsync_fetch::{
    BatchOperation, DecodeError, FetchError, FetchStats, PipelinedFetch, QueryFlags, ReplyError,
    Request, Response, Transport, decode_json,
};
use lotsync_inventory::{Inventory, Item, ItemType, PriceGuide, merge};
use lotsync_orders::{Order, OrderList};

use crate::config::EndpointConfig;
use crate::error::SyncResult;

/// Which order listing to request.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum OrderQuery {
    /// Orders still in the active list.
    Received,
    /// Orders the seller has archived.
    Filed,
}

impl OrderQuery {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderQuery::Received => "received",
            OrderQuery::Filed => "filed",
        }
    }
}

/// Request builders and record decoders for one marketplace.
pub trait MarketplaceApi: Send + Sync {
    fn marketplace(&self) -> Marketplace;

    fn order_list_request(&self, query: OrderQuery) -> Request;
    fn decode_orders(&self, body: &[u8]) -> Result<Vec<Order>, DecodeError>;

    fn inventory_request(&self) -> Request;
    fn decode_inventory(&self, body: &[u8]) -> Result<Vec<Item>, DecodeError>;

    fn order_items_request(&self, order: OrderId) -> Request;
    fn decode_order_items(&self, body: &[u8]) -> Result<Vec<Item>, DecodeError>;

    fn price_guide_request(&self, item: &Item) -> Request;
    fn decode_price_guide(&self, body: &[u8]) -> Result<PriceGuide, DecodeError>;

    /// Catalog lookup of `item_id` filed under `item_type` on this marketplace.
    fn lookup_request(&self, item_type: ItemType, item_id: &str) -> Request;
    /// `None` when the catalog does not know the item under that type.
    fn decode_lookup(&self, body: &[u8]) -> Result<Option<String>, DecodeError>;
}

/// REST-style JSON API whose records use this crate's serde formats.
#[derive(Debug, Clone)]
pub struct JsonMarketplaceApi {
    marketplace: Marketplace,
}

#[derive(Deserialize)]
struct LookupReply {
    foreign_id: String,
}

impl JsonMarketplaceApi {
    pub fn new(marketplace: Marketplace) -> Self {
        Self { marketplace }
    }
}

impl MarketplaceApi for JsonMarketplaceApi {
    fn marketplace(&self) -> Marketplace {
        self.marketplace
    }

    fn order_list_request(&self, query: OrderQuery) -> Request {
        Request::get("/orders").param("filter", query.as_str())
    }

    fn decode_orders(&self, body: &[u8]) -> Result<Vec<Order>, DecodeError> {
        decode_json(body)
    }

    fn inventory_request(&self) -> Request {
        Request::get("/inventories")
    }

    fn decode_inventory(&self, body: &[u8]) -> Result<Vec<Item>, DecodeError> {
        decode_json(body)
    }

    fn order_items_request(&self, order: OrderId) -> Request {
        Request::get(format!("/orders/{order}/items"))
    }

    fn decode_order_items(&self, body: &[u8]) -> Result<Vec<Item>, DecodeError> {
        decode_json(body)
    }

    fn price_guide_request(&self, item: &Item) -> Request {
        let key = item.key();
        Request::get(format!("/items/{}/{}/price", key.item_type.tag(), key.item_id))
            .param("color_id", key.color_id)
            .param("new_or_used", format!("{:?}", key.condition))
    }

    fn decode_price_guide(&self, body: &[u8]) -> Result<PriceGuide, DecodeError> {
        decode_json(body)
    }

    fn lookup_request(&self, item_type: ItemType, item_id: &str) -> Request {
        Request::get(format!("/catalog/{}/{}/mapping", item_type.tag(), item_id))
    }

    fn decode_lookup(&self, body: &[u8]) -> Result<Option<String>, DecodeError> {
        let reply: Option<LookupReply> = decode_json(body)?;
        Ok(reply.map(|reply| reply.foreign_id))
    }
}

pub struct MarketplaceClient<A = JsonMarketplaceApi> {
    api: A,
    fetch: PipelinedFetch,
    flags: QueryFlags,
    order_queries: Vec<OrderQuery>,
}

impl<A: MarketplaceApi> MarketplaceClient<A> {
    pub fn new(
        api: A,
        transport: Arc<dyn Transport>,
        config: &EndpointConfig,
    ) -> Result<Self, FetchError> {
        let fetch = PipelinedFetch::new(
            api.marketplace().as_str(),
            transport,
            config.pipeline_queue_size,
        )?
        .with_max_item_attempts(config.max_item_attempts);

        Ok(Self {
            api,
            fetch,
            flags: config.flags(),
            order_queries: vec![OrderQuery::Received, OrderQuery::Filed],
        })
    }

    /// Order listings used by [`crate::SnapshotSource::fetch_orders`].
    pub fn with_order_queries(mut self, queries: Vec<OrderQuery>) -> Self {
        self.order_queries = queries;
        self
    }

    pub fn marketplace(&self) -> Marketplace {
        self.api.marketplace()
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn order_queries(&self) -> &[OrderQuery] {
        &self.order_queries
    }

    pub(crate) fn fetch_mut(&mut self) -> (&A, &mut PipelinedFetch, QueryFlags) {
        (&self.api, &mut self.fetch, self.flags)
    }

    /// One request per listing, merged into one list. An order present in
    /// several listings is kept once, from the first listing that has it.
    pub async fn fetch_order_list(&mut self, queries: &[OrderQuery]) -> Result<OrderList, FetchError> {
        let mut op = OrderListFetch {
            api: &self.api,
            flags: self.flags,
            queries,
            pages: vec![Vec::new(); queries.len()],
        };
        self.fetch.run(&mut op).await?;

        let mut seen = HashSet::new();
        let mut list = OrderList::new();
        for order in op.pages.into_iter().flatten() {
            if seen.insert(order.id) {
                list.push(order);
            }
        }
        info!(
            marketplace = %self.api.marketplace(),
            orders = list.len(),
            fence = %list.fence(),
            "order list fetched"
        );
        Ok(list)
    }

    pub async fn fetch_inventory(&mut self) -> Result<Inventory, FetchError> {
        let mut op = InventoryFetch {
            api: &self.api,
            flags: self.flags,
            inventory: None,
        };
        self.fetch.run(&mut op).await?;
        let inventory = op.inventory.unwrap_or_default();
        info!(
            marketplace = %self.api.marketplace(),
            lots = inventory.live_len(),
            total_quantity = inventory.total_quantity(),
            "inventory fetched"
        );
        Ok(inventory)
    }

    /// The lots of every order, in the order given. All or nothing.
    pub async fn fetch_order_inventories(
        &mut self,
        orders: &[Order],
    ) -> Result<Vec<Inventory>, FetchError> {
        let mut op = OrderItemsFetch {
            api: &self.api,
            flags: self.flags,
            orders,
            inventories: vec![Inventory::new(); orders.len()],
        };
        self.fetch.run(&mut op).await?;
        Ok(op.inventories)
    }

    /// Attach the current price guide to every live lot.
    pub async fn fetch_price_guides(&mut self, inventory: &mut Inventory) -> SyncResult<FetchStats> {
        let slots: Vec<usize> = inventory.live().map(|(slot, _)| slot).collect();
        let mut op = PriceGuideFetch {
            api: &self.api,
            flags: self.flags,
            inventory: &*inventory,
            slots: &slots,
            guides: vec![None; slots.len()],
        };
        let stats = self.fetch.run(&mut op).await?;
        let guides = op.guides;

        for (slot, guide) in slots.iter().zip(guides) {
            inventory.modify(*slot, |item| item.set_price_guide(guide))?;
        }
        Ok(stats)
    }
}

/// Sum the lots of inventory-affecting orders into one delta with negated
/// quantities, ready to [`merge`] into the store inventory.
///
/// `inventories[i]` holds the lots of `orders[i]`.
pub fn order_decrements(orders: &[Order], inventories: &[Inventory]) -> DomainResult<Inventory> {
    if orders.len() != inventories.len() {
        return Err(DomainError::validation(format!(
            "{} orders but {} order inventories",
            orders.len(),
            inventories.len()
        )));
    }

    let mut sold = Inventory::new();
    for (order, lots) in orders.iter().zip(inventories) {
        if order.status.affects_inventory() {
            merge(&mut sold, lots)?;
        }
    }
    Ok(sold.negated())
}

struct OrderListFetch<'a, A> {
    api: &'a A,
    flags: QueryFlags,
    queries: &'a [OrderQuery],
    pages: Vec<Vec<Order>>,
}

impl<A: MarketplaceApi> BatchOperation for OrderListFetch<'_, A> {
    fn len(&self) -> usize {
        self.queries.len()
    }

    fn request(&self, index: usize) -> Request {
        self.api.order_list_request(self.queries[index])
    }

    fn process(&mut self, index: usize, response: Response) -> Result<(), ReplyError> {
        self.pages[index] = self.api.decode_orders(&response.body)?;
        Ok(())
    }

    fn flags(&self) -> QueryFlags {
        self.flags
    }

    fn label(&self) -> &'static str {
        "order_list"
    }
}

struct InventoryFetch<'a, A> {
    api: &'a A,
    flags: QueryFlags,
    inventory: Option<Inventory>,
}

impl<A: MarketplaceApi> BatchOperation for InventoryFetch<'_, A> {
    fn len(&self) -> usize {
        1
    }

    fn request(&self, _index: usize) -> Request {
        self.api.inventory_request()
    }

    fn process(&mut self, _index: usize, response: Response) -> Result<(), ReplyError> {
        let items = self.api.decode_inventory(&response.body)?;
        self.inventory = Some(Inventory::from(items));
        Ok(())
    }

    fn flags(&self) -> QueryFlags {
        self.flags
    }

    fn label(&self) -> &'static str {
        "inventory"
    }
}

struct OrderItemsFetch<'a, A> {
    api: &'a A,
    flags: QueryFlags,
    orders: &'a [Order],
    inventories: Vec<Inventory>,
}

impl<A: MarketplaceApi> BatchOperation for OrderItemsFetch<'_, A> {
    fn len(&self) -> usize {
        self.orders.len()
    }

    fn request(&self, index: usize) -> Request {
        self.api.order_items_request(self.orders[index].id)
    }

    fn process(&mut self, index: usize, response: Response) -> Result<(), ReplyError> {
        let items = self.api.decode_order_items(&response.body)?;
        self.inventories[index] = Inventory::from(items);
        Ok(())
    }

    fn flags(&self) -> QueryFlags {
        self.flags
    }

    fn label(&self) -> &'static str {
        "order_items"
    }
}

struct PriceGuideFetch<'a, A> {
    api: &'a A,
    flags: QueryFlags,
    inventory: &'a Inventory,
    slots: &'a [usize],
    guides: Vec<Option<PriceGuide>>,
}

impl<A: MarketplaceApi> BatchOperation for PriceGuideFetch<'_, A> {
    fn len(&self) -> usize {
        self.slots.len()
    }

    fn request(&self, index: usize) -> Request {
        self.api
            .price_guide_request(&self.inventory.items()[self.slots[index]])
    }

    fn process(&mut self, index: usize, response: Response) -> Result<(), ReplyError> {
        self.guides[index] = Some(self.api.decode_price_guide(&response.body)?);
        Ok(())
    }

    fn flags(&self) -> QueryFlags {
        self.flags
    }

    fn label(&self) -> &'static str {
        "price_guide"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use lotsync_core::LotId;
    use lotsync_inventory::{Condition, ItemKey, Price};
    use lotsync_orders::OrderStatus;

    fn lot(id: &str, lot_id: u64, quantity: i64) -> Item {
        Item::new(
            ItemKey::new(ItemType::Part, id, 11, Condition::New),
            quantity,
            Price::from_millis(120),
        )
        .with_lot_id(LotId::new(lot_id))
    }

    fn order(id: u64, status: OrderStatus) -> Order {
        let at = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        Order::new(OrderId::new(id), at, status)
    }

    #[test]
    fn decrements_sum_lots_across_orders_and_negate() {
        let orders = vec![
            order(1, OrderStatus::Paid),
            order(2, OrderStatus::Shipped),
            order(3, OrderStatus::Cancelled),
        ];
        let inventories: Vec<Inventory> = vec![
            vec![lot("3001", 10, 2), lot("3002", 11, 1)].into(),
            vec![lot("3001", 10, 3)].into(),
            vec![lot("3002", 11, 50)].into(),
        ];

        let delta = order_decrements(&orders, &inventories).unwrap();
        assert_eq!(delta.total_quantity(), -6);
        let by_lot = |id| delta.find_by_lot_id(LotId::new(id)).map(|i| delta.items()[i].quantity());
        assert_eq!(by_lot(10), Some(-5));
        assert_eq!(by_lot(11), Some(-1));
    }

    #[test]
    fn decrements_require_one_inventory_per_order() {
        let err = order_decrements(&[order(1, OrderStatus::Paid)], &[]).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn json_api_builds_requests_and_decodes_lookups() {
        let api = JsonMarketplaceApi::new(Marketplace::Secondary);
        let request = api.order_list_request(OrderQuery::Filed);
        assert_eq!(request.path, "/orders");
        assert_eq!(request.param_value("filter"), Some("filed"));

        let request = api.price_guide_request(&lot("3001", 1, 1));
        assert_eq!(request.path, "/items/P/3001/price");
        assert_eq!(request.param_value("color_id"), Some("11"));

        assert_eq!(
            api.decode_lookup(br#"{"foreign_id":"3001b"}"#).unwrap(),
            Some("3001b".to_string())
        );
        assert_eq!(api.decode_lookup(b"null").unwrap(), None);
        assert!(api.decode_lookup(b"{").is_err());
    }

    #[test]
    fn decoded_lots_hold_item_invariants() {
        let api = JsonMarketplaceApi::new(Marketplace::Primary);
        let mut body = serde_json::to_value(vec![lot("3001", 1, 4)]).unwrap();
        body[0]["price"] = serde_json::json!(100);
        body[0]["tiers"] = serde_json::json!([
            { "quantity": 10, "price": 50 },
            { "quantity": 5, "price": 90 },
        ]);
        let lots = api
            .decode_inventory(&serde_json::to_vec(&body).unwrap())
            .unwrap();
        assert!(lots[0].tiers().is_empty());

        body[0]["sale_percent"] = serde_json::json!(150);
        let bytes = serde_json::to_vec(&body).unwrap();
        assert!(api.decode_inventory(&bytes).is_err());
        assert!(api.decode_order_items(&bytes).is_err());
    }
}
