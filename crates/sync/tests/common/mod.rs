//! In-memory marketplace speaking the `JsonMarketplaceApi` dialect.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;

use lotsync_core::{LotId, OrderId};
use lotsync_fetch::{QueryCode, QueryFlags, ReplySender, Request, Response, Transport};
use lotsync_inventory::{Condition, Item, ItemKey, ItemType, Price, PriceGuide};
use lotsync_orders::{Order, OrderStatus};

pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

pub fn part(item_id: &str, color: u32, quantity: i64) -> Item {
    Item::new(
        ItemKey::new(ItemType::Part, item_id, color, Condition::New),
        quantity,
        Price::from_millis(250),
    )
}

pub fn store_lot(item_id: &str, lot_id: u64, quantity: i64) -> Item {
    part(item_id, 1, quantity).with_lot_id(LotId::new(lot_id))
}

pub fn order(id: u64, changed: i64, status: OrderStatus) -> Order {
    Order::new(OrderId::new(id), at(0), status).changed(at(changed))
}

#[derive(Default)]
struct State {
    orders: Vec<Order>,
    inventory: Vec<Item>,
    order_items: HashMap<OrderId, Vec<Item>>,
    guides: HashMap<String, PriceGuide>,
    catalog: HashMap<(char, String), String>,
    /// Orders that land right after successive inventory fetches.
    arrivals: VecDeque<Order>,
    /// Per-path scripted failures, consumed before the path answers normally.
    failures: HashMap<String, VecDeque<Result<Response, QueryCode>>>,
    requests: Vec<Request>,
}

/// Scripted marketplace; answers every request synchronously.
#[derive(Clone, Default)]
pub struct ScriptedMarket {
    state: Arc<Mutex<State>>,
}

impl ScriptedMarket {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_orders(self, orders: Vec<Order>) -> Self {
        self.state.lock().unwrap().orders = orders;
        self
    }

    pub fn with_inventory(self, items: Vec<Item>) -> Self {
        self.state.lock().unwrap().inventory = items;
        self
    }

    pub fn with_order_items(self, order: u64, items: Vec<Item>) -> Self {
        self.state
            .lock()
            .unwrap()
            .order_items
            .insert(OrderId::new(order), items);
        self
    }

    pub fn with_price_guide(self, item_id: &str, guide: PriceGuide) -> Self {
        self.state
            .lock()
            .unwrap()
            .guides
            .insert(item_id.to_string(), guide);
        self
    }

    pub fn with_catalog(self, item_type: ItemType, item_id: &str, foreign_id: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .catalog
            .insert((item_type.tag(), item_id.to_string()), foreign_id.to_string());
        self
    }

    /// Make `order` appear right after the next inventory fetch not yet
    /// claimed by an earlier arrival.
    pub fn arriving(self, order: Order) -> Self {
        self.state.lock().unwrap().arrivals.push_back(order);
        self
    }

    pub fn failing(self, path: &str, outcome: Result<Response, QueryCode>) -> Self {
        self.state
            .lock()
            .unwrap()
            .failures
            .entry(path.to_string())
            .or_default()
            .push_back(outcome);
        self
    }

    pub fn requests_to(&self, path: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .requests
            .iter()
            .filter(|request| request.path == path)
            .count()
    }

    pub fn lookups(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .requests
            .iter()
            .filter(|request| request.path.starts_with("/catalog/"))
            .map(|request| request.path.clone())
            .collect()
    }

    pub fn transport(&self) -> Arc<dyn Transport> {
        Arc::new(self.clone())
    }

    fn answer(state: &mut State, request: &Request) -> Result<Response, QueryCode> {
        if let Some(outcome) = state
            .failures
            .get_mut(&request.path)
            .and_then(VecDeque::pop_front)
        {
            return outcome;
        }

        let segments: Vec<&str> = request.path.trim_start_matches('/').split('/').collect();
        match segments.as_slice() {
            ["orders"] => {
                let received = request.param_value("filter") != Some("filed");
                let orders: Vec<&Order> = state
                    .orders
                    .iter()
                    .filter(|order| order.status.is_active() == received)
                    .collect();
                Ok(json(&orders))
            }
            ["inventories"] => {
                let body = json(&state.inventory);
                if let Some(order) = state.arrivals.pop_front() {
                    state.orders.push(order);
                }
                Ok(body)
            }
            ["orders", id, "items"] => {
                let id: OrderId = id.parse().map_err(|_| QueryCode::HttpError(400))?;
                match state.order_items.get(&id) {
                    Some(items) => Ok(json(items)),
                    None => Ok(Response::with_status(404)),
                }
            }
            ["items", _, item_id, "price"] => match state.guides.get(*item_id) {
                Some(guide) => Ok(json(guide)),
                None => Ok(Response::with_status(404)),
            },
            ["catalog", tag, item_id, "mapping"] => {
                let tag = tag.chars().next().unwrap_or('?');
                let body = match state.catalog.get(&(tag, item_id.to_string())) {
                    Some(foreign_id) => serde_json::json!({ "foreign_id": foreign_id }),
                    None => serde_json::Value::Null,
                };
                Ok(json(&body))
            }
            _ => Ok(Response::with_status(404)),
        }
    }
}

impl Transport for ScriptedMarket {
    fn enqueue(&self, request: Request, _flags: QueryFlags, reply: ReplySender) {
        let outcome = {
            let mut state = self.state.lock().unwrap();
            state.requests.push(request.clone());
            Self::answer(&mut state, &request)
        };
        reply.send(outcome);
    }
}

fn json<T: Serialize + ?Sized>(value: &T) -> Response {
    Response::ok(serde_json::to_vec(value).unwrap())
}
