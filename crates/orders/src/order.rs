use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use lotsync_core::{Entity, OrderId};

/// Order status across both marketplaces' lifecycles.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Updated,
    Processing,
    Ready,
    Paid,
    Packed,
    Shipped,
    Received,
    Completed,
    OnHold,
    Cancelled,
    Purged,
    /// A status string neither marketplace vocabulary knows.
    Other(String),
}

impl OrderStatus {
    /// Parse a status as either marketplace spells it (case-insensitive).
    pub fn parse(raw: &str) -> Self {
        let normalized = raw.trim().to_ascii_lowercase().replace(['_', '-'], " ");
        match normalized.as_str() {
            "pending" => OrderStatus::Pending,
            "updated" => OrderStatus::Updated,
            "processing" | "processed" => OrderStatus::Processing,
            "ready" => OrderStatus::Ready,
            "paid" | "payment submitted" | "payment received" => OrderStatus::Paid,
            "packed" => OrderStatus::Packed,
            "shipped" => OrderStatus::Shipped,
            "received" => OrderStatus::Received,
            "completed" | "ocompleted" => OrderStatus::Completed,
            "on hold" | "npb" | "npx" | "nrs" | "nss" => OrderStatus::OnHold,
            "cancelled" | "canceled" | "ocancelled" => OrderStatus::Cancelled,
            "purged" => OrderStatus::Purged,
            _ => OrderStatus::Other(raw.trim().to_string()),
        }
    }

    /// The order is still moving through fulfilment.
    pub fn is_active(&self) -> bool {
        !matches!(
            self,
            OrderStatus::Received
                | OrderStatus::Completed
                | OrderStatus::Cancelled
                | OrderStatus::Purged
        )
    }

    /// The order's lots were taken out of stock and stay out.
    pub fn affects_inventory(&self) -> bool {
        !matches!(self, OrderStatus::Cancelled | OrderStatus::Purged)
    }
}

/// One marketplace order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub placed_at: DateTime<Utc>,
    /// Last status change; drives the order list's logical clock.
    pub changed_at: DateTime<Utc>,
    pub status: OrderStatus,
    pub customer: String,
    /// Number of distinct lots in the order.
    pub lot_count: u32,
    /// Number of units across all lots.
    pub item_count: i64,
    /// Totals in thousandths of the order currency.
    pub subtotal: u64,
    pub grand_total: u64,
}

impl Order {
    pub fn new(id: OrderId, placed_at: DateTime<Utc>, status: OrderStatus) -> Self {
        Self {
            id,
            placed_at,
            changed_at: placed_at,
            status,
            customer: String::new(),
            lot_count: 0,
            item_count: 0,
            subtotal: 0,
            grand_total: 0,
        }
    }

    pub fn changed(mut self, at: DateTime<Utc>) -> Self {
        self.changed_at = at;
        self
    }

    pub fn with_customer(mut self, customer: impl Into<String>) -> Self {
        self.customer = customer.into();
        self
    }
}

impl Entity for Order {
    type Id = OrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Logical clock of an order list: the latest status change observed and
/// how many orders share that exact timestamp.
///
/// Two observations with equal fences saw the same order history, as long
/// as the marketplace only ever moves `changed_at` forward.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderFence {
    pub top_date: Option<DateTime<Utc>>,
    pub top_date_count: u32,
}

impl core::fmt::Display for OrderFence {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self.top_date {
            Some(date) => write!(f, "{}#{}", date.to_rfc3339(), self.top_date_count),
            None => f.write_str("empty"),
        }
    }
}

/// Ordered collection of orders plus the fence derived from them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Order>", into = "Vec<Order>")]
pub struct OrderList {
    orders: Vec<Order>,
    fence: OrderFence,
}

impl OrderList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn orders(&self) -> &[Order] {
        &self.orders
    }

    pub fn fence(&self) -> OrderFence {
        self.fence
    }

    pub fn top_date(&self) -> Option<DateTime<Utc>> {
        self.fence.top_date
    }

    pub fn top_date_count(&self) -> u32 {
        self.fence.top_date_count
    }

    /// Append an order and advance the fence.
    pub fn push(&mut self, order: Order) {
        self.observe(order.changed_at);
        self.orders.push(order);
    }

    pub fn find(&self, id: OrderId) -> Option<&Order> {
        self.orders.iter().find(|order| *order.id() == id)
    }

    /// Keep only orders changed at or after `since`.
    pub fn retain_since(&mut self, since: DateTime<Utc>) {
        self.orders.retain(|order| order.changed_at >= since);
        self.recompute_fence();
    }

    /// Stable sort by last status change, oldest first.
    pub fn sort_by_change(&mut self) {
        self.orders.sort_by_key(|order| order.changed_at);
    }

    fn observe(&mut self, changed_at: DateTime<Utc>) {
        match self.fence.top_date {
            Some(top) if changed_at < top => {}
            Some(top) if changed_at == top => self.fence.top_date_count += 1,
            _ => {
                self.fence.top_date = Some(changed_at);
                self.fence.top_date_count = 1;
            }
        }
    }

    fn recompute_fence(&mut self) {
        self.fence = OrderFence::default();
        let dates: Vec<_> = self.orders.iter().map(|order| order.changed_at).collect();
        for changed_at in dates {
            self.observe(changed_at);
        }
    }
}

impl From<Vec<Order>> for OrderList {
    fn from(orders: Vec<Order>) -> Self {
        let mut list = OrderList::new();
        list.extend(orders);
        list
    }
}

impl From<OrderList> for Vec<Order> {
    fn from(value: OrderList) -> Self {
        value.orders
    }
}

impl Extend<Order> for OrderList {
    fn extend<T: IntoIterator<Item = Order>>(&mut self, iter: T) {
        for order in iter {
            self.push(order);
        }
    }
}
