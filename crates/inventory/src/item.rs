use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use lotsync_core::{DomainError, DomainResult, ExternalId, ForeignLotId, LotId};

/// Maximum number of tiered-price breakpoints a lot can carry.
pub const MAX_TIERS: usize = 3;

/// Catalog item type, tagged by a single character on the wire.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "char", try_from = "char")]
pub enum ItemType {
    Part,
    Set,
    Minifig,
    Book,
    Gear,
    Catalog,
    Instruction,
    OriginalBox,
    UnsortedLot,
}

impl ItemType {
    pub fn tag(self) -> char {
        match self {
            ItemType::Part => 'P',
            ItemType::Set => 'S',
            ItemType::Minifig => 'M',
            ItemType::Book => 'B',
            ItemType::Gear => 'G',
            ItemType::Catalog => 'C',
            ItemType::Instruction => 'I',
            ItemType::OriginalBox => 'O',
            ItemType::UnsortedLot => 'U',
        }
    }

    pub fn from_tag(tag: char) -> DomainResult<Self> {
        Ok(match tag.to_ascii_uppercase() {
            'P' => ItemType::Part,
            'S' => ItemType::Set,
            'M' => ItemType::Minifig,
            'B' => ItemType::Book,
            'G' => ItemType::Gear,
            'C' => ItemType::Catalog,
            'I' => ItemType::Instruction,
            'O' => ItemType::OriginalBox,
            'U' => ItemType::UnsortedLot,
            other => {
                return Err(DomainError::validation(format!("unknown item type tag '{other}'")));
            }
        })
    }

    /// The type a catalog lookup should retry with when this one is unknown
    /// to the other marketplace. Small builds are filed as parts on one side
    /// and minifigs on the other; the same happens between sets and gear.
    pub fn alternate(self) -> Option<Self> {
        match self {
            ItemType::Part => Some(ItemType::Minifig),
            ItemType::Minifig => Some(ItemType::Part),
            ItemType::Set => Some(ItemType::Gear),
            ItemType::Gear => Some(ItemType::Set),
            _ => None,
        }
    }
}

impl From<ItemType> for char {
    fn from(value: ItemType) -> Self {
        value.tag()
    }
}

impl TryFrom<char> for ItemType {
    type Error = DomainError;

    fn try_from(value: char) -> Result<Self, Self::Error> {
        ItemType::from_tag(value)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Condition {
    New,
    Used,
}

/// Composite natural key of a lot: what the item *is*, independent of
/// which marketplace holds it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ItemKey {
    pub item_type: ItemType,
    pub item_id: String,
    pub color_id: u32,
    pub condition: Condition,
}

impl ItemKey {
    pub fn new(
        item_type: ItemType,
        item_id: impl Into<String>,
        color_id: u32,
        condition: Condition,
    ) -> Self {
        Self {
            item_type,
            item_id: item_id.into(),
            color_id,
            condition,
        }
    }
}

impl core::fmt::Display for ItemKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "{}:{}:{}:{:?}",
            self.item_type.tag(),
            self.item_id,
            self.color_id,
            self.condition
        )
    }
}

/// Unit price in thousandths of the store currency.
///
/// Always rounded to 3 decimal places and never below [`Price::MIN`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "u64", into = "u64")]
pub struct Price(u64);

impl Price {
    pub const MIN: Price = Price(1);

    pub fn from_millis(millis: u64) -> Self {
        Self(millis.max(Self::MIN.0))
    }

    /// Round a decimal amount to 3 places and clamp it to the minimum price.
    pub fn from_decimal(value: f64) -> Self {
        if !value.is_finite() || value <= 0.0 {
            return Self::MIN;
        }
        Self::from_millis((value * 1000.0).round() as u64)
    }

    pub fn millis(self) -> u64 {
        self.0
    }

    pub fn as_decimal(self) -> f64 {
        self.0 as f64 / 1000.0
    }
}

impl From<u64> for Price {
    fn from(value: u64) -> Self {
        Self::from_millis(value)
    }
}

impl From<Price> for u64 {
    fn from(value: Price) -> Self {
        value.0
    }
}

impl core::fmt::Display for Price {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}.{:03}", self.0 / 1000, self.0 % 1000)
    }
}

/// One tiered-price breakpoint: buying at least `quantity` costs `price` each.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierPrice {
    pub quantity: u32,
    pub price: Price,
}

/// Validate a tier table against the lot's base price.
///
/// Breakpoints must be strictly increasing in quantity and strictly
/// decreasing in price, starting below `base`. Anything else (including more
/// than [`MAX_TIERS`] entries) clears the table.
pub fn normalize_tiers(base: Price, tiers: &[TierPrice]) -> Vec<TierPrice> {
    if tiers.len() > MAX_TIERS {
        return Vec::new();
    }
    let mut last_qty = 0u32;
    let mut last_price = base;
    for tier in tiers {
        if tier.quantity <= last_qty || tier.price >= last_price {
            return Vec::new();
        }
        last_qty = tier.quantity;
        last_price = tier.price;
    }
    tiers.to_vec()
}

bitflags! {
    /// Per-item state bits.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct ItemFlags: u16 {
        /// Tombstone; the item is kept in place until the next compaction.
        const DELETED         = 1 << 0;
        const UPDATE_QUANTITY = 1 << 1;
        const UPDATE_PRICE    = 1 << 2;
        const UPDATE_COMMENTS = 1 << 3;
        const UPDATE_REMARKS  = 1 << 4;
        const UPDATE_TIERS    = 1 << 5;

        const UPDATE_ANY = Self::UPDATE_QUANTITY.bits()
            | Self::UPDATE_PRICE.bits()
            | Self::UPDATE_COMMENTS.bits()
            | Self::UPDATE_REMARKS.bits()
            | Self::UPDATE_TIERS.bits();
    }
}

/// Market statistics for one catalog item, as reported by a price guide.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceGuide {
    pub min: Price,
    pub avg: Price,
    pub max: Price,
    pub qty_sold: u64,
}

/// One inventory lot.
///
/// Decoding goes through [`RawItem`] so a lot read off the wire holds the
/// same invariants as one built through the setters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawItem")]
pub struct Item {
    key: ItemKey,
    quantity: i64,
    price: Price,
    /// Sale discount in percent, `0..=99`.
    #[serde(default)]
    sale_percent: u8,
    #[serde(default)]
    tiers: Vec<TierPrice>,
    #[serde(default)]
    lot_id: Option<LotId>,
    /// Catalog id of this item on marketplace B, if known.
    #[serde(default)]
    foreign_id: Option<String>,
    #[serde(default)]
    foreign_lot_id: Option<ForeignLotId>,
    #[serde(skip)]
    external_id: Option<ExternalId>,
    #[serde(default)]
    remarks: String,
    #[serde(default)]
    comments: String,
    #[serde(default)]
    flags: ItemFlags,
    #[serde(default)]
    price_guide: Option<PriceGuide>,
}

/// Wire form of [`Item`], validated by `TryFrom`.
#[derive(Deserialize)]
struct RawItem {
    key: ItemKey,
    quantity: i64,
    price: Price,
    #[serde(default)]
    sale_percent: u8,
    #[serde(default)]
    tiers: Vec<TierPrice>,
    #[serde(default)]
    lot_id: Option<LotId>,
    #[serde(default)]
    foreign_id: Option<String>,
    #[serde(default)]
    foreign_lot_id: Option<ForeignLotId>,
    #[serde(default)]
    remarks: String,
    #[serde(default)]
    comments: String,
    #[serde(default)]
    flags: ItemFlags,
    #[serde(default)]
    price_guide: Option<PriceGuide>,
}

impl TryFrom<RawItem> for Item {
    type Error = DomainError;

    fn try_from(raw: RawItem) -> Result<Self, Self::Error> {
        if raw.sale_percent >= 100 {
            return Err(DomainError::validation(format!(
                "sale percent {} must be below 100",
                raw.sale_percent
            )));
        }
        Ok(Self {
            tiers: normalize_tiers(raw.price, &raw.tiers),
            key: raw.key,
            quantity: raw.quantity,
            price: raw.price,
            sale_percent: raw.sale_percent,
            lot_id: raw.lot_id,
            foreign_id: raw.foreign_id,
            foreign_lot_id: raw.foreign_lot_id,
            external_id: None,
            remarks: raw.remarks,
            comments: raw.comments,
            flags: raw.flags,
            price_guide: raw.price_guide,
        })
    }
}

impl Item {
    pub fn new(key: ItemKey, quantity: i64, price: Price) -> Self {
        Self {
            key,
            quantity,
            price,
            sale_percent: 0,
            tiers: Vec::new(),
            lot_id: None,
            foreign_id: None,
            foreign_lot_id: None,
            external_id: None,
            remarks: String::new(),
            comments: String::new(),
            flags: ItemFlags::empty(),
            price_guide: None,
        }
    }

    pub fn with_lot_id(mut self, lot_id: LotId) -> Self {
        self.lot_id = Some(lot_id);
        self
    }

    pub fn with_foreign_lot(mut self, foreign_id: impl Into<String>, lot: ForeignLotId) -> Self {
        self.foreign_id = Some(foreign_id.into());
        self.foreign_lot_id = Some(lot);
        self
    }

    pub fn with_external_id(mut self, external_id: ExternalId) -> Self {
        self.external_id = Some(external_id);
        self
    }

    pub fn with_remarks(mut self, remarks: impl Into<String>) -> Self {
        self.remarks = remarks.into();
        self
    }

    pub fn with_tiers(mut self, tiers: &[TierPrice]) -> Self {
        self.tiers = normalize_tiers(self.price, tiers);
        self
    }

    pub fn key(&self) -> &ItemKey {
        &self.key
    }

    pub fn item_type(&self) -> ItemType {
        self.key.item_type
    }

    pub fn quantity(&self) -> i64 {
        self.quantity
    }

    pub fn price(&self) -> Price {
        self.price
    }

    pub fn sale_percent(&self) -> u8 {
        self.sale_percent
    }

    /// Effective unit price once the sale discount is applied.
    pub fn sale_price(&self) -> Price {
        let keep = u64::from(100u8.saturating_sub(self.sale_percent));
        let discounted = self.price.millis() * keep / 100;
        Price::from_millis(discounted)
    }

    pub fn tiers(&self) -> &[TierPrice] {
        &self.tiers
    }

    pub fn lot_id(&self) -> Option<LotId> {
        self.lot_id
    }

    pub fn foreign_id(&self) -> Option<&str> {
        self.foreign_id.as_deref()
    }

    pub fn foreign_lot_id(&self) -> Option<ForeignLotId> {
        self.foreign_lot_id
    }

    pub fn external_id(&self) -> Option<ExternalId> {
        self.external_id
    }

    pub fn remarks(&self) -> &str {
        &self.remarks
    }

    pub fn comments(&self) -> &str {
        &self.comments
    }

    pub fn flags(&self) -> ItemFlags {
        self.flags
    }

    pub fn price_guide(&self) -> Option<&PriceGuide> {
        self.price_guide.as_ref()
    }

    pub fn is_deleted(&self) -> bool {
        self.flags.contains(ItemFlags::DELETED)
    }

    pub fn needs_update(&self) -> bool {
        self.flags.intersects(ItemFlags::UPDATE_ANY)
    }

    /// Stock value of this lot in thousandths (signed: delta lots may be negative).
    pub fn value(&self) -> i64 {
        self.quantity.saturating_mul(self.price.millis() as i64)
    }

    pub fn set_quantity(&mut self, quantity: i64) {
        if self.quantity != quantity {
            self.quantity = quantity;
            self.flags.insert(ItemFlags::UPDATE_QUANTITY);
        }
    }

    /// Change the base price. Tiers that no longer sit below it are cleared.
    pub fn set_price(&mut self, price: Price) {
        if self.price != price {
            self.price = price;
            self.flags.insert(ItemFlags::UPDATE_PRICE);
            let tiers = normalize_tiers(price, &self.tiers);
            if tiers.len() != self.tiers.len() {
                self.tiers = tiers;
                self.flags.insert(ItemFlags::UPDATE_TIERS);
            }
        }
    }

    pub fn set_sale_percent(&mut self, percent: u8) -> DomainResult<()> {
        if percent >= 100 {
            return Err(DomainError::validation("sale percent must be below 100"));
        }
        if self.sale_percent != percent {
            self.sale_percent = percent;
            self.flags.insert(ItemFlags::UPDATE_PRICE);
        }
        Ok(())
    }

    pub fn set_tiers(&mut self, tiers: &[TierPrice]) {
        let tiers = normalize_tiers(self.price, tiers);
        if self.tiers != tiers {
            self.tiers = tiers;
            self.flags.insert(ItemFlags::UPDATE_TIERS);
        }
    }

    pub fn set_remarks(&mut self, remarks: impl Into<String>) {
        let remarks = remarks.into();
        if self.remarks != remarks {
            self.remarks = remarks;
            self.flags.insert(ItemFlags::UPDATE_REMARKS);
        }
    }

    pub fn set_comments(&mut self, comments: impl Into<String>) {
        let comments = comments.into();
        if self.comments != comments {
            self.comments = comments;
            self.flags.insert(ItemFlags::UPDATE_COMMENTS);
        }
    }

    pub fn set_lot_id(&mut self, lot_id: Option<LotId>) {
        self.lot_id = lot_id;
    }

    pub fn set_foreign_id(&mut self, foreign_id: Option<String>) {
        self.foreign_id = foreign_id;
    }

    pub fn set_foreign_lot_id(&mut self, lot: Option<ForeignLotId>) {
        self.foreign_lot_id = lot;
    }

    pub fn set_external_id(&mut self, external_id: Option<ExternalId>) {
        self.external_id = external_id;
    }

    pub fn set_price_guide(&mut self, guide: Option<PriceGuide>) {
        self.price_guide = guide;
    }

    pub fn clear_update_flags(&mut self) {
        self.flags.remove(ItemFlags::UPDATE_ANY);
    }

    pub(crate) fn set_deleted(&mut self, deleted: bool) {
        self.flags.set(ItemFlags::DELETED, deleted);
    }
}
