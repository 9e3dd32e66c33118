use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use turboshop_core::query::empty_string_as_none;
use turboshop_core::{Aggregate, AggregateRoot, DomainError, DomainResult, ItemId};

use crate::movement::{NegativeStockPolicy, RecordMovement, StockMovement};

/// Inventory category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    TurboParts,
    Consumables,
    Tools,
    #[default]
    General,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::TurboParts => "turbo_parts",
            Category::Consumables => "consumables",
            Category::Tools => "tools",
            Category::General => "general",
        }
    }
}

impl core::str::FromStr for Category {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "turbo_parts" => Ok(Category::TurboParts),
            "consumables" => Ok(Category::Consumables),
            "tools" => Ok(Category::Tools),
            "general" => Ok(Category::General),
            other => Err(DomainError::validation(format!("unknown category '{other}'"))),
        }
    }
}

/// Derived stock classification. Recomputed on every read, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StockStatus {
    Critical,
    Low,
    Normal,
    Overstock,
}

impl StockStatus {
    /// `critical` (<= 0), `low` (<= min), `overstock` (>= max), else `normal`.
    pub fn classify(current_stock: i64, min_stock: i64, max_stock: i64) -> Self {
        if current_stock <= 0 {
            StockStatus::Critical
        } else if current_stock <= min_stock {
            StockStatus::Low
        } else if current_stock >= max_stock {
            StockStatus::Overstock
        } else {
            StockStatus::Normal
        }
    }
}

fn default_unit() -> String {
    "db".to_string()
}

fn default_max_stock() -> i64 {
    1000
}

/// Item-creation input. `initial_stock` becomes an opening IN movement,
/// never a direct write to `current_stock`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewItem {
    pub name: String,
    pub code: String,
    #[serde(default)]
    pub category: Category,
    #[serde(default = "default_unit")]
    pub unit: String,
    #[serde(default)]
    pub initial_stock: i64,
    #[serde(default)]
    pub min_stock: i64,
    #[serde(default = "default_max_stock")]
    pub max_stock: i64,
    /// Minor currency units per unit of measure.
    #[serde(default)]
    pub purchase_price: u64,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub supplier: String,
    #[serde(default)]
    pub notes: String,
}

impl NewItem {
    pub fn new(name: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            code: code.into(),
            category: Category::General,
            unit: default_unit(),
            initial_stock: 0,
            min_stock: 0,
            max_stock: default_max_stock(),
            purchase_price: 0,
            location: String::new(),
            supplier: String::new(),
            notes: String::new(),
        }
    }
}

/// Partial update of item details. There is no stock field: stock only changes
/// through recorded movements.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemPatch {
    pub name: Option<String>,
    pub code: Option<String>,
    pub category: Option<Category>,
    pub unit: Option<String>,
    pub min_stock: Option<i64>,
    pub max_stock: Option<i64>,
    pub purchase_price: Option<u64>,
    pub location: Option<String>,
    pub supplier: Option<String>,
    pub notes: Option<String>,
}

/// Command accepted by the item aggregate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InventoryCommand {
    RecordMovement {
        movement: RecordMovement,
        policy: NegativeStockPolicy,
    },
}

/// Aggregate root: InventoryItem.
///
/// `current_stock` is a denormalized cache of the signed sum of this item's
/// movements. It is only ever changed by applying a `StockMovement`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InventoryItem {
    id: ItemId,
    code: String,
    name: String,
    category: Category,
    unit: String,
    current_stock: i64,
    min_stock: i64,
    max_stock: i64,
    purchase_price: u64,
    location: String,
    supplier: String,
    notes: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(skip)]
    version: u64,
}

impl InventoryItem {
    /// Create a new item with zero stock.
    pub fn create(id: ItemId, input: &NewItem, now: DateTime<Utc>) -> DomainResult<Self> {
        let item = Self {
            id,
            code: input.code.trim().to_string(),
            name: input.name.trim().to_string(),
            category: input.category,
            unit: input.unit.clone(),
            current_stock: 0,
            min_stock: input.min_stock,
            max_stock: input.max_stock,
            purchase_price: input.purchase_price,
            location: input.location.clone(),
            supplier: input.supplier.clone(),
            notes: input.notes.clone(),
            created_at: now,
            updated_at: now,
            version: 0,
        };
        item.validate()?;
        if input.initial_stock < 0 {
            return Err(DomainError::validation("initial_stock cannot be negative"));
        }
        Ok(item)
    }

    fn validate(&self) -> DomainResult<()> {
        if self.name.is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        if self.code.is_empty() {
            return Err(DomainError::validation("code cannot be empty"));
        }
        if self.min_stock < 0 {
            return Err(DomainError::validation("min_stock cannot be negative"));
        }
        if self.max_stock < self.min_stock {
            return Err(DomainError::validation("max_stock must be >= min_stock"));
        }
        Ok(())
    }

    /// Apply a details patch. Validates the result before committing it.
    pub fn apply_patch(&mut self, patch: &ItemPatch, now: DateTime<Utc>) -> DomainResult<()> {
        let mut next = self.clone();
        if let Some(v) = &patch.name {
            next.name = v.trim().to_string();
        }
        if let Some(v) = &patch.code {
            next.code = v.trim().to_string();
        }
        if let Some(v) = patch.category {
            next.category = v;
        }
        if let Some(v) = &patch.unit {
            next.unit = v.clone();
        }
        if let Some(v) = patch.min_stock {
            next.min_stock = v;
        }
        if let Some(v) = patch.max_stock {
            next.max_stock = v;
        }
        if let Some(v) = patch.purchase_price {
            next.purchase_price = v;
        }
        if let Some(v) = &patch.location {
            next.location = v.clone();
        }
        if let Some(v) = &patch.supplier {
            next.supplier = v.clone();
        }
        if let Some(v) = &patch.notes {
            next.notes = v.clone();
        }
        next.validate()?;
        next.updated_at = now;
        next.version += 1;
        *self = next;
        Ok(())
    }

    pub fn item_id(&self) -> ItemId {
        self.id
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn current_stock(&self) -> i64 {
        self.current_stock
    }

    pub fn min_stock(&self) -> i64 {
        self.min_stock
    }

    pub fn max_stock(&self) -> i64 {
        self.max_stock
    }

    pub fn purchase_price(&self) -> u64 {
        self.purchase_price
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn supplier(&self) -> &str {
        &self.supplier
    }

    pub fn notes(&self) -> &str {
        &self.notes
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn stock_status(&self) -> StockStatus {
        StockStatus::classify(self.current_stock, self.min_stock, self.max_stock)
    }

    /// `current_stock * purchase_price`, saturating.
    pub fn stock_value(&self) -> i64 {
        let price = i64::try_from(self.purchase_price).unwrap_or(i64::MAX);
        self.current_stock.saturating_mul(price)
    }

    /// Decide the movement for a command without mutating state.
    pub fn record(
        &self,
        cmd: &RecordMovement,
        policy: NegativeStockPolicy,
    ) -> DomainResult<StockMovement> {
        self.ensure_item_id(cmd.item_id)?;

        if cmd.quantity <= 0 {
            return Err(DomainError::InvalidQuantity(cmd.quantity));
        }
        if !cmd.reason.is_valid_for(cmd.movement_type) {
            return Err(DomainError::InvalidReason {
                movement_type: cmd.movement_type.to_string(),
                reason: cmd.reason.to_string(),
            });
        }

        let stock_before = self.current_stock;
        let stock_after = stock_before
            .checked_add(cmd.movement_type.sign() * cmd.quantity)
            .ok_or_else(|| DomainError::invariant("stock arithmetic overflow"))?;

        if stock_after < 0 && policy == NegativeStockPolicy::Reject {
            return Err(DomainError::InsufficientStock {
                available: stock_before,
                requested: cmd.quantity,
            });
        }

        Ok(StockMovement {
            id: cmd.movement_id,
            item_id: cmd.item_id,
            movement_type: cmd.movement_type,
            quantity: cmd.quantity,
            reason: cmd.reason,
            reference: cmd.reference.clone(),
            notes: cmd.notes.clone(),
            stock_before,
            stock_after,
            created_at: cmd.occurred_at,
        })
    }

    fn ensure_item_id(&self, item_id: ItemId) -> DomainResult<()> {
        if self.id != item_id {
            return Err(DomainError::invariant("item_id mismatch"));
        }
        Ok(())
    }
}

impl AggregateRoot for InventoryItem {
    type Id = ItemId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

impl Aggregate for InventoryItem {
    type Command = InventoryCommand;
    type Event = StockMovement;
    type Error = DomainError;

    fn apply(&mut self, movement: &Self::Event) {
        self.current_stock = movement.stock_after;
        self.updated_at = movement.created_at;
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            InventoryCommand::RecordMovement { movement, policy } => {
                Ok(vec![self.record(movement, *policy)?])
            }
        }
    }
}

/// Listing filter for `GET /items`. Empty query values count as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFilter {
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub search: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub category: Option<Category>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub low_stock_only: Option<bool>,
}

impl ItemFilter {
    pub fn matches(&self, item: &InventoryItem) -> bool {
        if let Some(search) = &self.search {
            let needle = search.to_lowercase();
            if !item.name.to_lowercase().contains(&needle)
                && !item.code.to_lowercase().contains(&needle)
            {
                return false;
            }
        }
        if let Some(category) = self.category {
            if item.category != category {
                return false;
            }
        }
        if self.low_stock_only.unwrap_or(false) && item.current_stock > item.min_stock {
            return false;
        }
        true
    }
}
