use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::item::InventoryItem;
use crate::movement::StockMovement;

/// Movements newer than this many days count as "recent".
pub const RECENT_MOVEMENT_WINDOW_DAYS: i64 = 7;

/// Aggregate inventory figures.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dashboard {
    pub total_items: usize,
    /// Items at or below their minimum (includes out-of-stock items).
    pub low_stock_items: usize,
    pub out_of_stock_items: usize,
    pub recent_movements: usize,
    /// Sum of `current_stock * purchase_price` in minor currency units.
    pub total_stock_value: i64,
    pub last_updated: Option<DateTime<Utc>>,
}

pub fn compute_dashboard<'a>(
    items: impl IntoIterator<Item = &'a InventoryItem>,
    movements: impl IntoIterator<Item = &'a StockMovement>,
    now: DateTime<Utc>,
) -> Dashboard {
    let mut dashboard = Dashboard {
        last_updated: Some(now),
        ..Dashboard::default()
    };

    for item in items {
        dashboard.total_items += 1;
        if item.current_stock() <= item.min_stock() {
            dashboard.low_stock_items += 1;
        }
        if item.current_stock() <= 0 {
            dashboard.out_of_stock_items += 1;
        }
        dashboard.total_stock_value = dashboard
            .total_stock_value
            .saturating_add(item.stock_value());
    }

    let cutoff = now - Duration::days(RECENT_MOVEMENT_WINDOW_DAYS);
    dashboard.recent_movements = movements
        .into_iter()
        .filter(|m| m.created_at >= cutoff)
        .count();

    dashboard
}
