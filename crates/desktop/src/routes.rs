//! Typed backend routes and their offline stand-ins.

use std::collections::HashMap;

use serde_json::{Value, json};

use turboshop_inventory::Dashboard;
use turboshop_workshop::{CAR_MAKES, WORK_PROCESSES};

use crate::error::{OfflineError, OfflineResult};

/// Every GET route the client knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    Health,
    Items,
    Item,
    ItemAudit,
    Movements,
    Dashboard,
    Clients,
    Client,
    WorkOrders,
    WorkOrder,
    CarMakes,
    WorkProcesses,
}

impl Route {
    pub const ALL: [Route; 12] = [
        Route::Health,
        Route::Items,
        Route::Item,
        Route::ItemAudit,
        Route::Movements,
        Route::Dashboard,
        Route::Clients,
        Route::Client,
        Route::WorkOrders,
        Route::WorkOrder,
        Route::CarMakes,
        Route::WorkProcesses,
    ];

    /// Match a path (query string allowed) against the known routes.
    pub fn resolve(path: &str) -> Option<Route> {
        let path = path.split('?').next().unwrap_or_default();
        let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
        let route = match segments.as_slice() {
            ["health"] => Route::Health,
            ["items"] => Route::Items,
            ["items", _] => Route::Item,
            ["items", _, "audit"] => Route::ItemAudit,
            ["movements"] => Route::Movements,
            ["dashboard"] => Route::Dashboard,
            ["clients"] => Route::Clients,
            ["clients", _] => Route::Client,
            ["work-orders"] => Route::WorkOrders,
            ["work-orders", _] => Route::WorkOrder,
            ["car-makes"] => Route::CarMakes,
            ["work-processes"] => Route::WorkProcesses,
            _ => return None,
        };
        Some(route)
    }
}

type DefaultProducer = fn() -> Value;

fn empty_list() -> Value {
    json!([])
}

fn null_entity() -> Value {
    Value::Null
}

fn zeroed_dashboard() -> Value {
    serde_json::to_value(Dashboard::default()).unwrap_or(Value::Null)
}

fn car_makes() -> Value {
    Value::Array(CAR_MAKES.iter().map(|name| json!({ "name": name })).collect())
}

fn work_processes() -> Value {
    serde_json::to_value(WORK_PROCESSES).unwrap_or_else(|_| json!([]))
}

fn offline_health() -> Value {
    json!({ "status": "offline" })
}

/// Stand-in bodies returned when neither the network nor the cache can answer.
#[derive(Debug, Clone)]
pub struct OfflineDefaults {
    producers: HashMap<Route, DefaultProducer>,
}

impl OfflineDefaults {
    /// Lists are empty, lookups are the built-in reference sets, the dashboard
    /// is zeroed and single entities are `null`.
    pub fn standard() -> Self {
        let producers: HashMap<Route, DefaultProducer> = Route::ALL
            .into_iter()
            .map(|route| {
                let producer: DefaultProducer = match route {
                    Route::Items | Route::Movements | Route::Clients | Route::WorkOrders => {
                        empty_list
                    }
                    Route::Item | Route::ItemAudit | Route::Client | Route::WorkOrder => {
                        null_entity
                    }
                    Route::Dashboard => zeroed_dashboard,
                    Route::CarMakes => car_makes,
                    Route::WorkProcesses => work_processes,
                    Route::Health => offline_health,
                };
                (route, producer)
            })
            .collect();
        Self { producers }
    }

    pub fn with(mut self, route: Route, producer: DefaultProducer) -> Self {
        self.producers.insert(route, producer);
        self
    }

    pub fn without(mut self, route: Route) -> Self {
        self.producers.remove(&route);
        self
    }

    /// Every route must have a default. Checked once at startup.
    pub fn validate(&self) -> OfflineResult<()> {
        for route in Route::ALL {
            if !self.producers.contains_key(&route) {
                return Err(OfflineError::MissingDefault(route));
            }
        }
        Ok(())
    }

    /// Default for `path`; unknown paths get `null`.
    pub fn for_path(&self, path: &str) -> Value {
        Route::resolve(path)
            .and_then(|route| self.producers.get(&route))
            .map(|produce| produce())
            .unwrap_or(Value::Null)
    }
}

impl Default for OfflineDefaults {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_resolve_to_routes() {
        assert_eq!(Route::resolve("/items?low_stock_only=true"), Some(Route::Items));
        assert_eq!(Route::resolve("/items/abc"), Some(Route::Item));
        assert_eq!(Route::resolve("/items/abc/audit"), Some(Route::ItemAudit));
        assert_eq!(Route::resolve("/work-orders/"), Some(Route::WorkOrders));
        assert_eq!(Route::resolve("/nope"), None);
    }

    #[test]
    fn standard_defaults_cover_every_route() {
        let defaults = OfflineDefaults::standard();
        defaults.validate().unwrap();

        assert_eq!(defaults.for_path("/items"), json!([]));
        assert_eq!(defaults.for_path("/work-orders/123"), Value::Null);
        assert_eq!(defaults.for_path("/dashboard")["total_items"], 0);
        assert!(
            defaults.for_path("/car-makes").as_array().unwrap().len() == CAR_MAKES.len()
        );
        assert_eq!(
            defaults.for_path("/work-processes").as_array().unwrap().len(),
            WORK_PROCESSES.len()
        );
    }

    #[test]
    fn missing_default_fails_validation() {
        let defaults = OfflineDefaults::standard().without(Route::Dashboard);
        assert!(matches!(
            defaults.validate(),
            Err(OfflineError::MissingDefault(Route::Dashboard))
        ));
    }
}
