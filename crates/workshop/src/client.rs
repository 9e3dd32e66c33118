use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use turboshop_core::query::empty_string_as_none;
use turboshop_core::{ClientId, DomainError, DomainResult};

/// Client-creation input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewClient {
    pub name: String,
    pub phone: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub notes: String,
}

impl NewClient {
    pub fn new(name: impl Into<String>, phone: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            phone: phone.into(),
            email: String::new(),
            address: String::new(),
            notes: String::new(),
        }
    }
}

/// Work-order owner. Referenced by work orders, never owned by them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    pub id: ClientId,
    pub name: String,
    pub phone: String,
    pub email: String,
    pub address: String,
    pub notes: String,
    pub created_at: DateTime<Utc>,
}

impl Client {
    pub fn create(id: ClientId, input: &NewClient, now: DateTime<Utc>) -> DomainResult<Self> {
        let name = input.name.trim();
        if name.is_empty() {
            return Err(DomainError::validation("client name cannot be empty"));
        }
        let phone = input.phone.trim();
        if phone.is_empty() {
            return Err(DomainError::validation("client phone cannot be empty"));
        }

        Ok(Self {
            id,
            name: name.to_string(),
            phone: phone.to_string(),
            email: input.email.trim().to_string(),
            address: input.address.trim().to_string(),
            notes: input.notes.clone(),
            created_at: now,
        })
    }

    /// Phone numbers identify clients; spacing differences do not count.
    pub fn same_phone(&self, phone: &str) -> bool {
        normalize_phone(&self.phone) == normalize_phone(phone)
    }
}

fn normalize_phone(phone: &str) -> String {
    phone.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Listing filter for `GET /clients`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientFilter {
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub search: Option<String>,
}

impl ClientFilter {
    /// `search` is case-insensitive over name and phone.
    pub fn matches(&self, client: &Client) -> bool {
        let Some(search) = &self.search else {
            return true;
        };
        let needle = search.to_lowercase();
        client.name.to_lowercase().contains(&needle) || client.phone.contains(search.trim())
    }
}
