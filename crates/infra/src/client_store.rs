//! Client records referenced by work orders.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use turboshop_core::{ClientId, DomainError, DomainResult};
use turboshop_workshop::Client;

pub trait ClientStore: Send + Sync {
    /// Fails with `Conflict` when the id or the phone number is already taken.
    fn insert(&self, client: Client) -> DomainResult<()>;

    fn get(&self, id: ClientId) -> DomainResult<Option<Client>>;

    fn list(&self) -> DomainResult<Vec<Client>>;
}

impl<S> ClientStore for Arc<S>
where
    S: ClientStore + ?Sized,
{
    fn insert(&self, client: Client) -> DomainResult<()> {
        (**self).insert(client)
    }

    fn get(&self, id: ClientId) -> DomainResult<Option<Client>> {
        (**self).get(id)
    }

    fn list(&self) -> DomainResult<Vec<Client>> {
        (**self).list()
    }
}

#[derive(Debug, Default)]
pub struct InMemoryClientStore {
    clients: RwLock<HashMap<ClientId, Client>>,
}

impl InMemoryClientStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> DomainError {
    DomainError::invariant("client store lock poisoned")
}

impl ClientStore for InMemoryClientStore {
    fn insert(&self, client: Client) -> DomainResult<()> {
        let mut clients = self.clients.write().map_err(|_| poisoned())?;
        if clients.contains_key(&client.id) {
            return Err(DomainError::conflict(format!(
                "client {} already exists",
                client.id
            )));
        }
        if clients.values().any(|c| c.same_phone(&client.phone)) {
            return Err(DomainError::conflict(format!(
                "a client with phone {} already exists",
                client.phone
            )));
        }
        clients.insert(client.id, client);
        Ok(())
    }

    fn get(&self, id: ClientId) -> DomainResult<Option<Client>> {
        let clients = self.clients.read().map_err(|_| poisoned())?;
        Ok(clients.get(&id).cloned())
    }

    fn list(&self) -> DomainResult<Vec<Client>> {
        let clients = self.clients.read().map_err(|_| poisoned())?;
        let mut all: Vec<Client> = clients.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(all)
    }
}
