//! Work-order numbering and lifecycle orchestration.
//!
//! Numbers are allocated optimistically: read `max(work_sequence) + 1`, try to
//! insert, and on a uniqueness violation recompute and try again. No global lock
//! serializes order creation; the store's unique constraint does the arbitration.

use chrono::Utc;
use serde::Serialize;

use turboshop_core::{
    Aggregate, AggregateRoot, ClientId, DomainError, DomainResult, ExpectedVersion, WorkOrderId,
};
use turboshop_workshop::{
    Client, ClientFilter, NewClient, NewWorkOrder, WorkOrder, WorkOrderCommand, WorkOrderFilter,
    WorkOrderStatus,
};

use crate::client_store::ClientStore;
use crate::work_order_store::{WorkOrderStore, WorkOrderStoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequencerConfig {
    /// Allocation attempts before giving up with `SequenceConflict`.
    pub max_retries: u32,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self { max_retries: 5 }
    }
}

/// Work order joined with its client and computed total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkOrderView {
    #[serde(flatten)]
    pub order: WorkOrder,
    pub client_name: Option<String>,
    pub client_phone: Option<String>,
    pub total_amount: u64,
}

#[derive(Debug)]
pub struct WorkOrderSequencer<W, C> {
    orders: W,
    clients: C,
    config: SequencerConfig,
}

impl<W, C> WorkOrderSequencer<W, C> {
    pub fn new(orders: W, clients: C, config: SequencerConfig) -> Self {
        Self {
            orders,
            clients,
            config,
        }
    }
}

impl<W, C> WorkOrderSequencer<W, C>
where
    W: WorkOrderStore,
    C: ClientStore,
{
    pub fn register_client(&self, input: NewClient) -> DomainResult<Client> {
        let client = Client::create(ClientId::new(), &input, Utc::now())?;
        self.clients.insert(client.clone())?;
        tracing::info!(client_id = %client.id, "client registered");
        Ok(client)
    }

    pub fn client(&self, id: ClientId) -> DomainResult<Client> {
        self.clients
            .get(id)?
            .ok_or_else(|| DomainError::ClientNotFound(id.to_string()))
    }

    /// Clients sorted by name.
    pub fn clients(&self, filter: &ClientFilter) -> DomainResult<Vec<Client>> {
        Ok(self
            .clients
            .list()?
            .into_iter()
            .filter(|c| filter.matches(c))
            .collect())
    }

    /// Create a `DRAFT` order with the next free sequence number.
    pub fn create_work_order(&self, input: NewWorkOrder) -> DomainResult<WorkOrderView> {
        let client = self.client(input.client_id)?;
        let id = WorkOrderId::new();

        for attempt in 1..=self.config.max_retries {
            let sequence = self.orders.max_sequence()? + 1;
            let order = WorkOrder::create(id, sequence, &input, Utc::now())?;

            match self.orders.insert(order.clone()) {
                Ok(()) => {
                    tracing::info!(
                        work_order_id = %id,
                        work_number = order.work_number(),
                        "work order created"
                    );
                    return Ok(Self::view(order, Some(&client)));
                }
                Err(WorkOrderStoreError::DuplicateSequence(taken)) => {
                    tracing::debug!(attempt, sequence = taken, "work sequence taken; retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }

        tracing::error!(
            attempts = self.config.max_retries,
            "work sequence allocation exhausted its retries"
        );
        Err(DomainError::SequenceConflict {
            attempts: self.config.max_retries,
        })
    }

    pub fn get(&self, id: WorkOrderId) -> DomainResult<WorkOrderView> {
        let order = self.load(id)?;
        let client = self.clients.get(order.client_id())?;
        Ok(Self::view(order, client.as_ref()))
    }

    /// Filtered listing, newest first.
    pub fn list(&self, filter: &WorkOrderFilter) -> DomainResult<Vec<WorkOrderView>> {
        let mut views = Vec::new();
        for order in self.orders.list()? {
            let client = self.clients.get(order.client_id())?;
            if filter.matches(&order, client.as_ref().map(|c| c.name.as_str())) {
                views.push(Self::view(order, client.as_ref()));
            }
        }
        views.sort_by(|a, b| b.order.work_sequence().cmp(&a.order.work_sequence()));
        Ok(views)
    }

    /// Follow one edge of the status state machine.
    pub fn change_status(&self, id: WorkOrderId, to: WorkOrderStatus) -> DomainResult<WorkOrderView> {
        let view = self.execute(id, |_| WorkOrderCommand::Advance {
            to,
            occurred_at: Utc::now(),
        })?;
        tracing::info!(work_order_id = %id, status = %to, "work order status changed");
        Ok(view)
    }

    /// Administrative correction outside the state machine. Always logged.
    pub fn override_status(
        &self,
        id: WorkOrderId,
        to: WorkOrderStatus,
        reason: &str,
    ) -> DomainResult<WorkOrderView> {
        let mut from = None;
        let view = self.execute(id, |order| {
            from = Some(order.status());
            WorkOrderCommand::Override {
                to,
                reason: reason.to_string(),
                occurred_at: Utc::now(),
            }
        })?;
        tracing::warn!(
            work_order_id = %id,
            from = ?from,
            to = %to,
            reason,
            "work order status overridden"
        );
        Ok(view)
    }

    fn execute(
        &self,
        id: WorkOrderId,
        mut command: impl FnMut(&WorkOrder) -> WorkOrderCommand,
    ) -> DomainResult<WorkOrderView> {
        for attempt in 1..=self.config.max_retries {
            let mut order = self.load(id)?;
            let expected = ExpectedVersion::Exact(order.version());
            for change in order.handle(&command(&order))? {
                order.apply(&change);
            }

            match self.orders.update(order.clone(), expected) {
                Ok(()) => {
                    let client = self.clients.get(order.client_id())?;
                    return Ok(Self::view(order, client.as_ref()));
                }
                Err(WorkOrderStoreError::Concurrency(msg)) => {
                    tracing::debug!(work_order_id = %id, attempt, %msg, "status update lost a race; retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(DomainError::conflict(format!(
            "work order {id} kept changing during status update"
        )))
    }

    fn load(&self, id: WorkOrderId) -> DomainResult<WorkOrder> {
        self.orders
            .get(id)?
            .ok_or_else(|| DomainError::WorkOrderNotFound(id.to_string()))
    }

    fn view(order: WorkOrder, client: Option<&Client>) -> WorkOrderView {
        WorkOrderView {
            total_amount: order.total_amount(),
            client_name: client.map(|c| c.name.clone()),
            client_phone: client.map(|c| c.phone.clone()),
            order,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client_store::InMemoryClientStore;
    use crate::work_order_store::InMemoryWorkOrderStore;

    type TestSequencer = WorkOrderSequencer<InMemoryWorkOrderStore, InMemoryClientStore>;

    fn test_sequencer() -> (TestSequencer, ClientId) {
        let sequencer = WorkOrderSequencer::new(
            InMemoryWorkOrderStore::new(),
            InMemoryClientStore::new(),
            SequencerConfig::default(),
        );
        let client = sequencer
            .register_client(NewClient::new("Kovács Béla", "+36 30 123 4567"))
            .unwrap();
        (sequencer, client.id)
    }

    #[test]
    fn first_three_orders_are_numbered_from_one() {
        let (sequencer, client_id) = test_sequencer();
        let numbers: Vec<(u64, String)> = (0..3)
            .map(|_| {
                let view = sequencer
                    .create_work_order(NewWorkOrder::new(client_id, "5490-970-0071"))
                    .unwrap();
                assert_eq!(view.order.status(), WorkOrderStatus::Draft);
                (view.order.work_sequence(), view.order.work_number().to_string())
            })
            .collect();

        assert_eq!(
            numbers,
            vec![
                (1, "00001".to_string()),
                (2, "00002".to_string()),
                (3, "00003".to_string())
            ]
        );
    }

    #[test]
    fn clients_are_unique_by_phone_and_searchable() {
        let (sequencer, _) = test_sequencer();
        let err = sequencer
            .register_client(NewClient::new("Kovács B.", "+36 30 123 4567"))
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));

        sequencer
            .register_client(NewClient::new("Nagy Anna", "+36 20 555 0000"))
            .unwrap();
        let found = sequencer
            .clients(&ClientFilter {
                search: Some("555".into()),
            })
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Nagy Anna");
        assert_eq!(sequencer.clients(&ClientFilter::default()).unwrap().len(), 2);
    }

    #[test]
    fn unknown_client_is_rejected() {
        let (sequencer, _) = test_sequencer();
        let err = sequencer
            .create_work_order(NewWorkOrder::new(ClientId::new(), "X"))
            .unwrap_err();
        assert!(matches!(err, DomainError::ClientNotFound(_)));
    }

    #[test]
    fn listing_joins_client_and_total_newest_first() {
        let (sequencer, client_id) = test_sequencer();
        for _ in 0..2 {
            sequencer
                .create_work_order(NewWorkOrder::new(client_id, "5490-970-0071"))
                .unwrap();
        }

        let views = sequencer.list(&WorkOrderFilter::default()).unwrap();
        assert_eq!(views[0].order.work_sequence(), 2);
        assert_eq!(views[0].client_name.as_deref(), Some("Kovács Béla"));
        assert_eq!(views[0].total_amount, 58000);
    }

    #[test]
    fn status_changes_follow_the_state_machine() {
        let (sequencer, client_id) = test_sequencer();
        let id = sequencer
            .create_work_order(NewWorkOrder::new(client_id, "X"))
            .unwrap()
            .order
            .work_order_id();

        assert!(matches!(
            sequencer.change_status(id, WorkOrderStatus::Ready),
            Err(DomainError::InvalidTransition { .. })
        ));
        let view = sequencer.change_status(id, WorkOrderStatus::Received).unwrap();
        assert_eq!(view.order.status(), WorkOrderStatus::Received);

        let corrected = sequencer
            .override_status(id, WorkOrderStatus::Draft, "opened by mistake")
            .unwrap();
        assert_eq!(corrected.order.status(), WorkOrderStatus::Draft);
        assert!(corrected.order.history().last().unwrap().is_override);
    }
}
