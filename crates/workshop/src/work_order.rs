use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use turboshop_core::query::empty_string_as_none;
use turboshop_core::{Aggregate, AggregateRoot, ClientId, DomainError, DomainResult, WorkOrderId};

/// Width of the zero-padded human-readable work number.
pub const WORK_NUMBER_WIDTH: usize = 5;

pub const DEFAULT_CLEANING_PRICE: u64 = 17000;
pub const DEFAULT_RECONDITIONING_PRICE: u64 = 17000;
pub const DEFAULT_TURBO_PRICE: u64 = 24000;

/// `1 -> "00001"`. Sequences wider than the pad are printed in full.
pub fn format_work_number(sequence: u64) -> String {
    format!("{sequence:0width$}", width = WORK_NUMBER_WIDTH)
}

/// Work-order lifecycle.
///
/// ```text
/// DRAFT -> RECEIVED -> IN_PROGRESS -> QUOTED -> ACCEPTED -> WORKING -> READY -> DELIVERED -> FINALIZED
///                                           \-> REJECTED -------------------------------------^
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkOrderStatus {
    Draft,
    Received,
    InProgress,
    Quoted,
    Accepted,
    Rejected,
    Working,
    Ready,
    Delivered,
    Finalized,
}

impl WorkOrderStatus {
    pub const ALL: [WorkOrderStatus; 10] = [
        WorkOrderStatus::Draft,
        WorkOrderStatus::Received,
        WorkOrderStatus::InProgress,
        WorkOrderStatus::Quoted,
        WorkOrderStatus::Accepted,
        WorkOrderStatus::Rejected,
        WorkOrderStatus::Working,
        WorkOrderStatus::Ready,
        WorkOrderStatus::Delivered,
        WorkOrderStatus::Finalized,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkOrderStatus::Draft => "DRAFT",
            WorkOrderStatus::Received => "RECEIVED",
            WorkOrderStatus::InProgress => "IN_PROGRESS",
            WorkOrderStatus::Quoted => "QUOTED",
            WorkOrderStatus::Accepted => "ACCEPTED",
            WorkOrderStatus::Rejected => "REJECTED",
            WorkOrderStatus::Working => "WORKING",
            WorkOrderStatus::Ready => "READY",
            WorkOrderStatus::Delivered => "DELIVERED",
            WorkOrderStatus::Finalized => "FINALIZED",
        }
    }

    /// States reachable through a normal transition.
    ///
    /// `REJECTED` admits no further work: its only exit is the close-out edge
    /// to `FINALIZED`.
    pub fn successors(&self) -> &'static [WorkOrderStatus] {
        use WorkOrderStatus::*;
        match self {
            Draft => &[Received],
            Received => &[InProgress],
            InProgress => &[Quoted],
            Quoted => &[Accepted, Rejected],
            Accepted => &[Working],
            Rejected => &[Finalized],
            Working => &[Ready],
            Ready => &[Delivered],
            Delivered => &[Finalized],
            Finalized => &[],
        }
    }

    pub fn can_transition_to(&self, next: WorkOrderStatus) -> bool {
        self.successors().contains(&next)
    }

    pub fn is_terminal(&self) -> bool {
        self.successors().is_empty()
    }

    /// Position along the lifecycle. ACCEPTED and REJECTED share a stage.
    pub fn stage(&self) -> u8 {
        match self {
            WorkOrderStatus::Draft => 0,
            WorkOrderStatus::Received => 1,
            WorkOrderStatus::InProgress => 2,
            WorkOrderStatus::Quoted => 3,
            WorkOrderStatus::Accepted | WorkOrderStatus::Rejected => 4,
            WorkOrderStatus::Working => 5,
            WorkOrderStatus::Ready => 6,
            WorkOrderStatus::Delivered => 7,
            WorkOrderStatus::Finalized => 8,
        }
    }
}

impl core::fmt::Display for WorkOrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for WorkOrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| DomainError::validation(format!("unknown work order status '{s}'")))
    }
}

/// One entry of a work order's status history (also the aggregate's event).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub from: WorkOrderStatus,
    pub to: WorkOrderStatus,
    pub at: DateTime<Utc>,
    /// Set for administrative corrections that bypass the state machine.
    #[serde(rename = "override")]
    pub is_override: bool,
    #[serde(default)]
    pub note: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkOrderCommand {
    /// Follow one edge of the state machine.
    Advance {
        to: WorkOrderStatus,
        occurred_at: DateTime<Utc>,
    },
    /// Administrative correction: any target except the current status.
    /// Requires a reason, which is kept in the history.
    Override {
        to: WorkOrderStatus,
        reason: String,
        occurred_at: DateTime<Utc>,
    },
}

/// Work-order creation input. Omitted prices take the shop defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewWorkOrder {
    pub client_id: ClientId,
    pub turbo_code: String,
    #[serde(default)]
    pub car_make: String,
    #[serde(default)]
    pub car_model: String,
    #[serde(default)]
    pub car_year: Option<u16>,
    #[serde(default)]
    pub engine_code: String,
    #[serde(default)]
    pub general_notes: String,
    #[serde(default)]
    pub received_date: Option<NaiveDate>,
    #[serde(default)]
    pub estimated_completion: Option<NaiveDate>,
    #[serde(default)]
    pub cleaning_price: Option<u64>,
    #[serde(default)]
    pub reconditioning_price: Option<u64>,
    #[serde(default)]
    pub turbo_price: Option<u64>,
}

impl NewWorkOrder {
    pub fn new(client_id: ClientId, turbo_code: impl Into<String>) -> Self {
        Self {
            client_id,
            turbo_code: turbo_code.into(),
            car_make: String::new(),
            car_model: String::new(),
            car_year: None,
            engine_code: String::new(),
            general_notes: String::new(),
            received_date: None,
            estimated_completion: None,
            cleaning_price: None,
            reconditioning_price: None,
            turbo_price: None,
        }
    }
}

/// Aggregate root: WorkOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkOrder {
    id: WorkOrderId,
    work_sequence: u64,
    work_number: String,
    client_id: ClientId,
    turbo_code: String,
    car_make: String,
    car_model: String,
    car_year: Option<u16>,
    engine_code: String,
    general_notes: String,
    received_date: NaiveDate,
    estimated_completion: Option<NaiveDate>,
    status: WorkOrderStatus,
    cleaning_price: u64,
    reconditioning_price: u64,
    turbo_price: u64,
    quote_sent: bool,
    quote_accepted: bool,
    is_finalized: bool,
    finalized_at: Option<DateTime<Utc>>,
    history: Vec<StatusChange>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(skip)]
    version: u64,
}

impl WorkOrder {
    /// Build a new `DRAFT` order for an already allocated sequence.
    pub fn create(
        id: WorkOrderId,
        work_sequence: u64,
        input: &NewWorkOrder,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if work_sequence == 0 {
            return Err(DomainError::invariant("work_sequence starts at 1"));
        }
        let turbo_code = input.turbo_code.trim();
        if turbo_code.is_empty() {
            return Err(DomainError::validation("turbo_code cannot be empty"));
        }

        Ok(Self {
            id,
            work_sequence,
            work_number: format_work_number(work_sequence),
            client_id: input.client_id,
            turbo_code: turbo_code.to_string(),
            car_make: input.car_make.trim().to_string(),
            car_model: input.car_model.trim().to_string(),
            car_year: input.car_year,
            engine_code: input.engine_code.trim().to_string(),
            general_notes: input.general_notes.clone(),
            received_date: input.received_date.unwrap_or_else(|| now.date_naive()),
            estimated_completion: input.estimated_completion,
            status: WorkOrderStatus::Draft,
            cleaning_price: input.cleaning_price.unwrap_or(DEFAULT_CLEANING_PRICE),
            reconditioning_price: input
                .reconditioning_price
                .unwrap_or(DEFAULT_RECONDITIONING_PRICE),
            turbo_price: input.turbo_price.unwrap_or(DEFAULT_TURBO_PRICE),
            quote_sent: false,
            quote_accepted: false,
            is_finalized: false,
            finalized_at: None,
            history: Vec::new(),
            created_at: now,
            updated_at: now,
            version: 0,
        })
    }

    pub fn work_order_id(&self) -> WorkOrderId {
        self.id
    }

    pub fn work_sequence(&self) -> u64 {
        self.work_sequence
    }

    pub fn work_number(&self) -> &str {
        &self.work_number
    }

    pub fn client_id(&self) -> ClientId {
        self.client_id
    }

    pub fn turbo_code(&self) -> &str {
        &self.turbo_code
    }

    pub fn car_make(&self) -> &str {
        &self.car_make
    }

    pub fn car_model(&self) -> &str {
        &self.car_model
    }

    pub fn status(&self) -> WorkOrderStatus {
        self.status
    }

    pub fn quote_sent(&self) -> bool {
        self.quote_sent
    }

    pub fn quote_accepted(&self) -> bool {
        self.quote_accepted
    }

    pub fn is_finalized(&self) -> bool {
        self.is_finalized
    }

    pub fn finalized_at(&self) -> Option<DateTime<Utc>> {
        self.finalized_at
    }

    pub fn history(&self) -> &[StatusChange] {
        &self.history
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// `cleaning + reconditioning + turbo`, in minor currency units.
    pub fn total_amount(&self) -> u64 {
        self.cleaning_price
            .saturating_add(self.reconditioning_price)
            .saturating_add(self.turbo_price)
    }

    fn handle_advance(
        &self,
        to: WorkOrderStatus,
        occurred_at: DateTime<Utc>,
    ) -> DomainResult<Vec<StatusChange>> {
        if !self.status.can_transition_to(to) {
            return Err(DomainError::invalid_transition(self.status, to));
        }
        Ok(vec![StatusChange {
            from: self.status,
            to,
            at: occurred_at,
            is_override: false,
            note: String::new(),
        }])
    }

    fn handle_override(
        &self,
        to: WorkOrderStatus,
        reason: &str,
        occurred_at: DateTime<Utc>,
    ) -> DomainResult<Vec<StatusChange>> {
        if reason.trim().is_empty() {
            return Err(DomainError::validation("status override requires a reason"));
        }
        if to == self.status {
            return Err(DomainError::validation(format!(
                "work order is already {}",
                self.status
            )));
        }
        Ok(vec![StatusChange {
            from: self.status,
            to,
            at: occurred_at,
            is_override: true,
            note: reason.trim().to_string(),
        }])
    }
}

impl AggregateRoot for WorkOrder {
    type Id = WorkOrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

impl Aggregate for WorkOrder {
    type Command = WorkOrderCommand;
    type Event = StatusChange;
    type Error = DomainError;

    fn apply(&mut self, change: &Self::Event) {
        self.status = change.to;
        match change.to {
            WorkOrderStatus::Quoted => self.quote_sent = true,
            WorkOrderStatus::Accepted => self.quote_accepted = true,
            WorkOrderStatus::Finalized => {
                self.is_finalized = true;
                self.finalized_at = Some(change.at);
            }
            _ => {}
        }
        // An override out of FINALIZED reopens the order.
        if change.to != WorkOrderStatus::Finalized {
            self.is_finalized = false;
            self.finalized_at = None;
        }
        self.history.push(change.clone());
        self.updated_at = change.at;
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            WorkOrderCommand::Advance { to, occurred_at } => self.handle_advance(*to, *occurred_at),
            WorkOrderCommand::Override {
                to,
                reason,
                occurred_at,
            } => self.handle_override(*to, reason, *occurred_at),
        }
    }
}

/// Listing filter for `GET /work-orders`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkOrderFilter {
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub status: Option<WorkOrderStatus>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub client_id: Option<ClientId>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub search: Option<String>,
}

impl WorkOrderFilter {
    /// `search` is case-insensitive over work number, turbo code, car make/model
    /// and the client's name when it is known.
    pub fn matches(&self, order: &WorkOrder, client_name: Option<&str>) -> bool {
        if self.status.is_some_and(|s| s != order.status) {
            return false;
        }
        if self.client_id.is_some_and(|c| c != order.client_id) {
            return false;
        }
        if let Some(search) = &self.search {
            let needle = search.to_lowercase();
            let haystacks = [
                order.work_number.as_str(),
                order.turbo_code.as_str(),
                order.car_make.as_str(),
                order.car_model.as_str(),
                client_name.unwrap_or_default(),
            ];
            if !haystacks
                .iter()
                .any(|h| h.to_lowercase().contains(&needle))
            {
                return false;
            }
        }
        true
    }
}
