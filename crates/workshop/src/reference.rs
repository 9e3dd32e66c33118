//! Static lookup data served by the reference endpoints.

use serde::Serialize;

/// Car makes offered in the work-order form.
pub const CAR_MAKES: &[&str] = &[
    "Audi",
    "BMW",
    "Ford",
    "Mercedes-Benz",
    "Opel",
    "Renault",
    "Volkswagen",
];

/// A standard workshop process with its default price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WorkProcess {
    pub name: &'static str,
    pub category: &'static str,
    pub estimated_minutes: u32,
    /// Minor currency units.
    pub base_price: u64,
}

pub const WORK_PROCESSES: &[WorkProcess] = &[
    WorkProcess {
        name: "Diagnosis",
        category: "diagnosis",
        estimated_minutes: 30,
        base_price: 0,
    },
    WorkProcess {
        name: "Cleaning",
        category: "cleaning",
        estimated_minutes: 60,
        base_price: 17000,
    },
    WorkProcess {
        name: "Reconditioning",
        category: "reconditioning",
        estimated_minutes: 120,
        base_price: 17000,
    },
    WorkProcess {
        name: "Turbo replacement",
        category: "turbo",
        estimated_minutes: 90,
        base_price: 24000,
    },
];
