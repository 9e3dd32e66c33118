//! Service wiring: in-memory stores behind the ledger engine and the sequencer.

use turboshop_core::DomainResult;
use turboshop_infra::{
    InMemoryClientStore, InMemoryLedgerStore, InMemoryWorkOrderStore, LedgerConfig,
    SequencerConfig, StockMovementEngine, WorkOrderSequencer,
};

use crate::config::ApiConfig;

pub type Ledger = StockMovementEngine<InMemoryLedgerStore>;
pub type Workshop = WorkOrderSequencer<InMemoryWorkOrderStore, InMemoryClientStore>;

#[derive(Debug)]
pub struct AppServices {
    pub ledger: Ledger,
    pub workshop: Workshop,
}

pub fn build_services(config: &ApiConfig) -> DomainResult<AppServices> {
    let ledger = StockMovementEngine::new(
        InMemoryLedgerStore::new(),
        LedgerConfig {
            negative_stock: config.negative_stock,
            ..LedgerConfig::default()
        },
    );
    let workshop = WorkOrderSequencer::new(
        InMemoryWorkOrderStore::new(),
        InMemoryClientStore::new(),
        SequencerConfig::default(),
    );

    if config.seed_defaults {
        ledger.seed_default_items()?;
    }

    tracing::info!(
        negative_stock = ?config.negative_stock,
        seeded = config.seed_defaults,
        "services ready"
    );
    Ok(AppServices { ledger, workshop })
}
