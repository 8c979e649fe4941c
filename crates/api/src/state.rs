//! Shared application state and the in-memory collaborator set.

use std::sync::Arc;

use checkout::collaborators::{
    Collaborators, InMemoryAddressBook, InMemoryCartStore, InMemoryCatalog, InMemoryNotifier,
    InMemoryOrderService, InMemoryPromotionStore,
};
use checkout::{CheckoutConfig, CheckoutOrchestrator, PromotionService};
use inventory::{
    AvailabilityAggregator, ReservationAnalytics, ReservationEngine, SelectorConfig,
    WarehouseSelector,
};
use stock_ledger::StockLedger;
use sweeper::InMemoryUserActivity;
use task_queue::TaskQueue;

/// Shared application state accessible from all handlers.
pub struct AppState<L: StockLedger> {
    pub engine: ReservationEngine<L>,
    pub selector: WarehouseSelector<L>,
    pub aggregator: AvailabilityAggregator<L>,
    pub analytics: ReservationAnalytics<L>,
    pub checkout: CheckoutOrchestrator<L>,
    pub queue: Arc<dyn TaskQueue>,
}

impl<L: StockLedger> AppState<L> {
    pub fn new(
        ledger: Arc<L>,
        collaborators: Collaborators,
        queue: Arc<dyn TaskQueue>,
        config: CheckoutConfig,
    ) -> Self {
        let selector = WarehouseSelector::with_config(
            Arc::clone(&ledger),
            SelectorConfig {
                default_warehouse_id: config.default_warehouse_id,
            },
        );
        Self {
            engine: ReservationEngine::new(Arc::clone(&ledger)),
            selector,
            aggregator: AvailabilityAggregator::new(Arc::clone(&ledger)),
            analytics: ReservationAnalytics::new(Arc::clone(&ledger)),
            checkout: CheckoutOrchestrator::new(ledger, collaborators, Arc::clone(&queue), config),
            queue,
        }
    }

    pub fn promotions(&self) -> &PromotionService {
        self.checkout.promotions()
    }
}

/// Carts, catalog, addresses, orders, promotions and mail held in process.
///
/// These systems live outside this service; the binary runs against this set
/// until real clients are wired in.
#[derive(Clone, Default)]
pub struct InMemoryCollaborators {
    pub carts: InMemoryCartStore,
    pub catalog: InMemoryCatalog,
    pub addresses: InMemoryAddressBook,
    pub orders: InMemoryOrderService,
    pub promotions: InMemoryPromotionStore,
    pub notifier: InMemoryNotifier,
    pub activity: InMemoryUserActivity,
}

impl InMemoryCollaborators {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            carts: Arc::new(self.carts.clone()),
            catalog: Arc::new(self.catalog.clone()),
            addresses: Arc::new(self.addresses.clone()),
            orders: Arc::new(self.orders.clone()),
            promotions: Arc::new(self.promotions.clone()),
            notifier: Arc::new(self.notifier.clone()),
        }
    }
}
