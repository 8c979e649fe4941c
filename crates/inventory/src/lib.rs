//! Stock reservation and warehouse selection.
//!
//! - [`ReservationEngine`] performs atomic reserve, release, sale, adjust and
//!   restock operations against a [`stock_ledger::StockLedger`].
//! - [`WarehouseSelector`] finds the nearest warehouse able to ship a line.
//! - [`AvailabilityAggregator`] checks a whole basket across warehouses and
//!   recommends one to ship from.
//! - [`ReservationAnalytics`] derives conversion and hold-time figures from
//!   the audit log.

pub mod analytics;
pub mod availability;
pub mod error;
pub mod reservation;
pub mod selector;

pub use analytics::{ItemReservationStats, ReservationAnalytics};
pub use availability::{
    AvailabilityAggregator, AvailabilityReport, ItemAvailability, ItemRequest,
    RecommendedWarehouse,
};
pub use error::{InventoryError, Result};
pub use reservation::{
    AdjustStock, Adjusted, CompleteSale, RESERVATION_TTL, ReleaseStock, Released, Reservation,
    ReservationEngine, ReserveStock, Restock, Restocked, SaleCompleted,
};
pub use selector::{
    DeliveryEstimate, SelectorConfig, WarehouseMatch, WarehouseSelector, WarehouseStock,
};
