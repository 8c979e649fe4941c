use chrono::{DateTime, Utc};
use common::Coordinates;
use serde::{Deserialize, Serialize};

use crate::WarehouseId;

/// A physical fulfillment location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Warehouse {
    pub id: WarehouseId,
    pub name: String,

    /// Unknown coordinates rank the warehouse after every located one.
    pub coordinates: Option<Coordinates>,

    /// Inactive warehouses are soft-deleted and never selected.
    pub is_active: bool,

    /// Optimistic lock for administrative edits.
    pub version: i64,

    pub created_at: DateTime<Utc>,
}

/// Input for registering a warehouse.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewWarehouse {
    pub name: String,
    pub coordinates: Option<Coordinates>,
}

impl NewWarehouse {
    pub fn new(name: impl Into<String>, coordinates: Option<Coordinates>) -> Self {
        Self {
            name: name.into(),
            coordinates,
        }
    }

    /// Builds the stored warehouse with a fresh id.
    pub fn into_warehouse(self, now: DateTime<Utc>) -> Warehouse {
        Warehouse {
            id: WarehouseId::new(),
            name: self.name,
            coordinates: self.coordinates,
            is_active: true,
            version: 1,
            created_at: now,
        }
    }
}

/// Administrative edit of a warehouse, guarded by `expected_version`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarehouseUpdate {
    pub id: WarehouseId,
    pub expected_version: i64,
    pub name: Option<String>,
    pub coordinates: Option<Coordinates>,
}

impl WarehouseUpdate {
    pub fn new(id: WarehouseId, expected_version: i64) -> Self {
        Self {
            id,
            expected_version,
            name: None,
            coordinates: None,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn coordinates(mut self, coordinates: Coordinates) -> Self {
        self.coordinates = Some(coordinates);
        self
    }

    /// Applies the edit to `warehouse`, bumping its version.
    pub fn apply_to(&self, warehouse: &Warehouse) -> Warehouse {
        let mut next = warehouse.clone();
        if let Some(ref name) = self.name {
            next.name = name.clone();
        }
        if let Some(coordinates) = self.coordinates {
            next.coordinates = Some(coordinates);
        }
        next.version += 1;
        next
    }
}
