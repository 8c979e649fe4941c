use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::record::{MutationContext, StockRecord};
use crate::{ItemId, WarehouseId};

/// Kind of stock mutation recorded in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    Restock,
    Reserve,
    Release,
    Sale,
    Adjustment,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Restock => "RESTOCK",
            AuditAction::Reserve => "RESERVE",
            AuditAction::Release => "RELEASE",
            AuditAction::Sale => "SALE",
            AuditAction::Adjustment => "ADJUSTMENT",
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RESTOCK" => Ok(AuditAction::Restock),
            "RESERVE" => Ok(AuditAction::Reserve),
            "RELEASE" => Ok(AuditAction::Release),
            "SALE" => Ok(AuditAction::Sale),
            "ADJUSTMENT" => Ok(AuditAction::Adjustment),
            other => Err(format!("unknown audit action: {other}")),
        }
    }
}

/// Append-only record of one committed stock mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub warehouse_id: WarehouseId,
    pub item_id: ItemId,
    pub action: AuditAction,
    pub quantity_before: i64,
    pub quantity_after: i64,
    pub reserved_before: i64,
    pub reserved_after: i64,

    /// Order or cart the mutation was made for, in `ReservationRef` text form.
    pub reference: Option<String>,
    pub reason: Option<String>,
    pub actor: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl AuditEntry {
    /// Builds the entry describing the transition `before -> after`.
    pub fn for_transition(
        before: &StockRecord,
        after: &StockRecord,
        action: AuditAction,
        context: &MutationContext,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            warehouse_id: after.warehouse_id,
            item_id: after.item_id.clone(),
            action,
            quantity_before: before.quantity,
            quantity_after: after.quantity,
            reserved_before: before.reserved,
            reserved_after: after.reserved,
            reference: context.reference.clone(),
            reason: context.reason.clone(),
            actor: context.actor.clone(),
            recorded_at,
        }
    }

    /// Units moved into or out of `reserved` by this entry.
    pub fn reserved_delta(&self) -> i64 {
        self.reserved_after - self.reserved_before
    }

    /// Units moved into or out of `quantity` by this entry.
    pub fn quantity_delta(&self) -> i64 {
        self.quantity_after - self.quantity_before
    }
}

/// Filter for reading the audit log.
#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    pub warehouse_id: Option<WarehouseId>,
    pub item_id: Option<ItemId>,
    pub reference: Option<String>,

    /// Any of these actions.
    pub actions: Option<Vec<AuditAction>>,

    /// Inclusive lower bound on `recorded_at`.
    pub from_timestamp: Option<DateTime<Utc>>,

    /// Inclusive upper bound on `recorded_at`.
    pub to_timestamp: Option<DateTime<Utc>>,

    pub limit: Option<usize>,
}

impl AuditQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries recorded for one order or cart.
    pub fn for_reference(reference: impl ToString) -> Self {
        Self {
            reference: Some(reference.to_string()),
            ..Default::default()
        }
    }

    pub fn warehouse_id(mut self, warehouse_id: WarehouseId) -> Self {
        self.warehouse_id = Some(warehouse_id);
        self
    }

    pub fn item_id(mut self, item_id: impl Into<ItemId>) -> Self {
        self.item_id = Some(item_id.into());
        self
    }

    pub fn action(mut self, action: AuditAction) -> Self {
        self.actions = Some(vec![action]);
        self
    }

    pub fn actions(mut self, actions: Vec<AuditAction>) -> Self {
        self.actions = Some(actions);
        self
    }

    pub fn from_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.from_timestamp = Some(timestamp);
        self
    }

    pub fn to_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.to_timestamp = Some(timestamp);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Returns true if `entry` passes every filter except `limit`.
    pub fn matches(&self, entry: &AuditEntry) -> bool {
        if let Some(id) = self.warehouse_id
            && entry.warehouse_id != id
        {
            return false;
        }
        if let Some(ref item) = self.item_id
            && &entry.item_id != item
        {
            return false;
        }
        if let Some(ref reference) = self.reference
            && entry.reference.as_ref() != Some(reference)
        {
            return false;
        }
        if let Some(ref actions) = self.actions
            && !actions.contains(&entry.action)
        {
            return false;
        }
        if let Some(from) = self.from_timestamp
            && entry.recorded_at < from
        {
            return false;
        }
        if let Some(to) = self.to_timestamp
            && entry.recorded_at > to
        {
            return false;
        }
        true
    }
}
