use common::ItemId;
use serde::{Deserialize, Serialize};

/// Machine-readable reason attached to every checkout issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueCode {
    CartNotFound,
    CartCheckedOut,
    CartExpired,
    CartNotOwned,
    CartEmpty,
    InvalidQuantity,
    ItemNotFound,
    ItemInactive,
    ItemUnpriced,
    OutOfStock,
    PriceChanged,
    AddressNotFound,
    MissingCoordinates,
    PromoInvalid,
    Unfulfillable,
    ReservationFailed,
    OrderCreationFailed,
    AutoReleaseNotScheduled,

    /// A collaborator or the stock ledger could not be reached.
    CollaboratorUnavailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Fails the phase.
    Error,
    /// Returned alongside a successful result.
    Warning,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutIssue {
    pub code: IssueCode,
    pub severity: Severity,
    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_id: Option<ItemId>,
}

impl CheckoutIssue {
    pub fn error(code: IssueCode, message: impl Into<String>) -> Self {
        Self {
            code,
            severity: Severity::Error,
            message: message.into(),
            item_id: None,
        }
    }

    pub fn warning(code: IssueCode, message: impl Into<String>) -> Self {
        Self {
            code,
            severity: Severity::Warning,
            message: message.into(),
            item_id: None,
        }
    }

    pub fn for_item(mut self, item_id: ItemId) -> Self {
        self.item_id = Some(item_id);
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}
