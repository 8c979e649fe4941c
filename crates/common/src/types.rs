use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Declares a UUID-backed identifier newtype.
///
/// Each identifier gets its own type so a warehouse id can never be passed
/// where an order id is expected.
macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Creates an identifier from an existing UUID.
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the underlying UUID.
            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for a physical warehouse.
    WarehouseId
);
uuid_id!(
    /// Unique identifier for a customer account.
    UserId
);
uuid_id!(
    /// Unique identifier for a shopping cart.
    CartId
);
uuid_id!(
    /// Unique identifier for an order.
    ///
    /// Generated by the checkout before the order row exists so reservations
    /// can carry it as their reference from the start.
    OrderId
);
uuid_id!(
    /// Unique identifier for a saved shipping address.
    AddressId
);

/// Catalog item identifier (SKU / ISBN).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    /// Creates a new item ID from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the item ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ItemId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ItemId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for ItemId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// What a reservation is held for.
///
/// Stored as text in the audit log (`order:<uuid>` / `cart:<uuid>`), which
/// is how reservation analytics pair a RESERVE with its RELEASE or SALE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum ReservationRef {
    Order(OrderId),
    Cart(CartId),
}

impl std::fmt::Display for ReservationRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReservationRef::Order(id) => write!(f, "order:{id}"),
            ReservationRef::Cart(id) => write!(f, "cart:{id}"),
        }
    }
}

/// Error returned when a reservation reference string is malformed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseReferenceError(pub String);

impl std::fmt::Display for ParseReferenceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid reservation reference: {}", self.0)
    }
}

impl std::error::Error for ParseReferenceError {}

impl FromStr for ReservationRef {
    type Err = ParseReferenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, id) = s
            .split_once(':')
            .ok_or_else(|| ParseReferenceError(s.to_string()))?;
        let uuid = Uuid::parse_str(id).map_err(|_| ParseReferenceError(s.to_string()))?;
        match kind {
            "order" => Ok(ReservationRef::Order(OrderId::from_uuid(uuid))),
            "cart" => Ok(ReservationRef::Cart(CartId::from_uuid(uuid))),
            _ => Err(ParseReferenceError(s.to_string())),
        }
    }
}

impl From<ReservationRef> for String {
    fn from(reference: ReservationRef) -> Self {
        reference.to_string()
    }
}

impl TryFrom<String> for ReservationRef {
    type Error = ParseReferenceError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
