//! Route handlers, one module per resource.

pub mod audit;
pub mod availability;
pub mod checkout;
pub mod health;
pub mod metrics;
pub mod promotions;
pub mod stock;
pub mod tasks;
pub mod warehouses;

use std::str::FromStr;

use common::Coordinates;

use crate::error::ApiError;

/// Parses a path or query identifier, naming it in the error.
pub(crate) fn parse_id<T: FromStr>(raw: &str, what: &str) -> Result<T, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid {what}: {raw}")))
}

/// Re-checks coordinates that arrived as plain JSON numbers.
pub(crate) fn checked_coordinates(
    coordinates: Option<Coordinates>,
) -> Result<Option<Coordinates>, ApiError> {
    coordinates
        .map(|c| {
            Coordinates::new(c.latitude, c.longitude).ok_or_else(|| {
                ApiError::BadRequest(format!(
                    "Coordinates out of range: {}, {}",
                    c.latitude, c.longitude
                ))
            })
        })
        .transpose()
}
