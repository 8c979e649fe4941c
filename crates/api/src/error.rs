//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use checkout::CheckoutError;
use inventory::InventoryError;
use serde_json::{Value, json};
use task_queue::TaskQueueError;

/// API-level error type that maps to HTTP responses.
///
/// Every response body is `{ "error", "code", "details" }`.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Reservation engine, selector or aggregator error.
    Inventory(InventoryError),
    /// Checkout or promotion error.
    Checkout(CheckoutError),
    /// Task queue error.
    Queue(TaskQueueError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, details) = match &self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND", Value::Null),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", Value::Null),
            ApiError::Inventory(err) => inventory_error_parts(err),
            ApiError::Checkout(err) => checkout_error_parts(err),
            ApiError::Queue(TaskQueueError::NotFound(_)) => {
                (StatusCode::NOT_FOUND, "NOT_FOUND", Value::Null)
            }
            ApiError::Queue(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "STORAGE_ERROR",
                Value::Null,
            ),
        };

        let message = self.to_string();
        if status.is_server_error() {
            tracing::error!(error = %message, code, "internal server error");
        }

        let body = json!({ "error": message, "code": code, "details": details });
        (status, axum::Json(body)).into_response()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::NotFound(msg) | ApiError::BadRequest(msg) => f.write_str(msg),
            ApiError::Inventory(err) => write!(f, "{err}"),
            ApiError::Checkout(err) => write!(f, "{err}"),
            ApiError::Queue(err) => write!(f, "{err}"),
        }
    }
}

fn inventory_error_parts(err: &InventoryError) -> (StatusCode, &'static str, Value) {
    let status = match err {
        InventoryError::NotFound(_) => StatusCode::NOT_FOUND,
        InventoryError::InsufficientStock { .. }
        | InventoryError::InvalidReleaseQuantity { .. }
        | InventoryError::InsufficientReserved { .. }
        | InventoryError::OptimisticLockConflict { .. } => StatusCode::CONFLICT,
        InventoryError::Validation(_) | InventoryError::NoWarehouseFulfillable { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        InventoryError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let details = match err {
        InventoryError::InsufficientStock {
            requested,
            available,
        } => json!({ "requested": requested, "available": available }),
        InventoryError::InvalidReleaseQuantity {
            requested,
            reserved,
        }
        | InventoryError::InsufficientReserved {
            requested,
            reserved,
        } => json!({ "requested": requested, "reserved": reserved }),
        InventoryError::OptimisticLockConflict { expected, actual } => {
            json!({ "expected_version": expected, "actual_version": actual })
        }
        InventoryError::NoWarehouseFulfillable { item_id, requested } => {
            json!({ "item_id": item_id, "requested": requested })
        }
        _ => Value::Null,
    };
    (status, err.code(), details)
}

fn checkout_error_parts(err: &CheckoutError) -> (StatusCode, &'static str, Value) {
    match err {
        CheckoutError::PhaseFailed(failure) => {
            let details = serde_json::to_value(failure.as_ref()).unwrap_or(Value::Null);
            if failure.is_outage() {
                (StatusCode::SERVICE_UNAVAILABLE, "COLLABORATOR_UNAVAILABLE", details)
            } else {
                (StatusCode::UNPROCESSABLE_ENTITY, "CHECKOUT_FAILED", details)
            }
        }
        CheckoutError::PromoRejected(reason) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            "PROMO_REJECTED",
            serde_json::to_value(reason).unwrap_or(Value::Null),
        ),
        CheckoutError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND", Value::Null),
        CheckoutError::Collaborator { collaborator, .. } => (
            StatusCode::SERVICE_UNAVAILABLE,
            "COLLABORATOR_UNAVAILABLE",
            json!({ "collaborator": collaborator }),
        ),
    }
}

impl From<InventoryError> for ApiError {
    fn from(err: InventoryError) -> Self {
        ApiError::Inventory(err)
    }
}

impl From<CheckoutError> for ApiError {
    fn from(err: CheckoutError) -> Self {
        ApiError::Checkout(err)
    }
}

impl From<TaskQueueError> for ApiError {
    fn from(err: TaskQueueError) -> Self {
        ApiError::Queue(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use checkout::{CheckoutFailure, CheckoutIssue, CheckoutPhase, IssueCode};

    #[test]
    fn stock_conflicts_map_to_409() {
        let (status, code, details) = inventory_error_parts(&InventoryError::InsufficientStock {
            requested: 5,
            available: 2,
        });
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(code, "INSUFFICIENT_STOCK");
        assert_eq!(details["available"], 2);

        let (status, ..) = inventory_error_parts(&InventoryError::OptimisticLockConflict {
            expected: 1,
            actual: 2,
        });
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[test]
    fn validation_maps_to_422() {
        let (status, code, _) =
            inventory_error_parts(&InventoryError::Validation("quantity".to_string()));
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(code, "VALIDATION_ERROR");
    }

    #[test]
    fn collaborator_outage_maps_to_503() {
        let (status, _, details) = checkout_error_parts(&CheckoutError::Collaborator {
            collaborator: "orders",
            message: "timeout".to_string(),
        });
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(details["collaborator"], "orders");
    }

    #[test]
    fn phase_failed_by_outage_maps_to_503_with_phase_log() {
        let failure = CheckoutFailure {
            phase: CheckoutPhase::AddressValidation,
            issues: vec![CheckoutIssue::error(
                IssueCode::CollaboratorUnavailable,
                "addresses unavailable",
            )],
            stock: Vec::new(),
            phases: Vec::new(),
        };
        let (status, code, details) =
            checkout_error_parts(&CheckoutError::PhaseFailed(Box::new(failure)));
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(code, "COLLABORATOR_UNAVAILABLE");
        assert_eq!(details["phase"], "ADDRESS_VALIDATION");
        assert_eq!(details["issues"][0]["code"], "COLLABORATOR_UNAVAILABLE");
    }
}
