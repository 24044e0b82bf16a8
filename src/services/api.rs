//! Request and response payloads for the station facade.

use serde::{Deserialize, Serialize};

use crate::devices::{DeviceClass, DeviceState};
use crate::error::{ErrorKind, InterlockError, Violation};
use crate::events::StateChangedEvent;
use crate::route::{Route, RouteState};

// ============================================================================
// Request Types
// ============================================================================

/// Set the route entered by a button sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateRouteRequest {
    /// Button ids, in the order they were pressed
    pub buttons: Vec<String>,
}

impl CreateRouteRequest {
    /// Request for a button sequence.
    pub fn new<S: Into<String>>(buttons: impl IntoIterator<Item = S>) -> Self {
        Self {
            buttons: buttons.into_iter().map(Into::into).collect(),
        }
    }
}

/// Cancel a route by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelRouteRequest {
    /// Route id
    pub route: String,
}

impl CancelRouteRequest {
    /// Request for a route id.
    pub fn new(route: impl Into<String>) -> Self {
        Self { route: route.into() }
    }
}

// ============================================================================
// Response Types
// ============================================================================

/// API response wrapper for consistent JSON structure
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse<T> {
    /// Whether the request was successful
    pub success: bool,
    /// Response data (present when success=true)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// Error details (present when success=false)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorResponse>,
}

impl<T> ApiResponse<T> {
    /// Create a successful response with data
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// Create an error response
    pub fn err(error: ErrorResponse) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
        }
    }

    /// Wrap a route operation result
    pub fn from_result(result: Result<T, InterlockError>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(err) => Self::err(ErrorResponse::from(&err)),
        }
    }
}

impl<T: Serialize> ApiResponse<T> {
    /// Serialize to a JSON string
    pub fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|e| format!(r#"{{"success":false,"error":{{"kind":"parse","message":"{}"}}}}"#, e))
    }
}

/// Structured error: classification, human-readable message and every violation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorResponse {
    /// Classification for status mapping
    pub kind: ErrorKind,
    /// Human-readable summary
    pub message: String,
    /// Every violated rule (empty for lookup and parse errors)
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<Violation>,
}

impl From<&InterlockError> for ErrorResponse {
    fn from(err: &InterlockError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
            violations: err
                .violations()
                .map(|v| v.iter().cloned().collect())
                .unwrap_or_default(),
        }
    }
}

/// Result of a successful create/cancel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteResponse {
    /// Route id
    pub route: String,
}

/// One entry of the refresh stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefreshUpdate {
    /// Device class
    pub class: DeviceClass,
    /// Device id
    pub id: String,
    /// New state
    pub state: DeviceState,
}

impl From<StateChangedEvent> for RefreshUpdate {
    fn from(event: StateChangedEvent) -> Self {
        Self {
            class: event.class,
            id: event.id,
            state: event.new,
        }
    }
}

/// Route details for lookups
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteInfo {
    /// Route id
    pub id: String,
    /// Entry buttons
    pub buttons: Vec<String>,
    /// Section ids
    pub sections: Vec<String>,
    /// Turnout tokens
    pub turnouts: Vec<String>,
    /// Signal tokens
    pub signals: Vec<String>,
    /// Enemy route ids
    pub enemies: Vec<String>,
    /// Conflict route ids
    pub conflicts: Vec<String>,
    /// Lifecycle state at the time of the lookup
    pub state: RouteState,
}

impl From<&Route> for RouteInfo {
    fn from(route: &Route) -> Self {
        Self {
            id: route.id.clone(),
            buttons: route.buttons.clone(),
            sections: route.sections.clone(),
            turnouts: route.turnouts.clone(),
            signals: route.signals.clone(),
            enemies: route.enemies.clone(),
            conflicts: route.conflicts.clone(),
            state: route.state(),
        }
    }
}
