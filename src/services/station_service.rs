//! Station facade for an RPC layer.
//!
//! `StationService` wraps a shared [`StationManager`] and exposes the
//! operations an outer transport needs, with every result already shaped as
//! an [`ApiResponse`]. Authentication and request serialisation across
//! operators are the transport's concern.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use rs_interlock::services::{CreateRouteRequest, StationService};
//!
//! let service = StationService::new(Arc::new(station));
//!
//! let snapshot = service.init_station();
//! let req: CreateRouteRequest = serde_json::from_str(r#"{"buttons": ["XLA", "S3LA"]}"#)?;
//! let resp = service.create_route(req).await;
//! println!("{}", resp.to_json());
//!
//! let mut updates = service.refresh_station();
//! while let Some(update) = updates.next().await {
//!     // forward to the client
//! }
//! ```

use std::sync::Arc;

use crate::devices::DeviceClass;
use crate::events::EventStream;
use crate::station::{StationManager, StationSnapshot};
use crate::traits::StationController;

use super::api::{
    ApiResponse, CancelRouteRequest, CreateRouteRequest, RefreshUpdate, RouteInfo, RouteResponse,
};

// ============================================================================
// Refresh Stream
// ============================================================================

/// Stream of device updates for one observer.
#[derive(Debug)]
pub struct RefreshStream {
    events: EventStream,
}

impl RefreshStream {
    /// Wait for the next update. `None` once a newer stream replaced this one.
    pub async fn next(&mut self) -> Option<RefreshUpdate> {
        self.events.next().await.map(RefreshUpdate::from)
    }

    /// Every update queued right now.
    pub fn drain(&mut self) -> Vec<RefreshUpdate> {
        self.events
            .drain()
            .into_iter()
            .map(RefreshUpdate::from)
            .collect()
    }
}

// ============================================================================
// Station Service
// ============================================================================

/// Facade over a shared station.
pub struct StationService<C> {
    station: Arc<StationManager<C>>,
}

impl<C> Clone for StationService<C> {
    fn clone(&self) -> Self {
        Self {
            station: Arc::clone(&self.station),
        }
    }
}

impl<C: StationController + 'static> StationService<C> {
    /// Wrap a shared station.
    pub fn new(station: Arc<StationManager<C>>) -> Self {
        Self { station }
    }

    /// The wrapped station.
    pub fn station(&self) -> &Arc<StationManager<C>> {
        &self.station
    }

    /// Full snapshot: every device and every alive route.
    pub fn init_station(&self) -> ApiResponse<StationSnapshot> {
        ApiResponse::ok(self.station.snapshot())
    }

    /// Open the update stream. Any previously opened stream ends.
    pub fn refresh_station(&self) -> RefreshStream {
        RefreshStream {
            events: self.station.subscribe(),
        }
    }

    /// Set the route entered by the request's button sequence.
    pub async fn create_route(&self, req: CreateRouteRequest) -> ApiResponse<RouteResponse> {
        let result = match self.station.route_by_buttons(req.buttons.as_slice()) {
            Ok(route) => self
                .station
                .create_route(&route.id)
                .await
                .map(|route| RouteResponse { route }),
            Err(err) => Err(err),
        };
        ApiResponse::from_result(result)
    }

    /// Cancel an alive route.
    pub async fn cancel_route(&self, req: CancelRouteRequest) -> ApiResponse<RouteResponse> {
        let result = self
            .station
            .cancel_route(&req.route)
            .await
            .map(|()| RouteResponse { route: req.route });
        ApiResponse::from_result(result)
    }

    /// Look a route up by its button sequence.
    pub fn route_by_buttons<S: AsRef<str>>(&self, buttons: &[S]) -> ApiResponse<RouteInfo> {
        ApiResponse::from_result(self.station.route_by_buttons(buttons).map(RouteInfo::from))
    }

    /// Look a route up by id.
    pub fn route_by_name(&self, route_id: &str) -> ApiResponse<RouteInfo> {
        ApiResponse::from_result(self.station.route_by_name(route_id).map(RouteInfo::from))
    }

    /// Clear a Broken device. `data` is `None` if it was not Broken.
    pub fn repair_device(&self, class: DeviceClass, id: &str) -> ApiResponse<Option<RefreshUpdate>> {
        ApiResponse::ok(self.station.repair_device(class, id).map(RefreshUpdate::from))
    }
}
