//! Services that sit between the station core and an outer transport.
//!
//! - `api`: request/response payloads (serde)
//! - `station_service`: the facade an RPC layer calls
//! - `refresh`: background polling loop
//!
//! All services share one [`StationManager`](crate::station::StationManager)
//! through an `Arc`:
//!
//! ```ignore
//! use std::sync::Arc;
//! use rs_interlock::services::{spawn_refresh_loop, StationService};
//!
//! let station = Arc::new(StationManager::simulated(config.clone())?);
//! let _poller = spawn_refresh_loop(Arc::clone(&station), config.events.refresh_interval());
//! let service = StationService::new(station);
//! ```

pub mod api;
pub mod refresh;
pub mod station_service;

pub use api::*;
pub use refresh::*;
pub use station_service::*;
