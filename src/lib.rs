//! # rs-interlock
//!
//! The control core of a railway interlocking simulator: it tracks the live
//! state of track sections, turnouts and signals, and grants or revokes routes
//! through a station without ever admitting two incompatible ones.
//!
//! ## Features
//!
//! - **Route admission**: enemies, conflicts and section occupancy are all
//!   checked and every violation is reported in one response
//! - **Bounded actuation**: devices are commanded concurrently and polled
//!   against a deadline; a device that never converges is marked Broken
//! - **Exclusive routes**: a per-route Idle/Pending/Alive gate with
//!   compare-and-set transitions
//! - **State-change events**: best-effort, non-blocking, with full snapshots
//!   for re-synchronisation
//!
//! ## Architecture
//!
//! - `devices` - Device classes, states and commands
//! - `traits` - The device controller capability
//! - `hal` - Simulated controller with actuation latency and fault injection
//! - `parsing` - Turnout and signal token grammars
//! - `route` - Routes, their gates and the interlock table
//! - `actuation` - Dispatch, poll, time out
//! - `station` - The orchestrator that ties everything together
//! - `services` - Facade and background loop for an outer transport
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use rs_interlock::{
//!     Config, InterlockTable, SimulatedController, SimulatorConfig, StationManager,
//!     devices::{SectionState, TurnoutState},
//! };
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let sim = SimulatedController::new(SimulatorConfig::instant())
//!     .with_section("1G", SectionState::Free)
//!     .with_turnout("1", TurnoutState::Normal);
//! let table = InterlockTable::from_json_str(
//!     r#"{"X-1G": {"buttons": ["XLA", "S1LA"], "sections": ["1G"], "turnouts": ["(1)"]}}"#,
//! ).unwrap();
//!
//! let station = StationManager::new(Arc::new(sim), table, Config::default());
//! station.create_route("X-1G").await.unwrap();
//! assert_eq!(station.turnout_state("1"), Some(TurnoutState::Reversed));
//!
//! station.cancel_route("X-1G").await.unwrap();
//! assert_eq!(station.section_state("1G"), Some(SectionState::Free));
//! # }
//! ```

#![warn(missing_docs)]

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Bounded dispatch-and-poll protocol for commanding devices.
pub mod actuation;
/// Station configuration.
pub mod config;
/// Device classes, states and commands.
pub mod devices;
/// Violation reports and error types.
pub mod error;
/// State-change events and the best-effort event channel.
pub mod events;
/// Controller implementations (simulated).
pub mod hal;
/// Turnout, signal and section token grammars.
pub mod parsing;
/// Routes, route gates and the interlock table.
pub mod route;
/// Facade, API payloads and background loops.
pub mod services;
/// The interlocking orchestrator.
pub mod station;
/// Device controller capability.
pub mod traits;

// Re-exports for convenience
pub use actuation::{Actuation, ActuationPhase, PendingDevice};
pub use config::{ActuationConfig, Config, EventConfig, SimulatorConfig, StationConfig};
pub use devices::{
    DeviceClass, DeviceCommand, DeviceState, SectionCommand, SectionState, SignalCommand,
    SignalState, TurnoutCommand, TurnoutState,
};
pub use error::{ErrorKind, InterlockError, ParseError, Violation, Violations};
pub use events::{EventChannel, EventStream, StateChangedEvent};
pub use hal::{IoDocument, SimulatedController};
pub use route::{InterlockTable, Route, RouteGate, RouteState};
pub use station::{StationManager, StationSnapshot};
pub use traits::{IoInfo, StationController};

/// Lock a mutex, recovering the data if a holder panicked.
pub(crate) fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
