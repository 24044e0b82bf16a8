//! Controller implementations.
//!
//! This module contains concrete implementations of
//! [`StationController`](crate::traits::StationController).
//!
//! # Available Implementations
//!
//! - `simulated`: in-memory station with actuation latency and fault injection

pub mod simulated;

pub use simulated::*;
