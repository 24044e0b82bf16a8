//! Trait definitions for device access.
//!
//! The interlocking core never talks to hardware directly. It goes through
//! [`StationController`], which has two implementations in this crate's
//! ecosystem:
//!
//! - [`SimulatedController`](crate::hal::SimulatedController): in-memory
//!   devices with artificial actuation latency, for desktop use and tests
//! - your own IO-board driver
//!
//! # Submodules
//!
//! - `controller`: the device capability trait and [`IoInfo`]

pub mod controller;

pub use controller::*;
