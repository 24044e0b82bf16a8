//! Station configuration.
//!
//! Every section has a sensible default, so a config file only needs the
//! values that differ. Files are JSON.
//!
//! # Example
//!
//! ```rust
//! use rs_interlock::config::{ActuationConfig, Config, SimulatorConfig};
//!
//! // Use defaults
//! let config = Config::default();
//! assert_eq!(config.actuation.deadline_ms, 5000);
//!
//! // Or customize
//! let config = Config::default()
//!     .with_actuation(ActuationConfig::default().with_deadline_ms(2000))
//!     .with_simulator(SimulatorConfig::instant());
//! assert_eq!(config.simulator.turnout_latency_ms, 0);
//! ```

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

// ============================================================================
// Main Config
// ============================================================================

/// Complete application configuration
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Station identity and data files
    pub station: StationConfig,
    /// Bounded actuation protocol timing
    pub actuation: ActuationConfig,
    /// Simulated controller latencies
    pub simulator: SimulatorConfig,
    /// Event distribution
    pub events: EventConfig,
}

impl Config {
    /// Parse a JSON config document. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> anyhow::Result<Self> {
        serde_json::from_str(json).context("parsing configuration")
    }

    /// Load a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading configuration {}", path.display()))?;
        Self::from_json_str(&text)
    }

    /// Set station configuration
    pub fn with_station(mut self, station: StationConfig) -> Self {
        self.station = station;
        self
    }

    /// Set actuation configuration
    pub fn with_actuation(mut self, actuation: ActuationConfig) -> Self {
        self.actuation = actuation;
        self
    }

    /// Set simulator configuration
    pub fn with_simulator(mut self, simulator: SimulatorConfig) -> Self {
        self.simulator = simulator;
        self
    }

    /// Set event configuration
    pub fn with_events(mut self, events: EventConfig) -> Self {
        self.events = events;
        self
    }
}

// ============================================================================
// Station Config
// ============================================================================

/// Station identity and the documents loaded at startup
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StationConfig {
    /// Human-readable station name
    pub name: String,
    /// Interlock table (route id -> route definition)
    pub interlock_path: String,
    /// IO document (device class -> id -> initial state)
    pub io_path: String,
    /// Log level used when `RUST_LOG` is not set
    pub log_level: String,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            name: "station".into(),
            interlock_path: "./resources/interlock.json".into(),
            io_path: "./resources/io.json".into(),
            log_level: "info".into(),
        }
    }
}

impl StationConfig {
    /// Set the station name
    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.into();
        self
    }

    /// Set the interlock table path
    pub fn with_interlock_path(mut self, path: &str) -> Self {
        self.interlock_path = path.into();
        self
    }

    /// Set the IO document path
    pub fn with_io_path(mut self, path: &str) -> Self {
        self.io_path = path.into();
        self
    }

    /// Set the fallback log level
    pub fn with_log_level(mut self, level: &str) -> Self {
        self.log_level = level.into();
        self
    }
}

// ============================================================================
// Actuation Config
// ============================================================================

/// Timing of the bounded actuation protocol
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActuationConfig {
    /// Deadline for every commanded device to converge
    pub deadline_ms: u64,
    /// Pause between read-backs while polling
    pub poll_interval_ms: u64,
}

impl Default for ActuationConfig {
    fn default() -> Self {
        Self {
            deadline_ms: 5000,
            poll_interval_ms: 20,
        }
    }
}

impl ActuationConfig {
    /// Set the convergence deadline
    pub fn with_deadline_ms(mut self, ms: u64) -> Self {
        self.deadline_ms = ms;
        self
    }

    /// Set the poll interval
    pub fn with_poll_interval_ms(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    /// Deadline as a `Duration`
    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }

    /// Poll interval as a `Duration`, never zero
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

// ============================================================================
// Simulator Config
// ============================================================================

/// Artificial actuation latency of the simulated controller
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Time a turnout takes to throw
    pub turnout_latency_ms: u64,
    /// Time a signal takes to change aspect
    pub signal_latency_ms: u64,
    /// Time a section takes to change state
    pub section_latency_ms: u64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            turnout_latency_ms: 3000,
            signal_latency_ms: 2000,
            section_latency_ms: 0,
        }
    }
}

impl SimulatorConfig {
    /// All latencies zero
    pub fn instant() -> Self {
        Self {
            turnout_latency_ms: 0,
            signal_latency_ms: 0,
            section_latency_ms: 0,
        }
    }

    /// Set the turnout throw time
    pub fn with_turnout_latency_ms(mut self, ms: u64) -> Self {
        self.turnout_latency_ms = ms;
        self
    }

    /// Set the signal change time
    pub fn with_signal_latency_ms(mut self, ms: u64) -> Self {
        self.signal_latency_ms = ms;
        self
    }

    /// Set the section change time
    pub fn with_section_latency_ms(mut self, ms: u64) -> Self {
        self.section_latency_ms = ms;
        self
    }
}

// ============================================================================
// Event Config
// ============================================================================

/// State-change event distribution
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventConfig {
    /// Channel capacity; `None` sizes it to the total device count
    pub capacity: Option<usize>,
    /// Interval of the background refresh pass
    pub refresh_interval_ms: u64,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            capacity: None,
            refresh_interval_ms: 1000,
        }
    }
}

impl EventConfig {
    /// Set a fixed channel capacity
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// Set the refresh interval
    pub fn with_refresh_interval_ms(mut self, ms: u64) -> Self {
        self.refresh_interval_ms = ms;
        self
    }

    /// Refresh interval as a `Duration`, never zero
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms.max(1))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.actuation.deadline_ms, 5000);
        assert_eq!(config.simulator.turnout_latency_ms, 3000);
        assert_eq!(config.simulator.signal_latency_ms, 2000);
        assert_eq!(config.events.capacity, None);
    }

    #[test]
    fn builder_pattern() {
        let config = Config::default()
            .with_station(StationConfig::default().with_name("Xinzhu"))
            .with_actuation(
                ActuationConfig::default()
                    .with_deadline_ms(300)
                    .with_poll_interval_ms(5),
            )
            .with_events(EventConfig::default().with_capacity(4));

        assert_eq!(config.station.name, "Xinzhu");
        assert_eq!(config.actuation.deadline(), Duration::from_millis(300));
        assert_eq!(config.actuation.poll_interval(), Duration::from_millis(5));
        assert_eq!(config.events.capacity, Some(4));
    }

    #[test]
    fn partial_json_uses_defaults() {
        let config = Config::from_json_str(
            r#"{"station": {"name": "Test"}, "actuation": {"deadline_ms": 100}}"#,
        )
        .unwrap();
        assert_eq!(config.station.name, "Test");
        assert_eq!(config.station.log_level, "info");
        assert_eq!(config.actuation.deadline_ms, 100);
        assert_eq!(config.actuation.poll_interval_ms, 20);
        assert_eq!(config.simulator, SimulatorConfig::default());
    }

    #[test]
    fn malformed_json_is_error() {
        assert!(Config::from_json_str("{ not json").is_err());
    }

    #[test]
    fn zero_intervals_clamped() {
        let a = ActuationConfig::default().with_poll_interval_ms(0);
        assert_eq!(a.poll_interval(), Duration::from_millis(1));
        let e = EventConfig::default().with_refresh_interval_ms(0);
        assert_eq!(e.refresh_interval(), Duration::from_millis(1));
    }

    #[test]
    fn instant_simulator() {
        let sim = SimulatorConfig::instant().with_signal_latency_ms(7);
        assert_eq!(sim.turnout_latency_ms, 0);
        assert_eq!(sim.signal_latency_ms, 7);
    }

    #[test]
    fn missing_file_is_error() {
        assert!(Config::load("/nonexistent/config.json").is_err());
    }
}
