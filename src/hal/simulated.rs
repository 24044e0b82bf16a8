//! Simulated station controller for desktop use and tests.
//!
//! [`SimulatedController`] keeps every device in memory, one map per device
//! class, each behind its own lock. Writes sleep for a configurable latency
//! before committing, modelling a slow point machine or signal lamp relay.
//!
//! # Fault injection
//!
//! | Method | Effect |
//! |--------|--------|
//! | [`stick`](SimulatedController::stick) | Writes to a device are attempted but never take effect |
//! | [`set_section`](SimulatedController::set_section) & co. | Change physical state directly (train occupancy, hand-thrown points) |
//! | [`writes`](SimulatedController::writes) | Every attempted write, in order |
//!
//! # Example
//!
//! ```rust
//! use rs_interlock::config::SimulatorConfig;
//! use rs_interlock::devices::{TurnoutCommand, TurnoutState};
//! use rs_interlock::hal::SimulatedController;
//! use rs_interlock::traits::StationController;
//!
//! let sim = SimulatedController::new(SimulatorConfig::instant())
//!     .with_turnout("5", TurnoutState::Normal);
//!
//! sim.update_turnout_status(&TurnoutCommand::new("5", TurnoutState::Reversed));
//! assert_eq!(sim.turnout_status("5"), TurnoutState::Reversed);
//! ```

use std::collections::{BTreeMap, HashMap, HashSet};
use std::hash::Hash;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::config::SimulatorConfig;
use crate::devices::{
    DeviceClass, DeviceState, SectionCommand, SectionState, SignalCommand, SignalState,
    TurnoutCommand, TurnoutState,
};
use crate::lock_unpoisoned;
use crate::traits::{IoInfo, StationController};

// ============================================================================
// IO Document
// ============================================================================

/// The persisted device table: class -> id -> initial state string.
///
/// ```json
/// {
///   "sections": { "1G": "FREE", "3DG": "OCCUPIED" },
///   "turnouts": { "1": "NORMAL" },
///   "signals":  { "X": "H", "D1": "A" }
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IoDocument {
    /// Section id -> state string.
    pub sections: BTreeMap<String, String>,
    /// Turnout id -> state string.
    pub turnouts: BTreeMap<String, String>,
    /// Signal id -> state string or aspect code.
    pub signals: BTreeMap<String, String>,
}

impl IoDocument {
    /// Parse an IO document from JSON.
    pub fn from_json_str(json: &str) -> anyhow::Result<Self> {
        serde_json::from_str(json).context("parsing IO document")
    }

    /// Load an IO document from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading IO document {}", path.display()))?;
        Self::from_json_str(&text)
    }
}

// ============================================================================
// Write Log
// ============================================================================

/// One attempted write, as recorded by the simulator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WriteRecord {
    /// Device id.
    pub id: String,
    /// Commanded state (carries the device class).
    pub state: DeviceState,
}

impl WriteRecord {
    /// Class of the written device.
    pub fn class(&self) -> DeviceClass {
        self.state.class()
    }
}

// ============================================================================
// Simulated Controller
// ============================================================================

/// In-memory station with per-class locks and artificial actuation latency.
#[derive(Debug)]
pub struct SimulatedController {
    sections: Mutex<HashMap<String, SectionState>>,
    turnouts: Mutex<HashMap<String, TurnoutState>>,
    signals: Mutex<HashMap<String, SignalState>>,
    latency: SimulatorConfig,
    stuck: Mutex<HashSet<(DeviceClass, String)>>,
    writes: Mutex<Vec<WriteRecord>>,
}

impl SimulatedController {
    /// Create an empty station with the given latencies.
    pub fn new(latency: SimulatorConfig) -> Self {
        Self {
            sections: Mutex::new(HashMap::new()),
            turnouts: Mutex::new(HashMap::new()),
            signals: Mutex::new(HashMap::new()),
            latency,
            stuck: Mutex::new(HashSet::new()),
            writes: Mutex::new(Vec::new()),
        }
    }

    /// Build a station from a parsed IO document.
    pub fn from_io_document(doc: &IoDocument, latency: SimulatorConfig) -> Self {
        let sim = Self::new(latency);
        {
            let mut sections = lock_unpoisoned(&sim.sections);
            for (id, s) in &doc.sections {
                sections.insert(id.clone(), SectionState::from_text(s));
            }
            let mut turnouts = lock_unpoisoned(&sim.turnouts);
            for (id, s) in &doc.turnouts {
                turnouts.insert(id.clone(), TurnoutState::from_text(s));
            }
            let mut signals = lock_unpoisoned(&sim.signals);
            for (id, s) in &doc.signals {
                signals.insert(id.clone(), SignalState::from_text(s));
            }
        }
        sim
    }

    /// Load a station from an IO document file.
    pub fn from_path(path: impl AsRef<Path>, latency: SimulatorConfig) -> anyhow::Result<Self> {
        let doc = IoDocument::load(path)?;
        let sim = Self::from_io_document(&doc, latency);
        tracing::info!(
            sections = doc.sections.len(),
            turnouts = doc.turnouts.len(),
            signals = doc.signals.len(),
            "IO document loaded"
        );
        Ok(sim)
    }

    /// Add a section.
    pub fn with_section(self, id: &str, state: SectionState) -> Self {
        self.set_section(id, state);
        self
    }

    /// Add a turnout.
    pub fn with_turnout(self, id: &str, state: TurnoutState) -> Self {
        self.set_turnout(id, state);
        self
    }

    /// Add a signal.
    pub fn with_signal(self, id: &str, state: SignalState) -> Self {
        self.set_signal(id, state);
        self
    }

    /// Force a section's physical state, bypassing latency and the write log.
    pub fn set_section(&self, id: &str, state: SectionState) {
        lock_unpoisoned(&self.sections).insert(id.to_string(), state);
    }

    /// Force a turnout's physical position, bypassing latency and the write log.
    pub fn set_turnout(&self, id: &str, state: TurnoutState) {
        lock_unpoisoned(&self.turnouts).insert(id.to_string(), state);
    }

    /// Force a signal's aspect, bypassing latency and the write log.
    pub fn set_signal(&self, id: &str, state: SignalState) {
        lock_unpoisoned(&self.signals).insert(id.to_string(), state);
    }

    /// Make writes to a device ineffective: the attempt is made and logged,
    /// the state never changes.
    pub fn stick(&self, class: DeviceClass, id: &str) {
        lock_unpoisoned(&self.stuck).insert((class, id.to_string()));
    }

    /// Undo [`stick`](Self::stick).
    pub fn unstick(&self, class: DeviceClass, id: &str) {
        lock_unpoisoned(&self.stuck).remove(&(class, id.to_string()));
    }

    /// Every write attempted so far, in order of arrival.
    pub fn writes(&self) -> Vec<WriteRecord> {
        lock_unpoisoned(&self.writes).clone()
    }

    fn is_stuck(&self, class: DeviceClass, id: &str) -> bool {
        lock_unpoisoned(&self.stuck).contains(&(class, id.to_string()))
    }

    /// Log, wait out the latency, then commit unless stuck or unknown.
    fn write<S>(&self, map: &Mutex<HashMap<String, S>>, id: &str, state: S, latency_ms: u64)
    where
        S: Copy + Into<DeviceState>,
    {
        let device: DeviceState = state.into();
        let class = device.class();
        lock_unpoisoned(&self.writes).push(WriteRecord {
            id: id.to_string(),
            state: device,
        });

        tracing::debug!(%class, id, state = %device, "actuating");
        if latency_ms > 0 {
            std::thread::sleep(Duration::from_millis(latency_ms));
        }

        if self.is_stuck(class, id) {
            tracing::debug!(%class, id, "actuator stuck, write has no effect");
            return;
        }

        let mut map = lock_unpoisoned(map);
        match map.get_mut(id) {
            Some(current) => {
                *current = state;
                tracing::debug!(%class, id, state = %device, "actuated");
            }
            None => tracing::warn!(%class, id, "write to unknown device ignored"),
        }
    }
}

fn read<S: Copy + Default>(map: &Mutex<HashMap<String, S>>, id: &str) -> S {
    lock_unpoisoned(map).get(id).copied().unwrap_or_default()
}

fn sorted_ids<K: Clone + Ord + Hash, V>(map: &Mutex<HashMap<K, V>>) -> Vec<K> {
    let mut ids: Vec<K> = lock_unpoisoned(map).keys().cloned().collect();
    ids.sort();
    ids
}

impl StationController for SimulatedController {
    fn io_info(&self) -> IoInfo {
        IoInfo {
            sections: sorted_ids(&self.sections),
            turnouts: sorted_ids(&self.turnouts),
            signals: sorted_ids(&self.signals),
        }
    }

    fn section_status(&self, id: &str) -> SectionState {
        read(&self.sections, id)
    }

    fn signal_status(&self, id: &str) -> SignalState {
        read(&self.signals, id)
    }

    fn turnout_status(&self, id: &str) -> TurnoutState {
        read(&self.turnouts, id)
    }

    fn update_section_status(&self, cmd: &SectionCommand) {
        self.write(&self.sections, &cmd.id, cmd.state, self.latency.section_latency_ms);
    }

    fn update_signal_status(&self, cmd: &SignalCommand) {
        self.write(&self.signals, &cmd.id, cmd.state, self.latency.signal_latency_ms);
    }

    fn update_turnout_status(&self, cmd: &TurnoutCommand) {
        self.write(&self.turnouts, &cmd.id, cmd.state, self.latency.turnout_latency_ms);
    }
}
