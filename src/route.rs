//! Routes, their exclusivity gate, and the interlock table.
//!
//! The interlock table is loaded once at startup and never changes shape:
//! routes are only toggled between idle and alive. Each [`Route`] carries its
//! own [`RouteGate`], a three-state atomic that admission and cancellation
//! move through with compare-and-set transitions:
//!
//! ```text
//!            try_acquire            commit
//!   Idle ─────────────────▶ Pending ───────▶ Alive
//!    ▲                       │  ▲              │
//!    │        abort          │  │  restore     │ try_release
//!    └───────────────────────┘  └──────────────┤
//!    ▲                                         ▼
//!    └──────────── finish_release ──────── Pending
//! ```
//!
//! Two concurrent operations on the same route cannot both win the CAS; the
//! loser sees the gate's actual state and reports it. All gate accesses are
//! sequentially consistent: two mutually hostile routes admitted at the same
//! moment each observe the other as pending and both back off.
//!
//! # Table format
//!
//! ```json
//! {
//!   "X-S3": {
//!     "buttons":   ["XLA", "S3LA"],
//!     "sections":  ["IAG", "3G"],
//!     "turnouts":  ["1/3", "(5)"],
//!     "signals":   ["X-U"],
//!     "enemies":   ["S3-X"],
//!     "conflicts": []
//!   }
//! }
//! ```
//!
//! The singular keys `section` and `turnout` are accepted as well.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicU8, Ordering};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::error::ParseError;
use crate::parsing::{parse_signal, parse_turnout};

// ============================================================================
// Gate
// ============================================================================

/// Lifecycle state of a route.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteState {
    /// Not holding any resources.
    Idle = 0,
    /// An admission or cancellation is in flight.
    Pending = 1,
    /// Holding its sections, turnouts and signals.
    Alive = 2,
}

impl RouteState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => RouteState::Idle,
            1 => RouteState::Pending,
            _ => RouteState::Alive,
        }
    }
}

/// Per-route exclusivity gate.
#[derive(Debug)]
pub struct RouteGate(AtomicU8);

impl Default for RouteGate {
    fn default() -> Self {
        Self::new()
    }
}

impl RouteGate {
    /// New gate in [`RouteState::Idle`].
    pub fn new() -> Self {
        Self(AtomicU8::new(RouteState::Idle as u8))
    }

    /// Current state.
    pub fn state(&self) -> RouteState {
        RouteState::from_u8(self.0.load(Ordering::SeqCst))
    }

    /// Move `from` -> `to` atomically. On failure returns the actual state.
    pub fn transition(&self, from: RouteState, to: RouteState) -> Result<(), RouteState> {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| ())
            .map_err(RouteState::from_u8)
    }

    /// Idle -> Pending, at the start of admission.
    pub fn try_acquire(&self) -> Result<(), RouteState> {
        self.transition(RouteState::Idle, RouteState::Pending)
    }

    /// Pending -> Alive, when admission succeeds.
    pub fn commit(&self) -> Result<(), RouteState> {
        self.transition(RouteState::Pending, RouteState::Alive)
    }

    /// Pending -> Idle, when admission fails.
    pub fn abort(&self) -> Result<(), RouteState> {
        self.transition(RouteState::Pending, RouteState::Idle)
    }

    /// Alive -> Pending, at the start of cancellation.
    pub fn try_release(&self) -> Result<(), RouteState> {
        self.transition(RouteState::Alive, RouteState::Pending)
    }

    /// Pending -> Alive, when cancellation fails and the route keeps its resources.
    pub fn restore(&self) -> Result<(), RouteState> {
        self.transition(RouteState::Pending, RouteState::Alive)
    }

    /// Pending -> Idle, when cancellation completes.
    pub fn finish_release(&self) -> Result<(), RouteState> {
        self.transition(RouteState::Pending, RouteState::Idle)
    }
}

// ============================================================================
// Route
// ============================================================================

/// A route as written in the interlock table (the id is the table key).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteDefinition {
    /// Button ids that enter this route, in order.
    pub buttons: Vec<String>,
    /// Section ids.
    #[serde(alias = "section")]
    pub sections: Vec<String>,
    /// Turnout tokens.
    #[serde(alias = "turnout")]
    pub turnouts: Vec<String>,
    /// Signal set tokens.
    pub signals: Vec<String>,
    /// Enemy route ids.
    pub enemies: Vec<String>,
    /// Conflict route ids.
    pub conflicts: Vec<String>,
}

/// A protected path through the station.
#[derive(Debug)]
pub struct Route {
    /// Route id (the table key).
    pub id: String,
    /// Button ids that enter this route, in order.
    pub buttons: Vec<String>,
    /// Section ids.
    pub sections: Vec<String>,
    /// Turnout tokens.
    pub turnouts: Vec<String>,
    /// Signal set tokens.
    pub signals: Vec<String>,
    /// Routes that must not be alive at the same time as this one.
    pub enemies: Vec<String>,
    /// Second, independent incompatibility relation.
    pub conflicts: Vec<String>,
    gate: RouteGate,
}

impl Route {
    /// Build an idle route from its table entry.
    pub fn new(id: impl Into<String>, def: RouteDefinition) -> Self {
        Self {
            id: id.into(),
            buttons: def.buttons,
            sections: def.sections,
            turnouts: def.turnouts,
            signals: def.signals,
            enemies: def.enemies,
            conflicts: def.conflicts,
            gate: RouteGate::new(),
        }
    }

    /// The route's gate.
    pub fn gate(&self) -> &RouteGate {
        &self.gate
    }

    /// Current lifecycle state.
    pub fn state(&self) -> RouteState {
        self.gate.state()
    }

    /// True when holding its resources.
    pub fn is_alive(&self) -> bool {
        self.state() == RouteState::Alive
    }

    /// True when alive or mid-operation. Enemy and conflict checks use this.
    pub fn is_living(&self) -> bool {
        self.state() != RouteState::Idle
    }

    /// Check every turnout and signal token decodes.
    pub fn validate_tokens(&self) -> Result<(), ParseError> {
        for t in &self.turnouts {
            parse_turnout(t)?;
        }
        for s in &self.signals {
            parse_signal(s)?;
        }
        Ok(())
    }
}

// ============================================================================
// Interlock Table
// ============================================================================

/// Every route of the station, keyed by id.
#[derive(Debug, Default)]
pub struct InterlockTable {
    routes: BTreeMap<String, Route>,
}

impl InterlockTable {
    /// Build a table from definitions, rejecting malformed device tokens.
    pub fn from_definitions(defs: BTreeMap<String, RouteDefinition>) -> Result<Self, ParseError> {
        let mut routes = BTreeMap::new();
        for (id, def) in defs {
            let route = Route::new(id.clone(), def);
            route.validate_tokens()?;
            tracing::debug!(
                route = %id,
                buttons = ?route.buttons,
                sections = ?route.sections,
                turnouts = ?route.turnouts,
                signals = ?route.signals,
                "route loaded"
            );
            routes.insert(id, route);
        }

        let table = Self { routes };
        for route in table.routes.values() {
            for other in route.enemies.iter().chain(&route.conflicts) {
                if !table.routes.contains_key(other) {
                    tracing::warn!(route = %route.id, reference = %other, "no such route");
                }
            }
        }
        Ok(table)
    }

    /// Parse a table from JSON.
    pub fn from_json_str(json: &str) -> anyhow::Result<Self> {
        let defs: BTreeMap<String, RouteDefinition> =
            serde_json::from_str(json).context("parsing interlock table")?;
        Self::from_definitions(defs).context("validating interlock table")
    }

    /// Load a table from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading interlock table {}", path.display()))?;
        let table = Self::from_json_str(&text)?;
        tracing::info!(routes = table.len(), path = %path.display(), "interlock table loaded");
        Ok(table)
    }

    /// Route by id.
    pub fn get(&self, id: &str) -> Option<&Route> {
        self.routes.get(id)
    }

    /// Route entered by exactly this button sequence.
    pub fn by_buttons<S: AsRef<str>>(&self, buttons: &[S]) -> Option<&Route> {
        self.routes.values().find(|r| {
            r.buttons.len() == buttons.len()
                && r.buttons.iter().zip(buttons).all(|(a, b)| a == b.as_ref())
        })
    }

    /// All routes in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Route> {
        self.routes.values()
    }

    /// Alive routes in id order.
    pub fn alive(&self) -> impl Iterator<Item = &Route> {
        self.routes.values().filter(|r| r.is_alive())
    }

    /// Ids from `ids` whose routes are living. Unknown ids are logged and skipped.
    pub fn living_among(&self, ids: &[String]) -> Vec<String> {
        ids.iter()
            .filter(|id| match self.routes.get(id.as_str()) {
                Some(route) => route.is_living(),
                None => {
                    tracing::error!(route = %id, "no such route");
                    false
                }
            })
            .cloned()
            .collect()
    }

    /// Number of routes.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// True if the table has no routes.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
