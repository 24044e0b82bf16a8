//! Station manager: cached device state, route admission and cancellation.
//!
//! [`StationManager`] owns the interlock table, one cache map per device
//! class and the event channel. The caches are what admission checks look
//! at. They change in two ways only:
//!
//! - **Observed**: [`refresh_station_status`](StationManager::refresh_station_status)
//!   reads every device and records differences.
//! - **Commanded**: route operations record a device's state after it has
//!   been read back from the controller, and escalate non-converging devices
//!   to Broken.
//!
//! A device cached as Broken is frozen; only
//! [`repair_device`](StationManager::repair_device) replaces it. Every change
//! is published as a [`StateChangedEvent`].
//!
//! # Route setting
//!
//! | Step | On failure |
//! |------|------------|
//! | Gate Idle -> Pending, enemies/conflicts idle, sections Free | all violations reported, nothing moves |
//! | Turnouts to commanded position | timed-out turnouts marked Broken and reverted, route stays idle |
//! | Sections Locked, signals to commanded aspect | reported, sections freed again, route stays idle |
//! | Gate Pending -> Alive | |
//!
//! # Route cancellation
//!
//! | Step | On failure |
//! |------|------------|
//! | Gate Alive -> Pending, sections Locked | reported, route stays alive |
//! | Signals to stop / shunting aspect | reported, cancellation continues |
//! | Turnouts to Normal | timed-out turnouts marked Broken, route stays alive |
//! | Sections Free, gate Pending -> Idle | reported, route is still released |
//!
//! Routes that share resources are not serialised against each other here.
//! A caller that lets several operators set routes at once must queue
//! requests above this layer.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use serde::Serialize;

use crate::actuation::{self, Actuated, Actuation, PendingDevice};
use crate::config::Config;
use crate::devices::{
    DeviceClass, DeviceCommand, DeviceState, SectionState, SignalCommand, SignalState,
    TurnoutCommand, TurnoutState,
};
use crate::error::{InterlockError, ParseError, Violation, Violations};
use crate::events::{EventChannel, EventStream, StateChangedEvent};
use crate::hal::SimulatedController;
use crate::lock_unpoisoned;
use crate::parsing::{
    parse_abort_signal, parse_normal_turnout, parse_section, parse_signal, parse_turnout,
    TurnoutCommands,
};
use crate::route::{InterlockTable, Route, RouteState};
use crate::traits::{IoInfo, StationController};

// ============================================================================
// Snapshot
// ============================================================================

/// One device in a snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DeviceStatus {
    /// Device id.
    pub id: String,
    /// Cached state.
    pub state: DeviceState,
}

/// An alive route in a snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AliveRoute {
    /// Route id.
    pub id: String,
    /// First entry button, if the route has any.
    pub button: Option<String>,
}

/// Full cached station state, for observers re-synchronising after missed events.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StationSnapshot {
    /// Sections sorted by id.
    pub sections: Vec<DeviceStatus>,
    /// Turnouts sorted by id.
    pub turnouts: Vec<DeviceStatus>,
    /// Signals sorted by id.
    pub signals: Vec<DeviceStatus>,
    /// Alive routes sorted by id.
    pub routes: Vec<AliveRoute>,
}

// ============================================================================
// Caches
// ============================================================================

type Cache<S> = Mutex<HashMap<String, S>>;

/// Picks the cache map for a device class.
trait Cached: Actuated {
    fn cache<C>(station: &StationManager<C>) -> &Cache<Self>;
}

impl Cached for SectionState {
    fn cache<C>(station: &StationManager<C>) -> &Cache<Self> {
        &station.sections
    }
}

impl Cached for TurnoutState {
    fn cache<C>(station: &StationManager<C>) -> &Cache<Self> {
        &station.turnouts
    }
}

impl Cached for SignalState {
    fn cache<C>(station: &StationManager<C>) -> &Cache<Self> {
        &station.signals
    }
}

fn sorted_statuses<S: Copy + Into<DeviceState>>(cache: &Cache<S>) -> Vec<DeviceStatus> {
    let mut out: Vec<DeviceStatus> = lock_unpoisoned(cache)
        .iter()
        .map(|(id, state)| DeviceStatus {
            id: id.clone(),
            state: (*state).into(),
        })
        .collect();
    out.sort_by(|a, b| a.id.cmp(&b.id));
    out
}

// ============================================================================
// Station Manager
// ============================================================================

/// The interlocking orchestrator.
#[derive(Debug)]
pub struct StationManager<C> {
    controller: Arc<C>,
    table: InterlockTable,
    sections: Cache<SectionState>,
    turnouts: Cache<TurnoutState>,
    signals: Cache<SignalState>,
    events: EventChannel,
    config: Config,
}

impl StationManager<SimulatedController> {
    /// Load the interlock table and IO document named by `config` and build a
    /// station on a simulated controller.
    pub fn simulated(config: Config) -> anyhow::Result<Self> {
        let table = InterlockTable::load(&config.station.interlock_path)?;
        let controller = SimulatedController::from_path(&config.station.io_path, config.simulator.clone())?;
        Ok(Self::new(Arc::new(controller), table, config))
    }
}

impl<C: StationController + 'static> StationManager<C> {
    /// Build a station and fill the caches with one refresh pass.
    pub fn new(controller: Arc<C>, table: InterlockTable, config: Config) -> Self {
        let info = controller.io_info();
        let capacity = Self::event_capacity(&config, &info);
        let station = Self {
            controller,
            table,
            sections: Mutex::new(HashMap::new()),
            turnouts: Mutex::new(HashMap::new()),
            signals: Mutex::new(HashMap::new()),
            events: EventChannel::new(capacity),
            config,
        };
        station.refresh_station_status();
        tracing::info!(
            station = %station.config.station.name,
            routes = station.table.len(),
            devices = info.total(),
            "station ready"
        );
        station
    }

    fn event_capacity(config: &Config, info: &IoInfo) -> usize {
        config.events.capacity.unwrap_or(info.total())
    }

    /// The device controller.
    pub fn controller(&self) -> &Arc<C> {
        &self.controller
    }

    /// The interlock table.
    pub fn table(&self) -> &InterlockTable {
        &self.table
    }

    /// Active configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The event channel.
    pub fn events(&self) -> &EventChannel {
        &self.events
    }

    // ========================================================================
    // Lookups
    // ========================================================================

    /// Route by id.
    pub fn route_by_name(&self, id: &str) -> Result<&Route, InterlockError> {
        self.table
            .get(id)
            .ok_or_else(|| InterlockError::RouteNotFound(id.to_string()))
    }

    /// Route entered by exactly this button sequence.
    pub fn route_by_buttons<S: AsRef<str>>(&self, buttons: &[S]) -> Result<&Route, InterlockError> {
        self.table.by_buttons(buttons).ok_or_else(|| {
            InterlockError::ButtonsNotFound(buttons.iter().map(|b| b.as_ref().to_string()).collect())
        })
    }

    /// Alive routes in id order.
    pub fn alive_routes(&self) -> Vec<&Route> {
        self.table.alive().collect()
    }

    /// Enemies of `route` that are currently alive or mid-operation.
    pub fn living_enemies(&self, route: &Route) -> Vec<String> {
        self.living_others(route, &route.enemies)
    }

    /// Conflicts of `route` that are currently alive or mid-operation.
    pub fn living_conflicts(&self, route: &Route) -> Vec<String> {
        self.living_others(route, &route.conflicts)
    }

    fn living_others(&self, route: &Route, ids: &[String]) -> Vec<String> {
        let mut living = self.table.living_among(ids);
        living.retain(|id| *id != route.id);
        living
    }

    // ========================================================================
    // Cached State
    // ========================================================================

    fn cached<S: Cached>(&self, id: &str) -> Option<S> {
        lock_unpoisoned(S::cache(self)).get(id).copied()
    }

    /// Cached section state.
    pub fn section_state(&self, id: &str) -> Option<SectionState> {
        self.cached(id)
    }

    /// Cached turnout state.
    pub fn turnout_state(&self, id: &str) -> Option<TurnoutState> {
        self.cached(id)
    }

    /// Cached signal state.
    pub fn signal_state(&self, id: &str) -> Option<SignalState> {
        self.cached(id)
    }

    /// Cached state of any device.
    pub fn device_state(&self, class: DeviceClass, id: &str) -> Option<DeviceState> {
        match class {
            DeviceClass::Section => self.section_state(id).map(Into::into),
            DeviceClass::Turnout => self.turnout_state(id).map(Into::into),
            DeviceClass::Signal => self.signal_state(id).map(Into::into),
        }
    }

    /// Record a state for `id`. First sightings are inserted silently;
    /// Broken entries are left alone. Returns true if an event was published.
    fn record<S: Cached>(&self, id: &str, state: S) -> bool {
        let old = {
            let mut cache = lock_unpoisoned(S::cache(self));
            match cache.get_mut(id) {
                None => {
                    cache.insert(id.to_string(), state);
                    return false;
                }
                Some(current) if *current == S::BROKEN || *current == state => return false,
                Some(current) => std::mem::replace(current, state),
            }
        };
        self.events.publish(StateChangedEvent::new(id, old, state));
        true
    }

    /// Freeze devices that did not converge, emit their events and try to
    /// put them back where they were.
    fn escalate<S: Cached>(&self, devices: Vec<PendingDevice<S>>) -> Violation {
        for device in &devices {
            let old = lock_unpoisoned(S::cache(self))
                .insert(device.id.clone(), S::BROKEN)
                .unwrap_or_default();
            tracing::error!(class = %S::CLASS, id = %device.id, "device did not converge, marked broken");
            if old != S::BROKEN {
                self.events
                    .publish(StateChangedEvent::new(device.id.clone(), old, S::BROKEN));
            }
        }
        actuation::revert(&self.controller, &devices);

        Violation::ActuationTimeout {
            class: S::CLASS,
            devices: devices.into_iter().map(|d| d.id).collect(),
        }
    }

    // ========================================================================
    // Refresh / Repair / Snapshot
    // ========================================================================

    /// One polling pass over every device. Returns the number of events published.
    pub fn refresh_station_status(&self) -> usize {
        let info = self.controller.io_info();
        self.refresh_class::<TurnoutState>(&info)
            + self.refresh_class::<SectionState>(&info)
            + self.refresh_class::<SignalState>(&info)
    }

    fn refresh_class<S: Cached>(&self, info: &IoInfo) -> usize {
        info.ids(S::CLASS)
            .iter()
            .filter(|id| {
                let observed = S::read(self.controller.as_ref(), id);
                self.record(id, observed)
            })
            .count()
    }

    /// Replace a Broken device's cached state with a fresh read.
    ///
    /// Returns the published event, or `None` if the device was not Broken.
    pub fn repair_device(&self, class: DeviceClass, id: &str) -> Option<StateChangedEvent> {
        match class {
            DeviceClass::Section => self.repair::<SectionState>(id),
            DeviceClass::Turnout => self.repair::<TurnoutState>(id),
            DeviceClass::Signal => self.repair::<SignalState>(id),
        }
    }

    fn repair<S: Cached>(&self, id: &str) -> Option<StateChangedEvent> {
        let observed = S::read(self.controller.as_ref(), id);
        let old = {
            let mut cache = lock_unpoisoned(S::cache(self));
            match cache.get_mut(id) {
                Some(current) if *current == S::BROKEN => std::mem::replace(current, observed),
                _ => return None,
            }
        };
        let event = StateChangedEvent::new(id, old, observed);
        tracing::info!(class = %S::CLASS, id, state = %event.new, "device repaired");
        self.events.publish(event.clone());
        Some(event)
    }

    /// Every cached device and every alive route.
    pub fn snapshot(&self) -> StationSnapshot {
        StationSnapshot {
            sections: sorted_statuses(&self.sections),
            turnouts: sorted_statuses(&self.turnouts),
            signals: sorted_statuses(&self.signals),
            routes: self
                .table
                .alive()
                .map(|r| AliveRoute {
                    id: r.id.clone(),
                    button: r.buttons.first().cloned(),
                })
                .collect(),
        }
    }

    /// Open a fresh event stream; the previous one is closed.
    pub fn subscribe(&self) -> EventStream {
        let capacity = Self::event_capacity(&self.config, &self.controller.io_info());
        self.events.subscribe(capacity)
    }

    // ========================================================================
    // Actuation Phases
    // ========================================================================

    /// Run the bounded protocol; record converged devices, escalate the rest.
    async fn actuate<S: Cached>(&self, commands: Vec<DeviceCommand<S>>) -> Result<(), Violation> {
        let devices: Vec<PendingDevice<S>> = commands
            .into_iter()
            .map(|cmd| {
                let previous = self.cached::<S>(&cmd.id).unwrap_or_default();
                PendingDevice::new(cmd, previous)
            })
            .collect();
        let targets: Vec<(String, S)> = devices.iter().map(|d| (d.id.clone(), d.target)).collect();

        let result = Actuation::new(devices)
            .run(&self.controller, &self.config.actuation)
            .await;

        let failed: Vec<PendingDevice<S>> = result.err().unwrap_or_default();
        for (id, target) in &targets {
            if !failed.iter().any(|d| d.id == *id) {
                self.record(id, *target);
            }
        }
        if failed.is_empty() {
            Ok(())
        } else {
            Err(self.escalate(failed))
        }
    }

    /// Command signals, skipping those cached Broken/Unknown.
    async fn command_signals(&self, commands: Vec<SignalCommand>) -> Violations {
        let mut report = Violations::new();
        let (abnormal, healthy): (Vec<SignalCommand>, Vec<SignalCommand>) = commands
            .into_iter()
            .partition(|cmd| self.cached::<SignalState>(&cmd.id).unwrap_or_default().is_abnormal());

        if !abnormal.is_empty() {
            let signals: Vec<String> = abnormal.into_iter().map(|cmd| cmd.id).collect();
            tracing::warn!(?signals, "signal state abnormal, not commanded");
            report.push(Violation::SignalsAbnormal { signals });
        }
        if let Err(violation) = self.actuate(healthy).await {
            report.push(violation);
        }
        report
    }

    /// Write every section and record what it reads back.
    ///
    /// Returns the ids that did not read back `state`.
    async fn command_sections(&self, ids: &[String], state: SectionState) -> Vec<String> {
        let commands: Vec<_> = ids.iter().map(|id| parse_section(id, state)).collect();
        actuation::join_all(actuation::dispatch(&self.controller, commands)).await;
        let mut missed = Vec::new();
        for id in ids {
            let observed = SectionState::read(self.controller.as_ref(), id);
            self.record(id, observed);
            if observed != state {
                missed.push(id.clone());
            }
        }
        if !missed.is_empty() {
            tracing::warn!(sections = ?missed, target = %DeviceState::from(state), "sections did not follow command");
        }
        missed
    }

    // ========================================================================
    // Route Operations
    // ========================================================================

    /// Set a route. Returns the route id once it is alive.
    ///
    /// Rule violations are collected, not short-circuited. If a section does
    /// not lock or a signal does not reach its aspect, the sections are
    /// freed again and the route stays idle. Turnouts and signals that did
    /// move are left where they are.
    pub async fn create_route(&self, route_id: &str) -> Result<String, InterlockError> {
        let route = self.route_by_name(route_id)?;
        let gate = route.gate();
        let started = Instant::now();

        let mut report = Violations::new();
        let acquired = match gate.try_acquire() {
            Ok(()) => true,
            Err(RouteState::Alive) => {
                report.push(Violation::LivingRoute { route: route.id.clone() });
                false
            }
            Err(_) => {
                report.push(Violation::PendingRoute { route: route.id.clone() });
                false
            }
        };

        let enemies = self.living_enemies(route);
        if !enemies.is_empty() {
            report.push(Violation::LivingEnemies { routes: enemies });
        }
        let conflicts = self.living_conflicts(route);
        if !conflicts.is_empty() {
            report.push(Violation::LivingConflicts { routes: conflicts });
        }
        let not_free: Vec<String> = route
            .sections
            .iter()
            .filter(|id| self.section_state(id) != Some(SectionState::Free))
            .cloned()
            .collect();
        if !not_free.is_empty() {
            report.push(Violation::SectionsNotFree { sections: not_free });
        }

        if !report.is_empty() {
            if acquired {
                gate_step(route, "abort", gate.abort());
            }
            tracing::warn!(route = %route.id, violations = %report, "route rejected");
            return Err(report.into());
        }

        let decoded = decode_turnouts(&route.turnouts, parse_turnout).and_then(|turnouts| {
            let signals = route
                .signals
                .iter()
                .map(|t| parse_signal(t))
                .collect::<Result<Vec<_>, _>>()?;
            Ok((turnouts, signals))
        });
        let (turnouts, signals) = match decoded {
            Ok(plan) => plan,
            Err(err) => {
                gate_step(route, "abort", gate.abort());
                tracing::error!(route = %route.id, error = %err, "bad device token");
                return Err(err.into());
            }
        };

        tracing::info!(route = %route.id, "setting route");
        if let Err(violation) = self.actuate(turnouts).await {
            gate_step(route, "abort", gate.abort());
            tracing::warn!(route = %route.id, %violation, "route not set");
            return Err(Violations::from(violation).into());
        }

        let (unlocked, mut report) = tokio::join!(
            self.command_sections(&route.sections, SectionState::Locked),
            self.command_signals(signals),
        );
        if !unlocked.is_empty() {
            report.push(Violation::SectionsNotLocked { sections: unlocked });
        }

        let elapsed_ms = started.elapsed().as_millis() as u64;
        if !report.is_empty() {
            let held = self.command_sections(&route.sections, SectionState::Free).await;
            if !held.is_empty() {
                tracing::error!(route = %route.id, sections = ?held, "sections not released after failed set");
            }
            gate_step(route, "abort", gate.abort());
            tracing::warn!(route = %route.id, elapsed_ms, violations = %report, "route not set");
            return Err(report.into());
        }

        gate_step(route, "commit", gate.commit());
        tracing::info!(route = %route.id, elapsed_ms, "route set");
        Ok(route.id.clone())
    }

    /// Cancel an alive route: signals to stop, turnouts to Normal, sections Free.
    pub async fn cancel_route(&self, route_id: &str) -> Result<(), InterlockError> {
        let route = self.route_by_name(route_id)?;
        let gate = route.gate();
        let started = Instant::now();

        if let Err(actual) = gate.try_release() {
            let violation = match actual {
                RouteState::Pending => Violation::PendingRoute { route: route.id.clone() },
                _ => Violation::NotLivingRoute { route: route.id.clone() },
            };
            tracing::warn!(route = %route.id, %violation, "cancel rejected");
            return Err(Violations::from(violation).into());
        }

        let not_locked: Vec<String> = route
            .sections
            .iter()
            .filter(|id| self.section_state(id) != Some(SectionState::Locked))
            .cloned()
            .collect();
        if !not_locked.is_empty() {
            gate_step(route, "restore", gate.restore());
            let violation = Violation::SectionsNotLocked { sections: not_locked };
            tracing::warn!(route = %route.id, %violation, "cancel rejected");
            return Err(Violations::from(violation).into());
        }

        let decoded = decode_turnouts(&route.turnouts, parse_normal_turnout).and_then(|turnouts| {
            let signals = route
                .signals
                .iter()
                .map(|t| parse_abort_signal(t))
                .collect::<Result<Vec<_>, _>>()?;
            Ok((turnouts, signals))
        });
        let (turnouts, signals) = match decoded {
            Ok(plan) => plan,
            Err(err) => {
                gate_step(route, "restore", gate.restore());
                tracing::error!(route = %route.id, error = %err, "bad device token");
                return Err(err.into());
            }
        };

        tracing::info!(route = %route.id, "cancelling route");
        let mut report = self.command_signals(signals).await;

        if let Err(violation) = self.actuate(turnouts).await {
            report.push(violation);
            gate_step(route, "restore", gate.restore());
            tracing::warn!(route = %route.id, violations = %report, "route not cancelled");
            return Err(report.into());
        }

        let held = self.command_sections(&route.sections, SectionState::Free).await;
        if !held.is_empty() {
            report.push(Violation::SectionsNotFree { sections: held });
        }
        gate_step(route, "release", gate.finish_release());

        let elapsed_ms = started.elapsed().as_millis() as u64;
        if report.is_empty() {
            tracing::info!(route = %route.id, elapsed_ms, "route cancelled");
        } else {
            tracing::warn!(route = %route.id, elapsed_ms, violations = %report, "route cancelled with faults");
        }
        report.into_result()
    }
}

fn decode_turnouts(
    tokens: &[String],
    parse: fn(&str) -> Result<TurnoutCommands, ParseError>,
) -> Result<Vec<TurnoutCommand>, ParseError> {
    let mut commands = Vec::new();
    for token in tokens {
        commands.extend(parse(token)?);
    }
    Ok(commands)
}

fn gate_step(route: &Route, step: &str, result: Result<(), RouteState>) {
    if let Err(actual) = result {
        tracing::error!(route = %route.id, step, ?actual, "unexpected route state");
    }
}
