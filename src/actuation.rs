//! Bounded device actuation.
//!
//! Commanding a turnout or a signal is a blocking write that may or may not
//! take effect. An [`Actuation`] dispatches every write concurrently and then
//! polls the controller until each device reads back its commanded state or
//! the deadline passes:
//!
//! ```text
//!   Requested ──dispatch──▶ Polling ──all converged──▶ Converged
//!                              │
//!                              └────deadline passed───▶ TimedOut
//! ```
//!
//! The actuation itself only reports which devices failed to converge.
//! Marking them Broken and emitting events is the station's job; reverting
//! them is available through [`revert`].
//!
//! Writes run on the blocking pool and are never cancelled. A write still in
//! flight when the deadline passes simply finishes later.

use core::fmt;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::ActuationConfig;
use crate::devices::{
    DeviceClass, DeviceCommand, DeviceState, SectionState, SignalState, TurnoutState,
};
use crate::traits::StationController;

// ============================================================================
// Actuated Devices
// ============================================================================

/// A device state that can be commanded and read back.
pub trait Actuated:
    Copy + PartialEq + Default + fmt::Debug + Send + Sync + Into<DeviceState> + 'static
{
    /// Class this state belongs to.
    const CLASS: DeviceClass;
    /// The frozen state a device is escalated to.
    const BROKEN: Self;

    /// Read the physical state.
    fn read<C: StationController + ?Sized>(controller: &C, id: &str) -> Self;

    /// Issue a blocking write.
    fn write<C: StationController + ?Sized>(controller: &C, cmd: &DeviceCommand<Self>);

    /// True for real positions/aspects, false for `Broken` and `Unknown`.
    fn is_commandable(&self) -> bool;
}

impl Actuated for SectionState {
    const CLASS: DeviceClass = DeviceClass::Section;
    const BROKEN: Self = SectionState::Broken;

    fn read<C: StationController + ?Sized>(controller: &C, id: &str) -> Self {
        controller.section_status(id)
    }

    fn write<C: StationController + ?Sized>(controller: &C, cmd: &DeviceCommand<Self>) {
        controller.update_section_status(cmd);
    }

    fn is_commandable(&self) -> bool {
        !matches!(self, SectionState::Broken | SectionState::Unknown)
    }
}

impl Actuated for TurnoutState {
    const CLASS: DeviceClass = DeviceClass::Turnout;
    const BROKEN: Self = TurnoutState::Broken;

    fn read<C: StationController + ?Sized>(controller: &C, id: &str) -> Self {
        controller.turnout_status(id)
    }

    fn write<C: StationController + ?Sized>(controller: &C, cmd: &DeviceCommand<Self>) {
        controller.update_turnout_status(cmd);
    }

    fn is_commandable(&self) -> bool {
        matches!(self, TurnoutState::Normal | TurnoutState::Reversed)
    }
}

impl Actuated for SignalState {
    const CLASS: DeviceClass = DeviceClass::Signal;
    const BROKEN: Self = SignalState::Broken;

    fn read<C: StationController + ?Sized>(controller: &C, id: &str) -> Self {
        controller.signal_status(id)
    }

    fn write<C: StationController + ?Sized>(controller: &C, cmd: &DeviceCommand<Self>) {
        controller.update_signal_status(cmd);
    }

    fn is_commandable(&self) -> bool {
        !self.is_abnormal()
    }
}

// ============================================================================
// Dispatch
// ============================================================================

/// Issue one write per command on the blocking pool, all at once.
///
/// The returned handles may be awaited or dropped; dropping them does not
/// stop the writes.
pub fn dispatch<C, S>(controller: &Arc<C>, commands: Vec<DeviceCommand<S>>) -> Vec<JoinHandle<()>>
where
    C: StationController + 'static,
    S: Actuated,
{
    commands
        .into_iter()
        .map(|cmd| {
            let controller = Arc::clone(controller);
            tokio::task::spawn_blocking(move || S::write(controller.as_ref(), &cmd))
        })
        .collect()
}

/// Wait for dispatched writes. A panicked write is logged and otherwise ignored.
pub async fn join_all(handles: Vec<JoinHandle<()>>) {
    for handle in handles {
        if let Err(err) = handle.await {
            tracing::error!(error = %err, "device write task failed");
        }
    }
}

/// Best-effort write of each device's previous state. Not verified.
///
/// Devices whose previous state was not a real position/aspect are skipped.
pub fn revert<C, S>(controller: &Arc<C>, devices: &[PendingDevice<S>])
where
    C: StationController + 'static,
    S: Actuated,
{
    let commands: Vec<DeviceCommand<S>> = devices
        .iter()
        .filter(|d| d.previous.is_commandable())
        .map(|d| DeviceCommand::new(d.id.clone(), d.previous))
        .collect();

    for cmd in &commands {
        let state: DeviceState = cmd.state.into();
        tracing::warn!(class = %S::CLASS, id = %cmd.id, %state, "reverting");
    }
    drop(dispatch(controller, commands));
}

// ============================================================================
// Actuation
// ============================================================================

/// Phase of an [`Actuation`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActuationPhase {
    /// Built, nothing written yet.
    Requested,
    /// Writes dispatched, reading back.
    Polling,
    /// Every device reached its target.
    Converged,
    /// The deadline passed with devices still pending.
    TimedOut,
}

/// One device being driven to a target.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingDevice<S> {
    /// Device id.
    pub id: String,
    /// Commanded state.
    pub target: S,
    /// Cached state before the command, used for reverting.
    pub previous: S,
}

impl<S: Actuated> PendingDevice<S> {
    /// Pending device from a command and the state it had before.
    pub fn new(cmd: DeviceCommand<S>, previous: S) -> Self {
        Self {
            id: cmd.id,
            target: cmd.state,
            previous,
        }
    }

    fn command(&self) -> DeviceCommand<S> {
        DeviceCommand::new(self.id.clone(), self.target)
    }
}

/// Drive a set of devices of one class to their targets within a deadline.
#[derive(Debug)]
pub struct Actuation<S> {
    pending: Vec<PendingDevice<S>>,
    phase: ActuationPhase,
}

impl<S: Actuated> Actuation<S> {
    /// New actuation in [`ActuationPhase::Requested`].
    pub fn new(devices: Vec<PendingDevice<S>>) -> Self {
        Self {
            pending: devices,
            phase: ActuationPhase::Requested,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> ActuationPhase {
        self.phase
    }

    /// Devices that have not converged yet.
    pub fn pending(&self) -> &[PendingDevice<S>] {
        &self.pending
    }

    /// Requested -> Polling: issue every write concurrently.
    pub fn dispatch<C: StationController + 'static>(&mut self, controller: &Arc<C>) {
        if self.phase != ActuationPhase::Requested {
            return;
        }
        let commands: Vec<DeviceCommand<S>> =
            self.pending.iter().map(PendingDevice::command).collect();
        drop(dispatch(controller, commands));
        self.phase = ActuationPhase::Polling;
    }

    /// One read-back pass. Drops converged devices and times out once `now`
    /// reaches `deadline` with devices still pending.
    pub fn poll<C: StationController + ?Sized>(
        &mut self,
        controller: &C,
        now: Instant,
        deadline: Instant,
    ) -> ActuationPhase {
        if self.phase != ActuationPhase::Polling {
            return self.phase;
        }

        self.pending.retain(|d| S::read(controller, &d.id) != d.target);

        self.phase = if self.pending.is_empty() {
            ActuationPhase::Converged
        } else if now >= deadline {
            ActuationPhase::TimedOut
        } else {
            ActuationPhase::Polling
        };
        self.phase
    }

    /// Dispatch and poll until converged or timed out.
    ///
    /// On timeout returns the devices still pending.
    pub async fn run<C: StationController + 'static>(
        mut self,
        controller: &Arc<C>,
        config: &ActuationConfig,
    ) -> Result<(), Vec<PendingDevice<S>>> {
        if self.pending.is_empty() {
            self.phase = ActuationPhase::Converged;
            return Ok(());
        }

        let deadline = Instant::now() + config.deadline();
        self.dispatch(controller);

        loop {
            match self.poll(controller.as_ref(), Instant::now(), deadline) {
                ActuationPhase::Converged => return Ok(()),
                ActuationPhase::TimedOut => {
                    let ids: Vec<&str> = self.pending.iter().map(|d| d.id.as_str()).collect();
                    tracing::warn!(class = %S::CLASS, devices = ?ids, "actuation timed out");
                    return Err(self.pending);
                }
                _ => {}
            }

            let now = Instant::now();
            let pause = config.poll_interval().min(deadline.saturating_duration_since(now));
            tokio::time::sleep(pause).await;
        }
    }
}
