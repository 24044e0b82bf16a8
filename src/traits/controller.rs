//! Device controller capability: read and command trackside devices.
//!
//! The [`StationController`] trait is the only way the interlocking touches
//! physical state. Implement it for an IO board, a field-bus gateway, or use
//! [`SimulatedController`](crate::hal::SimulatedController) on a desktop.
//!
//! # Contract
//!
//! | Method | Behaviour |
//! |--------|-----------|
//! | [`io_info`](StationController::io_info) | Every known device id, per class |
//! | `*_status` | Synchronous read of the current physical state |
//! | `update_*_status` | Commanded write; may block for the actuation time |
//!
//! A write returns once the underlying mechanism has *attempted* the change.
//! It does not guarantee the commanded state was reached: callers must read
//! the state back (see [`crate::actuation`]).
//!
//! All methods take `&self`; implementations use interior mutability so one
//! controller can serve many concurrent actuations.

use crate::devices::{
    DeviceClass, DeviceState, SectionCommand, SectionState, SignalCommand, SignalState,
    TurnoutCommand, TurnoutState,
};

/// Device ids known to a controller, grouped by class.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IoInfo {
    /// Section ids.
    pub sections: Vec<String>,
    /// Turnout ids.
    pub turnouts: Vec<String>,
    /// Signal ids.
    pub signals: Vec<String>,
}

impl IoInfo {
    /// Ids of one class.
    pub fn ids(&self, class: DeviceClass) -> &[String] {
        match class {
            DeviceClass::Section => &self.sections,
            DeviceClass::Turnout => &self.turnouts,
            DeviceClass::Signal => &self.signals,
        }
    }

    /// Total number of devices across all classes.
    pub fn total(&self) -> usize {
        self.sections.len() + self.turnouts.len() + self.signals.len()
    }
}

/// Read/write access to section, turnout and signal state.
///
/// # Example Implementation
///
/// ```rust,ignore
/// use rs_interlock::traits::{IoInfo, StationController};
/// use rs_interlock::devices::*;
///
/// struct Relays { /* board handles */ }
///
/// impl StationController for Relays {
///     fn io_info(&self) -> IoInfo { /* enumerate inputs */ }
///     fn turnout_status(&self, id: &str) -> TurnoutState {
///         // read the detection relay for `id`
///     }
///     fn update_turnout_status(&self, cmd: &TurnoutCommand) {
///         // energise the point machine, wait for the throw to finish
///     }
///     // ...
/// }
/// ```
pub trait StationController: Send + Sync {
    /// Enumerate every device id per class.
    fn io_info(&self) -> IoInfo;

    /// Current physical state of a section.
    fn section_status(&self, id: &str) -> SectionState;

    /// Current aspect of a signal.
    fn signal_status(&self, id: &str) -> SignalState;

    /// Current position of a turnout.
    fn turnout_status(&self, id: &str) -> TurnoutState;

    /// Command a section. May block.
    fn update_section_status(&self, cmd: &SectionCommand);

    /// Command a signal aspect. May block for the aspect change time.
    fn update_signal_status(&self, cmd: &SignalCommand);

    /// Command a turnout position. May block for the throw time.
    fn update_turnout_status(&self, cmd: &TurnoutCommand);

    /// Read any device as a class-erased state.
    fn status(&self, class: DeviceClass, id: &str) -> DeviceState {
        match class {
            DeviceClass::Section => self.section_status(id).into(),
            DeviceClass::Turnout => self.turnout_status(id).into(),
            DeviceClass::Signal => self.signal_status(id).into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct FixedController {
        turnout: Mutex<TurnoutState>,
    }

    impl StationController for FixedController {
        fn io_info(&self) -> IoInfo {
            IoInfo {
                sections: vec!["1G".into()],
                turnouts: vec!["1".into(), "3".into()],
                signals: vec![],
            }
        }

        fn section_status(&self, _id: &str) -> SectionState {
            SectionState::Occupied
        }

        fn signal_status(&self, _id: &str) -> SignalState {
            SignalState::Unknown
        }

        fn turnout_status(&self, _id: &str) -> TurnoutState {
            *self.turnout.lock().unwrap()
        }

        fn update_section_status(&self, _cmd: &SectionCommand) {}

        fn update_signal_status(&self, _cmd: &SignalCommand) {}

        fn update_turnout_status(&self, cmd: &TurnoutCommand) {
            *self.turnout.lock().unwrap() = cmd.state;
        }
    }

    #[test]
    fn io_info_ids_and_total() {
        let c = FixedController {
            turnout: Mutex::new(TurnoutState::Normal),
        };
        let info = c.io_info();
        assert_eq!(info.total(), 3);
        assert_eq!(info.ids(DeviceClass::Turnout), &["1".to_string(), "3".to_string()]);
        assert!(info.ids(DeviceClass::Signal).is_empty());
    }

    #[test]
    fn status_default_impl_dispatches_by_class() {
        let c = FixedController {
            turnout: Mutex::new(TurnoutState::Normal),
        };
        assert_eq!(
            c.status(DeviceClass::Section, "1G"),
            DeviceState::Section(SectionState::Occupied)
        );
        c.update_turnout_status(&TurnoutCommand::new("1", TurnoutState::Reversed));
        assert_eq!(
            c.status(DeviceClass::Turnout, "1"),
            DeviceState::Turnout(TurnoutState::Reversed)
        );
    }
}
