//! Device state model for track sections, turnouts and signals.
//!
//! Every physical device the interlocking knows about belongs to one
//! [`DeviceClass`] and reports a class-specific state:
//!
//! | Class | State enum | Normal values |
//! |-------|------------|---------------|
//! | [`DeviceClass::Section`] | [`SectionState`] | Free, Occupied, Locked |
//! | [`DeviceClass::Turnout`] | [`TurnoutState`] | Normal, Reversed |
//! | [`DeviceClass::Signal`] | [`SignalState`] | Red, Yellow, DoubleYellow, Green, White, Blue |
//!
//! All three carry `Broken` and `Unknown`. A device cached as `Broken` is frozen
//! until repaired; `Unknown` is what an unreadable or unparsable device reports.
//!
//! # Example
//!
//! ```rust
//! use rs_interlock::devices::{SignalState, TurnoutState, TurnoutCommand};
//!
//! assert_eq!(SignalState::from_aspect_code("UU"), Some(SignalState::DoubleYellow));
//! assert_eq!(TurnoutState::from_text("reversed"), TurnoutState::Reversed);
//!
//! let cmd = TurnoutCommand::new("5", TurnoutState::Reversed);
//! assert_eq!(cmd.id, "5");
//! ```

use core::fmt;

use serde::{Deserialize, Serialize};

// ============================================================================
// Device Class
// ============================================================================

/// The three classes of trackside device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceClass {
    /// Track-circuit section.
    Section,
    /// Switch / points mechanism.
    Turnout,
    /// Trackside signal.
    Signal,
}

impl DeviceClass {
    /// All classes, in polling order.
    pub const ALL: [DeviceClass; 3] = [DeviceClass::Turnout, DeviceClass::Section, DeviceClass::Signal];

    /// Key used for this class in the IO document (`"sections"`, ...).
    pub const fn as_str(&self) -> &'static str {
        match self {
            DeviceClass::Section => "sections",
            DeviceClass::Turnout => "turnouts",
            DeviceClass::Signal => "signals",
        }
    }
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Section
// ============================================================================

/// State of a track-circuit section.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionState {
    /// No train present, not reserved.
    Free,
    /// A train is detected on the section.
    Occupied,
    /// Reserved by an alive route.
    Locked,
    /// Frozen after a failure; needs repair.
    Broken,
    /// State could not be determined.
    #[default]
    Unknown,
}

impl SectionState {
    /// Lowercase name, matching the serde representation.
    pub const fn as_str(&self) -> &'static str {
        match self {
            SectionState::Free => "free",
            SectionState::Occupied => "occupied",
            SectionState::Locked => "locked",
            SectionState::Broken => "broken",
            SectionState::Unknown => "unknown",
        }
    }

    /// Parse an IO-document state string. Unrecognised text maps to `Unknown`.
    pub fn from_text(s: &str) -> Self {
        match s.trim().to_ascii_uppercase().as_str() {
            "FREE" => SectionState::Free,
            "OCCUPIED" => SectionState::Occupied,
            "LOCKED" => SectionState::Locked,
            "BROKEN" => SectionState::Broken,
            _ => SectionState::Unknown,
        }
    }
}

// ============================================================================
// Turnout
// ============================================================================

/// Position of a turnout.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnoutState {
    /// Set for the straight route.
    Normal,
    /// Set for the diverging route.
    Reversed,
    /// Frozen after a failed throw; needs repair.
    Broken,
    /// Position could not be determined.
    #[default]
    Unknown,
}

impl TurnoutState {
    /// Lowercase name, matching the serde representation.
    pub const fn as_str(&self) -> &'static str {
        match self {
            TurnoutState::Normal => "normal",
            TurnoutState::Reversed => "reversed",
            TurnoutState::Broken => "broken",
            TurnoutState::Unknown => "unknown",
        }
    }

    /// Parse an IO-document state string. Unrecognised text maps to `Unknown`.
    pub fn from_text(s: &str) -> Self {
        match s.trim().to_ascii_uppercase().as_str() {
            "NORMAL" => TurnoutState::Normal,
            "REVERSED" => TurnoutState::Reversed,
            "BROKEN" => TurnoutState::Broken,
            _ => TurnoutState::Unknown,
        }
    }
}

// ============================================================================
// Signal
// ============================================================================

/// Aspect displayed by a signal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalState {
    /// Stop. Aspect code `H`.
    Red,
    /// Proceed, next signal at stop. Aspect code `U`.
    Yellow,
    /// Proceed into a diverging route. Aspect code `UU`.
    DoubleYellow,
    /// Proceed. Aspect code `L`.
    Green,
    /// Call-on / shunting proceed. Aspect code `B`.
    White,
    /// Shunting-signal aspect commanded when a shunting route is aborted.
    /// Aspect code `A`.
    Blue,
    /// Frozen after a failed change; needs repair.
    Broken,
    /// Aspect could not be determined.
    #[default]
    Unknown,
}

impl SignalState {
    /// Lowercase name, matching the serde representation.
    pub const fn as_str(&self) -> &'static str {
        match self {
            SignalState::Red => "red",
            SignalState::Yellow => "yellow",
            SignalState::DoubleYellow => "double_yellow",
            SignalState::Green => "green",
            SignalState::White => "white",
            SignalState::Blue => "blue",
            SignalState::Broken => "broken",
            SignalState::Unknown => "unknown",
        }
    }

    /// Map an aspect code to its aspect.
    ///
    /// ```
    /// use rs_interlock::devices::SignalState;
    ///
    /// assert_eq!(SignalState::from_aspect_code("H"), Some(SignalState::Red));
    /// assert_eq!(SignalState::from_aspect_code("L"), Some(SignalState::Green));
    /// assert_eq!(SignalState::from_aspect_code("X"), None);
    /// ```
    pub fn from_aspect_code(code: &str) -> Option<Self> {
        match code {
            "H" => Some(SignalState::Red),
            "U" => Some(SignalState::Yellow),
            "UU" => Some(SignalState::DoubleYellow),
            "L" => Some(SignalState::Green),
            "B" => Some(SignalState::White),
            "A" => Some(SignalState::Blue),
            _ => None,
        }
    }

    /// Parse an IO-document state string: an aspect code or an aspect name.
    pub fn from_text(s: &str) -> Self {
        let s = s.trim();
        if let Some(state) = Self::from_aspect_code(s) {
            return state;
        }
        match s.to_ascii_lowercase().as_str() {
            "red" => SignalState::Red,
            "yellow" => SignalState::Yellow,
            "double_yellow" => SignalState::DoubleYellow,
            "green" => SignalState::Green,
            "white" => SignalState::White,
            "blue" => SignalState::Blue,
            "broken" => SignalState::Broken,
            _ => SignalState::Unknown,
        }
    }

    /// True if the signal must not be commanded (`Broken` or `Unknown`).
    pub const fn is_abnormal(&self) -> bool {
        matches!(self, SignalState::Broken | SignalState::Unknown)
    }
}

// ============================================================================
// Class-erased State
// ============================================================================

/// A state of any device class, used by events and snapshots.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum DeviceState {
    /// Section state.
    Section(SectionState),
    /// Turnout state.
    Turnout(TurnoutState),
    /// Signal state.
    Signal(SignalState),
}

impl DeviceState {
    /// Class of the device this state belongs to.
    pub const fn class(&self) -> DeviceClass {
        match self {
            DeviceState::Section(_) => DeviceClass::Section,
            DeviceState::Turnout(_) => DeviceClass::Turnout,
            DeviceState::Signal(_) => DeviceClass::Signal,
        }
    }

    /// True for the `Broken` value of any class.
    pub const fn is_broken(&self) -> bool {
        matches!(
            self,
            DeviceState::Section(SectionState::Broken)
                | DeviceState::Turnout(TurnoutState::Broken)
                | DeviceState::Signal(SignalState::Broken)
        )
    }

    /// Lowercase state name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            DeviceState::Section(s) => s.as_str(),
            DeviceState::Turnout(t) => t.as_str(),
            DeviceState::Signal(s) => s.as_str(),
        }
    }
}

impl From<SectionState> for DeviceState {
    fn from(s: SectionState) -> Self {
        DeviceState::Section(s)
    }
}

impl From<TurnoutState> for DeviceState {
    fn from(t: TurnoutState) -> Self {
        DeviceState::Turnout(t)
    }
}

impl From<SignalState> for DeviceState {
    fn from(s: SignalState) -> Self {
        DeviceState::Signal(s)
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Commands
// ============================================================================

/// A commanded target state for one device.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceCommand<S> {
    /// Device id.
    pub id: String,
    /// Target state.
    pub state: S,
}

impl<S> DeviceCommand<S> {
    /// Create a command for `id` to reach `state`.
    pub fn new(id: impl Into<String>, state: S) -> Self {
        Self {
            id: id.into(),
            state,
        }
    }
}

/// Command for a section.
pub type SectionCommand = DeviceCommand<SectionState>;
/// Command for a turnout.
pub type TurnoutCommand = DeviceCommand<TurnoutState>;
/// Command for a signal.
pub type SignalCommand = DeviceCommand<SignalState>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn section_from_text() {
        assert_eq!(SectionState::from_text("FREE"), SectionState::Free);
        assert_eq!(SectionState::from_text("occupied"), SectionState::Occupied);
        assert_eq!(SectionState::from_text(" Locked "), SectionState::Locked);
        assert_eq!(SectionState::from_text("???"), SectionState::Unknown);
    }

    #[test]
    fn turnout_from_text() {
        assert_eq!(TurnoutState::from_text("NORMAL"), TurnoutState::Normal);
        assert_eq!(TurnoutState::from_text("REVERSED"), TurnoutState::Reversed);
        assert_eq!(TurnoutState::from_text(""), TurnoutState::Unknown);
    }

    #[test]
    fn signal_from_text_codes_and_names() {
        assert_eq!(SignalState::from_text("H"), SignalState::Red);
        assert_eq!(SignalState::from_text("A"), SignalState::Blue);
        assert_eq!(SignalState::from_text("green"), SignalState::Green);
        assert_eq!(SignalState::from_text("h"), SignalState::Unknown);
    }

    #[test]
    fn signal_abnormal() {
        assert!(SignalState::Broken.is_abnormal());
        assert!(SignalState::Unknown.is_abnormal());
        assert!(!SignalState::Red.is_abnormal());
        assert!(!SignalState::Blue.is_abnormal());
    }

    #[test]
    fn device_state_class_and_broken() {
        let s: DeviceState = TurnoutState::Broken.into();
        assert_eq!(s.class(), DeviceClass::Turnout);
        assert!(s.is_broken());
        assert!(!DeviceState::from(SectionState::Locked).is_broken());
    }

    #[test]
    fn device_state_serializes_as_inner_name() {
        let json = serde_json::to_string(&DeviceState::Signal(SignalState::DoubleYellow)).unwrap();
        assert_eq!(json, "\"double_yellow\"");
    }

    #[test]
    fn class_keys_match_io_document() {
        assert_eq!(DeviceClass::Section.as_str(), "sections");
        assert_eq!(DeviceClass::Turnout.to_string(), "turnouts");
    }
}
