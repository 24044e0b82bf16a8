//! Error types for route operations and token parsing.
//!
//! Route operations never fail fast on the first broken rule. They collect
//! every [`Violation`] into a [`Violations`] report and return it inside
//! [`InterlockError::Rejected`], so the caller sees the whole picture in one
//! response.
//!
//! | Kind | Raised by | Side effects |
//! |------|-----------|--------------|
//! | [`ErrorKind::Validation`] | admission/cancellation rules | none |
//! | [`ErrorKind::NotFound`] | unknown route id or buttons | none |
//! | [`ErrorKind::DeviceTimeout`] | actuation deadline exceeded | devices marked Broken |
//! | [`ErrorKind::DeviceAbnormal`] | signal Broken/Unknown before command | none |
//! | [`ErrorKind::Parse`] | malformed device token | none |
//!
//! # Example
//!
//! ```rust
//! use rs_interlock::error::{ErrorKind, Violation, Violations};
//!
//! let mut report = Violations::new();
//! report.push(Violation::SectionsNotFree { sections: vec!["3G".into()] });
//! report.push(Violation::LivingEnemies { routes: vec!["X-S3".into()] });
//!
//! assert_eq!(report.kind(), ErrorKind::Validation);
//! assert_eq!(
//!     report.to_string(),
//!     "sections not free: 3G; exist living enemies: X-S3"
//! );
//! ```

use core::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::devices::DeviceClass;

/// Coarse classification of an error, for mapping onto transport status codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// One or more admission/cancellation rules violated.
    Validation,
    /// Unknown route id or button combination.
    NotFound,
    /// A commanded device did not converge before the deadline.
    DeviceTimeout,
    /// A device was Broken/Unknown before being commanded.
    DeviceAbnormal,
    /// A device token could not be decoded.
    Parse,
}

// ============================================================================
// Violations
// ============================================================================

/// A single broken rule, with the offending ids.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum Violation {
    /// The route is already alive.
    LivingRoute {
        /// Route id.
        route: String,
    },
    /// Another admission or cancellation of this route is in flight.
    PendingRoute {
        /// Route id.
        route: String,
    },
    /// Cancellation of a route that is not alive.
    NotLivingRoute {
        /// Route id.
        route: String,
    },
    /// Enemy routes are alive.
    LivingEnemies {
        /// Alive enemy route ids.
        routes: Vec<String>,
    },
    /// Conflict routes are alive.
    LivingConflicts {
        /// Alive conflict route ids.
        routes: Vec<String>,
    },
    /// Sections that must be Free are not.
    SectionsNotFree {
        /// Offending section ids.
        sections: Vec<String>,
    },
    /// Sections that must be Locked are not.
    SectionsNotLocked {
        /// Offending section ids.
        sections: Vec<String>,
    },
    /// Signals were Broken or Unknown when they were about to be commanded.
    SignalsAbnormal {
        /// Offending signal ids.
        signals: Vec<String>,
    },
    /// Devices did not reach their commanded state before the deadline.
    ActuationTimeout {
        /// Device class.
        class: DeviceClass,
        /// Ids of the devices now marked Broken.
        devices: Vec<String>,
    },
}

impl Violation {
    /// Classification of this violation.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Violation::ActuationTimeout { .. } => ErrorKind::DeviceTimeout,
            Violation::SignalsAbnormal { .. } => ErrorKind::DeviceAbnormal,
            _ => ErrorKind::Validation,
        }
    }

    /// Ids named by this violation.
    pub fn ids(&self) -> &[String] {
        match self {
            Violation::LivingRoute { route }
            | Violation::PendingRoute { route }
            | Violation::NotLivingRoute { route } => core::slice::from_ref(route),
            Violation::LivingEnemies { routes } | Violation::LivingConflicts { routes } => routes,
            Violation::SectionsNotFree { sections } | Violation::SectionsNotLocked { sections } => {
                sections
            }
            Violation::SignalsAbnormal { signals } => signals,
            Violation::ActuationTimeout { devices, .. } => devices,
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = match self {
            Violation::LivingRoute { .. } => "exist living route",
            Violation::PendingRoute { .. } => "route operation pending",
            Violation::NotLivingRoute { .. } => "not found living route",
            Violation::LivingEnemies { .. } => "exist living enemies",
            Violation::LivingConflicts { .. } => "exist living conflicts",
            Violation::SectionsNotFree { .. } => "sections not free",
            Violation::SectionsNotLocked { .. } => "sections not locked",
            Violation::SignalsAbnormal { .. } => "signal state abnormal",
            Violation::ActuationTimeout { class, .. } => {
                return write!(f, "{} action timeout: {}", class, self.ids().join(", "));
            }
        };
        write!(f, "{}: {}", rule, self.ids().join(", "))
    }
}

/// Every violation collected by one route operation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Violations(Vec<Violation>);

impl Violations {
    /// Empty report.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a violation.
    pub fn push(&mut self, violation: Violation) {
        self.0.push(violation);
    }

    /// Append all violations of another report.
    pub fn extend(&mut self, other: Violations) {
        self.0.extend(other.0);
    }

    /// True if nothing was violated.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of violations.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterate over violations.
    pub fn iter(&self) -> core::slice::Iter<'_, Violation> {
        self.0.iter()
    }

    /// Most severe classification in the report.
    ///
    /// A timeout outranks an abnormal device, which outranks plain validation.
    pub fn kind(&self) -> ErrorKind {
        let kinds: Vec<ErrorKind> = self.0.iter().map(Violation::kind).collect();
        if kinds.contains(&ErrorKind::DeviceTimeout) {
            ErrorKind::DeviceTimeout
        } else if kinds.contains(&ErrorKind::DeviceAbnormal) {
            ErrorKind::DeviceAbnormal
        } else {
            ErrorKind::Validation
        }
    }

    /// `Ok(())` if empty, otherwise the report as a rejection.
    pub fn into_result(self) -> Result<(), InterlockError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(InterlockError::Rejected(self))
        }
    }

    /// JSON payload for transport layers.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{:?}", self.to_string()))
    }
}

impl fmt::Display for Violations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, v) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}", v)?;
        }
        Ok(())
    }
}

impl From<Violation> for Violations {
    fn from(v: Violation) -> Self {
        Self(vec![v])
    }
}

impl<'a> IntoIterator for &'a Violations {
    type Item = &'a Violation;
    type IntoIter = core::slice::Iter<'a, Violation>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

// ============================================================================
// Errors
// ============================================================================

/// A device token that could not be decoded.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ParseError {
    /// Turnout token matches none of `N`, `(N)`, `N/M`, `(N/M)`.
    #[error("cannot match any turnout pattern: {0:?}")]
    Turnout(String),
    /// Signal token has no `<id>-` prefix.
    #[error("malformed signal token: {0:?}")]
    Signal(String),
    /// Signal token names an unknown aspect code.
    #[error("unknown aspect code {code:?} in signal token {token:?}")]
    Aspect {
        /// Whole token.
        token: String,
        /// Offending aspect code.
        code: String,
    },
}

/// Error returned by route operations and lookups.
#[derive(Debug, Error)]
pub enum InterlockError {
    /// One or more rules violated; carries the full report.
    #[error("route rejected: {0}")]
    Rejected(Violations),
    /// No route with this id.
    #[error("no such route: {0}")]
    RouteNotFound(String),
    /// No route is entered by this button sequence.
    #[error("no route for buttons [{}]", .0.join(", "))]
    ButtonsNotFound(Vec<String>),
    /// A device token in the interlock table is malformed.
    #[error(transparent)]
    Parse(#[from] ParseError),
}

impl InterlockError {
    /// Classification for transport status mapping.
    pub fn kind(&self) -> ErrorKind {
        match self {
            InterlockError::Rejected(v) => v.kind(),
            InterlockError::RouteNotFound(_) | InterlockError::ButtonsNotFound(_) => {
                ErrorKind::NotFound
            }
            InterlockError::Parse(_) => ErrorKind::Parse,
        }
    }

    /// The violation report, if this is a rejection.
    pub fn violations(&self) -> Option<&Violations> {
        match self {
            InterlockError::Rejected(v) => Some(v),
            _ => None,
        }
    }

    /// True if the report contains a violation matching `pred`.
    pub fn has_violation(&self, pred: impl Fn(&Violation) -> bool) -> bool {
        self.violations().is_some_and(|v| v.iter().any(pred))
    }
}

impl From<Violations> for InterlockError {
    fn from(v: Violations) -> Self {
        InterlockError::Rejected(v)
    }
}
