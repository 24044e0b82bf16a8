//! Decoders for the compact device tokens used in the interlock table.
//!
//! # Turnout tokens
//!
//! | Token | Commands |
//! |-------|----------|
//! | `5` | 5 Normal |
//! | `(5)` | 5 Reversed |
//! | `5/7` | 5 Normal, 7 Normal |
//! | `(5/7)` | 5 Reversed, 7 Reversed |
//!
//! Ids are non-empty runs of ASCII digits. A paired token (`N/M`) names the two
//! ends of a crossover, which always move together.
//!
//! # Signal tokens
//!
//! A set token is `<id>-<aspect code>` where the code is one of `H`, `U`,
//! `UU`, `L`, `B` (see [`SignalState::from_aspect_code`]). When a route is
//! cancelled only the id matters: shunting signals (`D` followed by digits)
//! go to [`SignalState::Blue`], every other signal goes to Red.
//!
//! # Example
//!
//! ```rust
//! use rs_interlock::parsing::{parse_turnout, parse_signal};
//! use rs_interlock::devices::{SignalState, TurnoutState};
//!
//! let cmds = parse_turnout("(5/7)").unwrap();
//! assert_eq!(cmds.len(), 2);
//! assert!(cmds.iter().all(|c| c.state == TurnoutState::Reversed));
//!
//! let sig = parse_signal("S3-UU").unwrap();
//! assert_eq!((sig.id.as_str(), sig.state), ("S3", SignalState::DoubleYellow));
//! ```

use crate::devices::{
    SectionCommand, SectionState, SignalCommand, SignalState, TurnoutCommand, TurnoutState,
};
use crate::error::ParseError;

/// Commands decoded from one turnout token (one or two).
pub type TurnoutCommands = heapless::Vec<TurnoutCommand, 2>;

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// Split a turnout token into its ids and whether it was bracketed.
fn split_turnout(token: &str) -> Result<(heapless::Vec<&str, 2>, bool), ParseError> {
    let (body, reversed) = match token.strip_prefix('(').and_then(|t| t.strip_suffix(')')) {
        Some(inner) => (inner, true),
        None => (token, false),
    };

    let ids: heapless::Vec<&str, 2> = match body.split_once('/') {
        None if is_digits(body) => [body].into_iter().collect(),
        Some((a, b)) if is_digits(a) && is_digits(b) => [a, b].into_iter().collect(),
        _ => return Err(ParseError::Turnout(token.to_string())),
    };
    Ok((ids, reversed))
}

fn turnout_commands(ids: &[&str], state: TurnoutState) -> TurnoutCommands {
    ids.iter()
        .take(2)
        .map(|id| TurnoutCommand::new(*id, state))
        .collect()
}

/// Decode a turnout token for route setting: bracketed ids go Reversed.
pub fn parse_turnout(token: &str) -> Result<TurnoutCommands, ParseError> {
    let (ids, reversed) = split_turnout(token)?;
    let state = if reversed {
        TurnoutState::Reversed
    } else {
        TurnoutState::Normal
    };
    Ok(turnout_commands(&ids, state))
}

/// Decode a turnout token for route cancellation: every id goes Normal.
pub fn parse_normal_turnout(token: &str) -> Result<TurnoutCommands, ParseError> {
    let (ids, _) = split_turnout(token)?;
    Ok(turnout_commands(&ids, TurnoutState::Normal))
}

/// Decode a signal set token `<id>-<aspect code>`.
pub fn parse_signal(token: &str) -> Result<SignalCommand, ParseError> {
    let (id, code) = token
        .split_once('-')
        .filter(|(id, _)| !id.is_empty())
        .ok_or_else(|| ParseError::Signal(token.to_string()))?;
    let state = SignalState::from_aspect_code(code).ok_or_else(|| ParseError::Aspect {
        token: token.to_string(),
        code: code.to_string(),
    })?;
    Ok(SignalCommand::new(id, state))
}

/// True for shunting signal ids: `D` followed by digits.
pub fn is_shunting_signal(id: &str) -> bool {
    id.strip_prefix('D').is_some_and(is_digits)
}

/// Decode a signal token for route cancellation. The aspect part is ignored.
pub fn parse_abort_signal(token: &str) -> Result<SignalCommand, ParseError> {
    let id = token.split_once('-').map_or(token, |(id, _)| id);
    if id.is_empty() {
        return Err(ParseError::Signal(token.to_string()));
    }
    let state = if is_shunting_signal(id) {
        SignalState::Blue
    } else {
        SignalState::Red
    };
    Ok(SignalCommand::new(id, state))
}

/// A section token is a bare id; the target state comes from the caller.
pub fn parse_section(token: &str, state: SectionState) -> SectionCommand {
    SectionCommand::new(token, state)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(cmds: &TurnoutCommands) -> Vec<(&str, TurnoutState)> {
        cmds.iter().map(|c| (c.id.as_str(), c.state)).collect()
    }

    // =========================================================================
    // Turnouts
    // =========================================================================

    #[test]
    fn turnout_single_normal() {
        let cmds = parse_turnout("5").unwrap();
        assert_eq!(pairs(&cmds), vec![("5", TurnoutState::Normal)]);
    }

    #[test]
    fn turnout_single_reversed() {
        let cmds = parse_turnout("(5)").unwrap();
        assert_eq!(pairs(&cmds), vec![("5", TurnoutState::Reversed)]);
    }

    #[test]
    fn turnout_pair_normal() {
        let cmds = parse_turnout("5/6").unwrap();
        assert_eq!(
            pairs(&cmds),
            vec![("5", TurnoutState::Normal), ("6", TurnoutState::Normal)]
        );
    }

    #[test]
    fn turnout_pair_reversed() {
        let cmds = parse_turnout("(5/6)").unwrap();
        assert_eq!(
            pairs(&cmds),
            vec![("5", TurnoutState::Reversed), ("6", TurnoutState::Reversed)]
        );
    }

    #[test]
    fn turnout_multi_digit_ids() {
        let cmds = parse_turnout("(13/15)").unwrap();
        assert_eq!(cmds[0].id, "13");
        assert_eq!(cmds[1].id, "15");
    }

    #[test]
    fn turnout_rejects_garbage() {
        for token in ["abc", "", "()", "(5", "5)", "5/", "/5", "5/6/7", "((5))", "5a", "( 5 )"] {
            assert_eq!(
                parse_turnout(token),
                Err(ParseError::Turnout(token.to_string())),
                "token {:?}",
                token
            );
        }
    }

    #[test]
    fn normal_turnout_ignores_brackets() {
        let cmds = parse_normal_turnout("(5/6)").unwrap();
        assert_eq!(
            pairs(&cmds),
            vec![("5", TurnoutState::Normal), ("6", TurnoutState::Normal)]
        );
        let cmds = parse_normal_turnout("(9)").unwrap();
        assert_eq!(pairs(&cmds), vec![("9", TurnoutState::Normal)]);
        assert!(parse_normal_turnout("x").is_err());
    }

    // =========================================================================
    // Signals
    // =========================================================================

    #[test]
    fn signal_aspect_codes() {
        let cases = [
            ("X-H", SignalState::Red),
            ("X-U", SignalState::Yellow),
            ("X-UU", SignalState::DoubleYellow),
            ("X-L", SignalState::Green),
            ("X-B", SignalState::White),
        ];
        for (token, state) in cases {
            assert_eq!(parse_signal(token).unwrap(), SignalCommand::new("X", state));
        }
    }

    #[test]
    fn signal_without_dash_is_error() {
        assert_eq!(parse_signal("X"), Err(ParseError::Signal("X".into())));
        assert_eq!(parse_signal("-L"), Err(ParseError::Signal("-L".into())));
    }

    #[test]
    fn signal_unknown_aspect_is_error() {
        assert_eq!(
            parse_signal("S3-Q"),
            Err(ParseError::Aspect {
                token: "S3-Q".into(),
                code: "Q".into()
            })
        );
    }

    #[test]
    fn abort_signal_mapping() {
        assert_eq!(
            parse_abort_signal("D12-B").unwrap(),
            SignalCommand::new("D12", SignalState::Blue)
        );
        assert_eq!(
            parse_abort_signal("X-L").unwrap(),
            SignalCommand::new("X", SignalState::Red)
        );
        assert_eq!(
            parse_abort_signal("S3").unwrap(),
            SignalCommand::new("S3", SignalState::Red)
        );
        assert!(parse_abort_signal("-H").is_err());
    }

    #[test]
    fn shunting_pattern() {
        assert!(is_shunting_signal("D1"));
        assert!(is_shunting_signal("D205"));
        assert!(!is_shunting_signal("D"));
        assert!(!is_shunting_signal("DA"));
        assert!(!is_shunting_signal("XD1"));
        assert!(!is_shunting_signal("d1"));
    }

    #[test]
    fn section_uses_caller_state() {
        assert_eq!(
            parse_section("3G", SectionState::Locked),
            SectionCommand::new("3G", SectionState::Locked)
        );
    }
}
