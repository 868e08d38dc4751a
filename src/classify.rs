//! HID report classification
//!
//! Two decoding strategies are in use:
//!
//! - **Exact prefix tables** ([`PatternTable`]) for the shutter pedals. Each
//!   press sends one distinct byte pattern, so the first `prefix_len` bytes of
//!   a report are looked up verbatim.
//! - **Field decode** ([`decode_joystick`]) for the twin-USB joystick. The
//!   report streams continuously; bytes 5 and 6 carry the button state and a
//!   fixed pair means "nothing pressed".
//!
//! Neither strategy ever fails: short, malformed or unknown reports simply
//! classify as "no action".

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::effects::ActionCode;
use crate::hid::MAX_REPORT_LEN;

/// Errors building a pattern table from configuration
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PatternError {
    #[error("pattern table is empty")]
    Empty,

    #[error("pattern length must be 1..={max}, got {len}")]
    BadLength { len: usize, max: usize },

    #[error("pattern {pattern:?} is {found} bytes, table uses {expected}")]
    LengthMismatch {
        pattern: Vec<u8>,
        expected: usize,
        found: usize,
    },

    #[error("pattern {0:?} is listed twice")]
    Duplicate(Vec<u8>),
}

/// Exact-prefix lookup table: report prefix → action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternTable {
    prefix_len: usize,
    entries: BTreeMap<Vec<u8>, ActionCode>,
}

impl PatternTable {
    /// Build a table; every pattern must have the same length
    pub fn from_entries<I>(entries: I) -> Result<Self, PatternError>
    where
        I: IntoIterator<Item = (Vec<u8>, ActionCode)>,
    {
        let mut iter = entries.into_iter().peekable();
        let prefix_len = iter.peek().map(|(p, _)| p.len()).ok_or(PatternError::Empty)?;
        if prefix_len == 0 || prefix_len > MAX_REPORT_LEN {
            return Err(PatternError::BadLength {
                len: prefix_len,
                max: MAX_REPORT_LEN,
            });
        }

        let mut table = BTreeMap::new();
        for (pattern, action) in iter {
            if pattern.len() != prefix_len {
                return Err(PatternError::LengthMismatch {
                    found: pattern.len(),
                    expected: prefix_len,
                    pattern,
                });
            }
            if table.contains_key(&pattern) {
                return Err(PatternError::Duplicate(pattern));
            }
            table.insert(pattern, action);
        }

        Ok(Self {
            prefix_len,
            entries: table,
        })
    }

    /// AB Shutter3 style remote: two buttons, 3-byte reports
    pub fn shutter_ab() -> Self {
        Self::preset(&[([1, 1, 0], "a"), ([1, 2, 0], "b")])
    }

    /// M3 remote: six buttons, 4-byte reports
    pub fn shutter_m3() -> Self {
        Self::preset(&[
            ([5, 60, 192, 3], "5"),   // down
            ([5, 60, 64, 252], "4"),  // up
            ([5, 40, 0, 5], "a"),     // left
            ([5, 216, 15, 5], "b"),   // right
            ([5, 60, 128, 248], "1"), // like
            ([5, 61, 224, 252], "2"), // camera
        ])
    }

    /// Single-button shutter; its one pattern drives `action`
    pub fn shutter_single(action: ActionCode) -> Self {
        Self {
            prefix_len: 3,
            entries: BTreeMap::from([(vec![2, 2, 0], action)]),
        }
    }

    fn preset<const N: usize>(entries: &[([u8; N], &str)]) -> Self {
        Self {
            prefix_len: N,
            entries: entries
                .iter()
                .map(|(pattern, code)| (pattern.to_vec(), ActionCode::from(*code)))
                .collect(),
        }
    }

    /// Classify a report by its first `prefix_len` bytes
    pub fn classify(&self, report: &[u8]) -> Option<&ActionCode> {
        report
            .get(..self.prefix_len)
            .and_then(|prefix| self.entries.get(prefix))
    }

    pub fn prefix_len(&self) -> usize {
        self.prefix_len
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&[u8], &ActionCode)> {
        self.entries.iter().map(|(p, a)| (p.as_slice(), a))
    }
}

/// Buttons of the twin-USB joystick, by their pad label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum JoystickButton {
    #[serde(rename = "X")]
    Cross,
    #[serde(rename = "SQUARE")]
    Square,
    #[serde(rename = "CIRCLE")]
    Circle,
    #[serde(rename = "TRIANGLE")]
    Triangle,
    R1,
    R2,
    L1,
    L2,
    #[serde(rename = "SELECT")]
    Select,
    #[serde(rename = "START")]
    Start,
}

impl JoystickButton {
    pub const ALL: [JoystickButton; 10] = [
        JoystickButton::Cross,
        JoystickButton::Square,
        JoystickButton::Circle,
        JoystickButton::Triangle,
        JoystickButton::R1,
        JoystickButton::R2,
        JoystickButton::L1,
        JoystickButton::L2,
        JoystickButton::Select,
        JoystickButton::Start,
    ];

    /// Bytes 5 and 6 of a report while this button is held
    pub fn state(self) -> (u8, u8) {
        match self {
            // Face buttons set the high nibble of byte 5
            JoystickButton::Cross => (79, 0),
            JoystickButton::Square => (143, 0),
            JoystickButton::Circle => (47, 0),
            JoystickButton::Triangle => (31, 0),
            // Shoulder/menu buttons leave byte 5 idle and set a bit in byte 6
            JoystickButton::R1 => (15, 8),
            JoystickButton::R2 => (15, 2),
            JoystickButton::L1 => (15, 4),
            JoystickButton::L2 => (15, 1),
            JoystickButton::Select => (15, 16),
            JoystickButton::Start => (15, 32),
        }
    }

    pub fn from_state(state: (u8, u8)) -> Option<Self> {
        Self::ALL.into_iter().find(|b| b.state() == state)
    }

    /// Label as printed on the pad
    pub fn label(self) -> &'static str {
        match self {
            JoystickButton::Cross => "X",
            JoystickButton::Square => "SQUARE",
            JoystickButton::Circle => "CIRCLE",
            JoystickButton::Triangle => "TRIANGLE",
            JoystickButton::R1 => "R1",
            JoystickButton::R2 => "R2",
            JoystickButton::L1 => "L1",
            JoystickButton::L2 => "L2",
            JoystickButton::Select => "SELECT",
            JoystickButton::Start => "START",
        }
    }

    /// Factory mapping from buttons to the default command table
    pub fn default_actions() -> BTreeMap<JoystickButton, ActionCode> {
        [
            (JoystickButton::Cross, "1"),
            (JoystickButton::Square, "2"),
            (JoystickButton::Circle, "3"),
            (JoystickButton::Triangle, "4"),
            (JoystickButton::R1, "5"),
            (JoystickButton::R2, "6"),
            (JoystickButton::L1, "7"),
            (JoystickButton::L2, "8"),
            (JoystickButton::Select, "a"),
            (JoystickButton::Start, "b"),
        ]
        .into_iter()
        .map(|(button, code)| (button, ActionCode::from(code)))
        .collect()
    }
}

/// First byte of every joystick data report
pub const JOYSTICK_REPORT_MARKER: u8 = 1;
/// Shortest joystick report carrying the button bytes
pub const JOYSTICK_MIN_REPORT_LEN: usize = 8;
/// Button bytes while nothing is pressed
pub const JOYSTICK_IDLE_STATE: (u8, u8) = (15, 0);

/// What a joystick report says about the buttons
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoystickReading {
    Idle,
    Pressed(JoystickButton),
    /// Valid report, but the button bytes match nothing known (chords, axes noise)
    Unrecognized((u8, u8)),
}

/// Decode a joystick report; `None` if it is too short or not a data report
pub fn decode_joystick(report: &[u8]) -> Option<JoystickReading> {
    if report.len() < JOYSTICK_MIN_REPORT_LEN || report[0] != JOYSTICK_REPORT_MARKER {
        return None;
    }

    let state = (report[5], report[6]);
    if state == JOYSTICK_IDLE_STATE {
        return Some(JoystickReading::Idle);
    }

    Some(match JoystickButton::from_state(state) {
        Some(button) => JoystickReading::Pressed(button),
        None => JoystickReading::Unrecognized(state),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn joystick_report(state: (u8, u8)) -> Vec<u8> {
        vec![1, 128, 128, 127, 127, state.0, state.1, 0]
    }

    #[test]
    fn test_m3_table_exact_match() {
        let table = PatternTable::shutter_m3();
        assert_eq!(table.prefix_len(), 4);
        assert_eq!(table.len(), 6);
        assert_eq!(table.classify(&[5, 60, 192, 3]), Some(&ActionCode::from("5")));
        assert_eq!(table.classify(&[5, 61, 224, 252]), Some(&ActionCode::from("2")));
        assert_eq!(table.classify(&[5, 60, 192, 4]), None);
    }

    #[test]
    fn test_prefix_match_ignores_trailing_bytes() {
        let table = PatternTable::shutter_m3();
        assert_eq!(
            table.classify(&[5, 40, 0, 5, 99, 99, 0, 0]),
            Some(&ActionCode::from("a"))
        );
    }

    #[test]
    fn test_short_report_never_matches() {
        let table = PatternTable::shutter_m3();
        assert_eq!(table.classify(&[5, 60, 192]), None);
        assert_eq!(table.classify(&[]), None);
    }

    #[test]
    fn test_ab_table() {
        let table = PatternTable::shutter_ab();
        assert_eq!(table.prefix_len(), 3);
        assert_eq!(table.classify(&[1, 1, 0]), Some(&ActionCode::from("a")));
        assert_eq!(table.classify(&[1, 2, 0]), Some(&ActionCode::from("b")));
        // Release report
        assert_eq!(table.classify(&[1, 0, 0]), None);
    }

    #[test]
    fn test_single_table() {
        let table = PatternTable::shutter_single(ActionCode::from("c"));
        assert_eq!(table.classify(&[2, 2, 0]), Some(&ActionCode::from("c")));
        assert_eq!(table.classify(&[2, 0, 0]), None);
    }

    #[test]
    fn test_from_entries_validation() {
        assert_eq!(PatternTable::from_entries(Vec::new()), Err(PatternError::Empty));

        let mismatch = PatternTable::from_entries(vec![
            (vec![1, 2, 3, 4], ActionCode::from("1")),
            (vec![1, 2, 3], ActionCode::from("2")),
        ]);
        assert!(matches!(
            mismatch,
            Err(PatternError::LengthMismatch {
                expected: 4,
                found: 3,
                ..
            })
        ));

        let duplicate = PatternTable::from_entries(vec![
            (vec![9, 9, 9, 9], ActionCode::from("1")),
            (vec![9, 9, 9, 9], ActionCode::from("2")),
        ]);
        assert_eq!(duplicate, Err(PatternError::Duplicate(vec![9, 9, 9, 9])));

        let zero = PatternTable::from_entries(vec![(vec![], ActionCode::from("1"))]);
        assert!(matches!(zero, Err(PatternError::BadLength { len: 0, .. })));
    }

    #[test]
    fn test_custom_table_from_entries() {
        let table = PatternTable::from_entries(vec![
            (vec![3, 10, 0, 1], ActionCode::from("6")),
            (vec![3, 10, 0, 2], ActionCode::from("7")),
        ])
        .unwrap();
        assert_eq!(table.prefix_len(), 4);
        assert_eq!(table.classify(&[3, 10, 0, 2]), Some(&ActionCode::from("7")));
    }

    #[test]
    fn test_joystick_all_buttons() {
        let expected = [
            ((79, 0), JoystickButton::Cross),
            ((143, 0), JoystickButton::Square),
            ((47, 0), JoystickButton::Circle),
            ((31, 0), JoystickButton::Triangle),
            ((15, 8), JoystickButton::R1),
            ((15, 2), JoystickButton::R2),
            ((15, 4), JoystickButton::L1),
            ((15, 1), JoystickButton::L2),
            ((15, 16), JoystickButton::Select),
            ((15, 32), JoystickButton::Start),
        ];
        for (state, button) in expected {
            assert_eq!(
                decode_joystick(&joystick_report(state)),
                Some(JoystickReading::Pressed(button)),
                "state {:?}",
                state
            );
        }
    }

    #[test]
    fn test_joystick_idle_and_unrecognized() {
        assert_eq!(decode_joystick(&joystick_report((15, 0))), Some(JoystickReading::Idle));
        assert_eq!(
            decode_joystick(&joystick_report((15, 12))),
            Some(JoystickReading::Unrecognized((15, 12)))
        );
    }

    #[test]
    fn test_default_actions_cover_every_button() {
        let actions = JoystickButton::default_actions();
        assert_eq!(actions.len(), JoystickButton::ALL.len());
        assert_eq!(actions[&JoystickButton::Start], ActionCode::from("b"));
    }

    #[test]
    fn test_button_labels_round_trip_through_serde() {
        let parsed: JoystickButton = serde_yaml::from_str("SQUARE").unwrap();
        assert_eq!(parsed, JoystickButton::Square);
        assert_eq!(parsed.label(), "SQUARE");
        assert!(serde_yaml::from_str::<JoystickButton>("TRIGGER").is_err());
    }

    proptest! {
        #[test]
        fn prop_short_joystick_reports_rejected(report in proptest::collection::vec(any::<u8>(), 0..8)) {
            prop_assert_eq!(decode_joystick(&report), None);
        }

        #[test]
        fn prop_wrong_marker_rejected(
            marker in any::<u8>().prop_filter("not the data marker", |m| *m != JOYSTICK_REPORT_MARKER),
            rest in proptest::collection::vec(any::<u8>(), 7..64),
        ) {
            let mut report = vec![marker];
            report.extend(rest);
            prop_assert_eq!(decode_joystick(&report), None);
        }

        #[test]
        fn prop_non_table_prefix_never_matches(prefix in proptest::array::uniform4(any::<u8>())) {
            let table = PatternTable::shutter_m3();
            let known = table.iter().any(|(p, _)| p == prefix.as_slice());
            prop_assert_eq!(table.classify(&prefix).is_some(), known);
        }
    }
}
