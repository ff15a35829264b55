use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The semantic category of a countdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Focus,
    ShortBreak,
    LongBreak,
}

/// What ended the previous phase; rotation differs between the two.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    /// The countdown reached zero.
    Natural,
    /// The user skipped ahead.
    Skip,
}

impl Phase {
    pub const ALL: [Phase; 3] = [Phase::Focus, Phase::ShortBreak, Phase::LongBreak];

    /// Storage/wire name, matching the serde representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Focus => "FOCUS",
            Phase::ShortBreak => "SHORT_BREAK",
            Phase::LongBreak => "LONG_BREAK",
        }
    }

    /// Human-facing label.
    pub fn label(self) -> &'static str {
        match self {
            Phase::Focus => "Focus",
            Phase::ShortBreak => "Short Break",
            Phase::LongBreak => "Long Break",
        }
    }

    /// Next phase after `self` ends.
    ///
    /// `completed_focus_count` is the count *after* any increment for the
    /// phase that just finished; `long_break_interval` must be non-zero.
    pub fn next(self, rotation: Rotation, completed_focus_count: u32, long_break_interval: u32) -> Phase {
        match (self, rotation) {
            (Phase::Focus, Rotation::Natural) => {
                if completed_focus_count % long_break_interval.max(1) == 0 {
                    Phase::LongBreak
                } else {
                    Phase::ShortBreak
                }
            }
            (Phase::Focus, Rotation::Skip) => Phase::ShortBreak,
            (Phase::ShortBreak | Phase::LongBreak, _) => Phase::Focus,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().replace('-', "_").as_str() {
            "FOCUS" => Ok(Phase::Focus),
            "SHORT_BREAK" => Ok(Phase::ShortBreak),
            "LONG_BREAK" => Ok(Phase::LongBreak),
            other => Err(format!("unknown phase: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn natural_focus_rotation_follows_interval() {
        assert_eq!(Phase::Focus.next(Rotation::Natural, 1, 4), Phase::ShortBreak);
        assert_eq!(Phase::Focus.next(Rotation::Natural, 3, 4), Phase::ShortBreak);
        assert_eq!(Phase::Focus.next(Rotation::Natural, 4, 4), Phase::LongBreak);
        assert_eq!(Phase::Focus.next(Rotation::Natural, 8, 4), Phase::LongBreak);
    }

    #[test]
    fn skip_from_focus_is_always_short_break() {
        assert_eq!(Phase::Focus.next(Rotation::Skip, 4, 4), Phase::ShortBreak);
        assert_eq!(Phase::Focus.next(Rotation::Skip, 0, 1), Phase::ShortBreak);
    }

    #[test]
    fn breaks_return_to_focus() {
        for rotation in [Rotation::Natural, Rotation::Skip] {
            assert_eq!(Phase::ShortBreak.next(rotation, 2, 4), Phase::Focus);
            assert_eq!(Phase::LongBreak.next(rotation, 4, 4), Phase::Focus);
        }
    }

    #[test]
    fn zero_interval_does_not_panic() {
        assert_eq!(Phase::Focus.next(Rotation::Natural, 3, 0), Phase::LongBreak);
    }

    #[test]
    fn parses_storage_names() {
        for phase in Phase::ALL {
            assert_eq!(phase.as_str().parse::<Phase>().unwrap(), phase);
        }
        assert_eq!("short-break".parse::<Phase>().unwrap(), Phase::ShortBreak);
        assert!("nap".parse::<Phase>().is_err());
    }

    #[test]
    fn serde_uses_screaming_snake_case() {
        let json = serde_json::to_string(&Phase::LongBreak).unwrap();
        assert_eq!(json, "\"LONG_BREAK\"");
    }
}
