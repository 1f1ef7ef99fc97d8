use serde::{Deserialize, Serialize};
use std::fmt;

/// Pipeline states, numbered like the engine's native state enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(i32)]
pub enum PipelineState {
    /// Error or transitional sentinel.
    Unknown = 0,
    Null = 1,
    Ready = 2,
    Paused = 3,
    Playing = 4,
}

impl PipelineState {
    pub fn from_i32(value: i32) -> Self {
        match value {
            1 => Self::Null,
            2 => Self::Ready,
            3 => Self::Paused,
            4 => Self::Playing,
            _ => Self::Unknown,
        }
    }

    /// Check if a single step from this state to `target` is valid.
    pub fn can_transition_to(&self, target: &PipelineState) -> bool {
        use PipelineState::*;

        matches!(
            (self, target),
            (Null, Ready)
                | (Ready, Paused)
                | (Ready, Null)
                | (Paused, Playing)
                | (Paused, Ready)
                | (Playing, Paused)
                // Any live state can fail
                | (Null | Ready | Paused | Playing, Unknown)
        )
    }

    /// The intermediate states walked from `self` to `target`, excluding
    /// `self` and including `target`.
    pub fn steps_to(&self, target: PipelineState) -> Vec<PipelineState> {
        if *self == PipelineState::Unknown || target == PipelineState::Unknown {
            return Vec::new();
        }
        let (from, to) = (*self as i32, target as i32);
        if from < to {
            ((from + 1)..=to).map(Self::from_i32).collect()
        } else {
            (to..from).rev().map(Self::from_i32).collect()
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Unknown => "UNKNOWN",
            Self::Null => "NULL",
            Self::Ready => "READY",
            Self::Paused => "PAUSED",
            Self::Playing => "PLAYING",
        }
    }
}

impl Default for PipelineState {
    fn default() -> Self {
        Self::Null
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_transitions() {
        assert!(PipelineState::Null.can_transition_to(&PipelineState::Ready));
        assert!(PipelineState::Playing.can_transition_to(&PipelineState::Paused));
        assert!(!PipelineState::Null.can_transition_to(&PipelineState::Playing));
        assert!(!PipelineState::Unknown.can_transition_to(&PipelineState::Ready));
    }

    #[test]
    fn test_steps_walk_every_state() {
        use PipelineState::*;
        assert_eq!(Null.steps_to(Playing), vec![Ready, Paused, Playing]);
        assert_eq!(Playing.steps_to(Paused), vec![Paused]);
        assert_eq!(Paused.steps_to(Null), vec![Ready, Null]);
        assert!(Paused.steps_to(Paused).is_empty());
        assert!(Unknown.steps_to(Playing).is_empty());
    }

    #[test]
    fn test_numbering_matches_native_states() {
        assert_eq!(PipelineState::Unknown as i32, 0);
        assert_eq!(PipelineState::Playing as i32, 4);
        assert_eq!(PipelineState::from_i32(3), PipelineState::Paused);
        assert_eq!(PipelineState::from_i32(9), PipelineState::Unknown);
    }
}
