//! Atomic conversational turn state.
//!
//! Shared between the network receive loop (the only writer) and the
//! capture gate running on the microphone callback thread (reader).

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Whose turn it is in the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TurnState {
    /// The user may speak; microphone audio is transmitted.
    Idle = 0,
    /// The remote model is speaking; microphone audio is dropped.
    ModelSpeaking = 1,
}

impl TurnState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::ModelSpeaking,
            _ => Self::Idle,
        }
    }
}

impl std::fmt::Display for TurnState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::ModelSpeaking => write!(f, "model_speaking"),
        }
    }
}

/// Thread-safe turn state, shareable via `Arc`.
#[derive(Debug)]
pub struct TurnStateMachine {
    state: AtomicU8,
}

impl TurnStateMachine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Current state.
    pub fn current(&self) -> TurnState {
        TurnState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// True while the capture gate must stay closed.
    pub fn is_model_speaking(&self) -> bool {
        self.current() == TurnState::ModelSpeaking
    }

    /// Idle -> ModelSpeaking. Returns `true` only for the call that made
    /// the transition, so callers can fire one-shot notifications.
    pub fn begin_speaking(&self) -> bool {
        self.state
            .compare_exchange(
                TurnState::Idle as u8,
                TurnState::ModelSpeaking as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// ModelSpeaking -> Idle. Returns `false` if the model was not speaking.
    pub fn finish_speaking(&self) -> bool {
        self.state
            .compare_exchange(
                TurnState::ModelSpeaking as u8,
                TurnState::Idle as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }
}

impl Default for TurnStateMachine {
    fn default() -> Self {
        Self {
            state: AtomicU8::new(TurnState::Idle as u8),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_idle() {
        let turn = TurnStateMachine::new();
        assert_eq!(turn.current(), TurnState::Idle);
        assert!(!turn.is_model_speaking());
    }

    #[test]
    fn test_begin_speaking_fires_once() {
        let turn = TurnStateMachine::new();
        assert!(turn.begin_speaking());
        assert!(!turn.begin_speaking());
        assert!(turn.is_model_speaking());
    }

    #[test]
    fn test_finish_speaking_only_from_speaking() {
        let turn = TurnStateMachine::new();
        assert!(!turn.finish_speaking());

        turn.begin_speaking();
        assert!(turn.finish_speaking());
        assert_eq!(turn.current(), TurnState::Idle);
        assert!(!turn.finish_speaking());
    }

    #[test]
    fn test_display() {
        assert_eq!(TurnState::Idle.to_string(), "idle");
        assert_eq!(TurnState::ModelSpeaking.to_string(), "model_speaking");
    }
}
