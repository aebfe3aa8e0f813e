//! Call value objects

use serde::{Deserialize, Serialize};
use std::fmt;

/// Call lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CallState {
    /// Session recorded, placement requested from the gateway
    Initiated,
    /// Gateway acknowledged placement, callee is being alerted
    Ringing,
    /// Callee answered, generic dialogue is running
    InProgress,
    /// Meeting negotiation is running
    Scheduling,
    /// Call closed gracefully by the agent
    Completed,
    /// Callee never picked up
    NoAnswer,
    /// Placement or the call itself failed
    Failed,
    /// Callee hung up before a completion signal
    CallerHungUp,
}

impl CallState {
    /// Check if state transition is valid
    pub fn can_transition_to(&self, new_state: &CallState) -> bool {
        use CallState::*;

        match (self, new_state) {
            // From Initiated
            (Initiated, Ringing) => true,
            (Initiated, NoAnswer) => true,

            // From Ringing
            (Ringing, InProgress) => true,
            (Ringing, NoAnswer) => true,

            // From InProgress
            (InProgress, Scheduling) => true,
            (InProgress, Completed) => true,

            // From Scheduling
            (Scheduling, Completed) => true,

            // Failure and caller hang-up are reachable from any live state
            (from, Failed) | (from, CallerHungUp) if !from.is_terminal() => true,

            // Can't transition from a terminal state
            _ => false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CallState::Completed | CallState::NoAnswer | CallState::Failed | CallState::CallerHungUp
        )
    }

    /// States in which the callee is on the line and speech is expected
    pub fn is_conversational(&self) -> bool {
        matches!(self, CallState::InProgress | CallState::Scheduling)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CallState::Initiated => "INITIATED",
            CallState::Ringing => "RINGING",
            CallState::InProgress => "IN_PROGRESS",
            CallState::Scheduling => "SCHEDULING",
            CallState::Completed => "COMPLETED",
            CallState::NoAnswer => "NO_ANSWER",
            CallState::Failed => "FAILED",
            CallState::CallerHungUp => "CALLER_HUNG_UP",
        }
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who spoke a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    Caller,
    Agent,
}

/// How interested the lead sounds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterestLevel {
    None,
    Low,
    Medium,
    High,
}

impl InterestLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            InterestLevel::None => "none",
            InterestLevel::Low => "low",
            InterestLevel::Medium => "medium",
            InterestLevel::High => "high",
        }
    }
}

/// Signal values reported by the dialogue policy for a single turn.
/// Absent fields leave the previously observed value untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalUpdate {
    #[serde(default)]
    pub objection: Option<String>,
    #[serde(default)]
    pub interest_level: Option<InterestLevel>,
    #[serde(default)]
    pub decision_maker: Option<bool>,
}

impl SignalUpdate {
    pub fn is_empty(&self) -> bool {
        self.objection.is_none() && self.interest_level.is_none() && self.decision_maker.is_none()
    }
}

/// A signal value together with the turn it was observed on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observed<T> {
    pub value: T,
    pub turn: usize,
}

/// Latest observed value per signal
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedSignals {
    objection: Option<Observed<String>>,
    interest_level: Option<Observed<InterestLevel>>,
    decision_maker: Option<Observed<bool>>,
}

impl ExtractedSignals {
    /// Merge an update observed on `turn`, last-write-wins per signal.
    ///
    /// An update from an older turn never replaces a newer observation.
    pub fn merge(&mut self, update: &SignalUpdate, turn: usize) {
        if let Some(objection) = update.objection.as_ref().filter(|o| !o.trim().is_empty()) {
            Self::observe(&mut self.objection, objection.trim().to_string(), turn);
        }
        if let Some(level) = update.interest_level {
            Self::observe(&mut self.interest_level, level, turn);
        }
        if let Some(decision_maker) = update.decision_maker {
            Self::observe(&mut self.decision_maker, decision_maker, turn);
        }
    }

    fn observe<T>(slot: &mut Option<Observed<T>>, value: T, turn: usize) {
        match slot {
            Some(existing) if existing.turn > turn => {}
            _ => *slot = Some(Observed { value, turn }),
        }
    }

    pub fn objection(&self) -> Option<&str> {
        self.objection.as_ref().map(|o| o.value.as_str())
    }

    pub fn interest_level(&self) -> Option<InterestLevel> {
        self.interest_level.as_ref().map(|o| o.value)
    }

    pub fn decision_maker(&self) -> Option<bool> {
        self.decision_maker.as_ref().map(|o| o.value)
    }

    pub fn is_empty(&self) -> bool {
        self.objection.is_none() && self.interest_level.is_none() && self.decision_maker.is_none()
    }
}
