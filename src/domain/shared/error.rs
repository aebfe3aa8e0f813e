//! Domain errors

use thiserror::Error;

/// Domain result type
pub type Result<T> = std::result::Result<T, CallError>;

/// Errors raised by the call orchestration core.
///
/// Most of these never reach the telephony side: the dispatcher converts
/// every variant into a voice-response directive.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Session expired: {0}")]
    SessionExpired(String),

    #[error("Duplicate event: {0}")]
    DuplicateEvent(String),

    #[error("Invalid state transition: {0}")]
    InvalidTransition(String),

    #[error("Speech synthesis failed: {0}")]
    SynthesisFailure(String),

    #[error("Dialogue inference failed: {0}")]
    DialogueInferenceFailure(String),

    #[error("Calendar conflict: {0}")]
    CalendarConflict(String),

    #[error("Calendar service failure: {0}")]
    CalendarServiceFailure(String),

    #[error("Lead not found: {0}")]
    LeadNotFound(String),

    #[error("Invalid phone number: {0}")]
    InvalidPhoneNumber(String),

    #[error("Telephony failure: {0}")]
    TelephonyFailure(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CallError {
    /// Errors that mean the session can no longer be addressed at all.
    pub fn is_unknown_session(&self) -> bool {
        matches!(self, CallError::SessionNotFound(_) | CallError::SessionExpired(_))
    }
}
