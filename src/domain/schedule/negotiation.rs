//! Meeting negotiation sub-record of a call session

use crate::domain::shared::error::CallError;
use crate::domain::shared::result::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A candidate meeting window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Half-open interval overlap
    pub fn overlaps(&self, other: &TimeWindow) -> bool {
        self.start < other.end && self.end > other.start
    }
}

/// Where a negotiation stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NegotiationStatus {
    /// Slots offered, waiting for the caller
    Proposing,
    Booked,
    Declined,
    /// Gave up: too many re-prompts, calendar failure or the call ended
    Abandoned,
}

impl NegotiationStatus {
    pub fn is_resolved(&self) -> bool {
        !matches!(self, NegotiationStatus::Proposing)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NegotiationStatus::Proposing => "proposing",
            NegotiationStatus::Booked => "booked",
            NegotiationStatus::Declined => "declined",
            NegotiationStatus::Abandoned => "abandoned",
        }
    }
}

impl fmt::Display for NegotiationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The caller's last answer to the proposal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CallerResponse {
    Accepted { window: TimeWindow },
    Rejected,
    NoResponse,
}

/// Meeting negotiation state
///
/// Created when the dialogue signals readiness, terminal once resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleNegotiation {
    proposed_slots: Vec<TimeWindow>,
    response: CallerResponse,
    status: NegotiationStatus,
    confirmation_id: Option<String>,
    reprompts: u32,
    started_at: DateTime<Utc>,
    resolved_at: Option<DateTime<Utc>>,
}

impl ScheduleNegotiation {
    pub fn new() -> Self {
        Self {
            proposed_slots: Vec::new(),
            response: CallerResponse::NoResponse,
            status: NegotiationStatus::Proposing,
            confirmation_id: None,
            reprompts: 0,
            started_at: Utc::now(),
            resolved_at: None,
        }
    }

    /// Replace the offered slots (initial proposal or re-query after a conflict)
    pub fn propose(&mut self, slots: Vec<TimeWindow>) -> Result<()> {
        self.ensure_open()?;
        self.proposed_slots = slots;
        Ok(())
    }

    /// Count one more re-prompt and return the running total
    pub fn record_reprompt(&mut self) -> Result<u32> {
        self.ensure_open()?;
        self.reprompts += 1;
        Ok(self.reprompts)
    }

    pub fn book(&mut self, window: TimeWindow, confirmation_id: impl Into<String>) -> Result<()> {
        self.ensure_open()?;
        self.response = CallerResponse::Accepted { window };
        self.confirmation_id = Some(confirmation_id.into());
        self.resolve(NegotiationStatus::Booked);
        Ok(())
    }

    pub fn decline(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.response = CallerResponse::Rejected;
        self.resolve(NegotiationStatus::Declined);
        Ok(())
    }

    /// Abandon an open negotiation. No-op once resolved.
    pub fn abandon(&mut self) -> bool {
        if self.is_resolved() {
            return false;
        }
        self.resolve(NegotiationStatus::Abandoned);
        true
    }

    fn resolve(&mut self, status: NegotiationStatus) {
        self.status = status;
        self.resolved_at = Some(Utc::now());
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_resolved() {
            return Err(CallError::InvalidTransition(format!(
                "negotiation already {}",
                self.status
            )));
        }
        Ok(())
    }

    pub fn proposed_slots(&self) -> &[TimeWindow] {
        &self.proposed_slots
    }

    pub fn response(&self) -> &CallerResponse {
        &self.response
    }

    pub fn status(&self) -> NegotiationStatus {
        self.status
    }

    pub fn is_resolved(&self) -> bool {
        self.status.is_resolved()
    }

    pub fn confirmation_id(&self) -> Option<&str> {
        self.confirmation_id.as_deref()
    }

    pub fn reprompts(&self) -> u32 {
        self.reprompts
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn resolved_at(&self) -> Option<DateTime<Utc>> {
        self.resolved_at
    }
}

impl Default for ScheduleNegotiation {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn window(hour: u32) -> TimeWindow {
        TimeWindow::new(
            Utc.with_ymd_and_hms(2024, 5, 21, hour, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 5, 21, hour, 30, 0).unwrap(),
        )
    }

    #[test]
    fn test_overlap_is_half_open() {
        let a = window(10);
        let b = TimeWindow::new(a.end, a.end + chrono::Duration::minutes(30));
        assert!(!a.overlaps(&b));
        assert!(a.overlaps(&a));
    }

    #[test]
    fn test_booking_resolves() {
        let mut negotiation = ScheduleNegotiation::new();
        negotiation.propose(vec![window(10), window(14)]).unwrap();
        negotiation.book(window(10), "evt-1").unwrap();

        assert_eq!(negotiation.status(), NegotiationStatus::Booked);
        assert_eq!(negotiation.confirmation_id(), Some("evt-1"));
        assert_eq!(negotiation.response(), &CallerResponse::Accepted { window: window(10) });
        assert!(negotiation.resolved_at().is_some());
    }

    #[test]
    fn test_resolved_negotiation_is_terminal() {
        let mut negotiation = ScheduleNegotiation::new();
        negotiation.decline().unwrap();

        assert!(negotiation.book(window(10), "evt-1").is_err());
        assert!(negotiation.record_reprompt().is_err());
        assert!(!negotiation.abandon());
        assert_eq!(negotiation.status(), NegotiationStatus::Declined);
    }

    #[test]
    fn test_reprompts_counted() {
        let mut negotiation = ScheduleNegotiation::new();
        assert_eq!(negotiation.record_reprompt().unwrap(), 1);
        assert_eq!(negotiation.record_reprompt().unwrap(), 2);
        assert!(negotiation.abandon());
        assert_eq!(negotiation.status().as_str(), "abandoned");
    }
}
