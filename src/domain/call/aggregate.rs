//! Call session aggregate root

use crate::domain::call::directive::VoiceResponseDirective;
use crate::domain::call::entity::ConversationTurn;
use crate::domain::call::event::{SessionEvent, SessionEventKind};
use crate::domain::call::value_object::{CallState, ExtractedSignals, SignalUpdate, Speaker};
use crate::domain::lead::LeadProfile;
use crate::domain::schedule::{NegotiationStatus, ScheduleNegotiation, TimeWindow};
use crate::domain::shared::error::CallError;
use crate::domain::shared::result::Result;
use crate::domain::shared::value_objects::CallId;
use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;

/// How many processed deliveries a session remembers for replay
const DELIVERY_HISTORY: usize = 64;

/// A processed webhook delivery and the directive it produced
#[derive(Debug, Clone)]
struct ProcessedDelivery {
    sequence: Option<u64>,
    key: Option<String>,
    directive: VoiceResponseDirective,
}

/// Call session aggregate root
///
/// One per placed call. Every mutation goes through the methods below so
/// that the lifecycle only ever moves along the edges of [`CallState`],
/// the turn history only grows, and pending domain events are recorded.
#[derive(Debug, Clone)]
pub struct CallSession {
    id: CallId,
    /// Snapshot taken at creation, never refreshed
    lead: LeadProfile,
    state: CallState,
    turns: Vec<ConversationTurn>,
    signals: ExtractedSignals,
    schedule: Option<ScheduleNegotiation>,
    /// Highest provider sequence number processed
    last_event_sequence: Option<u64>,
    /// Recent deliveries, replayed when the provider retries one
    deliveries: VecDeque<ProcessedDelivery>,
    /// Identifier assigned by the telephony provider
    provider_ref: Option<String>,
    /// Consecutive empty speech results
    no_input_attempts: u32,
    created_at: DateTime<Utc>,
    answered_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    events: Vec<SessionEvent>,
}

impl CallSession {
    /// Create a new session in `INITIATED`
    pub fn new(id: CallId, lead: LeadProfile) -> Self {
        let mut session = Self {
            id,
            lead,
            state: CallState::Initiated,
            turns: Vec::new(),
            signals: ExtractedSignals::default(),
            schedule: None,
            last_event_sequence: None,
            deliveries: VecDeque::new(),
            provider_ref: None,
            no_input_attempts: 0,
            created_at: Utc::now(),
            answered_at: None,
            ended_at: None,
            events: Vec::new(),
        };

        session.record_event(SessionEventKind::Created);
        session
    }

    /// The gateway acknowledged placement
    pub fn mark_ringing(&mut self, provider_ref: Option<String>) -> Result<()> {
        self.transition_to(CallState::Ringing)?;
        if provider_ref.is_some() {
            self.provider_ref = provider_ref.clone();
        }

        self.record_event(SessionEventKind::Ringing { provider_ref });
        Ok(())
    }

    /// The callee picked up
    pub fn answer(&mut self) -> Result<()> {
        self.transition_to(CallState::InProgress)?;
        self.answered_at = Some(Utc::now());

        self.record_event(SessionEventKind::Answered);
        Ok(())
    }

    /// Enter the scheduling sub-negotiation. Only one negotiation per call.
    pub fn begin_scheduling(&mut self) -> Result<()> {
        if self.schedule.is_some() {
            return Err(CallError::InvalidTransition(
                "scheduling already started".to_string(),
            ));
        }

        self.transition_to(CallState::Scheduling)?;
        self.schedule = Some(ScheduleNegotiation::new());

        self.record_event(SessionEventKind::SchedulingStarted);
        Ok(())
    }

    /// Graceful close by the agent
    pub fn complete(&mut self) -> Result<()> {
        self.end(CallState::Completed)
    }

    pub fn caller_hung_up(&mut self) -> Result<()> {
        self.end(CallState::CallerHungUp)
    }

    pub fn mark_no_answer(&mut self) -> Result<()> {
        self.end(CallState::NoAnswer)
    }

    pub fn fail(&mut self) -> Result<()> {
        self.end(CallState::Failed)
    }

    /// Move into a terminal state, abandoning any open negotiation
    fn end(&mut self, terminal: CallState) -> Result<()> {
        self.transition_to(terminal)?;
        self.ended_at = Some(Utc::now());

        if let Some(schedule) = self.schedule.as_mut() {
            if schedule.abandon() {
                self.record_event(SessionEventKind::NegotiationResolved {
                    status: NegotiationStatus::Abandoned,
                });
            }
        }

        self.record_event(SessionEventKind::Ended { state: terminal });
        Ok(())
    }

    /// Append a caller turn. Returns its index.
    pub fn push_caller_turn(&mut self, text: impl Into<String>) -> Result<usize> {
        self.push_turn(ConversationTurn::caller(text))
    }

    /// Append an agent turn. Returns its index.
    pub fn push_agent_turn(
        &mut self,
        text: impl Into<String>,
        audio_url: impl Into<String>,
    ) -> Result<usize> {
        self.push_turn(ConversationTurn::agent(text, audio_url))
    }

    fn push_turn(&mut self, turn: ConversationTurn) -> Result<usize> {
        if !self.state.is_conversational() {
            return Err(CallError::InvalidTransition(format!(
                "cannot record a turn in state {}",
                self.state
            )));
        }

        let index = self.turns.len();
        let speaker = turn.speaker();
        self.turns.push(turn);

        self.record_event(SessionEventKind::TurnRecorded { speaker, index });
        Ok(index)
    }

    /// Merge signals observed on the most recent turn
    pub fn merge_signals(&mut self, update: &SignalUpdate) {
        let turn = self.turns.len().saturating_sub(1);
        self.signals.merge(update, turn);
    }

    /// Replace the offered slots of the open negotiation
    pub fn propose_slots(&mut self, slots: Vec<TimeWindow>) -> Result<()> {
        self.schedule_mut()?.propose(slots)
    }

    /// Count a scheduling re-prompt, returning the running total
    pub fn record_schedule_reprompt(&mut self) -> Result<u32> {
        self.schedule_mut()?.record_reprompt()
    }

    pub fn book_meeting(&mut self, window: TimeWindow, confirmation_id: impl Into<String>) -> Result<()> {
        self.schedule_mut()?.book(window, confirmation_id)?;
        self.record_event(SessionEventKind::NegotiationResolved {
            status: NegotiationStatus::Booked,
        });
        Ok(())
    }

    pub fn decline_meeting(&mut self) -> Result<()> {
        self.schedule_mut()?.decline()?;
        self.record_event(SessionEventKind::NegotiationResolved {
            status: NegotiationStatus::Declined,
        });
        Ok(())
    }

    pub fn abandon_meeting(&mut self) -> Result<()> {
        if self.schedule_mut()?.abandon() {
            self.record_event(SessionEventKind::NegotiationResolved {
                status: NegotiationStatus::Abandoned,
            });
        }
        Ok(())
    }

    fn schedule_mut(&mut self) -> Result<&mut ScheduleNegotiation> {
        self.schedule
            .as_mut()
            .ok_or_else(|| CallError::InvalidTransition("no negotiation in progress".to_string()))
    }

    /// Count an empty speech result, returning the running total
    pub fn record_no_input(&mut self) -> u32 {
        self.no_input_attempts += 1;
        self.no_input_attempts
    }

    pub fn reset_no_input(&mut self) {
        self.no_input_attempts = 0;
    }

    /// Whether a webhook delivery was already processed.
    ///
    /// A provider sequence number, when present, must be strictly increasing.
    /// Otherwise the idempotency key is looked up among recently seen keys.
    pub fn is_duplicate(&self, sequence: Option<u64>, key: Option<&str>) -> bool {
        if let Some(sequence) = sequence {
            return self.last_event_sequence.is_some_and(|last| sequence <= last);
        }
        key.is_some_and(|key| self.deliveries.iter().any(|d| d.key.as_deref() == Some(key)))
    }

    /// Directive produced by an earlier delivery of the same event.
    ///
    /// Matched by idempotency key first, then by sequence number. `None` when
    /// the original delivery is no longer remembered.
    pub fn replay_directive(&self, sequence: Option<u64>, key: Option<&str>) -> Option<&VoiceResponseDirective> {
        let by_key = key.and_then(|key| {
            self.deliveries
                .iter()
                .rev()
                .find(|d| d.key.as_deref() == Some(key))
        });
        let by_sequence = || {
            sequence.and_then(|sequence| {
                self.deliveries
                    .iter()
                    .rev()
                    .find(|d| d.sequence == Some(sequence))
            })
        };

        by_key.or_else(by_sequence).map(|d| &d.directive)
    }

    /// Remember a processed webhook delivery and the directive it produced
    pub fn acknowledge_event(
        &mut self,
        sequence: Option<u64>,
        key: Option<&str>,
        directive: &VoiceResponseDirective,
    ) {
        if let Some(sequence) = sequence {
            self.last_event_sequence = Some(self.last_event_sequence.map_or(sequence, |last| last.max(sequence)));
        }
        if sequence.is_none() && key.is_none() {
            return;
        }
        if self.deliveries.len() == DELIVERY_HISTORY {
            self.deliveries.pop_front();
        }
        self.deliveries.push_back(ProcessedDelivery {
            sequence,
            key: key.map(str::to_string),
            directive: directive.clone(),
        });
    }

    /// Whether a terminated session is past its retention window
    pub fn is_expired(&self, retention: Duration, now: DateTime<Utc>) -> bool {
        self.ended_at
            .is_some_and(|ended_at| ended_at + retention < now)
    }

    /// Whether a session that never terminated has outlived any real call
    pub fn is_stale(&self, max_age: Duration, now: DateTime<Utc>) -> bool {
        !self.is_terminal() && self.created_at + max_age < now
    }

    fn transition_to(&mut self, new_state: CallState) -> Result<()> {
        if !self.state.can_transition_to(&new_state) {
            return Err(CallError::InvalidTransition(format!(
                "Cannot transition from {} to {}",
                self.state, new_state
            )));
        }

        self.state = new_state;
        Ok(())
    }

    fn record_event(&mut self, kind: SessionEventKind) {
        self.events.push(SessionEvent::new(self.id, kind));
    }

    /// Take all pending events
    pub fn take_events(&mut self) -> Vec<SessionEvent> {
        std::mem::take(&mut self.events)
    }

    // Getters
    pub fn id(&self) -> &CallId {
        &self.id
    }

    pub fn lead(&self) -> &LeadProfile {
        &self.lead
    }

    pub fn state(&self) -> CallState {
        self.state
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn caller_turns(&self) -> usize {
        self.turns
            .iter()
            .filter(|t| t.speaker() == Speaker::Caller)
            .count()
    }

    pub fn signals(&self) -> &ExtractedSignals {
        &self.signals
    }

    pub fn schedule(&self) -> Option<&ScheduleNegotiation> {
        self.schedule.as_ref()
    }

    pub fn last_event_sequence(&self) -> Option<u64> {
        self.last_event_sequence
    }

    pub fn provider_ref(&self) -> Option<&str> {
        self.provider_ref.as_deref()
    }

    pub fn no_input_attempts(&self) -> u32 {
        self.no_input_attempts
    }

    pub fn created_at(&self) -> &DateTime<Utc> {
        &self.created_at
    }

    pub fn answered_at(&self) -> Option<&DateTime<Utc>> {
        self.answered_at.as_ref()
    }

    pub fn ended_at(&self) -> Option<&DateTime<Utc>> {
        self.ended_at.as_ref()
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}
