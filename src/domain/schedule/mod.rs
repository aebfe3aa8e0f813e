//! Schedule bounded context - meeting negotiation, slot search and the calendar port

pub mod availability;
pub mod calendar;
pub mod intent;
pub mod negotiation;

pub use availability::{describe_options, find_available_slots, format_for_speech, BusinessCalendar};
pub use calendar::{
    AvailabilityQuery, BookingConfirmation, BookingRequest, CalendarError, CalendarService,
};
pub use intent::{interpret, SlotChoice};
pub use negotiation::{CallerResponse, NegotiationStatus, ScheduleNegotiation, TimeWindow};

#[cfg(test)]
pub use calendar::MockCalendarService;
