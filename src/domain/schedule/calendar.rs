//! Calendar port

use crate::domain::schedule::negotiation::TimeWindow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which windows to look for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityQuery {
    /// Earliest acceptable start
    pub from: DateTime<Utc>,
    /// Number of days ahead to search
    pub days: u32,
    /// Number of windows wanted
    pub count: usize,
}

/// Meeting to put on the calendar
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingRequest {
    pub window: TimeWindow,
    pub summary: String,
    pub description: String,
    pub attendees: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingConfirmation {
    pub confirmation_id: String,
}

/// Calendar errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CalendarError {
    /// The window was taken between proposal and booking
    #[error("Slot no longer available")]
    Conflict,

    #[error("Calendar unavailable: {0}")]
    Unavailable(String),

    #[error("Calendar request timed out")]
    Timeout,
}

/// Source of free windows and sink for booked meetings
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CalendarService: Send + Sync {
    async fn list_availability(
        &self,
        query: &AvailabilityQuery,
    ) -> Result<Vec<TimeWindow>, CalendarError>;

    async fn book(&self, request: &BookingRequest) -> Result<BookingConfirmation, CalendarError>;
}
