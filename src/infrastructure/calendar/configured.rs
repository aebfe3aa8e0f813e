/// Calendar backed by configured busy windows plus the meetings booked since startup
use crate::domain::schedule::{
    find_available_slots, AvailabilityQuery, BookingConfirmation, BookingRequest,
    BusinessCalendar, CalendarError, CalendarService, TimeWindow,
};
use async_trait::async_trait;
use chrono::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

pub struct ConfiguredCalendar {
    rules: BusinessCalendar,
    busy: Vec<TimeWindow>,
    booked: RwLock<Vec<TimeWindow>>,
}

impl ConfiguredCalendar {
    pub fn new(rules: BusinessCalendar, busy: Vec<TimeWindow>) -> Self {
        Self {
            rules,
            busy,
            booked: RwLock::new(Vec::new()),
        }
    }

    pub async fn booked(&self) -> Vec<TimeWindow> {
        self.booked.read().await.clone()
    }
}

#[async_trait]
impl CalendarService for ConfiguredCalendar {
    async fn list_availability(&self, query: &AvailabilityQuery) -> Result<Vec<TimeWindow>, CalendarError> {
        let booked = self.booked.read().await;
        let mut blocked = self.busy.clone();
        blocked.extend(booked.iter().copied());

        let until = query.from + Duration::days(i64::from(query.days));
        let slots = find_available_slots(&blocked, query.from, until, &self.rules, query.count);
        debug!("Found {} free slots in the next {} days", slots.len(), query.days);
        Ok(slots)
    }

    async fn book(&self, request: &BookingRequest) -> Result<BookingConfirmation, CalendarError> {
        // Write lock held across check and insert
        let mut booked = self.booked.write().await;
        let taken = self
            .busy
            .iter()
            .chain(booked.iter())
            .any(|window| window.overlaps(&request.window));
        if taken {
            return Err(CalendarError::Conflict);
        }

        booked.push(request.window);
        let confirmation_id = Uuid::new_v4().to_string();
        info!(
            "Booked '{}' at {} for {:?}",
            request.summary, request.window.start, request.attendees
        );
        Ok(BookingConfirmation { confirmation_id })
    }
}
