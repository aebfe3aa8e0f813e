//! Free-slot search over business hours

use crate::domain::schedule::negotiation::TimeWindow;
use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};

/// Working-time rules used to find meeting windows.
///
/// Times are wall-clock times at `offset`. A fixed offset has no DST.
#[derive(Debug, Clone)]
pub struct BusinessCalendar {
    pub offset: FixedOffset,
    pub day_start: NaiveTime,
    pub day_end: NaiveTime,
    /// Weekdays counted from Monday = 0
    pub business_days: Vec<u32>,
    pub meeting_minutes: i64,
}

impl BusinessCalendar {
    fn is_business_day(&self, date: NaiveDate) -> bool {
        self.business_days
            .contains(&date.weekday().num_days_from_monday())
    }

    fn at(&self, date: NaiveDate, time: NaiveTime) -> DateTime<FixedOffset> {
        let local = date.and_time(time);
        let utc = local - Duration::seconds(i64::from(self.offset.local_minus_utc()));
        self.offset.from_utc_datetime(&utc)
    }
}

/// Find up to `count` free windows between `from` and the end of the day of `until`.
///
/// Candidates start at the beginning of business hours and advance past any
/// overlapping busy window; when a busy window ends before the candidate
/// start, the search moves forward by 15 minutes.
pub fn find_available_slots(
    busy: &[TimeWindow],
    from: DateTime<Utc>,
    until: DateTime<Utc>,
    calendar: &BusinessCalendar,
    count: usize,
) -> Vec<TimeWindow> {
    let mut slots = Vec::new();
    if count == 0 || calendar.meeting_minutes <= 0 {
        return slots;
    }

    let duration = Duration::minutes(calendar.meeting_minutes);
    let last_day = until.with_timezone(&calendar.offset).date_naive();
    let mut cursor = from.with_timezone(&calendar.offset);

    while cursor.date_naive() <= last_day && slots.len() < count {
        let day = cursor.date_naive();
        let next_day = calendar.at(day + Duration::days(1), calendar.day_start);

        if !calendar.is_business_day(day) {
            cursor = next_day;
            continue;
        }

        let day_start = calendar.at(day, calendar.day_start);
        let day_end = calendar.at(day, calendar.day_end);
        if cursor < day_start {
            cursor = day_start;
        }

        while cursor < day_end && slots.len() < count {
            let candidate_start = cursor;
            let candidate_end = candidate_start + duration;
            if candidate_end > day_end {
                break;
            }

            let candidate = TimeWindow::new(
                candidate_start.with_timezone(&Utc),
                candidate_end.with_timezone(&Utc),
            );

            match busy.iter().find(|b| candidate.overlaps(b)) {
                None => {
                    slots.push(candidate);
                    cursor = candidate_end;
                }
                Some(blocking) => {
                    let advanced = blocking.end.with_timezone(&calendar.offset);
                    cursor = if advanced > candidate_start {
                        advanced
                    } else {
                        candidate_start + Duration::minutes(15)
                    };
                }
            }
        }

        cursor = next_day;
    }

    slots
}

/// Spoken form of a slot start, e.g. "Tuesday, May 21 at 02:00 PM"
pub fn format_for_speech(start: DateTime<Utc>, offset: FixedOffset) -> String {
    start
        .with_timezone(&offset)
        .format("%A, %B %d at %I:%M %p")
        .to_string()
}

/// Spoken list of options, numbered for the caller
pub fn describe_options(slots: &[TimeWindow], offset: FixedOffset) -> String {
    let spoken: Vec<String> = slots
        .iter()
        .enumerate()
        .map(|(i, slot)| format!("option {}, {}", i + 1, format_for_speech(slot.start, offset)))
        .collect();

    match spoken.as_slice() {
        [] => String::new(),
        [only] => only.clone(),
        [init @ .., last] => format!("{}, or {}", init.join("; "), last),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calendar() -> BusinessCalendar {
        BusinessCalendar {
            offset: FixedOffset::east_opt(0).unwrap(),
            day_start: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            day_end: NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
            business_days: vec![0, 1, 2, 3, 4],
            meeting_minutes: 30,
        }
    }

    fn utc(d: u32, h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, d, h, m, 0).unwrap()
    }

    #[test]
    fn test_slots_start_at_business_hours() {
        // 2024-05-21 is a Tuesday
        let slots = find_available_slots(&[], utc(21, 0, 0), utc(22, 0, 0), &calendar(), 3);

        assert_eq!(slots.len(), 3);
        assert_eq!(slots[0].start, utc(21, 9, 0));
        assert_eq!(slots[1].start, utc(21, 9, 30));
        assert_eq!(slots[2].end, utc(21, 10, 30));
    }

    #[test]
    fn test_busy_windows_are_skipped() {
        let busy = vec![
            TimeWindow::new(utc(21, 9, 0), utc(21, 10, 0)),
            TimeWindow::new(utc(21, 10, 15), utc(21, 11, 0)),
        ];
        let slots = find_available_slots(&busy, utc(21, 0, 0), utc(21, 0, 0), &calendar(), 2);

        // 10:00-10:30 collides with the 10:15 meeting, search resumes at 11:00
        assert_eq!(slots[0].start, utc(21, 11, 0));
        assert_eq!(slots[1].start, utc(21, 11, 30));
    }

    #[test]
    fn test_weekend_is_skipped() {
        // 2024-05-25 is a Saturday
        let slots = find_available_slots(&[], utc(25, 9, 0), utc(28, 0, 0), &calendar(), 1);
        assert_eq!(slots[0].start, utc(27, 9, 0));
    }

    #[test]
    fn test_search_stops_at_last_day() {
        let slots = find_available_slots(&[], utc(21, 16, 45), utc(21, 17, 0), &calendar(), 2);
        assert!(slots.is_empty());
    }

    #[test]
    fn test_offset_applies_to_business_hours() {
        let mut cal = calendar();
        cal.offset = FixedOffset::west_opt(4 * 3600).unwrap();
        let slots = find_available_slots(&[], utc(21, 0, 0), utc(22, 0, 0), &cal, 1);

        // 09:00 at UTC-4 is 13:00 UTC
        assert_eq!(slots[0].start, utc(21, 13, 0));
        assert_eq!(format_for_speech(slots[0].start, cal.offset), "Tuesday, May 21 at 09:00 AM");
    }

    #[test]
    fn test_describe_options() {
        let offset = FixedOffset::east_opt(0).unwrap();
        let slots = vec![
            TimeWindow::new(utc(21, 14, 0), utc(21, 14, 30)),
            TimeWindow::new(utc(22, 10, 0), utc(22, 10, 30)),
        ];

        assert_eq!(
            describe_options(&slots, offset),
            "option 1, Tuesday, May 21 at 02:00 PM, or option 2, Wednesday, May 22 at 10:00 AM"
        );
    }
}
