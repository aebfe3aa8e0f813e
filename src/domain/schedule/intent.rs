//! Interpretation of the caller's answer to a slot proposal

use crate::domain::schedule::negotiation::TimeWindow;
use chrono::{Datelike, FixedOffset, Timelike, Weekday};
use regex::Regex;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotChoice {
    /// Index into the proposed slots
    Selected(usize),
    Rejected,
    Ambiguous,
}

const REJECTIONS: &[&str] = &[
    "none",
    "neither",
    "no thanks",
    "not interested",
    "other time",
    "another time",
    "different time",
    "doesn't work",
    "does not work",
    "don't work",
    "can't make",
    "cannot make",
    "busy then",
];

const AFFIRMATIONS: &[&str] = &["yes", "yeah", "sure", "ok", "okay", "sounds good", "perfect", "works"];

fn hour_pattern() -> &'static Regex {
    static HOUR: OnceLock<Regex> = OnceLock::new();
    HOUR.get_or_init(|| {
        Regex::new(r"\b(\d{1,2})(?::(\d{2}))?\s*(a\.?m\.?|p\.?m\.?)|\bat (\d{1,2})(?::(\d{2}))?\b")
            .expect("valid hour regex")
    })
}

fn option_pattern() -> &'static Regex {
    static OPTION: OnceLock<Regex> = OnceLock::new();
    OPTION.get_or_init(|| {
        Regex::new(r"\b(?:option|number|slot)\s+(\d{1,2}|one|two|three|four|five)\b")
            .expect("valid option regex")
    })
}

/// Interpret `text` against the slots that were offered.
///
/// Ordinals win over weekday and hour mentions. Weekday and hour mentions
/// select a slot only when they narrow the offer down to exactly one.
pub fn interpret(text: &str, slots: &[TimeWindow], offset: FixedOffset) -> SlotChoice {
    let normalized = text.to_lowercase().replace('’', "'");
    let normalized = normalized.trim();

    if normalized.is_empty() || slots.is_empty() {
        return SlotChoice::Ambiguous;
    }

    if REJECTIONS.iter().any(|r| normalized.contains(r)) {
        return SlotChoice::Rejected;
    }

    if let Some(index) = ordinal_choice(normalized, slots.len()) {
        return SlotChoice::Selected(index);
    }

    let weekdays = mentioned_weekdays(normalized);
    let hour = mentioned_hour(normalized);

    if weekdays.is_empty() && hour.is_none() {
        if slots.len() == 1 && is_affirmative(normalized) {
            return SlotChoice::Selected(0);
        }
        return SlotChoice::Ambiguous;
    }

    let candidates: Vec<usize> = slots
        .iter()
        .enumerate()
        .filter(|(_, slot)| {
            let local = slot.start.with_timezone(&offset);
            let day_ok = weekdays.is_empty() || weekdays.contains(&local.weekday());
            let hour_ok = match hour {
                None => true,
                Some(MentionedHour::Exact(h)) => local.hour() == h,
                Some(MentionedHour::Twelve(h)) => local.hour() % 12 == h % 12,
            };
            day_ok && hour_ok
        })
        .map(|(i, _)| i)
        .collect();

    match candidates.as_slice() {
        [only] => SlotChoice::Selected(*only),
        _ => SlotChoice::Ambiguous,
    }
}

fn is_affirmative(text: &str) -> bool {
    text.split(|c: char| !c.is_alphanumeric() && c != '\'')
        .any(|word| AFFIRMATIONS.contains(&word))
        || text.contains("sounds good")
}

fn word_to_number(word: &str) -> Option<usize> {
    match word {
        "one" => Some(1),
        "two" => Some(2),
        "three" => Some(3),
        "four" => Some(4),
        "five" => Some(5),
        digits => digits.parse().ok(),
    }
}

fn ordinal_choice(text: &str, slot_count: usize) -> Option<usize> {
    let mut picks: Vec<usize> = Vec::new();

    for word in text.split(|c: char| !c.is_alphanumeric()) {
        let pick = match word {
            "first" | "1st" => Some(0),
            "second" | "2nd" => Some(1),
            "third" | "3rd" => Some(2),
            "fourth" | "4th" => Some(3),
            "fifth" | "5th" => Some(4),
            "last" | "latter" => Some(slot_count - 1),
            "former" => Some(0),
            _ => None,
        };
        if let Some(pick) = pick {
            picks.push(pick);
        }
    }

    for captures in option_pattern().captures_iter(text) {
        if let Some(n) = captures.get(1).and_then(|m| word_to_number(m.as_str())) {
            if n >= 1 {
                picks.push(n - 1);
            }
        }
    }

    picks.sort_unstable();
    picks.dedup();
    match picks.as_slice() {
        [only] if *only < slot_count => Some(*only),
        _ => None,
    }
}

fn mentioned_weekdays(text: &str) -> Vec<Weekday> {
    const NAMES: &[(&str, Weekday)] = &[
        ("monday", Weekday::Mon),
        ("tuesday", Weekday::Tue),
        ("wednesday", Weekday::Wed),
        ("thursday", Weekday::Thu),
        ("friday", Weekday::Fri),
        ("saturday", Weekday::Sat),
        ("sunday", Weekday::Sun),
    ];

    NAMES
        .iter()
        .filter(|(name, _)| text.contains(name))
        .map(|(_, day)| *day)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MentionedHour {
    /// 24-hour clock, from an am/pm mention
    Exact(u32),
    /// Bare hour, either half of the day
    Twelve(u32),
}

fn mentioned_hour(text: &str) -> Option<MentionedHour> {
    let captures = hour_pattern().captures(text)?;

    if let (Some(hour), Some(meridiem)) = (captures.get(1), captures.get(3)) {
        let hour: u32 = hour.as_str().parse().ok()?;
        if !(1..=12).contains(&hour) {
            return None;
        }
        let pm = meridiem.as_str().starts_with('p');
        let hour = match (hour, pm) {
            (12, false) => 0,
            (12, true) => 12,
            (h, true) => h + 12,
            (h, false) => h,
        };
        return Some(MentionedHour::Exact(hour));
    }

    let hour: u32 = captures.get(4)?.as_str().parse().ok()?;
    (hour <= 23).then_some(if hour > 12 {
        MentionedHour::Exact(hour)
    } else {
        MentionedHour::Twelve(hour)
    })
}
