//! Calendar implementations

pub mod configured;

pub use configured::ConfiguredCalendar;
