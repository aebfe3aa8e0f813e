//! Infrastructure layer - Technical implementations
//!
//! This layer contains:
//! - The JSON lead store
//! - The configuration-backed calendar
//! - HTTP clients for speech synthesis, dialogue inference and telephony

pub mod calendar;
pub mod http;
pub mod persistence;
