//! Interface layer - External interfaces
//!
//! This layer handles:
//! - REST API endpoints for starting and inspecting calls
//! - Voice webhooks from the telephony gateway
//! - Request/response formatting

pub mod api;
