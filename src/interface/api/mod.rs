//! API interface implementations

pub mod call_dto;
pub mod calls_handler;
pub mod metrics_handler;
pub mod router;
pub mod webhook_handler;

pub use calls_handler::AppState;
pub use metrics_handler::init_metrics;
pub use router::build_router;
