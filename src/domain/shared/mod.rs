//! Shared kernel - Common types used across the call, lead and scheduling contexts

pub mod error;
pub mod result;
pub mod value_objects;

pub use error::CallError;
pub use result::Result;
pub use value_objects::*;
