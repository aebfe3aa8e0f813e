//! Call bounded context - the lifecycle of one outbound sales call

pub mod aggregate;
pub mod directive;
pub mod entity;
pub mod event;
pub mod value_object;

pub use aggregate::CallSession;
pub use directive::{Instruction, ListenSpec, VoiceResponseDirective};
pub use entity::ConversationTurn;
pub use event::{SessionEvent, SessionEventKind};
pub use value_object::{CallState, ExtractedSignals, InterestLevel, SignalUpdate, Speaker};
