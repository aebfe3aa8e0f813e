//! HTTP adapters for the external speech, dialogue and telephony services

pub mod dialogue_client;
pub mod speech_client;
pub mod telephony_client;

pub use dialogue_client::GeminiDialoguePolicy;
pub use speech_client::ElevenLabsSynthesizer;
pub use telephony_client::TwilioGateway;
