//! Voice-response directive
//!
//! The declarative document returned to the telephony gateway for every
//! webhook. It never carries audio itself, only URLs and listening rules.

use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// How to listen for the caller after playback
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenSpec {
    /// Seconds of silence before the gateway gives up on the caller
    pub timeout_seconds: u32,
    /// Consecutive empty results tolerated before the call is closed.
    /// Enforced server-side, the gateway posts empty results back.
    pub max_attempts: u32,
    /// Phrases that help recognition end the utterance early
    pub stop_phrases: Vec<String>,
}

impl Default for ListenSpec {
    fn default() -> Self {
        Self {
            timeout_seconds: 5,
            max_attempts: 2,
            stop_phrases: Vec::new(),
        }
    }
}

/// A single step of a directive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verb", rename_all = "lowercase")]
pub enum Instruction {
    Play { url: String },
    Gather(ListenSpec),
    Hangup,
    Redirect { url: String },
}

/// Ordered list of instructions for the gateway
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceResponseDirective {
    instructions: Vec<Instruction>,
}

impl VoiceResponseDirective {
    /// A directive with no instructions (used to acknowledge status callbacks)
    pub fn empty() -> Self {
        Self::default()
    }

    /// The safe default: hang up without playing anything
    pub fn hangup_now() -> Self {
        Self::empty().hangup()
    }

    /// Play the audio, then listen for the caller
    pub fn play_then_listen(url: impl Into<String>, listen: ListenSpec) -> Self {
        Self::empty().play(url).gather(listen)
    }

    /// Play the audio, then hang up
    pub fn play_then_hangup(url: impl Into<String>) -> Self {
        Self::empty().play(url).hangup()
    }

    pub fn play(mut self, url: impl Into<String>) -> Self {
        self.instructions.push(Instruction::Play { url: url.into() });
        self
    }

    pub fn gather(mut self, listen: ListenSpec) -> Self {
        self.instructions.push(Instruction::Gather(listen));
        self
    }

    pub fn hangup(mut self) -> Self {
        self.instructions.push(Instruction::Hangup);
        self
    }

    pub fn redirect(mut self, url: impl Into<String>) -> Self {
        self.instructions.push(Instruction::Redirect { url: url.into() });
        self
    }

    /// Append every instruction of `next` after this one
    pub fn then(mut self, next: VoiceResponseDirective) -> Self {
        self.instructions.extend(next.instructions);
        self
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Whether the gateway will terminate the call after this directive
    pub fn ends_call(&self) -> bool {
        matches!(self.instructions.last(), Some(Instruction::Hangup))
    }

    /// Whether the gateway will keep listening after this directive
    pub fn listens(&self) -> bool {
        self.instructions
            .iter()
            .any(|i| matches!(i, Instruction::Gather(_)))
    }

    /// Render as a TwiML-compatible XML document.
    ///
    /// `gather_action` is where the gateway posts the speech result.
    pub fn to_xml(&self, gather_action: Option<&str>) -> String {
        let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?><Response>");

        for instruction in &self.instructions {
            match instruction {
                Instruction::Play { url } => {
                    let _ = write!(xml, "<Play>{}</Play>", escape_xml(url));
                }
                Instruction::Gather(listen) => {
                    let _ = write!(
                        xml,
                        "<Gather input=\"speech\" timeout=\"{}\" speechTimeout=\"auto\" actionOnEmptyResult=\"true\"",
                        listen.timeout_seconds
                    );
                    if let Some(action) = gather_action {
                        let _ = write!(xml, " action=\"{}\" method=\"POST\"", escape_xml(action));
                    }
                    if !listen.stop_phrases.is_empty() {
                        let _ = write!(
                            xml,
                            " hints=\"{}\"",
                            escape_xml(&listen.stop_phrases.join(","))
                        );
                    }
                    xml.push_str("/>");
                }
                Instruction::Hangup => xml.push_str("<Hangup/>"),
                Instruction::Redirect { url } => {
                    let _ = write!(xml, "<Redirect method=\"POST\">{}</Redirect>", escape_xml(url));
                }
            }
        }

        xml.push_str("</Response>");
        xml
    }
}

fn escape_xml(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            other => escaped.push(other),
        }
    }
    escaped
}
