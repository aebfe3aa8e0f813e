//! Prompt and scripted-utterance construction

use crate::domain::call::{CallState, Speaker};
use crate::domain::dialogue::DialogueRequest;
use crate::domain::lead::LeadProfile;
use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// Who the agent speaks for and what it sells
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyProfile {
    pub agent_name: String,
    pub company_name: String,
    pub product_name: String,
    pub product_description: String,
    pub key_selling_points: Vec<String>,
    pub conversation_goal: String,
}

impl Default for CompanyProfile {
    fn default() -> Self {
        Self {
            agent_name: "Alex".to_string(),
            company_name: "SalesBot AI Solutions".to_string(),
            product_name: "AutoCaller X".to_string(),
            product_description: "it helps businesses automate initial outreach and schedule qualified meetings".to_string(),
            key_selling_points: vec!["saves time".to_string(), "improves qualification".to_string()],
            conversation_goal: "to determine if the lead is a good fit for our product and to schedule a 15-minute discovery call with a senior sales representative if there is clear interest".to_string(),
        }
    }
}

/// First agent utterance once the callee answers
pub fn greeting_text(company: &CompanyProfile, lead: &LeadProfile) -> String {
    format!(
        "Hello {}. My name is {}, and I'm calling from {}. We're introducing {}, {}. Is this a good time to talk briefly?",
        lead.name,
        company.agent_name,
        company.company_name,
        company.product_name,
        company.product_description
    )
}

/// Full instruction prompt for one turn
pub fn build_prompt(company: &CompanyProfile, request: &DialogueRequest) -> String {
    let lead = &request.lead;
    let mut prompt = String::new();

    let _ = writeln!(
        prompt,
        "You are {}, an AI sales representative for {}. Your product is {}: {}.",
        company.agent_name, company.company_name, company.product_name, company.product_description
    );
    let _ = writeln!(
        prompt,
        "Key selling points include: {}.",
        company.key_selling_points.join(", ")
    );
    let _ = writeln!(prompt, "Your current goal is {}.", company.conversation_goal);
    prompt.push_str(
        "Maintain a friendly, professional and helpful tone. Keep every response to one or two sentences, three at most.\n",
    );

    let _ = write!(prompt, "You are talking to {} from {}", lead.name, lead.company_name);
    if !lead.role.is_empty() {
        let _ = write!(prompt, " ({})", lead.role);
    }
    prompt.push_str(".\n");
    if !lead.custom_notes.is_empty() {
        let _ = writeln!(prompt, "Notes about this lead: {}", lead.custom_notes);
    }

    let _ = writeln!(prompt, "Current call state: {}.", request.state);
    if !request.signals.is_empty() {
        prompt.push_str("What you have learned so far:");
        if let Some(level) = request.signals.interest_level() {
            let _ = write!(prompt, " interest level {};", level.as_str());
        }
        if let Some(objection) = request.signals.objection() {
            let _ = write!(prompt, " objection \"{}\";", objection);
        }
        if let Some(decision_maker) = request.signals.decision_maker() {
            let _ = write!(prompt, " decision maker: {};", if decision_maker { "yes" } else { "no" });
        }
        prompt.push('\n');
    }

    prompt.push_str("\nConversation so far:\n");
    for turn in &request.history {
        let who = match turn.speaker() {
            Speaker::Caller => lead.name.as_str(),
            Speaker::Agent => company.agent_name.as_str(),
        };
        let _ = writeln!(prompt, "{}: {}", who, turn.text());
    }

    prompt.push_str(
        "\nYour task:\n\
         1. Acknowledge questions or points the lead just made.\n\
         2. Answer direct questions concisely from the product information. If you do not know, offer a follow-up from a specialist.\n\
         3. Listen for objections. Address them briefly if a simple answer is obvious, never argue.\n\
         4. Gauge interest. Questions about the product are good signs.\n\
         5. If the lead shows clear interest in a meeting or asks to book one, confirm briefly and set readyToSchedule to true. Do not propose times yourself.\n\
         6. If the lead is clearly not interested or asks not to be called, respond politely and set endCall to true.\n",
    );
    if request.state == CallState::Scheduling {
        prompt.push_str("A meeting negotiation is in progress, do not set readyToSchedule again.\n");
    }

    prompt.push_str(
        "\nRespond with a single JSON object and nothing else:\n\
         {\"utterance\": string, \"signals\": {\"objection\": string or null, \"interestLevel\": \"none\" | \"low\" | \"medium\" | \"high\" or null, \"decisionMaker\": boolean or null}, \"readyToSchedule\": boolean, \"endCall\": boolean}\n",
    );

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::call::{ConversationTurn, ExtractedSignals, InterestLevel, SignalUpdate};
    use crate::domain::lead::sample_lead;

    #[test]
    fn test_greeting_uses_lead_and_company() {
        let greeting = greeting_text(&CompanyProfile::default(), &sample_lead());
        assert!(greeting.starts_with("Hello Jane. My name is Alex, and I'm calling from SalesBot AI Solutions."));
        assert!(greeting.ends_with("Is this a good time to talk briefly?"));
    }

    #[test]
    fn test_prompt_includes_history_and_signals() {
        let mut signals = ExtractedSignals::default();
        signals.merge(
            &SignalUpdate {
                interest_level: Some(InterestLevel::Medium),
                ..Default::default()
            },
            0,
        );
        let request = DialogueRequest {
            lead: sample_lead(),
            history: vec![ConversationTurn::caller("Tell me more")],
            signals,
            state: CallState::InProgress,
        };

        let prompt = build_prompt(&CompanyProfile::default(), &request);

        assert!(prompt.contains("Jane: Tell me more"));
        assert!(prompt.contains("interest level medium"));
        assert!(prompt.contains("Current call state: IN_PROGRESS."));
        assert!(prompt.contains("\"readyToSchedule\": boolean"));
    }
}
