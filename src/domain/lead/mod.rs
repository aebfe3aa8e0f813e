//! Lead bounded context - prospective customers and the read-only store they come from

use crate::domain::shared::value_objects::LeadId;
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use thiserror::Error;

/// Snapshot of a lead, captured once when a call session is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadProfile {
    pub id: LeadId,
    pub name: String,
    pub phone_number: String,
    pub company_name: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub linkedin_url: String,
    #[serde(default)]
    pub custom_notes: String,
    #[serde(default)]
    pub email: Option<String>,
}

impl LeadProfile {
    /// Address to invite to a booked meeting.
    ///
    /// Falls back to the first address mentioned in the free-form notes.
    pub fn contact_email(&self) -> Option<String> {
        if let Some(email) = self.email.as_deref().filter(|e| !e.trim().is_empty()) {
            return Some(email.trim().to_string());
        }

        static EMAIL: OnceLock<Regex> = OnceLock::new();
        let pattern = EMAIL.get_or_init(|| {
            Regex::new(r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}").expect("valid email regex")
        });

        pattern
            .find(&self.custom_notes)
            .map(|m| m.as_str().to_string())
    }
}

/// Lead store errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LeadStoreError {
    #[error("Lead store unavailable: {0}")]
    Unavailable(String),
}

/// Read-only lookup of lead profiles
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LeadStore: Send + Sync {
    /// Find a lead by its identifier
    async fn find_by_id(&self, id: &LeadId) -> Result<Option<LeadProfile>, LeadStoreError>;
}

#[cfg(test)]
pub(crate) fn sample_lead() -> LeadProfile {
    LeadProfile {
        id: LeadId::new("lead_001"),
        name: "Jane".to_string(),
        phone_number: "+14155550100".to_string(),
        company_name: "Acme Corp".to_string(),
        role: "Head of Sales".to_string(),
        linkedin_url: String::new(),
        custom_notes: String::new(),
        email: Some("jane@acme.example".to_string()),
    }
}
