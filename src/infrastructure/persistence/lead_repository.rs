/// JSON-file backed implementation of LeadStore
use crate::domain::lead::{LeadProfile, LeadStore, LeadStoreError};
use crate::domain::shared::value_objects::LeadId;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

/// Leads loaded once at startup and served from memory
pub struct JsonLeadStore {
    leads: HashMap<LeadId, LeadProfile>,
}

impl JsonLeadStore {
    /// Load a JSON array of leads. Entries that are not valid leads are
    /// skipped with a warning; a missing file or non-array document is an error.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, LeadStoreError> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            LeadStoreError::Unavailable(format!("{}: {}", path.display(), e))
        })?;

        let store = Self::parse(&raw).map_err(|e| {
            LeadStoreError::Unavailable(format!("{}: {}", path.display(), e))
        })?;
        info!("Loaded {} leads from {}", store.len(), path.display());
        Ok(store)
    }

    fn parse(raw: &str) -> Result<Self, String> {
        let document: Value = serde_json::from_str(raw).map_err(|e| format!("invalid JSON: {}", e))?;
        let Value::Array(entries) = document else {
            return Err("expected a list of leads".to_string());
        };

        let mut leads = HashMap::with_capacity(entries.len());
        for (position, entry) in entries.into_iter().enumerate() {
            match serde_json::from_value::<LeadProfile>(entry) {
                Ok(lead) if lead.id.as_str().trim().is_empty() => {
                    warn!("Skipping lead at position {}: empty id", position);
                }
                Ok(lead) => {
                    if leads.insert(lead.id.clone(), lead).is_some() {
                        warn!("Duplicate lead at position {}, keeping the later entry", position);
                    }
                }
                Err(e) => warn!("Skipping invalid lead at position {}: {}", position, e),
            }
        }

        Ok(Self { leads })
    }

    pub fn from_leads(leads: impl IntoIterator<Item = LeadProfile>) -> Self {
        Self {
            leads: leads.into_iter().map(|lead| (lead.id.clone(), lead)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.leads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leads.is_empty()
    }
}

#[async_trait]
impl LeadStore for JsonLeadStore {
    async fn find_by_id(&self, id: &LeadId) -> Result<Option<LeadProfile>, LeadStoreError> {
        Ok(self.leads.get(id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const LEADS: &str = r#"[
        {
            "id": "lead_001",
            "name": "Jane Doe",
            "phone_number": "+14155550100",
            "company_name": "Acme Corp",
            "role": "Head of Sales",
            "linkedin_url": "https://linkedin.example/jane",
            "custom_notes": "Prefers mornings. jane.doe@acme.example"
        },
        { "id": "lead_002", "name": "No Phone" },
        "not a lead",
        {
            "id": "lead_003",
            "name": "Raj",
            "phone_number": "+442071838750",
            "company_name": "Globex",
            "email": "raj@globex.example"
        }
    ]"#;

    #[tokio::test]
    async fn test_load_skips_invalid_entries() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(LEADS.as_bytes()).unwrap();

        let store = JsonLeadStore::load(file.path()).await.unwrap();

        assert_eq!(store.len(), 2);
        let jane = store.find_by_id(&LeadId::new("lead_001")).await.unwrap().unwrap();
        assert_eq!(jane.company_name, "Acme Corp");
        assert_eq!(jane.contact_email().as_deref(), Some("jane.doe@acme.example"));
        assert!(store.find_by_id(&LeadId::new("lead_002")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_file_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();

        let result = JsonLeadStore::load(dir.path().join("leads.json")).await;

        assert!(matches!(result, Err(LeadStoreError::Unavailable(_))));
    }

    #[test]
    fn test_non_array_document_rejected() {
        assert!(JsonLeadStore::parse(r#"{"id": "lead_001"}"#).is_err());
        assert!(JsonLeadStore::parse("not json").is_err());
    }
}
