//! External collaborators of the campaign pipeline.

use crate::errors::CollaboratorError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Fetches the readable text of a website.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SiteScraper: Send + Sync {
    /// Scrapes `domain` and returns its visible text.
    async fn scrape(&self, domain: &str) -> Result<String, CollaboratorError>;
}

/// Finds candidate contacts matching structured criteria.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LeadFinder: Send + Sync {
    /// Returns at most `limit` leads.
    async fn find_leads(
        &self,
        criteria: &LeadCriteria,
        limit: usize,
    ) -> Result<Vec<Lead>, CollaboratorError>;
}

/// Structured search criteria produced by the `filters` stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadCriteria {
    /// Job titles to target.
    #[serde(default)]
    pub job_titles: Vec<String>,
    /// Industries to target.
    #[serde(default)]
    pub industries: Vec<String>,
    /// Company size ranges, e.g. `"51-200"`.
    #[serde(default)]
    pub company_sizes: Vec<String>,
    /// Locations to target.
    #[serde(default)]
    pub locations: Vec<String>,
    /// Free-form keywords.
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl LeadCriteria {
    /// Reads criteria from a `filters` result.
    ///
    /// Missing keys and non-string entries are skipped.
    #[must_use]
    pub fn from_filters(filters: &Value) -> Self {
        let list = |key: &str| -> Vec<String> {
            filters
                .get(key)
                .and_then(Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default()
        };

        Self {
            job_titles: list("jobTitles"),
            industries: list("industries"),
            company_sizes: list("companySizes"),
            locations: list("locations"),
            keywords: list("keywords"),
        }
    }

    /// Returns true if no criterion is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.job_titles.is_empty()
            && self.industries.is_empty()
            && self.company_sizes.is_empty()
            && self.locations.is_empty()
            && self.keywords.is_empty()
    }
}

/// A candidate contact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lead {
    /// Stable lead id.
    pub id: String,
    /// Full name.
    pub name: String,
    /// Job title.
    pub title: String,
    /// Company name.
    pub company: String,
    /// Email address, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Profile URL, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linkedin_url: Option<String>,
}

impl Lead {
    /// Creates a lead without contact details.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        title: impl Into<String>,
        company: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            title: title.into(),
            company: company.into(),
            email: None,
            linkedin_url: None,
        }
    }

    /// Sets the email address.
    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Returns the first name, or the full name if it has one word.
    #[must_use]
    pub fn first_name(&self) -> &str {
        self.name.split_whitespace().next().unwrap_or(&self.name)
    }
}

/// A scraper that returns fixed content for every domain.
#[derive(Debug, Clone, Default)]
pub struct StaticSiteScraper {
    content: String,
}

impl StaticSiteScraper {
    /// Creates a scraper returning `content`.
    #[must_use]
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

#[async_trait]
impl SiteScraper for StaticSiteScraper {
    async fn scrape(&self, _domain: &str) -> Result<String, CollaboratorError> {
        Ok(self.content.clone())
    }
}

/// A lead finder that returns a fixed list.
#[derive(Debug, Clone, Default)]
pub struct StaticLeadFinder {
    leads: Vec<Lead>,
}

impl StaticLeadFinder {
    /// Creates a finder returning `leads`.
    #[must_use]
    pub fn new(leads: Vec<Lead>) -> Self {
        Self { leads }
    }
}

#[async_trait]
impl LeadFinder for StaticLeadFinder {
    async fn find_leads(
        &self,
        _criteria: &LeadCriteria,
        limit: usize,
    ) -> Result<Vec<Lead>, CollaboratorError> {
        Ok(self.leads.iter().take(limit).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_criteria_from_filters() {
        let filters = json!({
            "jobTitles": ["CTO", "VP Engineering", 3],
            "industries": ["SaaS"],
            "locations": "Berlin"
        });
        let criteria = LeadCriteria::from_filters(&filters);
        assert_eq!(criteria.job_titles, vec!["CTO", "VP Engineering"]);
        assert_eq!(criteria.industries, vec!["SaaS"]);
        assert!(criteria.locations.is_empty());
        assert!(!criteria.is_empty());
        assert!(LeadCriteria::from_filters(&json!({})).is_empty());
    }

    #[test]
    fn test_lead_serializes_camel_case() {
        let lead = Lead::new("l1", "Ada Lovelace", "CTO", "Acme").with_email("ada@acme.com");
        let value = serde_json::to_value(&lead).unwrap();
        assert_eq!(value["email"], "ada@acme.com");
        assert!(value.get("linkedinUrl").is_none());
        assert_eq!(lead.first_name(), "Ada");
    }

    #[tokio::test]
    async fn test_static_finder_respects_limit() {
        let finder = StaticLeadFinder::new(vec![
            Lead::new("l1", "A", "CTO", "Acme"),
            Lead::new("l2", "B", "CTO", "Acme"),
        ]);
        let leads = finder.find_leads(&LeadCriteria::default(), 1).await.unwrap();
        assert_eq!(leads.len(), 1);
    }
}
