use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A course completion certificate issued to the signed-in student.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Certificate {
    pub id: String,
    pub course_id: String,
    #[serde(default)]
    pub course_title: Option<String>,
    #[serde(default)]
    pub certificate_number: Option<String>,
    #[serde(default)]
    pub issued_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completion_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub final_score: Option<f64>,
    #[serde(default)]
    pub verification_code: Option<String>,
}

impl Certificate {
    pub fn title(&self) -> &str {
        self.course_title.as_deref().unwrap_or(&self.course_id)
    }
}

/// Filters for the certificate listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CertificateQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub search: Option<String>,
}

impl CertificateQuery {
    pub fn page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    pub(crate) fn pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(page) = self.page {
            pairs.push(("page", page.to_string()));
        }
        if let Some(limit) = self.limit {
            pairs.push(("limit", limit.to_string()));
        }
        if let Some(search) = self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            pairs.push(("search", search.to_string()));
        }
        pairs
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CertificatePage {
    #[serde(alias = "certificates", alias = "data")]
    pub items: Vec<Certificate>,
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub limit: Option<u32>,
}

/// The listing endpoint answers either a page object or a bare array.
#[derive(Deserialize)]
#[serde(untagged)]
pub(crate) enum CertificateListing {
    Page(CertificatePage),
    Bare(Vec<Certificate>),
}

impl From<CertificateListing> for CertificatePage {
    fn from(listing: CertificateListing) -> Self {
        match listing {
            CertificateListing::Page(page) => page,
            CertificateListing::Bare(items) => CertificatePage {
                total: Some(items.len() as u64),
                items,
                page: None,
                limit: None,
            },
        }
    }
}
