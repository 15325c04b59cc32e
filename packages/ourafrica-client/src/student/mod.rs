//! Student certificates API.
//!
//! Thin wrapper over [`ApiClient`]: bearer handling, renewal and error
//! normalization all happen there.

pub mod types;

pub use types::{Certificate, CertificatePage, CertificateQuery};

use bytes::Bytes;
use reqwest::Url;
use tracing::{debug, info};

use crate::error::{ClientError, Result};
use crate::http::{ApiClient, ApiRequest};
use types::CertificateListing;

pub const CERTIFICATES_PATH: &str = "/api/student/certificates";

#[derive(Debug, Clone)]
pub struct StudentApi {
    api: ApiClient,
}

impl StudentApi {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    pub async fn list_certificates(&self, query: &CertificateQuery) -> Result<CertificatePage> {
        let mut url = Url::parse(&self.api.url(CERTIFICATES_PATH))
            .map_err(|e| ClientError::Validation(format!("Invalid API URL: {}", e)))?;
        let pairs = query.pairs();
        if !pairs.is_empty() {
            url.query_pairs_mut().extend_pairs(pairs);
        }

        let listing: CertificateListing = self
            .api
            .send_json(ApiRequest::get(url.as_str()))
            .await?
            .into_value()?;

        let page = CertificatePage::from(listing);
        debug!(count = page.items.len(), "Certificates listed");
        Ok(page)
    }

    pub async fn get_certificate(&self, id: &str) -> Result<Certificate> {
        self.api.get(&certificate_path(id)?).await
    }

    /// The certificate document. Error bodies are decoded from the binary
    /// response, so a missing certificate surfaces as a 404 `ApiError`.
    pub async fn download_certificate(&self, id: &str) -> Result<Bytes> {
        let bytes = self
            .api
            .download(&format!("{}/download", certificate_path(id)?))
            .await?;
        info!(certificate_id = %id, size = bytes.len(), "Certificate downloaded");
        Ok(bytes)
    }

    /// `None` when the course has no certificate yet.
    pub async fn certificate_for_course(&self, course_id: &str) -> Result<Option<Certificate>> {
        let path = format!("{}/course/{}", CERTIFICATES_PATH, require_id(course_id)?);
        let request = ApiRequest::get(self.api.url(&path));
        match self.api.send_json::<Certificate>(request).await {
            Ok(envelope) => envelope.into_result(),
            Err(ClientError::Api(err)) if err.status == 404 => Ok(None),
            Err(err) => Err(err),
        }
    }

    pub async fn claim_certificate(&self, course_id: &str) -> Result<Certificate> {
        let path = format!("{}/course/{}/claim", CERTIFICATES_PATH, require_id(course_id)?);
        let certificate: Certificate = self.api.post(&path, &serde_json::json!({})).await?;
        info!(course_id, certificate_id = %certificate.id, "Certificate claimed");
        Ok(certificate)
    }
}

fn certificate_path(id: &str) -> Result<String> {
    Ok(format!("{}/{}", CERTIFICATES_PATH, require_id(id)?))
}

fn require_id(id: &str) -> Result<&str> {
    let id = id.trim();
    if id.is_empty() || id.contains('/') {
        return Err(ClientError::Validation(format!("Invalid identifier: {:?}", id)));
    }
    Ok(id)
}
