// SPDX-FileCopyrightText: 2026 Kiosk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! CRM wire client.
//!
//! The contract is three operations: search by phone or email, create a
//! lead, and attach a note to an existing record. The HTTP client is built
//! per call; auth errors are permanent, 429/5xx and network failures are
//! transient and handled by the worker's retry schedule.

use std::time::Duration;

use async_trait::async_trait;
use kiosk_core::{KioskError, Lead};
use serde::{Deserialize, Serialize};
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Lead payload in the shape the CRM expects.
#[derive(Debug, Clone, Serialize)]
pub struct CrmLeadPayload {
    pub last_name: String,
    pub lead_first_communication_channel: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub whatsapp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub telegram: Option<String>,
}

impl CrmLeadPayload {
    pub fn from_lead(lead: &Lead) -> Self {
        Self {
            last_name: lead.last_name.clone(),
            lead_first_communication_channel: lead.source.to_string(),
            phone: lead.phone.clone(),
            email: lead.email.clone(),
            whatsapp: lead.whatsapp.clone(),
            company: lead.company.clone(),
            telegram: Some(lead.chat_id.clone()),
        }
    }
}

/// An existing CRM record located by the dedupe search.
#[derive(Debug, Clone, Deserialize)]
pub struct CrmRecord {
    pub id: String,
}

/// The three CRM operations the delivery worker needs.
#[async_trait]
pub trait CrmClient: Send + Sync {
    /// Find an existing record by phone OR email.
    async fn search(
        &self,
        phone: Option<&str>,
        email: Option<&str>,
    ) -> Result<Option<CrmRecord>, KioskError>;

    /// Create a new lead record, returning its CRM id.
    async fn create_lead(&self, payload: &CrmLeadPayload) -> Result<CrmRecord, KioskError>;

    /// Attach a note to an existing record.
    async fn add_note(&self, lead_id: &str, text: &str) -> Result<(), KioskError>;
}

/// HTTP implementation against the CRM connector endpoint.
pub struct HttpCrmClient {
    endpoint: String,
    api_key: Option<String>,
}

impl HttpCrmClient {
    pub fn new(endpoint: String, api_key: Option<String>) -> Self {
        Self { endpoint, api_key }
    }

    fn client(&self) -> Result<reqwest::Client, KioskError> {
        reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| KioskError::Internal(format!("failed to build HTTP client: {e}")))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    records: Vec<CrmRecord>,
}

fn map_error(e: reqwest::Error) -> KioskError {
    if e.is_timeout() {
        KioskError::Timeout {
            duration: REQUEST_TIMEOUT,
        }
    } else {
        KioskError::TransientExternal {
            service: "crm".into(),
            message: e.to_string(),
            source: Some(Box::new(e)),
        }
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, KioskError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = format!("CRM returned {status}: {body}");
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        Err(KioskError::transient("crm", message))
    } else {
        Err(KioskError::permanent("crm", message))
    }
}

#[async_trait]
impl CrmClient for HttpCrmClient {
    async fn search(
        &self,
        phone: Option<&str>,
        email: Option<&str>,
    ) -> Result<Option<CrmRecord>, KioskError> {
        let mut query = Vec::new();
        if let Some(phone) = phone {
            query.push(("phone", phone));
        }
        if let Some(email) = email {
            query.push(("email", email));
        }

        let client = self.client()?;
        let response = self
            .authorize(client.get(format!("{}/leads/search", self.endpoint)))
            .query(&query)
            .send()
            .await
            .map_err(map_error)?;
        let response = check_status(response).await?;
        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| KioskError::transient("crm", format!("bad search response: {e}")))?;
        debug!(matches = parsed.records.len(), "crm dedupe search");
        Ok(parsed.records.into_iter().next())
    }

    async fn create_lead(&self, payload: &CrmLeadPayload) -> Result<CrmRecord, KioskError> {
        let client = self.client()?;
        let response = self
            .authorize(client.post(format!("{}/leads", self.endpoint)))
            .json(payload)
            .send()
            .await
            .map_err(map_error)?;
        let response = check_status(response).await?;
        response
            .json()
            .await
            .map_err(|e| KioskError::transient("crm", format!("bad create response: {e}")))
    }

    async fn add_note(&self, lead_id: &str, text: &str) -> Result<(), KioskError> {
        let client = self.client()?;
        let response = self
            .authorize(client.post(format!("{}/leads/{lead_id}/notes", self.endpoint)))
            .json(&serde_json::json!({ "text": text }))
            .send()
            .await
            .map_err(map_error)?;
        check_status(response).await?;
        Ok(())
    }
}
