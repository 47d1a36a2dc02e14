use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use statuser_core::Result;
use uuid::Uuid;

pub const RESOURCE_TYPE_APPLICATION: &str = "Application";
pub const EVENT_TYPE_AVAILABILITY_STATUS: &str = "availability_status";

/// Decoded availability-check request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SourceRequest {
    pub source_id: String,
}

/// Provider tag returned by the credential service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(from = "String")]
pub enum ProviderType {
    Aws,
    Azure,
    Gcp,
    Noop,
    Unknown,
}

impl From<&str> for ProviderType {
    fn from(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "aws" | "amazon" => ProviderType::Aws,
            "azure" => ProviderType::Azure,
            "gcp" | "google" => ProviderType::Gcp,
            "noop" => ProviderType::Noop,
            _ => ProviderType::Unknown,
        }
    }
}

impl From<String> for ProviderType {
    fn from(value: String) -> Self {
        ProviderType::from(value.as_str())
    }
}

impl std::fmt::Display for ProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderType::Aws => write!(f, "aws"),
            ProviderType::Azure => write!(f, "azure"),
            ProviderType::Gcp => write!(f, "gcp"),
            ProviderType::Noop => write!(f, "noop"),
            ProviderType::Unknown => write!(f, "unknown"),
        }
    }
}

/// A provider that owns a queue and a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Provider {
    Aws,
    Azure,
    Gcp,
}

impl Provider {
    pub fn as_str(self) -> &'static str {
        match self {
            Provider::Aws => "aws",
            Provider::Azure => "azure",
            Provider::Gcp => "gcp",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller identity carried from the inbound message to the outbound result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub org_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_number: Option<String>,
}

/// Credential bundle for one source. `payload` is opaque to the pipeline
/// (role ARN, subscription id, project id).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authentication {
    pub provider_type: ProviderType,
    pub payload: String,
    pub source_application_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSource {
    pub authentication: Authentication,
    pub application_id: String,
    pub provider_type: ProviderType,
    pub identity: Principal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AvailabilityStatus {
    Available,
    Unavailable,
}

impl AvailabilityStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AvailabilityStatus::Available => "available",
            AvailabilityStatus::Unavailable => "unavailable",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    pub resource_id: String,
    pub identity: Principal,
    pub resource_type: &'static str,
    pub status: AvailabilityStatus,
    pub error: Option<String>,
}

#[derive(Serialize)]
struct StatusPayload<'a> {
    resource_type: &'a str,
    resource_id: &'a str,
    status: AvailabilityStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
}

impl ProbeResult {
    pub fn available(source: &ResolvedSource) -> Self {
        Self {
            resource_id: source.application_id.clone(),
            identity: source.identity.clone(),
            resource_type: RESOURCE_TYPE_APPLICATION,
            status: AvailabilityStatus::Available,
            error: None,
        }
    }

    pub fn unavailable(source: &ResolvedSource, cause: String) -> Self {
        Self {
            status: AvailabilityStatus::Unavailable,
            error: Some(cause),
            ..Self::available(source)
        }
    }

    /// Encodes the result as an outbound message carrying the originating
    /// principal in its headers.
    pub fn to_message(&self, topic: &str) -> Result<OutboundMessage> {
        let value = serde_json::to_vec(&StatusPayload {
            resource_type: self.resource_type,
            resource_id: &self.resource_id,
            status: self.status,
            error: self.error.as_deref(),
        })?;

        let mut headers = vec![
            ("event_type".to_string(), EVENT_TYPE_AVAILABILITY_STATUS.to_string()),
            ("x-org-id".to_string(), self.identity.org_id.clone()),
        ];
        if let Some(account) = &self.identity.account_number {
            headers.push(("x-account-number".to_string(), account.clone()));
        }

        Ok(OutboundMessage {
            id: Uuid::new_v4(),
            topic: topic.to_string(),
            headers,
            value: Bytes::from(value),
            created_at: Utc::now(),
        })
    }
}

/// One message as read from the inbound stream.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub payload: Bytes,
    pub identity: Principal,
}

#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub id: Uuid,
    pub topic: String,
    pub headers: Vec<(String, String)>,
    pub value: Bytes,
    pub created_at: DateTime<Utc>,
}
