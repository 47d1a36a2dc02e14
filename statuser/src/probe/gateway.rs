use super::ProviderProbe;
use crate::model::{Authentication, Provider};
use async_trait::async_trait;
use serde::Serialize;
use statuser_core::{Error, Result};
use tracing::{debug, instrument};

#[derive(Serialize)]
struct CheckRequest<'a> {
    provider_type: String,
    source_application_id: &'a str,
    credentials: &'a str,
}

/// Delegates the provider SDK call to a reachability gateway:
/// `POST {gateway}/{provider}/check`. Any 2xx response means reachable.
pub struct GatewayProbe {
    client: reqwest::Client,
    base_url: String,
    provider: Provider,
}

impl GatewayProbe {
    pub fn new(client: reqwest::Client, base_url: &str, provider: Provider) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            provider,
        }
    }

    fn check_url(&self) -> String {
        format!("{}/{}/check", self.base_url, self.provider)
    }

    fn failure(&self, details: String) -> Error {
        Error::Probe {
            provider: self.provider.to_string(),
            details,
        }
    }
}

#[async_trait]
impl ProviderProbe for GatewayProbe {
    #[instrument(skip(self, authentication), fields(provider = %self.provider, application_id = %authentication.source_application_id))]
    async fn probe(&self, authentication: &Authentication) -> Result<()> {
        let response = self
            .client
            .post(self.check_url())
            .json(&CheckRequest {
                provider_type: authentication.provider_type.to_string(),
                source_application_id: &authentication.source_application_id,
                credentials: &authentication.payload,
            })
            .send()
            .await
            .map_err(|e| self.failure(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            debug!("Source reachable");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(self.failure(format!("gateway returned {}: {}", status, body.trim())))
    }
}
