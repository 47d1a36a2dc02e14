use super::CredentialResolver;
use crate::model::{Authentication, Principal, ProviderType, ResolvedSource};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use statuser_core::backoff::retry_with_backoff;
use statuser_core::config::SourcesConfig;
use statuser_core::{Error, Result};
use std::time::Duration;
use tracing::{debug, instrument};

#[derive(Debug, Deserialize)]
struct AuthenticationResponse {
    application_id: String,
    provider_type: ProviderType,
    #[serde(default)]
    payload: String,
}

/// Credential resolver backed by the sources HTTP API.
pub struct HttpResolver {
    client: reqwest::Client,
    base_url: String,
    max_retries: u32,
    retry_base_delay_ms: u64,
}

impl HttpResolver {
    pub fn new(config: &SourcesConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            max_retries: config.max_retries,
            retry_base_delay_ms: config.retry_base_delay_ms,
        })
    }

    fn authentication_url(&self, source_id: &str) -> String {
        format!("{}/sources/{}/authentication", self.base_url, source_id)
    }

    async fn fetch(&self, source_id: &str, identity: &Principal) -> Result<AuthenticationResponse> {
        let mut request = self
            .client
            .get(self.authentication_url(source_id))
            .header("x-org-id", &identity.org_id);
        if let Some(account) = &identity.account_number {
            request = request.header("x-account-number", account);
        }

        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Err(Error::NotFound {
                source_id: source_id.to_string(),
            });
        }

        if !status.is_success() {
            let details = response.text().await.unwrap_or_default();
            return Err(Error::Lookup {
                source_id: source_id.to_string(),
                status: Some(status.as_u16()),
                details,
            });
        }

        Ok(response.json::<AuthenticationResponse>().await?)
    }
}

#[async_trait]
impl CredentialResolver for HttpResolver {
    #[instrument(skip(self, identity), fields(org_id = %identity.org_id))]
    async fn resolve(&self, source_id: &str, identity: &Principal) -> Result<ResolvedSource> {
        let response = retry_with_backoff(
            move || self.fetch(source_id, identity),
            self.max_retries,
            self.retry_base_delay_ms,
            "resolve_authentication",
        )
        .await?;

        debug!(
            application_id = %response.application_id,
            provider = %response.provider_type,
            "Resolved source authentication"
        );

        Ok(ResolvedSource {
            authentication: Authentication {
                provider_type: response.provider_type,
                payload: response.payload,
                source_application_id: response.application_id.clone(),
            },
            application_id: response.application_id,
            provider_type: response.provider_type,
            identity: identity.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{principal, serve};
    use axum::http::{HeaderMap, StatusCode as HttpStatus};
    use axum::response::{IntoResponse, Response};
    use axum::routing::get;
    use axum::Json;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn resolver(url: String) -> HttpResolver {
        HttpResolver::new(&SourcesConfig {
            url,
            request_timeout_secs: 5,
            max_retries: 3,
            retry_base_delay_ms: 1,
        })
        .unwrap()
    }

    /// Answer every lookup with `failures` 503s first, then `status`.
    async fn sources_api(failures: usize, status: HttpStatus) -> (String, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let app = axum::Router::new().route(
            "/sources/:id/authentication",
            get(move |headers: HeaderMap| {
                let counter = Arc::clone(&counter);
                async move {
                    let attempt = counter.fetch_add(1, Ordering::SeqCst);
                    if headers.get("x-org-id").map(|v| v.as_bytes()) != Some(b"org-1".as_slice()) {
                        return HttpStatus::UNAUTHORIZED.into_response();
                    }
                    if attempt < failures {
                        return (HttpStatus::SERVICE_UNAVAILABLE, "try later").into_response();
                    }
                    if status != HttpStatus::OK {
                        return (status, "lookup refused").into_response();
                    }
                    Json(serde_json::json!({
                        "application_id": "app-9",
                        "provider_type": "azure",
                        "payload": "subscription-1",
                    }))
                    .into_response()
                }
            }),
        );
        (serve(app).await, hits)
    }

    #[tokio::test]
    async fn missing_source_maps_to_not_found_without_retry() {
        let (url, hits) = sources_api(0, HttpStatus::NOT_FOUND).await;

        let err = resolver(url).resolve("12", &principal()).await.unwrap_err();

        assert!(err.is_not_found(), "{err}");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn server_errors_are_retried_until_success() {
        let (url, hits) = sources_api(2, HttpStatus::OK).await;

        let resolved = resolver(url).resolve("12", &principal()).await.unwrap();

        assert_eq!(hits.load(Ordering::SeqCst), 3);
        assert_eq!(resolved.application_id, "app-9");
        assert_eq!(resolved.provider_type, ProviderType::Azure);
        assert_eq!(resolved.authentication.payload, "subscription-1");
        assert_eq!(resolved.identity, principal());
    }

    #[tokio::test]
    async fn client_errors_fail_the_lookup_once() {
        let (url, hits) = sources_api(0, HttpStatus::FORBIDDEN).await;

        let err = resolver(url).resolve("12", &principal()).await.unwrap_err();

        match err {
            Error::Lookup { status, details, .. } => {
                assert_eq!(status, Some(403));
                assert_eq!(details, "lookup refused");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn persistent_server_errors_give_up_after_max_retries() {
        let (url, hits) = sources_api(usize::MAX, HttpStatus::OK).await;

        let err = resolver(url).resolve("12", &principal()).await.unwrap_err();

        assert!(matches!(err, Error::Lookup { status: Some(503), .. }), "{err}");
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn builds_authentication_url_without_double_slash() {
        let config = SourcesConfig {
            url: "http://sources.local/api/".into(),
            request_timeout_secs: 1,
            max_retries: 1,
            retry_base_delay_ms: 1,
        };
        let resolver = HttpResolver::new(&config).unwrap();

        assert_eq!(
            resolver.authentication_url("12"),
            "http://sources.local/api/sources/12/authentication"
        );
    }

    #[test]
    fn response_with_unrecognized_provider_decodes_as_unknown() {
        let body = r#"{"application_id":"a-1","provider_type":"vsphere","payload":"x"}"#;
        let response: AuthenticationResponse = serde_json::from_str(body).unwrap();

        assert_eq!(response.provider_type, ProviderType::Unknown);
        assert_eq!(response.application_id, "a-1");
    }
}
