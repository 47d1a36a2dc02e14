pub mod gateway;

use crate::model::{Authentication, Provider};
use async_trait::async_trait;
use statuser_core::{Error, Result};
use std::sync::Arc;
use std::time::Duration;

/// Provider reachability check. `Ok(())` means the source is reachable with
/// the given credentials; any error is the cause it is not.
#[async_trait]
pub trait ProviderProbe: Send + Sync {
    async fn probe(&self, authentication: &Authentication) -> Result<()>;
}

/// Bounds a probe by a deadline so a hung provider call turns into an
/// `Unavailable` result instead of stalling its worker.
pub struct TimeoutProbe<P> {
    inner: P,
    provider: Provider,
    timeout: Duration,
}

impl<P: ProviderProbe> TimeoutProbe<P> {
    pub fn new(inner: P, provider: Provider, timeout: Duration) -> Self {
        Self {
            inner,
            provider,
            timeout,
        }
    }
}

#[async_trait]
impl<P: ProviderProbe> ProviderProbe for TimeoutProbe<P> {
    async fn probe(&self, authentication: &Authentication) -> Result<()> {
        match tokio::time::timeout(self.timeout, self.inner.probe(authentication)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Probe {
                provider: self.provider.to_string(),
                details: format!("timed out after {}ms", self.timeout.as_millis()),
            }),
        }
    }
}

/// One probe per routable provider.
#[derive(Clone)]
pub struct ProviderProbes {
    pub aws: Arc<dyn ProviderProbe>,
    pub azure: Arc<dyn ProviderProbe>,
    pub gcp: Arc<dyn ProviderProbe>,
}

impl ProviderProbes {
    pub fn get(&self, provider: Provider) -> Arc<dyn ProviderProbe> {
        match provider {
            Provider::Aws => Arc::clone(&self.aws),
            Provider::Azure => Arc::clone(&self.azure),
            Provider::Gcp => Arc::clone(&self.gcp),
        }
    }
}

pub use gateway::GatewayProbe;
