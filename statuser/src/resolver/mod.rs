pub mod http;

use crate::model::{Principal, ResolvedSource};
use async_trait::async_trait;
use statuser_core::Result;

/// Looks up credentials for a source on behalf of a principal.
///
/// Implementations return `Error::NotFound` for sources that no longer exist
/// so the router can tell stale requests apart from lookup failures.
#[async_trait]
pub trait CredentialResolver: Send + Sync {
    async fn resolve(&self, source_id: &str, identity: &Principal) -> Result<ResolvedSource>;
}

pub use http::HttpResolver;
