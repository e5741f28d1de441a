use std::sync::Arc;

use crate::clock::SystemClock;
use crate::config::Config;
use crate::services::{providers::CatalogApiClient, MembershipCache};
use crate::session::SessionStore;

/// Shared application state
///
/// One session, one Catalog API client and one membership cache per process.
#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<CatalogApiClient>,
    pub memberships: MembershipCache,
}

impl AppState {
    /// Builds the state, restoring a saved session when `SESSION_FILE` is set
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let session = match &config.session_file {
            Some(path) => SessionStore::load(path.clone()).await?,
            None => SessionStore::in_memory(),
        };
        Self::with_session(config, Arc::new(session))
    }

    pub fn with_session(config: &Config, session: Arc<SessionStore>) -> anyhow::Result<Self> {
        let catalog = Arc::new(CatalogApiClient::new(
            config.catalog_api_url.clone(),
            Arc::clone(&session),
            config.request_timeout(),
        )?);

        let memberships = MembershipCache::new(
            catalog.clone(),
            session,
            Arc::new(SystemClock),
            config.membership_ttl(),
        );

        Ok(Self {
            catalog,
            memberships,
        })
    }
}
