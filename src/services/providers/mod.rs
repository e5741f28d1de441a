/// Membership data provider abstraction
///
/// The membership cache only needs three calls against a user's collections.
/// Keeping them behind a trait lets the cache run against the HTTP Catalog API
/// in production and against in-process fakes in tests.
use crate::{
    error::ApiError,
    models::{CollectionKind, MembershipRecord},
};

pub mod catalog_api;

pub use catalog_api::CatalogApiClient;

/// Source of truth for favorites and watchlist membership
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait MembershipProvider: Send + Sync {
    /// Fetch the complete collection of the current user
    async fn list_memberships(&self, kind: CollectionKind)
        -> Result<Vec<MembershipRecord>, ApiError>;

    /// Add a movie to the collection
    async fn create_membership(&self, kind: CollectionKind, movie_id: u64) -> Result<(), ApiError>;

    /// Delete a membership row by its server-side record id
    async fn delete_membership(&self, kind: CollectionKind, record_id: u64)
        -> Result<(), ApiError>;

    /// Provider name for logging and debugging
    fn name(&self) -> &'static str;
}
