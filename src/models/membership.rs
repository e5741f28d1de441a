use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// User collections whose membership is tracked per movie
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionKind {
    Favorites,
    Watchlist,
}

impl CollectionKind {
    /// Path segment of the collection on the Catalog API
    pub fn path(&self) -> &'static str {
        match self {
            CollectionKind::Favorites => "favorites",
            CollectionKind::Watchlist => "watchlist",
        }
    }
}

impl Display for CollectionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.path())
    }
}

/// Movie reference embedded in a membership record; other fields are ignored
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct MovieRef {
    pub id: u64,
}

/// Raw membership row as returned by `GET /favorites/` and `GET /watchlist/`
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct MembershipRecord {
    pub id: u64,
    pub movie: MovieRef,
}

/// Body of `POST /favorites/` and `POST /watchlist/`
#[derive(Debug, Clone, Serialize)]
pub struct CreateMembership {
    pub movie_id: u64,
}

/// Cached membership of one movie in one collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MembershipEntry {
    pub catalog_item_id: u64,
    /// Server-side row id, needed to delete the membership
    pub membership_record_id: u64,
}

impl From<&MembershipRecord> for MembershipEntry {
    fn from(record: &MembershipRecord) -> Self {
        Self {
            catalog_item_id: record.movie.id,
            membership_record_id: record.id,
        }
    }
}
