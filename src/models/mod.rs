use serde::{Deserialize, Serialize};

pub mod membership;

pub use membership::{CollectionKind, CreateMembership, MembershipEntry, MembershipRecord, MovieRef};

// ============================================================================
// Catalog API Types
// ============================================================================

/// Page envelope used by every list endpoint of the Catalog API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paginated<T> {
    #[serde(default)]
    pub count: u64,
    /// Absolute URL of the next page, if any
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub previous: Option<String>,
    pub results: Vec<T>,
}

/// A catalog movie
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Movie {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub synopsis: Option<String>,
    #[serde(default)]
    pub director: Option<String>,
    #[serde(default)]
    pub tagline: Option<String>,
    #[serde(default)]
    pub original_language: Option<String>,
    /// Row of the movie in the backend recommendation index
    #[serde(default)]
    pub movie_index: Option<u64>,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub cast: Vec<String>,
    /// Backend sends the average as a decimal string
    #[serde(default)]
    pub avg_rating: Option<String>,
    #[serde(default, rename = "posterUri")]
    pub poster_uri: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginCredentials {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub auth_token: String,
}

/// Body of `POST /auth/users/`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterUser {
    pub email: String,
    pub username: String,
    pub password: String,
}

/// Account created by registration; inactive until the OTP is verified
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegisteredUser {
    pub email: String,
    pub username: String,
    #[serde(default)]
    pub id: Option<u64>,
}

/// Body of `POST /auth/users/activation/`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivationRequest {
    pub otp: String,
    pub email: String,
}

/// Profile of the authenticated user, from `GET /auth/users/me/`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserProfile {
    pub email: String,
    pub username: String,
    #[serde(default)]
    pub is_verified: bool,
}
