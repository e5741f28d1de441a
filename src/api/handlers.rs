use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{AppError, AppResult, MembershipError, MembershipResult};
use crate::middleware::request_id::RequestId;
use crate::models::{
    ActivationRequest, CollectionKind, LoginCredentials, MembershipEntry, Movie, Paginated,
    RegisterUser, RegisteredUser, UserProfile,
};

use super::AppState;

const DEFAULT_PAGE_SIZE: u32 = 12;
const MAX_PAGE_SIZE: u32 = 100;

// Request/Response types

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub authenticated: bool,
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MoviePageQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

/// Membership of one movie; `None` means the answer is unknown
#[derive(Debug, Serialize)]
pub struct MembershipStatusResponse {
    pub movie_id: u64,
    pub favorites: Option<bool>,
    pub watchlist: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct CollectionResponse {
    pub kind: CollectionKind,
    pub entries: Vec<MembershipEntry>,
}

// Handlers

/// Health check endpoint
pub async fn health_check() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}

/// What the local session store holds; never calls the Catalog API
pub async fn session_status(State(state): State<AppState>) -> Json<SessionResponse> {
    let session = state.catalog.session();
    Json(SessionResponse {
        authenticated: session.is_authenticated().await,
        email: session.user_email().await,
    })
}

pub async fn register(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Json(user): Json<RegisterUser>,
) -> AppResult<(StatusCode, Json<RegisteredUser>)> {
    if user.email.trim().is_empty() || user.username.trim().is_empty() || user.password.is_empty() {
        return Err(AppError::InvalidInput(
            "Email, username and password are required".to_string(),
        ));
    }

    let created = state.catalog.register(&user).await?;
    tracing::info!(request_id = %request_id, email = %created.email, "Account registered");
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn activate(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Json(activation): Json<ActivationRequest>,
) -> AppResult<StatusCode> {
    if activation.email.trim().is_empty() || activation.otp.trim().is_empty() {
        return Err(AppError::InvalidInput("Email and code are required".to_string()));
    }

    state.catalog.activate(&activation).await?;
    tracing::info!(request_id = %request_id, email = %activation.email, "Account activated");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn login(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Json(credentials): Json<LoginCredentials>,
) -> AppResult<Json<SessionResponse>> {
    if credentials.email.trim().is_empty() || credentials.password.is_empty() {
        return Err(AppError::InvalidInput(
            "Email and password are required".to_string(),
        ));
    }

    state.catalog.login(&credentials).await?;
    tracing::info!(request_id = %request_id, "Session started");

    Ok(Json(SessionResponse {
        authenticated: true,
        email: Some(credentials.email),
    }))
}

/// Forgets the session and drops the previous user's collections
pub async fn logout(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
) -> StatusCode {
    let had_session = state.catalog.logout().await;
    state.memberships.clear().await;
    tracing::info!(request_id = %request_id, had_session, "Session ended");
    StatusCode::NO_CONTENT
}

pub async fn current_user(State(state): State<AppState>) -> AppResult<Json<UserProfile>> {
    Ok(Json(state.catalog.current_user().await?))
}

pub async fn list_movies(
    State(state): State<AppState>,
    Query(query): Query<MoviePageQuery>,
) -> AppResult<Json<Paginated<Movie>>> {
    let page = query.page.unwrap_or(1);
    let page_size = query.page_size.unwrap_or(DEFAULT_PAGE_SIZE);

    if page == 0 || page_size == 0 || page_size > MAX_PAGE_SIZE {
        return Err(AppError::InvalidInput(format!(
            "page must be >= 1 and page_size between 1 and {}",
            MAX_PAGE_SIZE
        )));
    }

    Ok(Json(state.catalog.fetch_movies(page, page_size).await?))
}

pub async fn get_movie(
    State(state): State<AppState>,
    Path(movie_id): Path<u64>,
) -> AppResult<Json<Movie>> {
    Ok(Json(state.catalog.get_movie(movie_id).await?))
}

/// Favorite/watchlist state of one movie tile
///
/// A failed lookup degrades to `null` for that collection and is logged. An
/// expired session is reported as 401 so the UI can send the user to login.
pub async fn membership_status(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path(movie_id): Path<u64>,
) -> AppResult<Json<MembershipStatusResponse>> {
    let (favorites, watchlist) = tokio::join!(
        state.memberships.is_member(CollectionKind::Favorites, movie_id),
        state.memberships.is_member(CollectionKind::Watchlist, movie_id),
    );

    Ok(Json(MembershipStatusResponse {
        movie_id,
        favorites: degrade(&request_id, CollectionKind::Favorites, movie_id, favorites)?,
        watchlist: degrade(&request_id, CollectionKind::Watchlist, movie_id, watchlist)?,
    }))
}

fn degrade(
    request_id: &RequestId,
    kind: CollectionKind,
    movie_id: u64,
    result: MembershipResult<bool>,
) -> AppResult<Option<bool>> {
    match result {
        Ok(member) => Ok(Some(member)),
        Err(e @ (MembershipError::SessionExpired | MembershipError::InvalidMovieId(_))) => {
            Err(e.into())
        }
        Err(e) => {
            tracing::warn!(
                request_id = %request_id,
                kind = %kind,
                movie_id,
                error = %e,
                "Membership unknown, falling back to default state"
            );
            Ok(None)
        }
    }
}

pub async fn list_collection(
    State(state): State<AppState>,
    Path(kind): Path<CollectionKind>,
) -> AppResult<Json<CollectionResponse>> {
    let entries = state.memberships.members(kind).await?;
    Ok(Json(CollectionResponse { kind, entries }))
}

pub async fn add_to_collection(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path((kind, movie_id)): Path<(CollectionKind, u64)>,
) -> AppResult<StatusCode> {
    tracing::info!(request_id = %request_id, kind = %kind, movie_id, "Adding to collection");
    state.memberships.add(kind, movie_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn remove_from_collection(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path((kind, movie_id)): Path<(CollectionKind, u64)>,
) -> AppResult<StatusCode> {
    tracing::info!(request_id = %request_id, kind = %kind, movie_id, "Removing from collection");
    state.memberships.remove(kind, movie_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
