/// Catalog API client
///
/// Thin wrappers around the REST endpoints the client needs. Authenticated
/// calls send `Authorization: Token <token>` taken from the session store.
///
/// A 401 from any authenticated endpoint clears the stored credentials before
/// the error is returned, so later calls fail fast with `MissingToken` instead
/// of retrying a dead token. Only the rejected token is cleared; a session
/// that signed in while the request was in flight survives.
use std::{sync::Arc, time::Duration};

use reqwest::{Client as HttpClient, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::instrument;

use crate::{
    error::ApiError,
    models::{
        ActivationRequest, CollectionKind, CreateMembership, LoginCredentials, LoginResponse,
        MembershipRecord, Movie, Paginated, RegisterUser, RegisteredUser, UserProfile,
    },
    services::providers::MembershipProvider,
    session::SessionStore,
};

/// Upper bound on pages followed while fetching one collection
const MAX_COLLECTION_PAGES: usize = 100;

#[derive(Clone)]
pub struct CatalogApiClient {
    http_client: HttpClient,
    api_url: String,
    session: Arc<SessionStore>,
}

impl CatalogApiClient {
    pub fn new(
        api_url: String,
        session: Arc<SessionStore>,
        request_timeout: Duration,
    ) -> Result<Self, ApiError> {
        let http_client = HttpClient::builder().timeout(request_timeout).build()?;

        Ok(Self {
            http_client,
            api_url: api_url.trim_end_matches('/').to_string(),
            session,
        })
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_url, path.trim_start_matches('/'))
    }

    /// Attaches the session token, or fails without touching the network
    ///
    /// Returns the token used so a 401 can be matched against it.
    async fn authorize(&self, request: RequestBuilder) -> Result<(RequestBuilder, String), ApiError> {
        let token = self.session.token().await.ok_or(ApiError::MissingToken)?;
        let request = request.header("Authorization", format!("Token {}", token));
        Ok((request, token))
    }

    async fn ensure_success(response: Response) -> Result<Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(ApiError::Status {
            status: status.as_u16(),
            body,
        })
    }

    /// Sends an authenticated request, clearing credentials on 401
    async fn send_authenticated(&self, request: RequestBuilder) -> Result<Response, ApiError> {
        let (request, token) = self.authorize(request).await?;
        let response = request.send().await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            let cleared = self.session.clear_if_token(&token).await;
            tracing::warn!(cleared, "Catalog API returned 401, dropping session token");
            return Err(ApiError::Unauthorized);
        }

        Self::ensure_success(response).await
    }

    async fn get_authenticated<T: DeserializeOwned>(&self, url: &str) -> Result<T, ApiError> {
        let response = self
            .send_authenticated(self.http_client.get(url).header("Accept", "application/json"))
            .await?;
        Ok(response.json().await?)
    }

    async fn post_public(&self, path: &str, body: &impl serde::Serialize) -> Result<Response, ApiError> {
        let response = self
            .http_client
            .post(self.url(path))
            .header("Accept", "application/json")
            .json(body)
            .send()
            .await?;
        Self::ensure_success(response).await
    }

    async fn get_public<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, ApiError> {
        let response = self
            .http_client
            .get(url)
            .header("Accept", "application/json")
            .query(query)
            .send()
            .await?;
        let response = Self::ensure_success(response).await?;
        Ok(response.json().await?)
    }

    /// Exchanges credentials for a token and stores it as the current session
    pub async fn login(&self, credentials: &LoginCredentials) -> Result<LoginResponse, ApiError> {
        tracing::info!(email = %credentials.email, "Attempting login");

        let login: LoginResponse = self
            .post_public("/auth/token/login/", credentials)
            .await?
            .json()
            .await?;

        self.session
            .set(login.auth_token.clone(), Some(credentials.email.clone()))
            .await
            .map_err(|e| ApiError::Session(e.to_string()))?;

        tracing::info!(email = %credentials.email, "Login successful");
        Ok(login)
    }

    /// Creates an account. The user still has to activate it and log in.
    pub async fn register(&self, user: &RegisterUser) -> Result<RegisteredUser, ApiError> {
        tracing::info!(email = %user.email, username = %user.username, "Registering user");
        let created: RegisteredUser = self.post_public("/auth/users/", user).await?.json().await?;
        tracing::info!(email = %created.email, "Registration accepted, awaiting activation");
        Ok(created)
    }

    /// Confirms the one-time code mailed after registration
    pub async fn activate(&self, activation: &ActivationRequest) -> Result<(), ApiError> {
        tracing::info!(email = %activation.email, "Verifying activation code");
        self.post_public("/auth/users/activation/", activation).await?;
        Ok(())
    }

    /// Forgets the local session. Returns false when nobody was signed in.
    pub async fn logout(&self) -> bool {
        self.session.clear().await
    }

    pub async fn current_user(&self) -> Result<UserProfile, ApiError> {
        self.get_authenticated(&self.url("/auth/users/me/")).await
    }

    pub async fn fetch_movies(&self, page: u32, page_size: u32) -> Result<Paginated<Movie>, ApiError> {
        tracing::debug!(page, page_size, "Fetching movies");
        self.get_public(
            &self.url("/api/movies/"),
            &[("page", page.to_string()), ("page_size", page_size.to_string())],
        )
        .await
    }

    pub async fn get_movie(&self, movie_id: u64) -> Result<Movie, ApiError> {
        self.get_public(&self.url(&format!("/api/movies/{}/", movie_id)), &[])
            .await
    }
}

#[async_trait::async_trait]
impl MembershipProvider for CatalogApiClient {
    #[instrument(skip(self, kind), fields(kind = %kind))]
    async fn list_memberships(
        &self,
        kind: CollectionKind,
    ) -> Result<Vec<MembershipRecord>, ApiError> {
        let mut records = Vec::new();
        let mut next = Some(self.url(&format!("/{}/", kind.path())));
        let mut pages = 0;

        while let Some(url) = next {
            if pages == MAX_COLLECTION_PAGES {
                return Err(ApiError::InvalidResponse(format!(
                    "{} listing exceeded {} pages",
                    kind, MAX_COLLECTION_PAGES
                )));
            }

            let page: Paginated<MembershipRecord> = self.get_authenticated(&url).await?;
            records.extend(page.results);
            next = page.next;
            pages += 1;
        }

        tracing::debug!(
            pages,
            records = records.len(),
            provider = self.name(),
            "Collection listed"
        );

        Ok(records)
    }

    #[instrument(skip(self, kind), fields(kind = %kind))]
    async fn create_membership(&self, kind: CollectionKind, movie_id: u64) -> Result<(), ApiError> {
        let request = self
            .http_client
            .post(self.url(&format!("/{}/", kind.path())))
            .json(&CreateMembership { movie_id });
        self.send_authenticated(request).await?;
        Ok(())
    }

    #[instrument(skip(self, kind), fields(kind = %kind))]
    async fn delete_membership(&self, kind: CollectionKind, record_id: u64) -> Result<(), ApiError> {
        let request = self
            .http_client
            .delete(self.url(&format!("/{}/{}/", kind.path(), record_id)));
        self.send_authenticated(request).await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "catalog_api"
    }
}
