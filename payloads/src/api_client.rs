use crate::{FilterQuery, requests, responses};
use reqwest::{RequestBuilder, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;

type ReqwestResult = Result<reqwest::Response, reqwest::Error>;

/// An API client for interfacing with the admin backend.
///
/// Resource paths are passed in already rendered (e.g.
/// `admin/booking_list/search`); the client only knows about the auth
/// endpoints.
pub struct APIClient {
    pub address: String,
    /// Path segment placed between the address and every endpoint, e.g.
    /// `api`. May be empty.
    pub prefix: String,
    pub inner_client: reqwest::Client,
}

/// Helper methods for http actions
impl APIClient {
    fn format_url(&self, path: &str) -> String {
        let address = self.address.trim_end_matches('/');
        let prefix = self.prefix.trim_matches('/');
        let path = path.trim_start_matches('/');
        if prefix.is_empty() {
            format!("{address}/{path}")
        } else {
            format!("{address}/{prefix}/{path}")
        }
    }

    fn authorize(
        request: RequestBuilder,
        bearer: Option<&str>,
    ) -> RequestBuilder {
        match bearer {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn get(
        &self,
        path: &str,
        query: &[(String, String)],
        bearer: Option<&str>,
    ) -> ReqwestResult {
        let request = self.inner_client.get(self.format_url(path)).query(query);
        Self::authorize(request, bearer).send().await
    }

    async fn post(
        &self,
        path: &str,
        body: &impl Serialize,
        bearer: Option<&str>,
    ) -> ReqwestResult {
        let request = self.inner_client.post(self.format_url(path)).json(body);
        Self::authorize(request, bearer).send().await
    }

    async fn empty_post(
        &self,
        path: &str,
        bearer: Option<&str>,
    ) -> ReqwestResult {
        let request = self.inner_client.post(self.format_url(path));
        Self::authorize(request, bearer).send().await
    }

    async fn patch(
        &self,
        path: &str,
        body: &impl Serialize,
        bearer: Option<&str>,
    ) -> ReqwestResult {
        let request = self.inner_client.patch(self.format_url(path)).json(body);
        Self::authorize(request, bearer).send().await
    }

    async fn delete(&self, path: &str, bearer: Option<&str>) -> ReqwestResult {
        let request = self.inner_client.delete(self.format_url(path));
        Self::authorize(request, bearer).send().await
    }
}

/// Methods on the backend API
impl APIClient {
    pub async fn login(
        &self,
        details: &requests::LoginCredentials,
    ) -> Result<responses::SignedIn, ClientError> {
        let response = self.post("auth/signin", details, None).await?;
        let body: responses::LoginResponse = ok_body(response).await?;
        Ok(body.data)
    }

    /// Exchange a refresh token for a new token pair. Any non-2xx response
    /// is an error.
    pub async fn refresh_token(
        &self,
        details: &requests::RefreshToken,
    ) -> Result<responses::TokenPair, ClientError> {
        let response = self.post("auth/refresh-token", details, None).await?;
        ok_body(response).await
    }

    pub async fn logout(
        &self,
        bearer: Option<&str>,
    ) -> Result<(), ClientError> {
        let response = self.empty_post("auth/logout", bearer).await?;
        ok_empty(response).await
    }

    /// Search a resource collection with the given filter.
    pub async fn search<T: DeserializeOwned>(
        &self,
        path: &str,
        filter: &FilterQuery,
        bearer: Option<&str>,
    ) -> Result<responses::SearchResponse<T>, ClientError> {
        let response =
            self.get(path, &filter.to_query_pairs(), bearer).await?;
        ok_body(response).await
    }

    /// Plain GET of a JSON document (entity by id, dropdown lists).
    pub async fn fetch<T: DeserializeOwned>(
        &self,
        path: &str,
        bearer: Option<&str>,
    ) -> Result<T, ClientError> {
        let response = self.get(path, &[], bearer).await?;
        ok_body(response).await
    }

    pub async fn update_status_many(
        &self,
        path: &str,
        details: &requests::UpdateStatusMany,
        bearer: Option<&str>,
    ) -> Result<(), ClientError> {
        let response = self.post(path, details, bearer).await?;
        ok_empty(response).await
    }

    pub async fn delete_many(
        &self,
        path: &str,
        details: &requests::DeleteMany,
        bearer: Option<&str>,
    ) -> Result<(), ClientError> {
        let response = self.post(path, details, bearer).await?;
        ok_empty(response).await
    }

    pub async fn update_status(
        &self,
        path: &str,
        details: &requests::UpdateStatus,
        bearer: Option<&str>,
    ) -> Result<(), ClientError> {
        let response = self.patch(path, details, bearer).await?;
        ok_empty(response).await
    }

    pub async fn delete_one(
        &self,
        path: &str,
        bearer: Option<&str>,
    ) -> Result<(), ClientError> {
        let response = self.delete(path, bearer).await?;
        ok_empty(response).await
    }
}

/// Every failure a backend call can produce, classified by how the console
/// reacts to it.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ClientError {
    /// No response was received.
    #[error("Network error. Please check your connection.")]
    NetworkUnavailable(String),
    /// 401. The session is gone; the caller must send the user to login.
    #[error("You are not logged in or your session has expired.")]
    AuthExpired,
    #[error("You do not have permission to access this data. {0}")]
    Forbidden(String),
    #[error("The requested data was not found. {0}")]
    NotFound(String),
    #[error("Too many requests. Please wait a moment and try again.")]
    RateLimited,
    #[error("Server error ({0}). Please try again later.")]
    ServerError(StatusCode, String),
    /// 400 with the field messages reported by the backend.
    #[error("{}", .0.join(", "))]
    ValidationRejected(Vec<String>),
    /// Any other non-2xx status, containing response text.
    #[error("Unexpected error (code {0}): {1}")]
    APIError(StatusCode, String),
    #[error("Invalid response from server: {0}")]
    InvalidResponse(String),
    /// Rejected locally before any request was sent.
    #[error("{0}")]
    InvalidInput(String),
}

impl ClientError {
    /// Classify a non-2xx response from its status and raw body.
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let parsed =
            serde_json::from_str::<responses::ErrorResponse>(body).ok();
        let message = parsed
            .as_ref()
            .map(|e| e.message.formatted())
            .unwrap_or_else(|| body.to_string());

        match status {
            StatusCode::BAD_REQUEST => Self::ValidationRejected(
                parsed
                    .map(|e| e.message.into_messages())
                    .unwrap_or_else(|| vec![body.to_string()]),
            ),
            StatusCode::UNAUTHORIZED => Self::AuthExpired,
            StatusCode::FORBIDDEN => Self::Forbidden(message),
            StatusCode::NOT_FOUND => Self::NotFound(message),
            StatusCode::TOO_MANY_REQUESTS => Self::RateLimited,
            s if s.is_server_error() => Self::ServerError(s, message),
            s => Self::APIError(s, message),
        }
    }

    /// Whether offering the user an inline "try again" makes sense.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NetworkUnavailable(_)
                | Self::RateLimited
                | Self::ServerError(..)
        )
    }

    /// The HTTP status behind this error, if a response was received.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::AuthExpired => Some(StatusCode::UNAUTHORIZED),
            Self::Forbidden(_) => Some(StatusCode::FORBIDDEN),
            Self::NotFound(_) => Some(StatusCode::NOT_FOUND),
            Self::RateLimited => Some(StatusCode::TOO_MANY_REQUESTS),
            Self::ValidationRejected(_) => Some(StatusCode::BAD_REQUEST),
            Self::ServerError(s, _) | Self::APIError(s, _) => Some(*s),
            Self::NetworkUnavailable(_)
            | Self::InvalidResponse(_)
            | Self::InvalidInput(_) => None,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::InvalidResponse(e.to_string())
        } else {
            Self::NetworkUnavailable(e.to_string())
        }
    }
}

/// Deserialize a successful request into the desired type, or return an
/// appropriate error.
pub async fn ok_body<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ClientError> {
    if !response.status().is_success() {
        let status = response.status();
        return Err(ClientError::from_status(status, &response.text().await?));
    }
    Ok(response.json::<T>().await?)
}

/// Check that an empty response is OK, returning a ClientError if not.
pub async fn ok_empty(response: reqwest::Response) -> Result<(), ClientError> {
    if !response.status().is_success() {
        let status = response.status();
        return Err(ClientError::from_status(status, &response.text().await?));
    }
    Ok(())
}
