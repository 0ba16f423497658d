//! The seam between the console logic and the HTTP transport.

use async_trait::async_trait;
use payloads::responses::{SignedIn, TokenPair};
use payloads::{APIClient, ClientError, EntityId, FilterQuery, requests};
use serde_json::Value;

use crate::config::Config;
use crate::resource::{Endpoint, Resource};
use crate::token_store::TokenStore;

/// Every remote call the console makes.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn login(
        &self,
        credentials: &requests::LoginCredentials,
    ) -> Result<SignedIn, ClientError>;

    async fn logout(&self) -> Result<(), ClientError>;

    async fn refresh_token(
        &self,
        refresh_token: &str,
    ) -> Result<TokenPair, ClientError>;

    /// One page of the resource, as the raw `{ data, meta }` document.
    async fn search(
        &self,
        resource: &Resource,
        filter: &FilterQuery,
    ) -> Result<Value, ClientError>;

    async fn fetch_by_id(
        &self,
        resource: &Resource,
        id: EntityId,
    ) -> Result<Value, ClientError>;

    /// Unpaginated list used to fill selectors.
    async fn dropdown(&self, resource: &Resource) -> Result<Value, ClientError>;

    async fn update_status_many(
        &self,
        resource: &Resource,
        ids: &[EntityId],
        status: i32,
    ) -> Result<(), ClientError>;

    async fn delete_many(
        &self,
        resource: &Resource,
        ids: &[EntityId],
    ) -> Result<(), ClientError>;

    async fn update_status(
        &self,
        resource: &Resource,
        id: EntityId,
        status: i32,
    ) -> Result<(), ClientError>;

    async fn delete(
        &self,
        resource: &Resource,
        id: EntityId,
    ) -> Result<(), ClientError>;
}

/// [`Backend`] over HTTP, authenticating with the stored access token.
pub struct HttpBackend {
    api: APIClient,
    tokens: TokenStore,
}

impl HttpBackend {
    pub fn new(api: APIClient, tokens: TokenStore) -> Self {
        Self { api, tokens }
    }

    pub fn from_config(
        config: &Config,
        tokens: TokenStore,
    ) -> Result<Self, reqwest::Error> {
        let inner_client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self::new(
            APIClient {
                address: config.backend_url.clone(),
                prefix: config.api_prefix.clone(),
                inner_client,
            },
            tokens,
        ))
    }

    fn bearer(&self) -> Option<String> {
        self.tokens.access_token()
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn login(
        &self,
        credentials: &requests::LoginCredentials,
    ) -> Result<SignedIn, ClientError> {
        self.api.login(credentials).await
    }

    async fn logout(&self) -> Result<(), ClientError> {
        self.api.logout(self.bearer().as_deref()).await
    }

    async fn refresh_token(
        &self,
        refresh_token: &str,
    ) -> Result<TokenPair, ClientError> {
        let details = requests::RefreshToken {
            refresh_token: refresh_token.to_string(),
        };
        self.api.refresh_token(&details).await
    }

    async fn search(
        &self,
        resource: &Resource,
        filter: &FilterQuery,
    ) -> Result<Value, ClientError> {
        let page: payloads::responses::SearchResponse<Value> = self
            .api
            .search(&resource.search_path(), filter, self.bearer().as_deref())
            .await?;
        serde_json::to_value(page)
            .map_err(|e| ClientError::InvalidResponse(e.to_string()))
    }

    async fn fetch_by_id(
        &self,
        resource: &Resource,
        id: EntityId,
    ) -> Result<Value, ClientError> {
        let path = resource.path(Endpoint::ById, Some(id));
        self.api.fetch(&path, self.bearer().as_deref()).await
    }

    async fn dropdown(
        &self,
        resource: &Resource,
    ) -> Result<Value, ClientError> {
        let path = resource.path(Endpoint::Dropdown, None);
        self.api.fetch(&path, self.bearer().as_deref()).await
    }

    async fn update_status_many(
        &self,
        resource: &Resource,
        ids: &[EntityId],
        status: i32,
    ) -> Result<(), ClientError> {
        let details = requests::UpdateStatusMany {
            id: ids.to_vec(),
            status,
        };
        let path = resource.path(Endpoint::UpdateStatusMany, None);
        self.api
            .update_status_many(&path, &details, self.bearer().as_deref())
            .await
    }

    async fn delete_many(
        &self,
        resource: &Resource,
        ids: &[EntityId],
    ) -> Result<(), ClientError> {
        let details = requests::DeleteMany { id: ids.to_vec() };
        let path = resource.path(Endpoint::DeleteMany, None);
        self.api
            .delete_many(&path, &details, self.bearer().as_deref())
            .await
    }

    async fn update_status(
        &self,
        resource: &Resource,
        id: EntityId,
        status: i32,
    ) -> Result<(), ClientError> {
        let path = resource.path(Endpoint::UpdateStatus, Some(id));
        self.api
            .update_status(
                &path,
                &requests::UpdateStatus { status },
                self.bearer().as_deref(),
            )
            .await
    }

    async fn delete(
        &self,
        resource: &Resource,
        id: EntityId,
    ) -> Result<(), ClientError> {
        let path = resource.path(Endpoint::Delete, Some(id));
        self.api.delete_one(&path, self.bearer().as_deref()).await
    }
}
