use std::time::SystemTime;

use reqwest::header::{ACCEPT, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::raindrop::{Collection, CreatedRaindrops, NewRaindrop, RaindropPage};

const DEFAULT_BASE_URL: &str = "https://api.raindrop.io";

#[derive(Debug, Error)]
pub enum RaindropError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("api returned {status}: {body}")]
    Api {
        status: StatusCode,
        body: String,
        retry_after: Option<u64>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorClass {
    Auth,
    RateLimit,
    Transient,
    Permanent,
}

#[derive(Clone)]
pub struct RaindropClient {
    http: Client,
    base_url: Url,
    token: String,
}

impl RaindropClient {
    pub fn new(token: impl Into<String>) -> Result<Self, RaindropError> {
        Self::with_base_url(DEFAULT_BASE_URL, token)
    }

    pub fn with_base_url(base_url: &str, token: impl Into<String>) -> Result<Self, RaindropError> {
        Ok(Self {
            http: Client::new(),
            base_url: Url::parse(base_url)?,
            token: token.into(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// One page of the bookmarks stored in `collection_id`. Pages are zero based.
    pub async fn list_raindrops(
        &self,
        collection_id: i64,
        page: u32,
        perpage: u32,
    ) -> Result<RaindropPage, RaindropError> {
        let mut url = self.endpoint(&format!("/rest/v1/raindrops/{collection_id}"))?;
        url.query_pairs_mut()
            .append_pair("perpage", &perpage.to_string())
            .append_pair("page", &page.to_string());
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .header(ACCEPT, "application/json")
            .send()
            .await?;
        Self::handle_response(response).await
    }

    /// Creates every item with a single request.
    pub async fn create_raindrops(
        &self,
        items: &[NewRaindrop],
    ) -> Result<CreatedRaindrops, RaindropError> {
        let url = self.endpoint("/rest/v1/raindrops")?;
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .header(ACCEPT, "application/json")
            .json(&CreateRaindropsRequest { items })
            .send()
            .await?;
        Self::handle_response(response).await
    }

    pub async fn list_collections(&self) -> Result<Vec<Collection>, RaindropError> {
        self.get_collections("/rest/v1/collections").await
    }

    pub async fn list_child_collections(&self) -> Result<Vec<Collection>, RaindropError> {
        self.get_collections("/rest/v1/collections/childrens").await
    }

    /// Looks a collection up by title, root collections first.
    pub async fn find_collection(&self, title: &str) -> Result<Option<Collection>, RaindropError> {
        let roots = self.list_collections().await?;
        if let Some(found) = roots.into_iter().find(|c| c.title == title) {
            return Ok(Some(found));
        }
        let children = self.list_child_collections().await?;
        Ok(children.into_iter().find(|c| c.title == title))
    }

    async fn get_collections(&self, path: &str) -> Result<Vec<Collection>, RaindropError> {
        let url = self.endpoint(path)?;
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .header(ACCEPT, "application/json")
            .send()
            .await?;
        let payload: CollectionList = Self::handle_response(response).await?;
        Ok(payload.items)
    }

    fn endpoint(&self, path: &str) -> Result<Url, RaindropError> {
        Ok(self.base_url.join(path)?)
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, RaindropError> {
        if response.status().is_success() {
            Ok(response.json::<T>().await?)
        } else {
            let status = response.status();
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .and_then(parse_retry_after);
            let body = response.text().await.unwrap_or_default();
            Err(RaindropError::Api {
                status,
                body,
                retry_after,
            })
        }
    }
}

impl RaindropError {
    pub fn classification(&self) -> Option<ApiErrorClass> {
        match self {
            RaindropError::Api { status, .. } => Some(classify_api_status(*status)),
            RaindropError::Request(err) if err.is_timeout() || err.is_connect() => {
                Some(ApiErrorClass::Transient)
            }
            _ => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self.classification(),
            Some(ApiErrorClass::RateLimit | ApiErrorClass::Transient)
        )
    }

    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            RaindropError::Api { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

fn classify_api_status(status: StatusCode) -> ApiErrorClass {
    if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
        ApiErrorClass::Auth
    } else if status == StatusCode::TOO_MANY_REQUESTS {
        ApiErrorClass::RateLimit
    } else if status.is_server_error()
        || matches!(
            status,
            StatusCode::REQUEST_TIMEOUT | StatusCode::CONFLICT | StatusCode::TOO_EARLY
        )
    {
        ApiErrorClass::Transient
    } else {
        ApiErrorClass::Permanent
    }
}

// Retry-After is either delta-seconds or an HTTP-date.
fn parse_retry_after(value: &str) -> Option<u64> {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(seconds);
    }
    let at = httpdate::parse_http_date(value).ok()?;
    Some(
        at.duration_since(SystemTime::now())
            .map(|delta| delta.as_secs())
            .unwrap_or(0),
    )
}

#[derive(Debug, Serialize)]
struct CreateRaindropsRequest<'a> {
    items: &'a [NewRaindrop],
}

#[derive(Debug, Deserialize)]
struct CollectionList {
    #[serde(default)]
    items: Vec<Collection>,
}
